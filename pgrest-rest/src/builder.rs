//! SQL statement assembly
//!
//! Statements are built only from schema-validated identifiers, fixed
//! keywords and `?` placeholders. Every bound column gets its placeholder
//! from [`placeholder`], the one table describing how each PostgreSQL type
//! is bound.

use base64::Engine;
use serde_json::{Map, Value};

use pgrest_common::error::{Error, Result};
use pgrest_common::types::{ColumnInfo, ColumnType, ScalarType, TableInfo};

use crate::backend::{Row, SqlValue, Statement};
use crate::convert::TypeConverter;
use crate::filter::WhereClause;
use crate::query::{PageRequest, QueryParams};
use crate::validation::{column_ident, table_ident, Ident};

/// Bind placeholder for a column type
pub fn placeholder(ty: &ColumnType) -> String {
    match ty {
        ColumnType::Scalar(scalar) => match scalar {
            ScalarType::Json
            | ScalarType::Jsonb
            | ScalarType::Uuid
            | ScalarType::Bit(_)
            | ScalarType::VarBit(_)
            | ScalarType::Xml
            | ScalarType::Numeric
            | ScalarType::Interval => format!("?::{}", scalar.sql_name()),
            _ => "?".to_string(),
        },
        ColumnType::Array(_)
        | ColumnType::Enum(_)
        | ColumnType::Composite(_)
        | ColumnType::Network(_) => format!("?::{}", ty.sql_name()),
    }
}

// ============================================================================
// Ordering
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

/// One validated ORDER BY term
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderClause {
    pub column: Ident,
    pub direction: SortDirection,
    pub nulls: Option<NullsOrder>,
}

impl OrderClause {
    pub fn to_sql(&self) -> String {
        let mut sql = format!(
            "{} {}",
            self.column,
            match self.direction {
                SortDirection::Asc => "ASC",
                SortDirection::Desc => "DESC",
            }
        );
        match self.nulls {
            Some(NullsOrder::First) => sql.push_str(" NULLS FIRST"),
            Some(NullsOrder::Last) => sql.push_str(" NULLS LAST"),
            None => {}
        }
        sql
    }

    /// Same column walked the other way
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self {
            column: self.column.clone(),
            direction: match self.direction {
                SortDirection::Asc => SortDirection::Desc,
                SortDirection::Desc => SortDirection::Asc,
            },
            nulls: self.nulls.map(|n| match n {
                NullsOrder::First => NullsOrder::Last,
                NullsOrder::Last => NullsOrder::First,
            }),
        }
    }
}

/// Parse `order=col.dir.nulls,col2` against the table's columns
///
/// # Errors
/// `InvalidColumn` for unknown columns, `InvalidQueryParam` for unknown
/// modifiers.
pub fn parse_order(table: &TableInfo, expr: &str) -> Result<Vec<OrderClause>> {
    expr.split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(|term| {
            let mut parts = term.split('.');
            let column = column_ident(table, parts.next().unwrap_or_default())?;
            let mut clause = OrderClause {
                column,
                direction: SortDirection::Asc,
                nulls: None,
            };
            for modifier in parts {
                match modifier.to_ascii_lowercase().as_str() {
                    "asc" => clause.direction = SortDirection::Asc,
                    "desc" => clause.direction = SortDirection::Desc,
                    "nullsfirst" => clause.nulls = Some(NullsOrder::First),
                    "nullslast" => clause.nulls = Some(NullsOrder::Last),
                    other => {
                        return Err(Error::InvalidQueryParam(format!(
                            "unknown order modifier '{other}' in '{term}'"
                        )))
                    }
                }
            }
            Ok(clause)
        })
        .collect()
}

/// Ordering from `order=` or the legacy `orderBy`/`orderDirection` pair
///
/// # Errors
/// Same as [`parse_order`]; also rejects directions other than asc/desc.
pub fn order_from_params(table: &TableInfo, params: &QueryParams) -> Result<Vec<OrderClause>> {
    if let Some(order) = params.get("order") {
        return parse_order(table, order);
    }
    let Some(column) = params.get("orderBy") else {
        return Ok(vec![]);
    };
    let direction = match params.get("orderDirection").map(str::to_ascii_lowercase) {
        None => SortDirection::Asc,
        Some(d) if d == "asc" => SortDirection::Asc,
        Some(d) if d == "desc" => SortDirection::Desc,
        Some(d) => {
            return Err(Error::InvalidQueryParam(format!(
                "orderDirection must be asc or desc, got '{d}'"
            )))
        }
    };
    Ok(vec![OrderClause {
        column: column_ident(table, column)?,
        direction,
        nulls: None,
    }])
}

pub fn order_by_sql(order: &[OrderClause]) -> String {
    if order.is_empty() {
        String::new()
    } else {
        let terms: Vec<String> = order.iter().map(OrderClause::to_sql).collect();
        format!(" ORDER BY {}", terms.join(", "))
    }
}

// ============================================================================
// Keys and cursors
// ============================================================================

/// Split a URL key into typed-by-position parts for the table's primary
/// key. Single-column keys take the raw value unsplit.
///
/// # Errors
/// `CompositeKeyMismatch` when the part count differs from the primary key
/// width, `ValidationError` for empty parts or keyless tables.
pub fn parse_composite_key<'t>(
    table: &'t TableInfo,
    key: &str,
) -> Result<Vec<(&'t ColumnInfo, String)>> {
    let pk = table.primary_key_columns();
    if pk.is_empty() {
        return Err(Error::ValidationError(format!(
            "Table {} has no primary key",
            table.name
        )));
    }

    let parts: Vec<&str> = if pk.len() == 1 {
        vec![key]
    } else {
        key.split(',').collect()
    };
    if parts.len() != pk.len() {
        return Err(Error::CompositeKeyMismatch {
            expected: pk.len(),
            actual: parts.len(),
        });
    }
    if let Some(i) = parts.iter().position(|p| p.trim().is_empty()) {
        return Err(Error::ValidationError(format!(
            "Invalid key: part {} ({}) is empty",
            i + 1,
            pk[i].name
        )));
    }

    Ok(pk
        .into_iter()
        .zip(parts)
        .map(|(col, part)| (col, part.to_string()))
        .collect())
}

/// Comma-join key parts in primary-key order
pub fn encode_key<S: AsRef<str>>(values: &[S]) -> String {
    values
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(",")
}

/// URL key of a result row, `None` if a key column is missing or NULL
pub fn row_key(table: &TableInfo, row: &Row) -> Option<String> {
    let parts = table
        .primary_key_columns()
        .iter()
        .map(|col| row.get(&col.name).and_then(SqlValue::as_text))
        .collect::<Option<Vec<_>>>()?;
    (!parts.is_empty()).then(|| encode_key(&parts))
}

/// URL key of a request body, `None` if any key column is absent
pub fn record_key(table: &TableInfo, record: &Map<String, Value>) -> Option<String> {
    let parts = table
        .primary_key_columns()
        .iter()
        .map(|col| match record.get(&col.name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;
    (!parts.is_empty()).then(|| encode_key(&parts))
}

/// Opaque cursor for an order-column value
pub fn encode_cursor(raw: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(raw.as_bytes())
}

/// # Errors
/// `InvalidCursor` when the cursor is not base64 of UTF-8 text.
pub fn decode_cursor(cursor: &str) -> Result<String> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(cursor.trim())
        .map_err(|e| Error::InvalidCursor(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| Error::InvalidCursor(e.to_string()))
}

// ============================================================================
// Statement builder
// ============================================================================

/// Builds statements for one validated table
pub struct QueryBuilder<'t> {
    table: &'t TableInfo,
    name: Ident,
}

impl<'t> QueryBuilder<'t> {
    pub fn new(table: &'t TableInfo) -> Self {
        Self {
            table,
            name: table_ident(table),
        }
    }

    pub fn table(&self) -> &'t TableInfo {
        self.table
    }

    /// `*` or the validated column list
    ///
    /// # Errors
    /// `InvalidColumn` for names the table does not have.
    pub fn select_clause(&self, columns: Option<&[&str]>) -> Result<String> {
        match columns {
            None => Ok("*".to_string()),
            Some([]) => Ok("*".to_string()),
            Some(columns) => {
                let idents = columns
                    .iter()
                    .map(|c| column_ident(self.table, c).map(|i| i.to_string()))
                    .collect::<Result<Vec<_>>>()?;
                Ok(idents.join(", "))
            }
        }
    }

    /// `SELECT <columns> FROM t [WHERE] [ORDER BY] [LIMIT ? OFFSET ?]`
    pub fn select(
        &self,
        columns: &str,
        filter: &WhereClause,
        order: &[OrderClause],
        page: Option<PageRequest>,
    ) -> Statement {
        let mut sql = format!(
            "SELECT {columns} FROM {}{}{}",
            self.name,
            filter.to_sql(),
            order_by_sql(order)
        );
        let mut params = filter.params.clone();
        if let Some(page) = page {
            sql.push_str(" LIMIT ? OFFSET ?");
            params.push(SqlValue::Int(to_i64(page.limit)));
            params.push(SqlValue::Int(to_i64(page.offset)));
        }
        Statement::new(sql, params)
    }

    pub fn count(&self, filter: &WhereClause) -> Statement {
        Statement::new(
            format!("SELECT COUNT(*) AS count FROM {}{}", self.name, filter.to_sql()),
            filter.params.clone(),
        )
    }

    /// Equality conditions on the primary key for a URL key
    ///
    /// # Errors
    /// Key parsing errors and conversion errors for the key parts.
    pub fn key_filter(&self, key: &str, converter: &TypeConverter) -> Result<WhereClause> {
        let mut clause = WhereClause::new();
        for (col, part) in parse_composite_key(self.table, key)? {
            let ident = column_ident(self.table, &col.name)?;
            let value = converter.convert_text(&part, &col.column_type)?;
            clause.push(
                format!("{ident} = {}", placeholder(&col.column_type)),
                vec![value],
            );
        }
        Ok(clause)
    }

    /// Single-row INSERT
    ///
    /// # Errors
    /// `InvalidColumn` for unknown keys, conversion errors for values.
    pub fn insert(
        &self,
        record: &Map<String, Value>,
        converter: &TypeConverter,
        returning: bool,
    ) -> Result<Statement> {
        if record.is_empty() {
            let mut sql = format!("INSERT INTO {} DEFAULT VALUES", self.name);
            if returning {
                sql.push_str(" RETURNING *");
            }
            return Ok(Statement::new(sql, vec![]));
        }
        self.bulk_insert(std::slice::from_ref(record), converter, returning)
    }

    /// Multi-row INSERT in one statement. Columns absent from a record are
    /// sent as `DEFAULT`.
    ///
    /// # Errors
    /// Same as [`QueryBuilder::insert`]; an empty payload is rejected.
    pub fn bulk_insert(
        &self,
        records: &[Map<String, Value>],
        converter: &TypeConverter,
        returning: bool,
    ) -> Result<Statement> {
        let (mut sql, params, _) = self.insert_values(records, converter)?;
        if returning {
            sql.push_str(" RETURNING *");
        }
        Ok(Statement::new(sql, params))
    }

    /// Single-row UPSERT keyed on the primary key
    ///
    /// # Errors
    /// Same as [`QueryBuilder::bulk_upsert`].
    pub fn upsert(&self, record: &Map<String, Value>, converter: &TypeConverter) -> Result<Statement> {
        self.bulk_upsert(std::slice::from_ref(record), converter)
    }

    /// `INSERT ... ON CONFLICT (pk) DO UPDATE SET col = EXCLUDED.col`, or
    /// `DO NOTHING` when only key columns are supplied
    ///
    /// # Errors
    /// `ValidationError` for tables without a primary key, plus the
    /// insert errors.
    pub fn bulk_upsert(
        &self,
        records: &[Map<String, Value>],
        converter: &TypeConverter,
    ) -> Result<Statement> {
        let pk = self.table.primary_key_columns();
        if pk.is_empty() {
            return Err(Error::ValidationError(format!(
                "Upsert requires a primary key on {}",
                self.table.name
            )));
        }
        let (mut sql, params, columns) = self.insert_values(records, converter)?;

        let conflict: Vec<&str> = pk.iter().map(|c| c.name.as_str()).collect();
        let updates: Vec<String> = columns
            .iter()
            .filter(|c| !c.is_primary_key)
            .map(|c| format!("{0} = EXCLUDED.{0}", c.name))
            .collect();

        sql.push_str(&format!(" ON CONFLICT ({})", conflict.join(", ")));
        if updates.is_empty() {
            sql.push_str(" DO NOTHING");
        } else {
            sql.push_str(&format!(" DO UPDATE SET {}", updates.join(", ")));
        }
        sql.push_str(" RETURNING *");
        Ok(Statement::new(sql, params))
    }

    /// Key-scoped UPDATE
    ///
    /// # Errors
    /// `ValidationError` for an empty body, plus column/conversion errors.
    pub fn update(
        &self,
        record: &Map<String, Value>,
        key: &WhereClause,
        converter: &TypeConverter,
        returning: bool,
    ) -> Result<Statement> {
        if record.is_empty() {
            return Err(Error::ValidationError(
                "Update requires at least one column".to_string(),
            ));
        }
        let columns = self.record_columns(std::slice::from_ref(record))?;

        let mut assignments = Vec::with_capacity(columns.len());
        let mut params = Vec::with_capacity(columns.len() + key.params.len());
        for col in columns {
            let value = record.get(&col.name).unwrap_or(&Value::Null);
            assignments.push(format!("{} = {}", col.name, placeholder(&col.column_type)));
            params.push(converter.to_sql_param(value, &col.column_type)?);
        }
        params.extend(key.params.iter().cloned());

        let mut sql = format!(
            "UPDATE {} SET {}{}",
            self.name,
            assignments.join(", "),
            key.to_sql()
        );
        if returning {
            sql.push_str(" RETURNING *");
        }
        Ok(Statement::new(sql, params))
    }

    /// Key-scoped DELETE
    pub fn delete(&self, key: &WhereClause) -> Statement {
        Statement::new(
            format!("DELETE FROM {}{}", self.name, key.to_sql()),
            key.params.clone(),
        )
    }

    /// Validated columns present in any record, in table declaration order
    fn record_columns(&self, records: &[Map<String, Value>]) -> Result<Vec<&'t ColumnInfo>> {
        for record in records {
            for key in record.keys() {
                column_ident(self.table, key)?;
            }
        }
        Ok(self
            .table
            .columns
            .iter()
            .filter(|c| records.iter().any(|r| r.contains_key(&c.name)))
            .collect())
    }

    fn insert_values(
        &self,
        records: &[Map<String, Value>],
        converter: &TypeConverter,
    ) -> Result<(String, Vec<SqlValue>, Vec<&'t ColumnInfo>)> {
        if records.is_empty() {
            return Err(Error::ValidationError("Empty insert payload".to_string()));
        }
        let columns = self.record_columns(records)?;
        if columns.is_empty() {
            return Err(Error::ValidationError(
                "Insert payload names no columns".to_string(),
            ));
        }

        let mut rows = Vec::with_capacity(records.len());
        let mut params = Vec::new();
        for record in records {
            let mut cells = Vec::with_capacity(columns.len());
            for col in &columns {
                match record.get(&col.name) {
                    Some(value) => {
                        cells.push(placeholder(&col.column_type));
                        params.push(converter.to_sql_param(value, &col.column_type)?);
                    }
                    None => cells.push("DEFAULT".to_string()),
                }
            }
            rows.push(format!("({})", cells.join(", ")));
        }

        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.name,
            names.join(", "),
            rows.join(", ")
        );
        Ok((sql, params, columns))
    }
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::row;
    use crate::schema::fixtures::{blog_cache, blog_schema};
    use serde_json::json;

    fn table(name: &str) -> TableInfo {
        blog_schema().table(name).cloned().unwrap()
    }

    fn converter() -> TypeConverter {
        TypeConverter::new(blog_cache())
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_placeholder_cast_table() {
        let cases = [
            ("integer", "?"),
            ("text", "?"),
            ("boolean", "?"),
            ("json", "?::json"),
            ("jsonb", "?::jsonb"),
            ("uuid", "?::uuid"),
            ("bit(8)", "?::bit(8)"),
            ("varbit", "?::varbit"),
            ("text[]", "?::text[]"),
            ("_int4", "?::integer[]"),
            ("postgres_enum:mood", "?::mood"),
            ("postgres_composite:address", "?::address"),
            ("inet", "?::inet"),
            ("cidr", "?::cidr"),
            ("macaddr", "?::macaddr"),
            ("macaddr8", "?::macaddr8"),
            ("numeric", "?::numeric"),
            ("xml", "?::xml"),
            ("interval", "?::interval"),
            ("timestamp", "?"),
            ("date", "?"),
            ("bytea", "?"),
        ];
        for (tag, expected) in cases {
            assert_eq!(placeholder(&ColumnType::parse(tag)), expected, "{tag}");
        }
    }

    #[test]
    fn test_select_statement() {
        let users = table("users");
        let builder = QueryBuilder::new(&users);
        let columns = builder.select_clause(Some(&["id", "name"][..])).unwrap();
        let mut filter = WhereClause::new();
        filter.push("name = ?", vec![SqlValue::Text("John".into())]);
        let order = parse_order(&users, "name").unwrap();

        let stmt = builder.select(&columns, &filter, &order, Some(PageRequest { offset: 0, limit: 1 }));
        assert_eq!(
            stmt.sql,
            "SELECT id, name FROM users WHERE name = ? ORDER BY name ASC LIMIT ? OFFSET ?"
        );
        assert_eq!(
            stmt.params,
            vec![SqlValue::Text("John".into()), SqlValue::Int(1), SqlValue::Int(0)]
        );

        let count = builder.count(&filter);
        assert_eq!(count.sql, "SELECT COUNT(*) AS count FROM users WHERE name = ?");
    }

    #[test]
    fn test_select_clause_validation() {
        let users = table("users");
        let builder = QueryBuilder::new(&users);
        assert_eq!(builder.select_clause(None).unwrap(), "*");
        assert!(matches!(
            builder.select_clause(Some(&["id", "password"][..])),
            Err(Error::InvalidColumn(_))
        ));
    }

    #[test]
    fn test_insert_uses_typed_placeholders() {
        let posts = table("posts");
        let record = object(json!({
            "status": "draft",
            "title": "Hello",
            "metadata": {"a": 1},
            "tags": ["x", "y"]
        }));
        let stmt = QueryBuilder::new(&posts)
            .insert(&record, &converter(), true)
            .unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO posts (title, tags, metadata, status) VALUES (?, ?::text[], ?::jsonb, ?::post_status) RETURNING *"
        );
        assert_eq!(stmt.params[0], SqlValue::Text("Hello".into()));
        assert_eq!(stmt.params[2], SqlValue::Json(json!({"a": 1})));
    }

    #[test]
    fn test_insert_rejects_unknown_column() {
        let users = table("users");
        let record = object(json!({"name": "x", "is_admin": true}));
        assert!(matches!(
            QueryBuilder::new(&users).insert(&record, &converter(), true),
            Err(Error::InvalidColumn(_))
        ));
    }

    #[test]
    fn test_insert_defaults_and_no_returning() {
        let users = table("users");
        let stmt = QueryBuilder::new(&users)
            .insert(&Map::new(), &converter(), true)
            .unwrap();
        assert_eq!(stmt.sql, "INSERT INTO users DEFAULT VALUES RETURNING *");

        let record = object(json!({"name": "x"}));
        let stmt = QueryBuilder::new(&users)
            .insert(&record, &converter(), false)
            .unwrap();
        assert_eq!(stmt.sql, "INSERT INTO users (name) VALUES (?)");
    }

    #[test]
    fn test_bulk_insert_fills_defaults() {
        let users = table("users");
        let records = vec![
            object(json!({"name": "a", "email": "a@x.com"})),
            object(json!({"name": "b"})),
        ];
        let stmt = QueryBuilder::new(&users)
            .bulk_insert(&records, &converter(), true)
            .unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO users (name, email) VALUES (?, ?), (?, DEFAULT) RETURNING *"
        );
        assert_eq!(stmt.params.len(), 3);
        assert!(QueryBuilder::new(&users)
            .bulk_insert(&[], &converter(), true)
            .is_err());
    }

    #[test]
    fn test_update_and_delete() {
        let users = table("users");
        let builder = QueryBuilder::new(&users);
        let key = builder.key_filter("7", &converter()).unwrap();
        let record = object(json!({"email": "new@x.com", "name": "N"}));

        let stmt = builder.update(&record, &key, &converter(), true).unwrap();
        assert_eq!(
            stmt.sql,
            "UPDATE users SET name = ?, email = ? WHERE id = ? RETURNING *"
        );
        assert_eq!(stmt.params.last(), Some(&SqlValue::Int(7)));
        assert!(builder.update(&Map::new(), &key, &converter(), true).is_err());

        let stmt = builder.delete(&key);
        assert_eq!(stmt.sql, "DELETE FROM users WHERE id = ?");
    }

    #[test]
    fn test_upsert() {
        let users = table("users");
        let record = object(json!({"id": 1, "name": "John", "email": "j@x.com"}));
        let stmt = QueryBuilder::new(&users).upsert(&record, &converter()).unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO users (id, name, email) VALUES (?, ?, ?) ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, email = EXCLUDED.email RETURNING *"
        );
    }

    #[test]
    fn test_upsert_key_only_does_nothing() {
        let items = table("order_items");
        let records = vec![
            object(json!({"order_id": 1, "product_id": 2})),
            object(json!({"order_id": 1, "product_id": 3})),
        ];
        let stmt = QueryBuilder::new(&items)
            .bulk_upsert(&records, &converter())
            .unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO order_items (order_id, product_id) VALUES (?, ?), (?, ?) ON CONFLICT (order_id, product_id) DO NOTHING RETURNING *"
        );
    }

    #[test]
    fn test_upsert_requires_primary_key() {
        let stats = table("post_stats");
        let record = object(json!({"post_id": 1}));
        assert!(matches!(
            QueryBuilder::new(&stats).upsert(&record, &converter()),
            Err(Error::ValidationError(_))
        ));
    }

    #[test]
    fn test_composite_key_parsing() {
        let items = table("order_items");
        let parts = parse_composite_key(&items, "1,2").unwrap();
        assert_eq!(parts[0].0.name, "order_id");
        assert_eq!(parts[1].1, "2");

        let err = parse_composite_key(&items, "1").unwrap_err();
        assert!(err.to_string().contains("expected 2"));
        let err = parse_composite_key(&items, "1,2,3").unwrap_err();
        assert!(matches!(err, Error::CompositeKeyMismatch { expected: 2, actual: 3 }));
        assert!(parse_composite_key(&items, "1,").is_err());

        let users = table("users");
        let parts = parse_composite_key(&users, "42").unwrap();
        assert_eq!(parts.len(), 1);

        let key = QueryBuilder::new(&items).key_filter("1,2", &converter()).unwrap();
        assert_eq!(key.to_sql(), " WHERE order_id = ? AND product_id = ?");
        assert_eq!(key.params, vec![SqlValue::Int(1), SqlValue::Int(2)]);
    }

    #[test]
    fn test_composite_key_symmetry() {
        for width in 1..=4 {
            let columns = (0..width)
                .map(|i| ColumnInfo::new(format!("k{i}"), "text").primary_key())
                .collect();
            let table = TableInfo::new("wide", columns);
            let values: Vec<String> = (0..width).map(|i| format!("v{i}")).collect();

            let parsed = parse_composite_key(&table, &encode_key(&values)).unwrap();
            let round: Vec<String> = parsed.into_iter().map(|(_, v)| v).collect();
            assert_eq!(round, values);
        }
    }

    #[test]
    fn test_row_and_record_keys() {
        let items = table("order_items");
        let r = row([
            ("order_id", SqlValue::Int(1)),
            ("product_id", SqlValue::Int(2)),
            ("quantity", SqlValue::Int(5)),
        ]);
        assert_eq!(row_key(&items, &r).as_deref(), Some("1,2"));
        let record = object(json!({"order_id": 1, "product_id": "2"}));
        assert_eq!(record_key(&items, &record).as_deref(), Some("1,2"));
        assert_eq!(record_key(&items, &object(json!({"order_id": 1}))), None);
    }

    #[test]
    fn test_cursor_round_trip() {
        let cursor = encode_cursor("2024-01-01T00:00:00");
        assert_eq!(decode_cursor(&cursor).unwrap(), "2024-01-01T00:00:00");
        assert_eq!(encode_cursor("1"), "MQ==");
        assert!(matches!(decode_cursor("%%%"), Err(Error::InvalidCursor(_))));
    }

    #[test]
    fn test_parse_order() {
        let posts = table("posts");
        let order = parse_order(&posts, "published_at.desc.nullslast,id").unwrap();
        assert_eq!(
            order_by_sql(&order),
            " ORDER BY published_at DESC NULLS LAST, id ASC"
        );
        assert_eq!(order[0].reversed().to_sql(), "published_at ASC NULLS FIRST");
        assert!(matches!(
            parse_order(&posts, "nope.asc"),
            Err(Error::InvalidColumn(_))
        ));
        assert!(matches!(
            parse_order(&posts, "id.sideways"),
            Err(Error::InvalidQueryParam(_))
        ));
    }

    #[test]
    fn test_legacy_order_params() {
        let users = table("users");
        let params = QueryParams::parse("orderBy=name&orderDirection=DESC");
        let order = order_from_params(&users, &params).unwrap();
        assert_eq!(order[0].to_sql(), "name DESC");

        let params = QueryParams::parse("orderBy=name&orderDirection=up");
        assert!(order_from_params(&users, &params).is_err());
        assert!(order_from_params(&users, &QueryParams::new()).unwrap().is_empty());
    }
}
