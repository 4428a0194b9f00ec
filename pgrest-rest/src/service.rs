//! Request service
//!
//! Runs one REST operation end to end: validation, parsing, complexity
//! check, statement assembly, execution, conversion and expansion.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use pgrest_common::config::PgRestConfig;
use pgrest_common::error::{Error, Result};
use pgrest_common::types::{
    CursorResponse, Edge, ListResponse, PageInfo, PaginationInfo, TableInfo,
};

use crate::backend::{describe, Row, SqlExecutor, SqlValue, Statement};
use crate::builder::{
    decode_cursor, encode_cursor, order_from_params, placeholder, record_key, OrderClause,
    QueryBuilder, SortDirection,
};
use crate::complexity::QueryComplexityAnalyzer;
use crate::constraint::map_database_error;
use crate::convert::TypeConverter;
use crate::expand::{relationship_key_columns, RelationshipExpander};
use crate::filter::FilterParser;
use crate::query::{CursorRequest, PageRequest, QueryParams};
use crate::schema::{SchemaProvider, SchemaSnapshot};
use crate::select::{attach_embedded_filters, parse_expand, parse_select, SelectField};
use crate::validation::{check_permission, column_ident, validate_table, Privilege};

/// Columns and relationships to read for one request
struct ReadPlan {
    fields: Vec<SelectField>,
    columns: String,
    /// Selected only for matching or cursors; removed from the output
    extra: Vec<String>,
}

/// PostgREST-style operations over a schema and an executor
pub struct RestService {
    config: PgRestConfig,
    schema: Arc<dyn SchemaProvider>,
    executor: Arc<dyn SqlExecutor>,
    converter: TypeConverter,
    analyzer: QueryComplexityAnalyzer,
}

impl RestService {
    pub fn new(
        config: PgRestConfig,
        schema: Arc<dyn SchemaProvider>,
        executor: Arc<dyn SqlExecutor>,
    ) -> Self {
        Self {
            converter: TypeConverter::new(schema.clone()),
            analyzer: QueryComplexityAnalyzer::new(config.complexity.clone()),
            config,
            schema,
            executor,
        }
    }

    pub fn config(&self) -> &PgRestConfig {
        &self.config
    }

    pub fn schema(&self) -> &Arc<dyn SchemaProvider> {
        &self.schema
    }

    /// Drop cached schema metadata
    pub fn invalidate_schema(&self) {
        self.schema.invalidate();
    }

    /// List rows, using cursor pagination when any cursor parameter is
    /// present and offset pagination otherwise
    ///
    /// # Errors
    /// See [`RestService::list`] and [`RestService::list_cursor`].
    pub async fn read(&self, table: &str, params: &QueryParams) -> Result<Value> {
        if params.has_cursor_params() {
            Ok(serde_json::to_value(self.list_cursor(table, params).await?)?)
        } else {
            Ok(serde_json::to_value(self.list(table, params).await?)?)
        }
    }

    /// Offset-paginated list with a total count
    ///
    /// # Errors
    /// Validation errors for the table, parameters or limits; database
    /// errors from the executor.
    pub async fn list(&self, name: &str, params: &QueryParams) -> Result<ListResponse> {
        let snapshot = self.schema.snapshot()?;
        let table = validate_table(&snapshot, name)?;
        self.authorize(table, Privilege::Select).await?;

        let page = PageRequest::from_params(params, &self.config.limits)?;
        let plan = self.plan_read(&snapshot, table, params, &[])?;
        let filter = FilterParser::new(&self.converter).parse_filters(params, table)?;
        let order = order_from_params(table, params)?;

        let builder = QueryBuilder::new(table);
        let total = self.count(&builder.count(&filter)).await?;
        let rows = self
            .fetch(&builder.select(&plan.columns, &filter, &order, Some(page)))
            .await?;
        let data: Vec<Value> = self
            .materialize(&snapshot, table, &rows, &plan)
            .await
            .into_iter()
            .map(Value::Object)
            .collect();

        let has_more = (page.offset + data.len()) < usize::try_from(total).unwrap_or(usize::MAX);
        Ok(ListResponse {
            data,
            pagination: PaginationInfo {
                offset: page.offset,
                limit: page.limit,
                total,
                has_more,
            },
        })
    }

    /// Cursor-paginated (connection style) list
    ///
    /// The order column is the first `order`/`orderBy` column, or the first
    /// primary key column. `n + 1` rows are fetched to detect further pages.
    ///
    /// # Errors
    /// `InvalidCursor` for undecodable cursors, plus the [`RestService::list`]
    /// errors.
    pub async fn list_cursor(&self, name: &str, params: &QueryParams) -> Result<CursorResponse> {
        let snapshot = self.schema.snapshot()?;
        let table = validate_table(&snapshot, name)?;
        self.authorize(table, Privilege::Select).await?;

        let cursor = CursorRequest::from_params(params, &self.config.limits)?;
        let order = cursor_order(table, params)?;
        let order_column = order.column.as_str().to_string();
        let plan = self.plan_read(&snapshot, table, params, &[order_column.clone()])?;
        let filter = FilterParser::new(&self.converter).parse_filters(params, table)?;

        let column_type = &table
            .column(&order_column)
            .ok_or_else(|| Error::InvalidColumn(order_column.clone()))?
            .column_type;
        let ascending = order.direction == SortDirection::Asc;

        let mut window = filter.clone();
        if let Some(after) = &cursor.after {
            let value = self.converter.convert_text(&decode_cursor(after)?, column_type)?;
            let op = if ascending { ">" } else { "<" };
            window.push(
                format!("{} {op} {}", order.column, placeholder(column_type)),
                vec![value],
            );
        }
        if let Some(before) = &cursor.before {
            let value = self.converter.convert_text(&decode_cursor(before)?, column_type)?;
            let op = if ascending { "<" } else { ">" };
            window.push(
                format!("{} {op} {}", order.column, placeholder(column_type)),
                vec![value],
            );
        }

        let backward = cursor.is_backward();
        let size = cursor.page_size(&self.config.limits);
        let query_order = if backward { order.reversed() } else { order.clone() };

        let builder = QueryBuilder::new(table);
        let total = self.count(&builder.count(&filter)).await?;
        let mut rows = self
            .fetch(&builder.select(
                &plan.columns,
                &window,
                &[query_order],
                Some(PageRequest {
                    offset: 0,
                    limit: size + 1,
                }),
            ))
            .await?;

        let has_extra = rows.len() > size;
        rows.truncate(size);
        if backward {
            rows.reverse();
        }

        let cursors: Vec<String> = rows
            .iter()
            .map(|row| {
                encode_cursor(
                    &row.get(&order_column)
                        .and_then(SqlValue::as_text)
                        .unwrap_or_default(),
                )
            })
            .collect();
        let records = self.materialize(&snapshot, table, &rows, &plan).await;
        let edges: Vec<Edge> = records
            .into_iter()
            .zip(cursors)
            .map(|(node, cursor)| Edge {
                node: Value::Object(node),
                cursor,
            })
            .collect();

        let (has_next_page, has_previous_page) = if backward {
            (cursor.before.is_some(), has_extra)
        } else {
            (has_extra, cursor.after.is_some())
        };
        Ok(CursorResponse {
            page_info: PageInfo {
                has_next_page,
                has_previous_page,
                start_cursor: edges.first().map(|e| e.cursor.clone()),
                end_cursor: edges.last().map(|e| e.cursor.clone()),
            },
            edges,
            total_count: total,
        })
    }

    /// Read one row by (composite) key
    ///
    /// # Errors
    /// `ResourceNotFound` when no row matches, key parsing errors otherwise.
    pub async fn get(&self, name: &str, key: &str, params: &QueryParams) -> Result<Value> {
        let snapshot = self.schema.snapshot()?;
        let table = validate_table(&snapshot, name)?;
        self.authorize(table, Privilege::Select).await?;

        let plan = self.plan_read(&snapshot, table, params, &[])?;
        let builder = QueryBuilder::new(table);
        let key_filter = builder.key_filter(key, &self.converter)?;
        let rows = self
            .fetch(&builder.select(&plan.columns, &key_filter, &[], None))
            .await?;
        let first: Vec<Row> = rows.into_iter().take(1).collect();
        self.materialize(&snapshot, table, &first, &plan)
            .await
            .pop()
            .map(Value::Object)
            .ok_or(Error::ResourceNotFound)
    }

    /// Insert an object, or an array of objects in one statement
    ///
    /// # Errors
    /// Validation errors for the body, mapped constraint violations.
    pub async fn create(&self, name: &str, body: Value) -> Result<Value> {
        let snapshot = self.schema.snapshot()?;
        let table = writable_table(&snapshot, name)?;
        self.authorize(table, Privilege::Insert).await?;

        let (records, single) = records_from_body(body)?;
        let builder = QueryBuilder::new(table);
        let returning = self.config.database.supports_returning;
        let statement = if single {
            builder.insert(&records[0], &self.converter, returning)?
        } else {
            builder.bulk_insert(&records, &self.converter, returning)?
        };

        let created = if returning {
            let rows = self.fetch(&statement).await?;
            self.rows_to_json(table, &rows)
        } else {
            self.apply(&statement).await?;
            let mut created = Vec::with_capacity(records.len());
            for record in &records {
                created.push(self.reread(table, record).await?);
            }
            created
        };
        Ok(shape(created, single))
    }

    /// Key-scoped update returning the new row
    ///
    /// # Errors
    /// `ResourceNotFound` when no row matches the key.
    pub async fn update(&self, name: &str, key: &str, body: Value) -> Result<Value> {
        let snapshot = self.schema.snapshot()?;
        let table = writable_table(&snapshot, name)?;
        self.authorize(table, Privilege::Update).await?;

        let Value::Object(record) = body else {
            return Err(Error::ValidationError(
                "Request body must be a JSON object".to_string(),
            ));
        };
        let builder = QueryBuilder::new(table);
        let key_filter = builder.key_filter(key, &self.converter)?;
        let returning = self.config.database.supports_returning;
        let statement = builder.update(&record, &key_filter, &self.converter, returning)?;

        if returning {
            let rows = self.fetch(&statement).await?;
            return self
                .rows_to_json(table, &rows)
                .into_iter()
                .next()
                .map(Value::Object)
                .ok_or(Error::ResourceNotFound);
        }

        if self.apply(&statement).await? == 0 {
            return Err(Error::ResourceNotFound);
        }
        // the key may have been rewritten by the update itself
        let current_key = record_key(table, &record).unwrap_or_else(|| key.to_string());
        let key_filter = builder.key_filter(&current_key, &self.converter)?;
        let rows = self
            .fetch(&builder.select("*", &key_filter, &[], None))
            .await?;
        self.rows_to_json(table, &rows)
            .into_iter()
            .next()
            .map(Value::Object)
            .ok_or(Error::ResourceNotFound)
    }

    /// Key-scoped delete, returning the affected row count
    ///
    /// # Errors
    /// `ResourceNotFound` when no row matches the key.
    pub async fn delete(&self, name: &str, key: &str) -> Result<u64> {
        let snapshot = self.schema.snapshot()?;
        let table = writable_table(&snapshot, name)?;
        self.authorize(table, Privilege::Delete).await?;

        let builder = QueryBuilder::new(table);
        let key_filter = builder.key_filter(key, &self.converter)?;
        let affected = self.apply(&builder.delete(&key_filter)).await?;
        if affected == 0 {
            return Err(Error::ResourceNotFound);
        }
        Ok(affected)
    }

    /// Insert-or-update on the primary key, for an object or an array
    ///
    /// # Errors
    /// Validation errors for the body or a keyless table, mapped constraint
    /// violations.
    pub async fn upsert(&self, name: &str, body: Value) -> Result<Value> {
        let snapshot = self.schema.snapshot()?;
        let table = writable_table(&snapshot, name)?;
        self.authorize(table, Privilege::Insert).await?;
        self.authorize(table, Privilege::Update).await?;

        let (records, single) = records_from_body(body)?;
        let statement = QueryBuilder::new(table).bulk_upsert(&records, &self.converter)?;
        let rows = self.fetch(&statement).await?;
        Ok(shape(self.rows_to_json(table, &rows), single))
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    async fn authorize(&self, table: &TableInfo, privilege: Privilege) -> Result<()> {
        if self.config.database.check_permissions {
            check_permission(self.executor.as_ref(), table, privilege).await
        } else {
            Ok(())
        }
    }

    fn plan_read(
        &self,
        snapshot: &SchemaSnapshot,
        table: &TableInfo,
        params: &QueryParams,
        required: &[String],
    ) -> Result<ReadPlan> {
        let mut fields = parse_select(params.get("select").unwrap_or(""))?;
        if let Some(expand) = params.get("expand") {
            for field in parse_expand(expand)? {
                if !fields
                    .iter()
                    .any(|f| f.is_embedded() && f.output_name() == field.output_name())
                {
                    fields.push(field);
                }
            }
        }
        attach_embedded_filters(&mut fields, params);
        self.analyzer.check(&fields, params)?;

        let mut needed = relationship_key_columns(snapshot, table, &fields);
        needed.extend(required.iter().cloned());

        let builder = QueryBuilder::new(table);
        let mut extra = Vec::new();
        let columns = match SelectField::column_names(&fields) {
            None => "*".to_string(),
            Some(mut columns) => {
                for column in &needed {
                    if !columns.contains(&column.as_str()) && !extra.contains(column) {
                        extra.push(column.clone());
                    }
                }
                columns.extend(extra.iter().map(String::as_str));
                builder.select_clause(Some(columns.as_slice()))?
            }
        };

        Ok(ReadPlan {
            fields,
            columns,
            extra,
        })
    }

    async fn materialize(
        &self,
        snapshot: &SchemaSnapshot,
        table: &TableInfo,
        rows: &[Row],
        plan: &ReadPlan,
    ) -> Vec<Map<String, Value>> {
        let mut records = self.rows_to_json(table, rows);
        RelationshipExpander::new(self.executor.as_ref(), &self.converter, snapshot)
            .expand(table, &mut records, &plan.fields)
            .await;
        for record in &mut records {
            for column in &plan.extra {
                record.remove(column);
            }
        }
        records
    }

    fn rows_to_json(&self, table: &TableInfo, rows: &[Row]) -> Vec<Map<String, Value>> {
        rows.iter()
            .map(|row| self.converter.row_to_json(row, table))
            .collect()
    }

    /// Re-read an inserted record by key when `RETURNING` is unavailable
    async fn reread(&self, table: &TableInfo, record: &Map<String, Value>) -> Result<Map<String, Value>> {
        let Some(key) = record_key(table, record) else {
            return Ok(record.clone());
        };
        let builder = QueryBuilder::new(table);
        let key_filter = builder.key_filter(&key, &self.converter)?;
        let rows = self
            .fetch(&builder.select("*", &key_filter, &[], None))
            .await?;
        Ok(self
            .rows_to_json(table, &rows)
            .into_iter()
            .next()
            .unwrap_or_else(|| record.clone()))
    }

    async fn count(&self, statement: &Statement) -> Result<u64> {
        let rows = self.fetch(statement).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get("count"))
            .and_then(|value| match value {
                SqlValue::Int(n) => u64::try_from(*n).ok(),
                other => other.as_text().and_then(|t| t.parse().ok()),
            })
            .unwrap_or(0))
    }

    async fn fetch(&self, statement: &Statement) -> Result<Vec<Row>> {
        debug!(sql = %describe(&statement.sql, &statement.params), "query");
        self.executor
            .query(&statement.sql, &statement.params)
            .await
            .map_err(map_database_error)
    }

    async fn apply(&self, statement: &Statement) -> Result<u64> {
        debug!(sql = %describe(&statement.sql, &statement.params), "execute");
        self.executor
            .execute(&statement.sql, &statement.params)
            .await
            .map_err(map_database_error)
    }
}

/// First requested order column, or the first primary key column ascending
fn cursor_order(table: &TableInfo, params: &QueryParams) -> Result<OrderClause> {
    if let Some(order) = order_from_params(table, params)?.into_iter().next() {
        return Ok(order);
    }
    let pk = table.primary_key_columns();
    let first = pk.first().ok_or_else(|| {
        Error::ValidationError(format!(
            "Cursor pagination on {} requires an order column",
            table.name
        ))
    })?;
    Ok(OrderClause {
        column: column_ident(table, &first.name)?,
        direction: SortDirection::Asc,
        nulls: None,
    })
}

fn writable_table<'s>(snapshot: &'s SchemaSnapshot, name: &str) -> Result<&'s TableInfo> {
    let table = validate_table(snapshot, name)?;
    if table.is_view {
        return Err(Error::ValidationError(format!(
            "{name} is a view and cannot be modified"
        )));
    }
    Ok(table)
}

/// Split a body into records; `true` when it was a single object
fn records_from_body(body: Value) -> Result<(Vec<Map<String, Value>>, bool)> {
    match body {
        Value::Object(record) => Ok((vec![record], true)),
        Value::Array(items) if !items.is_empty() => {
            let records = items
                .into_iter()
                .map(|item| match item {
                    Value::Object(record) => Ok(record),
                    _ => Err(Error::ValidationError(
                        "Every array element must be a JSON object".to_string(),
                    )),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok((records, false))
        }
        Value::Array(_) => Err(Error::ValidationError("Empty array body".to_string())),
        _ => Err(Error::ValidationError(
            "Request body must be a JSON object or array".to_string(),
        )),
    }
}

fn shape(mut records: Vec<Map<String, Value>>, single: bool) -> Value {
    if single {
        records.pop().map_or(Value::Null, Value::Object)
    } else {
        Value::Array(records.into_iter().map(Value::Object).collect())
    }
}

impl std::fmt::Debug for RestService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
