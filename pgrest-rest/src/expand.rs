//! Relationship expansion
//!
//! Embedded select fields are resolved after the primary query. Each
//! relationship costs exactly one extra `IN (...)` query, whatever the
//! number of parent records, and nested relationships recurse on the
//! related rows. Expansion failures are logged and skipped.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use pgrest_common::error::Result;
use pgrest_common::types::{ForeignKeyInfo, TableInfo};

use crate::backend::{SqlExecutor, SqlValue};
use crate::builder::{placeholder, QueryBuilder};
use crate::convert::TypeConverter;
use crate::filter::{like_pattern, FilterExpr, FilterOperator, WhereClause};
use crate::schema::SchemaSnapshot;
use crate::select::SelectField;
use crate::validation::{check_value, column_ident, validate_column};

/// How a relation name connects to the queried table
#[derive(Debug, Clone, Copy)]
pub enum Relationship<'s> {
    /// The queried table holds the foreign key (many-to-one)
    Forward {
        fk: &'s ForeignKeyInfo,
        target: &'s TableInfo,
    },
    /// `source` holds a foreign key pointing at the queried table
    /// (one-to-many)
    Reverse {
        fk: &'s ForeignKeyInfo,
        source: &'s TableInfo,
    },
}

impl<'s> Relationship<'s> {
    /// Classify `name` relative to `table`. Forward keys match on the
    /// referenced table name or on the key column minus its `_id` suffix.
    pub fn resolve(snapshot: &'s SchemaSnapshot, table: &'s TableInfo, name: &str) -> Option<Self> {
        let forward = table.foreign_keys.iter().find(|fk| {
            fk.referenced_table == name || fk.column.strip_suffix("_id") == Some(name)
        });
        if let Some(fk) = forward {
            if let Some(target) = snapshot.table(&fk.referenced_table) {
                return Some(Self::Forward { fk, target });
            }
        }

        snapshot
            .referencing_tables(&table.name)
            .into_iter()
            .find(|(source, _)| source.name == name)
            .map(|(source, fk)| Self::Reverse { fk, source })
    }

    /// Table the related rows come from
    pub fn related_table(&self) -> &'s TableInfo {
        match self {
            Self::Forward { target, .. } => target,
            Self::Reverse { source, .. } => source,
        }
    }

    /// Column of the parent records that carries the join value
    pub fn local_column(&self) -> &'s str {
        match self {
            Self::Forward { fk, .. } => &fk.column,
            Self::Reverse { fk, .. } => &fk.referenced_column,
        }
    }

    /// Column of the related rows matched against the join values
    pub fn remote_column(&self) -> &'s str {
        match self {
            Self::Forward { fk, .. } => &fk.referenced_column,
            Self::Reverse { fk, .. } => &fk.column,
        }
    }

    pub fn is_forward(&self) -> bool {
        matches!(self, Self::Forward { .. })
    }
}

/// Parent-side columns that embedded `fields` need for matching
pub fn relationship_key_columns(
    snapshot: &SchemaSnapshot,
    table: &TableInfo,
    fields: &[SelectField],
) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for field in fields.iter().filter(|f| f.is_embedded()) {
        if let Some(rel) = Relationship::resolve(snapshot, table, &field.name) {
            let local = rel.local_column().to_string();
            if !columns.contains(&local) {
                columns.push(local);
            }
        }
    }
    columns
}

/// Join value of a JSON cell; read-path envelopes key by their `value`
pub fn json_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(map) => map.get("value").and_then(json_key),
        _ => None,
    }
}

type ExpandFuture<'b> = Pin<Box<dyn Future<Output = ()> + Send + 'b>>;

/// Batched relationship expansion over one schema snapshot
pub struct RelationshipExpander<'a> {
    executor: &'a dyn SqlExecutor,
    converter: &'a TypeConverter,
    snapshot: &'a SchemaSnapshot,
}

impl<'a> RelationshipExpander<'a> {
    pub fn new(
        executor: &'a dyn SqlExecutor,
        converter: &'a TypeConverter,
        snapshot: &'a SchemaSnapshot,
    ) -> Self {
        Self {
            executor,
            converter,
            snapshot,
        }
    }

    /// Attach every embedded field of `fields` to `records`
    pub fn expand<'b>(
        &'b self,
        table: &'b TableInfo,
        records: &'b mut [Map<String, Value>],
        fields: &'b [SelectField],
    ) -> ExpandFuture<'b> {
        Box::pin(async move {
            for field in fields.iter().filter(|f| f.is_embedded()) {
                if let Err(e) = self.expand_field(table, records, field).await {
                    warn!(
                        table = %table.name,
                        relation = %field.name,
                        error = %e,
                        "relationship expansion failed, skipping"
                    );
                }
            }
        })
    }

    async fn expand_field(
        &self,
        table: &TableInfo,
        records: &mut [Map<String, Value>],
        field: &SelectField,
    ) -> Result<()> {
        let Some(rel) = Relationship::resolve(self.snapshot, table, &field.name) else {
            debug!(table = %table.name, relation = %field.name, "no relationship found");
            return Ok(());
        };
        if records.is_empty() {
            return Ok(());
        }

        let output = field.output_name().to_string();
        let local = rel.local_column();
        let remote = rel.remote_column();
        let target = rel.related_table();

        let mut seen = HashSet::new();
        let keys: Vec<String> = records
            .iter()
            .filter_map(|r| r.get(local).and_then(json_key))
            .filter(|k| seen.insert(k.clone()))
            .collect();
        if keys.is_empty() {
            attach(records, &output, local, rel.is_forward(), &HashMap::new());
            return Ok(());
        }

        // Columns: requested ones plus whatever matching needs
        let requested = SelectField::column_names(field.children());
        let mut extra: Vec<String> = Vec::new();
        let columns = match &requested {
            None => "*".to_string(),
            Some(cols) => {
                let mut cols: Vec<&str> = cols.clone();
                let mut needed = vec![remote.to_string()];
                needed.extend(relationship_key_columns(
                    self.snapshot,
                    target,
                    field.children(),
                ));
                for column in &needed {
                    if !cols.contains(&column.as_str()) {
                        extra.push(column.clone());
                    }
                }
                cols.extend(extra.iter().map(String::as_str));
                QueryBuilder::new(target).select_clause(Some(cols.as_slice()))?
            }
        };

        let remote_info = validate_column(target, remote)?;
        let remote_ident = column_ident(target, remote)?;
        let params = keys
            .iter()
            .map(|k| self.converter.convert_text(k, &remote_info.column_type))
            .collect::<Result<Vec<_>>>()?;
        let marks = vec![placeholder(&remote_info.column_type); params.len()].join(",");

        let mut filter = WhereClause::new();
        filter.push(format!("{remote_ident} IN ({marks})"), params);
        for (column, raw) in &field.filters {
            let (fragment, bound) = self.embedded_condition(target, column, raw)?;
            filter.push(fragment, bound);
        }

        let statement = QueryBuilder::new(target).select(&columns, &filter, &[], None);
        debug!(sql = %statement.sql, keys = keys.len(), "expanding relationship");
        let rows = self.executor.query(&statement.sql, &statement.params).await?;

        let mut related: Vec<Map<String, Value>> = rows
            .iter()
            .map(|row| self.converter.row_to_json(row, target))
            .collect();
        if field.children().iter().any(SelectField::is_embedded) {
            self.expand(target, &mut related, field.children()).await;
        }

        let mut groups: HashMap<String, Vec<Map<String, Value>>> = HashMap::new();
        for mut item in related {
            let Some(key) = item.get(remote).and_then(json_key) else {
                continue;
            };
            for column in &extra {
                item.remove(column);
            }
            groups.entry(key).or_default().push(item);
        }
        attach(records, &output, local, rel.is_forward(), &groups);
        Ok(())
    }

    /// `column <symbol> ?` for an embedded filter; unknown operators compare
    /// with `=`
    fn embedded_condition(
        &self,
        target: &TableInfo,
        column: &str,
        raw: &str,
    ) -> Result<(String, Vec<SqlValue>)> {
        let info = validate_column(target, column)?;
        let ident = column_ident(target, column)?;
        let expr = FilterExpr::parse(raw);
        check_value(&expr.value)?;

        let (fragment, bound) = if expr.operator == FilterOperator::Like {
            (
                format!("{ident} LIKE ?"),
                vec![SqlValue::Text(like_pattern(&expr.value))],
            )
        } else {
            let symbol = expr.operator.comparison_symbol().unwrap_or("=");
            let value = self.converter.convert_text(&expr.value, &info.column_type)?;
            (
                format!("{ident} {symbol} {}", placeholder(&info.column_type)),
                vec![value],
            )
        };
        let fragment = if expr.negated {
            format!("NOT ({fragment})")
        } else {
            fragment
        };
        Ok((fragment, bound))
    }
}

fn attach(
    records: &mut [Map<String, Value>],
    output: &str,
    local: &str,
    forward: bool,
    groups: &HashMap<String, Vec<Map<String, Value>>>,
) {
    for record in records.iter_mut() {
        let matched = record
            .get(local)
            .and_then(json_key)
            .and_then(|k| groups.get(&k));
        let value = if forward {
            matched
                .and_then(|items| items.first())
                .map_or(Value::Null, |item| Value::Object(item.clone()))
        } else {
            Value::Array(
                matched
                    .map(|items| items.iter().cloned().map(Value::Object).collect())
                    .unwrap_or_default(),
            )
        };
        record.insert(output.to_string(), value);
    }
}
