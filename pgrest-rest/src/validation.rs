//! Request validation: identifier whitelisting, value denylists and
//! table privilege checks.
//!
//! Every identifier that reaches SQL text is an [`Ident`], and an `Ident`
//! can only be obtained by checking a name against the schema snapshot.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use pgrest_common::error::{Error, Result};
use pgrest_common::types::{ColumnInfo, TableInfo};

use crate::backend::{SqlExecutor, SqlValue};
use crate::schema::SchemaSnapshot;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("valid regex"));

static SQL_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(DROP|DELETE|UPDATE|INSERT|CREATE|ALTER|TRUNCATE|UNION|EXEC|EXECUTE)\b")
        .expect("valid regex")
});

const DENIED_SEQUENCES: &[&str] = &[";", "--", "/*", "*/"];
const DENIED_IN_ITEM: &[&str] = &["(", ")", "'", "\\"];

/// A table or column name checked against the schema
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident(String);

impl Ident {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Ident {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Resolve a table name against the snapshot
///
/// # Errors
/// `InvalidTable` for malformed names, `TableNotFound` for unknown ones.
pub fn validate_table<'a>(snapshot: &'a SchemaSnapshot, name: &str) -> Result<&'a TableInfo> {
    if !IDENTIFIER.is_match(name) {
        return Err(Error::InvalidTable(name.to_string()));
    }
    snapshot
        .table(name)
        .ok_or_else(|| Error::TableNotFound(name.to_string()))
}

/// Resolve a column name against a table
///
/// # Errors
/// `InvalidColumn` when the column is not part of the table.
pub fn validate_column<'a>(table: &'a TableInfo, name: &str) -> Result<&'a ColumnInfo> {
    let name = name.trim();
    if !IDENTIFIER.is_match(name) {
        return Err(Error::InvalidColumn(name.to_string()));
    }
    table
        .column(name)
        .ok_or_else(|| Error::InvalidColumn(format!("{name} (table {})", table.name)))
}

/// Identifier for a validated table
pub fn table_ident(table: &TableInfo) -> Ident {
    Ident(table.name.clone())
}

/// Identifier for a column known to belong to `table`
pub fn column_ident(table: &TableInfo, name: &str) -> Result<Ident> {
    validate_column(table, name).map(|c| Ident(c.name.clone()))
}

/// Reject values carrying statement separators, comments or DDL/DML
/// keywords.
///
/// # Errors
/// `UnsafeValue` naming the offending fragment.
pub fn check_value(value: &str) -> Result<()> {
    if let Some(seq) = DENIED_SEQUENCES.iter().find(|s| value.contains(**s)) {
        return Err(Error::UnsafeValue(format!("value contains '{seq}'")));
    }
    if let Some(m) = SQL_KEYWORDS.find(value) {
        return Err(Error::UnsafeValue(format!(
            "value contains SQL keyword '{}'",
            m.as_str().to_uppercase()
        )));
    }
    Ok(())
}

/// Additional check for individual `in.(...)` list items
///
/// # Errors
/// `UnsafeValue` when an item carries grouping or quoting characters.
pub fn check_in_item(item: &str) -> Result<()> {
    check_value(item)?;
    if let Some(seq) = DENIED_IN_ITEM.iter().find(|s| item.contains(**s)) {
        return Err(Error::UnsafeValue(format!("IN list item contains '{seq}'")));
    }
    Ok(())
}

/// Table privilege required by an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    Select,
    Insert,
    Update,
    Delete,
}

impl Privilege {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

/// Check the current role's privilege on `table`.
///
/// A failing privilege query is logged and treated as allowed.
///
/// # Errors
/// `Forbidden` when the database reports the privilege as missing.
pub async fn check_permission(
    executor: &dyn SqlExecutor,
    table: &TableInfo,
    privilege: Privilege,
) -> Result<()> {
    let sql = "SELECT has_table_privilege(?, ?) AS allowed";
    let params = [
        SqlValue::Text(format!("{}.{}", table.schema, table.name)),
        SqlValue::Text(privilege.as_str().to_string()),
    ];
    match executor.query(sql, &params).await {
        Ok(rows) => {
            let allowed = rows
                .first()
                .and_then(|r| r.get("allowed"))
                .map_or(true, |v| !matches!(v, SqlValue::Bool(false)));
            if allowed {
                Ok(())
            } else {
                Err(Error::Forbidden {
                    table: table.name.clone(),
                    privilege: privilege.as_str().to_string(),
                })
            }
        }
        Err(e) => {
            warn!(table = %table.name, error = %e, "permission check failed, allowing access");
            Ok(())
        }
    }
}
