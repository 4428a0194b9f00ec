//! SQL execution seam
//!
//! The REST layer never talks to a database driver directly. It emits
//! parameterized statements (JDBC-style `?` placeholders) and hands them to
//! a [`SqlExecutor`] supplied by the embedding application.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use pgrest_common::error::Result;

/// A bound parameter or a result cell
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Array(Vec<SqlValue>),
}

/// One result row, keyed by column name
pub type Row = BTreeMap<String, SqlValue>;

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Plain text form of a scalar value, as PostgreSQL would print it.
    /// Used for cursors and relationship keys. `None` for NULL.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(b.to_string()),
            Self::Int(i) => Some(i.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::Text(s) => Some(s.clone()),
            Self::Bytes(b) => Some(format!("\\x{}", hex::encode(b))),
            Self::Json(v) => Some(v.to_string()),
            Self::Uuid(u) => Some(u.to_string()),
            Self::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Self::Time(t) => Some(t.format("%H:%M:%S%.f").to_string()),
            Self::Timestamp(ts) => Some(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            Self::TimestampTz(ts) => Some(ts.to_rfc3339()),
            Self::Array(_) => Some(self.to_pg_literal()),
        }
    }

    /// PostgreSQL text literal for this value. Arrays render recursively as
    /// `{{1,2},{3,4}}` with element quoting; NULL renders as `NULL`.
    pub fn to_pg_literal(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Array(items) => {
                let mut out = String::from("{");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    match item {
                        Self::Array(_) => out.push_str(&item.to_pg_literal()),
                        Self::Null => out.push_str("NULL"),
                        other => out.push_str(&quote_array_element(
                            &other.as_text().unwrap_or_default(),
                        )),
                    }
                }
                out.push('}');
                out
            }
            other => other.as_text().unwrap_or_default(),
        }
    }

    /// JSON rendering without column type knowledge
    pub fn to_plain_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f).map_or(Value::Null, Value::Number),
            Self::Json(v) => v.clone(),
            Self::Bytes(b) => Value::String(base64::engine::general_purpose::STANDARD.encode(b)),
            Self::Array(items) => Value::Array(items.iter().map(Self::to_plain_json).collect()),
            other => other.as_text().map_or(Value::Null, Value::String),
        }
    }
}

fn quote_array_element(raw: &str) -> String {
    let needs_quotes = raw.is_empty()
        || raw.eq_ignore_ascii_case("null")
        || raw
            .chars()
            .any(|c| matches!(c, ',' | '{' | '}' | '"' | '\\') || c.is_whitespace());
    if !needs_quotes {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('"');
    for c in raw.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Database client contract consumed by the REST layer.
///
/// Implementations bind `params` positionally to the `?` placeholders in
/// `sql`. Driver failures are reported as `Error::Sql` carrying the SQLSTATE
/// when the driver exposes one.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Run a statement that returns rows
    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>>;

    /// Run a statement and return the affected row count
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64>;
}

/// SQL text with its positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

type QueryHandler = Box<dyn Fn(&str, &[SqlValue]) -> Result<Vec<Row>> + Send + Sync>;
type ExecuteHandler = Box<dyn Fn(&str, &[SqlValue]) -> Result<u64> + Send + Sync>;

/// Scripted executor for development and tests.
///
/// Responses are registered against SQL substrings; the first registered
/// pattern contained in a statement answers it. Unmatched queries return no
/// rows and unmatched executes affect zero rows. Every statement is logged.
#[derive(Default)]
pub struct RecordingExecutor {
    queries: RwLock<Vec<(String, QueryHandler)>>,
    executes: RwLock<Vec<(String, ExecuteHandler)>>,
    log: Mutex<Vec<Statement>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer queries containing `pattern` with fixed rows
    #[must_use]
    pub fn on_query(self, pattern: &str, rows: Vec<Row>) -> Self {
        self.on_query_with(pattern, move |_, _| Ok(rows.clone()))
    }

    /// Answer queries containing `pattern` with a closure
    #[must_use]
    pub fn on_query_with<F>(self, pattern: &str, handler: F) -> Self
    where
        F: Fn(&str, &[SqlValue]) -> Result<Vec<Row>> + Send + Sync + 'static,
    {
        self.queries
            .write()
            .push((pattern.to_string(), Box::new(handler)));
        self
    }

    /// Answer executes containing `pattern` with a closure
    #[must_use]
    pub fn on_execute_with<F>(self, pattern: &str, handler: F) -> Self
    where
        F: Fn(&str, &[SqlValue]) -> Result<u64> + Send + Sync + 'static,
    {
        self.executes
            .write()
            .push((pattern.to_string(), Box::new(handler)));
        self
    }

    /// All statements seen so far
    pub fn statements(&self) -> Vec<Statement> {
        self.log.lock().clone()
    }

    /// Number of statements whose SQL contains `pattern`
    pub fn count_matching(&self, pattern: &str) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|s| s.sql.contains(pattern))
            .count()
    }

    pub fn statement_count(&self) -> usize {
        self.log.lock().len()
    }

    pub fn clear_log(&self) {
        self.log.lock().clear();
    }

    fn record(&self, sql: &str, params: &[SqlValue]) {
        tracing::debug!(sql, params = params.len(), "recorded statement");
        self.log.lock().push(Statement {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
    }
}

#[async_trait]
impl SqlExecutor for RecordingExecutor {
    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        self.record(sql, params);
        let handlers = self.queries.read();
        match handlers.iter().find(|(pattern, _)| sql.contains(pattern.as_str())) {
            Some((_, handler)) => handler(sql, params),
            None => Ok(vec![]),
        }
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        self.record(sql, params);
        let handlers = self.executes.read();
        match handlers.iter().find(|(pattern, _)| sql.contains(pattern.as_str())) {
            Some((_, handler)) => handler(sql, params),
            None => Ok(0),
        }
    }
}

/// Build a [`Row`] from `(column, value)` pairs
pub fn row<I, K>(cells: I) -> Row
where
    I: IntoIterator<Item = (K, SqlValue)>,
    K: Into<String>,
{
    cells.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// Render a statement with its parameters for log output
pub fn describe(sql: &str, params: &[SqlValue]) -> String {
    let mut out = sql.to_string();
    if !params.is_empty() {
        let _ = write!(out, " -- params: [");
        for (i, p) in params.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(&p.as_text().unwrap_or_else(|| "NULL".to_string()));
        }
        out.push(']');
    }
    out
}
