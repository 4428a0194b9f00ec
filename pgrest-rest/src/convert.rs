//! PostgreSQL <-> JSON value conversion
//!
//! Read path: [`TypeConverter::to_json`] turns driver values into JSON, with
//! tagged envelopes for UUID, temporal, BYTEA and composite values.
//! Write path: [`TypeConverter::to_sql_param`] accepts either bare JSON or
//! those envelopes and produces a [`SqlValue`] ready for binding.

use std::net::IpAddr;
use std::sync::Arc;

use base64::Engine;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::warn;
use uuid::Uuid;

use pgrest_common::error::{Error, Result};
use pgrest_common::types::{ColumnType, NetworkType, ScalarType, TableInfo};

use crate::backend::{Row, SqlValue};
use crate::schema::SchemaProvider;

static MAC6: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9A-Fa-f]{2}[:-]){5}[0-9A-Fa-f]{2}$").expect("valid regex"));
static MAC8: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9A-Fa-f]{2}[:-]){7}[0-9A-Fa-f]{2}$").expect("valid regex"));

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Bidirectional converter between PostgreSQL values and JSON
#[derive(Clone)]
pub struct TypeConverter {
    schema: Arc<dyn SchemaProvider>,
}

impl TypeConverter {
    pub fn new(schema: Arc<dyn SchemaProvider>) -> Self {
        Self { schema }
    }

    // ------------------------------------------------------------------
    // Read path
    // ------------------------------------------------------------------

    /// Convert a result row to a JSON object using the table's column types.
    /// Columns missing from the table metadata (computed columns, aliases)
    /// are rendered without type knowledge.
    pub fn row_to_json(&self, row: &Row, table: &TableInfo) -> Map<String, Value> {
        row.iter()
            .map(|(name, value)| {
                let json = match table.column(name) {
                    Some(col) => self.to_json(value, &col.column_type),
                    None => value.to_plain_json(),
                };
                (name.clone(), json)
            })
            .collect()
    }

    /// Convert a single driver value to JSON
    pub fn to_json(&self, value: &SqlValue, ty: &ColumnType) -> Value {
        if value.is_null() {
            return Value::Null;
        }
        match ty {
            ColumnType::Array(inner) => self.array_to_json(value, inner),
            ColumnType::Enum(_) | ColumnType::Network(_) => value.to_plain_json(),
            ColumnType::Composite(name) => match value {
                SqlValue::Text(s) => composite_to_json(name, s),
                other => other.to_plain_json(),
            },
            ColumnType::Scalar(scalar) => scalar_to_json(value, scalar),
        }
    }

    fn array_to_json(&self, value: &SqlValue, inner: &ColumnType) -> Value {
        match value {
            SqlValue::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| match (item, inner) {
                        // multi-dimensional data in a one-dimensional declaration
                        (SqlValue::Array(_), t) if !t.is_array() => self.array_to_json(item, t),
                        _ => self.to_json(item, inner),
                    })
                    .collect(),
            ),
            // driver array access unavailable: fall back to the text literal
            SqlValue::Text(text) => match parse_array_literal(text) {
                Ok(elements) => self.elements_to_json(&elements, inner),
                Err(e) => {
                    warn!(error = %e, "unparsable array literal, passing through");
                    Value::String(text.clone())
                }
            },
            SqlValue::Json(v) => v.clone(),
            other => other.to_plain_json(),
        }
    }

    fn elements_to_json(&self, elements: &[ArrayElement], inner: &ColumnType) -> Value {
        Value::Array(
            elements
                .iter()
                .map(|element| match element {
                    ArrayElement::Null => Value::Null,
                    ArrayElement::Nested(sub) => match inner {
                        ColumnType::Array(deeper) => self.elements_to_json(sub, deeper),
                        other => self.elements_to_json(sub, other),
                    },
                    ArrayElement::Item(text) => {
                        let base = inner.base_element();
                        let value = self
                            .convert_text(text, base)
                            .unwrap_or_else(|_| SqlValue::Text(text.clone()));
                        self.to_json(&value, base)
                    }
                })
                .collect(),
        )
    }

    // ------------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------------

    /// Convert a JSON request value into a bindable parameter
    ///
    /// # Errors
    /// Returns a validation error when the value cannot represent the
    /// column type (bad integer, malformed network address, enum value
    /// outside the declared set).
    pub fn to_sql_param(&self, value: &Value, ty: &ColumnType) -> Result<SqlValue> {
        if value.is_null() {
            return Ok(SqlValue::Null);
        }
        match ty {
            ColumnType::Array(inner) => self.array_param(value, inner),
            ColumnType::Enum(type_name) => self.enum_param(value, type_name),
            ColumnType::Composite(type_name) => self.composite_param(value, type_name),
            ColumnType::Network(kind) => network_param(value, *kind),
            ColumnType::Scalar(scalar) => scalar_param(value, scalar),
        }
    }

    /// Convert URL text (filter values, key parts, cursors) into a parameter
    ///
    /// # Errors
    /// Same conditions as [`TypeConverter::to_sql_param`].
    pub fn convert_text(&self, text: &str, ty: &ColumnType) -> Result<SqlValue> {
        match ty {
            ColumnType::Array(inner) if text.trim_start().starts_with('{') => {
                let elements = parse_array_literal(text)?;
                self.elements_to_param(&elements, inner)
            }
            ColumnType::Scalar(ScalarType::Json | ScalarType::Jsonb) => {
                Ok(serde_json::from_str(text)
                    .map_or_else(|_| SqlValue::Text(text.to_string()), SqlValue::Json))
            }
            _ => self.to_sql_param(&Value::String(text.to_string()), ty),
        }
    }

    fn array_param(&self, value: &Value, inner: &ColumnType) -> Result<SqlValue> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(|item| match (item, inner) {
                    (Value::Array(_), t) if !t.is_array() => self.array_param(item, t),
                    _ => self.to_sql_param(item, inner),
                })
                .collect::<Result<Vec<_>>>()
                .map(SqlValue::Array),
            Value::String(s) if s.trim_start().starts_with('{') => {
                let elements = parse_array_literal(s)?;
                self.elements_to_param(&elements, inner)
            }
            single => Ok(SqlValue::Array(vec![self.to_sql_param(single, inner)?])),
        }
    }

    fn elements_to_param(&self, elements: &[ArrayElement], inner: &ColumnType) -> Result<SqlValue> {
        elements
            .iter()
            .map(|element| match element {
                ArrayElement::Null => Ok(SqlValue::Null),
                ArrayElement::Nested(sub) => match inner {
                    ColumnType::Array(deeper) => self.elements_to_param(sub, deeper),
                    other => self.elements_to_param(sub, other),
                },
                ArrayElement::Item(text) => self.convert_text(text, inner.base_element()),
            })
            .collect::<Result<Vec<_>>>()
            .map(SqlValue::Array)
    }

    fn enum_param(&self, value: &Value, type_name: &str) -> Result<SqlValue> {
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        match self.schema.enum_values(type_name) {
            Ok(Some(allowed)) if !allowed.contains(&text) => {
                return Err(Error::InvalidEnumValue {
                    type_name: type_name.to_string(),
                    value: text,
                });
            }
            Ok(Some(_)) => {}
            Ok(None) => warn!(type_name, "enum values unknown, accepting value unchecked"),
            Err(e) => warn!(type_name, error = %e, "enum lookup failed, accepting value unchecked"),
        }
        Ok(SqlValue::Text(text))
    }

    fn composite_param(&self, value: &Value, type_name: &str) -> Result<SqlValue> {
        let fields: Vec<Value> = match value {
            Value::Array(items) => items.clone(),
            Value::Object(map) if map.get("type").and_then(Value::as_str) == Some("composite") => {
                map.get("fields")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default()
            }
            Value::Object(map) => {
                let definition = self
                    .schema
                    .composite_definition(type_name)?
                    .ok_or_else(|| {
                        Error::ValidationError(format!("Unknown composite type: {type_name}"))
                    })?;
                definition
                    .iter()
                    .map(|(field, _)| map.get(field).cloned().unwrap_or(Value::Null))
                    .collect()
            }
            Value::String(s) => return Ok(SqlValue::Text(s.clone())),
            other => return Ok(SqlValue::Text(other.to_string())),
        };
        Ok(SqlValue::Text(composite_literal(&fields)))
    }
}

// ----------------------------------------------------------------------
// Scalars
// ----------------------------------------------------------------------

fn scalar_to_json(value: &SqlValue, scalar: &ScalarType) -> Value {
    match (scalar, value) {
        (ScalarType::Json | ScalarType::Jsonb, SqlValue::Text(s)) => {
            serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone()))
        }
        (ScalarType::Uuid, SqlValue::Uuid(u)) => uuid_envelope(u),
        (ScalarType::Uuid, SqlValue::Text(s)) => match Uuid::parse_str(s) {
            Ok(u) => uuid_envelope(&u),
            Err(_) => Value::String(s.clone()),
        },
        (ScalarType::Bytea, SqlValue::Bytes(b)) => bytea_envelope(b),
        (ScalarType::Bytea, SqlValue::Text(s)) => match decode_hex_bytea(s) {
            Some(bytes) => bytea_envelope(&bytes),
            None => Value::String(s.clone()),
        },
        (
            ScalarType::Timestamp
            | ScalarType::TimestampTz
            | ScalarType::Date
            | ScalarType::Time
            | ScalarType::Interval,
            v,
        ) => temporal_envelope(scalar, v),
        _ => value.to_plain_json(),
    }
}

fn temporal_kind(scalar: &ScalarType) -> &'static str {
    match scalar {
        ScalarType::Date => "DATE",
        ScalarType::Time => "TIME",
        ScalarType::Interval => "INTERVAL",
        _ => "TIMESTAMP",
    }
}

fn temporal_envelope(scalar: &ScalarType, value: &SqlValue) -> Value {
    let text = value.as_text().unwrap_or_default();
    json!({ "type": temporal_kind(scalar), "value": text })
}

fn uuid_envelope(u: &Uuid) -> Value {
    json!({ "value": u.to_string(), "version": u.get_version_num() })
}

fn bytea_envelope(bytes: &[u8]) -> Value {
    json!({
        "type": "bytea",
        "encoding": "base64",
        "data": base64::engine::general_purpose::STANDARD.encode(bytes),
        "length": bytes.len(),
    })
}

fn decode_hex_bytea(s: &str) -> Option<Vec<u8>> {
    s.strip_prefix("\\x").and_then(|h| hex::decode(h).ok())
}

/// `{"value": ...}` envelopes produced by the read path unwrap to their text
fn envelope_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("value").and_then(Value::as_str).map(str::to_string),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn scalar_param(value: &Value, scalar: &ScalarType) -> Result<SqlValue> {
    match scalar {
        ScalarType::SmallInt | ScalarType::Integer | ScalarType::BigInt => integer_param(value),
        ScalarType::Real | ScalarType::Double => match value {
            Value::Number(n) => n
                .as_f64()
                .map(SqlValue::Float)
                .ok_or_else(|| invalid("number", value)),
            Value::String(s) => s
                .trim()
                .parse()
                .map(SqlValue::Float)
                .map_err(|_| invalid("number", value)),
            _ => Err(invalid("number", value)),
        },
        // kept as text so precision survives; bound with ?::numeric
        ScalarType::Numeric => match value {
            Value::Number(n) => Ok(SqlValue::Text(n.to_string())),
            Value::String(s) if s.trim().parse::<f64>().is_ok() => {
                Ok(SqlValue::Text(s.trim().to_string()))
            }
            _ => Err(invalid("numeric", value)),
        },
        ScalarType::Boolean => boolean_param(value),
        ScalarType::Json | ScalarType::Jsonb => Ok(match value {
            // text is JSON if it parses, otherwise passed through unchanged
            Value::String(s) => {
                serde_json::from_str(s).map_or_else(|_| SqlValue::Text(s.clone()), SqlValue::Json)
            }
            other => SqlValue::Json(other.clone()),
        }),
        ScalarType::Uuid => match envelope_text(value) {
            Some(text) => Ok(Uuid::parse_str(text.trim())
                .map_or_else(|_| SqlValue::Text(text.clone()), SqlValue::Uuid)),
            None => Err(invalid("uuid", value)),
        },
        ScalarType::Bit(_) | ScalarType::VarBit(_) | ScalarType::Xml | ScalarType::Text => {
            Ok(SqlValue::Text(match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }))
        }
        ScalarType::Bytea => bytea_param(value),
        ScalarType::Timestamp
        | ScalarType::TimestampTz
        | ScalarType::Date
        | ScalarType::Time
        | ScalarType::Interval => match envelope_text(value) {
            Some(text) => Ok(parse_temporal(&text, scalar)),
            None => Err(invalid("date/time", value)),
        },
        ScalarType::Other(_) => Ok(match value {
            Value::String(s) => SqlValue::Text(s.clone()),
            Value::Bool(b) => SqlValue::Bool(*b),
            Value::Number(n) => n
                .as_i64()
                .map(SqlValue::Int)
                .or_else(|| n.as_f64().map(SqlValue::Float))
                .unwrap_or(SqlValue::Text(n.to_string())),
            other => SqlValue::Json(other.clone()),
        }),
    }
}

fn invalid(kind: &str, value: &Value) -> Error {
    Error::ValidationError(format!("Invalid {kind} value: {value}"))
}

fn integer_param(value: &Value) -> Result<SqlValue> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(SqlValue::Int)
            .ok_or_else(|| invalid("integer", value)),
        Value::String(s) => s
            .trim()
            .parse()
            .map(SqlValue::Int)
            .map_err(|_| invalid("integer", value)),
        _ => Err(invalid("integer", value)),
    }
}

fn boolean_param(value: &Value) -> Result<SqlValue> {
    match value {
        Value::Bool(b) => Ok(SqlValue::Bool(*b)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "on" | "1" => Ok(SqlValue::Bool(true)),
            "false" | "f" | "no" | "n" | "off" | "0" => Ok(SqlValue::Bool(false)),
            _ => Err(invalid("boolean", value)),
        },
        Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(SqlValue::Bool(false)),
            Some(1) => Ok(SqlValue::Bool(true)),
            _ => Err(invalid("boolean", value)),
        },
        _ => Err(invalid("boolean", value)),
    }
}

fn bytea_param(value: &Value) -> Result<SqlValue> {
    match value {
        Value::String(s) if s.starts_with("\\x") => decode_hex_bytea(s)
            .map(SqlValue::Bytes)
            .ok_or_else(|| invalid("hex bytea", value)),
        Value::String(s) => Ok(SqlValue::Bytes(s.as_bytes().to_vec())),
        Value::Object(map) => map
            .get("data")
            .and_then(Value::as_str)
            .and_then(|d| base64::engine::general_purpose::STANDARD.decode(d).ok())
            .map(SqlValue::Bytes)
            .ok_or_else(|| invalid("bytea", value)),
        _ => Err(invalid("bytea", value)),
    }
}

/// Parse accepted date/time text; unparsable text passes through as text.
fn parse_temporal(text: &str, scalar: &ScalarType) -> SqlValue {
    let text = text.trim();
    let parsed = match scalar {
        ScalarType::Date => parse_naive_datetime(text).map(|dt| SqlValue::Date(dt.date())),
        ScalarType::Time => ["%H:%M:%S%.f", "%H:%M"]
            .iter()
            .find_map(|f| NaiveTime::parse_from_str(text, f).ok())
            .map(SqlValue::Time),
        ScalarType::Timestamp => parse_naive_datetime(text).map(SqlValue::Timestamp),
        ScalarType::TimestampTz => DateTime::parse_from_rfc3339(text)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| parse_naive_datetime(text).map(|dt| dt.and_utc()))
            .map(SqlValue::TimestampTz),
        _ => None,
    };
    parsed.unwrap_or_else(|| SqlValue::Text(text.to_string()))
}

fn parse_naive_datetime(text: &str) -> Option<NaiveDateTime> {
    let trimmed = text.strip_suffix('Z').unwrap_or(text);
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(trimmed, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

// ----------------------------------------------------------------------
// Network types
// ----------------------------------------------------------------------

fn network_param(value: &Value, kind: NetworkType) -> Result<SqlValue> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        other => return Err(invalid(kind.sql_name(), other)),
    };
    if is_valid_network(&text, kind) {
        Ok(SqlValue::Text(text))
    } else {
        Err(invalid(kind.sql_name(), value))
    }
}

/// Format check for inet/cidr/macaddr/macaddr8 text
pub fn is_valid_network(text: &str, kind: NetworkType) -> bool {
    match kind {
        NetworkType::MacAddr => MAC6.is_match(text),
        NetworkType::MacAddr8 => MAC8.is_match(text) || MAC6.is_match(text),
        NetworkType::Inet | NetworkType::Cidr => {
            let (addr, prefix) = match text.split_once('/') {
                Some((a, p)) => (a, Some(p)),
                None => (text, None),
            };
            let Ok(ip) = addr.parse::<IpAddr>() else {
                return false;
            };
            let max_prefix = if ip.is_ipv4() { 32 } else { 128 };
            match prefix {
                Some(p) => p.parse::<u8>().map_or(false, |p| p <= max_prefix),
                None => true,
            }
        }
    }
}

// ----------------------------------------------------------------------
// Array and composite literals
// ----------------------------------------------------------------------

/// Parsed element of a PostgreSQL array literal
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayElement {
    Null,
    Item(String),
    Nested(Vec<ArrayElement>),
}

/// PostgreSQL's own limit on array dimensions
pub const MAX_ARRAY_DIMENSIONS: usize = 6;

/// Parse a PostgreSQL array text literal such as `{a,"b c",{1,2},NULL}`.
///
/// # Errors
/// Returns a validation error for unbalanced braces or quotes, or for more
/// than [`MAX_ARRAY_DIMENSIONS`] levels of nesting.
pub fn parse_array_literal(text: &str) -> Result<Vec<ArrayElement>> {
    let chars: Vec<char> = text.trim().chars().collect();
    if chars.first() != Some(&'{') {
        return Err(Error::ValidationError(format!("Invalid array literal: {text}")));
    }
    let (elements, end) = parse_array_body(&chars, 1, 1, text)?;
    if end != chars.len() {
        return Err(Error::ValidationError(format!("Invalid array literal: {text}")));
    }
    Ok(elements)
}

fn parse_array_body(
    chars: &[char],
    mut pos: usize,
    depth: usize,
    text: &str,
) -> Result<(Vec<ArrayElement>, usize)> {
    let malformed = || Error::ValidationError(format!("Invalid array literal: {text}"));
    if depth > MAX_ARRAY_DIMENSIONS {
        return Err(Error::ValidationError(format!(
            "array literal exceeds {MAX_ARRAY_DIMENSIONS} dimensions"
        )));
    }
    let mut elements = Vec::new();

    pos = skip_whitespace(chars, pos);
    if chars.get(pos) == Some(&'}') {
        return Ok((elements, pos + 1));
    }

    loop {
        pos = skip_whitespace(chars, pos);
        match chars.get(pos) {
            Some('{') => {
                let (nested, next) = parse_array_body(chars, pos + 1, depth + 1, text)?;
                elements.push(ArrayElement::Nested(nested));
                pos = next;
            }
            Some('"') => {
                let mut item = String::new();
                pos += 1;
                loop {
                    match chars.get(pos) {
                        Some('\\') => {
                            item.push(*chars.get(pos + 1).ok_or_else(malformed)?);
                            pos += 2;
                        }
                        Some('"') => {
                            pos += 1;
                            break;
                        }
                        Some(c) => {
                            item.push(*c);
                            pos += 1;
                        }
                        None => return Err(malformed()),
                    }
                }
                elements.push(ArrayElement::Item(item));
            }
            Some(_) => {
                let start = pos;
                while let Some(c) = chars.get(pos) {
                    if *c == ',' || *c == '}' {
                        break;
                    }
                    pos += 1;
                }
                let raw: String = chars[start..pos].iter().collect();
                let raw = raw.trim();
                if raw.eq_ignore_ascii_case("null") {
                    elements.push(ArrayElement::Null);
                } else {
                    elements.push(ArrayElement::Item(raw.to_string()));
                }
            }
            None => return Err(malformed()),
        }

        match chars.get(skip_whitespace(chars, pos)) {
            Some(',') => pos = skip_whitespace(chars, pos) + 1,
            Some('}') => return Ok((elements, skip_whitespace(chars, pos) + 1)),
            _ => return Err(malformed()),
        }
    }
}

fn skip_whitespace(chars: &[char], mut pos: usize) -> usize {
    while chars.get(pos).is_some_and(|c| c.is_whitespace()) {
        pos += 1;
    }
    pos
}

/// Split `(f1,f2,...)` into quote-stripped field texts. Commas are split
/// without nested-paren awareness.
pub fn split_composite(text: &str) -> Vec<String> {
    let inner = text
        .trim()
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .unwrap_or(text);
    if inner.is_empty() {
        return vec![];
    }
    inner
        .split(',')
        .map(|f| {
            let f = f.trim();
            f.strip_prefix('"')
                .and_then(|f| f.strip_suffix('"'))
                .unwrap_or(f)
                .to_string()
        })
        .collect()
}

fn composite_to_json(type_name: &str, text: &str) -> Value {
    let fields: Vec<Value> = split_composite(text)
        .into_iter()
        .map(|f| if f.is_empty() { Value::Null } else { Value::String(f) })
        .collect();
    json!({ "type": "composite", "typeName": type_name, "fields": fields })
}

fn composite_literal(fields: &[Value]) -> String {
    let parts: Vec<String> = fields
        .iter()
        .map(|f| match f {
            Value::Null => String::new(),
            Value::String(s) => quote_composite_field(s),
            other => quote_composite_field(&other.to_string()),
        })
        .collect();
    format!("({})", parts.join(","))
}

fn quote_composite_field(raw: &str) -> String {
    let needs_quotes = raw.is_empty()
        || raw
            .chars()
            .any(|c| matches!(c, ',' | '(' | ')' | '"' | '\\') || c.is_whitespace());
    if needs_quotes {
        format!("\"{}\"", raw.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fixtures::blog_cache;

    fn converter() -> TypeConverter {
        TypeConverter::new(blog_cache())
    }

    fn ty(tag: &str) -> ColumnType {
        ColumnType::parse(tag)
    }

    #[test]
    fn test_array_round_trip() {
        let c = converter();
        let x = SqlValue::Array(vec![SqlValue::Text("sports".into()), SqlValue::Text("music".into())]);
        let json = c.to_json(&x, &ty("text[]"));
        assert_eq!(json, json!(["sports", "music"]));
        assert_eq!(c.to_sql_param(&json, &ty("text[]")).unwrap(), x);
    }

    #[test]
    fn test_multidimensional_array_round_trip() {
        let c = converter();
        let x = SqlValue::Array(vec![
            SqlValue::Array(vec![SqlValue::Int(1), SqlValue::Int(2)]),
            SqlValue::Array(vec![SqlValue::Int(3), SqlValue::Int(4)]),
        ]);
        let json = c.to_json(&x, &ty("integer[][]"));
        assert_eq!(json, json!([[1, 2], [3, 4]]));
        let back = c.to_sql_param(&json, &ty("integer[]")).unwrap();
        assert_eq!(back, x);
        assert_eq!(back.to_pg_literal(), "{{1,2},{3,4}}");
    }

    #[test]
    fn test_array_text_literal_fallback() {
        let c = converter();
        let json = c.to_json(
            &SqlValue::Text(r#"{plain,"with \"quote\"","a,b",NULL}"#.into()),
            &ty("text[]"),
        );
        assert_eq!(json, json!(["plain", "with \"quote\"", "a,b", null]));

        let ints = c.to_json(&SqlValue::Text("{{1,2},{3,4}}".into()), &ty("integer[]"));
        assert_eq!(ints, json!([[1, 2], [3, 4]]));
    }

    #[test]
    fn test_malformed_array_literal() {
        assert!(parse_array_literal("{a,b").is_err());
        assert!(parse_array_literal("a,b").is_err());
        assert_eq!(parse_array_literal("{}").unwrap(), vec![]);
    }

    #[test]
    fn test_array_literal_whitespace() {
        assert_eq!(
            parse_array_literal(r#"{"a" ,b}"#).unwrap(),
            vec![ArrayElement::Item("a".into()), ArrayElement::Item("b".into())]
        );
        assert_eq!(
            parse_array_literal(r#"{ "x y" , { 1 , 2 } }"#).unwrap(),
            vec![
                ArrayElement::Item("x y".into()),
                ArrayElement::Nested(vec![
                    ArrayElement::Item("1".into()),
                    ArrayElement::Item("2".into()),
                ]),
            ]
        );
        assert_eq!(parse_array_literal("{ }").unwrap(), vec![]);
    }

    #[test]
    fn test_array_literal_dimension_limit() {
        let nested = |levels: usize| format!("{}1{}", "{".repeat(levels), "}".repeat(levels));
        assert!(parse_array_literal(&nested(MAX_ARRAY_DIMENSIONS)).is_ok());
        assert!(matches!(
            parse_array_literal(&nested(MAX_ARRAY_DIMENSIONS + 1)),
            Err(Error::ValidationError(_))
        ));
        assert!(matches!(
            parse_array_literal(&nested(20_000)),
            Err(Error::ValidationError(_))
        ));

        let c = converter();
        assert!(c.convert_text(&nested(20_000), &ty("integer[]")).is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let c = converter();
        let doc = json!({"a": [1, 2, {"b": null}]});
        let x = SqlValue::Json(doc.clone());
        let json = c.to_json(&x, &ty("jsonb"));
        assert_eq!(json, doc);
        assert_eq!(c.to_sql_param(&json, &ty("jsonb")).unwrap(), x);
    }

    #[test]
    fn test_json_text_read_and_invalid_passthrough() {
        let c = converter();
        assert_eq!(
            c.to_json(&SqlValue::Text(r#"{"k":1}"#.into()), &ty("json")),
            json!({"k": 1})
        );
        assert_eq!(
            c.to_json(&SqlValue::Text("{not json".into()), &ty("json")),
            json!("{not json")
        );
        assert_eq!(
            c.to_sql_param(&json!("{not json"), &ty("jsonb")).unwrap(),
            SqlValue::Text("{not json".into())
        );
    }

    #[test]
    fn test_uuid_envelope_and_round_trip() {
        let c = converter();
        let u = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let json = c.to_json(&SqlValue::Uuid(u), &ty("uuid"));
        assert_eq!(json["value"], "550e8400-e29b-41d4-a716-446655440000");
        assert_eq!(json["version"], 4);
        assert_eq!(c.to_sql_param(&json, &ty("uuid")).unwrap(), SqlValue::Uuid(u));
        assert_eq!(
            c.to_sql_param(&json!("550e8400-e29b-41d4-a716-446655440000"), &ty("uuid")).unwrap(),
            SqlValue::Uuid(u)
        );
    }

    #[test]
    fn test_timestamp_round_trip() {
        let c = converter();
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        let x = SqlValue::Timestamp(ts);
        let json = c.to_json(&x, &ty("timestamp"));
        assert_eq!(json["type"], "TIMESTAMP");
        assert_eq!(c.to_sql_param(&json, &ty("timestamp")).unwrap(), x);

        let d = SqlValue::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        let json = c.to_json(&d, &ty("date"));
        assert_eq!(json, json!({"type": "DATE", "value": "2024-03-01"}));
        assert_eq!(c.to_sql_param(&json, &ty("date")).unwrap(), d);
    }

    #[test]
    fn test_timestamp_accepted_formats() {
        let c = converter();
        let expected = SqlValue::Timestamp(
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap().and_hms_opt(0, 0, 0).unwrap(),
        );
        for text in ["2024-01-15", "2024-01-15T00:00:00", "2024-01-15T00:00:00Z"] {
            assert_eq!(c.convert_text(text, &ty("timestamp")).unwrap(), expected);
        }
        let tz = c.convert_text("2024-01-15T10:00:00Z", &ty("timestamptz")).unwrap();
        assert!(matches!(tz, SqlValue::TimestampTz(_)));
        assert_eq!(
            c.convert_text("yesterday-ish", &ty("timestamp")).unwrap(),
            SqlValue::Text("yesterday-ish".into())
        );
    }

    #[test]
    fn test_bytea() {
        let c = converter();
        let json = c.to_json(&SqlValue::Bytes(vec![1, 2, 3]), &ty("bytea"));
        assert_eq!(json["length"], 3);
        assert_eq!(json["data"], "AQID");
        assert_eq!(
            c.to_sql_param(&json, &ty("bytea")).unwrap(),
            SqlValue::Bytes(vec![1, 2, 3])
        );
        assert_eq!(
            c.to_sql_param(&json!("\\xdeadbeef"), &ty("bytea")).unwrap(),
            SqlValue::Bytes(vec![0xde, 0xad, 0xbe, 0xef])
        );
    }

    #[test]
    fn test_enum_validation() {
        let c = converter();
        let status = ty("postgres_enum:post_status");
        assert_eq!(
            c.to_sql_param(&json!("draft"), &status).unwrap(),
            SqlValue::Text("draft".into())
        );
        assert!(matches!(
            c.to_sql_param(&json!("deleted"), &status),
            Err(Error::InvalidEnumValue { .. })
        ));
        // unknown enum type: accepted with a warning
        assert!(c.to_sql_param(&json!("x"), &ty("postgres_enum:mystery")).is_ok());
        assert_eq!(c.to_json(&SqlValue::Text("draft".into()), &status), json!("draft"));
    }

    #[test]
    fn test_composite_read_and_write() {
        let c = converter();
        let address = ty("postgres_composite:address");
        let json = c.to_json(&SqlValue::Text(r#"(1 Main St,"Springfield",)"#.into()), &address);
        assert_eq!(json["typeName"], "address");
        assert_eq!(json["fields"], json!(["1 Main St", "Springfield", null]));

        let written = c
            .to_sql_param(&json!({"street": "1 Main St", "city": "Springfield", "zip": "12345"}), &address)
            .unwrap();
        assert_eq!(written, SqlValue::Text(r#"("1 Main St",Springfield,12345)"#.into()));
    }

    #[test]
    fn test_network_validation() {
        assert!(is_valid_network("192.168.0.1", NetworkType::Inet));
        assert!(is_valid_network("10.0.0.0/8", NetworkType::Cidr));
        assert!(is_valid_network("2001:db8::1/64", NetworkType::Inet));
        assert!(!is_valid_network("10.0.0.0/33", NetworkType::Cidr));
        assert!(!is_valid_network("300.1.1.1", NetworkType::Inet));
        assert!(is_valid_network("08:00:2b:01:02:03", NetworkType::MacAddr));
        assert!(is_valid_network("08-00-2b-01-02-03", NetworkType::MacAddr));
        assert!(is_valid_network("08:00:2b:01:02:03:04:05", NetworkType::MacAddr8));
        assert!(!is_valid_network("08:00:2b:01:02", NetworkType::MacAddr));

        let c = converter();
        assert!(c.to_sql_param(&json!("not-an-ip"), &ty("inet")).is_err());
    }

    #[test]
    fn test_scalars() {
        let c = converter();
        assert_eq!(c.convert_text("5", &ty("integer")).unwrap(), SqlValue::Int(5));
        assert!(c.convert_text("five", &ty("integer")).is_err());
        assert_eq!(c.convert_text("t", &ty("boolean")).unwrap(), SqlValue::Bool(true));
        assert_eq!(
            c.convert_text("12.50", &ty("numeric")).unwrap(),
            SqlValue::Text("12.50".into())
        );
        assert_eq!(
            c.convert_text("0101", &ty("bit(4)")).unwrap(),
            SqlValue::Text("0101".into())
        );
    }

    #[test]
    fn test_unknown_type_unchanged() {
        let c = converter();
        let v = SqlValue::Text("POINT(1 2)".into());
        assert_eq!(c.to_json(&v, &ty("geometry")), json!("POINT(1 2)"));
    }
}
