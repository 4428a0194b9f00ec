//! PostgREST-style filter parsing
//!
//! Turns `column=operator.value` and `or=(...)` query parameters into SQL
//! WHERE fragments with `?` placeholders and a matching parameter list.
//! Column names are whitelisted against the table; values are denylist
//! checked and always bound, never concatenated.

use pgrest_common::error::{Error, Result};
use pgrest_common::types::{ColumnType, TableInfo};

use crate::backend::SqlValue;
use crate::builder::placeholder;
use crate::convert::TypeConverter;
use crate::query::QueryParams;
use crate::select::split_top_level;
use crate::validation::{check_in_item, check_value, column_ident, validate_column, Ident};

/// Filter operators understood in `column=operator.value`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Ilike,
    StartsWith,
    EndsWith,
    In,
    NotIn,
    Is,
    IsNotNull,
    HasKey,
    HasKeys,
    HasAnyKeys,
    JsonContains,
    JsonContained,
    JsonExists,
    JsonPath,
    JsonPathExists,
    ArrayContains,
    ArrayHasAny,
    ArrayHasAll,
    ArrayLength,
    Fts,
    Plfts,
    Wfts,
}

impl FilterOperator {
    /// Case-insensitive keyword lookup, including the documented aliases
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        let op = match keyword.to_ascii_lowercase().as_str() {
            "eq" => Self::Eq,
            "neq" => Self::Neq,
            "gt" => Self::Gt,
            "gte" => Self::Gte,
            "lt" => Self::Lt,
            "lte" => Self::Lte,
            "like" => Self::Like,
            "ilike" => Self::Ilike,
            "startswith" => Self::StartsWith,
            "endswith" => Self::EndsWith,
            "in" => Self::In,
            "notin" => Self::NotIn,
            "is" => Self::Is,
            "isnotnull" => Self::IsNotNull,
            "haskey" => Self::HasKey,
            "haskeys" | "existsall" => Self::HasKeys,
            "hasanykeys" | "existsany" => Self::HasAnyKeys,
            "jsoncontains" | "contains" => Self::JsonContains,
            "jsoncontained" | "containedin" => Self::JsonContained,
            "jsonexists" | "exists" => Self::JsonExists,
            "jsonpath" => Self::JsonPath,
            "jsonpathexists" => Self::JsonPathExists,
            "arraycontains" => Self::ArrayContains,
            "arrayhasany" => Self::ArrayHasAny,
            "arrayhasall" => Self::ArrayHasAll,
            "arraylength" => Self::ArrayLength,
            "fts" => Self::Fts,
            "plfts" => Self::Plfts,
            "wfts" => Self::Wfts,
            _ => return None,
        };
        Some(op)
    }

    /// Binary comparison symbol, for the operators that have one
    pub fn comparison_symbol(self) -> Option<&'static str> {
        match self {
            Self::Eq => Some("="),
            Self::Neq => Some("<>"),
            Self::Gt => Some(">"),
            Self::Gte => Some(">="),
            Self::Lt => Some("<"),
            Self::Lte => Some("<="),
            Self::Like => Some("LIKE"),
            _ => None,
        }
    }
}

/// One parsed `operator.value` expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterExpr {
    pub operator: FilterOperator,
    pub value: String,
    pub negated: bool,
}

impl FilterExpr {
    /// Parse `[not.]operator.value`. Text without a recognized operator is
    /// an equality test against the whole text.
    pub fn parse(raw: &str) -> Self {
        let (negated, rest) = match raw.get(..4) {
            Some(prefix) if prefix.eq_ignore_ascii_case("not.") => (true, &raw[4..]),
            _ => (false, raw),
        };

        let (operator, value) = match rest.split_once('.') {
            Some((keyword, value)) => match FilterOperator::from_keyword(keyword) {
                Some(op) => (op, value),
                None => (FilterOperator::Eq, rest),
            },
            None if rest.eq_ignore_ascii_case("isnotnull") => (FilterOperator::IsNotNull, ""),
            None => (FilterOperator::Eq, rest),
        };

        Self {
            operator,
            value: value.to_string(),
            negated,
        }
    }
}

/// AND-joined WHERE fragments with their bound parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereClause {
    pub fragments: Vec<String>,
    pub params: Vec<SqlValue>,
}

impl WhereClause {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: impl Into<String>, params: Vec<SqlValue>) {
        self.fragments.push(fragment.into());
        self.params.extend(params);
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// ` WHERE a AND b`, or the empty string when there are no conditions
    pub fn to_sql(&self) -> String {
        if self.fragments.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.fragments.join(" AND "))
        }
    }
}

/// Filter parser bound to a type converter
pub struct FilterParser<'a> {
    converter: &'a TypeConverter,
}

impl<'a> FilterParser<'a> {
    pub fn new(converter: &'a TypeConverter) -> Self {
        Self { converter }
    }

    /// Parse every non-reserved, non-embedded parameter into an AND-joined
    /// WHERE clause. Repeated keys yield one condition per value.
    ///
    /// # Errors
    /// `InvalidColumn` for unknown columns, `UnsafeValue` for denied values
    /// and validation errors for malformed operator payloads.
    pub fn parse_filters(&self, params: &QueryParams, table: &TableInfo) -> Result<WhereClause> {
        let mut clause = WhereClause::new();
        for (key, values) in params.filters() {
            for value in values {
                let (fragment, bound) = if key == "or" {
                    self.parse_or_group(value, table)?
                } else {
                    self.parse_condition(table, key, value)?
                };
                clause.push(fragment, bound);
            }
        }
        Ok(clause)
    }

    /// Parse a single `column=expression` pair
    ///
    /// # Errors
    /// Same as [`FilterParser::parse_filters`].
    pub fn parse_condition(
        &self,
        table: &TableInfo,
        column: &str,
        raw: &str,
    ) -> Result<(String, Vec<SqlValue>)> {
        let info = validate_column(table, column)?;
        let ident = column_ident(table, &info.name)?;
        let expr = FilterExpr::parse(raw);
        let (fragment, params) = self.build(&ident, &info.column_type, &expr)?;
        let fragment = if expr.negated {
            format!("NOT ({fragment})")
        } else {
            fragment
        };
        Ok((fragment, params))
    }

    /// `(col.op.value,col2.op.value)` -> `(a OR b)`
    fn parse_or_group(&self, group: &str, table: &TableInfo) -> Result<(String, Vec<SqlValue>)> {
        let trimmed = group.trim();
        let inner = trimmed
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .unwrap_or(trimmed);

        let mut fragments = Vec::new();
        let mut params = Vec::new();
        for condition in split_top_level(inner) {
            let (column, expr) = condition.split_once('.').ok_or_else(|| {
                Error::InvalidFilter(format!("malformed OR condition '{condition}'"))
            })?;
            let (fragment, bound) = self.parse_condition(table, column, expr)?;
            fragments.push(fragment);
            params.extend(bound);
        }
        if fragments.is_empty() {
            return Err(Error::InvalidFilter("empty OR group".to_string()));
        }
        Ok((format!("({})", fragments.join(" OR ")), params))
    }

    fn build(
        &self,
        col: &Ident,
        ty: &ColumnType,
        expr: &FilterExpr,
    ) -> Result<(String, Vec<SqlValue>)> {
        use FilterOperator as Op;

        let value = expr.value.as_str();
        check_value(value)?;

        let built = match expr.operator {
            Op::Eq | Op::Neq | Op::Gt | Op::Gte | Op::Lt | Op::Lte => {
                let symbol = expr.operator.comparison_symbol().unwrap_or("=");
                let param = self.converter.convert_text(value, ty)?;
                (format!("{col} {symbol} {}", placeholder(ty)), vec![param])
            }
            Op::Like | Op::Ilike => {
                let keyword = if expr.operator == Op::Like { "LIKE" } else { "ILIKE" };
                (
                    format!("{col} {keyword} ?"),
                    vec![SqlValue::Text(like_pattern(value))],
                )
            }
            Op::StartsWith => (format!("{col} LIKE ?"), vec![SqlValue::Text(format!("{value}%"))]),
            Op::EndsWith => (format!("{col} LIKE ?"), vec![SqlValue::Text(format!("%{value}"))]),
            Op::In | Op::NotIn => {
                let items = list_items(value);
                if items.is_empty() {
                    return Err(Error::InvalidFilter(format!(
                        "{col}: IN list requires at least one value"
                    )));
                }
                let params = items
                    .iter()
                    .map(|item| {
                        check_in_item(item)?;
                        self.converter.convert_text(item, ty)
                    })
                    .collect::<Result<Vec<_>>>()?;
                let marks = vec![placeholder(ty); params.len()].join(",");
                let keyword = if expr.operator == Op::In { "IN" } else { "NOT IN" };
                (format!("{col} {keyword} ({marks})"), params)
            }
            Op::Is => match value.to_ascii_lowercase().as_str() {
                "null" => (format!("{col} IS NULL"), vec![]),
                "notnull" | "not_null" => (format!("{col} IS NOT NULL"), vec![]),
                "true" => (format!("{col} = ?"), vec![SqlValue::Bool(true)]),
                "false" => (format!("{col} = ?"), vec![SqlValue::Bool(false)]),
                _ => (
                    format!("{col} = {}", placeholder(ty)),
                    vec![self.converter.convert_text(value, ty)?],
                ),
            },
            Op::IsNotNull => (format!("{col} IS NOT NULL"), vec![]),
            Op::HasKey => (
                format!("jsonb_exists({col}, ?)"),
                vec![SqlValue::Text(value.to_string())],
            ),
            Op::HasKeys | Op::HasAnyKeys => {
                let array = quoted_array(value)?;
                let symbol = if expr.operator == Op::HasKeys { "?&" } else { "?|" };
                (format!("{col} {symbol} {array}"), vec![])
            }
            Op::JsonContains | Op::JsonContained => {
                let json: serde_json::Value = serde_json::from_str(value).map_err(|e| {
                    Error::InvalidFilter(format!("{col}: expected a JSON document ({e})"))
                })?;
                let symbol = if expr.operator == Op::JsonContains { "@>" } else { "<@" };
                (format!("{col} {symbol} ?::jsonb"), vec![SqlValue::Json(json)])
            }
            Op::JsonExists => (format!("{col} ? ?"), vec![SqlValue::Text(value.to_string())]),
            Op::JsonPath => (
                format!("{col} @? ?::jsonpath"),
                vec![SqlValue::Text(value.to_string())],
            ),
            Op::JsonPathExists => (
                format!("{col} @@ ?::jsonpath"),
                vec![SqlValue::Text(value.to_string())],
            ),
            Op::ArrayContains => {
                let element = ty.base_element();
                let param = self.converter.convert_text(value, element)?;
                (
                    format!("{col} @> ARRAY[?]::{}[]", element.sql_name()),
                    vec![param],
                )
            }
            Op::ArrayHasAny => {
                let array = quoted_array(value)?;
                (
                    format!("{col} && {array}::{}[]", ty.base_element().sql_name()),
                    vec![],
                )
            }
            Op::ArrayHasAll => {
                let element = ty.base_element();
                let items = list_items(value)
                    .iter()
                    .map(|item| {
                        check_in_item(item)?;
                        self.converter.convert_text(item, element)
                    })
                    .collect::<Result<Vec<_>>>()?;
                (format!("{col} @> ?"), vec![SqlValue::Array(items)])
            }
            Op::ArrayLength => {
                let n: i64 = value.trim().parse().map_err(|_| {
                    Error::InvalidFilter(format!("{col}: arraylength expects an integer"))
                })?;
                (format!("array_length({col},1) = ?"), vec![SqlValue::Int(n)])
            }
            Op::Fts | Op::Plfts | Op::Wfts => {
                let function = match expr.operator {
                    Op::Fts => "plainto_tsquery",
                    Op::Plfts => "phraseto_tsquery",
                    _ => "websearch_to_tsquery",
                };
                (
                    format!("to_tsvector('english', {col}) @@ {function}('english', ?)"),
                    vec![SqlValue::Text(value.to_string())],
                )
            }
        };
        Ok(built)
    }
}

/// PostgREST `*` wildcards, otherwise a substring match
pub fn like_pattern(value: &str) -> String {
    if value.contains('*') {
        value.replace('*', "%")
    } else {
        format!("%{value}%")
    }
}

/// Items of `(a,b)`, `{a,b}`, `[a,b]` or bare `a,b`
fn list_items(value: &str) -> Vec<&str> {
    let trimmed = value.trim();
    let inner = [('(', ')'), ('{', '}'), ('[', ']')]
        .iter()
        .find_map(|(open, close)| trimmed.strip_prefix(*open)?.strip_suffix(*close))
        .unwrap_or(trimmed);
    inner
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect()
}

/// `ARRAY['a','b']` from denylist-checked, quote-escaped items
fn quoted_array(value: &str) -> Result<String> {
    let items = list_items(value);
    if items.is_empty() {
        return Err(Error::InvalidFilter(
            "key list requires at least one value".to_string(),
        ));
    }
    let quoted = items
        .iter()
        .map(|item| {
            check_in_item(item)?;
            Ok(format!("'{}'", item.replace('\'', "''")))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(format!("ARRAY[{}]", quoted.join(",")))
}
