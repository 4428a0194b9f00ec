//! `select=` and legacy `expand=` parsing
//!
//! `select=id,title,author:authors(id,name),comments(*)` becomes a tree of
//! [`SelectField`]s. Embedded fields are relationships that the expander
//! resolves after the primary query.

use std::collections::BTreeMap;

use pgrest_common::error::{Error, Result};

use crate::query::QueryParams;

/// Deepest `relation(...)` nesting accepted before any recursive parsing
pub const MAX_SELECT_NESTING: usize = 32;

/// What a select token refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Wildcard,
    Column,
    /// Relationship with its own sub-selection
    Embedded(Vec<SelectField>),
}

/// One node of a parsed select list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectField {
    pub name: String,
    /// Output key for embedded resources (`alias:relation(...)`)
    pub alias: Option<String>,
    pub kind: FieldKind,
    /// `column -> "operator.value"` filters scoped to this relation
    pub filters: BTreeMap<String, String>,
}

impl SelectField {
    pub fn wildcard() -> Self {
        Self::new("*", FieldKind::Wildcard)
    }

    pub fn column(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Column)
    }

    pub fn embedded(name: impl Into<String>, children: Vec<SelectField>) -> Self {
        Self::new(name, FieldKind::Embedded(children))
    }

    fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            alias: None,
            kind,
            filters: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self.kind, FieldKind::Wildcard)
    }

    pub fn is_embedded(&self) -> bool {
        matches!(self.kind, FieldKind::Embedded(_))
    }

    pub fn children(&self) -> &[SelectField] {
        match &self.kind {
            FieldKind::Embedded(children) => children,
            _ => &[],
        }
    }

    /// Key under which the field appears in the response
    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Plain column names selected among `fields`, or `None` when the
    /// selection is a wildcard (or names no columns at all)
    pub fn column_names(fields: &[SelectField]) -> Option<Vec<&str>> {
        if fields.is_empty() || fields.iter().any(SelectField::is_wildcard) {
            return None;
        }
        let columns: Vec<&str> = fields
            .iter()
            .filter(|f| matches!(f.kind, FieldKind::Column))
            .map(|f| f.name.as_str())
            .collect();
        if columns.is_empty() {
            None
        } else {
            Some(columns)
        }
    }
}

/// Parse a select expression. Blank input selects everything.
///
/// # Errors
/// `InvalidQueryParam` for unbalanced parentheses or empty relation names,
/// `QueryTooComplex` when embedding nests deeper than
/// [`MAX_SELECT_NESTING`].
pub fn parse_select(expr: &str) -> Result<Vec<SelectField>> {
    if expr.trim().is_empty() {
        return Ok(vec![SelectField::wildcard()]);
    }
    check_balanced(expr)?;

    split_top_level(expr)
        .into_iter()
        .map(parse_token)
        .collect()
}

fn parse_token(token: &str) -> Result<SelectField> {
    if token == "*" {
        return Ok(SelectField::wildcard());
    }

    let Some(open) = token.find('(') else {
        return Ok(SelectField::column(token));
    };
    let inner = token[open + 1..]
        .strip_suffix(')')
        .ok_or_else(|| Error::InvalidQueryParam(format!("malformed select token '{token}'")))?;

    let head = token[..open].trim();
    let (alias, name) = match head.split_once(':') {
        Some((alias, name)) => (Some(alias.trim()), name.trim()),
        None => (None, head),
    };
    if name.is_empty() || alias.is_some_and(str::is_empty) {
        return Err(Error::InvalidQueryParam(format!(
            "missing relation name in '{token}'"
        )));
    }

    let mut field = SelectField::embedded(name, parse_select(inner)?);
    if let Some(alias) = alias {
        field = field.with_alias(alias);
    }
    Ok(field)
}

fn check_balanced(expr: &str) -> Result<()> {
    let mut depth: i32 = 0;
    let mut deepest: i32 = 0;
    for c in expr.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            break;
        }
        deepest = deepest.max(depth);
    }
    if usize::try_from(deepest).unwrap_or(usize::MAX) > MAX_SELECT_NESTING {
        return Err(Error::QueryTooComplex(format!(
            "select nests {deepest} levels, maximum is {MAX_SELECT_NESTING}"
        )));
    }
    if depth == 0 {
        Ok(())
    } else {
        Err(Error::InvalidQueryParam(format!(
            "unbalanced parentheses in select '{expr}'"
        )))
    }
}

/// Split on commas outside parentheses, trimming and dropping empty parts
pub fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(s[start..].trim());
    parts.retain(|p| !p.is_empty());
    parts
}

/// Legacy `expand=authors,comments(id,content)`: every token is a
/// relationship, bare names select all related columns
///
/// # Errors
/// Same as [`parse_select`].
pub fn parse_expand(expr: &str) -> Result<Vec<SelectField>> {
    if expr.trim().is_empty() {
        return Ok(vec![]);
    }
    Ok(parse_select(expr)?
        .into_iter()
        .filter(|f| !f.is_wildcard())
        .map(|f| match f.kind {
            FieldKind::Column => SelectField::embedded(f.name, vec![SelectField::wildcard()]),
            _ => f,
        })
        .collect())
}

/// Attach `relation.column=operator.value` parameters to the matching
/// embedded fields. `relation.child.column` descends one level per segment.
pub fn attach_embedded_filters(fields: &mut [SelectField], params: &QueryParams) {
    for (relation, column, values) in params.embedded_filters() {
        if let Some(value) = values.first() {
            attach(fields, relation, column, value);
        }
    }
}

fn attach(fields: &mut [SelectField], relation: &str, column: &str, value: &str) {
    let Some(field) = fields
        .iter_mut()
        .find(|f| f.is_embedded() && (f.output_name() == relation || f.name == relation))
    else {
        return;
    };
    match column.split_once('.') {
        Some((child, rest)) => {
            if let FieldKind::Embedded(children) = &mut field.kind {
                attach(children, child, rest, value);
            }
        }
        None => {
            field
                .filters
                .entry(column.to_string())
                .or_insert_with(|| value.to_string());
        }
    }
}
