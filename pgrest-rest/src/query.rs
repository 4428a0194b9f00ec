//! Query string parameters and pagination requests

use std::collections::BTreeMap;

use pgrest_common::config::LimitsConfig;
use pgrest_common::error::{Error, Result};

/// Control parameters that are never interpreted as column filters
pub const RESERVED_PARAMS: &[&str] = &[
    "select",
    "order",
    "orderBy",
    "orderDirection",
    "limit",
    "offset",
    "page",
    "size",
    "expand",
    "first",
    "after",
    "last",
    "before",
    "count",
];

/// Multi-valued query parameters, in key order
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    params: BTreeMap<String, Vec<String>>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw (url-encoded) query string
    pub fn parse(query_string: &str) -> Self {
        Self::from_pairs(url::form_urlencoded::parse(query_string.as_bytes()).into_owned())
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut params = Self::new();
        for (k, v) in pairs {
            params.insert(k, v);
        }
        params
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.entry(key.into()).or_default().push(value.into());
    }

    /// First value for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    pub fn get_all(&self, key: &str) -> &[String] {
        self.params.get(key).map_or(&[], Vec::as_slice)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.params.iter()
    }

    pub fn is_reserved(key: &str) -> bool {
        RESERVED_PARAMS.contains(&key)
    }

    /// `column -> values` pairs that are plain filters (including `or`)
    pub fn filters(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.params
            .iter()
            .filter(|(k, _)| !Self::is_reserved(k) && !k.contains('.'))
    }

    /// `relation.column -> values` pairs scoped to embedded resources
    pub fn embedded_filters(&self) -> impl Iterator<Item = (&str, &str, &Vec<String>)> {
        self.params.iter().filter_map(|(k, v)| {
            if Self::is_reserved(k) {
                return None;
            }
            k.split_once('.').map(|(rel, col)| (rel, col, v))
        })
    }

    pub fn has_cursor_params(&self) -> bool {
        ["first", "after", "last", "before"]
            .iter()
            .any(|k| self.contains(k))
    }

    /// Parse a non-negative integer parameter
    ///
    /// # Errors
    /// `InvalidQueryParam` when present but not a non-negative integer.
    pub fn usize_param(&self, key: &str) -> Result<Option<usize>> {
        self.get(key)
            .map(|v| {
                v.trim()
                    .parse()
                    .map_err(|_| Error::InvalidQueryParam(format!("{key} must be a non-negative integer")))
            })
            .transpose()
    }
}

/// Offset pagination window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
}

impl PageRequest {
    /// Resolve `limit`/`offset` (or zero-based `page`/`size`) within bounds
    ///
    /// # Errors
    /// `ValidationError` when the window is out of the configured bounds.
    pub fn from_params(params: &QueryParams, limits: &LimitsConfig) -> Result<Self> {
        let limit = match params.usize_param("limit")? {
            Some(l) => l,
            None => params.usize_param("size")?.unwrap_or(limits.default_limit),
        };
        if limit == 0 || limit > limits.max_limit {
            return Err(Error::ValidationError(format!(
                "limit must be between 1 and {}",
                limits.max_limit
            )));
        }

        let offset = match params.usize_param("offset")? {
            Some(o) => o,
            None => params
                .usize_param("page")?
                .map_or(0, |page| page.saturating_mul(limit)),
        };
        if offset > limits.max_offset {
            return Err(Error::ValidationError(format!(
                "offset must not exceed {}",
                limits.max_offset
            )));
        }

        Ok(Self { offset, limit })
    }
}

/// Connection-style cursor window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorRequest {
    pub first: Option<usize>,
    pub after: Option<String>,
    pub last: Option<usize>,
    pub before: Option<String>,
}

impl CursorRequest {
    /// # Errors
    /// `ValidationError` when `first`/`last` are both set or out of bounds.
    pub fn from_params(params: &QueryParams, limits: &LimitsConfig) -> Result<Self> {
        let first = params.usize_param("first")?;
        let last = params.usize_param("last")?;
        if first.is_some() && last.is_some() {
            return Err(Error::ValidationError(
                "first and last cannot be combined".to_string(),
            ));
        }
        for n in [first, last].into_iter().flatten() {
            if n == 0 || n > limits.max_limit {
                return Err(Error::ValidationError(format!(
                    "page size must be between 1 and {}",
                    limits.max_limit
                )));
            }
        }
        Ok(Self {
            first,
            after: params.get("after").map(str::to_string),
            last,
            before: params.get("before").map(str::to_string),
        })
    }

    /// Whether the window walks backwards from `before`/the end
    pub fn is_backward(&self) -> bool {
        self.last.is_some() || (self.before.is_some() && self.first.is_none())
    }

    pub fn page_size(&self, limits: &LimitsConfig) -> usize {
        self.first.or(self.last).unwrap_or(limits.default_limit)
    }
}
