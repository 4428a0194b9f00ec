//! Common types for the pgrest REST layer

use serde::{Deserialize, Serialize};

// ============================================================================
// Database Types
// ============================================================================

/// Table metadata from schema introspection.
///
/// Snapshots are immutable once built; a schema refresh produces new ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableInfo {
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
    pub is_view: bool,
}

impl TableInfo {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnInfo>) -> Self {
        Self {
            schema: "public".to_string(),
            name: name.into(),
            columns,
            foreign_keys: vec![],
            is_view: false,
        }
    }

    #[must_use]
    pub fn with_foreign_key(
        mut self,
        column: &str,
        referenced_table: &str,
        referenced_column: &str,
    ) -> Self {
        self.foreign_keys.push(ForeignKeyInfo {
            name: format!("{}_{}_fkey", self.name, column),
            column: column.to_string(),
            referenced_table: referenced_table.to_string(),
            referenced_column: referenced_column.to_string(),
        });
        self
    }

    #[must_use]
    pub fn as_view(mut self) -> Self {
        self.is_view = true;
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Primary key columns in declaration order
    pub fn primary_key_columns(&self) -> Vec<&ColumnInfo> {
        self.columns.iter().filter(|c| c.is_primary_key).collect()
    }
}

/// Column metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Raw catalog type tag, e.g. `integer`, `text[]`, `postgres_enum:mood`
    pub data_type: String,
    /// Classified form of `data_type`
    pub column_type: ColumnType,
    pub is_nullable: bool,
    pub is_primary_key: bool,
    pub has_default: bool,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        let data_type = data_type.into();
        Self {
            name: name.into(),
            column_type: ColumnType::parse(&data_type),
            data_type,
            is_nullable: true,
            is_primary_key: false,
            has_default: false,
        }
    }

    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.is_nullable = false;
        self
    }

    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }

    #[must_use]
    pub fn with_default(mut self) -> Self {
        self.has_default = true;
        self
    }
}

/// Foreign key relationship (single column)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKeyInfo {
    pub name: String,
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

// ============================================================================
// Column Type Classification
// ============================================================================

/// PostgreSQL column type, classified once when the schema is loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Scalar(ScalarType),
    Array(Box<ColumnType>),
    Enum(String),
    Composite(String),
    Network(NetworkType),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarType {
    SmallInt,
    Integer,
    BigInt,
    Numeric,
    Real,
    Double,
    Boolean,
    Text,
    Json,
    Jsonb,
    Uuid,
    Bit(Option<u32>),
    VarBit(Option<u32>),
    Bytea,
    Xml,
    Timestamp,
    TimestampTz,
    Date,
    Time,
    Interval,
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkType {
    Inet,
    Cidr,
    MacAddr,
    MacAddr8,
}

pub const ENUM_TAG_PREFIX: &str = "postgres_enum:";
pub const COMPOSITE_TAG_PREFIX: &str = "postgres_composite:";

impl ColumnType {
    /// Classify a catalog type tag. Unknown tags become `Scalar(Other)`.
    pub fn parse(tag: &str) -> Self {
        let tag = tag.trim();
        if let Some(name) = tag.strip_prefix(ENUM_TAG_PREFIX) {
            return Self::Enum(name.to_string());
        }
        if let Some(name) = tag.strip_prefix(COMPOSITE_TAG_PREFIX) {
            return Self::Composite(name.to_string());
        }

        let lower = tag.to_ascii_lowercase();
        if let Some(inner) = lower.strip_suffix("[]") {
            return Self::Array(Box::new(Self::parse(inner)));
        }
        // udt names: _int4, _text, ...
        if let Some(inner) = lower.strip_prefix('_') {
            return Self::Array(Box::new(Self::parse(inner)));
        }
        if lower == "array" {
            return Self::Array(Box::new(Self::Scalar(ScalarType::Text)));
        }

        match lower.as_str() {
            "inet" => return Self::Network(NetworkType::Inet),
            "cidr" => return Self::Network(NetworkType::Cidr),
            "macaddr" => return Self::Network(NetworkType::MacAddr),
            "macaddr8" => return Self::Network(NetworkType::MacAddr8),
            _ => {}
        }

        Self::Scalar(ScalarType::parse(&lower))
    }

    /// Type name used in explicit casts (`?::<name>`)
    pub fn sql_name(&self) -> String {
        match self {
            Self::Scalar(s) => s.sql_name(),
            Self::Array(inner) => format!("{}[]", inner.sql_name()),
            Self::Enum(name) | Self::Composite(name) => name.clone(),
            Self::Network(n) => n.sql_name().to_string(),
        }
    }

    /// Innermost element type of a (possibly nested) array
    pub fn base_element(&self) -> &ColumnType {
        match self {
            Self::Array(inner) => inner.base_element(),
            other => other,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            Self::Scalar(
                ScalarType::Timestamp
                    | ScalarType::TimestampTz
                    | ScalarType::Date
                    | ScalarType::Time
                    | ScalarType::Interval
            )
        )
    }

    pub fn is_json(&self) -> bool {
        matches!(self, Self::Scalar(ScalarType::Json | ScalarType::Jsonb))
    }
}

impl ScalarType {
    fn parse(lower: &str) -> Self {
        // bit(8), bit varying(16), varbit(4)
        if let Some(n) = modifier(lower, &["bit varying", "varbit"]) {
            return Self::VarBit(n);
        }
        if let Some(n) = modifier(lower, &["bit"]) {
            return Self::Bit(n);
        }

        let base = lower.split('(').next().unwrap_or(lower).trim();
        match base {
            "smallint" | "int2" | "smallserial" => Self::SmallInt,
            "integer" | "int" | "int4" | "serial" => Self::Integer,
            "bigint" | "int8" | "bigserial" => Self::BigInt,
            "numeric" | "decimal" => Self::Numeric,
            "real" | "float4" => Self::Real,
            "double precision" | "float8" | "float" => Self::Double,
            "boolean" | "bool" => Self::Boolean,
            "text" | "varchar" | "character varying" | "char" | "character" | "bpchar"
            | "name" | "citext" => Self::Text,
            "json" => Self::Json,
            "jsonb" => Self::Jsonb,
            "uuid" => Self::Uuid,
            "bytea" => Self::Bytea,
            "xml" => Self::Xml,
            "timestamp" | "timestamp without time zone" => Self::Timestamp,
            "timestamptz" | "timestamp with time zone" => Self::TimestampTz,
            "date" => Self::Date,
            "time" | "time without time zone" | "timetz" | "time with time zone" => Self::Time,
            "interval" => Self::Interval,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn sql_name(&self) -> String {
        match self {
            Self::SmallInt => "smallint".into(),
            Self::Integer => "integer".into(),
            Self::BigInt => "bigint".into(),
            Self::Numeric => "numeric".into(),
            Self::Real => "real".into(),
            Self::Double => "double precision".into(),
            Self::Boolean => "boolean".into(),
            Self::Text => "text".into(),
            Self::Json => "json".into(),
            Self::Jsonb => "jsonb".into(),
            Self::Uuid => "uuid".into(),
            Self::Bit(Some(n)) => format!("bit({n})"),
            Self::Bit(None) => "bit".into(),
            Self::VarBit(Some(n)) => format!("varbit({n})"),
            Self::VarBit(None) => "varbit".into(),
            Self::Bytea => "bytea".into(),
            Self::Xml => "xml".into(),
            Self::Timestamp => "timestamp".into(),
            Self::TimestampTz => "timestamptz".into(),
            Self::Date => "date".into(),
            Self::Time => "time".into(),
            Self::Interval => "interval".into(),
            Self::Other(name) => name.clone(),
        }
    }
}

/// Match `name` or `name(n)` for any of `names`, returning the length modifier.
fn modifier(lower: &str, names: &[&str]) -> Option<Option<u32>> {
    for name in names {
        if lower == *name {
            return Some(None);
        }
        if let Some(rest) = lower.strip_prefix(name) {
            let rest = rest.trim();
            if let Some(n) = rest.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
                return Some(n.trim().parse().ok());
            }
        }
    }
    None
}

impl NetworkType {
    pub fn sql_name(self) -> &'static str {
        match self {
            Self::Inet => "inet",
            Self::Cidr => "cidr",
            Self::MacAddr => "macaddr",
            Self::MacAddr8 => "macaddr8",
        }
    }
}

// ============================================================================
// Response Types
// ============================================================================

/// Offset-paginated list response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse {
    pub data: Vec<serde_json::Value>,
    pub pagination: PaginationInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationInfo {
    pub offset: usize,
    pub limit: usize,
    pub total: u64,
    pub has_more: bool,
}

/// Cursor-paginated (connection style) response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorResponse {
    pub edges: Vec<Edge>,
    pub page_info: PageInfo,
    pub total_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub node: serde_json::Value,
    pub cursor: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
}

/// Standard API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            hint: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<&crate::error::Error> for ApiError {
    fn from(err: &crate::error::Error) -> Self {
        Self::new(err.error_code(), err.to_string())
    }
}
