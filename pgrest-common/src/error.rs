//! Error types for the pgrest REST layer

use thiserror::Error;

/// pgrest error types
#[derive(Error, Debug)]
pub enum Error {
    // Validation Errors
    #[error("Invalid table: {0}")]
    InvalidTable(String),

    #[error("Invalid column: {0}")]
    InvalidColumn(String),

    #[error("Invalid query parameter: {0}")]
    InvalidQueryParam(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid composite key: expected {expected} key parts, got {actual}")]
    CompositeKeyMismatch { expected: usize, actual: usize },

    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("Potentially unsafe value rejected: {0}")]
    UnsafeValue(String),

    #[error("Query too complex: {0}")]
    QueryTooComplex(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    // Constraint Violations
    #[error("Column '{column}' cannot be null")]
    NotNullViolation { column: String },

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    #[error("Check constraint violated: {0}")]
    CheckViolation(String),

    #[error("Invalid value '{value}' for enum {type_name}")]
    InvalidEnumValue { type_name: String, value: String },

    // Authorization Errors
    #[error("Forbidden: insufficient {privilege} privilege on {table}")]
    Forbidden { table: String, privilege: String },

    // Lookup Errors
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Resource not found")]
    ResourceNotFound,

    // Database Errors
    #[error("SQL error{}: {message}", code.as_deref().map(|c| format!(" [{c}]")).unwrap_or_default())]
    Sql {
        code: Option<String>,
        message: String,
    },

    #[error("Database error: {0}")]
    DatabaseError(String),

    // General Errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type alias for pgrest operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for a driver error carrying an optional SQLSTATE.
    pub fn sql(code: Option<&str>, message: impl Into<String>) -> Self {
        Self::Sql {
            code: code.map(str::to_string),
            message: message.into(),
        }
    }

    /// Whether this error belongs to the client-error (validation) class.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidTable(_)
                | Self::InvalidColumn(_)
                | Self::InvalidQueryParam(_)
                | Self::InvalidFilter(_)
                | Self::CompositeKeyMismatch { .. }
                | Self::InvalidCursor(_)
                | Self::UnsafeValue(_)
                | Self::QueryTooComplex(_)
                | Self::ValidationError(_)
                | Self::NotNullViolation { .. }
                | Self::CheckViolation(_)
                | Self::InvalidEnumValue { .. }
        )
    }

    pub fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Self::InvalidTable(_)
            | Self::InvalidColumn(_)
            | Self::InvalidQueryParam(_)
            | Self::InvalidFilter(_)
            | Self::CompositeKeyMismatch { .. }
            | Self::InvalidCursor(_)
            | Self::UnsafeValue(_)
            | Self::QueryTooComplex(_)
            | Self::ValidationError(_)
            | Self::NotNullViolation { .. }
            | Self::CheckViolation(_)
            | Self::InvalidEnumValue { .. } => 400,

            // 403 Forbidden
            Self::Forbidden { .. } => 403,

            // 404 Not Found
            Self::TableNotFound(_) | Self::ResourceNotFound => 404,

            // 409 Conflict
            Self::DuplicateKey(_) => 409,

            // 422 Unprocessable Entity
            Self::ForeignKeyViolation(_) => 422,

            // 500 Internal Server Error
            Self::Sql { .. }
            | Self::DatabaseError(_)
            | Self::ConfigError(_)
            | Self::InternalError(_)
            | Self::IoError(_)
            | Self::JsonError(_) => 500,
        }
    }

    /// Error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidTable(_) => "invalid_table",
            Self::InvalidColumn(_) => "invalid_column",
            Self::InvalidQueryParam(_) => "invalid_param",
            Self::InvalidFilter(_) => "invalid_filter",
            Self::CompositeKeyMismatch { .. } => "invalid_key",
            Self::InvalidCursor(_) => "invalid_cursor",
            Self::UnsafeValue(_) => "unsafe_value",
            Self::QueryTooComplex(_) => "query_too_complex",
            Self::ValidationError(_) => "validation_error",
            Self::NotNullViolation { .. } => "not_null_violation",
            Self::DuplicateKey(_) => "duplicate_key",
            Self::ForeignKeyViolation(_) => "fk_violation",
            Self::CheckViolation(_) => "check_violation",
            Self::InvalidEnumValue { .. } => "invalid_enum_value",
            Self::Forbidden { .. } => "forbidden",
            Self::TableNotFound(_) => "table_not_found",
            Self::ResourceNotFound => "not_found",
            Self::Sql { .. } => "sql_error",
            Self::DatabaseError(_) => "database_error",
            Self::ConfigError(_) => "config_error",
            Self::InternalError(_) => "internal_error",
            Self::IoError(_) => "io_error",
            Self::JsonError(_) => "json_error",
        }
    }
}
