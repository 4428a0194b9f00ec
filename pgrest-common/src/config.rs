//! Configuration types for the pgrest REST layer

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PgRestConfig {
    /// REST API configuration
    pub rest: RestConfig,
    /// Pagination bounds
    pub limits: LimitsConfig,
    /// Query complexity thresholds
    pub complexity: ComplexityConfig,
    /// Database capabilities and schema cache
    pub database: DatabaseConfig,
}

impl PgRestConfig {
    /// Parse configuration from TOML text
    ///
    /// # Errors
    /// Returns `ConfigError` when the text is not valid TOML for this shape.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigError(e.to_string()))
    }

    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

/// REST API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestConfig {
    /// Host to bind to
    pub host: String,
    /// Port for REST API (default: 3000)
    pub port: u16,
    /// Path prefix for table routes (default: "/api")
    pub base_path: String,
    /// CORS allowed origins
    pub cors_origins: Vec<String>,
    /// Number of HTTP workers
    pub workers: usize,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            base_path: "/api".to_string(),
            cors_origins: vec!["*".to_string()],
            workers: 4,
        }
    }
}

/// Pagination bounds applied to every list request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Page size when the request does not carry one
    pub default_limit: usize,
    /// Largest accepted `limit`/`first`/`last`
    pub max_limit: usize,
    /// Largest accepted `offset`
    pub max_offset: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 1000,
            max_offset: 100_000,
        }
    }
}

/// Thresholds for the query complexity analyzer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplexityConfig {
    pub enabled: bool,
    pub max_score: u32,
    pub max_depth: u32,
    pub max_breadth: u32,
}

impl Default for ComplexityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_score: 100,
            max_depth: 3,
            max_breadth: 50,
        }
    }
}

/// Database capability and schema cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database schema exposed through the API
    pub schema: String,
    /// Whether the engine accepts `RETURNING *` on INSERT
    pub supports_returning: bool,
    /// Run `has_table_privilege` before each operation
    pub check_permissions: bool,
    /// Schema snapshot lifetime in seconds
    pub schema_ttl_secs: u64,
}

impl DatabaseConfig {
    #[must_use]
    pub fn schema_ttl(&self) -> Duration {
        Duration::from_secs(self.schema_ttl_secs)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            supports_returning: true,
            check_permissions: false,
            schema_ttl_secs: 300,
        }
    }
}
