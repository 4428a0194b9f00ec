//! PostgREST-style REST layer
//!
//! This crate exposes relational tables as a REST API: query strings become
//! parameterized SQL, rows become JSON, and related tables are embedded with
//! one batched query per relationship.
//!
//! # Features
//!
//! - **PostgREST filter syntax** - operators, OR groups, negation
//! - **Select and expand** - column lists, aliases, nested embedding
//! - **Pagination** - offset with totals, or opaque cursors
//! - **Rich type conversion** - arrays, JSON/JSONB, UUID, temporal, enums,
//!   composites, network and bit types
//! - **Safety limits** - identifier whitelisting, value denylist, complexity
//!   scoring

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod schema_file;

pub use pgrest_common as common;
pub use pgrest_rest as rest;

use std::sync::Arc;
use tracing::info;

use pgrest_common::config::PgRestConfig;
use pgrest_common::error::Result;
use pgrest_rest::handlers::RestState;
use pgrest_rest::{RestServer, RestService, SchemaCache, SchemaLoader, SchemaProvider, SqlExecutor};

/// Main pgrest server
pub struct PgRestServer {
    config: PgRestConfig,
    rest_server: Arc<RestServer>,
}

impl PgRestServer {
    /// Create a server over an existing schema provider
    pub fn new(
        config: PgRestConfig,
        schema: Arc<dyn SchemaProvider>,
        executor: Arc<dyn SqlExecutor>,
    ) -> Self {
        info!("Initializing pgrest REST layer");
        let rest_server = Arc::new(RestServer::new(RestService::new(
            config.clone(),
            schema,
            executor,
        )));
        Self {
            config,
            rest_server,
        }
    }

    /// Create a server whose schema is cached for `database.schema_ttl_secs`
    pub fn with_loader(
        config: PgRestConfig,
        loader: Arc<dyn SchemaLoader>,
        executor: Arc<dyn SqlExecutor>,
    ) -> Self {
        let schema = Arc::new(SchemaCache::new(loader, config.database.schema_ttl()));
        Self::new(config, schema, executor)
    }

    /// Get reference to the REST server
    #[must_use]
    pub fn rest(&self) -> &RestServer {
        &self.rest_server
    }

    /// Shared handler state holding the request service
    #[must_use]
    pub fn state(&self) -> Arc<RestState> {
        self.rest_server.state()
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &PgRestConfig {
        &self.config
    }

    /// Start serving
    ///
    /// # Errors
    /// Returns an error if the REST server fails to start.
    pub async fn run(&self) -> Result<()> {
        info!(
            "  - REST service: http://{}:{}{}",
            self.config.rest.host, self.config.rest.port, self.config.rest.base_path
        );
        self.rest_server.run().await
    }
}
