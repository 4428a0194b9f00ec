//! REST API server implementation

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use std::sync::Arc;
use tracing::info;

use pgrest_common::config::RestConfig;
use pgrest_common::error::Result;

use crate::handlers::{self, RestState};
use crate::service::RestService;

/// PostgREST-compatible REST API server
pub struct RestServer {
    config: RestConfig,
    state: Arc<RestState>,
}

impl RestServer {
    /// Serve `service` with the REST settings of its configuration
    pub fn new(service: RestService) -> Self {
        Self {
            config: service.config().rest.clone(),
            state: Arc::new(RestState::new(service)),
        }
    }

    #[must_use]
    pub fn state(&self) -> Arc<RestState> {
        self.state.clone()
    }

    #[must_use]
    pub fn config(&self) -> &RestConfig {
        &self.config
    }

    /// Run the REST server
    ///
    /// # Errors
    /// Returns an error if the listener cannot be bound.
    pub async fn run(&self) -> Result<()> {
        let state = self.state.clone();
        let origins = self.config.cors_origins.clone();
        let base_path = self.config.base_path.clone();
        let host = self.config.host.clone();
        let port = self.config.port;

        info!("Starting REST API server on {}:{}{}", host, port, base_path);

        HttpServer::new(move || {
            let base_path = base_path.clone();
            App::new()
                .app_data(web::Data::new(state.clone()))
                .wrap(cors(&origins))
                .wrap(middleware::Compress::default())
                .wrap(middleware::Logger::default())
                .configure(move |cfg| handlers::configure(cfg, &base_path))
        })
        .workers(self.config.workers)
        .bind((host.as_str(), port))?
        .run()
        .await?;

        Ok(())
    }
}

/// CORS policy for the configured origins; `*` allows any origin
pub fn cors(origins: &[String]) -> Cors {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return Cors::permissive();
    }
    origins.iter().fold(
        Cors::default()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600),
        |cors, origin| cors.allowed_origin(origin),
    )
}
