//! pgrest server
//!
//! Binary entry point. Without a database driver wired in, statements are
//! logged and answered with empty results, which is enough to exercise
//! routing, validation and SQL generation against a schema file.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pgrest::rest::RecordingExecutor;
use pgrest::schema_file::FileSchemaLoader;
use pgrest::{common::config::PgRestConfig, PgRestServer};

#[derive(Parser, Debug)]
#[command(name = "pgrest")]
#[command(about = "PostgREST-style REST layer", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "pgrest.toml")]
    config: PathBuf,

    /// Path to the schema description
    #[arg(short, long, default_value = "schema.toml")]
    schema: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)))
        .init();

    info!("pgrest v{}", env!("CARGO_PKG_VERSION"));

    if !args.config.exists() {
        info!("Using default configuration");
    }
    let config = PgRestConfig::load(&args.config)?;

    warn!("no database executor configured, statements are logged only");
    let server = PgRestServer::with_loader(
        config,
        Arc::new(FileSchemaLoader::new(&args.schema)),
        Arc::new(RecordingExecutor::new()),
    );

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Received shutdown signal");
        }
    }

    Ok(())
}
