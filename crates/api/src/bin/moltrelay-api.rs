//! Molt Relay API Binary
//!
//! Main entry point for the relay server.

use std::process;
use std::sync::Arc;
use tracing::{error, info};

use moltrelay_api::{AppState, Server, ServerConfig};
use moltrelay_core::config::RelayConfig;
use moltrelay_core::db::Database;

#[tokio::main]
async fn main() {
    // Initialize structured logging (reads RUST_LOG and LOG_FORMAT env vars)
    moltrelay_api::telemetry::init();

    info!("Starting Molt relay");

    // Load configuration
    let config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    // Initialize database
    let db = match Database::new(&config).await {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            process::exit(1);
        }
    };

    // Run migrations
    if let Err(e) = db.migrate().await {
        error!("Failed to run migrations: {}", e);
        process::exit(1);
    }

    let server_config = server_config_from_env();
    let state = Arc::new(AppState::new(db, config));

    if let Err(e) = Server::new(server_config, state).start().await {
        error!("Server error: {}", e);
        process::exit(1);
    }
}

fn server_config_from_env() -> ServerConfig {
    let mut config = ServerConfig::default();
    if let Ok(host) = std::env::var("HOST") {
        config.host = host;
    }
    if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
        config.port = port;
    }
    if let Ok(cors) = std::env::var("ENABLE_CORS") {
        config.enable_cors = cors != "false";
    }
    config
}
