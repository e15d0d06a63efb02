//! API server setup and configuration

use axum::Router;
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{error::Result, routes, state::AppState};

/// API server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            enable_cors: true,
        }
    }
}

/// API Server
pub struct Server {
    config: ServerConfig,
    app: Router,
}

impl Server {
    /// Create a new API server
    pub fn new(config: ServerConfig, state: Arc<AppState>) -> Self {
        let app = Self::build_app(state, &config);
        Self { config, app }
    }

    /// Build the application router
    fn build_app(state: Arc<AppState>, config: &ServerConfig) -> Router {
        let mut app = routes::create_router(state);

        if config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            app = app.layer(cors);
        }

        app.layer(TraceLayer::new_for_http())
    }

    /// Start the server
    pub async fn start(self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .expect("Invalid socket address");

        info!("Molt relay listening on http://{}", addr);
        info!("Health check: http://{}/health", addr);
        info!("Offer catalog: http://{}/v1/offers", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .expect("Failed to bind address");

        axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .expect("Server error");

        Ok(())
    }

    /// Get router for testing
    #[cfg(test)]
    pub fn router(self) -> Router {
        self.app
    }
}
