//! Stream server with axum router and graceful shutdown.

use std::net::SocketAddr;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::error::ServerError;
use super::handlers::{get_status, AppState};
use super::ws::ws_handler;

/// Default port for the stream server.
pub const DEFAULT_PORT: u16 = 8082;

/// Default bind address.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Configuration for the stream server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on.
    pub port: u16,
    /// Host address to bind to.
    pub host: String,
    /// Whether to enable permissive CORS.
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            host: DEFAULT_HOST.to_string(),
            cors_permissive: true,
        }
    }
}

/// HTTP server carrying subscriber sessions.
pub struct StreamServer {
    config: ServerConfig,
    state: AppState,
}

impl StreamServer {
    /// Create a server with default configuration.
    #[must_use]
    pub fn new(state: AppState) -> Self {
        Self {
            config: ServerConfig::default(),
            state,
        }
    }

    /// Set the server configuration (builder pattern).
    #[must_use]
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Get the configured address as a string.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    /// Build the axum router with all routes and middleware.
    pub fn build_router(&self) -> Router {
        let router = Router::new()
            .route("/ws", get(ws_handler))
            .route("/api/status", get(get_status))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http());

        if self.config.cors_permissive {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Bind the listener without serving yet.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Bind` if the address cannot be bound.
    pub async fn bind(self) -> Result<BoundServer, ServerError> {
        let address = self.address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| ServerError::Bind {
                address: address.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        tracing::info!(address = %local_addr, "Stream server bound");

        Ok(BoundServer {
            listener,
            local_addr,
            router: self.build_router(),
            cancel: self.state.cancel.clone(),
        })
    }
}

/// A server whose listener is bound and ready to serve.
pub struct BoundServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    router: Router,
    cancel: CancellationToken,
}

impl BoundServer {
    /// The address actually bound (useful with port 0).
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until the cancellation token is triggered, then shut down
    /// gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if serving fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        let cancel = self.cancel;

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move {
                cancel.cancelled().await;
                tracing::info!("Stream server shutting down gracefully");
            })
            .await?;

        Ok(())
    }
}
