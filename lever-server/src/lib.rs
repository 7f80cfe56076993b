//! lever-server - HTTP surface for the lever arm-selection service
//!
//! Owns the periodic sweep task alongside the axum server so both start and
//! stop together.

mod error;
pub mod http;
mod state;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use lever_core::{Coordinator, SweepScheduler};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use error::{ApiError, ErrorResponse, ServerError};
pub use http::create_router;
pub use state::AppState;

/// The lever HTTP server
pub struct LeverServer {
    config: ServerConfig,
    state: Arc<AppState>,
    shutdown: CancellationToken,
}

impl LeverServer {
    pub fn new(config: ServerConfig, coordinator: Arc<Coordinator>) -> Self {
        let max_age = chrono::Duration::from_std(config.sweep_max_age)
            .unwrap_or(chrono::Duration::MAX);
        Self {
            state: Arc::new(AppState::new(coordinator, max_age)),
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the shared application state
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Token that stops the server gracefully when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run the server, binding to the configured address.
    ///
    /// Stops on Ctrl-C or when the shutdown token is cancelled.
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = self.config.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.clone(),
                source: e,
            })?;

        tracing::info!("lever server listening on {}", addr);

        let token = self.shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl-C, shutting down");
                token.cancel();
            }
        });

        self.run_with_listener(listener).await
    }

    /// Run the server on an existing listener (for testing)
    pub async fn run_with_listener(self, listener: TcpListener) -> Result<(), ServerError> {
        let token = self.shutdown.clone();
        self.serve(listener, async move { token.cancelled().await })
            .await
    }

    async fn serve(
        self,
        listener: TcpListener,
        signal: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let scheduler = SweepScheduler::spawn(
            self.state.coordinator.clone(),
            self.config.sweep_period,
            self.config.sweep_max_age,
        );

        let router = create_router(self.state, self.config.request_timeout);
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()));

        scheduler.shutdown();
        scheduler.join().await;
        tracing::info!("lever server stopped");

        result
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Upper bound on any single request
    pub request_timeout: Duration,
    /// How often the sweep runs
    pub sweep_period: Duration,
    /// Age after which a pending selection is force-resolved
    pub sweep_max_age: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            request_timeout: Duration::from_secs(15),
            sweep_period: Duration::from_secs(60),
            sweep_max_age: Duration::from_secs(60),
        }
    }
}

impl ServerConfig {
    /// Get the full address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.addr(), "127.0.0.1:8080");
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.sweep_max_age, Duration::from_secs(60));
    }
}
