//! Startup helpers for the listening comprehension server.

use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;

use crate::catalog::core::config::CatalogConfig;
use crate::catalog::core::errors::CatalogResult;
use crate::server::{self, AppState};

/// Environment variable holding the listening port.
pub const PORT_ENV: &str = "LISTENING_COMP_PORT";

/// Run the server until Ctrl-C.
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting listening-comp v{}", env!("CARGO_PKG_VERSION"));

    let config = match CatalogConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            return ExitCode::from(1);
        }
    };

    let port = get_port();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    let state = match rt.block_on(initialize(config)) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to create state: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = rt.block_on(run_server_with_shutdown(state, port, shutdown_signal())) {
        tracing::error!("Server error: {e}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

/// Initialize application state without starting the server.
///
/// # Errors
/// Returns an error if the catalog cannot be initialized.
pub async fn initialize(config: CatalogConfig) -> CatalogResult<Arc<AppState>> {
    tracing::info!(
        "Collection {} at {} (embedding model {}, extraction model {})",
        config.collection.name,
        config.storage.sqlite_path.display(),
        config.embedding.model,
        config.llm.model
    );
    AppState::new(config).await
}

/// Run server with graceful shutdown.
///
/// # Errors
/// Returns an error if the server fails.
pub async fn run_server_with_shutdown<F>(
    state: Arc<AppState>,
    port: u16,
    shutdown_signal: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    F: Future<Output = ()> + Send + 'static,
{
    server::run_server_with_shutdown(state, port, shutdown_signal).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

/// Get configured server port.
#[must_use]
pub fn get_port() -> u16 {
    parse_port(std::env::var(PORT_ENV).ok().as_deref())
}

fn parse_port(raw: Option<&str>) -> u16 {
    raw.and_then(|p| p.trim().parse().ok())
        .unwrap_or(server::DEFAULT_PORT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port(Some("9000")), 9000);
        assert_eq!(parse_port(Some("nope")), server::DEFAULT_PORT);
        assert_eq!(parse_port(None), 8000);
    }
}
