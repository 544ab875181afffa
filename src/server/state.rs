//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::catalog::core::config::CatalogConfig;
use crate::catalog::core::errors::CatalogResult;
use crate::catalog::engine::QuestionCatalog;

/// Shared application state.
pub struct AppState {
    /// Question catalog backing every route.
    pub catalog: QuestionCatalog,
}

impl AppState {
    /// Create the application state with Ollama + `SQLite` backends.
    ///
    /// # Errors
    /// Returns an error if the catalog cannot be initialized.
    pub async fn new(config: CatalogConfig) -> CatalogResult<Arc<Self>> {
        let catalog = QuestionCatalog::from_config(config).await?;
        Ok(Self::from_catalog(catalog))
    }

    /// Wrap an existing catalog.
    #[must_use]
    pub fn from_catalog(catalog: QuestionCatalog) -> Arc<Self> {
        Arc::new(Self { catalog })
    }
}
