//! Plain-text copies of ingested transcripts and of the model's raw answers.

use std::path::PathBuf;

use tracing::debug;

use crate::catalog::core::errors::CatalogResult;
use crate::catalog::core::ids::SourceId;

const TRANSCRIPTS_DIR: &str = "transcripts";
const EXTRACTIONS_DIR: &str = "questions";

/// Writes `<root>/transcripts/<id>.txt` and `<root>/questions/<id>.txt`.
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Create a store rooted at `root`. Directories are created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Save a raw transcript, replacing any earlier copy.
    ///
    /// # Errors
    /// Returns an error if the directory or file cannot be written.
    pub async fn save_transcript(&self, source_id: &SourceId, text: &str) -> CatalogResult<PathBuf> {
        self.save(TRANSCRIPTS_DIR, source_id, text).await
    }

    /// Save the model's raw answer for a transcript, replacing any earlier copy.
    ///
    /// # Errors
    /// Returns an error if the directory or file cannot be written.
    pub async fn save_extraction(&self, source_id: &SourceId, text: &str) -> CatalogResult<PathBuf> {
        self.save(EXTRACTIONS_DIR, source_id, text).await
    }

    async fn save(&self, dir: &str, source_id: &SourceId, text: &str) -> CatalogResult<PathBuf> {
        let dir = self.root.join(dir);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("{source_id}.txt"));
        tokio::fs::write(&path, text).await?;
        debug!("Saved {}", path.display());
        Ok(path)
    }
}
