//! Embedding + collection lifecycle behind one handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::catalog::core::config::CatalogConfig;
use crate::catalog::core::errors::{CatalogError, CatalogResult};
use crate::catalog::core::ids::SourceId;
use crate::catalog::core::item::{
    PendingRecord, QueryMatch, RecordMetadata, StoredRecord, zip_columns,
};
use crate::catalog::embedding::embedder::Embedder;
use crate::catalog::storage::collection::{EmbeddedRecord, SqliteCollection, WriteOutcome};
use crate::catalog::storage::sqlite_vec_loader::init_sqlite_vec_extension;

/// Vector index over the question collection.
///
/// Every write embeds first and commits second, so an embedding failure leaves
/// the collection untouched.
pub struct QuestionIndex {
    collection: SqliteCollection,
    embedder: Arc<dyn Embedder>,
    embed_timeout: Duration,
    collisions: AtomicU64,
}

impl QuestionIndex {
    /// Open the configured collection.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or prepared.
    pub async fn initialize(
        config: &CatalogConfig,
        embedder: Arc<dyn Embedder>,
    ) -> CatalogResult<Self> {
        init_sqlite_vec_extension();
        let collection = SqliteCollection::open(&config.storage, &config.collection).await?;
        Ok(Self::new(collection, embedder, config.timeouts.embedding()))
    }

    /// Wrap an already prepared collection.
    #[must_use]
    pub fn new(
        collection: SqliteCollection,
        embedder: Arc<dyn Embedder>,
        embed_timeout: Duration,
    ) -> Self {
        Self {
            collection,
            embedder,
            embed_timeout,
            collisions: AtomicU64::new(0),
        }
    }

    /// Collection name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.collection.name()
    }

    /// Number of writes that replaced an existing id outside a per-source replacement.
    #[must_use]
    pub fn collisions(&self) -> u64 {
        self.collisions.load(Ordering::Relaxed)
    }

    /// Embed texts one call at a time, in order.
    ///
    /// # Errors
    /// Returns an error if any call fails, times out or yields a malformed vector.
    pub async fn embed(&self, texts: &[String]) -> CatalogResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed_one(text).await?);
        }
        Ok(vectors)
    }

    async fn embed_one(&self, text: &str) -> CatalogResult<Vec<f32>> {
        let vector = tokio::time::timeout(self.embed_timeout, self.embedder.embed_text(text))
            .await
            .map_err(|_| CatalogError::Timeout {
                operation: "embedding",
                seconds: self.embed_timeout.as_secs(),
            })??;
        self.check_vector(&vector)?;
        Ok(vector)
    }

    fn check_vector(&self, vector: &[f32]) -> CatalogResult<()> {
        let expected = self.embedder.ndims();
        if vector.len() != expected {
            return Err(CatalogError::Embedding(format!(
                "expected {expected} dimensions, model returned {}",
                vector.len()
            )));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(CatalogError::Embedding(
                "vector contains non-finite values".to_string(),
            ));
        }
        if vector.iter().all(|v| *v == 0.0) {
            return Err(CatalogError::Embedding("vector is all zeros".to_string()));
        }
        Ok(())
    }

    /// Embed and append records atomically.
    ///
    /// # Errors
    /// Returns an error if embedding or the write fails; nothing is written then.
    pub async fn insert(&self, records: Vec<PendingRecord>) -> CatalogResult<WriteOutcome> {
        self.write(records, None).await
    }

    /// [`insert`](Self::insert) taking parallel columns.
    ///
    /// # Errors
    /// Returns an error if the columns differ in length, or as `insert`.
    pub async fn insert_columns(
        &self,
        ids: Vec<String>,
        documents: Vec<String>,
        metadatas: Vec<RecordMetadata>,
    ) -> CatalogResult<WriteOutcome> {
        self.insert(zip_columns(ids, documents, metadatas)?).await
    }

    /// Replace every record of `source_id` with `records` atomically.
    ///
    /// # Errors
    /// Returns an error if embedding or the write fails; nothing changes then.
    pub async fn replace_source(
        &self,
        source_id: &SourceId,
        records: Vec<PendingRecord>,
    ) -> CatalogResult<WriteOutcome> {
        self.write(records, Some(source_id)).await
    }

    async fn write(
        &self,
        records: Vec<PendingRecord>,
        replace_source: Option<&SourceId>,
    ) -> CatalogResult<WriteOutcome> {
        let documents: Vec<String> = records.iter().map(|r| r.document.clone()).collect();
        let vectors = self.embed(&documents).await?;
        let embedded = records
            .into_iter()
            .zip(vectors)
            .map(|(record, embedding)| EmbeddedRecord { record, embedding })
            .collect();

        let outcome = self
            .collection
            .write(embedded, replace_source.map(ToString::to_string))
            .await?;

        if !outcome.overwritten.is_empty() {
            let count = u64::try_from(outcome.overwritten.len()).unwrap_or(u64::MAX);
            self.collisions.fetch_add(count, Ordering::Relaxed);
            warn!(
                "Overwrote {} existing record(s) in {}: {:?}",
                outcome.overwritten.len(),
                self.collection.name(),
                outcome.overwritten
            );
        }

        Ok(outcome)
    }

    /// Up to `k` records nearest to `text`, closest first.
    ///
    /// # Errors
    /// Returns an error if embedding the query or reading the collection fails.
    pub async fn query(&self, text: &str, k: usize) -> CatalogResult<Vec<QueryMatch>> {
        if k == 0 || self.collection.count().await? == 0 {
            return Ok(Vec::new());
        }
        let vector = self.embed_one(text).await?;
        let matches = self.collection.nearest(&vector, k).await?;
        debug!("Query returned {} of k={k} match(es)", matches.len());
        Ok(matches)
    }

    /// Every stored record.
    ///
    /// # Errors
    /// Returns an error if the collection cannot be read.
    pub async fn get_all(&self) -> CatalogResult<Vec<StoredRecord>> {
        self.collection.all().await
    }

    /// Number of stored records.
    ///
    /// # Errors
    /// Returns an error if the collection cannot be read.
    pub async fn count(&self) -> CatalogResult<usize> {
        self.collection.count().await
    }

    /// Drop and recreate the collection.
    ///
    /// # Errors
    /// Returns an error if the collection cannot be recreated.
    pub async fn clear(&self) -> CatalogResult<()> {
        self.collection.reset().await?;
        info!("Cleared collection {}", self.collection.name());
        Ok(())
    }
}
