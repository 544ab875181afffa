//! Question catalog orchestration.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use crate::catalog::core::config::CatalogConfig;
use crate::catalog::core::errors::{CatalogError, CatalogResult};
use crate::catalog::core::ids::{SourceId, manual_record_id};
use crate::catalog::core::item::{
    DEFAULT_TOPIC, PendingRecord, QueryMatch, RecordMetadata, StoredRecord,
};
use crate::catalog::embedding::embedder::{Embedder, OllamaEmbedder};
use crate::catalog::index::vector_index::QuestionIndex;
use crate::catalog::ingest::extractor_llm::{ExtractionService, OllamaExtractor};
use crate::catalog::ingest::parser::{DiscardedSegment, parse_items};
use crate::catalog::storage::artifacts::ArtifactStore;

/// Outcome of adding one source's items.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Source the items belong to.
    pub source_id: SourceId,
    /// Ids written, in item order.
    pub ids: Vec<String>,
    /// Segments the parser dropped.
    pub discarded: Vec<DiscardedSegment>,
    /// Records of an earlier ingestion of the same source that were removed.
    pub replaced: usize,
}

/// Outcome of a full transcript ingestion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TranscriptIngest {
    /// Raw model answer the items were parsed from.
    pub processed_text: String,
    /// What was written.
    pub report: IngestReport,
}

/// A question added by hand.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualQuestion {
    /// Question text; this is what gets embedded.
    pub text: String,
    /// Expected answer.
    pub answer: String,
    /// Topic label, `general` when absent.
    #[serde(default)]
    pub topic: Option<String>,
}

/// Catalog counters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CatalogStats {
    /// Stored records.
    pub records: usize,
    /// Ids overwritten outside a per-source replacement since start.
    pub collisions: u64,
    /// Collection name.
    pub collection: String,
}

/// Backend dependencies for the catalog.
pub struct CatalogBackends {
    /// Vector index.
    pub index: QuestionIndex,
    /// Transcript extraction service, if transcripts are accepted.
    pub extractor: Option<Arc<dyn ExtractionService>>,
    /// Artifact store, if copies should be kept on disk.
    pub artifacts: Option<ArtifactStore>,
}

impl CatalogBackends {
    /// Build Ollama + `SQLite` backends from config.
    ///
    /// # Errors
    /// Returns an error if any backend cannot be initialized.
    pub async fn ollama(config: &CatalogConfig) -> CatalogResult<Self> {
        let embedder: Arc<dyn Embedder> = Arc::new(OllamaEmbedder::new(&config.embedding)?);
        let index = QuestionIndex::initialize(config, embedder).await?;
        let extractor: Arc<dyn ExtractionService> = Arc::new(OllamaExtractor::new(&config.llm)?);
        let artifacts = config.storage.artifacts_dir.clone().map(ArtifactStore::new);

        Ok(Self {
            index,
            extractor: Some(extractor),
            artifacts,
        })
    }
}

/// Held while a source is being ingested; drops the map entry once unused.
struct SourceGuard<'a> {
    locks: &'a DashMap<SourceId, Arc<Mutex<()>>>,
    source_id: SourceId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SourceGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.source_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Catalog of listening-comprehension questions.
pub struct QuestionCatalog {
    config: CatalogConfig,
    index: QuestionIndex,
    extractor: Option<Arc<dyn ExtractionService>>,
    artifacts: Option<ArtifactStore>,
    source_locks: DashMap<SourceId, Arc<Mutex<()>>>,
}

impl QuestionCatalog {
    /// Create a catalog over prepared backends.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(config: CatalogConfig, backends: CatalogBackends) -> CatalogResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            index: backends.index,
            extractor: backends.extractor,
            artifacts: backends.artifacts,
            source_locks: DashMap::new(),
        })
    }

    /// Create a catalog using Ollama + `SQLite` backends.
    ///
    /// # Errors
    /// Returns an error if backends cannot be initialized.
    pub async fn from_config(config: CatalogConfig) -> CatalogResult<Self> {
        config.validate()?;
        let backends = CatalogBackends::ollama(&config).await?;
        Self::new(config, backends)
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &CatalogConfig {
        &self.config
    }

    async fn lock_source(&self, source_id: &SourceId) -> SourceGuard<'_> {
        let lock = self
            .source_locks
            .entry(source_id.clone())
            .or_default()
            .clone();
        let guard = lock.lock_owned().await;
        SourceGuard {
            locks: &self.source_locks,
            source_id: source_id.clone(),
            guard: Some(guard),
        }
    }

    /// Parse model output and store its items under `source_id`.
    ///
    /// Records of an earlier ingestion of the same source are replaced.
    ///
    /// # Errors
    /// Returns `ExtractionEmpty` when no complete item is found, leaving the
    /// index untouched, or an error if embedding or storage fails.
    pub async fn add_items_from_text(
        &self,
        raw_text: &str,
        source_id: &SourceId,
    ) -> CatalogResult<IngestReport> {
        let _guard = self.lock_source(source_id).await;
        self.store_items(raw_text, source_id).await
    }

    async fn store_items(&self, raw_text: &str, source_id: &SourceId) -> CatalogResult<IngestReport> {
        let outcome = parse_items(raw_text);
        if outcome.is_empty() {
            warn!(
                "No items extracted for {} ({} segment(s) discarded)",
                source_id,
                outcome.discarded.len()
            );
            return Err(CatalogError::ExtractionEmpty {
                source_id: source_id.to_string(),
            });
        }

        let ids = source_id.record_ids(outcome.items.len());
        let records = outcome
            .items
            .iter()
            .zip(&ids)
            .map(|(item, id)| PendingRecord {
                id: id.clone(),
                document: item.full_text.clone(),
                metadata: item.metadata(source_id),
            })
            .collect();

        let written = self.index.replace_source(source_id, records).await?;
        info!(
            "Stored {} item(s) for {} (replaced {}, discarded {})",
            written.written,
            source_id,
            written.removed,
            outcome.discarded.len()
        );

        Ok(IngestReport {
            source_id: source_id.clone(),
            ids,
            discarded: outcome.discarded,
            replaced: written.removed,
        })
    }

    /// Run extraction over a transcript and store the resulting items.
    ///
    /// # Errors
    /// Returns an error if the transcript is empty, no extraction service is
    /// configured, the model call fails or times out, or storing fails.
    pub async fn ingest_transcript(
        &self,
        transcript: &str,
        source_id: &SourceId,
    ) -> CatalogResult<TranscriptIngest> {
        if transcript.trim().is_empty() {
            return Err(CatalogError::InvalidInput("transcript is empty".to_string()));
        }
        let extractor = self.extractor.as_ref().ok_or_else(|| {
            CatalogError::Extraction("no extraction service configured".to_string())
        })?;

        let _guard = self.lock_source(source_id).await;

        if let Some(artifacts) = &self.artifacts {
            artifacts.save_transcript(source_id, transcript).await?;
        }

        let limit = self.config.timeouts.extraction();
        let processed_text = tokio::time::timeout(limit, extractor.extract(transcript))
            .await
            .map_err(|_| CatalogError::Timeout {
                operation: "extraction",
                seconds: limit.as_secs(),
            })??;

        if let Some(artifacts) = &self.artifacts {
            artifacts.save_extraction(source_id, &processed_text).await?;
        }

        let report = self.store_items(&processed_text, source_id).await?;
        Ok(TranscriptIngest {
            processed_text,
            report,
        })
    }

    /// Store one question without parsing; returns its id.
    ///
    /// # Errors
    /// Returns an error if `text` is empty or embedding or storage fails.
    pub async fn add_single_item(
        &self,
        text: &str,
        answer: &str,
        topic: Option<&str>,
    ) -> CatalogResult<String> {
        let ids = self
            .add_manual_items(vec![ManualQuestion {
                text: text.to_string(),
                answer: answer.to_string(),
                topic: topic.map(ToString::to_string),
            }])
            .await?;
        ids.into_iter()
            .next()
            .ok_or_else(|| CatalogError::InvalidInput("nothing to add".to_string()))
    }

    /// Store several hand-written questions in one write; returns their ids.
    ///
    /// # Errors
    /// Returns an error if the list is empty, any text is empty, or embedding
    /// or storage fails. Nothing is written on error.
    pub async fn add_manual_items(&self, questions: Vec<ManualQuestion>) -> CatalogResult<Vec<String>> {
        if questions.is_empty() {
            return Err(CatalogError::InvalidInput("no questions given".to_string()));
        }

        let mut records = Vec::with_capacity(questions.len());
        for question in questions {
            let text = question.text.trim();
            if text.is_empty() {
                return Err(CatalogError::InvalidInput("question text is empty".to_string()));
            }
            let topic = question
                .topic
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| DEFAULT_TOPIC.to_string());
            records.push(PendingRecord {
                id: manual_record_id(),
                document: text.to_string(),
                metadata: RecordMetadata::Manual {
                    answer: question.answer,
                    topic,
                },
            });
        }

        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        self.index.insert(records).await?;
        info!("Added {} manual question(s)", ids.len());
        Ok(ids)
    }

    /// Up to `k` stored records nearest to `query_text`, closest first.
    ///
    /// # Errors
    /// Returns an error if the query is empty or embedding or reading fails.
    pub async fn find_similar(&self, query_text: &str, k: usize) -> CatalogResult<Vec<QueryMatch>> {
        if query_text.trim().is_empty() {
            return Err(CatalogError::InvalidInput("query is empty".to_string()));
        }
        self.index.query(query_text, k).await
    }

    /// Every stored record, in insertion order.
    ///
    /// # Errors
    /// Returns an error if the collection cannot be read.
    pub async fn list_all(&self) -> CatalogResult<Vec<StoredRecord>> {
        self.index.get_all().await
    }

    /// Remove every stored record.
    ///
    /// # Errors
    /// Returns an error if the collection cannot be recreated.
    pub async fn clear_all(&self) -> CatalogResult<()> {
        self.index.clear().await
    }

    /// Current counters.
    ///
    /// # Errors
    /// Returns an error if the collection cannot be read.
    pub async fn stats(&self) -> CatalogResult<CatalogStats> {
        Ok(CatalogStats {
            records: self.index.count().await?,
            collisions: self.index.collisions(),
            collection: self.index.name().to_string(),
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::catalog::embedding::embedder::test_support::KeywordEmbedder;
    use crate::catalog::index::vector_index::test_support::memory_index;
    use crate::catalog::ingest::extractor_llm::test_support::CannedExtractor;

    pub(crate) const THREE_ITEMS: &str = "\
<item><introduction>駅で男の人と女の人が話しています。</introduction>\
<conversation>男：すみません、切符はどこで買えますか。女：あちらの機械です。</conversation>\
<question>男の人は何を買いますか。</question></item>
<item><introduction>喫茶店で店員と客が話しています。</introduction>\
<conversation>客：コーヒーを一つください。店員：ホットですか、アイスですか。</conversation>\
<question>客は何を注文しましたか。</question></item>
<item><introduction>大学で先生と学生が話しています。</introduction>\
<conversation>学生：レポートの締め切りはいつですか。先生：来週の金曜日です。</conversation>\
<question>締め切りはいつですか。</question></item>";

    pub(crate) async fn catalog_with(
        embedder: Arc<dyn Embedder>,
        extractor_answer: Option<&str>,
    ) -> QuestionCatalog {
        let backends = CatalogBackends {
            index: memory_index(embedder).await,
            extractor: Some(Arc::new(CannedExtractor {
                answer: extractor_answer.map(ToString::to_string),
            })),
            artifacts: None,
        };
        QuestionCatalog::new(CatalogConfig::default(), backends).unwrap()
    }

    pub(crate) async fn keyword_catalog() -> QuestionCatalog {
        catalog_with(Arc::new(KeywordEmbedder::new(64)), Some(THREE_ITEMS)).await
    }
}
