//! Listening-comprehension question catalog.
//!
//! - `core`: configuration, errors, source ids and record types
//! - `ingest`: transcript extraction through the LLM and the lenient `<item>` parser
//! - `embedding`: embedding model abstraction and Ollama implementation
//! - `storage`: `SQLite` collection ranked with sqlite-vec, plus on-disk artifacts
//! - `index`: embedding + collection lifecycle
//! - `engine`: the `QuestionCatalog` service

pub mod core;
pub mod embedding;
pub mod engine;
pub mod index;
pub mod ingest;
pub mod storage;

pub use core::{
    CatalogConfig, CatalogError, CatalogResult, FailureKind, Item, QueryMatch, RecordMetadata,
    SourceId, StoredRecord,
};
pub use embedding::{EmbedFuture, Embedder, OllamaEmbedder};
pub use engine::{
    CatalogBackends, CatalogStats, IngestReport, ManualQuestion, QuestionCatalog, TranscriptIngest,
};
pub use index::QuestionIndex;
pub use ingest::{ExtractionService, OllamaExtractor, ParseOutcome, parse_items};
pub use storage::{ArtifactStore, SqliteCollection, init_sqlite_vec_extension};
