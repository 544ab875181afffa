//! Core catalog types and identifiers.

pub mod config;
pub mod errors;
pub mod ids;
pub mod item;

pub use config::{
    CatalogConfig, CollectionConfig, DistanceMetric, EmbeddingConfig, LlmConfig,
    RetrievalConfig, StorageConfig, TimeoutConfig,
};
pub use errors::{CatalogError, CatalogResult, FailureKind};
pub use ids::{SourceId, manual_record_id};
pub use item::{
    DEFAULT_TOPIC, Item, PendingRecord, QueryMatch, RecordMetadata, StoredRecord, zip_columns,
};
