//! Persistent storage for question records and ingestion artifacts.

pub mod artifacts;
pub mod collection;
pub mod sqlite_vec_loader;

pub use artifacts::ArtifactStore;
pub use collection::{EmbeddedRecord, SqliteCollection, WriteOutcome};
pub use sqlite_vec_loader::init_sqlite_vec_extension;
