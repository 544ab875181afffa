//! Catalog orchestration module.

pub mod core;

pub use core::{
    CatalogBackends, CatalogStats, IngestReport, ManualQuestion, QuestionCatalog, TranscriptIngest,
};
