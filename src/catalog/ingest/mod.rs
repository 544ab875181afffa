//! Transcript extraction and item parsing.

pub mod extractor_llm;
pub mod parser;

pub use extractor_llm::{ExtractFuture, ExtractionService, OllamaExtractor};
pub use parser::{DiscardReason, DiscardedSegment, ItemField, ParseOutcome, parse_items};
