//! Vector index adapter over the question collection.

pub mod vector_index;

pub use vector_index::QuestionIndex;
