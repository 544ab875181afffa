//! Listening-comprehension items and the records stored for them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::core::errors::{CatalogError, CatalogResult};
use crate::catalog::core::ids::SourceId;

/// Default topic for manually added questions.
pub const DEFAULT_TOPIC: &str = "general";

/// One extracted listening-comprehension unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Scene-setting text.
    pub introduction: String,
    /// Dialogue text.
    pub conversation: String,
    /// Comprehension question.
    pub question: String,
    /// `introduction`, `conversation` and `question` joined by newlines.
    pub full_text: String,
}

impl Item {
    /// Build an item from its three fields, trimming surrounding whitespace.
    ///
    /// # Errors
    /// Returns an error if any field is empty after trimming.
    pub fn new(
        introduction: impl AsRef<str>,
        conversation: impl AsRef<str>,
        question: impl AsRef<str>,
    ) -> CatalogResult<Self> {
        let introduction = non_empty("introduction", introduction.as_ref())?;
        let conversation = non_empty("conversation", conversation.as_ref())?;
        let question = non_empty("question", question.as_ref())?;
        let full_text = format!("{introduction}\n{conversation}\n{question}");
        Ok(Self {
            introduction,
            conversation,
            question,
            full_text,
        })
    }

    /// Build an item from fields already trimmed and known to be non-empty.
    pub(crate) fn from_checked(introduction: &str, conversation: &str, question: &str) -> Self {
        Self {
            introduction: introduction.to_string(),
            conversation: conversation.to_string(),
            question: question.to_string(),
            full_text: format!("{introduction}\n{conversation}\n{question}"),
        }
    }

    /// Metadata stored alongside this item.
    #[must_use]
    pub fn metadata(&self, source_id: &SourceId) -> RecordMetadata {
        RecordMetadata::Transcript {
            source_id: source_id.clone(),
            introduction: self.introduction.clone(),
            conversation: self.conversation.clone(),
            question: self.question.clone(),
        }
    }
}

fn non_empty(field: &str, value: &str) -> CatalogResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CatalogError::InvalidInput(format!("{field} is empty")));
    }
    Ok(trimmed.to_string())
}

/// Metadata attached to a stored record, serialized as a flat mapping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordMetadata {
    /// Item parsed from a transcript.
    Transcript {
        /// Originating transcript.
        source_id: SourceId,
        /// Scene-setting text.
        introduction: String,
        /// Dialogue text.
        conversation: String,
        /// Comprehension question.
        question: String,
    },
    /// Question added by hand.
    Manual {
        /// Expected answer.
        answer: String,
        /// Free-form topic label.
        topic: String,
    },
}

impl RecordMetadata {
    /// Source the record belongs to, if it came from a transcript.
    #[must_use]
    pub const fn source_id(&self) -> Option<&SourceId> {
        match self {
            Self::Transcript { source_id, .. } => Some(source_id),
            Self::Manual { .. } => None,
        }
    }

    /// Comprehension question, if the record came from a transcript.
    #[must_use]
    pub fn question(&self) -> Option<&str> {
        match self {
            Self::Transcript { question, .. } => Some(question),
            Self::Manual { .. } => None,
        }
    }
}

/// A record ready to be embedded and written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingRecord {
    /// Unique key.
    pub id: String,
    /// Text that gets embedded.
    pub document: String,
    /// Attached metadata.
    pub metadata: RecordMetadata,
}

/// Zip parallel id/document/metadata columns into records.
///
/// # Errors
/// Returns an error if the three columns differ in length.
pub fn zip_columns(
    ids: Vec<String>,
    documents: Vec<String>,
    metadatas: Vec<RecordMetadata>,
) -> CatalogResult<Vec<PendingRecord>> {
    if ids.len() != documents.len() || ids.len() != metadatas.len() {
        return Err(CatalogError::InvalidInput(format!(
            "column lengths differ: {} ids, {} documents, {} metadatas",
            ids.len(),
            documents.len(),
            metadatas.len()
        )));
    }

    Ok(ids
        .into_iter()
        .zip(documents)
        .zip(metadatas)
        .map(|((id, document), metadata)| PendingRecord {
            id,
            document,
            metadata,
        })
        .collect())
}

/// A persisted record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Unique key.
    pub id: String,
    /// Embedded text.
    pub document: String,
    /// Attached metadata.
    pub metadata: RecordMetadata,
    /// Embedding vector.
    pub embedding: Vec<f32>,
    /// Insert time.
    pub created_at: DateTime<Utc>,
}

/// A similarity query hit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryMatch {
    /// Record key.
    pub id: String,
    /// Embedded text.
    pub document: String,
    /// Attached metadata.
    pub metadata: RecordMetadata,
    /// Distance to the query under the collection metric; lower is closer.
    pub distance: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_text_joins_fields() {
        let item = Item::new(" X ", "Y", "Z\n").unwrap();
        assert_eq!(item.introduction, "X");
        assert_eq!(item.full_text, "X\nY\nZ");
    }

    #[test]
    fn test_empty_field_is_rejected() {
        assert!(Item::new("X", "   ", "Z").is_err());
    }

    #[test]
    fn test_metadata_serializes_flat() {
        let source = SourceId::new("vid1").unwrap();
        let item = Item::new("intro", "talk", "why?").unwrap();
        let json = serde_json::to_value(item.metadata(&source)).unwrap();
        assert_eq!(json["source_id"], "vid1");
        assert_eq!(json["question"], "why?");

        let manual = RecordMetadata::Manual {
            answer: "A".to_string(),
            topic: DEFAULT_TOPIC.to_string(),
        };
        let json = serde_json::to_string(&manual).unwrap();
        let back: RecordMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, manual);
        assert!(back.source_id().is_none());
    }

    #[test]
    fn test_zip_columns_checks_lengths() {
        let source = SourceId::new("vid1").unwrap();
        let item = Item::new("a", "b", "c").unwrap();
        let ok = zip_columns(
            vec!["vid1_0".to_string()],
            vec![item.full_text.clone()],
            vec![item.metadata(&source)],
        );
        assert_eq!(ok.unwrap().len(), 1);

        let err = zip_columns(
            vec!["vid1_0".to_string(), "vid1_1".to_string()],
            vec![item.full_text.clone()],
            vec![item.metadata(&source)],
        );
        assert!(matches!(err, Err(CatalogError::InvalidInput(_))));
    }
}
