//! Identifier types for stored questions.
//!
//! Two id schemes share one collection:
//! - transcript items are keyed `"{source_id}_{ordinal}"`, where the ordinal is
//!   the zero-based position inside the ingested batch. Re-ingesting a source
//!   replaces every record of that source, so ordinals never go stale.
//! - manually added items are keyed `"q_{uuid}"` and never collide.

use core::fmt;
use core::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::core::errors::{CatalogError, CatalogResult};

/// Maximum accepted length of a source id.
pub const MAX_SOURCE_ID_LEN: usize = 128;

/// Prefix of manually added record ids.
pub const MANUAL_ID_PREFIX: &str = "q_";

/// Identifier of the transcript a batch was extracted from (e.g. a video id).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SourceId(String);

impl SourceId {
    /// Validate and wrap a source id.
    ///
    /// # Errors
    /// Returns an error unless the id is 1..=128 characters of `[A-Za-z0-9_-]`.
    pub fn new(raw: impl Into<String>) -> CatalogResult<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CatalogError::InvalidInput(
                "source id is empty".to_string(),
            ));
        }
        if trimmed.len() > MAX_SOURCE_ID_LEN {
            return Err(CatalogError::InvalidInput(format!(
                "source id exceeds {MAX_SOURCE_ID_LEN} characters"
            )));
        }
        if !trimmed
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
        {
            return Err(CatalogError::InvalidInput(format!(
                "source id {trimmed:?} may only contain letters, digits, '_' and '-'"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Extract the video id from a YouTube URL.
    ///
    /// Accepts `watch?v=`, `youtu.be/`, `embed/` and `shorts/` forms.
    ///
    /// # Errors
    /// Returns an error if no video id can be found or it is not a valid source id.
    pub fn from_video_url(url: &str) -> CatalogResult<Self> {
        let patterns = [
            r"(?:youtube\.com/watch\?(?:[^#\s]*&)?v=|youtu\.be/|youtube\.com/embed/)([^&\n?#/]+)",
            r"youtube\.com/shorts/([^&\n?#/]+)",
        ];
        for pattern in patterns {
            let regex = Regex::new(pattern)
                .map_err(|err| CatalogError::InvalidConfig(format!("invalid regex: {err}")))?;
            if let Some(found) = regex.captures(url).and_then(|caps| caps.get(1)) {
                return Self::new(found.as_str());
            }
        }
        Err(CatalogError::InvalidInput(format!(
            "unrecognised video url: {url}"
        )))
    }

    /// Borrow the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Id of the record at `ordinal` within a batch from this source.
    #[must_use]
    pub fn record_id(&self, ordinal: usize) -> String {
        format!("{}_{ordinal}", self.0)
    }

    /// Ids for a batch of `len` items, in order.
    #[must_use]
    pub fn record_ids(&self, len: usize) -> Vec<String> {
        (0..len).map(|ordinal| self.record_id(ordinal)).collect()
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SourceId {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SourceId {
    type Error = CatalogError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SourceId> for String {
    fn from(value: SourceId) -> Self {
        value.0
    }
}

impl AsRef<str> for SourceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Generate a collision-resistant id for a manually added record.
#[must_use]
pub fn manual_record_id() -> String {
    format!("{MANUAL_ID_PREFIX}{}", Uuid::new_v4().simple())
}
