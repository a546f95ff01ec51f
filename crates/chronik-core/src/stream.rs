//! Stream identity and optimistic-concurrency preconditions.

use serde::{Deserialize, Serialize};

use crate::error::EsError;

/// Opaque, non-empty key identifying one append-only log partition.
///
/// The canonical form for aggregate streams is `{aggregateType}-{aggregateId}`,
/// built via [`StreamId::for_aggregate`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    /// Creates a stream id from a raw string.
    ///
    /// # Errors
    ///
    /// Returns [`EsError::Validation`] if the id is empty or whitespace-only.
    pub fn new(id: impl Into<String>) -> Result<Self, EsError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(EsError::Validation("stream id must not be empty".into()));
        }
        Ok(Self(id))
    }

    /// Builds the canonical `{aggregateType}-{aggregateId}` stream id.
    ///
    /// # Errors
    ///
    /// Returns [`EsError::Validation`] if either part is empty.
    pub fn for_aggregate(aggregate_type: &str, aggregate_id: &str) -> Result<Self, EsError> {
        if aggregate_type.trim().is_empty() || aggregate_id.trim().is_empty() {
            return Err(EsError::Validation(
                "aggregate type and id must not be empty".into(),
            ));
        }
        Ok(Self(format!("{aggregate_type}-{aggregate_id}")))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StreamId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Optimistic-concurrency precondition supplied on append. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// The stream must be at exactly this version.
    Exact(i64),
    /// The stream must not exist yet.
    NoStream,
    /// The stream must already exist, at any version.
    StreamExists,
    /// No precondition; the append always passes the version check.
    Any,
}

impl ExpectedVersion {
    /// Checks the precondition against the current stream version
    /// (`None` when the stream has never been appended to).
    #[must_use]
    pub fn is_satisfied_by(self, current: Option<i64>) -> bool {
        match self {
            Self::Exact(v) => current == Some(v),
            Self::NoStream => current.is_none(),
            Self::StreamExists => current.is_some(),
            Self::Any => true,
        }
    }
}

impl std::fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact(v) => write!(f, "version {v}"),
            Self::NoStream => f.write_str("no stream"),
            Self::StreamExists => f.write_str("an existing stream"),
            Self::Any => f.write_str("any version"),
        }
    }
}

/// Where a [`read_stream`](crate::store::EventStore::read_stream) begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStart {
    /// Begin at position 0.
    Start,
    /// Return at most the single most-recent event.
    End,
    /// Skip to this per-stream position.
    At(i64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_id_rejects_empty_input() {
        assert!(StreamId::new("").is_err());
        assert!(StreamId::new("   ").is_err());
    }

    #[test]
    fn stream_id_canonical_form() {
        let id = StreamId::for_aggregate("Order", "123").unwrap();
        assert_eq!(id.as_str(), "Order-123");
    }

    #[test]
    fn for_aggregate_rejects_empty_parts() {
        assert!(StreamId::for_aggregate("", "123").is_err());
        assert!(StreamId::for_aggregate("Order", " ").is_err());
    }

    #[test]
    fn expected_version_exact_matches_only_that_version() {
        assert!(ExpectedVersion::Exact(3).is_satisfied_by(Some(3)));
        assert!(!ExpectedVersion::Exact(3).is_satisfied_by(Some(2)));
        assert!(!ExpectedVersion::Exact(3).is_satisfied_by(None));
    }

    #[test]
    fn expected_version_no_stream_fails_on_existing_stream() {
        assert!(ExpectedVersion::NoStream.is_satisfied_by(None));
        assert!(!ExpectedVersion::NoStream.is_satisfied_by(Some(0)));
    }

    #[test]
    fn expected_version_stream_exists_requires_a_stream() {
        assert!(ExpectedVersion::StreamExists.is_satisfied_by(Some(0)));
        assert!(!ExpectedVersion::StreamExists.is_satisfied_by(None));
    }

    #[test]
    fn expected_version_any_never_fails() {
        assert!(ExpectedVersion::Any.is_satisfied_by(None));
        assert!(ExpectedVersion::Any.is_satisfied_by(Some(41)));
    }
}
