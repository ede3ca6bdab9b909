use uuid::Uuid;

// ============================================================================
// Store Error Taxonomy
// ============================================================================
//
// Every backend driver translates its native failures into this single enum,
// so callers handle conflicts, outages and decode failures the same way no
// matter which storage engine sits underneath.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Optimistic concurrency check failed: another writer got there first.
    #[error("concurrency conflict on stream {stream_id}: expected version {expected}, current is {actual}")]
    ConcurrencyConflict {
        stream_id: Uuid,
        expected: i64,
        actual: i64,
    },

    /// The backend could not be reached (connection refused, timeout, I/O).
    #[error("{backend} unavailable: {detail}")]
    BackendUnavailable {
        backend: &'static str,
        detail: String,
    },

    /// Event payload or snapshot state failed to encode/decode.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Non-transient backend failure (schema, protocol, row decode).
    #[error("{backend} error: {detail}")]
    Backend {
        backend: &'static str,
        detail: String,
    },

    /// Rehydration was requested for a stream with no events.
    #[error("stream not found: {0}")]
    StreamNotFound(Uuid),

    /// Appending zero events is always a caller bug.
    #[error("cannot append an empty event list")]
    EmptyAppend,

    /// Missing or malformed environment configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// True when retrying against a healthy backend could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::BackendUnavailable { .. })
    }

    /// True for the expected-version race losers.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::ConcurrencyConflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_display_names_versions() {
        let stream_id = Uuid::new_v4();
        let err = StoreError::ConcurrencyConflict {
            stream_id,
            expected: 3,
            actual: 5,
        };

        let msg = err.to_string();
        assert!(msg.contains(&stream_id.to_string()));
        assert!(msg.contains("expected version 3"));
        assert!(msg.contains("current is 5"));
        assert!(err.is_conflict());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_unavailable_is_transient() {
        let err = StoreError::BackendUnavailable {
            backend: "mysql",
            detail: "connection refused".to_string(),
        };

        assert!(err.is_transient());
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_serialization_error_wraps_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: StoreError = serde_err.into();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
