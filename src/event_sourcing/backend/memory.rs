use std::collections::HashMap;
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::event_sourcing::core::RecordedEvent;
use crate::event_sourcing::error::StoreError;
use super::EventBackend;

// ============================================================================
// In-Memory Backend
// ============================================================================
//
// Reference implementation used by unit tests and local development.
// Streams are plain vectors: because versions are contiguous from 1, the
// vector length IS the current version. The write lock serializes appends,
// which is exactly the per-stream guarantee the contract asks for.
//
// ============================================================================

#[derive(Default)]
pub struct MemoryBackend {
    streams: RwLock<HashMap<Uuid, Vec<RecordedEvent>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventBackend for MemoryBackend {
    async fn append(
        &self,
        stream_id: Uuid,
        expected_version: i64,
        events: Vec<RecordedEvent>,
    ) -> Result<i64, StoreError> {
        let mut streams = self.streams.write().await;
        let stream = streams.entry(stream_id).or_default();

        let actual = stream.len() as i64;
        if actual != expected_version {
            return Err(StoreError::ConcurrencyConflict {
                stream_id,
                expected: expected_version,
                actual,
            });
        }

        stream.extend(events);
        Ok(stream.len() as i64)
    }

    async fn read_page(
        &self,
        stream_id: Uuid,
        after_version: i64,
        limit: usize,
    ) -> Result<Vec<RecordedEvent>, StoreError> {
        let streams = self.streams.read().await;

        let stream = match streams.get(&stream_id) {
            Some(stream) => stream,
            None => return Ok(Vec::new()),
        };

        // Index = version - 1, so events after `after_version` start at
        // index `after_version`.
        let start = after_version.max(0) as usize;
        if start >= stream.len() {
            return Ok(Vec::new());
        }

        let end = (start + limit).min(stream.len());
        Ok(stream[start..end].to_vec())
    }

    async fn current_version(&self, stream_id: Uuid) -> Result<i64, StoreError> {
        let streams = self.streams.read().await;
        Ok(streams.get(&stream_id).map_or(0, |s| s.len() as i64))
    }
}
