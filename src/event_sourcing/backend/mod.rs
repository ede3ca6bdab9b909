use async_trait::async_trait;
use uuid::Uuid;

use super::core::RecordedEvent;
use super::error::StoreError;

// ============================================================================
// Backend Driver Contract
// ============================================================================
//
// One driver per storage engine, all implementing the same append/read
// contract. Drivers work exclusively in RecordedEvent (serialized payloads)
// and translate their native failures into StoreError.
//
// Per-stream serializability of append is the driver's responsibility:
// - mysql:  row lock on the head + (stream_id, version) primary key
// - scylla: single-partition LWT on the stream_heads row
// - redis:  atomic Lua script guarding the list length
// - memory: write lock on the stream map
//
// ============================================================================

mod memory;
mod mysql;
pub(crate) mod redis;
mod scylla;

pub use self::memory::MemoryBackend;
pub use self::mysql::MySqlBackend;
pub use self::redis::RedisBackend;
pub use self::scylla::ScyllaBackend;

/// Storage contract every backend driver implements.
///
/// `events` arrive with versions already stamped `expected + 1 ..= expected + n`
/// by the store; the driver's job is the atomic expected-version check plus
/// the write, nothing else.
#[async_trait]
pub trait EventBackend: Send + Sync {
    /// Append atomically, failing with `ConcurrencyConflict` when the stream
    /// head does not match `expected_version`. Returns the new head version.
    async fn append(
        &self,
        stream_id: Uuid,
        expected_version: i64,
        events: Vec<RecordedEvent>,
    ) -> Result<i64, StoreError>;

    /// Read up to `limit` events with `version > after_version`, ascending.
    async fn read_page(
        &self,
        stream_id: Uuid,
        after_version: i64,
        limit: usize,
    ) -> Result<Vec<RecordedEvent>, StoreError>;

    /// Current head version of the stream; 0 for a stream with no events.
    async fn current_version(&self, stream_id: Uuid) -> Result<i64, StoreError>;
}
