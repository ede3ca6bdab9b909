use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::RedisConfig;
use crate::event_sourcing::backend::redis::map_redis_error;
use crate::event_sourcing::core::{Aggregate, DomainEvent};
use crate::event_sourcing::error::StoreError;
use crate::metrics::StoreMetrics;
use super::event_store::EventStore;

// ============================================================================
// Snapshot/Cache Layer
// ============================================================================
//
// Accelerates read-model reconstruction: instead of folding a stream from
// version 1 on every load, the snapshotter caches the aggregate state at a
// version and replays only the events past it. A snapshot is logically stale
// the moment the stream grows past its version, but it is still a valid
// replay base - staleness only costs extra events, never correctness.
//
// ============================================================================

/// Cached projection of a stream at a given version.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StoredSnapshot {
    pub stream_id: Uuid,
    pub version: i64,
    pub state: String, // aggregate state as JSON
    pub taken_at: DateTime<Utc>,
}

/// Cache contract for snapshots; Redis in production, in-memory in tests.
#[async_trait]
pub trait SnapshotCache: Send + Sync {
    async fn get(&self, stream_id: Uuid) -> Result<Option<StoredSnapshot>, StoreError>;
    async fn put(&self, snapshot: StoredSnapshot) -> Result<(), StoreError>;
}

// ============================================================================
// Snapshot Policy
// ============================================================================

/// Rule deciding after which versions a snapshot is taken automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotPolicy {
    Never,
    /// Snapshot whenever the stream version is a multiple of the period.
    Every(i64),
}

impl SnapshotPolicy {
    pub fn should_snapshot(&self, version: i64) -> bool {
        match self {
            SnapshotPolicy::Never => false,
            SnapshotPolicy::Every(period) if *period > 0 => version % period == 0,
            SnapshotPolicy::Every(_) => false,
        }
    }
}

// ============================================================================
// Snapshotter
// ============================================================================

pub struct Snapshotter<E: DomainEvent> {
    store: Arc<EventStore<E>>,
    cache: Arc<dyn SnapshotCache>,
    metrics: Option<Arc<StoreMetrics>>,
}

impl<E: DomainEvent> Snapshotter<E> {
    pub fn new(store: Arc<EventStore<E>>, cache: Arc<dyn SnapshotCache>) -> Self {
        Self {
            store,
            cache,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<StoreMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Aggregate state at `version`: cached if current, caught up from a
    /// stale snapshot if possible, folded from scratch otherwise.
    ///
    /// Writes through to the cache whenever the result is newer than what
    /// is cached; the cache never regresses to an older version.
    pub async fn get_or_build<A>(&self, stream_id: Uuid, version: i64) -> Result<A, StoreError>
    where
        A: Aggregate<Event = E> + Serialize + DeserializeOwned,
        <A as Aggregate>::Error: std::fmt::Display,
    {
        let cached = self.cache.get(stream_id).await?;
        let cached_version = cached.as_ref().map(|s| s.version);

        if let Some(snapshot) = &cached {
            if snapshot.version == version {
                self.record_hit();
                tracing::debug!(stream_id = %stream_id, version, "Snapshot cache hit");
                return Ok(serde_json::from_str(&snapshot.state)?);
            }
        }

        self.record_miss();

        let aggregate = match cached {
            Some(snapshot) if snapshot.version < version => {
                tracing::debug!(
                    stream_id = %stream_id,
                    cached_version = snapshot.version,
                    version,
                    "Catching up from stale snapshot"
                );
                let mut aggregate: A = serde_json::from_str(&snapshot.state)?;
                self.replay_onto(&mut aggregate, stream_id, snapshot.version, version)
                    .await?;
                aggregate
            }
            _ => {
                let events: Vec<_> = self
                    .store
                    .read(stream_id, 0)
                    .try_take_while(|e| futures_util::future::ready(Ok(e.version <= version)))
                    .try_collect()
                    .await?;

                if events.is_empty() {
                    return Err(StoreError::StreamNotFound(stream_id));
                }

                A::load_from_events(events)?
            }
        };

        if cached_version.map_or(true, |v| v < aggregate.version()) {
            self.write_through(stream_id, &aggregate).await?;
        }

        Ok(aggregate)
    }

    /// Aggregate state at the current stream head.
    pub async fn latest<A>(&self, stream_id: Uuid) -> Result<A, StoreError>
    where
        A: Aggregate<Event = E> + Serialize + DeserializeOwned,
        <A as Aggregate>::Error: std::fmt::Display,
    {
        let head = self.store.current_version(stream_id).await?;
        if head == 0 {
            return Err(StoreError::StreamNotFound(stream_id));
        }

        self.get_or_build(stream_id, head).await
    }

    /// Snapshot the stream head, returning the version snapshotted.
    pub async fn take_snapshot<A>(&self, stream_id: Uuid) -> Result<i64, StoreError>
    where
        A: Aggregate<Event = E> + Serialize + DeserializeOwned,
        <A as Aggregate>::Error: std::fmt::Display,
    {
        let aggregate: A = self.latest(stream_id).await?;
        let version = aggregate.version();

        tracing::info!(
            stream_id = %stream_id,
            version,
            "📸 Snapshot taken at stream head"
        );

        Ok(version)
    }

    async fn replay_onto<A>(
        &self,
        aggregate: &mut A,
        stream_id: Uuid,
        from_version: i64,
        to_version: i64,
    ) -> Result<(), StoreError>
    where
        A: Aggregate<Event = E>,
        <A as Aggregate>::Error: std::fmt::Display,
    {
        let events: Vec<_> = self
            .store
            .read(stream_id, from_version)
            .try_take_while(|e| futures_util::future::ready(Ok(e.version <= to_version)))
            .try_collect()
            .await?;

        for envelope in events {
            aggregate
                .apply_event(&envelope.event_data)
                .map_err(|e| StoreError::Backend {
                    backend: "aggregate",
                    detail: format!(
                        "failed to replay event v{} of {stream_id}: {e}",
                        envelope.version
                    ),
                })?;
            aggregate.set_version(envelope.version);
        }

        Ok(())
    }

    async fn write_through<A>(&self, stream_id: Uuid, aggregate: &A) -> Result<(), StoreError>
    where
        A: Aggregate<Event = E> + Serialize,
    {
        let snapshot = StoredSnapshot {
            stream_id,
            version: aggregate.version(),
            state: serde_json::to_string(aggregate)?,
            taken_at: Utc::now(),
        };

        self.cache.put(snapshot).await?;
        if let Some(metrics) = &self.metrics {
            metrics.record_snapshot_write();
        }
        Ok(())
    }

    fn record_hit(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.record_snapshot_hit();
        }
    }

    fn record_miss(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.record_snapshot_miss();
        }
    }
}

// ============================================================================
// Cache Implementations
// ============================================================================

/// In-process snapshot cache for tests and local development.
#[derive(Default)]
pub struct MemorySnapshotCache {
    snapshots: RwLock<HashMap<Uuid, StoredSnapshot>>,
}

impl MemorySnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotCache for MemorySnapshotCache {
    async fn get(&self, stream_id: Uuid) -> Result<Option<StoredSnapshot>, StoreError> {
        Ok(self.snapshots.read().await.get(&stream_id).cloned())
    }

    async fn put(&self, snapshot: StoredSnapshot) -> Result<(), StoreError> {
        self.snapshots.write().await.insert(snapshot.stream_id, snapshot);
        Ok(())
    }
}

/// Redis-backed snapshot cache, one JSON value per stream.
pub struct RedisSnapshotCache {
    conn: MultiplexedConnection,
}

impl RedisSnapshotCache {
    pub async fn connect(cfg: &RedisConfig) -> Result<Self, StoreError> {
        let url = format!("redis://{}:{}", cfg.host, cfg.port);
        let client = redis::Client::open(url).map_err(map_redis_error)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(map_redis_error)?;

        tracing::info!(host = %cfg.host, port = cfg.port, "Connected to Redis snapshot cache");
        Ok(Self { conn })
    }

    fn snapshot_key(stream_id: Uuid) -> String {
        format!("snapshot:{stream_id}")
    }
}

#[async_trait]
impl SnapshotCache for RedisSnapshotCache {
    async fn get(&self, stream_id: Uuid) -> Result<Option<StoredSnapshot>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(Self::snapshot_key(stream_id))
            .await
            .map_err(map_redis_error)?;

        raw.map(|json| serde_json::from_str(&json).map_err(StoreError::from))
            .transpose()
    }

    async fn put(&self, snapshot: StoredSnapshot) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(&snapshot)?;
        let _: () = conn
            .set(Self::snapshot_key(snapshot.stream_id), json)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
