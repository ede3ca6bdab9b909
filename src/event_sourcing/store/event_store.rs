use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use futures_util::{Stream, TryStreamExt};
use uuid::Uuid;

use crate::event_sourcing::backend::EventBackend;
use crate::event_sourcing::core::{
    Aggregate, DomainEvent, EventEnvelope, EventUpcaster, RecordedEvent,
};
use crate::event_sourcing::error::StoreError;
use crate::metrics::StoreMetrics;

// ============================================================================
// Generic Event Store - Repository for Events
// ============================================================================
//
// This is a GENERIC event store that works with ANY event type, polymorphic
// over the backend driver behind it.
//
// Type Parameter:
// - `E`: The domain event type (must implement DomainEvent trait)
//
// Responsibilities:
// 1. Append events append-only with optimistic concurrency control
// 2. Map typed envelopes to RecordedEvent at the driver boundary (and back)
// 3. Serve lazy, paged, restartable reads in ascending version order
// 4. Rehydrate aggregates from their event history
//
// ============================================================================

const DEFAULT_PAGE_SIZE: usize = 100;

pub struct EventStore<E: DomainEvent> {
    backend: Arc<dyn EventBackend>,
    stream_category: String, // e.g., "Account" - used for logs and metric labels
    page_size: usize,
    upcaster: Option<Arc<dyn EventUpcaster>>,
    metrics: Option<Arc<StoreMetrics>>,
    _phantom: PhantomData<E>,
}

impl<E: DomainEvent> EventStore<E> {
    pub fn new(backend: Arc<dyn EventBackend>, stream_category: &str) -> Self {
        Self {
            backend,
            stream_category: stream_category.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            upcaster: None,
            metrics: None,
            _phantom: PhantomData,
        }
    }

    /// Page size for lazy reads.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Register an upcaster applied to payloads older than `E::event_version()`.
    pub fn with_upcaster(mut self, upcaster: Arc<dyn EventUpcaster>) -> Self {
        self.upcaster = Some(upcaster);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<StoreMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Append events to the stream.
    ///
    /// Versions are stamped `expected_version + 1 ..= expected_version + n`
    /// here; whatever the caller put in the envelopes is overwritten. Fails
    /// with `ConcurrencyConflict` when another writer moved the stream head.
    /// Returns the new version number after appending.
    pub async fn append(
        &self,
        stream_id: Uuid,
        expected_version: i64,
        events: Vec<EventEnvelope<E>>,
    ) -> Result<i64, StoreError> {
        if events.is_empty() {
            return Err(StoreError::EmptyAppend);
        }

        let event_count = events.len();
        let mut records = Vec::with_capacity(event_count);

        for (offset, mut envelope) in events.into_iter().enumerate() {
            envelope.stream_id = stream_id;
            envelope.version = expected_version + 1 + offset as i64;
            records.push(envelope.into_record()?);
        }

        let started = Instant::now();
        let result = self.backend.append(stream_id, expected_version, records).await;

        match result {
            Ok(new_version) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_append(
                        &self.stream_category,
                        event_count,
                        started.elapsed().as_secs_f64(),
                    );
                }

                tracing::info!(
                    stream_id = %stream_id,
                    stream_category = %self.stream_category,
                    new_version = new_version,
                    event_count = event_count,
                    "✅ Appended events to stream"
                );

                Ok(new_version)
            }
            Err(e) => {
                if e.is_conflict() {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_conflict(&self.stream_category);
                    }
                    tracing::warn!(
                        stream_id = %stream_id,
                        stream_category = %self.stream_category,
                        "Append lost the expected-version race"
                    );
                }
                Err(e)
            }
        }
    }

    /// Lazy, finite, restartable read of a stream in ascending version order.
    ///
    /// `from_version` is exclusive: pass 0 to read everything. Pages of
    /// `page_size` records are fetched on demand as the stream is polled.
    pub fn read(
        &self,
        stream_id: Uuid,
        from_version: i64,
    ) -> impl Stream<Item = Result<EventEnvelope<E>, StoreError>> + '_ {
        struct ReadState {
            after: i64,
            buffer: VecDeque<RecordedEvent>,
            exhausted: bool,
        }

        let state = ReadState {
            after: from_version,
            buffer: VecDeque::new(),
            exhausted: false,
        };

        futures_util::stream::try_unfold(state, move |mut state| async move {
            loop {
                if let Some(record) = state.buffer.pop_front() {
                    let envelope = record.into_envelope::<E>(self.upcaster.as_deref())?;
                    return Ok(Some((envelope, state)));
                }

                if state.exhausted {
                    return Ok(None);
                }

                let page = self
                    .backend
                    .read_page(stream_id, state.after, self.page_size)
                    .await?;

                if let Some(metrics) = &self.metrics {
                    metrics.record_read(&self.stream_category, page.len());
                }

                // A short page means the stream head is reached.
                if page.len() < self.page_size {
                    state.exhausted = true;
                }

                match page.last() {
                    Some(last) => state.after = last.version,
                    None => return Ok(None),
                }

                state.buffer.extend(page);
            }
        })
    }

    /// Collect a read into a vector.
    pub async fn list(
        &self,
        stream_id: Uuid,
        from_version: i64,
    ) -> Result<Vec<EventEnvelope<E>>, StoreError> {
        self.read(stream_id, from_version).try_collect().await
    }

    /// The envelope at the stream head, if any.
    pub async fn last_event(&self, stream_id: Uuid) -> Result<Option<EventEnvelope<E>>, StoreError> {
        let version = self.backend.current_version(stream_id).await?;
        if version == 0 {
            return Ok(None);
        }

        let page = self.backend.read_page(stream_id, version - 1, 1).await?;
        page.into_iter()
            .next()
            .map(|record| record.into_envelope::<E>(self.upcaster.as_deref()))
            .transpose()
    }

    /// Current head version of the stream (0 for an unknown stream).
    pub async fn current_version(&self, stream_id: Uuid) -> Result<i64, StoreError> {
        self.backend.current_version(stream_id).await
    }

    /// Check if the stream has any events.
    pub async fn stream_exists(&self, stream_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.current_version(stream_id).await? > 0)
    }

    /// Rehydrate an aggregate by folding its event history.
    pub async fn load_aggregate<A>(&self, stream_id: Uuid) -> Result<A, StoreError>
    where
        A: Aggregate<Event = E>,
        <A as Aggregate>::Error: std::fmt::Display,
    {
        let events = self.list(stream_id, 0).await?;

        if events.is_empty() {
            return Err(StoreError::StreamNotFound(stream_id));
        }

        tracing::debug!(
            stream_id = %stream_id,
            event_count = events.len(),
            "Rehydrating aggregate from events"
        );

        A::load_from_events(events)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::{AccountAggregate, AccountEvent, AccountOpened, FundsDeposited};
    use crate::event_sourcing::backend::MemoryBackend;
    use futures_util::StreamExt;

    fn store_on(backend: Arc<MemoryBackend>) -> EventStore<AccountEvent> {
        EventStore::new(backend, "Account")
    }

    fn opened(stream_id: Uuid, owner: &str) -> EventEnvelope<AccountEvent> {
        EventEnvelope::new(
            stream_id,
            1,
            "AccountOpened".to_string(),
            AccountEvent::Opened(AccountOpened {
                account_id: stream_id,
                owner: owner.to_string(),
                initial_balance: 100,
            }),
            Uuid::new_v4(),
        )
    }

    fn deposited(stream_id: Uuid, version: i64, amount: i64) -> EventEnvelope<AccountEvent> {
        EventEnvelope::new(
            stream_id,
            version,
            "FundsDeposited".to_string(),
            AccountEvent::Deposited(FundsDeposited { amount }),
            Uuid::new_v4(),
        )
    }

    #[tokio::test]
    async fn test_sequential_appends_read_back_in_order() {
        let store = store_on(Arc::new(MemoryBackend::new()));
        let stream_id = Uuid::new_v4();

        store.append(stream_id, 0, vec![opened(stream_id, "alice")]).await.unwrap();
        for version in 2..=6 {
            store
                .append(stream_id, version - 1, vec![deposited(stream_id, version, 10)])
                .await
                .unwrap();
        }

        let events = store.list(stream_id, 0).await.unwrap();
        assert_eq!(events.len(), 6);
        let versions: Vec<i64> = events.iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_append_stamps_versions() {
        let store = store_on(Arc::new(MemoryBackend::new()));
        let stream_id = Uuid::new_v4();

        // Envelope versions are deliberately wrong; the store overwrites them.
        let batch = vec![
            deposited(stream_id, 99, 1),
            deposited(stream_id, 99, 2),
        ];

        // First event of a fresh stream must be an opening event for the
        // aggregate, but the store itself does not care about event order.
        let new_version = store.append(stream_id, 0, batch).await.unwrap();
        assert_eq!(new_version, 2);

        let events = store.list(stream_id, 0).await.unwrap();
        assert_eq!(events[0].version, 1);
        assert_eq!(events[1].version, 2);
    }

    #[tokio::test]
    async fn test_empty_append_is_rejected() {
        let store = store_on(Arc::new(MemoryBackend::new()));
        let err = store.append(Uuid::new_v4(), 0, vec![]).await.unwrap_err();
        assert!(matches!(err, StoreError::EmptyAppend));
    }

    #[tokio::test]
    async fn test_concurrent_appends_one_winner() {
        let store = Arc::new(store_on(Arc::new(MemoryBackend::new())));
        let stream_id = Uuid::new_v4();

        store.append(stream_id, 0, vec![opened(stream_id, "alice")]).await.unwrap();

        // Ten writers race with the same expected version.
        let attempts = (0..10).map(|_| {
            let store = store.clone();
            async move {
                store
                    .append(stream_id, 1, vec![deposited(stream_id, 2, 5)])
                    .await
            }
        });

        let outcomes = futures_util::future::join_all(attempts).await;

        let successes = outcomes.iter().filter(|r| r.is_ok()).count();
        let conflicts = outcomes
            .iter()
            .filter(|r| matches!(r, Err(e) if e.is_conflict()))
            .count();

        assert_eq!(successes, 1);
        assert_eq!(conflicts, 9);
        assert_eq!(store.current_version(stream_id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_paged_read_crosses_page_boundaries() {
        let backend = Arc::new(MemoryBackend::new());
        let store = store_on(backend).with_page_size(2);
        let stream_id = Uuid::new_v4();

        store.append(stream_id, 0, vec![opened(stream_id, "alice")]).await.unwrap();
        store
            .append(
                stream_id,
                1,
                (2..=7).map(|v| deposited(stream_id, v, v)).collect(),
            )
            .await
            .unwrap();

        // 7 events over page_size 2 = 4 fetches, no loss, no duplication.
        let events = store.list(stream_id, 0).await.unwrap();
        let versions: Vec<i64> = events.iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[tokio::test]
    async fn test_read_is_restartable_from_any_version() {
        let store = store_on(Arc::new(MemoryBackend::new())).with_page_size(3);
        let stream_id = Uuid::new_v4();

        store.append(stream_id, 0, vec![opened(stream_id, "alice")]).await.unwrap();
        store
            .append(
                stream_id,
                1,
                (2..=5).map(|v| deposited(stream_id, v, v)).collect(),
            )
            .await
            .unwrap();

        let tail = store.list(stream_id, 3).await.unwrap();
        let versions: Vec<i64> = tail.iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![4, 5]);

        // Restarting the same read produces the same sequence.
        let again = store.list(stream_id, 3).await.unwrap();
        assert_eq!(again.len(), tail.len());
    }

    #[tokio::test]
    async fn test_read_is_lazy() {
        let store = store_on(Arc::new(MemoryBackend::new())).with_page_size(1);
        let stream_id = Uuid::new_v4();

        store.append(stream_id, 0, vec![opened(stream_id, "alice")]).await.unwrap();
        store.append(stream_id, 1, vec![deposited(stream_id, 2, 10)]).await.unwrap();

        // Polling only the first item must not require draining the stream.
        let mut stream = Box::pin(store.read(stream_id, 0));
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.version, 1);
        drop(stream);
    }

    #[tokio::test]
    async fn test_head_queries() {
        let store = store_on(Arc::new(MemoryBackend::new()));
        let stream_id = Uuid::new_v4();

        assert!(!store.stream_exists(stream_id).await.unwrap());
        assert!(store.last_event(stream_id).await.unwrap().is_none());

        store.append(stream_id, 0, vec![opened(stream_id, "alice")]).await.unwrap();
        store.append(stream_id, 1, vec![deposited(stream_id, 2, 42)]).await.unwrap();

        assert!(store.stream_exists(stream_id).await.unwrap());
        assert_eq!(store.current_version(stream_id).await.unwrap(), 2);

        let head = store.last_event(stream_id).await.unwrap().unwrap();
        assert_eq!(head.version, 2);
        assert!(matches!(
            head.event_data,
            AccountEvent::Deposited(FundsDeposited { amount: 42 })
        ));
    }

    #[tokio::test]
    async fn test_load_aggregate_round_trip() {
        let store = store_on(Arc::new(MemoryBackend::new()));
        let stream_id = Uuid::new_v4();

        store.append(stream_id, 0, vec![opened(stream_id, "alice")]).await.unwrap();
        store.append(stream_id, 1, vec![deposited(stream_id, 2, 50)]).await.unwrap();

        let account: AccountAggregate = store.load_aggregate(stream_id).await.unwrap();
        assert_eq!(account.balance, 150);
        assert_eq!(account.version, 2);
    }

    #[tokio::test]
    async fn test_load_aggregate_missing_stream() {
        let store = store_on(Arc::new(MemoryBackend::new()));
        let stream_id = Uuid::new_v4();

        let err = store.load_aggregate::<AccountAggregate>(stream_id).await.unwrap_err();
        assert!(matches!(err, StoreError::StreamNotFound(id) if id == stream_id));
    }

    #[tokio::test]
    async fn test_upcaster_applies_to_legacy_records() {
        struct OwnerRename;

        impl EventUpcaster for OwnerRename {
            fn upcast(&self, _from_version: i32, payload: &str) -> Result<String, StoreError> {
                // v0 payloads used "holder" for the owner field
                Ok(payload.replace("\"holder\"", "\"owner\""))
            }
        }

        let backend = Arc::new(MemoryBackend::new());
        let stream_id = Uuid::new_v4();

        // Plant a legacy record straight into the backend.
        let legacy = RecordedEvent {
            event_id: Uuid::new_v4(),
            stream_id,
            version: 1,
            event_type: "AccountOpened".to_string(),
            event_version: 0,
            payload: format!(
                r#"{{"type":"Opened","data":{{"account_id":"{stream_id}","holder":"alice","initial_balance":100}}}}"#
            ),
            causation_id: None,
            correlation_id: Uuid::new_v4(),
            recorded_at: chrono::Utc::now(),
        };
        backend.append(stream_id, 0, vec![legacy]).await.unwrap();

        let store = store_on(backend).with_upcaster(Arc::new(OwnerRename));
        let events = store.list(stream_id, 0).await.unwrap();

        assert_eq!(events.len(), 1);
        match &events[0].event_data {
            AccountEvent::Opened(e) => assert_eq!(e.owner, "alice"),
            other => panic!("wrong event after upcast: {other:?}"),
        }
    }
}
