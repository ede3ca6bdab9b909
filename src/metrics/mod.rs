// Private module declaration
mod server;

use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
};

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Append throughput, batch sizes and latency
// - Optimistic concurrency conflicts
// - Read volume
// - Snapshot cache effectiveness (hits/misses/writes)
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

/// Central metrics registry for the event store.
pub struct StoreMetrics {
    registry: Registry,

    // Append Metrics
    pub events_appended: IntCounterVec,
    pub append_conflicts: IntCounterVec,
    pub append_duration: HistogramVec,

    // Read Metrics
    pub events_read: IntCounterVec,

    // Snapshot Metrics
    pub snapshot_hits: IntCounter,
    pub snapshot_misses: IntCounter,
    pub snapshot_writes: IntCounter,
}

impl StoreMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        // Append Metrics
        let events_appended = IntCounterVec::new(
            Opts::new("store_events_appended_total", "Total events appended"),
            &["stream_category"],
        )?;
        registry.register(Box::new(events_appended.clone()))?;

        let append_conflicts = IntCounterVec::new(
            Opts::new(
                "store_append_conflicts_total",
                "Appends rejected by the expected-version check",
            ),
            &["stream_category"],
        )?;
        registry.register(Box::new(append_conflicts.clone()))?;

        let append_duration = HistogramVec::new(
            HistogramOpts::new("store_append_duration_seconds", "Append call duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["stream_category"],
        )?;
        registry.register(Box::new(append_duration.clone()))?;

        // Read Metrics
        let events_read = IntCounterVec::new(
            Opts::new("store_events_read_total", "Total events read from backends"),
            &["stream_category"],
        )?;
        registry.register(Box::new(events_read.clone()))?;

        // Snapshot Metrics
        let snapshot_hits = IntCounter::new(
            "store_snapshot_hits_total",
            "Snapshot requests served from the cache",
        )?;
        registry.register(Box::new(snapshot_hits.clone()))?;

        let snapshot_misses = IntCounter::new(
            "store_snapshot_misses_total",
            "Snapshot requests that required a rebuild",
        )?;
        registry.register(Box::new(snapshot_misses.clone()))?;

        let snapshot_writes = IntCounter::new(
            "store_snapshot_writes_total",
            "Snapshots written through to the cache",
        )?;
        registry.register(Box::new(snapshot_writes.clone()))?;

        Ok(Self {
            registry,
            events_appended,
            append_conflicts,
            append_duration,
            events_read,
            snapshot_hits,
            snapshot_misses,
            snapshot_writes,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a successful append of `count` events.
    pub fn record_append(&self, stream_category: &str, count: usize, duration_secs: f64) {
        self.events_appended
            .with_label_values(&[stream_category])
            .inc_by(count as u64);
        self.append_duration
            .with_label_values(&[stream_category])
            .observe(duration_secs);
    }

    /// Record an append rejected by the expected-version check.
    pub fn record_conflict(&self, stream_category: &str) {
        self.append_conflicts
            .with_label_values(&[stream_category])
            .inc();
    }

    /// Record `count` events fetched from a backend.
    pub fn record_read(&self, stream_category: &str, count: usize) {
        self.events_read
            .with_label_values(&[stream_category])
            .inc_by(count as u64);
    }

    pub fn record_snapshot_hit(&self) {
        self.snapshot_hits.inc();
    }

    pub fn record_snapshot_miss(&self) {
        self.snapshot_misses.inc();
    }

    pub fn record_snapshot_write(&self) {
        self.snapshot_writes.inc();
    }
}

impl Default for StoreMetrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}
