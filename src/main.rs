use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

mod config;
mod domain;
mod event_sourcing;
mod metrics;

use config::StoreConfig;
use domain::account::{AccountAggregate, AccountCommand, AccountCommandHandler, AccountEvent};
use event_sourcing::backend::{
    EventBackend, MemoryBackend, MySqlBackend, RedisBackend, ScyllaBackend,
};
use event_sourcing::store::{
    EventStore, MemorySnapshotCache, RedisSnapshotCache, SnapshotCache, SnapshotPolicy,
    Snapshotter,
};
use futures_util::TryStreamExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,event_store=debug"))
        )
        .init();

    tracing::info!("🚀 Starting multi-backend event store demo");

    // === 1. Read backend endpoints from the environment ===
    let store_config = StoreConfig::from_env()?;
    tracing::info!(
        cassandra = store_config.cassandra_hosts.is_some(),
        mysql = store_config.mysql.is_some(),
        redis = store_config.redis.is_some(),
        "Configured backends"
    );

    // === 2. Initialize Prometheus metrics ===
    tracing::info!("Initializing metrics");
    let store_metrics = Arc::new(metrics::StoreMetrics::new()?);
    tracing::info!(
        "📊 Metrics registry created with {} metrics",
        store_metrics.registry().gather().len()
    );

    // Start metrics HTTP server in background thread
    let metrics_registry = Arc::new(store_metrics.registry().clone());
    std::thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().expect("metrics runtime");
        rt.block_on(async {
            if let Err(e) = metrics::start_metrics_server(metrics_registry, 9090).await {
                tracing::error!("Metrics server error: {}", e);
            }
        });
    });

    // === 3. Select the event backend (wide-column, then relational,
    //        then cache, else in-memory) ===
    let backend: Arc<dyn EventBackend> = if let Some(hosts) = &store_config.cassandra_hosts {
        let scylla = ScyllaBackend::connect(hosts).await?;
        scylla.setup().await?;
        Arc::new(scylla)
    } else if let Some(mysql_config) = &store_config.mysql {
        let mysql = MySqlBackend::connect(mysql_config).await?;
        mysql.setup().await?;
        Arc::new(mysql)
    } else if let Some(redis_config) = &store_config.redis {
        Arc::new(RedisBackend::connect(redis_config).await?)
    } else {
        tracing::warn!("No backend endpoints configured; using in-memory store");
        Arc::new(MemoryBackend::new())
    };

    // === 4. Snapshot cache (Redis when configured) ===
    let snapshot_cache: Arc<dyn SnapshotCache> = match &store_config.redis {
        Some(redis_config) => Arc::new(RedisSnapshotCache::connect(redis_config).await?),
        None => Arc::new(MemorySnapshotCache::new()),
    };

    // === 5. Wire store, snapshotter and command handler ===
    let event_store = Arc::new(
        EventStore::<AccountEvent>::new(backend, "Account")
            .with_metrics(store_metrics.clone()),
    );
    let snapshotter = Arc::new(
        Snapshotter::new(event_store.clone(), snapshot_cache)
            .with_metrics(store_metrics.clone()),
    );
    let handler = AccountCommandHandler::new(
        event_store.clone(),
        snapshotter.clone(),
        SnapshotPolicy::Every(3),
    );

    // === 6. Demonstrate the account lifecycle ===
    tracing::info!("📝 Demonstrating account lifecycle");

    let account_id = Uuid::new_v4();
    let correlation_id = Uuid::new_v4();

    handler
        .handle(
            account_id,
            AccountCommand::OpenAccount {
                account_id,
                owner: "Ada Lovelace".to_string(),
                initial_balance: 10_000,
            },
            correlation_id,
        )
        .await?;
    tracing::info!("✅ Account opened: {}", account_id);

    handler
        .handle(account_id, AccountCommand::Deposit { amount: 2_500 }, correlation_id)
        .await?;
    handler
        .handle(account_id, AccountCommand::Withdraw { amount: 1_200 }, correlation_id)
        .await?;

    // Snapshot-accelerated read at the stream head
    let account: AccountAggregate = snapshotter.latest(account_id).await?;
    tracing::info!(
        balance = account.balance,
        version = account.version,
        "💰 Account state via snapshot layer"
    );

    handler
        .handle(account_id, AccountCommand::Deposit { amount: 700 }, correlation_id)
        .await?;
    handler
        .handle(account_id, AccountCommand::CloseAccount, correlation_id)
        .await?;
    tracing::info!("✅ Account closed: {}", account_id);

    // Lazy replay of the full history
    let mut history = Box::pin(event_store.read(account_id, 0));
    while let Some(envelope) = history.try_next().await? {
        tracing::info!(
            version = envelope.version,
            event_type = %envelope.event_type,
            "📜 Replayed {:?}",
            envelope.event_data
        );
    }

    // Keep the app alive briefly so the metrics endpoint can be scraped
    tracing::info!("⏳ Metrics available on http://0.0.0.0:9090/metrics");
    tokio::time::sleep(tokio::time::Duration::from_secs(10)).await;

    tracing::info!("🎉 Demo complete!");

    Ok(())
}
