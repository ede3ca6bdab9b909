use std::sync::Arc;
use uuid::Uuid;
use anyhow::{Result, bail};

use crate::event_sourcing::core::{Aggregate, EventEnvelope};
use crate::event_sourcing::store::{EventStore, SnapshotPolicy, Snapshotter};

use super::aggregate::AccountAggregate;
use super::commands::AccountCommand;
use super::events::{AccountEvent, AccountOpened};

// ============================================================================
// Account Command Handler
// ============================================================================
//
// Orchestrates: Command → Aggregate → Events → Event Store → Snapshot Policy
//
// ============================================================================

pub struct AccountCommandHandler {
    event_store: Arc<EventStore<AccountEvent>>,
    snapshotter: Arc<Snapshotter<AccountEvent>>,
    snapshot_policy: SnapshotPolicy,
}

impl AccountCommandHandler {
    pub fn new(
        event_store: Arc<EventStore<AccountEvent>>,
        snapshotter: Arc<Snapshotter<AccountEvent>>,
        snapshot_policy: SnapshotPolicy,
    ) -> Self {
        Self {
            event_store,
            snapshotter,
            snapshot_policy,
        }
    }

    /// Handle a command and persist resulting events.
    /// Returns the new stream version after the append.
    pub async fn handle(
        &self,
        account_id: Uuid,
        command: AccountCommand,
        correlation_id: Uuid,
    ) -> Result<i64> {
        // Load current aggregate state
        let aggregate = if self.event_store.stream_exists(account_id).await? {
            self.event_store.load_aggregate::<AccountAggregate>(account_id).await?
        } else {
            // For OpenAccount there is no history yet; validate against a
            // blank aggregate instead.
            match &command {
                AccountCommand::OpenAccount { .. } => {
                    let event = AccountEvent::Opened(AccountOpened {
                        account_id,
                        owner: String::new(),
                        initial_balance: 0,
                    });
                    AccountAggregate::apply_first_event(&event)?
                }
                _ => bail!("Account does not exist: {}", account_id),
            }
        };

        let expected_version = aggregate.version();

        // Handle command to get events
        let domain_events = aggregate.handle_command(&command)?;

        // Wrap in envelopes
        let mut envelopes = Vec::new();
        let mut version = expected_version;

        for domain_event in domain_events {
            version += 1;
            let event_type = domain_event.type_name().to_string();
            envelopes.push(EventEnvelope::new(
                account_id,
                version,
                event_type,
                domain_event,
                correlation_id,
            ));
        }

        // Append to event store
        let new_version = self
            .event_store
            .append(account_id, expected_version, envelopes)
            .await?;

        // Snapshot policy fires on the version the append produced. The
        // command already succeeded, so a snapshot failure only logs.
        if self.snapshot_policy.should_snapshot(new_version) {
            if let Err(e) = self
                .snapshotter
                .take_snapshot::<AccountAggregate>(account_id)
                .await
            {
                tracing::warn!(
                    account_id = %account_id,
                    version = new_version,
                    error = %e,
                    "Snapshot after append failed"
                );
            }
        }

        Ok(new_version)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
