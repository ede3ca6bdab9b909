use uuid::Uuid;
use super::event::EventEnvelope;
use crate::event_sourcing::error::StoreError;

// ============================================================================
// Aggregate Root Pattern - Event Sourcing Core
// ============================================================================
//
// Key Principles:
// 1. State is derived from events (not stored directly)
// 2. Commands are validated before emitting events
// 3. Events represent facts that have already happened
// 4. Aggregates enforce business invariants
// 5. All state changes flow through events
//
// This is the GENERIC aggregate trait that works for ANY domain aggregate.
//
// ============================================================================

/// Generic aggregate trait - all event-sourced aggregates implement this.
///
/// Associated Types:
/// - `Event`: The domain event type for this aggregate
/// - `Command`: The command type for this aggregate
/// - `Error`: The error type for business rule violations
pub trait Aggregate: Sized + Send + Sync {
    type Event;
    type Command;
    type Error;

    /// Create new aggregate from first event
    fn apply_first_event(event: &Self::Event) -> Result<Self, Self::Error>;

    /// Apply subsequent events to update state
    fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error>;

    /// Handle command and emit events (business logic)
    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// Get aggregate ID
    fn aggregate_id(&self) -> Uuid;

    /// Get current version (last applied stream version)
    fn version(&self) -> i64;

    /// Record the stream version of the last applied event
    fn set_version(&mut self, version: i64);

    /// Reconstruct the aggregate by folding its event history.
    ///
    /// The stream version travels with the fold so a rehydrated aggregate
    /// always reports the version of the last event it absorbed.
    fn load_from_events(events: Vec<EventEnvelope<Self::Event>>) -> Result<Self, StoreError>
    where
        Self::Error: std::fmt::Display,
    {
        let mut iter = events.into_iter();

        let first = match iter.next() {
            Some(envelope) => envelope,
            None => {
                return Err(StoreError::Backend {
                    backend: "aggregate",
                    detail: "no events to load".to_string(),
                })
            }
        };

        let stream_id = first.stream_id;
        let mut aggregate = Self::apply_first_event(&first.event_data)
            .map_err(|e| StoreError::Backend {
                backend: "aggregate",
                detail: format!("failed to apply first event of {stream_id}: {e}"),
            })?;
        aggregate.set_version(first.version);

        for envelope in iter {
            aggregate.apply_event(&envelope.event_data)
                .map_err(|e| StoreError::Backend {
                    backend: "aggregate",
                    detail: format!(
                        "failed to apply event v{} of {stream_id}: {e}",
                        envelope.version
                    ),
                })?;
            aggregate.set_version(envelope.version);
        }

        Ok(aggregate)
    }
}
