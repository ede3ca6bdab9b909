// ============================================================================
// Event Sourcing Core - Generic Infrastructure Abstractions
// ============================================================================
//
// This module contains GENERIC, reusable event sourcing infrastructure
// that works with ANY domain aggregate.
//
// Key Principles:
// - No domain-specific code (no Account, Order, etc.)
// - Generic over aggregate and event types
// - Drivers only ever see RecordedEvent, never domain types
//
// ============================================================================

pub mod aggregate;
pub mod event;

// Re-export core types for convenience
pub use aggregate::Aggregate;
pub use event::{DomainEvent, EventEnvelope, EventUpcaster, RecordedEvent};
