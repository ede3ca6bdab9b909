// ============================================================================
// Event Sourcing Infrastructure
// ============================================================================
//
// Generic, reusable event sourcing infrastructure.
// Domain-specific code is in src/domain/
//
// ============================================================================

// Core abstractions (GENERIC - works with any aggregate)
pub mod core;
pub mod store;

// Backend drivers (relational, wide-column, cache, in-memory)
pub mod backend;
pub mod error;

// Re-export core infrastructure
pub use self::core::*;
pub use self::error::StoreError;
pub use self::store::*;
