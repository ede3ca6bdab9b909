use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use crate::event_sourcing::core::DomainEvent;

// ============================================================================
// Account Events - Domain Events for Account Aggregate
// ============================================================================

/// Account Event - Union type for all account events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum AccountEvent {
    Opened(AccountOpened),
    Deposited(FundsDeposited),
    Withdrawn(FundsWithdrawn),
    Closed(AccountClosed),
}

impl AccountEvent {
    /// Concrete event name for envelope metadata.
    pub fn type_name(&self) -> &'static str {
        match self {
            AccountEvent::Opened(_) => "AccountOpened",
            AccountEvent::Deposited(_) => "FundsDeposited",
            AccountEvent::Withdrawn(_) => "FundsWithdrawn",
            AccountEvent::Closed(_) => "AccountClosed",
        }
    }
}

impl DomainEvent for AccountEvent {
    fn event_type() -> &'static str { "AccountEvent" }
}

// ============================================================================
// Individual Event Types
// ============================================================================

/// Account Opened - Initial event in account lifecycle
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AccountOpened {
    pub account_id: Uuid,
    pub owner: String,
    pub initial_balance: i64, // minor units (cents)
}

impl DomainEvent for AccountOpened {
    fn event_type() -> &'static str { "AccountOpened" }
}

/// Funds Deposited - Balance increased
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FundsDeposited {
    pub amount: i64,
}

impl DomainEvent for FundsDeposited {
    fn event_type() -> &'static str { "FundsDeposited" }
}

/// Funds Withdrawn - Balance decreased
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FundsWithdrawn {
    pub amount: i64,
}

impl DomainEvent for FundsWithdrawn {
    fn event_type() -> &'static str { "FundsWithdrawn" }
}

/// Account Closed - Account lifecycle ended
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AccountClosed {
    pub closed_at: DateTime<Utc>,
}

impl DomainEvent for AccountClosed {
    fn event_type() -> &'static str { "AccountClosed" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tagged_serialization() {
        let event = AccountEvent::Deposited(FundsDeposited { amount: 250 });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"Deposited""#));

        let back: AccountEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, AccountEvent::Deposited(FundsDeposited { amount: 250 })));
    }

    #[test]
    fn test_type_names() {
        let opened = AccountEvent::Opened(AccountOpened {
            account_id: Uuid::new_v4(),
            owner: "alice".to_string(),
            initial_balance: 0,
        });
        assert_eq!(opened.type_name(), "AccountOpened");

        let closed = AccountEvent::Closed(AccountClosed { closed_at: Utc::now() });
        assert_eq!(closed.type_name(), "AccountClosed");
    }
}
