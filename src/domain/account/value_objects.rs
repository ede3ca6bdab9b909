use serde::{Deserialize, Serialize};

// ============================================================================
// Account Value Objects
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AccountStatus {
    Open,
    Closed,
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_status_equality() {
        assert_eq!(AccountStatus::Open, AccountStatus::Open);
        assert_ne!(AccountStatus::Open, AccountStatus::Closed);
    }

    #[test]
    fn test_account_status_serialization() {
        for status in [AccountStatus::Open, AccountStatus::Closed] {
            let json = serde_json::to_string(&status).unwrap();
            let deserialized: AccountStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(status, deserialized);
        }
    }
}
