// ============================================================================
// Account Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("Account is already open")]
    AlreadyOpened,

    #[error("Account is closed")]
    AlreadyClosed,

    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: i64, requested: i64 },

    #[error("Amount must be positive: {0}")]
    InvalidAmount(i64),

    #[error("Initial balance cannot be negative: {0}")]
    NegativeInitialBalance(i64),

    #[error("Aggregate not initialized")]
    NotInitialized,
}
