use uuid::Uuid;

// ============================================================================
// Account Commands - Represent user intent
// ============================================================================

#[derive(Debug, Clone)]
pub enum AccountCommand {
    OpenAccount {
        account_id: Uuid,
        owner: String,
        initial_balance: i64,
    },
    Deposit {
        amount: i64,
    },
    Withdraw {
        amount: i64,
    },
    CloseAccount,
}
