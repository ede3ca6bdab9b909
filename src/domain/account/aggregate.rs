use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use crate::event_sourcing::core::Aggregate;
use super::value_objects::AccountStatus;
use super::events::*;
use super::commands::AccountCommand;
use super::errors::AccountError;

// ============================================================================
// Account Aggregate - Domain Logic
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountAggregate {
    // Identity
    pub id: Uuid,
    pub version: i64,

    // Current State (derived from events)
    pub owner: String,
    pub balance: i64, // minor units (cents)
    pub status: AccountStatus,

    // Audit Trail
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccountAggregate {
    fn require_open(&self) -> Result<(), AccountError> {
        match self.status {
            AccountStatus::Open => Ok(()),
            AccountStatus::Closed => Err(AccountError::AlreadyClosed),
        }
    }

    fn validate_amount(amount: i64) -> Result<(), AccountError> {
        if amount <= 0 {
            return Err(AccountError::InvalidAmount(amount));
        }
        Ok(())
    }
}

// ============================================================================
// Aggregate Trait Implementation
// ============================================================================

impl Aggregate for AccountAggregate {
    type Event = AccountEvent;
    type Command = AccountCommand;
    type Error = AccountError;

    fn apply_first_event(event: &Self::Event) -> Result<Self, Self::Error> {
        match event {
            AccountEvent::Opened(e) => {
                let now = Utc::now();
                Ok(Self {
                    id: e.account_id,
                    version: 0,
                    owner: e.owner.clone(),
                    balance: e.initial_balance,
                    status: AccountStatus::Open,
                    opened_at: now,
                    updated_at: now,
                })
            }
            _ => Err(AccountError::NotInitialized),
        }
    }

    fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error> {
        self.updated_at = Utc::now();

        match event {
            AccountEvent::Opened(_) => {
                // First event already applied
                Ok(())
            }
            AccountEvent::Deposited(e) => {
                self.balance += e.amount;
                Ok(())
            }
            AccountEvent::Withdrawn(e) => {
                self.balance -= e.amount;
                Ok(())
            }
            AccountEvent::Closed(_) => {
                self.status = AccountStatus::Closed;
                Ok(())
            }
        }
    }

    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            AccountCommand::OpenAccount { account_id, owner, initial_balance } => {
                if self.version > 0 {
                    return Err(AccountError::AlreadyOpened);
                }
                if *initial_balance < 0 {
                    return Err(AccountError::NegativeInitialBalance(*initial_balance));
                }

                Ok(vec![AccountEvent::Opened(AccountOpened {
                    account_id: *account_id,
                    owner: owner.clone(),
                    initial_balance: *initial_balance,
                })])
            }

            AccountCommand::Deposit { amount } => {
                self.require_open()?;
                Self::validate_amount(*amount)?;

                Ok(vec![AccountEvent::Deposited(FundsDeposited { amount: *amount })])
            }

            AccountCommand::Withdraw { amount } => {
                self.require_open()?;
                Self::validate_amount(*amount)?;

                if self.balance < *amount {
                    return Err(AccountError::InsufficientFunds {
                        balance: self.balance,
                        requested: *amount,
                    });
                }

                Ok(vec![AccountEvent::Withdrawn(FundsWithdrawn { amount: *amount })])
            }

            AccountCommand::CloseAccount => {
                self.require_open()?;

                Ok(vec![AccountEvent::Closed(AccountClosed {
                    closed_at: Utc::now(),
                })])
            }
        }
    }

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_sourcing::core::EventEnvelope;

    fn open_account(balance: i64) -> AccountAggregate {
        AccountAggregate::apply_first_event(&AccountEvent::Opened(AccountOpened {
            account_id: Uuid::new_v4(),
            owner: "alice".to_string(),
            initial_balance: balance,
        }))
        .unwrap()
    }

    #[test]
    fn test_open_sets_initial_state() {
        let account_id = Uuid::new_v4();
        let account = AccountAggregate::apply_first_event(&AccountEvent::Opened(AccountOpened {
            account_id,
            owner: "alice".to_string(),
            initial_balance: 500,
        }))
        .unwrap();

        assert_eq!(account.id, account_id);
        assert_eq!(account.owner, "alice");
        assert_eq!(account.balance, 500);
        assert_eq!(account.status, AccountStatus::Open);
    }

    #[test]
    fn test_first_event_must_be_opened() {
        let err = AccountAggregate::apply_first_event(&AccountEvent::Deposited(
            FundsDeposited { amount: 10 },
        ))
        .unwrap_err();
        assert!(matches!(err, AccountError::NotInitialized));
    }

    #[test]
    fn test_deposit_and_withdraw_move_balance() {
        let mut account = open_account(100);

        account
            .apply_event(&AccountEvent::Deposited(FundsDeposited { amount: 50 }))
            .unwrap();
        assert_eq!(account.balance, 150);

        account
            .apply_event(&AccountEvent::Withdrawn(FundsWithdrawn { amount: 70 }))
            .unwrap();
        assert_eq!(account.balance, 80);
    }

    #[test]
    fn test_withdraw_rejects_overdraft() {
        let account = open_account(100);

        let err = account
            .handle_command(&AccountCommand::Withdraw { amount: 150 })
            .unwrap_err();
        assert!(matches!(
            err,
            AccountError::InsufficientFunds { balance: 100, requested: 150 }
        ));
    }

    #[test]
    fn test_amounts_must_be_positive() {
        let account = open_account(100);

        let err = account
            .handle_command(&AccountCommand::Deposit { amount: 0 })
            .unwrap_err();
        assert!(matches!(err, AccountError::InvalidAmount(0)));

        let err = account
            .handle_command(&AccountCommand::Withdraw { amount: -5 })
            .unwrap_err();
        assert!(matches!(err, AccountError::InvalidAmount(-5)));
    }

    #[test]
    fn test_closed_account_rejects_commands() {
        let mut account = open_account(100);
        account
            .apply_event(&AccountEvent::Closed(AccountClosed { closed_at: Utc::now() }))
            .unwrap();

        for command in [
            AccountCommand::Deposit { amount: 10 },
            AccountCommand::Withdraw { amount: 10 },
            AccountCommand::CloseAccount,
        ] {
            let err = account.handle_command(&command).unwrap_err();
            assert!(matches!(err, AccountError::AlreadyClosed));
        }
    }

    #[test]
    fn test_reopen_is_rejected() {
        let mut account = open_account(100);
        account.set_version(1);

        let err = account
            .handle_command(&AccountCommand::OpenAccount {
                account_id: Uuid::new_v4(),
                owner: "bob".to_string(),
                initial_balance: 0,
            })
            .unwrap_err();
        assert!(matches!(err, AccountError::AlreadyOpened));
    }

    #[test]
    fn test_load_from_events_folds_history() {
        let stream_id = Uuid::new_v4();
        let correlation_id = Uuid::new_v4();

        let history = vec![
            AccountEvent::Opened(AccountOpened {
                account_id: stream_id,
                owner: "alice".to_string(),
                initial_balance: 100,
            }),
            AccountEvent::Deposited(FundsDeposited { amount: 40 }),
            AccountEvent::Withdrawn(FundsWithdrawn { amount: 30 }),
        ];

        let envelopes: Vec<_> = history
            .into_iter()
            .enumerate()
            .map(|(i, event)| {
                EventEnvelope::new(
                    stream_id,
                    i as i64 + 1,
                    event.type_name().to_string(),
                    event,
                    correlation_id,
                )
            })
            .collect();

        let account = AccountAggregate::load_from_events(envelopes).unwrap();
        assert_eq!(account.balance, 110);
        assert_eq!(account.version, 3);
        assert_eq!(account.status, AccountStatus::Open);
    }

    #[test]
    fn test_snapshot_serde_round_trip() {
        let account = open_account(250);
        let json = serde_json::to_string(&account).unwrap();
        let back: AccountAggregate = serde_json::from_str(&json).unwrap();

        assert_eq!(back.balance, account.balance);
        assert_eq!(back.owner, account.owner);
        assert_eq!(back.status, account.status);
    }
}
