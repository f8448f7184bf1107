use thiserror::Error;

use crate::domain::{AccountId, Cents, LedgerViolation};

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("No account registered with email {0}")]
    EmailNotFound(String),

    #[error("An account is already registered with email {0}")]
    DuplicateAccount(String),

    #[error("Plan not found: {0}")]
    PlanNotFound(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(Cents),

    #[error("Insufficient balance on account {account_id}: balance {balance}, required {required}")]
    InsufficientBalance {
        account_id: AccountId,
        balance: Cents,
        required: Cents,
    },

    #[error("Invalid account profile: {0}")]
    InvalidProfile(String),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl LedgerError {
    /// Attach the account a domain rule was evaluated against.
    pub(crate) fn from_violation(account_id: AccountId, violation: LedgerViolation) -> Self {
        match violation {
            LedgerViolation::InsufficientBalance { balance, required } => {
                LedgerError::InsufficientBalance {
                    account_id,
                    balance,
                    required,
                }
            }
            LedgerViolation::NonPositiveAmount(amount) | LedgerViolation::Overflow(amount) => {
                LedgerError::InvalidAmount(amount)
            }
        }
    }
}
