use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{format_cents, Account, AccountId, Transaction, TransactionType};

pub type NotificationId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    LargeTransaction,
    Registration,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::LargeTransaction => "large_transaction",
            NotificationKind::Registration => "registration",
        }
    }
}

/// A user-facing alert derived from a ledger event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub kind: NotificationKind,
    pub account_id: AccountId,
    pub message: String,
    pub read: bool,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn registration(account: &Account) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: NotificationKind::Registration,
            account_id: account.id,
            message: format!("New user registered: {} <{}>", account.name, account.email),
            read: false,
            timestamp: account.created_at,
        }
    }

    pub fn large_transaction(tx: &Transaction) -> Self {
        let action = match tx.transaction_type {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::PlanPurchase => "plan purchase",
            TransactionType::Registration => "registration",
        };
        Self {
            id: Uuid::new_v4(),
            kind: NotificationKind::LargeTransaction,
            account_id: tx.account_id,
            message: format!(
                "Large {} of {} on account {}",
                action,
                format_cents(tx.amount),
                tx.account_id
            ),
            read: false,
            timestamp: tx.timestamp,
        }
    }
}

/// Receives notifications emitted as a side effect of ledger mutations.
///
/// Publishing must not fail: a sink that cannot deliver drops the notification.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, notification: Notification);
}
