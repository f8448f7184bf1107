use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{format_cents, AccountId, Cents, Plan};

pub type TransactionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    PlanPurchase,
    Registration,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::PlanPurchase => "plan_purchase",
            TransactionType::Registration => "registration",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "deposit" => Some(TransactionType::Deposit),
            "withdrawal" => Some(TransactionType::Withdrawal),
            "plan_purchase" => Some(TransactionType::PlanPurchase),
            "registration" => Some(TransactionType::Registration),
            _ => None,
        }
    }

    /// Sign applied to `amount` when moving from old to new balance.
    pub fn direction(&self) -> i64 {
        match self {
            TransactionType::Deposit => 1,
            TransactionType::Withdrawal | TransactionType::PlanPurchase => -1,
            TransactionType::Registration => 0,
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Completed,
    Pending,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Completed => "completed",
            TransactionStatus::Pending => "pending",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(TransactionStatus::Completed),
            "pending" => Some(TransactionStatus::Pending),
            _ => None,
        }
    }
}

/// The two balance changes a caller may request directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceChangeKind {
    Deposit,
    Withdrawal,
}

impl BalanceChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceChangeKind::Deposit => "deposit",
            BalanceChangeKind::Withdrawal => "withdrawal",
        }
    }
}

impl From<BalanceChangeKind> for TransactionType {
    fn from(kind: BalanceChangeKind) -> Self {
        match kind {
            BalanceChangeKind::Deposit => TransactionType::Deposit,
            BalanceChangeKind::Withdrawal => TransactionType::Withdrawal,
        }
    }
}

/// Immutable record of one balance-affecting event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: TransactionId,
    /// Store-wide, strictly increasing. Defines the order of the log.
    pub sequence: i64,
    pub account_id: AccountId,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub amount: Cents,
    pub old_balance: Cents,
    pub new_balance: Cents,
    pub description: String,
    pub status: TransactionStatus,
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    fn new(
        sequence: i64,
        account_id: AccountId,
        transaction_type: TransactionType,
        amount: Cents,
        old_balance: Cents,
        new_balance: Cents,
        description: String,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence,
            account_id,
            transaction_type,
            amount,
            old_balance,
            new_balance,
            description,
            status: TransactionStatus::Completed,
            timestamp,
        }
    }

    pub fn registration(sequence: i64, account_id: AccountId, timestamp: DateTime<Utc>) -> Self {
        Self::new(
            sequence,
            account_id,
            TransactionType::Registration,
            0,
            0,
            0,
            "Account registered".to_string(),
            timestamp,
        )
    }

    pub fn balance_change(
        sequence: i64,
        account_id: AccountId,
        kind: BalanceChangeKind,
        amount: Cents,
        old_balance: Cents,
        new_balance: Cents,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let description = match kind {
            BalanceChangeKind::Deposit => format!("Deposit of {}", format_cents(amount)),
            BalanceChangeKind::Withdrawal => format!("Withdrawal of {}", format_cents(amount)),
        };
        Self::new(
            sequence,
            account_id,
            kind.into(),
            amount,
            old_balance,
            new_balance,
            description,
            timestamp,
        )
    }

    pub fn plan_purchase(
        sequence: i64,
        account_id: AccountId,
        plan: &Plan,
        old_balance: Cents,
        new_balance: Cents,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self::new(
            sequence,
            account_id,
            TransactionType::PlanPurchase,
            plan.price,
            old_balance,
            new_balance,
            format!("Purchased {} plan", plan.name),
            timestamp,
        )
    }

    /// Signed effect of this transaction on the account balance, or `None`
    /// when the amount cannot be negated.
    pub fn signed_amount(&self) -> Option<Cents> {
        self.amount.checked_mul(self.transaction_type.direction())
    }
}
