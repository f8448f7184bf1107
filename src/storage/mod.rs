mod journal;
mod memory;
mod sqlite;

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Account, AccountId, Plan, Transaction, TransactionId};

pub use journal::JournalStorage;
pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

/// SQL schema for the SQLite adapter
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");

/// Complete persisted state of the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub accounts: BTreeMap<AccountId, Account>,
    pub transactions: BTreeMap<TransactionId, Transaction>,
    pub plans: Vec<Plan>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            accounts: BTreeMap::new(),
            transactions: BTreeMap::new(),
            plans: Vec::new(),
        }
    }

    /// Transactions ordered by sequence, oldest first.
    pub fn ordered_transactions(&self) -> Vec<&Transaction> {
        let mut txs: Vec<&Transaction> = self.transactions.values().collect();
        txs.sort_by_key(|tx| tx.sequence);
        txs
    }

    pub(crate) fn apply_commit(&mut self, account: &Account, transaction: &Transaction) {
        self.accounts.insert(account.id, account.clone());
        self.transactions.insert(transaction.id, transaction.clone());
    }
}

/// Persistence port for the ledger.
///
/// Adapters must make `commit` atomic: after a crash either both the account
/// state and its transaction are durable, or neither is.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read the full persisted state.
    async fn load(&self) -> Result<Snapshot>;

    /// Replace all persisted state with `snapshot`.
    async fn save(&self, snapshot: &Snapshot) -> Result<()>;

    /// Upsert `account` and append `transaction` as one unit.
    async fn commit(&self, account: &Account, transaction: &Transaction) -> Result<()>;

    /// Upsert `account` without recording a transaction.
    async fn upsert_account(&self, account: &Account) -> Result<()>;

    /// Store the plan catalog, replacing any previous one.
    async fn seed_plans(&self, plans: &[Plan]) -> Result<()>;
}
