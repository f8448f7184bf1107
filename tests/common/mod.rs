// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tradeledger::application::{LedgerStore, NotificationFeed, StoreOptions};
use tradeledger::domain::{
    Account, AccountId, AccountProfile, BalanceChangeKind, Cents, Plan, Transaction,
};
use tradeledger::storage::{JournalStorage, MemoryStorage, Snapshot, SqliteStorage, Storage};

/// Helper to create an in-memory store whose notifications land in a feed
pub async fn test_store() -> Result<(LedgerStore, Arc<NotificationFeed>)> {
    store_over(Arc::new(MemoryStorage::new())).await
}

/// Helper to create a store over any storage, capturing notifications
pub async fn store_over(storage: Arc<dyn Storage>) -> Result<(LedgerStore, Arc<NotificationFeed>)> {
    let feed = Arc::new(NotificationFeed::new());
    let options = StoreOptions::default().with_notifier(feed.clone());
    let store = LedgerStore::open(storage, options).await?;
    Ok((store, feed))
}

pub async fn journal_store(dir: &Path) -> Result<LedgerStore> {
    let storage = JournalStorage::open(dir.join("ledger.jsonl")).await?;
    Ok(LedgerStore::open(Arc::new(storage), StoreOptions::default()).await?)
}

pub async fn sqlite_store(dir: &Path) -> Result<LedgerStore> {
    let storage = SqliteStorage::open(dir.join("ledger.db")).await?;
    Ok(LedgerStore::open(Arc::new(storage), StoreOptions::default()).await?)
}

/// Test fixture: standard account setup
pub struct StandardAccounts;

impl StandardAccounts {
    pub async fn alice(store: &LedgerStore) -> Result<Account> {
        Ok(store
            .create_account(AccountProfile::new("Alice Trader", "alice@example.com"))
            .await?)
    }

    pub async fn bob(store: &LedgerStore) -> Result<Account> {
        Ok(store
            .create_account(
                AccountProfile::new("Bob Broker", "bob@example.com").with_mobile("+15550100"),
            )
            .await?)
    }

    /// Create an account and deposit `amount` into it
    pub async fn funded(store: &LedgerStore, email: &str, amount: Cents) -> Result<Account> {
        let account = store
            .create_account(AccountProfile::new("Funded", email))
            .await?;
        store
            .apply_balance_change(account.id, amount, BalanceChangeKind::Deposit)
            .await?;
        Ok(store.get_account(account.id).await?)
    }
}

/// Storage that delegates to memory until told to fail.
///
/// It also remembers which accounts were written since the last full save.
#[derive(Default)]
pub struct FailingStorage {
    inner: MemoryStorage,
    failing: AtomicBool,
    writes_since_save: Mutex<Vec<AccountId>>,
}

impl FailingStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Accounts committed or upserted after the most recent `save`
    pub fn writes_since_save(&self) -> Vec<AccountId> {
        self.writes_since_save.lock().unwrap().clone()
    }

    fn record_write(&self, account_id: AccountId) {
        self.writes_since_save.lock().unwrap().push(account_id);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("disk unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for FailingStorage {
    async fn load(&self) -> Result<Snapshot> {
        self.inner.load().await
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        self.check()?;
        self.inner.save(snapshot).await?;
        self.writes_since_save.lock().unwrap().clear();
        Ok(())
    }

    async fn commit(&self, account: &Account, transaction: &Transaction) -> Result<()> {
        self.check()?;
        self.inner.commit(account, transaction).await?;
        self.record_write(account.id);
        Ok(())
    }

    async fn upsert_account(&self, account: &Account) -> Result<()> {
        self.check()?;
        self.inner.upsert_account(account).await?;
        self.record_write(account.id);
        Ok(())
    }

    async fn seed_plans(&self, plans: &[Plan]) -> Result<()> {
        self.check()?;
        self.inner.seed_plans(plans).await
    }
}
