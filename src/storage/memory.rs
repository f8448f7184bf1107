use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{Account, Plan, Transaction};

use super::{Snapshot, Storage};

/// Storage that lives only as long as the process. Used by tests and ephemeral runs.
pub struct MemoryStorage {
    snapshot: Mutex<Snapshot>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::with_snapshot(Snapshot::empty())
    }

    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn load(&self) -> Result<Snapshot> {
        Ok(self.snapshot.lock().await.clone())
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        *self.snapshot.lock().await = snapshot.clone();
        Ok(())
    }

    async fn commit(&self, account: &Account, transaction: &Transaction) -> Result<()> {
        self.snapshot.lock().await.apply_commit(account, transaction);
        Ok(())
    }

    async fn upsert_account(&self, account: &Account) -> Result<()> {
        self.snapshot
            .lock()
            .await
            .accounts
            .insert(account.id, account.clone());
        Ok(())
    }

    async fn seed_plans(&self, plans: &[Plan]) -> Result<()> {
        self.snapshot.lock().await.plans = plans.to_vec();
        Ok(())
    }
}
