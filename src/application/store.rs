use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use crate::domain::{
    apply_change, build_integrity_report, charge_for_plan, default_catalog, normalize_email,
    Account, AccountId, AccountProfile, BalanceChangeKind, Cents, IntegrityReport, Notification,
    NotificationSink, Plan, Transaction, VerificationFlag,
};
use crate::storage::{Snapshot, Storage};

use super::{build_stats, LedgerError, LedgerStats, TracingSink};

/// Amounts strictly above this many cents raise a large-transaction notification.
pub const DEFAULT_LARGE_TRANSACTION_THRESHOLD: Cents = 100_000;

/// Tunables for a [`LedgerStore`].
#[derive(Clone)]
pub struct StoreOptions {
    pub large_transaction_threshold: Cents,
    pub notifier: Arc<dyn NotificationSink>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            large_transaction_threshold: DEFAULT_LARGE_TRANSACTION_THRESHOLD,
            notifier: Arc::new(TracingSink),
        }
    }
}

impl StoreOptions {
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_large_transaction_threshold(mut self, threshold: Cents) -> Self {
        self.large_transaction_threshold = threshold;
        self
    }
}

/// An account together with its transaction log, guarded as one unit.
struct AccountEntry {
    account: Account,
    /// Ordered by sequence, oldest first.
    transactions: Vec<Transaction>,
    /// Set when a restore replaced the registry; the entry must not be written again.
    retired: bool,
}

impl AccountEntry {
    fn record(&mut self, account: Account, transaction: Transaction) {
        self.account = account;
        self.transactions.push(transaction);
    }

    fn registration_order(&self) -> (DateTime<Utc>, i64) {
        let sequence = self
            .transactions
            .first()
            .map(|tx| tx.sequence)
            .unwrap_or(i64::MAX);
        (self.account.created_at, sequence)
    }
}

type SharedEntry = Arc<Mutex<AccountEntry>>;

#[derive(Default)]
struct Registry {
    accounts: HashMap<AccountId, SharedEntry>,
    /// Normalized email -> owning account.
    emails: HashMap<String, AccountId>,
}

impl Registry {
    /// Build a registry from persisted state, returning it with the next free sequence number.
    fn from_snapshot(snapshot: &Snapshot) -> Result<(Self, i64), LedgerError> {
        let mut registry = Registry::default();
        let mut logs: HashMap<AccountId, Vec<Transaction>> = HashMap::new();
        let mut max_sequence = 0;

        for tx in snapshot.ordered_transactions() {
            if !snapshot.accounts.contains_key(&tx.account_id) {
                return Err(LedgerError::Storage(anyhow::anyhow!(
                    "transaction {} references unknown account {}",
                    tx.id,
                    tx.account_id
                )));
            }
            max_sequence = max_sequence.max(tx.sequence);
            logs.entry(tx.account_id).or_default().push(tx.clone());
        }

        for account in snapshot.accounts.values() {
            let key = account.email_key();
            if registry.emails.insert(key, account.id).is_some() {
                return Err(LedgerError::DuplicateAccount(account.email.clone()));
            }
            let entry = AccountEntry {
                account: account.clone(),
                transactions: logs.remove(&account.id).unwrap_or_default(),
                retired: false,
            };
            registry
                .accounts
                .insert(account.id, Arc::new(Mutex::new(entry)));
        }

        let next_sequence = max_sequence.checked_add(1).ok_or_else(|| {
            LedgerError::Storage(anyhow::anyhow!("sequence numbers are exhausted"))
        })?;
        Ok((registry, next_sequence))
    }
}

/// Single source of truth for account balances and their transaction history.
///
/// Mutations on one account are serialized by that account's lock, and each
/// one is persisted through [`Storage::commit`] before it becomes visible.
/// Mutations on different accounts run concurrently.
pub struct LedgerStore {
    storage: Arc<dyn Storage>,
    notifier: Arc<dyn NotificationSink>,
    large_transaction_threshold: Cents,
    plans: RwLock<Vec<Plan>>,
    registry: RwLock<Registry>,
    next_sequence: AtomicI64,
}

impl LedgerStore {
    /// Load persisted state, seeding the default plan catalog into empty storage.
    pub async fn open(storage: Arc<dyn Storage>, options: StoreOptions) -> Result<Self, LedgerError> {
        let mut snapshot = storage.load().await?;

        if snapshot.plans.is_empty() {
            let catalog = default_catalog();
            storage.seed_plans(&catalog).await?;
            tracing::info!(plans = catalog.len(), "seeded default plan catalog");
            snapshot.plans = catalog;
        }

        let (registry, next_sequence) = Registry::from_snapshot(&snapshot)?;
        tracing::debug!(
            accounts = snapshot.accounts.len(),
            transactions = snapshot.transactions.len(),
            "ledger loaded"
        );

        Ok(Self {
            storage,
            notifier: options.notifier,
            large_transaction_threshold: options.large_transaction_threshold,
            plans: RwLock::new(snapshot.plans),
            registry: RwLock::new(registry),
            next_sequence: AtomicI64::new(next_sequence),
        })
    }

    pub fn large_transaction_threshold(&self) -> Cents {
        self.large_transaction_threshold
    }

    // ========================
    // Account operations
    // ========================

    /// Register a new account with a zero balance and no verifications.
    pub async fn create_account(&self, profile: AccountProfile) -> Result<Account, LedgerError> {
        profile.validate().map_err(LedgerError::InvalidProfile)?;

        let mut registry = self.registry.write().await;

        let email_key = normalize_email(&profile.email);
        if registry.emails.contains_key(&email_key) {
            return Err(LedgerError::DuplicateAccount(profile.email.trim().to_string()));
        }

        let account = Account::new(profile, Utc::now());
        let registration =
            Transaction::registration(self.take_sequence(), account.id, account.created_at);

        self.storage.commit(&account, &registration).await?;

        registry.emails.insert(email_key, account.id);
        registry.accounts.insert(
            account.id,
            Arc::new(Mutex::new(AccountEntry {
                account: account.clone(),
                transactions: vec![registration],
                retired: false,
            })),
        );
        drop(registry);

        tracing::info!(account_id = %account.id, "account registered");
        self.notifier.publish(Notification::registration(&account));

        Ok(account)
    }

    pub async fn get_account(&self, account_id: AccountId) -> Result<Account, LedgerError> {
        let shared = self.entry(account_id).await?;
        let entry = shared.lock().await;
        Self::ensure_live(&entry, account_id)?;
        Ok(entry.account.clone())
    }

    /// Look up an account by email, ignoring case and surrounding whitespace.
    pub async fn find_account_by_email(&self, email: &str) -> Result<Account, LedgerError> {
        let account_id = self
            .registry
            .read()
            .await
            .emails
            .get(&normalize_email(email))
            .copied();
        match account_id {
            Some(account_id) => self.get_account(account_id).await,
            None => Err(LedgerError::EmailNotFound(email.trim().to_string())),
        }
    }

    /// All accounts in registration order.
    pub async fn list_accounts(&self) -> Vec<Account> {
        let entries: Vec<SharedEntry> = self.registry.read().await.accounts.values().cloned().collect();

        let mut ordered = Vec::with_capacity(entries.len());
        for shared in entries {
            let entry = shared.lock().await;
            ordered.push((entry.registration_order(), entry.account.clone()));
        }
        ordered.sort_by(|a, b| a.0.cmp(&b.0));
        ordered.into_iter().map(|(_, account)| account).collect()
    }

    /// Accounts created strictly after `cutoff`, oldest first.
    pub async fn new_registrations_since(&self, cutoff: DateTime<Utc>) -> Vec<Account> {
        self.list_accounts()
            .await
            .into_iter()
            .filter(|account| account.created_at > cutoff)
            .collect()
    }

    /// Accounts that have not passed the `flag` check, oldest first.
    pub async fn unverified_accounts(&self, flag: VerificationFlag) -> Vec<Account> {
        self.list_accounts()
            .await
            .into_iter()
            .filter(|account| !account.is_verified(flag))
            .collect()
    }

    /// Set or clear one verification flag. Records no transaction.
    pub async fn set_verification(
        &self,
        account_id: AccountId,
        flag: VerificationFlag,
        verified: bool,
    ) -> Result<Account, LedgerError> {
        let shared = self.entry(account_id).await?;
        let mut entry = shared.lock().await;
        Self::ensure_live(&entry, account_id)?;

        if entry.account.is_verified(flag) == verified {
            return Ok(entry.account.clone());
        }

        let mut account = entry.account.clone();
        account.verification.set(flag, verified);
        self.storage.upsert_account(&account).await?;
        entry.account = account.clone();

        tracing::info!(account_id = %account_id, flag = flag.as_str(), verified, "verification updated");
        Ok(account)
    }

    // ========================
    // Balance operations
    // ========================

    /// Deposit into or withdraw from an account, returning the recorded transaction.
    pub async fn apply_balance_change(
        &self,
        account_id: AccountId,
        amount: Cents,
        kind: BalanceChangeKind,
    ) -> Result<Transaction, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let shared = self.entry(account_id).await?;
        let mut entry = shared.lock().await;
        Self::ensure_live(&entry, account_id)?;

        let old_balance = entry.account.balance;
        let new_balance = apply_change(old_balance, amount, kind)
            .map_err(|violation| LedgerError::from_violation(account_id, violation))?;

        let mut account = entry.account.clone();
        account.balance = new_balance;
        let transaction = Transaction::balance_change(
            self.take_sequence(),
            account_id,
            kind,
            amount,
            old_balance,
            new_balance,
            Utc::now(),
        );

        self.storage.commit(&account, &transaction).await?;
        entry.record(account, transaction.clone());
        drop(entry);

        tracing::debug!(
            account_id = %account_id,
            kind = kind.as_str(),
            amount,
            old_balance,
            new_balance,
            "balance changed"
        );
        self.notify_if_large(&transaction);

        Ok(transaction)
    }

    /// Charge the plan price to the account and assign the plan, as one unit.
    pub async fn purchase_plan(
        &self,
        account_id: AccountId,
        plan_id: &str,
    ) -> Result<Transaction, LedgerError> {
        let plan = self.get_plan(plan_id).await?;

        let shared = self.entry(account_id).await?;
        let mut entry = shared.lock().await;
        Self::ensure_live(&entry, account_id)?;

        let old_balance = entry.account.balance;
        let new_balance = charge_for_plan(old_balance, &plan)
            .map_err(|violation| LedgerError::from_violation(account_id, violation))?;

        let now = Utc::now();
        let mut account = entry.account.clone();
        account.balance = new_balance;
        account.plan = Some(plan.id.clone());
        account.plan_purchased_at = Some(now);
        let transaction = Transaction::plan_purchase(
            self.take_sequence(),
            account_id,
            &plan,
            old_balance,
            new_balance,
            now,
        );

        self.storage.commit(&account, &transaction).await?;
        entry.record(account, transaction.clone());
        drop(entry);

        tracing::info!(account_id = %account_id, plan = %plan.id, "plan purchased");
        self.notify_if_large(&transaction);

        Ok(transaction)
    }

    /// All transactions of an account, oldest first.
    pub async fn list_transactions(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let shared = self.entry(account_id).await?;
        let entry = shared.lock().await;
        Self::ensure_live(&entry, account_id)?;
        Ok(entry.transactions.clone())
    }

    // ========================
    // Plan catalog
    // ========================

    /// Plans ordered by price, cheapest first.
    pub async fn list_plans(&self) -> Vec<Plan> {
        let mut plans = self.plans.read().await.clone();
        plans.sort_by_key(|plan| plan.price);
        plans
    }

    pub async fn get_plan(&self, plan_id: &str) -> Result<Plan, LedgerError> {
        self.plans
            .read()
            .await
            .iter()
            .find(|plan| plan.id == plan_id)
            .cloned()
            .ok_or_else(|| LedgerError::PlanNotFound(plan_id.to_string()))
    }

    // ========================
    // Whole-ledger operations
    // ========================

    /// Capture the full ledger state.
    pub async fn snapshot(&self) -> Snapshot {
        let entries: Vec<SharedEntry> = self.registry.read().await.accounts.values().cloned().collect();

        let mut snapshot = Snapshot::empty();
        snapshot.plans = self.plans.read().await.clone();
        for shared in entries {
            let entry = shared.lock().await;
            snapshot.accounts.insert(entry.account.id, entry.account.clone());
            for tx in &entry.transactions {
                snapshot.transactions.insert(tx.id, tx.clone());
            }
        }
        snapshot
    }

    /// Replace the whole ledger with `snapshot`, persisting it first.
    ///
    /// Waits for in-flight mutations to finish; mutations that were waiting on
    /// a replaced account fail with `AccountNotFound`.
    pub async fn restore(&self, mut snapshot: Snapshot) -> Result<(), LedgerError> {
        if snapshot.plans.is_empty() {
            snapshot.plans = default_catalog();
        }
        let (replacement, next_sequence) = Registry::from_snapshot(&snapshot)?;

        let mut registry = self.registry.write().await;
        let current: Vec<SharedEntry> = registry.accounts.values().cloned().collect();
        let mut guards = Vec::with_capacity(current.len());
        for shared in &current {
            guards.push(shared.lock().await);
        }

        self.storage.save(&snapshot).await?;

        for guard in guards.iter_mut() {
            guard.retired = true;
        }
        *registry = replacement;
        *self.plans.write().await = snapshot.plans.clone();
        self.next_sequence.store(next_sequence, Ordering::SeqCst);
        drop(guards);
        drop(registry);

        tracing::info!(
            accounts = snapshot.accounts.len(),
            transactions = snapshot.transactions.len(),
            "ledger restored"
        );
        Ok(())
    }

    /// Replay every account's transactions and report inconsistencies.
    pub async fn check_integrity(&self) -> IntegrityReport {
        let snapshot = self.snapshot().await;
        let accounts: Vec<Account> = snapshot.accounts.into_values().collect();
        let transactions: Vec<Transaction> = snapshot.transactions.into_values().collect();
        build_integrity_report(&accounts, &transactions, &snapshot.plans)
    }

    /// Dashboard figures as of `now`.
    pub async fn stats(&self, now: DateTime<Utc>) -> LedgerStats {
        let snapshot = self.snapshot().await;
        let accounts: Vec<Account> = snapshot.accounts.into_values().collect();
        let transactions: Vec<Transaction> = snapshot.transactions.into_values().collect();
        build_stats(&accounts, &transactions, now)
    }

    // ========================
    // Internals
    // ========================

    async fn entry(&self, account_id: AccountId) -> Result<SharedEntry, LedgerError> {
        self.registry
            .read()
            .await
            .accounts
            .get(&account_id)
            .cloned()
            .ok_or(LedgerError::AccountNotFound(account_id))
    }

    fn ensure_live(entry: &AccountEntry, account_id: AccountId) -> Result<(), LedgerError> {
        if entry.retired {
            return Err(LedgerError::AccountNotFound(account_id));
        }
        Ok(())
    }

    fn take_sequence(&self) -> i64 {
        self.next_sequence.fetch_add(1, Ordering::SeqCst)
    }

    fn notify_if_large(&self, transaction: &Transaction) {
        if transaction.amount > self.large_transaction_threshold {
            self.notifier
                .publish(Notification::large_transaction(transaction));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    async fn memory_store() -> LedgerStore {
        LedgerStore::open(Arc::new(MemoryStorage::new()), StoreOptions::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_restore_retires_entries_already_handed_out() {
        let store = memory_store().await;
        let account = store
            .create_account(AccountProfile::new("Alice", "alice@example.com"))
            .await
            .unwrap();
        let held = store.entry(account.id).await.unwrap();

        let source = memory_store().await;
        source
            .create_account(AccountProfile::new("Carol", "carol@example.com"))
            .await
            .unwrap();
        store.restore(source.snapshot().await).await.unwrap();

        let entry = held.lock().await;
        assert!(entry.retired);
        assert!(matches!(
            LedgerStore::ensure_live(&entry, account.id),
            Err(LedgerError::AccountNotFound(id)) if id == account.id
        ));
    }
}
