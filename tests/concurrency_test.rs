mod common;

use std::sync::Arc;

use anyhow::Result;
use common::{FailingStorage, StandardAccounts, store_over, test_store};
use tempfile::TempDir;
use tradeledger::application::LedgerError;
use tradeledger::domain::{AccountId, AccountProfile, BalanceChangeKind};
use tradeledger::storage::Storage;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deposits_are_not_lost() -> Result<()> {
    let (store, _feed) = test_store().await?;
    let store = Arc::new(store);
    let alice = StandardAccounts::alice(&store).await?;
    let id = alice.id;

    let mut handles = Vec::new();
    for _ in 0..50 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .apply_balance_change(id, 100, BalanceChangeKind::Deposit)
                .await
        }));
    }
    for handle in handles {
        handle.await??;
    }

    assert_eq!(store.get_account(alice.id).await?.balance, 5_000);
    let log = store.list_transactions(alice.id).await?;
    assert_eq!(log.len(), 51);
    assert!(log.windows(2).all(|w| w[0].new_balance == w[1].old_balance));
    assert!(log.windows(2).all(|w| w[0].sequence < w[1].sequence));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_withdrawals_never_overdraw() -> Result<()> {
    let (store, _feed) = test_store().await?;
    let store = Arc::new(store);
    let account = StandardAccounts::funded(&store, "contested@example.com", 1_000).await?;
    let id = account.id;

    let mut handles = Vec::new();
    for _ in 0..25 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .apply_balance_change(id, 100, BalanceChangeKind::Withdrawal)
                .await
        }));
    }

    let mut succeeded = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => succeeded += 1,
            Err(LedgerError::InsufficientBalance { .. }) => rejected += 1,
            Err(e) => return Err(e.into()),
        }
    }

    assert_eq!(succeeded, 10);
    assert_eq!(rejected, 15);
    assert_eq!(store.get_account(account.id).await?.balance, 0);
    assert!(store.check_integrity().await.is_healthy());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_accounts_on_sqlite() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(common::sqlite_store(temp.path()).await?);

    let mut accounts = Vec::new();
    for i in 0..8 {
        accounts.push(
            store
                .create_account(AccountProfile::new(
                    format!("Trader {}", i),
                    format!("trader{}@example.com", i),
                ))
                .await?,
        );
    }

    let mut handles = Vec::new();
    for account in &accounts {
        for _ in 0..5 {
            let store = store.clone();
            let id = account.id;
            handles.push(tokio::spawn(async move {
                store
                    .apply_balance_change(id, 250, BalanceChangeKind::Deposit)
                    .await
            }));
        }
    }
    for handle in handles {
        handle.await??;
    }

    for account in &accounts {
        assert_eq!(store.get_account(account.id).await?.balance, 1_250);
        assert_eq!(store.list_transactions(account.id).await?.len(), 6);
    }
    let report = store.check_integrity().await;
    assert!(report.is_healthy(), "issues: {:?}", report.issues);
    assert_eq!(report.transaction_count, 8 * 6);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registrations_with_same_email() -> Result<()> {
    let (store, feed) = test_store().await?;
    let store = Arc::new(store);

    let mut handles = Vec::new();
    for i in 0..10 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .create_account(AccountProfile::new(
                    format!("Racer {}", i),
                    "race@example.com",
                ))
                .await
        }));
    }

    let mut created = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => created += 1,
            Err(LedgerError::DuplicateAccount(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(store.list_accounts().await.len(), 1);
    assert_eq!(feed.list().len(), 1);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_restore_during_withdrawals_keeps_only_restored_state() -> Result<()> {
    let storage = Arc::new(FailingStorage::new());
    let (store, _feed) = store_over(storage.clone()).await?;
    let store = Arc::new(store);

    let mut ids = Vec::new();
    for i in 0..4 {
        let email = format!("old{}@example.com", i);
        ids.push(StandardAccounts::funded(&store, &email, 10_000).await?.id);
    }

    let (source, _) = test_store().await?;
    StandardAccounts::funded(&source, "new@example.com", 7_500).await?;
    let replacement = source.snapshot().await;

    let withdraw = |id: AccountId| {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .apply_balance_change(id, 100, BalanceChangeKind::Withdrawal)
                .await
        })
    };

    let mut handles: Vec<_> = ids.iter().cycle().take(20).map(|id| withdraw(*id)).collect();
    let restore = {
        let store = store.clone();
        let snapshot = replacement.clone();
        tokio::spawn(async move { store.restore(snapshot).await })
    };
    handles.extend(ids.iter().cycle().take(20).map(|id| withdraw(*id)));

    restore.await??;
    for handle in handles {
        match handle.await? {
            Ok(_) | Err(LedgerError::AccountNotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }

    // Nothing from the replaced accounts reached storage after the restore.
    assert_eq!(storage.writes_since_save(), Vec::<AccountId>::new());

    let live = store.snapshot().await;
    assert_eq!(live.accounts, replacement.accounts);
    assert_eq!(live.transactions, replacement.transactions);

    let persisted = storage.load().await?;
    assert_eq!(persisted.accounts, replacement.accounts);
    assert_eq!(persisted.transactions, replacement.transactions);

    for id in &ids {
        assert!(matches!(
            store.get_account(*id).await,
            Err(LedgerError::AccountNotFound(_))
        ));
    }
    assert!(store.check_integrity().await.is_healthy());

    Ok(())
}
