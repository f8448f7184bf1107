mod common;

use std::sync::Arc;

use anyhow::Result;
use common::{FailingStorage, StandardAccounts, store_over, test_store};
use tradeledger::application::LedgerError;
use tradeledger::domain::{
    AccountProfile, BalanceChangeKind, NotificationKind, TransactionType,
};

#[tokio::test]
async fn test_deposit_then_withdraw_scenario() -> Result<()> {
    let (store, _feed) = test_store().await?;
    let alice = StandardAccounts::alice(&store).await?;

    let deposit = store
        .apply_balance_change(alice.id, 500, BalanceChangeKind::Deposit)
        .await?;
    assert_eq!((deposit.old_balance, deposit.new_balance), (0, 500));

    let withdrawal = store
        .apply_balance_change(alice.id, 200, BalanceChangeKind::Withdrawal)
        .await?;
    assert_eq!((withdrawal.old_balance, withdrawal.new_balance), (500, 300));

    assert_eq!(store.get_account(alice.id).await?.balance, 300);

    let transactions = store.list_transactions(alice.id).await?;
    let summary: Vec<_> = transactions
        .iter()
        .map(|tx| (tx.transaction_type, tx.amount, tx.old_balance, tx.new_balance))
        .collect();
    assert_eq!(
        summary,
        vec![
            (TransactionType::Registration, 0, 0, 0),
            (TransactionType::Deposit, 500, 0, 500),
            (TransactionType::Withdrawal, 200, 500, 300),
        ]
    );
    assert!(transactions.windows(2).all(|w| w[0].sequence < w[1].sequence));

    Ok(())
}

#[tokio::test]
async fn test_new_account_starts_empty_and_unverified() -> Result<()> {
    let (store, _feed) = test_store().await?;
    let bob = StandardAccounts::bob(&store).await?;

    assert_eq!(bob.balance, 0);
    assert_eq!(bob.mobile.as_deref(), Some("+15550100"));
    assert!(bob.plan.is_none());
    assert!(!bob.verification.email);
    assert!(!bob.verification.mobile);
    assert!(!bob.verification.kyc);
    assert!(!bob.verification.two_fa);

    Ok(())
}

#[tokio::test]
async fn test_balance_equals_signed_sum_of_changes() -> Result<()> {
    let (store, _feed) = test_store().await?;
    let alice = StandardAccounts::alice(&store).await?;

    let changes = [
        (BalanceChangeKind::Deposit, 10_000),
        (BalanceChangeKind::Withdrawal, 2_500),
        (BalanceChangeKind::Deposit, 99),
        (BalanceChangeKind::Withdrawal, 7_599),
        (BalanceChangeKind::Deposit, 1),
    ];
    let mut expected = 0;
    for (kind, amount) in changes {
        store.apply_balance_change(alice.id, amount, kind).await?;
        expected += match kind {
            BalanceChangeKind::Deposit => amount,
            BalanceChangeKind::Withdrawal => -amount,
        };
    }

    assert_eq!(store.get_account(alice.id).await?.balance, expected);
    assert_eq!(store.get_account(alice.id).await?.balance, 1);
    assert_eq!(store.list_transactions(alice.id).await?.len(), changes.len() + 1);

    Ok(())
}

#[tokio::test]
async fn test_overdraft_is_rejected_and_state_unchanged() -> Result<()> {
    let (store, _feed) = test_store().await?;
    let account = StandardAccounts::funded(&store, "saver@example.com", 1_000).await?;

    let err = store
        .apply_balance_change(account.id, 1_001, BalanceChangeKind::Withdrawal)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InsufficientBalance {
            balance: 1_000,
            required: 1_001,
            ..
        }
    ));

    assert_eq!(store.get_account(account.id).await?.balance, 1_000);
    assert_eq!(store.list_transactions(account.id).await?.len(), 2);

    // Withdrawing the exact balance is allowed
    store
        .apply_balance_change(account.id, 1_000, BalanceChangeKind::Withdrawal)
        .await?;
    assert_eq!(store.get_account(account.id).await?.balance, 0);

    Ok(())
}

#[tokio::test]
async fn test_non_positive_amount_is_rejected_first() -> Result<()> {
    let (store, _feed) = test_store().await?;
    let alice = StandardAccounts::alice(&store).await?;

    for amount in [0, -500] {
        let err = store
            .apply_balance_change(alice.id, amount, BalanceChangeKind::Deposit)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(a) if a == amount));
    }

    // Checked before the account lookup
    let err = store
        .apply_balance_change(uuid::Uuid::new_v4(), 0, BalanceChangeKind::Withdrawal)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidAmount(0)));

    assert_eq!(store.list_transactions(alice.id).await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_unknown_account_is_reported() -> Result<()> {
    let (store, _feed) = test_store().await?;
    let missing = uuid::Uuid::new_v4();

    let err = store
        .apply_balance_change(missing, 100, BalanceChangeKind::Deposit)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::AccountNotFound(id) if id == missing));

    assert!(matches!(
        store.list_transactions(missing).await.unwrap_err(),
        LedgerError::AccountNotFound(_)
    ));
    assert!(matches!(
        store.get_account(missing).await.unwrap_err(),
        LedgerError::AccountNotFound(_)
    ));

    Ok(())
}

#[tokio::test]
async fn test_mutations_do_not_touch_other_accounts() -> Result<()> {
    let (store, _feed) = test_store().await?;
    let alice = StandardAccounts::alice(&store).await?;
    let bob = StandardAccounts::bob(&store).await?;

    store
        .apply_balance_change(alice.id, 5_000, BalanceChangeKind::Deposit)
        .await?;
    store
        .apply_balance_change(alice.id, 1_000, BalanceChangeKind::Withdrawal)
        .await?;

    assert_eq!(store.get_account(bob.id).await?.balance, 0);
    assert_eq!(store.list_transactions(bob.id).await?.len(), 1);
    assert_eq!(store.list_transactions(alice.id).await?.len(), 3);

    Ok(())
}

#[tokio::test]
async fn test_duplicate_email_is_rejected_case_insensitively() -> Result<()> {
    let (store, _feed) = test_store().await?;
    StandardAccounts::alice(&store).await?;

    let err = store
        .create_account(AccountProfile::new("Impostor", "  ALICE@Example.com "))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::DuplicateAccount(email) if email == "ALICE@Example.com"));
    assert_eq!(store.list_accounts().await.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_invalid_profile_is_rejected() -> Result<()> {
    let (store, _feed) = test_store().await?;

    for profile in [
        AccountProfile::new("", "someone@example.com"),
        AccountProfile::new("Someone", "   "),
        AccountProfile::new("Someone", "not-an-email"),
    ] {
        let err = store.create_account(profile).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidProfile(_)));
    }
    assert!(store.list_accounts().await.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_failed_commit_leaves_memory_unchanged() -> Result<()> {
    let storage = Arc::new(FailingStorage::new());
    let (store, feed) = store_over(storage.clone()).await?;
    let account = StandardAccounts::funded(&store, "fragile@example.com", 2_000).await?;
    let notifications_before = feed.list().len();

    storage.fail_writes(true);

    let err = store
        .apply_balance_change(account.id, 500, BalanceChangeKind::Withdrawal)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Storage(_)));
    assert!(err.to_string().contains("disk unavailable"));

    let err = store
        .create_account(AccountProfile::new("Late", "late@example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Storage(_)));

    assert_eq!(store.get_account(account.id).await?.balance, 2_000);
    assert_eq!(store.list_transactions(account.id).await?.len(), 2);
    assert_eq!(store.list_accounts().await.len(), 1);
    assert_eq!(feed.list().len(), notifications_before);

    // The email was not reserved by the failed registration
    storage.fail_writes(false);
    store
        .create_account(AccountProfile::new("Late", "late@example.com"))
        .await?;

    Ok(())
}

#[tokio::test]
async fn test_registration_publishes_notification() -> Result<()> {
    let (store, feed) = test_store().await?;
    let alice = StandardAccounts::alice(&store).await?;

    let notifications = feed.list();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::Registration);
    assert_eq!(notifications[0].account_id, alice.id);
    assert!(!notifications[0].read);

    Ok(())
}

#[tokio::test]
async fn test_large_transaction_threshold_is_exclusive() -> Result<()> {
    let (store, feed) = test_store().await?;
    let alice = StandardAccounts::alice(&store).await?;
    let threshold = store.large_transaction_threshold();
    assert_eq!(threshold, 100_000);

    store
        .apply_balance_change(alice.id, threshold, BalanceChangeKind::Deposit)
        .await?;
    let large = |kind| {
        feed.list()
            .into_iter()
            .filter(|n| n.kind == kind)
            .count()
    };
    assert_eq!(large(NotificationKind::LargeTransaction), 0);

    store
        .apply_balance_change(alice.id, threshold + 1, BalanceChangeKind::Deposit)
        .await?;
    assert_eq!(large(NotificationKind::LargeTransaction), 1);

    store
        .apply_balance_change(alice.id, threshold + 1, BalanceChangeKind::Withdrawal)
        .await?;
    assert_eq!(large(NotificationKind::LargeTransaction), 2);

    let newest = &feed.list()[0];
    assert_eq!(newest.account_id, alice.id);
    assert!(newest.message.contains("withdrawal"));
    assert!(newest.message.contains("1000.01"));

    Ok(())
}
