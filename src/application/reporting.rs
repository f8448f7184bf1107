use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    total_cents, Account, PlanId, TotalCents, Transaction, TransactionType, VerificationFlag,
};

/// Admin dashboard figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerStats {
    pub as_of: DateTime<Utc>,
    pub account_count: usize,
    pub total_balance: TotalCents,
    pub total_deposits: TotalCents,
    pub total_withdrawals: TotalCents,
    pub plan_revenue: TotalCents,
    pub transaction_count: usize,
    pub registrations_last_24h: usize,
    pub unverified_kyc: usize,
    pub fully_verified: usize,
    pub accounts_per_plan: BTreeMap<PlanId, usize>,
}

pub fn build_stats(
    accounts: &[Account],
    transactions: &[Transaction],
    now: DateTime<Utc>,
) -> LedgerStats {
    let day_ago = now - Duration::hours(24);

    let mut accounts_per_plan = BTreeMap::new();
    for plan in accounts.iter().filter_map(|a| a.plan.as_ref()) {
        *accounts_per_plan.entry(plan.clone()).or_insert(0) += 1;
    }

    let total_for = |kind: TransactionType| -> TotalCents {
        total_cents(
            transactions
                .iter()
                .filter(|tx| tx.transaction_type == kind)
                .map(|tx| tx.amount),
        )
    };

    LedgerStats {
        as_of: now,
        account_count: accounts.len(),
        total_balance: total_cents(accounts.iter().map(|a| a.balance)),
        total_deposits: total_for(TransactionType::Deposit),
        total_withdrawals: total_for(TransactionType::Withdrawal),
        plan_revenue: total_for(TransactionType::PlanPurchase),
        transaction_count: transactions.len(),
        registrations_last_24h: accounts
            .iter()
            .filter(|a| a.created_at > day_ago && a.created_at <= now)
            .count(),
        unverified_kyc: accounts
            .iter()
            .filter(|a| !a.is_verified(VerificationFlag::Kyc))
            .count(),
        fully_verified: accounts
            .iter()
            .filter(|a| a.verification.is_fully_verified())
            .count(),
        accounts_per_plan,
    }
}
