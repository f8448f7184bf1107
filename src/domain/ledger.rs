use std::collections::{HashMap, HashSet};

use thiserror::Error;

use super::{
    total_cents, Account, AccountId, BalanceChangeKind, Cents, Plan, TotalCents, Transaction,
    TransactionType,
};

/// A balance change that would break a ledger invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerViolation {
    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(Cents),

    #[error("balance {balance} cannot cover {required}")]
    InsufficientBalance { balance: Cents, required: Cents },

    #[error("amount {0} would overflow the balance")]
    Overflow(Cents),
}

/// Compute the balance that results from applying `amount` as `kind`.
///
/// Deposits add, withdrawals subtract. The amount must be positive and a
/// withdrawal may not take the balance below zero.
pub fn apply_change(
    balance: Cents,
    amount: Cents,
    kind: BalanceChangeKind,
) -> Result<Cents, LedgerViolation> {
    if amount <= 0 {
        return Err(LedgerViolation::NonPositiveAmount(amount));
    }
    match kind {
        BalanceChangeKind::Deposit => balance
            .checked_add(amount)
            .ok_or(LedgerViolation::Overflow(amount)),
        BalanceChangeKind::Withdrawal => {
            if amount > balance {
                return Err(LedgerViolation::InsufficientBalance {
                    balance,
                    required: amount,
                });
            }
            Ok(balance - amount)
        }
    }
}

/// Compute the balance after paying for `plan`. Free plans leave it unchanged.
pub fn charge_for_plan(balance: Cents, plan: &Plan) -> Result<Cents, LedgerViolation> {
    if plan.price == 0 {
        return Ok(balance);
    }
    apply_change(balance, plan.price, BalanceChangeKind::Withdrawal)
}

/// Replay a transaction log from a zero balance.
///
/// Returns `None` if the log does not fit in `Cents` at some point.
pub fn replay_balance<'a>(
    transactions: impl IntoIterator<Item = &'a Transaction>,
) -> Option<Cents> {
    transactions
        .into_iter()
        .try_fold(0 as Cents, |balance, tx| balance.checked_add(tx.signed_amount()?))
}

/// Result of checking every account's transaction chain.
#[derive(Debug, Clone, Default)]
pub struct IntegrityReport {
    pub account_count: usize,
    pub transaction_count: usize,
    pub total_balance: TotalCents,
    pub issues: Vec<String>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Check that each account's balance is explained by its transactions.
///
/// `transactions` may be in any order; each chain is sorted by sequence before
/// the links are verified.
pub fn build_integrity_report(
    accounts: &[Account],
    transactions: &[Transaction],
    plans: &[Plan],
) -> IntegrityReport {
    let mut report = IntegrityReport {
        account_count: accounts.len(),
        transaction_count: transactions.len(),
        total_balance: total_cents(accounts.iter().map(|a| a.balance)),
        issues: Vec::new(),
    };

    let known: HashSet<AccountId> = accounts.iter().map(|a| a.id).collect();
    let plan_ids: HashSet<&str> = plans.iter().map(|p| p.id.as_str()).collect();

    let mut chains: HashMap<AccountId, Vec<&Transaction>> = HashMap::new();
    for tx in transactions {
        if known.contains(&tx.account_id) {
            chains.entry(tx.account_id).or_default().push(tx);
        } else {
            report.issues.push(format!(
                "transaction {} references unknown account {}",
                tx.id, tx.account_id
            ));
        }
    }

    let mut seen_sequences = HashSet::new();
    for tx in transactions {
        if !seen_sequences.insert(tx.sequence) {
            report
                .issues
                .push(format!("sequence {} is used more than once", tx.sequence));
        }
    }

    for account in accounts {
        if account.balance < 0 {
            report.issues.push(format!(
                "account {} has negative balance {}",
                account.id, account.balance
            ));
        }
        if let Some(plan) = &account.plan {
            if !plan_ids.contains(plan.as_str()) {
                report
                    .issues
                    .push(format!("account {} references unknown plan '{}'", account.id, plan));
            }
        }

        let mut chain = chains.remove(&account.id).unwrap_or_default();
        chain.sort_by_key(|tx| tx.sequence);

        if !chain
            .iter()
            .any(|tx| tx.transaction_type == TransactionType::Registration)
        {
            report
                .issues
                .push(format!("account {} has no registration record", account.id));
        }

        let mut running: Cents = 0;
        for tx in &chain {
            if tx.old_balance != running {
                report.issues.push(format!(
                    "transaction {} starts at {} but previous balance was {}",
                    tx.id, tx.old_balance, running
                ));
            }
            match tx
                .signed_amount()
                .and_then(|signed| tx.old_balance.checked_add(signed).map(|sum| (signed, sum)))
            {
                Some((_, sum)) if sum == tx.new_balance => {}
                Some((signed, sum)) => report.issues.push(format!(
                    "transaction {} does not add up: {} {:+} = {} != {}",
                    tx.id, tx.old_balance, signed, sum, tx.new_balance
                )),
                None => report.issues.push(format!(
                    "transaction {} overflows: {} plus {} of {}",
                    tx.id,
                    tx.old_balance,
                    tx.transaction_type.as_str(),
                    tx.amount
                )),
            }
            if tx.transaction_type != TransactionType::Registration && tx.amount <= 0 {
                report
                    .issues
                    .push(format!("transaction {} has non-positive amount", tx.id));
            }
            running = tx.new_balance;
        }

        match replay_balance(chain.iter().copied()) {
            Some(replayed) if replayed == account.balance => {}
            Some(replayed) => report.issues.push(format!(
                "account {} balance {} does not match its transactions ({})",
                account.id, account.balance, replayed
            )),
            None => report.issues.push(format!(
                "account {} transactions overflow when replayed",
                account.id
            )),
        }
    }

    report
}
