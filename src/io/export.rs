use std::io::Write;

use anyhow::Result;

use crate::application::LedgerStore;
use crate::domain::format_cents;
use crate::storage::Snapshot;

/// Writes ledger data out as CSV or JSON.
pub struct Exporter<'a> {
    store: &'a LedgerStore,
}

impl<'a> Exporter<'a> {
    pub fn new(store: &'a LedgerStore) -> Self {
        Self { store }
    }

    /// Export accounts to CSV, in registration order
    pub async fn export_accounts_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let accounts = self.store.list_accounts().await;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "name",
            "email",
            "mobile",
            "balance",
            "plan",
            "verified_email",
            "verified_mobile",
            "verified_kyc",
            "verified_two_fa",
            "created_at",
        ])?;

        for account in &accounts {
            let v = &account.verification;
            csv_writer.write_record([
                account.id.to_string(),
                account.name.clone(),
                account.email.clone(),
                account.mobile.clone().unwrap_or_default(),
                format_cents(account.balance),
                account.plan.clone().unwrap_or_default(),
                v.email.to_string(),
                v.mobile.to_string(),
                v.kyc.to_string(),
                v.two_fa.to_string(),
                account.created_at.to_rfc3339(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(accounts.len())
    }

    /// Export every transaction to CSV, ordered by sequence
    pub async fn export_transactions_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let snapshot = self.store.snapshot().await;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "sequence",
            "timestamp",
            "account_id",
            "type",
            "amount",
            "old_balance",
            "new_balance",
            "description",
            "status",
        ])?;

        let mut count = 0;
        for tx in snapshot.ordered_transactions() {
            csv_writer.write_record([
                tx.id.to_string(),
                tx.sequence.to_string(),
                tx.timestamp.to_rfc3339(),
                tx.account_id.to_string(),
                tx.transaction_type.as_str().to_string(),
                format_cents(tx.amount),
                format_cents(tx.old_balance),
                format_cents(tx.new_balance),
                tx.description.clone(),
                tx.status.as_str().to_string(),
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export the full ledger as a JSON snapshot
    pub async fn export_full_json<W: Write>(&self, mut writer: W) -> Result<Snapshot> {
        let snapshot = self.store.snapshot().await;

        let json = serde_json::to_string_pretty(&snapshot)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(snapshot)
    }
}
