use std::io::Read;

use anyhow::{Context, Result};

use crate::application::LedgerStore;
use crate::domain::build_integrity_report;
use crate::storage::Snapshot;

/// Outcome of importing a snapshot.
#[derive(Debug, Clone, Default)]
pub struct ImportResult {
    pub accounts: usize,
    pub transactions: usize,
    pub plans: usize,
    /// Whether the ledger was replaced.
    pub applied: bool,
    /// Consistency problems found in the snapshot. Nothing is applied when non-empty.
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub dry_run: bool,
}

/// Loads a JSON snapshot into the ledger, replacing its contents.
pub struct Importer<'a> {
    store: &'a LedgerStore,
}

impl<'a> Importer<'a> {
    pub fn new(store: &'a LedgerStore) -> Self {
        Self { store }
    }

    /// Import a full JSON snapshot as written by `Exporter::export_full_json`
    pub async fn import_full_json<R: Read>(
        &self,
        reader: R,
        options: ImportOptions,
    ) -> Result<ImportResult> {
        let snapshot: Snapshot =
            serde_json::from_reader(reader).context("Invalid snapshot JSON")?;
        self.import_snapshot(snapshot, options).await
    }

    pub async fn import_snapshot(
        &self,
        snapshot: Snapshot,
        options: ImportOptions,
    ) -> Result<ImportResult> {
        let accounts: Vec<_> = snapshot.accounts.values().cloned().collect();
        let transactions: Vec<_> = snapshot.transactions.values().cloned().collect();
        let report = build_integrity_report(&accounts, &transactions, &snapshot.plans);

        let mut result = ImportResult {
            accounts: accounts.len(),
            transactions: transactions.len(),
            plans: snapshot.plans.len(),
            applied: false,
            issues: report.issues,
        };

        if options.dry_run || !result.issues.is_empty() {
            return Ok(result);
        }

        self.store.restore(snapshot).await?;
        result.applied = true;
        Ok(result)
    }
}
