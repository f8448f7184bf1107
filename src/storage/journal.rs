use std::ffi::OsString;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::domain::{Account, Plan, Transaction};

use super::{Snapshot, Storage};

/// One line of the journal.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum JournalRecord {
    Commit {
        account: Account,
        transaction: Transaction,
    },
    Account {
        account: Account,
    },
    Transaction {
        transaction: Transaction,
    },
    Plans {
        plans: Vec<Plan>,
    },
}

impl JournalRecord {
    fn apply(self, snapshot: &mut Snapshot) {
        match self {
            JournalRecord::Commit {
                account,
                transaction,
            } => snapshot.apply_commit(&account, &transaction),
            JournalRecord::Account { account } => {
                snapshot.accounts.insert(account.id, account);
            }
            JournalRecord::Transaction { transaction } => {
                snapshot.transactions.insert(transaction.id, transaction);
            }
            JournalRecord::Plans { plans } => snapshot.plans = plans,
        }
    }

    fn to_line(&self) -> Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self).context("Failed to encode journal record")?;
        line.push(b'\n');
        Ok(line)
    }
}

/// Flat-file storage: an append-only JSON Lines journal.
///
/// Each mutation appends a single line, so writes cost O(record) rather than
/// O(ledger). Loading replays the journal; later account records supersede
/// earlier ones. A final line without its newline is an interrupted append and
/// is discarded, both on load and before the next append. A failed append is
/// truncated away before the error is returned.
pub struct JournalStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JournalStorage {
    /// Use the journal at `path`, creating parent directories as needed.
    /// The file itself is created on first write.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    async fn append(&self, record: &JournalRecord) -> Result<()> {
        let line = record.to_line()?;
        let _guard = self.write_lock.lock().await;

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open journal {}", self.path.display()))?;
        let len = self.drop_torn_tail(&mut file).await?;

        let written: Result<()> = async {
            file.write_all(&line)
                .await
                .context("Failed to append to journal")?;
            file.sync_data().await.context("Failed to sync journal")
        }
        .await;

        if let Err(e) = written {
            // Leave the file ending on a complete line.
            if let Err(rollback) = file.set_len(len).await {
                tracing::error!(
                    path = %self.path.display(),
                    error = %rollback,
                    "failed to roll back partial journal append"
                );
            }
            return Err(e);
        }
        Ok(())
    }

    /// Cut an interrupted trailing append off the file so the next append starts
    /// on a fresh line. Returns the length that was kept.
    async fn drop_torn_tail(&self, file: &mut fs::File) -> Result<u64> {
        let len = file
            .metadata()
            .await
            .context("Failed to stat journal")?
            .len();
        if len == 0 {
            return Ok(0);
        }

        file.seek(SeekFrom::End(-1))
            .await
            .context("Failed to seek journal")?;
        if file.read_u8().await.context("Failed to read journal")? == b'\n' {
            return Ok(len);
        }

        let contents = fs::read(&self.path)
            .await
            .with_context(|| format!("Failed to read journal {}", self.path.display()))?;
        let kept = contents
            .iter()
            .rposition(|b| *b == b'\n')
            .map(|i| i as u64 + 1)
            .unwrap_or(0);

        tracing::warn!(
            path = %self.path.display(),
            bytes = len - kept,
            "discarding interrupted journal append"
        );
        file.set_len(kept)
            .await
            .context("Failed to truncate journal")?;
        file.sync_all().await.context("Failed to sync journal")?;
        Ok(kept)
    }

    async fn repair(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .await
            .context("Failed to open journal for repair")?;
        self.drop_torn_tail(&mut file).await?;
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}

#[async_trait]
impl Storage for JournalStorage {
    async fn load(&self) -> Result<Snapshot> {
        let contents = match fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Snapshot::empty()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read journal {}", self.path.display()));
            }
        };

        let complete_len = contents
            .iter()
            .rposition(|b| *b == b'\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        let (complete, torn) = contents.split_at(complete_len);
        let complete = std::str::from_utf8(complete)
            .with_context(|| format!("Journal {} is not valid UTF-8", self.path.display()))?;

        let mut snapshot = Snapshot::empty();
        for (index, line) in complete.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: JournalRecord = serde_json::from_str(line).with_context(|| {
                format!(
                    "Corrupt journal entry at {}:{}",
                    self.path.display(),
                    index + 1
                )
            })?;
            record.apply(&mut snapshot);
        }

        if !torn.is_empty() {
            self.repair().await?;
        }

        Ok(snapshot)
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let mut buffer = JournalRecord::Plans {
            plans: snapshot.plans.clone(),
        }
        .to_line()?;
        for account in snapshot.accounts.values() {
            buffer.extend(
                JournalRecord::Account {
                    account: account.clone(),
                }
                .to_line()?,
            );
        }
        for transaction in snapshot.ordered_transactions() {
            buffer.extend(
                JournalRecord::Transaction {
                    transaction: transaction.clone(),
                }
                .to_line()?,
            );
        }

        let _guard = self.write_lock.lock().await;
        let temp = self.temp_path();
        let mut file = fs::File::create(&temp)
            .await
            .with_context(|| format!("Failed to create {}", temp.display()))?;
        file.write_all(&buffer)
            .await
            .context("Failed to write journal")?;
        file.sync_all().await.context("Failed to sync journal")?;
        drop(file);

        fs::rename(&temp, &self.path)
            .await
            .with_context(|| format!("Failed to replace journal {}", self.path.display()))?;

        tracing::debug!(
            path = %self.path.display(),
            accounts = snapshot.accounts.len(),
            transactions = snapshot.transactions.len(),
            "journal rewritten"
        );
        Ok(())
    }

    async fn commit(&self, account: &Account, transaction: &Transaction) -> Result<()> {
        self.append(&JournalRecord::Commit {
            account: account.clone(),
            transaction: transaction.clone(),
        })
        .await
    }

    async fn upsert_account(&self, account: &Account) -> Result<()> {
        self.append(&JournalRecord::Account {
            account: account.clone(),
        })
        .await
    }

    async fn seed_plans(&self, plans: &[Plan]) -> Result<()> {
        self.append(&JournalRecord::Plans {
            plans: plans.to_vec(),
        })
        .await
    }
}
