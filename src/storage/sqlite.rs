use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::{
    Account, Plan, Transaction, TransactionStatus, TransactionType, Verification,
};

use super::{Snapshot, Storage, MIGRATION_001_INITIAL};

/// SQL-file storage backed by SQLite.
///
/// Every mutation touches only the rows it changes; `commit` wraps the account
/// upsert and the transaction insert in one SQL transaction.
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a storage over an existing pool. The schema must already exist.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database file at `path` and apply the schema.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {}", path.as_ref().display()))?;
        let storage = Self::new(pool);
        storage.migrate().await?;
        Ok(storage)
    }

    /// Apply the schema. Safe to run repeatedly.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    // ========================
    // Row writers
    // ========================

    async fn write_account(conn: &mut SqliteConnection, account: &Account) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, name, email, email_key, mobile, balance, verified_email, verified_mobile, verified_kyc, verified_two_fa, plan_id, plan_purchased_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                email = excluded.email,
                email_key = excluded.email_key,
                mobile = excluded.mobile,
                balance = excluded.balance,
                verified_email = excluded.verified_email,
                verified_mobile = excluded.verified_mobile,
                verified_kyc = excluded.verified_kyc,
                verified_two_fa = excluded.verified_two_fa,
                plan_id = excluded.plan_id,
                plan_purchased_at = excluded.plan_purchased_at
            "#,
        )
        .bind(account.id.to_string())
        .bind(&account.name)
        .bind(&account.email)
        .bind(account.email_key())
        .bind(&account.mobile)
        .bind(account.balance)
        .bind(account.verification.email)
        .bind(account.verification.mobile)
        .bind(account.verification.kyc)
        .bind(account.verification.two_fa)
        .bind(&account.plan)
        .bind(account.plan_purchased_at.map(|dt| dt.to_rfc3339()))
        .bind(account.created_at.to_rfc3339())
        .execute(&mut *conn)
        .await
        .context("Failed to upsert account")?;
        Ok(())
    }

    async fn write_transaction(conn: &mut SqliteConnection, tx: &Transaction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (id, sequence, account_id, transaction_type, amount, old_balance, new_balance, description, status, timestamp)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(tx.id.to_string())
        .bind(tx.sequence)
        .bind(tx.account_id.to_string())
        .bind(tx.transaction_type.as_str())
        .bind(tx.amount)
        .bind(tx.old_balance)
        .bind(tx.new_balance)
        .bind(&tx.description)
        .bind(tx.status.as_str())
        .bind(tx.timestamp.to_rfc3339())
        .execute(&mut *conn)
        .await
        .context("Failed to insert transaction")?;
        Ok(())
    }

    async fn write_plans(conn: &mut SqliteConnection, plans: &[Plan]) -> Result<()> {
        sqlx::query("DELETE FROM plans")
            .execute(&mut *conn)
            .await
            .context("Failed to clear plans")?;

        for (position, plan) in plans.iter().enumerate() {
            let features = serde_json::to_string(&plan.features)?;
            sqlx::query(
                "INSERT INTO plans (id, name, price, features, position) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&plan.id)
            .bind(&plan.name)
            .bind(plan.price)
            .bind(features)
            .bind(position as i64)
            .execute(&mut *conn)
            .await
            .context("Failed to insert plan")?;
        }
        Ok(())
    }

    // ========================
    // Row readers
    // ========================

    fn row_to_plan(row: &SqliteRow) -> Result<Plan> {
        let features_json: String = row.get("features");
        Ok(Plan {
            id: row.get("id"),
            name: row.get("name"),
            price: row.get("price"),
            features: serde_json::from_str(&features_json).context("Invalid plan features")?,
        })
    }

    fn row_to_account(row: &SqliteRow) -> Result<Account> {
        let id_str: String = row.get("id");
        let created_at_str: String = row.get("created_at");
        let purchased_at_str: Option<String> = row.get("plan_purchased_at");

        Ok(Account {
            id: Uuid::parse_str(&id_str).context("Invalid account ID")?,
            name: row.get("name"),
            email: row.get("email"),
            mobile: row.get("mobile"),
            balance: row.get("balance"),
            verification: Verification {
                email: row.get::<i32, _>("verified_email") != 0,
                mobile: row.get::<i32, _>("verified_mobile") != 0,
                kyc: row.get::<i32, _>("verified_kyc") != 0,
                two_fa: row.get::<i32, _>("verified_two_fa") != 0,
            },
            plan: row.get("plan_id"),
            plan_purchased_at: purchased_at_str
                .map(|s| parse_timestamp(&s))
                .transpose()
                .context("Invalid plan_purchased_at timestamp")?,
            created_at: parse_timestamp(&created_at_str)
                .context("Invalid created_at timestamp")?,
        })
    }

    fn row_to_transaction(row: &SqliteRow) -> Result<Transaction> {
        let id_str: String = row.get("id");
        let account_id_str: String = row.get("account_id");
        let type_str: String = row.get("transaction_type");
        let status_str: String = row.get("status");
        let timestamp_str: String = row.get("timestamp");

        Ok(Transaction {
            id: Uuid::parse_str(&id_str).context("Invalid transaction ID")?,
            sequence: row.get("sequence"),
            account_id: Uuid::parse_str(&account_id_str).context("Invalid account ID")?,
            transaction_type: TransactionType::parse(&type_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid transaction type: {}", type_str))?,
            amount: row.get("amount"),
            old_balance: row.get("old_balance"),
            new_balance: row.get("new_balance"),
            description: row.get("description"),
            status: TransactionStatus::parse(&status_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid transaction status: {}", status_str))?,
            timestamp: parse_timestamp(&timestamp_str).context("Invalid timestamp")?,
        })
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn load(&self) -> Result<Snapshot> {
        let plan_rows = sqlx::query("SELECT id, name, price, features FROM plans ORDER BY position")
            .fetch_all(&self.pool)
            .await
            .context("Failed to load plans")?;

        let account_rows = sqlx::query(
            r#"
            SELECT id, name, email, mobile, balance, verified_email, verified_mobile, verified_kyc, verified_two_fa, plan_id, plan_purchased_at, created_at
            FROM accounts
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to load accounts")?;

        let transaction_rows = sqlx::query(
            r#"
            SELECT id, sequence, account_id, transaction_type, amount, old_balance, new_balance, description, status, timestamp
            FROM transactions
            ORDER BY sequence
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to load transactions")?;

        let mut snapshot = Snapshot::empty();
        snapshot.plans = plan_rows
            .iter()
            .map(Self::row_to_plan)
            .collect::<Result<_>>()?;
        for row in &account_rows {
            let account = Self::row_to_account(row)?;
            snapshot.accounts.insert(account.id, account);
        }
        for row in &transaction_rows {
            let tx = Self::row_to_transaction(row)?;
            snapshot.transactions.insert(tx.id, tx);
        }

        Ok(snapshot)
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin")?;

        sqlx::query("DELETE FROM transactions")
            .execute(&mut *tx)
            .await
            .context("Failed to clear transactions")?;
        sqlx::query("DELETE FROM accounts")
            .execute(&mut *tx)
            .await
            .context("Failed to clear accounts")?;

        Self::write_plans(&mut tx, &snapshot.plans).await?;
        for account in snapshot.accounts.values() {
            Self::write_account(&mut tx, account).await?;
        }
        for transaction in snapshot.ordered_transactions() {
            Self::write_transaction(&mut tx, transaction).await?;
        }

        tx.commit().await.context("Failed to commit snapshot")?;
        Ok(())
    }

    async fn commit(&self, account: &Account, transaction: &Transaction) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin")?;
        Self::write_account(&mut tx, account).await?;
        Self::write_transaction(&mut tx, transaction).await?;
        tx.commit().await.context("Failed to commit")?;
        Ok(())
    }

    async fn upsert_account(&self, account: &Account) -> Result<()> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection")?;
        Self::write_account(&mut conn, account).await
    }

    async fn seed_plans(&self, plans: &[Plan]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin")?;
        Self::write_plans(&mut tx, plans).await?;
        tx.commit().await.context("Failed to commit plans")?;
        Ok(())
    }
}
