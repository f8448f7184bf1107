use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::application::{LedgerStore, StoreOptions};
use crate::config::{Config, StorageBackend};
use crate::domain::{
    format_cents, parse_cents, Account, AccountProfile, BalanceChangeKind, Transaction,
    VerificationFlag,
};

/// Tradeledger - trading platform account ledger
#[derive(Parser)]
#[command(name = "tradeledger")]
#[command(about = "Accounts, balances, plans and an append-only transaction log")]
#[command(version)]
pub struct Cli {
    /// Storage backend (overrides TRADELEDGER_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<StorageBackend>,

    /// Data file path (overrides TRADELEDGER_DATA_PATH)
    #[arg(short, long)]
    pub data: Option<PathBuf>,

    /// Large-transaction threshold, e.g. "1000.00" (overrides TRADELEDGER_LARGE_TRANSACTION_THRESHOLD)
    #[arg(long)]
    pub threshold: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize storage and seed the plan catalog
    Init,

    /// Account management commands
    #[command(subcommand)]
    Account(AccountCommands),

    /// Deposit funds into an account
    Deposit {
        /// Account id or email
        account: String,

        /// Amount (e.g., "50.00" or "50")
        amount: String,
    },

    /// Withdraw funds from an account
    Withdraw {
        /// Account id or email
        account: String,

        /// Amount (e.g., "50.00" or "50")
        amount: String,
    },

    /// Purchase a plan, charging its price to the account balance
    Purchase {
        /// Account id or email
        account: String,

        /// Plan id (see `plans`)
        plan: String,
    },

    /// List an account's transactions, oldest first
    Transactions {
        /// Account id or email
        account: String,

        /// Show only the most recent N transactions
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// List accounts registered after a point in time
    Registrations {
        /// RFC 3339 timestamp or YYYY-MM-DD (defaults to 24 hours ago)
        #[arg(long)]
        since: Option<String>,
    },

    /// List accounts missing a verification
    Unverified {
        /// Verification: email, mobile, kyc, twoFA
        #[arg(default_value = "kyc")]
        flag: String,
    },

    /// Show the plan catalog
    Plans,

    /// Show dashboard statistics
    Stats,

    /// Verify ledger integrity
    Check,

    /// Export data to CSV or JSON
    Export {
        /// What to export: full, accounts, transactions
        export_type: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Replace the ledger with a JSON snapshot
    Import {
        /// Input file (stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,

        /// Validate without importing
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Register a new account
    Create {
        /// Account holder name
        name: String,

        /// Email address (must be unique)
        email: String,

        /// Mobile number
        #[arg(short, long)]
        mobile: Option<String>,
    },

    /// Show account details
    Show {
        /// Account id or email
        account: String,
    },

    /// List all accounts
    List,

    /// Mark a verification as passed (or revoke it)
    Verify {
        /// Account id or email
        account: String,

        /// Verification: email, mobile, kyc, twoFA
        flag: String,

        /// Clear the verification instead of setting it
        #[arg(long)]
        revoke: bool,
    },
}

impl Cli {
    /// Merge environment configuration with command-line overrides.
    pub fn config(&self) -> Result<Config> {
        let mut config = Config::from_env().context("Invalid TRADELEDGER_* configuration")?;
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(path) = &self.data {
            config.data_path = path.clone();
        }
        if let Some(threshold) = &self.threshold {
            config.large_transaction_threshold = parse_cents(threshold)
                .context("Invalid threshold format. Use '1000.00' or '1000'")?;
        }
        Ok(config)
    }

    pub async fn run(self) -> Result<()> {
        let config = self.config()?;
        let store = open_store(&config).await?;

        match self.command {
            Commands::Init => {
                let plans = store.list_plans().await;
                println!(
                    "Ledger initialized: {} ({:?}), {} plans available",
                    config.data_path.display(),
                    config.backend,
                    plans.len()
                );
            }

            Commands::Account(cmd) => run_account_command(&store, cmd).await?,

            Commands::Deposit { account, amount } => {
                run_balance_command(&store, &account, &amount, BalanceChangeKind::Deposit).await?;
            }

            Commands::Withdraw { account, amount } => {
                run_balance_command(&store, &account, &amount, BalanceChangeKind::Withdrawal)
                    .await?;
            }

            Commands::Purchase { account, plan } => {
                let account = resolve_account(&store, &account).await?;
                let tx = store.purchase_plan(account.id, &plan).await?;
                println!(
                    "{} -> {} (balance {} -> {})",
                    account.email,
                    tx.description,
                    format_cents(tx.old_balance),
                    format_cents(tx.new_balance)
                );
            }

            Commands::Transactions { account, limit } => {
                let account = resolve_account(&store, &account).await?;
                let mut transactions = store.list_transactions(account.id).await?;
                if let Some(limit) = limit {
                    let skip = transactions.len().saturating_sub(limit);
                    transactions.drain(..skip);
                }
                print_transactions(&transactions);
            }

            Commands::Registrations { since } => {
                let cutoff = match since {
                    Some(s) => parse_timestamp(&s)
                        .with_context(|| format!("Invalid --since value '{}'", s))?,
                    None => Utc::now() - Duration::hours(24),
                };
                let accounts = store.new_registrations_since(cutoff).await;
                println!("Registrations since {}:", cutoff.format("%Y-%m-%d %H:%M:%S"));
                print_accounts(&accounts);
            }

            Commands::Unverified { flag } => {
                let flag = parse_flag(&flag)?;
                let accounts = store.unverified_accounts(flag).await;
                println!("Accounts without {} verification:", flag);
                print_accounts(&accounts);
            }

            Commands::Plans => {
                println!("{:<10} {:<16} {:>10}  FEATURES", "ID", "NAME", "PRICE");
                println!("{}", "-".repeat(60));
                for plan in store.list_plans().await {
                    println!(
                        "{:<10} {:<16} {:>10}  {}",
                        plan.id,
                        truncate(&plan.name, 16),
                        format_cents(plan.price),
                        plan.features.join(", ")
                    );
                }
            }

            Commands::Stats => run_stats_command(&store).await,

            Commands::Check => run_check_command(&store).await?,

            Commands::Export {
                export_type,
                output,
            } => run_export_command(&store, &export_type, output.as_deref()).await?,

            Commands::Import { input, dry_run } => {
                run_import_command(&store, input.as_deref(), dry_run).await?;
            }
        }

        Ok(())
    }
}

async fn open_store(config: &Config) -> Result<LedgerStore> {
    let storage = config.open_storage().await?;
    let options =
        StoreOptions::default().with_large_transaction_threshold(config.large_transaction_threshold);
    let store = LedgerStore::open(storage, options).await?;
    Ok(store)
}

async fn run_account_command(store: &LedgerStore, cmd: AccountCommands) -> Result<()> {
    match cmd {
        AccountCommands::Create {
            name,
            email,
            mobile,
        } => {
            let mut profile = AccountProfile::new(name, email);
            if let Some(mobile) = mobile {
                profile = profile.with_mobile(mobile);
            }
            let account = store.create_account(profile).await?;
            println!("Created account: {} ({})", account.email, account.id);
        }

        AccountCommands::Show { account } => {
            let account = resolve_account(store, &account).await?;
            print_account_details(&account);
        }

        AccountCommands::List => {
            let accounts = store.list_accounts().await;
            print_accounts(&accounts);
        }

        AccountCommands::Verify {
            account,
            flag,
            revoke,
        } => {
            let flag = parse_flag(&flag)?;
            let account = resolve_account(store, &account).await?;
            let account = store.set_verification(account.id, flag, !revoke).await?;
            println!(
                "{}: {} {}",
                account.email,
                flag,
                if account.is_verified(flag) {
                    "verified"
                } else {
                    "not verified"
                }
            );
        }
    }
    Ok(())
}

async fn run_balance_command(
    store: &LedgerStore,
    account: &str,
    amount: &str,
    kind: BalanceChangeKind,
) -> Result<()> {
    let amount = parse_cents(amount).context("Invalid amount format. Use '50.00' or '50'")?;
    let account = resolve_account(store, account).await?;
    let tx = store.apply_balance_change(account.id, amount, kind).await?;
    println!(
        "Recorded {}: {} on {} (balance {} -> {})",
        kind.as_str(),
        format_cents(tx.amount),
        account.email,
        format_cents(tx.old_balance),
        format_cents(tx.new_balance)
    );
    if tx.amount > store.large_transaction_threshold() {
        eprintln!("Flagged as a large transaction");
    }
    Ok(())
}

async fn run_stats_command(store: &LedgerStore) {
    let stats = store.stats(Utc::now()).await;

    println!("Accounts:            {}", stats.account_count);
    println!("  new (24h):         {}", stats.registrations_last_24h);
    println!("  without KYC:       {}", stats.unverified_kyc);
    println!("  fully verified:    {}", stats.fully_verified);
    println!("Total balance:       {:>12}", format_cents(stats.total_balance));
    println!("Total deposits:      {:>12}", format_cents(stats.total_deposits));
    println!("Total withdrawals:   {:>12}", format_cents(stats.total_withdrawals));
    println!("Plan revenue:        {:>12}", format_cents(stats.plan_revenue));
    println!("Transactions:        {}", stats.transaction_count);

    if !stats.accounts_per_plan.is_empty() {
        println!();
        println!("Accounts per plan:");
        for (plan, count) in &stats.accounts_per_plan {
            println!("  {:<12} {}", plan, count);
        }
    }
}

async fn run_check_command(store: &LedgerStore) -> Result<()> {
    println!("Checking ledger integrity...\n");

    let report = store.check_integrity().await;

    println!("Accounts:     {}", report.account_count);
    println!("Transactions: {}", report.transaction_count);
    println!("Total:        {}", format_cents(report.total_balance));
    println!();

    if report.is_healthy() {
        println!("Ledger is consistent.");
    } else {
        println!("Issues found:");
        for issue in &report.issues {
            println!("  - {}", issue);
        }
        anyhow::bail!("Ledger integrity check failed");
    }

    Ok(())
}

async fn run_export_command(
    store: &LedgerStore,
    export_type: &str,
    output: Option<&str>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{stdout, Write};

    let exporter = Exporter::new(store);

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    match export_type {
        "accounts" => {
            let count = exporter.export_accounts_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} accounts", count);
            }
        }
        "transactions" => {
            let count = exporter.export_transactions_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} transactions", count);
            }
        }
        "full" => {
            let snapshot = exporter.export_full_json(writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported full ledger: {} accounts, {} transactions, {} plans",
                    snapshot.accounts.len(),
                    snapshot.transactions.len(),
                    snapshot.plans.len()
                );
            }
        }
        _ => {
            anyhow::bail!(
                "Invalid export type '{}'. Valid types: full, accounts, transactions",
                export_type
            );
        }
    }

    Ok(())
}

async fn run_import_command(store: &LedgerStore, input: Option<&str>, dry_run: bool) -> Result<()> {
    use crate::io::{ImportOptions, Importer};
    use std::fs::File;
    use std::io::{stdin, Read};

    let importer = Importer::new(store);

    let reader: Box<dyn Read> = match input {
        Some(path) => {
            let file =
                File::open(path).with_context(|| format!("Failed to open input file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdin()),
    };

    let result = importer
        .import_full_json(reader, ImportOptions { dry_run })
        .await?;

    println!("  Accounts:     {}", result.accounts);
    println!("  Transactions: {}", result.transactions);
    println!("  Plans:        {}", result.plans);

    if !result.issues.is_empty() {
        println!("\nIssues:");
        for issue in result.issues.iter().take(10) {
            println!("  - {}", issue);
        }
        if result.issues.len() > 10 {
            println!("  ... and {} more issues", result.issues.len() - 10);
        }
        anyhow::bail!("Snapshot rejected; ledger unchanged");
    }

    if result.applied {
        println!("Import complete");
    } else {
        println!("Validation successful");
    }

    Ok(())
}

/// Accept either an account id or a registered email.
async fn resolve_account(store: &LedgerStore, reference: &str) -> Result<Account> {
    let account = match Uuid::parse_str(reference) {
        Ok(id) => store.get_account(id).await?,
        Err(_) => store.find_account_by_email(reference).await?,
    };
    Ok(account)
}

fn parse_flag(s: &str) -> Result<VerificationFlag> {
    VerificationFlag::parse(s).with_context(|| {
        format!(
            "Invalid verification '{}'. Valid values: email, mobile, kyc, twoFA",
            s
        )
    })
}

fn print_accounts(accounts: &[Account]) {
    if accounts.is_empty() {
        println!("No accounts found.");
        return;
    }
    println!(
        "{:<20} {:<28} {:>12} {:<8} {:<12}",
        "NAME", "EMAIL", "BALANCE", "PLAN", "REGISTERED"
    );
    println!("{}", "-".repeat(84));
    for account in accounts {
        println!(
            "{:<20} {:<28} {:>12} {:<8} {:<12}",
            truncate(&account.name, 20),
            truncate(&account.email, 28),
            format_cents(account.balance),
            account.plan.as_deref().unwrap_or("-"),
            account.created_at.format("%Y-%m-%d")
        );
    }
}

fn print_account_details(account: &Account) {
    println!("Account: {}", account.id);
    println!("  Name:       {}", account.name);
    println!("  Email:      {}", account.email);
    if let Some(mobile) = &account.mobile {
        println!("  Mobile:     {}", mobile);
    }
    println!("  Balance:    {}", format_cents(account.balance));
    match (&account.plan, account.plan_purchased_at) {
        (Some(plan), Some(at)) => {
            println!("  Plan:       {} (since {})", plan, at.format("%Y-%m-%d"))
        }
        (Some(plan), None) => println!("  Plan:       {}", plan),
        _ => println!("  Plan:       -"),
    }
    println!(
        "  Registered: {}",
        account.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!("  Verification:");
    for flag in VerificationFlag::ALL {
        println!(
            "    {:<8} {}",
            flag.as_str(),
            if account.is_verified(flag) { "yes" } else { "no" }
        );
    }
}

fn print_transactions(transactions: &[Transaction]) {
    if transactions.is_empty() {
        println!("No transactions found.");
        return;
    }
    println!(
        "{:>6} {:<20} {:<14} {:>10} {:>12} {:>12}  DESCRIPTION",
        "SEQ", "DATE", "TYPE", "AMOUNT", "BEFORE", "AFTER"
    );
    println!("{}", "-".repeat(96));
    for tx in transactions {
        println!(
            "{:>6} {:<20} {:<14} {:>10} {:>12} {:>12}  {}",
            tx.sequence,
            tx.timestamp.format("%Y-%m-%d %H:%M:%S"),
            tx.transaction_type.as_str(),
            format_cents(tx.amount),
            format_cents(tx.old_balance),
            format_cents(tx.new_balance),
            truncate(&tx.description, 30)
        );
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .context("Expected an RFC 3339 timestamp or YYYY-MM-DD")?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .context("Invalid time")?;
    Ok(midnight.and_utc())
}
