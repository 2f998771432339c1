// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # credtree Benchmark Driver
//!
//! Entry point for the `credtree-bench` binary. Parses CLI arguments,
//! initializes logging and metrics, and dispatches to a subcommand:
//!
//! - `accounts` generates, imports or lists rows of the account table
//! - `config`   writes a scenario file
//! - `run`      builds a scenario's credential tree and verifies it
//! - `verify`   checks one credential, root or tree against a saved run
//! - `version`  prints build and protocol constants

mod cli;
mod driver;
mod logging;
mod metrics;
mod scenario;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal;

use credtree_contracts::{LedgerConfig, SimulatedLedger, World};
use credtree_protocol::accounts::{AccountAllocator, AccountRole, AllocatorConfig, SelectionOrder};
use credtree_protocol::crypto::AccountKey;
use credtree_protocol::ledger::LedgerBackend;
use credtree_protocol::primitives::digest_hex;
use credtree_protocol::storage::CredDb;
use credtree_protocol::tree::{TreeVerifier, VerificationContext};

use cli::{AccountsCommand, Cli, Commands, ConfigCommand, VerifyCommand, VerifyTarget};
use driver::{Driver, DriverOptions, WORLD_KEY};
use logging::LogFormat;
use metrics::BenchMetrics;
use scenario::ScenarioConfig;

const DEFAULT_LOG_LEVEL: &str = "credtree_bench=info,credtree_protocol=warn,credtree_contracts=warn";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(DEFAULT_LOG_LEVEL, LogFormat::from_str_lossy(&cli.log_format));

    match cli.command {
        Commands::Accounts { command } => accounts(command),
        Commands::Config { command } => config(command),
        Commands::Run(args) => run(args).await,
        Commands::Verify { command } => verify(command).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Opens the account table outside of a run. Nonces are never reserved
/// here, so a fresh development ledger is enough.
fn open_allocator(path: &Path) -> Result<AccountAllocator> {
    let db = CredDb::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;
    let ledger: Arc<dyn LedgerBackend> = Arc::new(SimulatedLedger::default());
    Ok(AccountAllocator::new(db, ledger, AllocatorConfig::default()))
}

fn accounts(command: AccountsCommand) -> Result<()> {
    match command {
        AccountsCommand::Generate(args) => {
            let allocator = open_allocator(&args.db.db)?;
            let created = allocator
                .generate(args.count)
                .context("failed to generate accounts")?;
            allocator.db().flush()?;
            println!("Generated {} accounts in {}", created.len(), args.db.db.display());
        }
        AccountsCommand::Import(args) => {
            let allocator = open_allocator(&args.db.db)?;
            let key = AccountKey::from_hex(args.secret.trim()).context("invalid secret key")?;
            let account = allocator.import(&key).context("failed to import account")?;
            allocator.db().flush()?;
            println!("Imported {} ({})", account.address, account.role);
        }
        AccountsCommand::List(args) => {
            let allocator = open_allocator(&args.db.db)?;
            let accounts = match args.role.as_deref() {
                Some(role) => {
                    let role: AccountRole = role.parse().map_err(anyhow::Error::msg)?;
                    allocator.by_role(role)?
                }
                None => allocator.all()?,
            };
            for account in &accounts {
                println!(
                    "{}  {:<13}  nonce {:<6}  contracts {}",
                    account.address,
                    account.role.as_str(),
                    account.nonce,
                    account.contracts.len()
                );
            }
            println!("{} accounts", accounts.len());
        }
    }
    Ok(())
}

fn config(command: ConfigCommand) -> Result<()> {
    let ConfigCommand::Generate(args) = command;
    let account_distribution = match args.distribution.to_ascii_lowercase().as_str() {
        "sequential" => SelectionOrder::Sequential,
        "random" => SelectionOrder::Random,
        other => bail!("unknown account distribution: {other} (expected sequential or random)"),
    };
    let scenario = ScenarioConfig {
        total_accounts: args.total_accounts,
        account_distribution,
        faculties: args.faculties,
        faculty_members: args.faculty_members,
        courses: args.courses,
        evaluators: args.evaluators,
        exams: args.exams,
        students: args.students,
    };
    if let Err(reason) = scenario.validate() {
        tracing::warn!(%reason, "scenario will not run as written");
    }
    scenario
        .save(&args.output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    println!("Scenario written to {}", args.output.display());
    Ok(())
}

async fn run(args: cli::RunArgs) -> Result<()> {
    let scenario = match &args.config {
        Some(path) => ScenarioConfig::load(path)
            .with_context(|| format!("failed to load scenario {}", path.display()))?,
        None => ScenarioConfig::default(),
    };
    let db = match &args.db {
        Some(path) => CredDb::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?,
        None => CredDb::open_temporary().context("failed to open temporary database")?,
    };
    let metrics = BenchMetrics::new().context("failed to register metrics")?;

    let options = DriverOptions {
        workers: args.workers,
        block_time: Duration::from_millis(args.block_time_ms),
        poll_interval: Duration::from_millis(args.poll_ms),
        modes: args.verify_mode.modes(),
        ..DriverOptions::default()
    };
    tracing::info!(
        faculties = scenario.faculties,
        courses = scenario.courses,
        students = scenario.students,
        contracts = scenario.contracts(),
        credentials = scenario.credentials(),
        workers = options.workers,
        block_time_ms = args.block_time_ms,
        "starting scenario run"
    );

    let driver = Driver::new(db, options, metrics.clone());
    let report = tokio::select! {
        result = driver.run(&scenario) => {
            result.map_err(|e| {
                let class = e.class();
                anyhow::Error::new(e).context(format!("scenario run failed [{class}]"))
            })?
        }
        _ = signal::ctrl_c() => bail!("interrupted"),
    };

    if let Some(path) = &args.metrics_out {
        let text = metrics.encode().context("failed to encode metrics")?;
        std::fs::write(path, text)
            .with_context(|| format!("failed to write metrics to {}", path.display()))?;
    }

    let json = serde_json::to_string_pretty(&report)?;
    match &args.report {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?,
        None => println!("{json}"),
    }

    tracing::info!(
        ops = report.issuance.total_ops,
        gas = report.issuance.total_gas,
        throughput = report.issuance.throughput,
        subjects = report.verified_subjects,
        failures = report.failures.len(),
        disagreements = report.disagreements.len(),
        "scenario run finished"
    );

    if report.is_clean() {
        return Ok(());
    }
    if !report.disagreements.is_empty() {
        bail!(
            "{} subjects were judged differently on-chain and off-chain",
            report.disagreements.len()
        );
    }
    bail!("{} verifications were rejected", report.failures.len())
}

/// A read-only ledger over the contract state the last `run --db` saved.
fn open_saved_ledger(path: &Path) -> Result<Arc<dyn LedgerBackend>> {
    let db = CredDb::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;
    let world: World = db
        .get_metadata_record(WORLD_KEY)
        .context("failed to decode saved contract state")?
        .with_context(|| {
            format!(
                "no saved contract state in {}; run a scenario with --db first",
                path.display()
            )
        })?;
    tracing::debug!(contracts = world.len(), "loaded saved contract state");
    Ok(Arc::new(SimulatedLedger::from_world(LedgerConfig::default(), world)))
}

fn verify_target(command: &VerifyCommand) -> &VerifyTarget {
    match command {
        VerifyCommand::Credential(args) => &args.target,
        VerifyCommand::Root(args) => &args.target,
        VerifyCommand::Issued(target) | VerifyCommand::Tree(target) => target,
    }
}

async fn verify(command: VerifyCommand) -> Result<()> {
    let target = verify_target(&command);
    let ledger = open_saved_ledger(&target.db.db)?;
    let node = VerificationContext::new(ledger).node(target.node);
    let (mode, subject) = (target.mode(), target.subject);

    let started = Instant::now();
    let (what, result) = match &command {
        VerifyCommand::Credential(args) => (
            "credential",
            node.verify_credential(mode, subject, args.digest).await,
        ),
        VerifyCommand::Issued(_) => (
            "issued credentials",
            node.verify_issued_credentials(mode, subject).await,
        ),
        VerifyCommand::Root(args) => (
            "credential root",
            node.verify_credential_root(mode, subject, args.root).await,
        ),
        VerifyCommand::Tree(_) => (
            "credential tree",
            node.verify_credential_tree(mode, subject).await,
        ),
    };
    let elapsed = started.elapsed();

    match result {
        Ok(()) => {
            println!("Valid {what} ({mode}, verified in {elapsed:?})");
            Ok(())
        }
        Err(e) => {
            println!("kind    {}", e.kind());
            if let Some(at) = e.node() {
                println!("node    {at}");
            }
            if let Some(digest) = e.digest() {
                println!("digest  {}", digest_hex(&digest));
            }
            bail!("{what} verification failed ({mode}, {elapsed:?}) [{}]: {e}", e.class())
        }
    }
}

/// Prints version information to stdout.
fn print_version() {
    use credtree_protocol::config;

    println!("credtree-bench {}", env!("CARGO_PKG_VERSION"));
    println!("chain id        {}", config::DEFAULT_CHAIN_ID);
    println!("gas limit       {}", config::DEFAULT_GAS_LIMIT);
    println!("max tree depth  {}", config::MAX_TREE_DEPTH);
}

#[cfg(test)]
mod tests {
    use super::*;
    use credtree_protocol::primitives::Address;
    use credtree_protocol::tree::VerificationMode;

    use cli::{DbArgs, VerifyCredentialArgs, VerifyRootArgs};

    fn target(db: &Path, node: Address, subject: Address, on_chain: bool) -> VerifyTarget {
        VerifyTarget {
            db: DbArgs { db: db.to_path_buf() },
            node,
            subject,
            on_chain,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn verify_reads_the_state_a_run_saved() {
        let dir = tempfile::tempdir().unwrap();
        let scenario = ScenarioConfig {
            total_accounts: 4,
            courses: 1,
            exams: 1,
            students: 1,
            ..ScenarioConfig::default()
        };

        let (faculty, course) = {
            let db = CredDb::open(dir.path()).unwrap();
            let options = DriverOptions {
                workers: 2,
                poll_interval: Duration::from_millis(1),
                modes: vec![VerificationMode::OffChain],
                ..DriverOptions::default()
            };
            let driver = Driver::new(db.clone(), options, BenchMetrics::new().unwrap());
            assert!(driver.run(&scenario).await.unwrap().is_clean());
            (db.faculties().unwrap().remove(0), db.courses().unwrap().remove(0))
        };
        let student = course.students[0];

        for on_chain in [false, true] {
            verify(VerifyCommand::Tree(target(dir.path(), faculty.address, student, on_chain)))
                .await
                .unwrap();
            verify(VerifyCommand::Issued(target(dir.path(), course.address, student, on_chain)))
                .await
                .unwrap();
        }

        let err = verify(VerifyCommand::Root(VerifyRootArgs {
            target: target(dir.path(), faculty.address, student, false),
            root: [0; 32],
        }))
        .await
        .unwrap_err();
        assert!(err.to_string().contains("credential root verification failed"));

        let err = verify(VerifyCommand::Credential(VerifyCredentialArgs {
            target: target(dir.path(), course.address, student, true),
            digest: [0; 32],
        }))
        .await
        .unwrap_err();
        assert!(err.to_string().contains("credential verification failed"));
    }

    #[tokio::test]
    async fn verify_without_a_saved_run_says_so() {
        let dir = tempfile::tempdir().unwrap();
        let any = Address::from_bytes([1; 20]);
        let err = verify(VerifyCommand::Tree(target(dir.path(), any, any, false)))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no saved contract state"));
    }
}
