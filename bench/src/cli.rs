//! # CLI Interface
//!
//! Command-line structure for `credtree-bench`, built with `clap` derive.
//! Subcommands: `accounts`, `config`, `run`, `verify` and `version`.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use credtree_protocol::primitives::{parse_digest, Address, Digest};
use credtree_protocol::tree::VerificationMode;

/// credtree issuance benchmark and verification driver.
///
/// Builds a credential tree (faculties, courses, exams, diplomas) on an
/// in-process development ledger, measures issuance, then verifies every
/// student's tree on-chain, off-chain or both.
#[derive(Parser, Debug)]
#[command(
    name = "credtree-bench",
    about = "credtree issuance benchmark and verification driver",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Log output format: `pretty` or `json`.
    #[arg(long, global = true, env = "CREDTREE_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage the account table.
    Accounts {
        #[command(subcommand)]
        command: AccountsCommand,
    },
    /// Manage scenario configuration files.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Build the scenario's credential tree and verify it.
    Run(RunArgs),
    /// Verify credentials against the contract state a `run` saved.
    Verify {
        #[command(subcommand)]
        command: VerifyCommand,
    },
    /// Print version information and exit.
    Version,
}

#[derive(Subcommand, Debug)]
pub enum AccountsCommand {
    /// Create fresh, unassigned accounts.
    Generate(AccountsGenerateArgs),
    /// Import an existing secret key as an unassigned account.
    Import(AccountsImportArgs),
    /// List accounts, optionally filtered by role.
    List(AccountsListArgs),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Write a scenario configuration file.
    Generate(ConfigGenerateArgs),
}

#[derive(Subcommand, Debug)]
pub enum VerifyCommand {
    /// Verify one credential issued to a subject.
    Credential(VerifyCredentialArgs),
    /// Verify every credential a node issued to a subject.
    Issued(VerifyTarget),
    /// Verify a subject's stored root against an expected root.
    Root(VerifyRootArgs),
    /// Verify a subject's whole credential tree under a node.
    Tree(VerifyTarget),
}

/// Location of the account database.
#[derive(Args, Debug)]
pub struct DbArgs {
    /// Path to the account database directory. Created if missing.
    #[arg(long, short = 'd', env = "CREDTREE_DB", default_value = "credtree-db")]
    pub db: PathBuf,
}

#[derive(Args, Debug)]
pub struct AccountsGenerateArgs {
    #[command(flatten)]
    pub db: DbArgs,

    /// Number of accounts to create.
    #[arg(long, short = 'n', default_value_t = 100)]
    pub count: usize,
}

#[derive(Args, Debug)]
pub struct AccountsImportArgs {
    #[command(flatten)]
    pub db: DbArgs,

    /// Hex-encoded 32-byte secret key.
    #[arg(long, env = "CREDTREE_SECRET_KEY")]
    pub secret: String,
}

#[derive(Args, Debug)]
pub struct AccountsListArgs {
    #[command(flatten)]
    pub db: DbArgs,

    /// Only list accounts with this role.
    #[arg(long)]
    pub role: Option<String>,
}

#[derive(Args, Debug)]
pub struct ConfigGenerateArgs {
    /// Output file.
    #[arg(default_value = "scenario.json")]
    pub output: PathBuf,

    /// Account selection order: `sequential` or `random`.
    #[arg(long, short = 'o', default_value = "sequential")]
    pub distribution: String,

    /// Total number of accounts.
    #[arg(long, short = 't', default_value_t = 100)]
    pub total_accounts: usize,

    /// Number of faculties in the tree.
    #[arg(long, short = 'f', default_value_t = 1)]
    pub faculties: usize,

    /// Administrators per faculty.
    #[arg(long, short = 'a', default_value_t = 1)]
    pub faculty_members: usize,

    /// Courses per faculty.
    #[arg(long, short = 'c', default_value_t = 3)]
    pub courses: usize,

    /// Evaluators per course.
    #[arg(long, short = 'e', default_value_t = 1)]
    pub evaluators: usize,

    /// Exams per student per course.
    #[arg(long, short = 'x', default_value_t = 2)]
    pub exams: usize,

    /// Students per faculty, enrolled in all of its courses.
    #[arg(long, short = 's', default_value_t = 20)]
    pub students: usize,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Scenario configuration file. Defaults are used when omitted.
    #[arg(long, short = 'c', env = "CREDTREE_SCENARIO")]
    pub config: Option<PathBuf>,

    /// Account database directory. A temporary database is used when omitted.
    #[arg(long, short = 'd', env = "CREDTREE_DB")]
    pub db: Option<PathBuf>,

    /// Which verification modes to run after issuance.
    #[arg(long, value_enum, default_value_t = VerifyModeArg::Both)]
    pub verify_mode: VerifyModeArg,

    /// Maximum number of concurrent workers.
    #[arg(long, short = 'w', env = "CREDTREE_WORKERS", default_value_t = 32)]
    pub workers: usize,

    /// Block interval of the development ledger in milliseconds. Zero mines
    /// every call as soon as it arrives.
    #[arg(long, env = "CREDTREE_BLOCK_TIME_MS", default_value_t = 0)]
    pub block_time_ms: u64,

    /// Receipt polling interval in milliseconds.
    #[arg(long, env = "CREDTREE_POLL_MS", default_value_t = 50)]
    pub poll_ms: u64,

    /// Write the Prometheus metrics of the run to this file.
    #[arg(long, env = "CREDTREE_METRICS_OUT")]
    pub metrics_out: Option<PathBuf>,

    /// Write the JSON run report to this file instead of stdout.
    #[arg(long)]
    pub report: Option<PathBuf>,
}

/// The node and subject every verification names.
#[derive(Args, Debug)]
pub struct VerifyTarget {
    #[command(flatten)]
    pub db: DbArgs,

    /// Node contract address.
    pub node: Address,

    /// Subject address.
    pub subject: Address,

    /// Let the contracts decide instead of recomputing off-chain.
    #[arg(long)]
    pub on_chain: bool,
}

impl VerifyTarget {
    pub fn mode(&self) -> VerificationMode {
        if self.on_chain {
            VerificationMode::OnChain
        } else {
            VerificationMode::OffChain
        }
    }
}

#[derive(Args, Debug)]
pub struct VerifyCredentialArgs {
    #[command(flatten)]
    pub target: VerifyTarget,

    /// Credential digest, hex.
    #[arg(value_parser = parse_digest)]
    pub digest: Digest,
}

#[derive(Args, Debug)]
pub struct VerifyRootArgs {
    #[command(flatten)]
    pub target: VerifyTarget,

    /// Expected aggregate root, hex.
    #[arg(value_parser = parse_digest)]
    pub root: Digest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VerifyModeArg {
    OnChain,
    OffChain,
    Both,
}

impl VerifyModeArg {
    pub fn modes(self) -> Vec<VerificationMode> {
        match self {
            VerifyModeArg::OnChain => vec![VerificationMode::OnChain],
            VerifyModeArg::OffChain => vec![VerificationMode::OffChain],
            VerifyModeArg::Both => vec![VerificationMode::OnChain, VerificationMode::OffChain],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_parses_verify_mode() {
        let cli = Cli::try_parse_from(["credtree-bench", "run", "--verify-mode", "off-chain"]).unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.verify_mode.modes(), vec![VerificationMode::OffChain]);
                assert!(args.db.is_none());
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn verify_credential_parses_addresses_and_digest() {
        let node = format!("0x{}", "11".repeat(20));
        let subject = format!("0x{}", "22".repeat(20));
        let digest = "ab".repeat(32);
        let cli = Cli::try_parse_from([
            "credtree-bench",
            "verify",
            "credential",
            "--db",
            "/tmp/credtree",
            &node,
            &subject,
            &digest,
            "--on-chain",
        ])
        .unwrap();
        match cli.command {
            Commands::Verify {
                command: VerifyCommand::Credential(args),
            } => {
                assert_eq!(args.target.node, Address::from_bytes([0x11; 20]));
                assert_eq!(args.target.subject, Address::from_bytes([0x22; 20]));
                assert_eq!(args.digest, [0xab; 32]);
                assert_eq!(args.target.mode(), VerificationMode::OnChain);
            }
            other => panic!("expected verify credential, got {other:?}"),
        }
    }

    #[test]
    fn verify_rejects_malformed_digest() {
        let node = format!("0x{}", "11".repeat(20));
        let err = Cli::try_parse_from([
            "credtree-bench",
            "verify",
            "root",
            &node,
            &node,
            "0x1234",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
