//! # Scenario Driver
//!
//! Builds the credential tree a [`ScenarioConfig`] describes on a
//! [`SimulatedLedger`], then verifies every student's diploma tree.
//!
//! ```text
//!  accounts ─► faculties ─► exams ─► diplomas ─► records ─► verification
//!              (1 task      (1 task   (1 task                (1 task per
//!               /faculty)    /course)  /student)              student)
//! ```
//!
//! Each stage fans out through the [`WorkerPool`] and waits for the previous
//! one to finish. Every issuance call is timed; the per-task latency
//! accumulators are merged into the run's [`BenchmarkResult`].
//!
//! Once issuance finishes, the course and faculty records, the scenario and
//! a snapshot of the ledger's contracts are written to the database, so the
//! `verify` subcommands can check the same state after the process exits.
//!
//! A failed issuance call aborts the run. A rejected verification does not:
//! it is reported as a failure, and a subject on which the two modes reach
//! different decisions is reported as a disagreement. Only an infrastructure
//! error during verification aborts.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::time::Instant;

use credtree_contracts::{LedgerConfig, MiningMode, SimulatedLedger};
use credtree_protocol::accounts::{
    Account, AccountAllocator, AccountRole, AllocatorConfig, AllocatorError, SelectionOrder,
};
use credtree_protocol::error::ErrorClass;
use credtree_protocol::ledger::{Deployment, LedgerBackend, LedgerError};
use credtree_protocol::primitives::{digest_hex, Address, Digest};
use credtree_protocol::schemes::{document_digest, DiplomaCredential, ExamCredential, SchemeError};
use credtree_protocol::storage::{CourseRecord, CredDb, DbError, FacultyRecord};
use credtree_protocol::transaction::{
    Transactor, TransactorConfig, TxContext, TxError, UsageLog,
};
use credtree_protocol::tree::{
    CourseHandle, CredentialIssuer, FacultyHandle, NodeHandle, NodeKind, TreeVerifier,
    VerificationContext, VerificationMode, VerifyError,
};
use credtree_protocol::workers::{PoolError, WorkerPool};

use crate::metrics::{BenchMetrics, BenchmarkResult, LatencyStats};
use crate::scenario::ScenarioConfig;

/// Metadata key of the scenario a run used, as JSON.
pub const SCENARIO_KEY: &str = "scenario";

/// Metadata key of the contract state a run left behind, as a bincode
/// [`World`](credtree_contracts::World).
pub const WORLD_KEY: &str = "world";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("invalid scenario: {0}")]
    InvalidScenario(String),

    #[error(transparent)]
    Allocator(#[from] AllocatorError),

    #[error(transparent)]
    Tx(#[from] TxError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Scheme(#[from] SchemeError),

    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("verification aborted: {0}")]
    Verify(#[from] VerifyError),

    #[error("worker failed: {0}")]
    Worker(String),
}

impl DriverError {
    pub fn class(&self) -> ErrorClass {
        match self {
            DriverError::InvalidScenario(_) => ErrorClass::PolicyViolation,
            DriverError::Allocator(e) => e.class(),
            DriverError::Tx(e) => e.class(),
            DriverError::Ledger(e) => e.class(),
            DriverError::Db(e) => e.class(),
            DriverError::Verify(e) => e.class(),
            DriverError::Scheme(_) | DriverError::Encoding(_) | DriverError::Worker(_) => {
                ErrorClass::Infrastructure
            }
        }
    }
}

impl From<PoolError<DriverError>> for DriverError {
    fn from(e: PoolError<DriverError>) -> Self {
        match e {
            PoolError::Task { source, .. } => source,
            PoolError::Join(reason) => DriverError::Worker(reason),
        }
    }
}

pub type DriverResult<T> = Result<T, DriverError>;

// ---------------------------------------------------------------------------
// Options and report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub workers: usize,
    /// Zero mines every call on arrival.
    pub block_time: Duration,
    pub poll_interval: Duration,
    pub confirmation_timeout: Duration,
    pub modes: Vec<VerificationMode>,
}

impl Default for DriverOptions {
    fn default() -> Self {
        let tx = TransactorConfig::default();
        Self {
            workers: credtree_protocol::config::DEFAULT_WORKER_LIMIT,
            block_time: Duration::ZERO,
            poll_interval: tx.poll_interval,
            confirmation_timeout: tx.confirmation_timeout,
            modes: vec![VerificationMode::OnChain, VerificationMode::OffChain],
        }
    }
}

/// One rejected verification.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationFailure {
    pub mode: String,
    pub faculty: Address,
    pub subject: Address,
    pub kind: &'static str,
    /// Node the rejection was raised at, when known.
    pub node: Option<Address>,
    pub digest: Option<String>,
    pub reason: String,
}

/// A subject accepted by one mode and rejected by the other.
#[derive(Debug, Clone, Serialize)]
pub struct Disagreement {
    pub faculty: Address,
    pub subject: Address,
    pub accepted_by: String,
    pub rejected_by: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub scenario: ScenarioConfig,
    pub issuance: BenchmarkResult,
    pub contracts: usize,
    pub blocks: u64,
    pub verified_subjects: usize,
    pub verification_modes: Vec<String>,
    pub failures: Vec<VerificationFailure>,
    pub disagreements: Vec<Disagreement>,
    pub gas_by_method: BTreeMap<String, u64>,
}

impl RunReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.disagreements.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tree shapes
// ---------------------------------------------------------------------------

/// Accounts claimed for one faculty before anything is deployed.
#[derive(Debug, Clone)]
struct FacultyPlan {
    admins: Vec<Address>,
    students: Vec<Address>,
    evaluators: Vec<Vec<Address>>,
}

#[derive(Debug, Clone)]
struct CourseTree {
    node: NodeHandle,
    evaluators: Vec<Address>,
    students: Vec<Address>,
}

#[derive(Debug, Clone)]
struct FacultyTree {
    node: NodeHandle,
    admins: Vec<Address>,
    students: Vec<Address>,
    courses: Vec<CourseTree>,
}

impl FacultyTree {
    fn course_addresses(&self) -> Vec<Address> {
        self.courses.iter().map(|c| c.node.address()).collect()
    }
}

// ---------------------------------------------------------------------------
// Issuer
// ---------------------------------------------------------------------------

/// Everything a worker task needs to issue calls. Cheap to clone.
#[derive(Clone)]
struct Issuer {
    allocator: Arc<AccountAllocator>,
    tx: Transactor,
    nodes: VerificationContext,
}

async fn timed<T, F>(stats: &mut LatencyStats, op: F) -> DriverResult<T>
where
    F: Future<Output = Result<T, TxError>>,
{
    let started = Instant::now();
    let out = op.await?;
    stats.add_duration(started.elapsed());
    Ok(out)
}

impl Issuer {
    async fn context(&self, who: &Address) -> DriverResult<TxContext> {
        Ok(self.allocator.transaction_context(who).await?)
    }

    async fn deploy(
        &self,
        stats: &mut LatencyStats,
        kind: NodeKind,
        owners: &[Address],
    ) -> DriverResult<NodeHandle> {
        let deployer = owners
            .first()
            .ok_or_else(|| DriverError::InvalidScenario(format!("{kind:?} without owners")))?;
        let ctx = self.context(deployer).await?;
        let deployment = Deployment {
            kind,
            owners: owners.to_vec(),
            quorum: owners.len(),
        };
        let address = timed(stats, self.tx.deploy(&ctx, deployment)).await?;
        for owner in owners {
            self.allocator.assign_contract(owner, address)?;
        }
        tracing::debug!(contract = %address, ?kind, owners = owners.len(), "node deployed");
        Ok(self.nodes.node(address))
    }

    /// Deploys a faculty and its courses, enrolls the faculty's students in
    /// every course and registers the courses as the faculty's children.
    async fn build_faculty(&self, plan: FacultyPlan) -> DriverResult<(FacultyTree, LatencyStats)> {
        let mut stats = LatencyStats::new();
        let faculty = self.deploy(&mut stats, NodeKind::Faculty, &plan.admins).await?;
        let faculty_handle = FacultyHandle::new(faculty.clone());

        let mut courses = Vec::with_capacity(plan.evaluators.len());
        for evaluators in plan.evaluators {
            let node = self.deploy(&mut stats, NodeKind::Course, &evaluators).await?;
            let course = CourseHandle::new(node.clone());
            for student in &plan.students {
                let ctx = self.context(&evaluators[0]).await?;
                timed(&mut stats, course.add_student(&self.tx, &ctx, *student)).await?;
            }

            let ctx = self.context(&plan.admins[0]).await?;
            timed(&mut stats, faculty_handle.add_child(&self.tx, &ctx, node.address())).await?;

            courses.push(CourseTree {
                node,
                evaluators,
                students: plan.students.clone(),
            });
        }

        tracing::info!(
            faculty = %faculty.address(),
            courses = courses.len(),
            students = plan.students.len(),
            "faculty deployed"
        );
        let tree = FacultyTree {
            node: faculty,
            admins: plan.admins,
            students: plan.students,
            courses,
        };
        Ok((tree, stats))
    }

    /// Every evaluator signs, then the subject approves.
    async fn issue(
        &self,
        stats: &mut LatencyStats,
        node: &NodeHandle,
        signers: &[Address],
        subject: Address,
        digest: Digest,
        witnesses: &[Address],
    ) -> DriverResult<()> {
        for signer in signers {
            let ctx = self.context(signer).await?;
            timed(
                stats,
                node.register_credential(&self.tx, &ctx, subject, digest, witnesses.to_vec()),
            )
            .await?;
        }
        let ctx = self.context(&subject).await?;
        timed(stats, node.approve_credential(&self.tx, &ctx, digest)).await?;
        Ok(())
    }

    async fn aggregate(
        &self,
        stats: &mut LatencyStats,
        node: &NodeHandle,
        owner: &Address,
        subject: Address,
    ) -> DriverResult<()> {
        let ctx = self.context(owner).await?;
        timed(stats, node.aggregate_credentials(&self.tx, &ctx, subject)).await?;
        Ok(())
    }

    /// Issues `exams` exams to every student of the course and aggregates
    /// each student's root.
    async fn issue_exams(
        &self,
        course: CourseTree,
        exams: usize,
    ) -> DriverResult<(CourseRecord, LatencyStats)> {
        let mut stats = LatencyStats::new();
        let address = course.node.address();
        let names: Vec<String> = (1..=exams).map(|i| format!("exam-{i}")).collect();

        for (s, student) in course.students.iter().enumerate() {
            for (e, name) in names.iter().enumerate() {
                let digest = document_digest(&ExamCredential {
                    course: address,
                    subject: *student,
                    exam: name.clone(),
                    grade: (5 + (s + e) % 6) as u8,
                    issued_at: Utc::now(),
                })?;
                self.issue(&mut stats, &course.node, &course.evaluators, *student, digest, &[])
                    .await?;
            }
            self.aggregate(&mut stats, &course.node, &course.evaluators[0], *student)
                .await?;
        }

        tracing::info!(course = %address, students = course.students.len(), exams, "exams issued");
        let record = CourseRecord {
            address,
            faculty: None,
            quorum: course.evaluators.len(),
            evaluators: course.evaluators,
            students: course.students,
            exams: names,
        };
        Ok((record, stats))
    }

    /// Issues one diploma witnessed by every course of the faculty.
    async fn issue_diploma(
        &self,
        faculty: FacultyTree,
        index: usize,
        subject: Address,
    ) -> DriverResult<LatencyStats> {
        let mut stats = LatencyStats::new();
        let courses = faculty.course_addresses();
        let digest = document_digest(&DiplomaCredential {
            faculty: faculty.node.address(),
            subject,
            degree: format!("Degree {index}"),
            courses: courses.clone(),
            issued_at: Utc::now(),
        })?;
        self.issue(&mut stats, &faculty.node, &faculty.admins, subject, digest, &courses)
            .await?;
        self.aggregate(&mut stats, &faculty.node, &faculty.admins[0], subject)
            .await?;
        Ok(stats)
    }
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

struct Verdict {
    faculty: Address,
    subject: Address,
    outcomes: Vec<(VerificationMode, Result<(), VerifyError>)>,
}

async fn verify_subject(
    faculty: NodeHandle,
    subject: Address,
    modes: Vec<VerificationMode>,
    metrics: BenchMetrics,
) -> DriverResult<Verdict> {
    let mut outcomes = Vec::with_capacity(modes.len());
    for mode in modes {
        let started = Instant::now();
        let result = faculty.verify_all(mode, subject).await;
        metrics.observe_verification(mode, result.is_ok(), started.elapsed());

        if let Err(e) = &result {
            if e.class().is_retryable() {
                return Err(DriverError::Verify(e.clone()));
            }
            tracing::warn!(
                %mode,
                faculty = %faculty.address(),
                subject = %subject,
                error = %e,
                "verification rejected"
            );
        }
        outcomes.push((mode, result));
    }
    Ok(Verdict {
        faculty: faculty.address(),
        subject,
        outcomes,
    })
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

pub struct Driver {
    ledger: Arc<SimulatedLedger>,
    issuer: Issuer,
    usage: Arc<UsageLog>,
    metrics: BenchMetrics,
    pool: WorkerPool,
    options: DriverOptions,
}

impl Driver {
    pub fn new(db: CredDb, options: DriverOptions, metrics: BenchMetrics) -> Self {
        let mining_mode = if options.block_time.is_zero() {
            MiningMode::Instant
        } else {
            MiningMode::Manual
        };
        let ledger = Arc::new(SimulatedLedger::new(LedgerConfig {
            mining_mode,
            ..LedgerConfig::default()
        }));
        let backend: Arc<dyn LedgerBackend> = ledger.clone();

        let allocator = Arc::new(AccountAllocator::new(
            db,
            Arc::clone(&backend),
            AllocatorConfig::default(),
        ));
        let usage = Arc::new(UsageLog::new());
        let tx = Transactor::new(
            Arc::clone(&backend),
            TransactorConfig {
                poll_interval: options.poll_interval,
                confirmation_timeout: options.confirmation_timeout,
            },
        )
        .with_metrics(metrics.tx.clone())
        .with_usage_log(Arc::clone(&usage));

        Self {
            ledger,
            issuer: Issuer {
                allocator,
                tx,
                nodes: VerificationContext::new(backend),
            },
            usage,
            metrics,
            pool: WorkerPool::new(options.workers),
            options,
        }
    }

    /// Builds and verifies the scenario's tree.
    pub async fn run(&self, scenario: &ScenarioConfig) -> DriverResult<RunReport> {
        scenario.validate().map_err(DriverError::InvalidScenario)?;

        let miner = (!self.options.block_time.is_zero())
            .then(|| self.ledger.spawn_miner(self.options.block_time));
        let result = self.execute(scenario).await;
        if let Some(miner) = miner {
            miner.abort();
        }
        result
    }

    async fn execute(&self, scenario: &ScenarioConfig) -> DriverResult<RunReport> {
        let plans = self.prepare_accounts(scenario)?;

        let started = Instant::now();
        let mut stats = LatencyStats::new();

        let faculties = self
            .pool
            .run(plans.into_iter().map(|plan| {
                let issuer = self.issuer.clone();
                async move { issuer.build_faculty(plan).await }
            }))
            .await?;
        let faculties: Vec<FacultyTree> = faculties
            .into_iter()
            .map(|(tree, s)| {
                stats.merge(&s);
                tree
            })
            .collect();

        let courses = faculties
            .iter()
            .flat_map(|f| f.courses.iter().cloned().map(move |c| (f.node.address(), c)));
        let issued = self
            .pool
            .run(courses.map(|(faculty, course)| {
                let issuer = self.issuer.clone();
                let exams = scenario.exams;
                async move {
                    let (mut record, s) = issuer.issue_exams(course, exams).await?;
                    record.faculty = Some(faculty);
                    Ok::<_, DriverError>((record, s))
                }
            }))
            .await?;
        let mut course_records = Vec::with_capacity(issued.len());
        for (record, s) in issued {
            stats.merge(&s);
            course_records.push(record);
        }

        let diplomas = faculties.iter().enumerate().flat_map(|(index, f)| {
            f.students.iter().map(move |s| (index, f.clone(), *s))
        });
        let diploma_stats = self
            .pool
            .run(diplomas.map(|(index, faculty, subject)| {
                let issuer = self.issuer.clone();
                async move { issuer.issue_diploma(faculty, index, subject).await }
            }))
            .await?;
        diploma_stats.iter().for_each(|s| stats.merge(s));

        let issuance = BenchmarkResult::new(&stats, self.usage.total_gas(), started.elapsed());
        tracing::info!(
            ops = issuance.total_ops,
            gas = issuance.total_gas,
            throughput = issuance.throughput,
            "issuance finished"
        );

        self.persist(scenario, &faculties, &course_records)?;

        let verdicts = self.verify(&faculties).await?;
        let (failures, disagreements) = self.summarize(&verdicts);

        let gas_by_method = self
            .usage
            .gas_by_method()
            .into_iter()
            .map(|(method, gas)| (method.to_string(), gas))
            .collect();

        Ok(RunReport {
            scenario: scenario.clone(),
            issuance,
            contracts: self.ledger.contract_count(),
            blocks: self.ledger.block_number().await?,
            verified_subjects: verdicts.len(),
            verification_modes: self.options.modes.iter().map(|m| m.to_string()).collect(),
            failures,
            disagreements,
            gas_by_method,
        })
    }

    /// Tops the table up to `total_accounts` unassigned accounts, then claims
    /// every role the tree needs.
    fn prepare_accounts(&self, scenario: &ScenarioConfig) -> DriverResult<Vec<FacultyPlan>> {
        let allocator = &self.issuer.allocator;
        let unused = allocator.db().accounts_filtered(Account::is_unassigned)?.len();
        if unused < scenario.total_accounts {
            allocator.generate(scenario.total_accounts - unused)?;
        }

        let order = scenario.account_distribution;
        let claim = |n: usize, role: AccountRole| -> DriverResult<Vec<Address>> {
            Ok(allocator
                .select_unused_with(n, role, order)?
                .into_iter()
                .map(|a| a.address)
                .collect())
        };

        (0..scenario.faculties)
            .map(|_| -> DriverResult<FacultyPlan> {
                Ok(FacultyPlan {
                    admins: claim(scenario.faculty_members, AccountRole::Administrator)?,
                    students: claim(scenario.students, AccountRole::Student)?,
                    evaluators: (0..scenario.courses)
                        .map(|_| claim(scenario.evaluators, AccountRole::Evaluator))
                        .collect::<DriverResult<_>>()?,
                })
            })
            .collect()
    }

    fn persist(
        &self,
        scenario: &ScenarioConfig,
        faculties: &[FacultyTree],
        courses: &[CourseRecord],
    ) -> DriverResult<()> {
        let db = self.issuer.allocator.db();
        for course in courses {
            db.put_course(course)?;
        }
        for faculty in faculties {
            db.put_faculty(&FacultyRecord {
                address: faculty.node.address(),
                administrators: faculty.admins.clone(),
                quorum: faculty.admins.len(),
                courses: faculty.course_addresses(),
            })?;
        }
        db.put_metadata(SCENARIO_KEY, &serde_json::to_vec(scenario)?)?;
        db.put_metadata_record(WORLD_KEY, &self.ledger.snapshot())?;
        db.flush()?;
        Ok(())
    }

    async fn verify(&self, faculties: &[FacultyTree]) -> DriverResult<Vec<Verdict>> {
        let subjects = faculties
            .iter()
            .flat_map(|f| f.students.iter().map(move |s| (f.node.clone(), *s)));
        let verdicts = self
            .pool
            .run(subjects.map(|(faculty, subject)| {
                verify_subject(faculty, subject, self.options.modes.clone(), self.metrics.clone())
            }))
            .await?;
        tracing::info!(subjects = verdicts.len(), "verification finished");
        Ok(verdicts)
    }

    fn summarize(&self, verdicts: &[Verdict]) -> (Vec<VerificationFailure>, Vec<Disagreement>) {
        let mut failures = Vec::new();
        let mut disagreements = Vec::new();

        for verdict in verdicts {
            for (mode, result) in &verdict.outcomes {
                if let Err(e) = result {
                    failures.push(VerificationFailure {
                        mode: mode.to_string(),
                        faculty: verdict.faculty,
                        subject: verdict.subject,
                        kind: e.kind(),
                        node: e.node(),
                        digest: e.digest().as_ref().map(digest_hex),
                        reason: e.to_string(),
                    });
                }
            }

            let accepted = verdict.outcomes.iter().find(|(_, r)| r.is_ok());
            let rejected = verdict.outcomes.iter().find(|(_, r)| r.is_err());
            if let (Some((yes, _)), Some((no, _))) = (accepted, rejected) {
                self.metrics.mode_disagreements_total.inc();
                tracing::error!(
                    faculty = %verdict.faculty,
                    subject = %verdict.subject,
                    accepted_by = %yes,
                    rejected_by = %no,
                    "verification modes disagree"
                );
                disagreements.push(Disagreement {
                    faculty: verdict.faculty,
                    subject: verdict.subject,
                    accepted_by: yes.to_string(),
                    rejected_by: no.to_string(),
                });
            }
        }
        (failures, disagreements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use credtree_contracts::World;

    // -- Helpers --

    fn driver(modes: Vec<VerificationMode>) -> Driver {
        let options = DriverOptions {
            workers: 4,
            poll_interval: Duration::from_millis(1),
            confirmation_timeout: Duration::from_secs(5),
            modes,
            ..DriverOptions::default()
        };
        Driver::new(
            CredDb::open_temporary().unwrap(),
            options,
            BenchMetrics::new().unwrap(),
        )
    }

    fn small() -> ScenarioConfig {
        ScenarioConfig {
            total_accounts: 12,
            account_distribution: SelectionOrder::Random,
            faculties: 2,
            faculty_members: 2,
            courses: 2,
            evaluators: 1,
            exams: 2,
            students: 2,
        }
    }

    // -- Tests --

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn small_scenario_issues_and_verifies() {
        let d = driver(vec![VerificationMode::OnChain, VerificationMode::OffChain]);
        let scenario = small();
        let report = d.run(&scenario).await.unwrap();

        assert!(report.is_clean(), "{:?}", report.failures);
        assert_eq!(report.contracts, scenario.contracts());
        assert_eq!(report.verified_subjects, 4);
        assert_eq!(report.verification_modes, vec!["on-chain", "off-chain"]);
        assert!(report.gas_by_method.contains_key("registerCredential"));

        let deploys = 1 + 2;
        let enrollments = 2 * 2;
        let children = 2;
        let exams = 2 * 2 * 2 * (1 + 1);
        let course_roots = 2 * 2;
        let diplomas = 2 * (2 + 1);
        let diploma_roots = 2;
        let per_faculty =
            deploys + enrollments + children + exams + course_roots + diplomas + diploma_roots;
        assert_eq!(report.issuance.total_ops, 2 * per_faculty);
        assert_eq!(report.issuance.total_gas, d.ledger.total_gas_used());

        let db = d.issuer.allocator.db();
        assert_eq!(db.courses().unwrap().len(), 4);
        let faculties = db.faculties().unwrap();
        assert_eq!(faculties.len(), 2);
        assert!(faculties.iter().all(|f| f.quorum == 2 && f.courses.len() == 2));
        assert!(db.get_metadata(SCENARIO_KEY).unwrap().is_some());
        let world: World = db.get_metadata_record(WORLD_KEY).unwrap().unwrap();
        assert_eq!(world.len(), scenario.contracts());
    }

    #[tokio::test]
    async fn single_mode_runs_only_that_mode() {
        let d = driver(vec![VerificationMode::OffChain]);
        let scenario = ScenarioConfig {
            faculties: 1,
            ..small()
        };
        let report = d.run(&scenario).await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.verification_modes, vec!["off-chain"]);

        let text = d.metrics.encode().unwrap();
        assert!(text.contains("mode=\"off-chain\",outcome=\"accepted\"} 2"));
        assert!(!text.contains("mode=\"on-chain\""));
    }

    #[tokio::test]
    async fn invalid_scenario_is_rejected_before_any_call() {
        let d = driver(vec![VerificationMode::OffChain]);
        let scenario = ScenarioConfig {
            total_accounts: 1,
            ..small()
        };
        let err = d.run(&scenario).await.unwrap_err();
        assert!(matches!(err, DriverError::InvalidScenario(_)));
        assert_eq!(err.class(), ErrorClass::PolicyViolation);
        assert_eq!(d.issuer.allocator.db().account_count(), 0);
    }

    #[tokio::test]
    async fn block_time_mines_in_the_background() {
        let options = DriverOptions {
            workers: 2,
            block_time: Duration::from_millis(2),
            poll_interval: Duration::from_millis(1),
            confirmation_timeout: Duration::from_secs(5),
            modes: vec![VerificationMode::OffChain],
        };
        let d = Driver::new(
            CredDb::open_temporary().unwrap(),
            options,
            BenchMetrics::new().unwrap(),
        );
        let scenario = ScenarioConfig {
            faculties: 1,
            courses: 1,
            students: 1,
            exams: 1,
            ..small()
        };
        let report = d.run(&scenario).await.unwrap();
        assert!(report.is_clean());
        assert!(report.blocks > 1);
        assert_eq!(d.ledger.pending_count(), 0);
    }
}
