//! Integration tests for the account allocator and transaction lifecycle
//! against the simulated ledger: nonce safety under concurrency, exclusive
//! account claims, reverts, timeouts and outages.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use credtree_contracts::{LedgerConfig, MiningMode, SimulatedLedger};
use credtree_protocol::accounts::{AccountAllocator, AccountRole, AllocatorConfig, AllocatorError};
use credtree_protocol::error::ErrorClass;
use credtree_protocol::ledger::{ContractCall, Deployment, LedgerBackend, LedgerError};
use credtree_protocol::primitives::Address;
use credtree_protocol::storage::CredDb;
use credtree_protocol::transaction::{Transactor, TransactorConfig, TxError, UsageLog};
use credtree_protocol::tree::NodeKind;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn setup(mode: MiningMode, gas_limit: u64) -> (Arc<SimulatedLedger>, Arc<AccountAllocator>, Transactor) {
    let ledger = Arc::new(SimulatedLedger::new(LedgerConfig {
        mining_mode: mode,
        ..LedgerConfig::default()
    }));
    let backend: Arc<dyn LedgerBackend> = ledger.clone();
    let allocator = AccountAllocator::new(
        CredDb::open_temporary().unwrap(),
        Arc::clone(&backend),
        AllocatorConfig {
            gas_limit,
            ..AllocatorConfig::default()
        },
    );
    let tx = Transactor::new(
        backend,
        TransactorConfig {
            poll_interval: Duration::from_millis(10),
            confirmation_timeout: Duration::from_secs(5),
        },
    );
    (ledger, Arc::new(allocator), tx)
}

fn course(owner: Address) -> Deployment {
    Deployment {
        kind: NodeKind::Course,
        owners: vec![owner],
        quorum: 1,
    }
}

// ---------------------------------------------------------------------------
// Nonces
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions_never_collide() {
    let (ledger, allocator, tx) = setup(MiningMode::Instant, 6_721_975);
    let owner = allocator.generate(1).unwrap()[0];

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let allocator = Arc::clone(&allocator);
            let tx = tx.clone();
            tokio::spawn(async move {
                let ctx = allocator
                    .transaction_context(&owner)
                    .await
                    .map_err(|e| e.to_string())?;
                tx.deploy(&ctx, course(owner))
                    .await
                    .map_err(|e| e.to_string())
            })
        })
        .collect();

    let mut deployed = HashSet::new();
    for result in futures::future::join_all(tasks).await {
        deployed.insert(result.unwrap().unwrap());
    }

    assert_eq!(deployed.len(), 32);
    assert_eq!(ledger.contract_count(), 32);
    assert_eq!(ledger.pending_nonce(&owner).await.unwrap(), 32);
    assert_eq!(allocator.get(&owner).unwrap().nonce, 32);
}

#[tokio::test(start_paused = true)]
async fn dropped_context_leaves_a_gap_until_resync() {
    let (ledger, allocator, tx) = setup(MiningMode::Instant, 6_721_975);
    let owner = allocator.generate(1).unwrap()[0];

    let unused = allocator.transaction_context(&owner).await.unwrap();
    assert_eq!(unused.nonce, 0);
    drop(unused);

    // Nonce 1 queues behind the gap and never lands on its own.
    let ctx = allocator.transaction_context(&owner).await.unwrap();
    assert_eq!(ctx.nonce, 1);
    let stuck = tx
        .submit(&ctx, None, ContractCall::Deploy(course(owner)))
        .await
        .unwrap();
    let err = tx
        .wait_with_timeout(&stuck, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, TxError::Timeout { .. }));
    assert_eq!(ledger.contract_count(), 0);

    // Resync hands out the missing nonce; filling it releases the queue.
    assert_eq!(allocator.resync_nonce(&owner).await.unwrap(), 0);
    let ctx = allocator.transaction_context(&owner).await.unwrap();
    assert_eq!(ctx.nonce, 0);
    tx.deploy(&ctx, course(owner)).await.unwrap();
    tx.wait_for_confirmation(&stuck).await.unwrap();
    assert_eq!(ledger.contract_count(), 2);
    assert_eq!(ledger.pending_nonce(&owner).await.unwrap(), 2);
}

// ---------------------------------------------------------------------------
// Account claims
// ---------------------------------------------------------------------------

#[test]
fn concurrent_claims_are_disjoint() {
    let (_ledger, allocator, _tx) = setup(MiningMode::Instant, 6_721_975);
    allocator.generate(40).unwrap();

    let claimed: Vec<Vec<Address>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let allocator = &allocator;
                s.spawn(move || {
                    allocator
                        .select_unused(10, AccountRole::Evaluator)
                        .unwrap()
                        .into_iter()
                        .map(|a| a.address)
                        .collect()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let unique: HashSet<Address> = claimed.iter().flatten().copied().collect();
    assert_eq!(unique.len(), 40);

    let err = allocator.select_unused(1, AccountRole::Student).unwrap_err();
    assert!(matches!(
        err,
        AllocatorError::InsufficientAccounts {
            requested: 1,
            available: 0
        }
    ));
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn revert_is_reported_and_consumes_the_nonce() {
    let (ledger, allocator, tx) = setup(MiningMode::Instant, 6_721_975);
    let owner = allocator.generate(1).unwrap()[0];

    let ctx = allocator.transaction_context(&owner).await.unwrap();
    let bad = Deployment {
        kind: NodeKind::Course,
        owners: vec![owner],
        quorum: 0,
    };
    let err = tx.deploy(&ctx, bad).await.unwrap_err();
    match &err {
        TxError::Failed { reason, gas_used, .. } => {
            assert!(!reason.is_empty());
            assert!(*gas_used > 0);
        }
        other => panic!("expected a revert, got {other:?}"),
    }
    assert_eq!(ledger.contract_count(), 0);

    let ctx = allocator.transaction_context(&owner).await.unwrap();
    assert_eq!(ctx.nonce, 1);
    tx.deploy(&ctx, course(owner)).await.unwrap();
}

#[tokio::test]
async fn gas_limit_too_low_runs_out_of_gas() {
    let (_ledger, allocator, tx) = setup(MiningMode::Instant, 100_000);
    let usage = Arc::new(UsageLog::new());
    let tx = tx.with_usage_log(Arc::clone(&usage));
    let owner = allocator.generate(1).unwrap()[0];

    let ctx = allocator.transaction_context(&owner).await.unwrap();
    let err = tx.deploy(&ctx, course(owner)).await.unwrap_err();
    assert_eq!(err.revert_reason(), Some("out of gas"));

    assert_eq!(usage.len(), 1);
    assert_eq!(usage.total_gas(), 100_000);
    assert!(usage.snapshot()[0].reverted);
}

#[tokio::test(start_paused = true)]
async fn unmined_call_times_out_then_confirms() {
    let (ledger, allocator, tx) = setup(MiningMode::Manual, 6_721_975);
    let owner = allocator.generate(1).unwrap()[0];

    let ctx = allocator.transaction_context(&owner).await.unwrap();
    let pending = tx
        .submit(&ctx, None, ContractCall::Deploy(course(owner)))
        .await
        .unwrap();

    let err = tx
        .wait_with_timeout(&pending, Duration::from_secs(2))
        .await
        .unwrap_err();
    assert!(matches!(err, TxError::Timeout { .. }));
    assert_eq!(err.class(), ErrorClass::Infrastructure);

    // The nonce stays consumed while the call sits in the pool.
    assert_eq!(ledger.pending_nonce(&owner).await.unwrap(), 1);

    ledger.mine_block();
    let confirmation = tx.wait_for_confirmation(&pending).await.unwrap();
    assert!(confirmation.receipt.is_success());
    assert_eq!(
        confirmation.receipt.contract_address,
        Some(Address::for_contract(&owner, 0))
    );
}

#[tokio::test(start_paused = true)]
async fn background_miner_confirms_waiting_calls() {
    let (ledger, allocator, tx) = setup(MiningMode::Manual, 6_721_975);
    let miner = ledger.spawn_miner(Duration::from_millis(500));
    let owner = allocator.generate(1).unwrap()[0];

    for _ in 0..3 {
        let ctx = allocator.transaction_context(&owner).await.unwrap();
        tx.deploy(&ctx, course(owner)).await.unwrap();
    }
    assert_eq!(ledger.contract_count(), 3);
    miner.abort();
}

#[tokio::test]
async fn outage_fails_context_without_consuming_a_nonce() {
    let (ledger, allocator, _tx) = setup(MiningMode::Instant, 6_721_975);
    let owner = allocator.generate(1).unwrap()[0];

    ledger.set_available(false);
    let err = allocator.transaction_context(&owner).await.unwrap_err();
    assert!(matches!(err, AllocatorError::Ledger(LedgerError::Unavailable(_))));
    assert!(err.class().is_retryable());

    ledger.set_available(true);
    let ctx = allocator.transaction_context(&owner).await.unwrap();
    assert_eq!(ctx.nonce, 0);
}
