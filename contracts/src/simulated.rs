//! # Simulated Ledger
//!
//! An in-process [`LedgerBackend`] over a [`World`]. It behaves like the RPC
//! endpoint of a single-node development chain:
//!
//! - calls are signature-checked and chain-id-checked; a nonce below the
//!   sender's mined nonce, or one already waiting in the pool, is refused;
//! - accepted calls wait in a pending pool until a block is mined, either
//!   immediately ([`MiningMode::Instant`]) or on demand
//!   ([`MiningMode::Manual`], via [`SimulatedLedger::mine_block`] or a
//!   background miner);
//! - a block takes each sender's calls in nonce order and stops at the
//!   first gap, so a call submitted ahead of its predecessor waits for it;
//! - mined calls get a receipt; reverted ones still pay gas and still
//!   consume their nonce;
//! - [`SimulatedLedger::set_available`] takes the endpoint down for fault
//!   injection.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use credtree_protocol::config::{DEFAULT_CHAIN_ID, DEFAULT_FEE_PRICE, MAX_TREE_DEPTH};
use credtree_protocol::ledger::{
    ContractQuery, LedgerBackend, LedgerError, LogEvent, LogFilter, QueryOutput, Receipt,
    SignedCall, TxStatus,
};
use credtree_protocol::primitives::{Address, TxHash};
use credtree_protocol::tree::Stamp;

use crate::error::ContractError;
use crate::world::{gas_cost, World, GAS_BASE, GAS_REVERT};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiningMode {
    /// Every accepted call is mined in its own block before `send_call`
    /// returns.
    Instant,
    /// Calls wait in the pool until `mine_block` runs.
    Manual,
}

#[derive(Debug, Clone, Copy)]
pub struct LedgerConfig {
    pub chain_id: u64,
    pub fee_price: u64,
    pub mining_mode: MiningMode,
    /// Inner nodes one tree verification may nest through.
    pub max_tree_depth: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID,
            fee_price: DEFAULT_FEE_PRICE,
            mining_mode: MiningMode::Instant,
            max_tree_depth: MAX_TREE_DEPTH,
        }
    }
}

// ---------------------------------------------------------------------------
// SimulatedLedger
// ---------------------------------------------------------------------------

struct Chain {
    world: World,
    block_number: u64,
    /// Next nonce per sender, counting mined calls only.
    nonces: HashMap<Address, u64>,
    pool: Vec<SignedCall>,
    receipts: HashMap<TxHash, Receipt>,
    logs: Vec<LogEvent>,
    gas_used: u64,
}

impl Chain {
    fn mined_nonce(&self, address: &Address) -> u64 {
        self.nonces.get(address).copied().unwrap_or(0)
    }

    fn is_pooled(&self, address: &Address, nonce: u64) -> bool {
        self.pool
            .iter()
            .any(|c| c.request.from == *address && c.request.nonce == nonce)
    }

    /// Mined nonce plus the contiguous run of pooled calls after it.
    fn pending_nonce(&self, address: &Address) -> u64 {
        let mut next = self.mined_nonce(address);
        while self.is_pooled(address, next) {
            next += 1;
        }
        next
    }

    /// Index of the earliest pooled call whose nonce is its sender's next.
    fn next_ready(&self) -> Option<usize> {
        self.pool
            .iter()
            .position(|c| c.request.nonce == self.mined_nonce(&c.request.from))
    }

    fn apply(&mut self, call: SignedCall, stamp: Stamp) {
        let request = &call.request;
        let tx_hash = call.hash();
        let cost = gas_cost(&request.call);

        let (status, gas_used, contract_address, events) = if cost > request.gas_limit {
            (
                TxStatus::Reverted(ContractError::OutOfGas.to_string()),
                request.gas_limit,
                None,
                Vec::new(),
            )
        } else {
            match self.world.execute(
                request.from,
                request.to,
                request.nonce,
                &request.call,
                stamp,
            ) {
                Ok(exec) => (TxStatus::Success, cost, exec.contract_address, exec.events),
                Err(e) => {
                    tracing::debug!(
                        tx = %tx_hash,
                        method = request.call.method(),
                        reason = %e,
                        "call reverted"
                    );
                    (
                        TxStatus::Reverted(e.to_string()),
                        GAS_BASE + GAS_REVERT,
                        None,
                        Vec::new(),
                    )
                }
            }
        };

        self.nonces.insert(request.from, request.nonce + 1);
        self.gas_used += gas_used;

        let logs: Vec<LogEvent> = events
            .into_iter()
            .map(|(address, event)| LogEvent {
                address,
                block_number: stamp.block,
                tx_hash,
                event,
            })
            .collect();
        self.logs.extend(logs.iter().cloned());

        self.receipts.insert(
            tx_hash,
            Receipt {
                tx_hash,
                status,
                block_number: stamp.block,
                gas_used,
                fee_price: request.fee_price,
                contract_address,
                logs,
            },
        );
    }
}

pub struct SimulatedLedger {
    config: LedgerConfig,
    chain: Mutex<Chain>,
    available: AtomicBool,
}

impl SimulatedLedger {
    pub fn new(config: LedgerConfig) -> Self {
        Self::from_world(config, World::new(config.max_tree_depth))
    }

    /// A ledger whose contracts start out as `world`, at block zero with no
    /// receipts, logs or nonce history. Meant for reading a saved state back;
    /// the world takes the config's tree depth.
    pub fn from_world(config: LedgerConfig, world: World) -> Self {
        Self {
            config,
            chain: Mutex::new(Chain {
                world: world.with_max_depth(config.max_tree_depth),
                block_number: 0,
                nonces: HashMap::new(),
                pool: Vec::new(),
                receipts: HashMap::new(),
                logs: Vec::new(),
                gas_used: 0,
            }),
            available: AtomicBool::new(true),
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Takes the endpoint down (`false`) or brings it back. While down,
    /// every RPC fails with `Unavailable`; mining continues.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<(), LedgerError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(LedgerError::Unavailable("simulated outage".into()))
        }
    }

    /// Mines every executable pooled call into one new block. Calls behind
    /// a nonce gap stay pooled. Returns the new block number.
    pub fn mine_block(&self) -> u64 {
        let mut chain = self.chain.lock();
        chain.block_number += 1;
        let stamp = Stamp::new(chain.block_number, Utc::now());
        let mut count = 0usize;
        while let Some(index) = chain.next_ready() {
            let call = chain.pool.remove(index);
            chain.apply(call, stamp);
            count += 1;
        }
        tracing::trace!(
            block = stamp.block,
            calls = count,
            queued = chain.pool.len(),
            "block mined"
        );
        stamp.block
    }

    /// Mines a block every `interval` while there is anything to mine.
    pub fn spawn_miner(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let ledger = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if ledger.pending_count() > 0 {
                    ledger.mine_block();
                }
            }
        })
    }

    pub fn pending_count(&self) -> usize {
        self.chain.lock().pool.len()
    }

    /// Gas burned by every mined call so far.
    pub fn total_gas_used(&self) -> u64 {
        self.chain.lock().gas_used
    }

    pub fn contract_count(&self) -> usize {
        self.chain.lock().world.len()
    }

    /// A copy of every contract's current state.
    pub fn snapshot(&self) -> World {
        self.chain.lock().world.clone()
    }
}

impl Default for SimulatedLedger {
    fn default() -> Self {
        Self::new(LedgerConfig::default())
    }
}

#[async_trait]
impl LedgerBackend for SimulatedLedger {
    async fn chain_id(&self) -> Result<u64, LedgerError> {
        self.ensure_available()?;
        Ok(self.config.chain_id)
    }

    async fn block_number(&self) -> Result<u64, LedgerError> {
        self.ensure_available()?;
        Ok(self.chain.lock().block_number)
    }

    async fn suggest_fee_price(&self) -> Result<u64, LedgerError> {
        self.ensure_available()?;
        Ok(self.config.fee_price)
    }

    async fn pending_nonce(&self, address: &Address) -> Result<u64, LedgerError> {
        self.ensure_available()?;
        Ok(self.chain.lock().pending_nonce(address))
    }

    async fn send_call(&self, call: SignedCall) -> Result<TxHash, LedgerError> {
        self.ensure_available()?;
        call.verify()?;

        let request = &call.request;
        if request.chain_id != self.config.chain_id {
            return Err(LedgerError::Rejected(format!(
                "invalid chain id {}, expected {}",
                request.chain_id, self.config.chain_id
            )));
        }

        let tx_hash = call.hash();
        {
            let mut chain = self.chain.lock();
            if chain.receipts.contains_key(&tx_hash) || chain.pool.iter().any(|c| c.hash() == tx_hash) {
                return Err(LedgerError::Rejected(format!("already known: {tx_hash}")));
            }
            let mined = chain.mined_nonce(&request.from);
            if request.nonce < mined {
                return Err(LedgerError::Rejected(format!(
                    "nonce too low for {}: next is {mined}, got {}",
                    request.from, request.nonce
                )));
            }
            if chain.is_pooled(&request.from, request.nonce) {
                return Err(LedgerError::Rejected(format!(
                    "nonce {} already pending for {}",
                    request.nonce, request.from
                )));
            }
            chain.pool.push(call);
        }

        if self.config.mining_mode == MiningMode::Instant {
            self.mine_block();
        }
        Ok(tx_hash)
    }

    async fn receipt(&self, tx_hash: &TxHash) -> Result<Option<Receipt>, LedgerError> {
        self.ensure_available()?;
        Ok(self.chain.lock().receipts.get(tx_hash).cloned())
    }

    async fn filter_logs(&self, filter: &LogFilter) -> Result<Vec<LogEvent>, LedgerError> {
        self.ensure_available()?;
        Ok(self
            .chain
            .lock()
            .logs
            .iter()
            .filter(|log| filter.matches(log))
            .cloned()
            .collect())
    }

    async fn query(&self, contract: &Address, query: ContractQuery) -> Result<QueryOutput, LedgerError> {
        self.ensure_available()?;
        self.chain
            .lock()
            .world
            .query(contract, &query)
            .map_err(|e| match e {
                ContractError::UnknownContract(address) => LedgerError::NoContract(address),
                other => LedgerError::Reverted(other.to_string()),
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use credtree_protocol::config::DEFAULT_GAS_LIMIT;
    use credtree_protocol::crypto::AccountKey;
    use credtree_protocol::ledger::{CallRequest, ContractCall, ContractEvent, Deployment};
    use credtree_protocol::tree::NodeKind;

    // -- Helpers --------------------------------------------------------------

    fn deploy_call(key: &AccountKey, nonce: u64, gas_limit: u64) -> SignedCall {
        let request = CallRequest {
            from: key.address(),
            to: None,
            nonce,
            fee_price: 1,
            gas_limit,
            chain_id: DEFAULT_CHAIN_ID,
            call: ContractCall::Deploy(Deployment {
                kind: NodeKind::Course,
                owners: vec![key.address()],
                quorum: 1,
            }),
        };
        SignedCall::sign(request, key).unwrap()
    }

    fn manual() -> SimulatedLedger {
        SimulatedLedger::new(LedgerConfig {
            mining_mode: MiningMode::Manual,
            ..LedgerConfig::default()
        })
    }

    // -- Tests ----------------------------------------------------------------

    #[tokio::test]
    async fn instant_mining_produces_receipt() {
        let ledger = SimulatedLedger::default();
        let key = AccountKey::generate();
        let hash = ledger.send_call(deploy_call(&key, 0, DEFAULT_GAS_LIMIT)).await.unwrap();

        let receipt = ledger.receipt(&hash).await.unwrap().expect("mined");
        assert!(receipt.is_success());
        assert_eq!(
            receipt.contract_address,
            Some(Address::for_contract(&key.address(), 0))
        );
        assert!(matches!(
            receipt.logs[0].event,
            ContractEvent::NodeDeployed { .. }
        ));
        assert_eq!(ledger.block_number().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn manual_mining_keeps_calls_pending() {
        let ledger = manual();
        let key = AccountKey::generate();
        let hash = ledger.send_call(deploy_call(&key, 0, DEFAULT_GAS_LIMIT)).await.unwrap();

        assert_eq!(ledger.receipt(&hash).await.unwrap(), None);
        assert_eq!(ledger.pending_nonce(&key.address()).await.unwrap(), 1);

        ledger.mine_block();
        assert!(ledger.receipt(&hash).await.unwrap().is_some());
        assert_eq!(ledger.pending_count(), 0);
    }

    #[tokio::test]
    async fn future_nonce_waits_for_the_gap() {
        let ledger = SimulatedLedger::default();
        let key = AccountKey::generate();

        let later = ledger.send_call(deploy_call(&key, 1, DEFAULT_GAS_LIMIT)).await.unwrap();
        assert_eq!(ledger.receipt(&later).await.unwrap(), None);
        assert_eq!(ledger.pending_nonce(&key.address()).await.unwrap(), 0);

        let first = ledger.send_call(deploy_call(&key, 0, DEFAULT_GAS_LIMIT)).await.unwrap();
        let a = ledger.receipt(&first).await.unwrap().unwrap();
        let b = ledger.receipt(&later).await.unwrap().unwrap();
        assert_eq!(a.block_number, b.block_number);
        assert_eq!(ledger.pending_nonce(&key.address()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn stale_or_duplicate_nonce_is_rejected() {
        let ledger = manual();
        let key = AccountKey::generate();
        ledger.send_call(deploy_call(&key, 0, DEFAULT_GAS_LIMIT)).await.unwrap();
        let err = ledger
            .send_call(deploy_call(&key, 0, 5_000_000))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Rejected(_)));

        ledger.mine_block();
        let err = ledger
            .send_call(deploy_call(&key, 0, 5_000_000))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("nonce too low"));
    }

    #[tokio::test]
    async fn wrong_chain_is_rejected() {
        let ledger = SimulatedLedger::new(LedgerConfig {
            chain_id: 5,
            ..LedgerConfig::default()
        });
        let key = AccountKey::generate();
        let err = ledger
            .send_call(deploy_call(&key, 0, DEFAULT_GAS_LIMIT))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("chain id"));
    }

    #[tokio::test]
    async fn insufficient_gas_reverts_and_consumes_nonce() {
        let ledger = SimulatedLedger::default();
        let key = AccountKey::generate();
        let hash = ledger.send_call(deploy_call(&key, 0, 50_000)).await.unwrap();

        let receipt = ledger.receipt(&hash).await.unwrap().unwrap();
        assert_eq!(receipt.status, TxStatus::Reverted("out of gas".into()));
        assert_eq!(receipt.gas_used, 50_000);
        assert_eq!(ledger.pending_nonce(&key.address()).await.unwrap(), 1);
        assert_eq!(ledger.contract_count(), 0);
    }

    #[tokio::test]
    async fn outage_fails_every_rpc() {
        let ledger = SimulatedLedger::default();
        ledger.set_available(false);
        assert!(matches!(
            ledger.block_number().await,
            Err(LedgerError::Unavailable(_))
        ));
        ledger.set_available(true);
        assert!(ledger.block_number().await.is_ok());
    }

    #[tokio::test]
    async fn unknown_contract_query() {
        let ledger = SimulatedLedger::default();
        let nowhere = Address::from_bytes([3; 20]);
        assert_eq!(
            ledger.query(&nowhere, ContractQuery::Kind).await,
            Err(LedgerError::NoContract(nowhere))
        );
    }

    #[tokio::test]
    async fn restored_world_keeps_contracts_but_not_history() {
        let ledger = SimulatedLedger::default();
        let key = AccountKey::generate();
        ledger.send_call(deploy_call(&key, 0, DEFAULT_GAS_LIMIT)).await.unwrap();
        let course = Address::for_contract(&key.address(), 0);

        let restored = SimulatedLedger::from_world(LedgerConfig::default(), ledger.snapshot());
        assert_eq!(restored.contract_count(), 1);
        assert_eq!(
            restored.query(&course, ContractQuery::Kind).await.unwrap(),
            QueryOutput::Kind(NodeKind::Course)
        );
        assert_eq!(restored.block_number().await.unwrap(), 0);
        assert_eq!(restored.total_gas_used(), 0);
    }

    #[tokio::test]
    async fn logs_are_filtered_by_contract() {
        let ledger = SimulatedLedger::default();
        let key = AccountKey::generate();
        ledger.send_call(deploy_call(&key, 0, DEFAULT_GAS_LIMIT)).await.unwrap();
        ledger.send_call(deploy_call(&key, 1, DEFAULT_GAS_LIMIT)).await.unwrap();

        let first = Address::for_contract(&key.address(), 0);
        let logs = ledger
            .filter_logs(&LogFilter::for_contract(first))
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(ledger.filter_logs(&LogFilter::default()).await.unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn background_miner_drains_pool() {
        let ledger = Arc::new(manual());
        let miner = ledger.spawn_miner(Duration::from_millis(100));
        let key = AccountKey::generate();
        let hash = ledger.send_call(deploy_call(&key, 0, DEFAULT_GAS_LIMIT)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(ledger.receipt(&hash).await.unwrap().is_some());
        miner.abort();
    }
}
