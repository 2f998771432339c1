//! # Transactor
//!
//! Submits signed calls and waits for them to land. The state machine per
//! call is small:
//!
//! ```text
//!  submit ──► Pending ──(receipt: success)──► Confirmed
//!                │    └─(receipt: reverted)─► Failed
//!                └──────(timeout)───────────► Indeterminate
//! ```
//!
//! `Indeterminate` is reported as [`TxError::Timeout`]. It does not mean the
//! call failed: the ledger may still mine it, and its nonce stays consumed.
//! Dropping the future returned by `wait_for_confirmation` is equally safe;
//! nothing here touches allocator state.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

use crate::config::{DEFAULT_CONFIRMATION_TIMEOUT, DEFAULT_POLL_INTERVAL};
use crate::error::ErrorClass;
use crate::ledger::{ContractCall, Deployment, LedgerBackend, LedgerError, Receipt, SignedCall, TxStatus};
use crate::primitives::{Address, TxHash};

use super::context::TxContext;
use super::metrics::TxMetrics;
use super::usage::{UsageLog, UsageMetric};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct TransactorConfig {
    /// Fixed delay between receipt polls.
    pub poll_interval: Duration,
    /// Overall bound on a single wait.
    pub confirmation_timeout: Duration,
}

impl Default for TransactorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TxError {
    /// Mined, but the contract reverted. The fee was still paid.
    #[error("transaction {tx_hash} failed: {reason}")]
    Failed {
        tx_hash: TxHash,
        reason: String,
        gas_used: u64,
    },

    /// No receipt before the timeout. The outcome is unknown.
    #[error("transaction {tx_hash} not confirmed after {waited:?}")]
    Timeout { tx_hash: TxHash, waited: Duration },

    #[error(transparent)]
    Backend(#[from] LedgerError),
}

impl TxError {
    pub fn class(&self) -> ErrorClass {
        match self {
            TxError::Backend(e) => e.class(),
            _ => ErrorClass::Infrastructure,
        }
    }

    /// The revert reason, if the call was mined and reverted.
    pub fn revert_reason(&self) -> Option<&str> {
        match self {
            TxError::Failed { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// A submitted call whose outcome is not known yet.
#[derive(Debug, Clone)]
pub struct PendingTx {
    pub tx_hash: TxHash,
    pub from: Address,
    pub to: Option<Address>,
    pub nonce: u64,
    pub method: &'static str,
    pub subject: Option<Address>,
    pub submitted_at: Instant,
}

/// A successfully mined call.
#[derive(Debug, Clone)]
pub struct Confirmation {
    pub receipt: Receipt,
    pub latency: Duration,
}

// ---------------------------------------------------------------------------
// Transactor
// ---------------------------------------------------------------------------

/// Submits calls and waits for their receipts.
#[derive(Clone)]
pub struct Transactor {
    ledger: Arc<dyn LedgerBackend>,
    config: TransactorConfig,
    metrics: Option<TxMetrics>,
    usage: Option<Arc<UsageLog>>,
}

impl Transactor {
    pub fn new(ledger: Arc<dyn LedgerBackend>, config: TransactorConfig) -> Self {
        Self {
            ledger,
            config,
            metrics: None,
            usage: None,
        }
    }

    pub fn with_metrics(mut self, metrics: TxMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_usage_log(mut self, usage: Arc<UsageLog>) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn config(&self) -> &TransactorConfig {
        &self.config
    }

    /// Signs `call` with the context's key and hands it to the ledger.
    pub async fn submit(
        &self,
        ctx: &TxContext,
        to: Option<Address>,
        call: ContractCall,
    ) -> Result<PendingTx, TxError> {
        ctx.reservation.settle();
        let method = call.method();
        let subject = call.subject();
        let signed = SignedCall::sign(ctx.request(to, call), &ctx.key)?;
        let tx_hash = self.ledger.send_call(signed).await?;

        if let Some(m) = &self.metrics {
            m.submitted_total.inc();
        }
        tracing::debug!(
            tx = %tx_hash,
            from = %ctx.from,
            nonce = ctx.nonce,
            method,
            "transaction submitted"
        );

        Ok(PendingTx {
            tx_hash,
            from: ctx.from,
            to,
            nonce: ctx.nonce,
            method,
            subject,
            submitted_at: Instant::now(),
        })
    }

    /// Waits up to the configured timeout.
    pub async fn wait_for_confirmation(&self, pending: &PendingTx) -> Result<Confirmation, TxError> {
        self.wait_with_timeout(pending, self.config.confirmation_timeout)
            .await
    }

    /// Polls for `pending`'s receipt every `poll_interval` until it appears
    /// or `timeout` elapses. An unreachable backend during polling is logged
    /// and polled through; only the timeout ends the wait early.
    pub async fn wait_with_timeout(
        &self,
        pending: &PendingTx,
        timeout: Duration,
    ) -> Result<Confirmation, TxError> {
        let poll = async {
            let mut ticker = tokio::time::interval(self.config.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match self.ledger.receipt(&pending.tx_hash).await {
                    Ok(Some(receipt)) => return Ok(receipt),
                    Ok(None) => {}
                    Err(LedgerError::Unavailable(reason)) => {
                        tracing::warn!(tx = %pending.tx_hash, %reason, "receipt poll failed");
                    }
                    Err(e) => return Err(TxError::Backend(e)),
                }
            }
        };

        let receipt = match tokio::time::timeout(timeout, poll).await {
            Ok(result) => result?,
            Err(_) => {
                if let Some(m) = &self.metrics {
                    m.timed_out_total.inc();
                }
                tracing::warn!(
                    tx = %pending.tx_hash,
                    nonce = pending.nonce,
                    ?timeout,
                    "transaction still pending after timeout"
                );
                return Err(TxError::Timeout {
                    tx_hash: pending.tx_hash,
                    waited: timeout,
                });
            }
        };

        let latency = pending.submitted_at.elapsed();
        self.record(pending, &receipt, latency);

        match &receipt.status {
            TxStatus::Success => Ok(Confirmation { receipt, latency }),
            TxStatus::Reverted(reason) => {
                tracing::debug!(tx = %pending.tx_hash, method = pending.method, %reason, "transaction reverted");
                Err(TxError::Failed {
                    tx_hash: pending.tx_hash,
                    reason: reason.clone(),
                    gas_used: receipt.gas_used,
                })
            }
        }
    }

    /// [`submit`](Self::submit) followed by
    /// [`wait_for_confirmation`](Self::wait_for_confirmation).
    pub async fn submit_and_wait(
        &self,
        ctx: &TxContext,
        to: Option<Address>,
        call: ContractCall,
    ) -> Result<Confirmation, TxError> {
        let pending = self.submit(ctx, to, call).await?;
        self.wait_for_confirmation(&pending).await
    }

    /// Deploys a node contract and returns its address.
    pub async fn deploy(&self, ctx: &TxContext, deployment: Deployment) -> Result<Address, TxError> {
        let confirmation = self
            .submit_and_wait(ctx, None, ContractCall::Deploy(deployment))
            .await?;
        confirmation
            .receipt
            .contract_address
            .ok_or_else(|| TxError::Failed {
                tx_hash: confirmation.receipt.tx_hash,
                reason: "receipt carries no contract address".into(),
                gas_used: confirmation.receipt.gas_used,
            })
    }

    fn record(&self, pending: &PendingTx, receipt: &Receipt, latency: Duration) {
        if let Some(m) = &self.metrics {
            m.gas_used_total.inc_by(receipt.gas_used);
            m.confirmation_latency_seconds
                .observe(latency.as_secs_f64());
            if receipt.is_success() {
                m.confirmed_total.inc();
            } else {
                m.reverted_total.inc();
            }
        }
        if let Some(usage) = &self.usage {
            usage.record(UsageMetric {
                contract: pending.to.or(receipt.contract_address),
                sender: pending.from,
                subject: pending.subject,
                method: pending.method,
                gas_used: receipt.gas_used,
                reverted: !receipt.is_success(),
            });
        }
    }
}
