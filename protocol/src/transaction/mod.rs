//! # Transaction Lifecycle
//!
//! Getting a contract call from "I want to do this" to "the ledger did it":
//!
//! ```text
//! context.rs    TxContext: who signs, with which nonce, at what fee
//! lifecycle.rs  Transactor: submit, poll for the receipt, classify
//! metrics.rs    prometheus counters and latency histogram
//! usage.rs      per-call gas usage records for benchmark reports
//! ```
//!
//! ## Lifecycle
//!
//! 1. **Context**: the account allocator hands out a [`TxContext`] holding
//!    a nonce nobody else will get.
//! 2. **Submit**: [`Transactor::submit`] signs and sends; returns a
//!    [`PendingTx`].
//! 3. **Wait**: [`Transactor::wait_for_confirmation`] polls the receipt at a
//!    fixed interval until it shows up or the timeout fires.
//! 4. **Classify**: success, `TxError::Failed` (mined but reverted),
//!    `TxError::Timeout` (indeterminate) or `TxError::Backend`.
//!
//! Submissions are never retried here. Retrying without a fresh nonce would
//! either collide with the original or leave a gap; that decision belongs to
//! the caller.

pub mod context;
pub mod lifecycle;
pub mod metrics;
pub mod usage;

pub use context::TxContext;
pub use lifecycle::{Confirmation, PendingTx, Transactor, TransactorConfig, TxError};
pub use metrics::TxMetrics;
pub use usage::{UsageLog, UsageMetric};
