//! # Ledger Boundary
//!
//! Everything credtree needs from a ledger, expressed as one async trait.
//! The ledger itself (consensus, execution, storage) is somebody else's
//! problem; we need to suggest a fee, ask for a pending nonce, submit a
//! signed call, poll for its receipt, filter event logs and make read-only
//! contract queries. That's the whole surface.
//!
//! Implementations must be `Send + Sync` and cheap to share behind an
//! `Arc<dyn LedgerBackend>`; every component that talks to the ledger takes
//! one explicitly rather than reaching for a global.

pub mod call;
pub mod query;
pub mod receipt;

use async_trait::async_trait;

use crate::error::ErrorClass;
use crate::primitives::{Address, TxHash};

pub use call::{CallRequest, ContractCall, Deployment, SignedCall};
pub use query::{ContractQuery, QueryOutput};
pub use receipt::{ContractEvent, LogEvent, LogFilter, Receipt, TxStatus};

/// Failures at the ledger boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The endpoint could not be reached or did not answer.
    #[error("ledger backend unavailable: {0}")]
    Unavailable(String),

    /// The ledger refused the call before executing it (bad nonce, bad
    /// signature, wrong chain id).
    #[error("call rejected: {0}")]
    Rejected(String),

    /// A read-only query reverted.
    #[error("execution reverted: {0}")]
    Reverted(String),

    #[error("no contract deployed at {0}")]
    NoContract(Address),

    #[error("unexpected query output: expected {expected}")]
    UnexpectedOutput { expected: &'static str },

    #[error("encoding error: {0}")]
    Encoding(String),
}

impl LedgerError {
    pub fn class(&self) -> ErrorClass {
        match self {
            LedgerError::Reverted(_) => ErrorClass::PolicyViolation,
            LedgerError::NoContract(_) => ErrorClass::NotFound,
            _ => ErrorClass::Infrastructure,
        }
    }
}

/// The capability set credtree requires from a ledger RPC endpoint.
#[async_trait]
pub trait LedgerBackend: Send + Sync {
    /// Chain id signed calls must carry.
    async fn chain_id(&self) -> Result<u64, LedgerError>;

    /// Height of the latest block.
    async fn block_number(&self) -> Result<u64, LedgerError>;

    async fn suggest_fee_price(&self) -> Result<u64, LedgerError>;

    /// Next nonce for `address`, counting calls still in the pending pool.
    async fn pending_nonce(&self, address: &Address) -> Result<u64, LedgerError>;

    /// Submits a signed call. Returns as soon as the call is accepted into
    /// the pending pool; inclusion is observed through [`receipt`](Self::receipt).
    async fn send_call(&self, call: SignedCall) -> Result<TxHash, LedgerError>;

    /// Receipt of a mined call, or `None` while it is still pending.
    async fn receipt(&self, tx_hash: &TxHash) -> Result<Option<Receipt>, LedgerError>;

    async fn filter_logs(&self, filter: &LogFilter) -> Result<Vec<LogEvent>, LedgerError>;

    /// Read-only contract query against the latest state. Free: no
    /// transaction, no nonce, no fee.
    async fn query(&self, contract: &Address, query: ContractQuery) -> Result<QueryOutput, LedgerError>;
}
