//! # credtree Contracts
//!
//! Execution side of the credential tree. Each course or faculty is a node
//! contract that owns a [`Notary`](credtree_protocol::tree::Notary) and,
//! for inner nodes, a registry of child issuers:
//!
//! - **Node** ([`node`]): a single contract. Registration, approval,
//!   revocation, aggregation, enrollment and the local verification checks.
//! - **World** ([`world`]): every deployed contract plus the cross-contract
//!   pieces: evidence roots at registration and recursive tree verification
//!   bounded by nesting depth.
//! - **Simulated ledger** ([`simulated`]): a development chain implementing
//!   [`LedgerBackend`](credtree_protocol::ledger::LedgerBackend) over a
//!   `World`, with a pending pool, receipts, gas accounting and fault
//!   injection.
//!
//! Calls are all-or-nothing. A call that fails leaves every contract
//! exactly as it was; the ledger still records a reverted receipt and the
//! sender's nonce is still consumed.

pub mod error;
pub mod node;
pub mod simulated;
pub mod world;

pub use error::ContractError;
pub use node::{ContractResult, NodeContract};
pub use simulated::{LedgerConfig, MiningMode, SimulatedLedger};
pub use world::{gas_cost, Execution, World};
