// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # credtree Protocol: Core Library
//!
//! Credentials that vouch for other credentials. An exam is signed by a
//! quorum of evaluators; a course aggregates a student's exams into one
//! root; a faculty issues a diploma that points at those courses. Verifying
//! the diploma means walking the whole tree back down and checking that
//! every node still says what it said when the diploma was issued.
//!
//! ## Architecture
//!
//! - **primitives**: addresses, digests, transaction hashes.
//! - **crypto**: Keccak/SHA-256, digest aggregation, Ed25519 account keys.
//! - **schemes**: the credential documents that get hashed into digests.
//! - **tree**: proof store, quorum engine, node handles and the verifier.
//! - **ledger**: the async trait every ledger backend implements.
//! - **transaction**: submit, poll, classify; gas and latency metrics.
//! - **accounts**: the account table and nonce allocator.
//! - **storage**: sled persistence for accounts and driver records.
//! - **workers**: bounded concurrent task execution.
//! - **config**: protocol constants and defaults.
//!
//! ## Design Philosophy
//!
//! 1. The ledger is the source of truth. Off-chain verification reads the
//!    same state the contracts would and must reach the same verdict.
//! 2. A nonce is handed out once. Not "usually once".
//! 3. Every error knows its class; only infrastructure failures retry.

pub mod accounts;
pub mod config;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod primitives;
pub mod schemes;
pub mod storage;
pub mod transaction;
pub mod tree;
pub mod workers;

pub use error::ErrorClass;
pub use primitives::{Address, Digest, TxHash};
