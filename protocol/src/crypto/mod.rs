//! # Cryptographic Primitives
//!
//! Hashing, digest aggregation and account keys. Everything here is a thin,
//! type-safe wrapper around audited implementations:
//!
//! - **Keccak-256** for addresses and aggregate roots, because that is what
//!   the ledger computes and roots that don't match the ledger bit for bit
//!   are worse than useless.
//! - **SHA-256** for credential document digests.
//! - **Ed25519** for signing calls.

pub mod aggregate;
pub mod hash;
pub mod keys;

pub use aggregate::{aggregate, encode_digest_array, AggregateError};
pub use hash::{keccak256, sha256};
pub use keys::{AccountKey, KeyError};
