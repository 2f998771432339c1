//! # Hashing Utilities
//!
//! Two hash functions, each with one job:
//!
//! - **Keccak-256**: the ledger's hash. Used for addresses, transaction
//!   hashes and aggregate roots. Note this is the original Keccak padding,
//!   not NIST SHA3-256; mixing the two up produces roots that look fine and
//!   verify nowhere.
//! - **SHA-256**: content hash of serialized credential documents.

use sha2::Sha256;
use sha3::{Digest as _, Keccak256};

use crate::primitives::Digest;

/// Keccak-256 of `data`, as computed by the ledger.
///
/// # Example
///
/// ```
/// use credtree_protocol::crypto::keccak256;
///
/// let h = keccak256(b"");
/// assert_eq!(
///     hex::encode(h),
///     "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
/// );
/// ```
pub fn keccak256(data: &[u8]) -> Digest {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256 of `data` as a fixed-size array.
pub fn sha256(data: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}
