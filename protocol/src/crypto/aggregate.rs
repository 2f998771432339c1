//! # Digest Aggregation
//!
//! Folds an ordered list of credential digests into a single 32-byte root,
//! exactly the way the ledger does it: ABI-encode the list as a dynamic
//! `bytes32[]` and hash the encoding with Keccak-256.
//!
//! The encoding is three parts, all 32-byte words:
//!
//! ```text
//! | offset (0x20, big-endian) | length (big-endian) | d[0] | d[1] | ... |
//! ```
//!
//! The offset word is there because the ledger encodes the array as the
//! single argument of a tuple, so the head holds a pointer to where the
//! array starts. We reproduce it byte for byte. Any deviation and every root
//! comparison in the system fails, silently, with a perfectly plausible
//! looking hash.
//!
//! Order is part of the claim: `[a, b]` and `[b, a]` aggregate to different
//! roots. We never sort.

use crate::config::DIGEST_LENGTH;
use crate::crypto::hash::keccak256;
use crate::error::ErrorClass;
use crate::primitives::Digest;

/// Errors from [`aggregate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregateError {
    /// There is nothing to aggregate. An empty list has no root.
    #[error("no credentials to aggregate")]
    NoCredentials,
}

impl AggregateError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::NotFound
    }
}

/// Width of one ABI word.
const WORD: usize = 32;

fn be_word(value: u64) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 8..].copy_from_slice(&value.to_be_bytes());
    word
}

/// ABI-encodes `digests` as a dynamic `bytes32[]` argument.
///
/// Elements are copied verbatim: `bytes32` values are already word-sized,
/// so there is no padding to add and none to strip.
pub fn encode_digest_array(digests: &[Digest]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 * WORD + digests.len() * DIGEST_LENGTH);
    out.extend_from_slice(&be_word(WORD as u64));
    out.extend_from_slice(&be_word(digests.len() as u64));
    for digest in digests {
        out.extend_from_slice(digest);
    }
    out
}

/// Aggregates `digests`, in order, into one root.
///
/// # Errors
///
/// [`AggregateError::NoCredentials`] when `digests` is empty.
pub fn aggregate(digests: &[Digest]) -> Result<Digest, AggregateError> {
    if digests.is_empty() {
        return Err(AggregateError::NoCredentials);
    }
    Ok(keccak256(&encode_digest_array(digests)))
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- Helpers --------------------------------------------------------------

    fn h(s: &str) -> Digest {
        let bytes = hex::decode(s).unwrap();
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        out
    }

    fn d1() -> Digest {
        keccak256(b"cert1")
    }

    fn d2() -> Digest {
        keccak256(b"cert2")
    }

    // -- Golden vectors ---------------------------------------------------------
    //
    // Roots below were produced by the ledger's own `keccak256(abi.encode(bytes32[]))`.

    #[test]
    fn golden_single_digest() {
        assert_eq!(
            aggregate(&[d1()]).unwrap(),
            h("ecf0bb6412e4d879de29179321a1f5d0f87d4555a1958597f9a471f7af3660af")
        );
    }

    #[test]
    fn golden_two_digests_in_issuance_order() {
        assert_eq!(
            aggregate(&[d1(), d2()]).unwrap(),
            h("cfe3d32f68b81a29893d2f82fccf371121b1b5ef5c0a4dfe61fda0c98a567040")
        );
        assert_eq!(
            aggregate(&[d2(), d1()]).unwrap(),
            h("8f122d7db00f0470a7e88445f18280cea37f7370969be57f935312758fc59b0f")
        );
    }

    #[test]
    fn golden_zero_digest() {
        assert_eq!(
            aggregate(&[[0u8; 32]]).unwrap(),
            h("6ae4749ab78db9559359c5c84fec8eaa4a12622880a9f643e285e452491251fd")
        );
    }

    #[test]
    fn golden_repeated_byte_digests() {
        let a = [0x11u8; 32];
        let b = [0x22u8; 32];
        assert_eq!(
            aggregate(&[a, b]).unwrap(),
            h("2f685994ab703309ca4d0393ec2524b0368f819050ff85e7e3fb719cc5b48de3")
        );
        assert_eq!(
            aggregate(&[b, a]).unwrap(),
            h("4a93d56d43562a0b473b30167da0f98c403a9c0eb00ee97fcdb22ef177d83546")
        );
    }

    // -- Properties -------------------------------------------------------------

    #[test]
    fn empty_input_is_an_error() {
        assert_eq!(aggregate(&[]), Err(AggregateError::NoCredentials));
    }

    #[test]
    fn encoding_layout() {
        let enc = encode_digest_array(&[d1(), d2()]);
        assert_eq!(enc.len(), 4 * 32);
        assert_eq!(enc[31], 0x20);
        assert!(enc[..31].iter().all(|b| *b == 0));
        assert_eq!(enc[63], 2);
        assert_eq!(&enc[64..96], &d1());
        assert_eq!(&enc[96..128], &d2());
    }

    #[test]
    fn aggregation_is_deterministic_and_order_sensitive() {
        let list: Vec<Digest> = (0u8..5).map(|i| keccak256(&[i])).collect();
        let mut reversed = list.clone();
        reversed.reverse();

        assert_eq!(aggregate(&list).unwrap(), aggregate(&list).unwrap());
        assert_ne!(aggregate(&list).unwrap(), aggregate(&reversed).unwrap());
    }

    #[test]
    fn duplicates_are_not_collapsed() {
        assert_ne!(
            aggregate(&[d1()]).unwrap(),
            aggregate(&[d1(), d1()]).unwrap()
        );
    }
}
