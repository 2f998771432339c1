//! # Owner Sets
//!
//! The authority side of the Quorum Engine: who may attest, and how many
//! distinct attestations make a quorum. The signer side lives with the
//! proofs in [`super::store`]; [`super::notary::Notary`] joins the two.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::ErrorClass;
use crate::primitives::Address;

/// Errors constructing or checking against an owner set. Messages are the
/// contract's revert reasons.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuorumError {
    #[error("Owners: sender is not an owner")]
    NotOwner(Address),

    #[error("Owners: not enough owners")]
    NoOwners,

    #[error("Owners: quorum out of range")]
    InvalidQuorum { quorum: usize, owners: usize },

    #[error("Owners: duplicate owner {0}")]
    DuplicateOwner(Address),

    #[error("Owners: zero address cannot be an owner")]
    ZeroAddress,
}

impl QuorumError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::PolicyViolation
    }
}

/// Authorized identities plus the threshold `k`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerSet {
    owners: Vec<Address>,
    quorum: usize,
}

impl OwnerSet {
    /// Validates and builds an owner set. Requires at least one owner, no
    /// duplicates, no zero address, and `1 <= quorum <= owners.len()`.
    pub fn new(owners: Vec<Address>, quorum: usize) -> Result<Self, QuorumError> {
        if owners.is_empty() {
            return Err(QuorumError::NoOwners);
        }
        if quorum == 0 || quorum > owners.len() {
            return Err(QuorumError::InvalidQuorum {
                quorum,
                owners: owners.len(),
            });
        }
        let mut seen = HashSet::with_capacity(owners.len());
        for owner in &owners {
            if owner.is_zero() {
                return Err(QuorumError::ZeroAddress);
            }
            if !seen.insert(*owner) {
                return Err(QuorumError::DuplicateOwner(*owner));
            }
        }
        Ok(Self { owners, quorum })
    }

    pub fn owners(&self) -> &[Address] {
        &self.owners
    }

    pub fn quorum(&self) -> usize {
        self.quorum
    }

    pub fn is_owner(&self, who: &Address) -> bool {
        self.owners.contains(who)
    }

    /// Returns `Err(NotOwner)` unless `who` is an owner.
    pub fn ensure_owner(&self, who: &Address) -> Result<(), QuorumError> {
        if self.is_owner(who) {
            Ok(())
        } else {
            Err(QuorumError::NotOwner(*who))
        }
    }

    /// True iff at least `quorum` distinct owners appear in `signers`.
    /// Non-owners in the list are ignored. Recounted on every call.
    pub fn is_quorum_signed(&self, signers: &[Address]) -> bool {
        let distinct: HashSet<&Address> = signers.iter().filter(|s| self.is_owner(s)).collect();
        distinct.len() >= self.quorum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 20])
    }

    #[test]
    fn rejects_bad_configurations() {
        assert_eq!(OwnerSet::new(vec![], 0), Err(QuorumError::NoOwners));
        assert_eq!(
            OwnerSet::new(vec![addr(1)], 0),
            Err(QuorumError::InvalidQuorum {
                quorum: 0,
                owners: 1
            })
        );
        assert_eq!(
            OwnerSet::new(vec![addr(1), addr(2)], 3),
            Err(QuorumError::InvalidQuorum {
                quorum: 3,
                owners: 2
            })
        );
        assert_eq!(
            OwnerSet::new(vec![addr(1), addr(1)], 1),
            Err(QuorumError::DuplicateOwner(addr(1)))
        );
        assert_eq!(
            OwnerSet::new(vec![Address::ZERO], 1),
            Err(QuorumError::ZeroAddress)
        );
    }

    #[test]
    fn quorum_counts_distinct_owners_only() {
        let set = OwnerSet::new(vec![addr(1), addr(2), addr(3)], 2).unwrap();
        assert!(!set.is_quorum_signed(&[addr(1)]));
        assert!(!set.is_quorum_signed(&[addr(1), addr(1)]));
        assert!(!set.is_quorum_signed(&[addr(1), addr(9)]));
        assert!(set.is_quorum_signed(&[addr(1), addr(3)]));
    }

    #[test]
    fn ensure_owner_reports_the_sender() {
        let set = OwnerSet::new(vec![addr(1)], 1).unwrap();
        assert!(set.ensure_owner(&addr(1)).is_ok());
        assert_eq!(set.ensure_owner(&addr(2)), Err(QuorumError::NotOwner(addr(2))));
    }
}
