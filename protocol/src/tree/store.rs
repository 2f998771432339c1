//! # Credential Proof Store
//!
//! Append-only bookkeeping for one node's proofs. Nothing here is ever
//! removed: a proof, once inserted, keeps its digest, subject and evidence
//! root forever; approval only goes one way; revocation is recorded next to
//! the proof rather than instead of it.
//!
//! The store is policy-free. It enforces the shape of the data
//! (no overwrites, no double approval, no double revocation) and leaves the
//! question of *who* may do what to [`super::notary::Notary`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ErrorClass;
use crate::primitives::{digest_hex, Address, Digest};

use super::proof::{AggregatedProof, CredentialProof, RevocationProof};

/// Structural violations of the append-only rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Issuer: credential {} already registered", digest_hex(.0))]
    DigestExists(Digest),

    #[error("Issuer: no credential proof found")]
    NotFound(Digest),

    #[error("Issuer: subject already signed this credential")]
    AlreadyApproved(Digest),

    #[error("Issuer: credential {} already revoked", digest_hex(.0))]
    AlreadyRevoked(Digest),
}

impl StoreError {
    pub fn class(&self) -> ErrorClass {
        match self {
            StoreError::NotFound(_) => ErrorClass::NotFound,
            _ => ErrorClass::PolicyViolation,
        }
    }
}

/// Proofs, revocations and aggregate roots held by one node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProofStore {
    proofs: HashMap<Digest, CredentialProof>,
    /// subject -> digests in issuance order.
    issued: HashMap<Address, Vec<Digest>>,
    revocations: HashMap<Digest, RevocationProof>,
    roots: HashMap<Address, AggregatedProof>,
}

impl ProofStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new proof and appends its digest to the subject's issuance
    /// list. Fails if the digest is already present.
    pub fn insert(&mut self, proof: CredentialProof) -> Result<(), StoreError> {
        if self.proofs.contains_key(&proof.digest) {
            return Err(StoreError::DigestExists(proof.digest));
        }
        self.issued
            .entry(proof.subject)
            .or_default()
            .push(proof.digest);
        self.proofs.insert(proof.digest, proof);
        Ok(())
    }

    pub fn proof(&self, digest: &Digest) -> Option<&CredentialProof> {
        self.proofs.get(digest)
    }

    /// Digests issued to `subject`, oldest first.
    pub fn digests_for(&self, subject: &Address) -> &[Digest] {
        self.issued.get(subject).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Adds `signer` to the proof's signer list. Returns `Ok(false)` when the
    /// signer was already present; the list never holds duplicates.
    pub fn add_signer(&mut self, digest: &Digest, signer: Address) -> Result<bool, StoreError> {
        let proof = self
            .proofs
            .get_mut(digest)
            .ok_or(StoreError::NotFound(*digest))?;
        if proof.signers.contains(&signer) {
            return Ok(false);
        }
        proof.signers.push(signer);
        Ok(true)
    }

    /// Flips `approved` to true. A second approval is an error, not a no-op,
    /// so the subject learns they already consented.
    pub fn approve(&mut self, digest: &Digest) -> Result<(), StoreError> {
        let proof = self
            .proofs
            .get_mut(digest)
            .ok_or(StoreError::NotFound(*digest))?;
        if proof.approved {
            return Err(StoreError::AlreadyApproved(*digest));
        }
        proof.approved = true;
        Ok(())
    }

    /// Records a revocation for an existing digest. Revocations are final.
    pub fn revoke(&mut self, digest: &Digest, record: RevocationProof) -> Result<(), StoreError> {
        if !self.proofs.contains_key(digest) {
            return Err(StoreError::NotFound(*digest));
        }
        if self.revocations.contains_key(digest) {
            return Err(StoreError::AlreadyRevoked(*digest));
        }
        self.revocations.insert(*digest, record);
        Ok(())
    }

    pub fn revocation(&self, digest: &Digest) -> Option<&RevocationProof> {
        self.revocations.get(digest)
    }

    pub fn is_revoked(&self, digest: &Digest) -> bool {
        self.revocations.contains_key(digest)
    }

    /// Stores the latest aggregate for `subject`, replacing any earlier one.
    pub fn record_root(&mut self, subject: Address, proof: AggregatedProof) {
        self.roots.insert(subject, proof);
    }

    pub fn root_for(&self, subject: &Address) -> Option<&AggregatedProof> {
        self.roots.get(subject)
    }

    pub fn len(&self) -> usize {
        self.proofs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proofs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    // -- Helpers --------------------------------------------------------------

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 20])
    }

    fn proof(digest: u8, subject: u8) -> CredentialProof {
        CredentialProof {
            digest: [digest; 32],
            subject: addr(subject),
            registrar: addr(1),
            witnesses: vec![],
            signers: vec![addr(1)],
            approved: false,
            evidence_root: None,
            inserted_block: 1,
            inserted_at: Utc::now(),
        }
    }

    fn revocation() -> RevocationProof {
        RevocationProof {
            registrar: addr(1),
            subject: addr(7),
            revoked_block: 2,
            revoked_at: Utc::now(),
            reason: [0xee; 32],
        }
    }

    // -- Tests ----------------------------------------------------------------

    #[test]
    fn insert_keeps_issuance_order_per_subject() {
        let mut store = ProofStore::new();
        store.insert(proof(3, 7)).unwrap();
        store.insert(proof(1, 7)).unwrap();
        store.insert(proof(2, 8)).unwrap();

        assert_eq!(store.digests_for(&addr(7)), &[[3; 32], [1; 32]]);
        assert_eq!(store.digests_for(&addr(8)), &[[2; 32]]);
        assert!(store.digests_for(&addr(9)).is_empty());
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn insert_never_overwrites() {
        let mut store = ProofStore::new();
        store.insert(proof(1, 7)).unwrap();
        let mut other = proof(1, 8);
        other.evidence_root = Some([5; 32]);

        assert_eq!(store.insert(other), Err(StoreError::DigestExists([1; 32])));
        let kept = store.proof(&[1; 32]).unwrap();
        assert_eq!(kept.subject, addr(7));
        assert_eq!(kept.evidence_root, None);
        assert_eq!(store.digests_for(&addr(8)).len(), 0);
    }

    #[test]
    fn add_signer_is_idempotent() {
        let mut store = ProofStore::new();
        store.insert(proof(1, 7)).unwrap();
        assert!(!store.add_signer(&[1; 32], addr(1)).unwrap());
        assert!(store.add_signer(&[1; 32], addr(2)).unwrap());
        assert!(!store.add_signer(&[1; 32], addr(2)).unwrap());
        assert_eq!(store.proof(&[1; 32]).unwrap().signers, vec![addr(1), addr(2)]);
    }

    #[test]
    fn approve_only_once() {
        let mut store = ProofStore::new();
        store.insert(proof(1, 7)).unwrap();
        store.approve(&[1; 32]).unwrap();
        assert!(store.proof(&[1; 32]).unwrap().approved);
        assert_eq!(store.approve(&[1; 32]), Err(StoreError::AlreadyApproved([1; 32])));
        assert_eq!(store.approve(&[9; 32]), Err(StoreError::NotFound([9; 32])));
    }

    #[test]
    fn revocation_is_recorded_beside_the_proof() {
        let mut store = ProofStore::new();
        store.insert(proof(1, 7)).unwrap();
        store.revoke(&[1; 32], revocation()).unwrap();

        assert!(store.is_revoked(&[1; 32]));
        assert!(store.proof(&[1; 32]).is_some());
        assert_eq!(store.digests_for(&addr(7)).to_vec(), vec![[1; 32]]);
        assert_eq!(
            store.revoke(&[1; 32], revocation()),
            Err(StoreError::AlreadyRevoked([1; 32]))
        );
        assert_eq!(
            store.revoke(&[2; 32], revocation()),
            Err(StoreError::NotFound([2; 32]))
        );
    }

    #[test]
    fn record_root_replaces_previous() {
        let mut store = ProofStore::new();
        let first = AggregatedProof {
            root: [1; 32],
            aggregated_block: 3,
            digest_count: 1,
        };
        let second = AggregatedProof {
            root: [2; 32],
            aggregated_block: 5,
            digest_count: 2,
        };
        store.record_root(addr(7), first);
        store.record_root(addr(7), second);
        assert_eq!(store.root_for(&addr(7)), Some(&second));
        assert_eq!(store.root_for(&addr(8)), None);
    }
}
