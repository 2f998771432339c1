//! # Notary
//!
//! The Quorum Engine plus the issuance policy that sits on top of it. A
//! `Notary` owns one node's [`OwnerSet`] and [`ProofStore`] and is the only
//! thing allowed to mutate them.
//!
//! Every operation validates completely before it mutates anything, so a
//! rejected call leaves the notary exactly as it found it. Rejections carry
//! the same reason strings the authoritative contract reverts with, which
//! keeps on-chain and off-chain error reports comparable.
//!
//! ## Issuance rules
//!
//! - Only owners register. The first registration of a digest creates the
//!   proof; a later registration of the same digest by a different owner is
//!   that owner's signature.
//! - A subject cannot be its own issuer.
//! - A subject's previous credential must reach quorum before a new one is
//!   registered for them.
//! - Only the subject approves, only once, and only after quorum.
//! - Aggregation needs at least one credential, all of them certified
//!   (approved and quorum-signed).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::aggregate::aggregate;
use crate::error::ErrorClass;
use crate::primitives::{Address, Digest};

use super::proof::{AggregatedProof, CredentialProof, RevocationProof};
use super::quorum::{OwnerSet, QuorumError};
use super::store::{ProofStore, StoreError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reasons the notary refuses a state change.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotaryError {
    #[error(transparent)]
    Quorum(#[from] QuorumError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Issuer: subject cannot be the issuer")]
    SubjectIsIssuer,

    #[error("Issuer: credential already issued for other subject")]
    IssuedForOtherSubject,

    #[error("Issuer: sender already signed")]
    AlreadySigned,

    #[error("Issuer: previous credential must be signed before issue a new one")]
    PreviousUnsigned,

    #[error("Issuer: not sufficient quorum of signatures")]
    InsufficientQuorum,

    #[error("Issuer: subject is not related with this credential")]
    NotRelated,

    #[error("Issuer: there is no credential for the given subject")]
    NoCredentials,

    #[error("Issuer: there are unsigned credentials")]
    UnsignedCredentials,
}

impl NotaryError {
    pub fn class(&self) -> ErrorClass {
        match self {
            NotaryError::Quorum(e) => e.class(),
            NotaryError::Store(e) => e.class(),
            NotaryError::NoCredentials => ErrorClass::NotFound,
            _ => ErrorClass::PolicyViolation,
        }
    }
}

/// Ledger position at which a state change happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stamp {
    pub block: u64,
    pub at: DateTime<Utc>,
}

impl Stamp {
    pub fn new(block: u64, at: DateTime<Utc>) -> Self {
        Self { block, at }
    }
}

/// What a successful `register` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// A new proof was created with the sender as first signer.
    Issued,
    /// The proof existed; the sender's signature was added.
    Signed,
}

// ---------------------------------------------------------------------------
// Notary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notary {
    owners: OwnerSet,
    store: ProofStore,
}

impl Notary {
    pub fn new(owners: OwnerSet) -> Self {
        Self {
            owners,
            store: ProofStore::new(),
        }
    }

    pub fn owners(&self) -> &OwnerSet {
        &self.owners
    }

    pub fn store(&self) -> &ProofStore {
        &self.store
    }

    // -- Quorum Engine ------------------------------------------------------

    /// Records `signer`'s attestation of `digest`. Idempotent: returns
    /// `Ok(false)` when the signer had already attested.
    pub fn record_signature(&mut self, digest: &Digest, signer: Address) -> Result<bool, NotaryError> {
        self.owners.ensure_owner(&signer)?;
        Ok(self.store.add_signer(digest, signer)?)
    }

    pub fn is_signed(&self, digest: &Digest, signer: &Address) -> bool {
        self.store
            .proof(digest)
            .map(|p| p.signers.contains(signer))
            .unwrap_or(false)
    }

    /// Recomputed from the current signer list on every call.
    pub fn is_quorum_signed(&self, digest: &Digest) -> bool {
        self.store
            .proof(digest)
            .map(|p| self.owners.is_quorum_signed(&p.signers))
            .unwrap_or(false)
    }

    /// Approved by the subject and signed by a quorum of owners.
    pub fn is_certified(&self, digest: &Digest) -> bool {
        self.store
            .proof(digest)
            .map(|p| p.approved && self.owners.is_quorum_signed(&p.signers))
            .unwrap_or(false)
    }

    // -- Issuance -----------------------------------------------------------

    /// Registers `digest` for `subject`, or adds `sender`'s signature if the
    /// digest is already registered. `evidence_root` is only used when the
    /// proof is created; an existing proof keeps the root it was born with.
    pub fn register(
        &mut self,
        sender: Address,
        subject: Address,
        digest: Digest,
        witnesses: Vec<Address>,
        evidence_root: Option<Digest>,
        stamp: Stamp,
    ) -> Result<Registration, NotaryError> {
        self.owners.ensure_owner(&sender)?;
        if subject == sender {
            return Err(NotaryError::SubjectIsIssuer);
        }

        if let Some(existing) = self.store.proof(&digest) {
            if existing.subject != subject {
                return Err(NotaryError::IssuedForOtherSubject);
            }
            if !self.record_signature(&digest, sender)? {
                return Err(NotaryError::AlreadySigned);
            }
            return Ok(Registration::Signed);
        }

        if let Some(previous) = self.store.digests_for(&subject).last() {
            if !self.is_quorum_signed(previous) {
                return Err(NotaryError::PreviousUnsigned);
            }
        }

        self.store.insert(CredentialProof {
            digest,
            subject,
            registrar: sender,
            witnesses,
            signers: vec![sender],
            approved: false,
            evidence_root,
            inserted_block: stamp.block,
            inserted_at: stamp.at,
        })?;
        Ok(Registration::Issued)
    }

    /// The subject's consent. Requires quorum first.
    pub fn approve(&mut self, sender: Address, digest: &Digest) -> Result<(), NotaryError> {
        let proof = self
            .store
            .proof(digest)
            .ok_or(StoreError::NotFound(*digest))?;
        if proof.subject != sender {
            return Err(NotaryError::NotRelated);
        }
        if !self.owners.is_quorum_signed(&proof.signers) {
            return Err(NotaryError::InsufficientQuorum);
        }
        Ok(self.store.approve(digest)?)
    }

    /// Revokes `digest`. Any owner may revoke; the proof stays in place.
    pub fn revoke(
        &mut self,
        sender: Address,
        digest: &Digest,
        reason: Digest,
        stamp: Stamp,
    ) -> Result<RevocationProof, NotaryError> {
        self.owners.ensure_owner(&sender)?;
        let subject = self
            .store
            .proof(digest)
            .ok_or(StoreError::NotFound(*digest))?
            .subject;
        let record = RevocationProof {
            registrar: sender,
            subject,
            revoked_block: stamp.block,
            revoked_at: stamp.at,
            reason,
        };
        self.store.revoke(digest, record.clone())?;
        Ok(record)
    }

    /// Computes the root over all of `subject`'s digests without recording it.
    pub fn compute_root(&self, subject: &Address) -> Result<(Digest, usize), NotaryError> {
        let digests = self.store.digests_for(subject);
        if digests.is_empty() {
            return Err(NotaryError::NoCredentials);
        }
        if !digests.iter().all(|d| self.is_certified(d)) {
            return Err(NotaryError::UnsignedCredentials);
        }
        let root = aggregate(digests).map_err(|_| NotaryError::NoCredentials)?;
        Ok((root, digests.len()))
    }

    /// Aggregates and records `subject`'s root. Only owners aggregate. A
    /// later aggregation replaces the earlier root, so credentials issued
    /// after the first aggregation can still be folded in.
    pub fn aggregate(
        &mut self,
        sender: Address,
        subject: Address,
        stamp: Stamp,
    ) -> Result<AggregatedProof, NotaryError> {
        self.owners.ensure_owner(&sender)?;
        let (root, digest_count) = self.compute_root(&subject)?;
        let proof = AggregatedProof {
            root,
            aggregated_block: stamp.block,
            digest_count,
        };
        self.store.record_root(subject, proof);
        Ok(proof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- Helpers --------------------------------------------------------------

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 20])
    }

    const A: u8 = 1;
    const B: u8 = 2;
    const C: u8 = 3;
    const S: u8 = 7;

    fn stamp(block: u64) -> Stamp {
        Stamp::new(block, Utc::now())
    }

    fn notary(quorum: usize) -> Notary {
        Notary::new(OwnerSet::new(vec![addr(A), addr(B), addr(C)], quorum).unwrap())
    }

    fn issue(n: &mut Notary, digest: u8) {
        n.register(addr(A), addr(S), [digest; 32], vec![], None, stamp(1))
            .unwrap();
    }

    fn certify(n: &mut Notary, digest: u8) {
        issue(n, digest);
        n.register(addr(B), addr(S), [digest; 32], vec![], None, stamp(2))
            .unwrap();
        n.approve(addr(S), &[digest; 32]).unwrap();
    }

    // -- Quorum ---------------------------------------------------------------

    #[test]
    fn second_registration_is_a_signature() {
        let mut n = notary(2);
        issue(&mut n, 1);
        assert!(n.is_signed(&[1; 32], &addr(A)));
        assert!(!n.is_quorum_signed(&[1; 32]));

        let outcome = n
            .register(addr(B), addr(S), [1; 32], vec![], None, stamp(2))
            .unwrap();
        assert_eq!(outcome, Registration::Signed);
        assert!(n.is_quorum_signed(&[1; 32]));
    }

    #[test]
    fn record_signature_is_idempotent_and_owner_gated() {
        let mut n = notary(2);
        issue(&mut n, 1);
        assert!(!n.record_signature(&[1; 32], addr(A)).unwrap());
        assert!(n.record_signature(&[1; 32], addr(B)).unwrap());
        assert!(!n.record_signature(&[1; 32], addr(B)).unwrap());
        assert_eq!(n.store().proof(&[1; 32]).unwrap().signers.len(), 2);

        assert_eq!(
            n.record_signature(&[1; 32], addr(9)),
            Err(NotaryError::Quorum(QuorumError::NotOwner(addr(9))))
        );
    }

    #[test]
    fn cosigning_and_record_signature_share_one_path() {
        let mut signed = notary(3);
        issue(&mut signed, 1);
        signed.record_signature(&[1; 32], addr(B)).unwrap();

        // Registering after a direct signature is a duplicate, not a new one.
        assert_eq!(
            signed.register(addr(B), addr(S), [1; 32], vec![], None, stamp(2)),
            Err(NotaryError::AlreadySigned)
        );

        let mut registered = notary(3);
        issue(&mut registered, 1);
        registered
            .register(addr(B), addr(S), [1; 32], vec![], None, stamp(2))
            .unwrap();
        assert_eq!(
            registered.store().proof(&[1; 32]).unwrap().signers,
            signed.store().proof(&[1; 32]).unwrap().signers
        );

        assert_eq!(
            registered.register(addr(C), addr(S), [1; 32], vec![], None, stamp(3)),
            Ok(Registration::Signed)
        );
        assert!(registered.is_quorum_signed(&[1; 32]));
    }

    // -- Registration policy --------------------------------------------------

    #[test]
    fn register_rejections() {
        let mut n = notary(2);
        assert_eq!(
            n.register(addr(9), addr(S), [1; 32], vec![], None, stamp(1)),
            Err(NotaryError::Quorum(QuorumError::NotOwner(addr(9))))
        );
        assert_eq!(
            n.register(addr(A), addr(A), [1; 32], vec![], None, stamp(1)),
            Err(NotaryError::SubjectIsIssuer)
        );

        issue(&mut n, 1);
        assert_eq!(
            n.register(addr(A), addr(S), [1; 32], vec![], None, stamp(2)),
            Err(NotaryError::AlreadySigned)
        );
        assert_eq!(
            n.register(addr(B), addr(8), [1; 32], vec![], None, stamp(2)),
            Err(NotaryError::IssuedForOtherSubject)
        );
        assert_eq!(
            n.register(addr(A), addr(S), [2; 32], vec![], None, stamp(2)),
            Err(NotaryError::PreviousUnsigned)
        );
        assert_eq!(n.store().len(), 1);
    }

    #[test]
    fn evidence_root_is_fixed_at_creation() {
        let mut n = notary(2);
        n.register(addr(A), addr(S), [1; 32], vec![addr(40)], Some([5; 32]), stamp(1))
            .unwrap();
        n.register(addr(B), addr(S), [1; 32], vec![addr(40)], Some([6; 32]), stamp(2))
            .unwrap();
        assert_eq!(n.store().proof(&[1; 32]).unwrap().evidence_root, Some([5; 32]));
    }

    // -- Approval -------------------------------------------------------------

    #[test]
    fn approve_requires_subject_and_quorum() {
        let mut n = notary(2);
        issue(&mut n, 1);
        assert_eq!(n.approve(addr(S), &[1; 32]), Err(NotaryError::InsufficientQuorum));
        n.register(addr(B), addr(S), [1; 32], vec![], None, stamp(2))
            .unwrap();
        assert_eq!(n.approve(addr(8), &[1; 32]), Err(NotaryError::NotRelated));
        n.approve(addr(S), &[1; 32]).unwrap();
        assert!(n.is_certified(&[1; 32]));
        assert_eq!(
            n.approve(addr(S), &[1; 32]),
            Err(NotaryError::Store(StoreError::AlreadyApproved([1; 32])))
        );
    }

    // -- Revocation -----------------------------------------------------------

    #[test]
    fn revoke_keeps_the_proof() {
        let mut n = notary(2);
        certify(&mut n, 1);
        let record = n.revoke(addr(B), &[1; 32], [0xaa; 32], stamp(5)).unwrap();
        assert_eq!(record.subject, addr(S));
        assert_eq!(record.registrar, addr(B));
        assert!(n.store().is_revoked(&[1; 32]));
        assert!(n.is_certified(&[1; 32]));

        assert_eq!(
            n.revoke(addr(9), &[1; 32], [0; 32], stamp(6)),
            Err(NotaryError::Quorum(QuorumError::NotOwner(addr(9))))
        );
        assert_eq!(
            n.revoke(addr(A), &[2; 32], [0; 32], stamp(6)),
            Err(NotaryError::Store(StoreError::NotFound([2; 32])))
        );
    }

    // -- Aggregation ----------------------------------------------------------

    #[test]
    fn aggregate_requires_certified_credentials() {
        let mut n = notary(2);
        assert_eq!(
            n.aggregate(addr(A), addr(S), stamp(1)),
            Err(NotaryError::NoCredentials)
        );

        issue(&mut n, 1);
        assert_eq!(
            n.aggregate(addr(A), addr(S), stamp(2)),
            Err(NotaryError::UnsignedCredentials)
        );
    }

    #[test]
    fn aggregate_records_root_in_issuance_order() {
        let mut n = notary(2);
        certify(&mut n, 1);
        certify(&mut n, 2);

        let proof = n.aggregate(addr(A), addr(S), stamp(9)).unwrap();
        assert_eq!(proof.root, aggregate(&[[1; 32], [2; 32]]).unwrap());
        assert_eq!(proof.digest_count, 2);
        assert_eq!(n.store().root_for(&addr(S)), Some(&proof));
    }

    #[test]
    fn reaggregation_picks_up_new_credentials() {
        let mut n = notary(2);
        certify(&mut n, 1);
        let first = n.aggregate(addr(A), addr(S), stamp(3)).unwrap();
        certify(&mut n, 2);
        let second = n.aggregate(addr(B), addr(S), stamp(6)).unwrap();
        assert_ne!(first.root, second.root);
        assert_eq!(n.store().root_for(&addr(S)).unwrap().root, second.root);
    }
}
