//! # Node Verifier
//!
//! Decides whether a subject's credentials on a node can be trusted, in one
//! of two modes:
//!
//! - **On-chain**: ask the contract. One query, the contract's answer is the
//!   answer.
//! - **Off-chain**: fetch the raw state (proofs, owners, quorum, roots) and
//!   replay the contract's decision locally. Costs nothing per call and works
//!   against a read-only replica.
//!
//! Both modes must agree on every input. The off-chain checks below run in
//! the same order as the contract's, so the *first* failing reason matches
//! too, not just the verdict.
//!
//! ## Tree traversal
//!
//! `verify_credential_tree` walks witnesses depth-first. Inner witnesses are
//! recursed into; leaf witnesses have their issued credentials checked and
//! their stored root recomputed. The traversal carries the path of ancestors
//! it came through: a witness that is already on the path, or a path longer
//! than the configured depth, stops the walk with `CycleDetected` instead of
//! recursing forever on malformed state.

use futures::future::{BoxFuture, FutureExt};

use crate::crypto::aggregate::aggregate;
use crate::error::ErrorClass;
use crate::ledger::{ContractQuery, LedgerError, QueryOutput};
use crate::primitives::{digest_hex, Address, Digest};

use super::node::NodeHandle;
use super::proof::Role;
use super::quorum::OwnerSet;

// ---------------------------------------------------------------------------
// Modes and Errors
// ---------------------------------------------------------------------------

/// Where the accept/reject decision is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerificationMode {
    OnChain,
    OffChain,
}

impl std::fmt::Display for VerificationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationMode::OnChain => write!(f, "on-chain"),
            VerificationMode::OffChain => write!(f, "off-chain"),
        }
    }
}

/// Why a verification failed, and where.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("no credentials for subject {subject} on node {node}")]
    NoCredentials { node: Address, subject: Address },

    #[error("credential {} not found on node {node}", digest_hex(.digest))]
    CredentialNotFound { node: Address, digest: Digest },

    #[error("credential {} on node {node} belongs to {actual}, not {expected}", digest_hex(.digest))]
    WrongSubject {
        node: Address,
        digest: Digest,
        expected: Address,
        actual: Address,
    },

    #[error("credential {} on node {node} not approved by its subject", digest_hex(.digest))]
    CredentialNotApproved { node: Address, digest: Digest },

    #[error("credential {} on node {node} lacks a quorum of owner signatures", digest_hex(.digest))]
    NotQuorumSigned { node: Address, digest: Digest },

    #[error("credential {} on node {node} was revoked", digest_hex(.digest))]
    CredentialRevoked { node: Address, digest: Digest },

    #[error("no aggregated root for subject {subject} on node {node}")]
    RootNotFound { node: Address, subject: Address },

    #[error("stored root {} for {subject} on node {node} differs from {}", digest_hex(.stored), digest_hex(.expected))]
    WrongRoot {
        node: Address,
        subject: Address,
        expected: Digest,
        stored: Digest,
    },

    #[error("recomputed root {} for {subject} on node {node} differs from {}", digest_hex(.computed), digest_hex(.expected))]
    RootMismatch {
        node: Address,
        subject: Address,
        expected: Digest,
        computed: Digest,
    },

    #[error("witness cycle at node {node} (depth {depth})")]
    CycleDetected {
        node: Address,
        depth: usize,
        path: Vec<Address>,
    },

    #[error("owner set of node {node} is malformed")]
    InvalidOwnerSet { node: Address },

    #[error("node {node} rejected {method}: {reason}")]
    Rejected {
        node: Address,
        method: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl VerifyError {
    pub fn class(&self) -> ErrorClass {
        match self {
            VerifyError::NoCredentials { .. }
            | VerifyError::CredentialNotFound { .. }
            | VerifyError::RootNotFound { .. } => ErrorClass::NotFound,
            VerifyError::WrongSubject { .. }
            | VerifyError::CredentialNotApproved { .. }
            | VerifyError::NotQuorumSigned { .. }
            | VerifyError::Rejected { .. } => ErrorClass::PolicyViolation,
            VerifyError::CredentialRevoked { .. }
            | VerifyError::WrongRoot { .. }
            | VerifyError::RootMismatch { .. }
            | VerifyError::CycleDetected { .. }
            | VerifyError::InvalidOwnerSet { .. } => ErrorClass::IntegrityViolation,
            VerifyError::Ledger(e) => e.class(),
        }
    }

    /// The node where the chain of trust broke.
    pub fn node(&self) -> Option<Address> {
        match self {
            VerifyError::NoCredentials { node, .. }
            | VerifyError::CredentialNotFound { node, .. }
            | VerifyError::WrongSubject { node, .. }
            | VerifyError::CredentialNotApproved { node, .. }
            | VerifyError::NotQuorumSigned { node, .. }
            | VerifyError::CredentialRevoked { node, .. }
            | VerifyError::RootNotFound { node, .. }
            | VerifyError::WrongRoot { node, .. }
            | VerifyError::RootMismatch { node, .. }
            | VerifyError::CycleDetected { node, .. }
            | VerifyError::InvalidOwnerSet { node }
            | VerifyError::Rejected { node, .. } => Some(*node),
            VerifyError::Ledger(LedgerError::NoContract(node)) => Some(*node),
            VerifyError::Ledger(_) => None,
        }
    }

    /// The digest that failed, when the failure is about one credential.
    pub fn digest(&self) -> Option<Digest> {
        match self {
            VerifyError::CredentialNotFound { digest, .. }
            | VerifyError::WrongSubject { digest, .. }
            | VerifyError::CredentialNotApproved { digest, .. }
            | VerifyError::NotQuorumSigned { digest, .. }
            | VerifyError::CredentialRevoked { digest, .. } => Some(*digest),
            _ => None,
        }
    }

    /// Short machine-friendly name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            VerifyError::NoCredentials { .. } => "no-credentials",
            VerifyError::CredentialNotFound { .. } => "credential-not-found",
            VerifyError::WrongSubject { .. } => "wrong-subject",
            VerifyError::CredentialNotApproved { .. } => "credential-not-approved",
            VerifyError::NotQuorumSigned { .. } => "not-quorum-signed",
            VerifyError::CredentialRevoked { .. } => "credential-revoked",
            VerifyError::RootNotFound { .. } => "root-not-found",
            VerifyError::WrongRoot { .. } => "wrong-root",
            VerifyError::RootMismatch { .. } => "root-mismatch",
            VerifyError::CycleDetected { .. } => "cycle-detected",
            VerifyError::InvalidOwnerSet { .. } => "invalid-owner-set",
            VerifyError::Rejected { .. } => "rejected",
            VerifyError::Ledger(_) => "ledger",
        }
    }
}

// ---------------------------------------------------------------------------
// On-chain
// ---------------------------------------------------------------------------

/// Delegates the decision to the contract. `true` passes; `false` or a
/// revert becomes [`VerifyError::Rejected`] carrying the contract's reason.
pub(crate) async fn on_chain(node: &NodeHandle, query: ContractQuery) -> Result<(), VerifyError> {
    let method = query.method();
    match node.query(query).await {
        Ok(QueryOutput::Bool(true)) => Ok(()),
        Ok(QueryOutput::Bool(false)) => Err(VerifyError::Rejected {
            node: node.address(),
            method,
            reason: "verification returned false".into(),
        }),
        Ok(_) => Err(LedgerError::UnexpectedOutput { expected: "bool" }.into()),
        Err(LedgerError::Reverted(reason)) => Err(VerifyError::Rejected {
            node: node.address(),
            method,
            reason,
        }),
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------------
// Off-chain
// ---------------------------------------------------------------------------

async fn owner_set(node: &NodeHandle) -> Result<OwnerSet, VerifyError> {
    let owners = node.owners().await?;
    let quorum = node.quorum().await?;
    OwnerSet::new(owners, quorum).map_err(|_| VerifyError::InvalidOwnerSet {
        node: node.address(),
    })
}

async fn check_credential(
    node: &NodeHandle,
    owners: &OwnerSet,
    subject: Address,
    digest: Digest,
) -> Result<(), VerifyError> {
    let at = node.address();
    let proof = node
        .proof(&digest)
        .await?
        .ok_or(VerifyError::CredentialNotFound { node: at, digest })?;
    if proof.subject != subject {
        return Err(VerifyError::WrongSubject {
            node: at,
            digest,
            expected: subject,
            actual: proof.subject,
        });
    }
    if !proof.approved {
        return Err(VerifyError::CredentialNotApproved { node: at, digest });
    }
    if !owners.is_quorum_signed(&proof.signers) {
        return Err(VerifyError::NotQuorumSigned { node: at, digest });
    }
    if node.is_revoked(&digest).await? {
        return Err(VerifyError::CredentialRevoked { node: at, digest });
    }
    Ok(())
}

/// Not found, wrong subject, not approved, not quorum-signed, revoked; in
/// that order.
pub(crate) async fn verify_credential(
    node: &NodeHandle,
    subject: Address,
    digest: Digest,
) -> Result<(), VerifyError> {
    let owners = owner_set(node).await?;
    check_credential(node, &owners, subject, digest).await
}

async fn issued_digests(node: &NodeHandle, subject: Address) -> Result<Vec<Digest>, VerifyError> {
    let digests = node.digests(&subject).await?;
    if digests.is_empty() {
        return Err(VerifyError::NoCredentials {
            node: node.address(),
            subject,
        });
    }
    Ok(digests)
}

/// Every digest issued to `subject`, stopping at the first failure.
pub(crate) async fn verify_issued_credentials(
    node: &NodeHandle,
    subject: Address,
) -> Result<(), VerifyError> {
    let digests = issued_digests(node, subject).await?;
    let owners = owner_set(node).await?;
    for digest in digests {
        check_credential(node, &owners, subject, digest).await?;
    }
    Ok(())
}

/// The stored root must equal `expected`, and so must a fresh aggregation of
/// the subject's digests.
pub(crate) async fn verify_credential_root(
    node: &NodeHandle,
    subject: Address,
    expected: Digest,
) -> Result<(), VerifyError> {
    let at = node.address();
    let digests = issued_digests(node, subject).await?;
    let stored = node
        .root(&subject)
        .await?
        .ok_or(VerifyError::RootNotFound { node: at, subject })?;
    if stored.root != expected {
        return Err(VerifyError::WrongRoot {
            node: at,
            subject,
            expected,
            stored: stored.root,
        });
    }
    let computed = aggregate(&digests).map_err(|_| VerifyError::NoCredentials { node: at, subject })?;
    if computed != expected {
        return Err(VerifyError::RootMismatch {
            node: at,
            subject,
            expected,
            computed,
        });
    }
    Ok(())
}

/// Full pre-order walk of `subject`'s credential tree rooted at `node`.
pub(crate) async fn verify_credential_tree(
    node: &NodeHandle,
    subject: Address,
) -> Result<(), VerifyError> {
    let max_depth = node.context().max_depth();
    walk(node.clone(), subject, vec![node.address()], max_depth).await
}

fn walk(
    node: NodeHandle,
    subject: Address,
    path: Vec<Address>,
    max_depth: usize,
) -> BoxFuture<'static, Result<(), VerifyError>> {
    async move {
        let digests = issued_digests(&node, subject).await?;
        let owners = owner_set(&node).await?;

        for digest in digests {
            check_credential(&node, &owners, subject, digest).await?;
            let witnesses = node
                .proof(&digest)
                .await?
                .map(|p| p.witnesses)
                .unwrap_or_default();

            for witness in witnesses {
                if path.contains(&witness) || path.len() >= max_depth {
                    tracing::warn!(
                        node = %witness,
                        depth = path.len(),
                        "witness cycle detected during tree verification"
                    );
                    let mut cycle = path.clone();
                    cycle.push(witness);
                    return Err(VerifyError::CycleDetected {
                        node: witness,
                        depth: path.len(),
                        path: cycle,
                    });
                }

                let child = node.context().node(witness);
                match child.role().await? {
                    Role::Leaf => {
                        verify_issued_credentials(&child, subject).await?;
                        let root = child
                            .root(&subject)
                            .await?
                            .ok_or(VerifyError::RootNotFound {
                                node: witness,
                                subject,
                            })?;
                        verify_credential_root(&child, subject, root.root).await?;
                    }
                    Role::Inner => {
                        let mut next = path.clone();
                        next.push(witness);
                        walk(child, subject, next, max_depth).await?;
                    }
                }
            }
        }
        Ok(())
    }
    .boxed()
}
