//! # Credential Trees
//!
//! The data model and algorithms for hierarchical credentials:
//!
//! - **proof**: credential, revocation and aggregate records.
//! - **quorum**: owner sets and the quorum threshold.
//! - **store**: the append-only proof store of a single node.
//! - **notary**: the Quorum Engine and issuance policy over one store.
//! - **node**: client handles to node contracts and their capabilities.
//! - **verifier**: on-chain and off-chain verification, tree traversal.

pub mod node;
pub mod notary;
pub mod proof;
pub mod quorum;
pub mod store;
pub mod verifier;

pub use node::{
    CourseHandle, CredentialIssuer, Entity, FacultyHandle, NodeBacked, NodeHandle, OwnerQuery,
    TreeVerifier, VerificationContext,
};
pub use notary::{Notary, NotaryError, Registration, Stamp};
pub use proof::{AggregatedProof, CredentialProof, NodeKind, RevocationProof, Role};
pub use quorum::{OwnerSet, QuorumError};
pub use store::{ProofStore, StoreError};
pub use verifier::{VerificationMode, VerifyError};
