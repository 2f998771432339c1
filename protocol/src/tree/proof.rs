//! # Proof Records
//!
//! The records a node keeps about the credentials it issues. Three of them,
//! each keyed differently:
//!
//! | Record            | Keyed by  | Mutability                                  |
//! |-------------------|-----------|---------------------------------------------|
//! | `CredentialProof` | digest    | signers grow, `approved` flips false→true   |
//! | `RevocationProof` | digest    | written once, never removed                 |
//! | `AggregatedProof` | subject   | replaced on each aggregation                |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::primitives::{Address, Digest};

// ---------------------------------------------------------------------------
// Roles and Kinds
// ---------------------------------------------------------------------------

/// Position of a node in a credential tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Terminal evidence. Verified by checking its aggregate root.
    Leaf,
    /// Aggregates child nodes. Verified by recursing into its witnesses.
    Inner,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Leaf => write!(f, "leaf"),
            Role::Inner => write!(f, "inner"),
        }
    }
}

/// What kind of contract backs a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// A course: issues exam credentials to enrolled students. Always a leaf.
    Course,
    /// A faculty: issues diplomas witnessed by its courses. Always inner.
    Faculty,
    /// A bare node with an explicit role.
    Node(Role),
}

impl NodeKind {
    pub fn role(self) -> Role {
        match self {
            NodeKind::Course => Role::Leaf,
            NodeKind::Faculty => Role::Inner,
            NodeKind::Node(role) => role,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Course => write!(f, "course"),
            NodeKind::Faculty => write!(f, "faculty"),
            NodeKind::Node(role) => write!(f, "node({})", role),
        }
    }
}

// ---------------------------------------------------------------------------
// Proofs
// ---------------------------------------------------------------------------

/// One issued credential digest and everything attested about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialProof {
    pub digest: Digest,
    pub subject: Address,
    /// The owner that first registered the digest.
    pub registrar: Address,
    /// Child nodes whose roots back this credential, in the order given at
    /// registration.
    pub witnesses: Vec<Address>,
    /// Owners that attested, in signing order, without duplicates.
    pub signers: Vec<Address>,
    /// Whether the subject has consented.
    pub approved: bool,
    /// Aggregate of the witnesses' roots for `subject`. `None` when the
    /// credential has no witnesses.
    pub evidence_root: Option<Digest>,
    pub inserted_block: u64,
    pub inserted_at: DateTime<Utc>,
}

/// Marks a digest as permanently untrusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationProof {
    pub registrar: Address,
    pub subject: Address,
    pub revoked_block: u64,
    pub revoked_at: DateTime<Utc>,
    pub reason: Digest,
}

/// The root a node recorded for a subject the last time it aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedProof {
    pub root: Digest,
    pub aggregated_block: u64,
    pub digest_count: usize,
}
