//! # Contract Queries
//!
//! The read-only surface of a node contract. Queries cost nothing and
//! mutate nothing; the verifier's off-chain mode is built entirely from
//! them, and its on-chain mode from the four `Verify*` queries.

use serde::{Deserialize, Serialize};

use crate::primitives::{Address, Digest};
use crate::tree::proof::{AggregatedProof, CredentialProof, NodeKind, RevocationProof};

use super::LedgerError;

/// A read-only contract method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractQuery {
    Kind,
    Owners,
    Quorum,
    IsOwner(Address),
    IsSigned { digest: Digest, signer: Address },
    IsQuorumSigned(Digest),
    Digests(Address),
    Proof(Digest),
    Revocation(Digest),
    IsRevoked(Digest),
    Root(Address),
    Children,
    IsEnrolled(Address),
    Students,
    VerifyCredential { subject: Address, digest: Digest },
    VerifyIssuedCredentials(Address),
    VerifyCredentialRoot { subject: Address, root: Digest },
    VerifyCredentialTree(Address),
}

impl ContractQuery {
    pub fn method(&self) -> &'static str {
        match self {
            ContractQuery::Kind => "kind",
            ContractQuery::Owners => "owners",
            ContractQuery::Quorum => "quorum",
            ContractQuery::IsOwner(_) => "isOwner",
            ContractQuery::IsSigned { .. } => "isSigned",
            ContractQuery::IsQuorumSigned(_) => "isQuorumSigned",
            ContractQuery::Digests(_) => "getDigests",
            ContractQuery::Proof(_) => "getProof",
            ContractQuery::Revocation(_) => "getRevoked",
            ContractQuery::IsRevoked(_) => "isRevoked",
            ContractQuery::Root(_) => "getRoot",
            ContractQuery::Children => "getChildren",
            ContractQuery::IsEnrolled(_) => "isEnrolled",
            ContractQuery::Students => "getStudents",
            ContractQuery::VerifyCredential { .. } => "verifyCredential",
            ContractQuery::VerifyIssuedCredentials(_) => "verifyIssuedCredentials",
            ContractQuery::VerifyCredentialRoot { .. } => "verifyCredentialRoot",
            ContractQuery::VerifyCredentialTree(_) => "verifyCredentialTree",
        }
    }
}

/// The answer to a [`ContractQuery`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryOutput {
    Bool(bool),
    Count(usize),
    Kind(NodeKind),
    Addresses(Vec<Address>),
    Digests(Vec<Digest>),
    Proof(Option<CredentialProof>),
    Revocation(Option<RevocationProof>),
    Root(Option<AggregatedProof>),
}

impl QueryOutput {
    pub fn into_bool(self) -> Result<bool, LedgerError> {
        match self {
            QueryOutput::Bool(b) => Ok(b),
            _ => Err(LedgerError::UnexpectedOutput { expected: "bool" }),
        }
    }

    pub fn into_count(self) -> Result<usize, LedgerError> {
        match self {
            QueryOutput::Count(n) => Ok(n),
            _ => Err(LedgerError::UnexpectedOutput { expected: "count" }),
        }
    }

    pub fn into_kind(self) -> Result<NodeKind, LedgerError> {
        match self {
            QueryOutput::Kind(k) => Ok(k),
            _ => Err(LedgerError::UnexpectedOutput { expected: "kind" }),
        }
    }

    pub fn into_addresses(self) -> Result<Vec<Address>, LedgerError> {
        match self {
            QueryOutput::Addresses(a) => Ok(a),
            _ => Err(LedgerError::UnexpectedOutput {
                expected: "addresses",
            }),
        }
    }

    pub fn into_digests(self) -> Result<Vec<Digest>, LedgerError> {
        match self {
            QueryOutput::Digests(d) => Ok(d),
            _ => Err(LedgerError::UnexpectedOutput { expected: "digests" }),
        }
    }

    pub fn into_proof(self) -> Result<Option<CredentialProof>, LedgerError> {
        match self {
            QueryOutput::Proof(p) => Ok(p),
            _ => Err(LedgerError::UnexpectedOutput { expected: "proof" }),
        }
    }

    pub fn into_revocation(self) -> Result<Option<RevocationProof>, LedgerError> {
        match self {
            QueryOutput::Revocation(r) => Ok(r),
            _ => Err(LedgerError::UnexpectedOutput {
                expected: "revocation",
            }),
        }
    }

    pub fn into_root(self) -> Result<Option<AggregatedProof>, LedgerError> {
        match self {
            QueryOutput::Root(r) => Ok(r),
            _ => Err(LedgerError::UnexpectedOutput { expected: "root" }),
        }
    }
}
