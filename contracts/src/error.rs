//! Revert reasons.
//!
//! Every variant renders as the exact string the contract reverts with. The
//! ledger forwards that string untouched, so a client comparing reasons
//! across the on-chain and off-chain paths compares like with like.

use thiserror::Error;

use credtree_protocol::error::ErrorClass;
use credtree_protocol::primitives::Address;
use credtree_protocol::tree::{NotaryError, QuorumError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    #[error(transparent)]
    Notary(#[from] NotaryError),

    #[error(transparent)]
    Quorum(#[from] QuorumError),

    // -- Child registry -------------------------------------------------------
    #[error("AccountableIssuer: issuer already added")]
    IssuerAlreadyAdded,

    #[error("AccountableIssuer: witness is not a registered issuer")]
    IssuerNotAdded,

    #[error("AccountableIssuer: leaf nodes cannot add issuers")]
    NotAccountable,

    #[error("Issuer: node cannot witness itself")]
    WitnessIsSelf,

    #[error("Issuer: leaf nodes take no witnesses")]
    LeafWitnesses,

    // -- Enrollment -----------------------------------------------------------
    #[error("Course/zero address given")]
    ZeroAddress,

    #[error("Course/student cannot be owner")]
    StudentIsOwner,

    #[error("Course/student already registered")]
    StudentAlreadyRegistered,

    #[error("Course/student not registered")]
    StudentNotRegistered,

    // -- Verification ---------------------------------------------------------
    #[error("Issuer: no credential proof found")]
    CredentialNotFound,

    #[error("Issuer: subject is not related with this credential")]
    WrongSubject,

    #[error("Issuer: credential not approved by the subject")]
    NotApproved,

    #[error("Issuer: not sufficient quorum of signatures")]
    NotQuorumSigned,

    #[error("Issuer: credential was revoked")]
    Revoked,

    #[error("Issuer: there is no credential for the given subject")]
    NoCredentials,

    #[error("Issuer: there is no aggregated proof to verify")]
    NoAggregatedProof,

    #[error("Issuer: given credential doesn't match with stored proof")]
    WrongRoot,

    #[error("Issuer: stored proof doesn't match the issued credentials")]
    RootMismatch,

    // -- Execution ------------------------------------------------------------
    #[error("out of gas")]
    OutOfGas,

    #[error("no contract at {0}")]
    UnknownContract(Address),

    #[error("{0}: method not supported by this contract")]
    Unsupported(&'static str),
}

impl ContractError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ContractError::Notary(e) => e.class(),
            ContractError::Quorum(e) => e.class(),
            ContractError::CredentialNotFound
            | ContractError::NoCredentials
            | ContractError::NoAggregatedProof
            | ContractError::UnknownContract(_) => ErrorClass::NotFound,
            ContractError::Revoked | ContractError::WrongRoot | ContractError::RootMismatch => {
                ErrorClass::IntegrityViolation
            }
            ContractError::OutOfGas => ErrorClass::Infrastructure,
            _ => ErrorClass::PolicyViolation,
        }
    }
}
