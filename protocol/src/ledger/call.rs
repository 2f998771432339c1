//! # Contract Calls
//!
//! State-changing calls and the signed envelope they travel in. The
//! envelope is bincode-encoded for signing and hashing; the transaction
//! hash is Keccak-256 over the signed request bytes.

use serde::{Deserialize, Serialize};

use crate::crypto::hash::keccak256;
use crate::crypto::keys::AccountKey;
use crate::primitives::{Address, Digest, TxHash};
use crate::tree::proof::NodeKind;

use super::LedgerError;

/// Parameters of a new node contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub kind: NodeKind,
    pub owners: Vec<Address>,
    pub quorum: usize,
}

/// A state-changing contract method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractCall {
    Deploy(Deployment),
    RegisterCredential {
        subject: Address,
        digest: Digest,
        witnesses: Vec<Address>,
    },
    ApproveCredential {
        digest: Digest,
    },
    AggregateCredentials {
        subject: Address,
    },
    RevokeCredential {
        digest: Digest,
        reason: Digest,
    },
    AddChild {
        child: Address,
    },
    AddStudent {
        student: Address,
    },
    RemoveStudent {
        student: Address,
    },
}

impl ContractCall {
    /// Contract method name, as used in usage metrics and logs.
    pub fn method(&self) -> &'static str {
        match self {
            ContractCall::Deploy(_) => "deploy",
            ContractCall::RegisterCredential { .. } => "registerCredential",
            ContractCall::ApproveCredential { .. } => "approveCredential",
            ContractCall::AggregateCredentials { .. } => "aggregateCredentials",
            ContractCall::RevokeCredential { .. } => "revokeCredential",
            ContractCall::AddChild { .. } => "addChild",
            ContractCall::AddStudent { .. } => "addStudent",
            ContractCall::RemoveStudent { .. } => "removeStudent",
        }
    }

    /// The subject a call is about, for the methods whose cost is
    /// attributed per subject.
    pub fn subject(&self) -> Option<Address> {
        match self {
            ContractCall::RegisterCredential { subject, .. } => Some(*subject),
            ContractCall::AggregateCredentials { subject } => Some(*subject),
            ContractCall::AddStudent { student } => Some(*student),
            _ => None,
        }
    }
}

/// An unsigned call, fully specified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRequest {
    pub from: Address,
    /// Target contract; `None` for deployments.
    pub to: Option<Address>,
    pub nonce: u64,
    pub fee_price: u64,
    pub gas_limit: u64,
    pub chain_id: u64,
    pub call: ContractCall,
}

impl CallRequest {
    fn signing_bytes(&self) -> Result<Vec<u8>, LedgerError> {
        bincode::serialize(self).map_err(|e| LedgerError::Encoding(e.to_string()))
    }
}

/// A call request with the sender's signature attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedCall {
    pub request: CallRequest,
    pub public_key: [u8; 32],
    pub signature: Vec<u8>,
    hash: TxHash,
}

impl SignedCall {
    /// Signs `request` with `key`. The key must belong to `request.from`.
    pub fn sign(request: CallRequest, key: &AccountKey) -> Result<Self, LedgerError> {
        if key.address() != request.from {
            return Err(LedgerError::Rejected(format!(
                "signing key does not belong to {}",
                request.from
            )));
        }
        let bytes = request.signing_bytes()?;
        let signature = key.sign(&bytes);
        Ok(Self {
            hash: TxHash(keccak256(&bytes)),
            request,
            public_key: key.public_key_bytes(),
            signature,
        })
    }

    pub fn hash(&self) -> TxHash {
        self.hash
    }

    /// Checks that the signature is valid, the public key matches the
    /// sender address and the cached hash matches the request.
    pub fn verify(&self) -> Result<(), LedgerError> {
        if Address::from_public_key(&self.public_key) != self.request.from {
            return Err(LedgerError::Rejected("sender does not match public key".into()));
        }
        let bytes = self.request.signing_bytes()?;
        if TxHash(keccak256(&bytes)) != self.hash {
            return Err(LedgerError::Rejected("transaction hash mismatch".into()));
        }
        AccountKey::verify(&self.public_key, &bytes, &self.signature)
            .map_err(|e| LedgerError::Rejected(e.to_string()))
    }
}
