//! # Receipts and Event Logs

use serde::{Deserialize, Serialize};

use crate::primitives::{Address, Digest, TxHash};
use crate::tree::proof::Role;

/// Outcome of a mined call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Success,
    /// Mined, fee paid, state untouched.
    Reverted(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub status: TxStatus,
    pub block_number: u64,
    pub gas_used: u64,
    pub fee_price: u64,
    /// Set for successful deployments.
    pub contract_address: Option<Address>,
    pub logs: Vec<LogEvent>,
}

impl Receipt {
    pub fn is_success(&self) -> bool {
        self.status == TxStatus::Success
    }
}

/// Events emitted by node contracts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractEvent {
    NodeDeployed {
        created_by: Address,
        role: Role,
    },
    CredentialRegistered {
        digest: Digest,
        subject: Address,
        registrar: Address,
    },
    CredentialSigned {
        digest: Digest,
        signer: Address,
    },
    CredentialApproved {
        digest: Digest,
        subject: Address,
    },
    CredentialRevoked {
        digest: Digest,
        subject: Address,
        revoker: Address,
        reason: Digest,
    },
    CredentialsAggregated {
        subject: Address,
        aggregator: Address,
        root: Digest,
    },
    NodeAdded {
        created_by: Address,
        node: Address,
        role: Role,
    },
    StudentAdded {
        student: Address,
    },
    StudentRemoved {
        student: Address,
    },
}

/// An event plus where it happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub address: Address,
    pub block_number: u64,
    pub tx_hash: TxHash,
    pub event: ContractEvent,
}

/// Selects logs by emitting contract and inclusive block range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Option<Address>,
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
}

impl LogFilter {
    pub fn for_contract(address: Address) -> Self {
        Self {
            address: Some(address),
            ..Self::default()
        }
    }

    pub fn matches(&self, log: &LogEvent) -> bool {
        self.address.map_or(true, |a| a == log.address)
            && self.from_block.map_or(true, |b| log.block_number >= b)
            && self.to_block.map_or(true, |b| log.block_number <= b)
    }
}
