//! # Accounts
//!
//! The signing identities a benchmark run submits from, and the allocator
//! that hands them out. An account is created once, claimed for a role
//! exactly once, and then lives on as a nonce counter that only ever goes up.

pub mod allocator;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::crypto::AccountKey;
use crate::primitives::Address;

pub use allocator::{AccountAllocator, AllocatorConfig, AllocatorError, SelectionOrder};

/// What an account was claimed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountRole {
    Unassigned,
    Evaluator,
    Student,
    Administrator,
    /// Seals diplomas at the top of the tree.
    Sealer,
}

impl AccountRole {
    pub fn as_str(self) -> &'static str {
        match self {
            AccountRole::Unassigned => "unassigned",
            AccountRole::Evaluator => "evaluator",
            AccountRole::Student => "student",
            AccountRole::Administrator => "administrator",
            AccountRole::Sealer => "sealer",
        }
    }
}

impl fmt::Display for AccountRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unassigned" => Ok(AccountRole::Unassigned),
            "evaluator" => Ok(AccountRole::Evaluator),
            "student" => Ok(AccountRole::Student),
            "administrator" | "admin" => Ok(AccountRole::Administrator),
            "sealer" => Ok(AccountRole::Sealer),
            other => Err(format!("unknown account role: {other}")),
        }
    }
}

/// One row of the allocator's account table.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    secret_key: [u8; 32],
    /// Next nonce this account will use.
    pub nonce: u64,
    pub role: AccountRole,
    /// Contracts this account owns or participates in.
    pub contracts: Vec<Address>,
}

impl Account {
    pub fn new(key: &AccountKey) -> Self {
        Self {
            address: key.address(),
            secret_key: key.secret_bytes(),
            nonce: 0,
            role: AccountRole::Unassigned,
            contracts: Vec::new(),
        }
    }

    pub fn key(&self) -> AccountKey {
        AccountKey::from_bytes(&self.secret_key)
    }

    pub fn is_unassigned(&self) -> bool {
        self.role == AccountRole::Unassigned
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("address", &self.address)
            .field("nonce", &self.nonce)
            .field("role", &self.role)
            .field("contracts", &self.contracts.len())
            .finish()
    }
}
