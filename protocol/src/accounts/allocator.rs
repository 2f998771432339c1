//! # Account/Nonce Allocator
//!
//! Hands out two scarce things: unused accounts and nonces.
//!
//! ## Nonces
//!
//! [`AccountAllocator::transaction_context`] runs read-max-increment-persist
//! under a per-identity async mutex:
//!
//! ```text
//!   lock(identity)
//!     local   = account.nonce           (what we handed out last, plus one)
//!     pending = ledger.pending_nonce()  (counts calls sent by anyone else)
//!     nonce   = max(local, pending)
//!     account.nonce = nonce + 1         (persisted before the lock drops)
//!   unlock
//! ```
//!
//! Different identities never wait on each other. Two callers for the same
//! identity never see the same nonce.
//!
//! [`AccountAllocator::resync_nonce`] rewinds the local nonce to the ledger's
//! pending nonce, but never below a nonce held by a context that is still
//! alive and has not been submitted yet.
//!
//! ## Claims
//!
//! [`AccountAllocator::select_unused`] claims accounts with one
//! compare-and-swap per row, so a concurrent [`assign_role`] on the same row
//! cannot slip in between the check and the write. Selection itself is
//! serialised by a short synchronous lock, which is what makes two
//! concurrent selections disjoint. A selection that cannot be satisfied in
//! full is rolled back before the error is returned.
//!
//! [`assign_role`]: AccountAllocator::assign_role

use dashmap::DashMap;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{DEFAULT_CHAIN_ID, DEFAULT_GAS_LIMIT};
use crate::crypto::AccountKey;
use crate::error::ErrorClass;
use crate::ledger::{LedgerBackend, LedgerError};
use crate::primitives::Address;
use crate::storage::{CredDb, DbError};
use crate::transaction::context::{Reservation, ReservationWatch};
use crate::transaction::TxContext;

use super::{Account, AccountRole};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum AllocatorError {
    #[error("zero address")]
    ZeroAddress,

    #[error("no accounts found")]
    NoAccountsFound,

    #[error("unknown account {0}")]
    UnknownAccount(Address),

    #[error("insufficient unused accounts: requested {requested}, available {available}")]
    InsufficientAccounts { requested: usize, available: usize },

    #[error("account {address} already assigned as {role}")]
    RoleAlreadyAssigned { address: Address, role: AccountRole },

    #[error("accounts cannot be assigned the unassigned role")]
    InvalidRole,

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl AllocatorError {
    pub fn class(&self) -> ErrorClass {
        match self {
            AllocatorError::NoAccountsFound | AllocatorError::UnknownAccount(_) => {
                ErrorClass::NotFound
            }
            AllocatorError::InsufficientAccounts { .. } => ErrorClass::ResourceExhaustion,
            AllocatorError::ZeroAddress
            | AllocatorError::RoleAlreadyAssigned { .. }
            | AllocatorError::InvalidRole => ErrorClass::PolicyViolation,
            AllocatorError::Db(e) => e.class(),
            AllocatorError::Ledger(e) => e.class(),
        }
    }
}

pub type AllocatorResult<T> = Result<T, AllocatorError>;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct AllocatorConfig {
    pub gas_limit: u64,
    pub chain_id: u64,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            gas_limit: DEFAULT_GAS_LIMIT,
            chain_id: DEFAULT_CHAIN_ID,
        }
    }
}

/// Which unused accounts a selection prefers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionOrder {
    /// Table order.
    #[default]
    Sequential,
    /// Uniformly shuffled.
    Random,
}

// ---------------------------------------------------------------------------
// AccountAllocator
// ---------------------------------------------------------------------------

/// Sole owner of the account table.
pub struct AccountAllocator {
    db: CredDb,
    ledger: Arc<dyn LedgerBackend>,
    config: AllocatorConfig,
    /// One async lock per identity that has ever asked for a nonce.
    locks: DashMap<Address, Arc<tokio::sync::Mutex<()>>>,
    /// Nonces handed out per identity whose contexts may not be submitted yet.
    reserved: DashMap<Address, Vec<(u64, ReservationWatch)>>,
    selection: parking_lot::Mutex<()>,
}

impl AccountAllocator {
    pub fn new(db: CredDb, ledger: Arc<dyn LedgerBackend>, config: AllocatorConfig) -> Self {
        Self {
            db,
            ledger,
            config,
            locks: DashMap::new(),
            reserved: DashMap::new(),
            selection: parking_lot::Mutex::new(()),
        }
    }

    pub fn db(&self) -> &CredDb {
        &self.db
    }

    fn identity_lock(&self, address: &Address) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(&self.locks.entry(*address).or_default())
    }

    // -- Nonces ---------------------------------------------------------------

    /// Reserves the next nonce for `address` and returns a context ready to
    /// sign exactly one call with it.
    pub async fn transaction_context(&self, address: &Address) -> AllocatorResult<TxContext> {
        if address.is_zero() {
            return Err(AllocatorError::ZeroAddress);
        }

        let lock = self.identity_lock(address);
        let _guard = lock.lock().await;

        let fee_price = self.ledger.suggest_fee_price().await?;
        let account = self.get(address)?;
        let pending = self.ledger.pending_nonce(address).await?;
        let nonce = account.nonce.max(pending);

        self.db.update_account(address, |current| {
            let mut next = current.clone();
            next.nonce = nonce + 1;
            Some(next)
        })?;

        tracing::debug!(
            address = %address,
            nonce,
            local = account.nonce,
            pending,
            "nonce reserved"
        );

        let reservation = Reservation::default();
        {
            let mut held = self.reserved.entry(*address).or_default();
            held.retain(|(_, watch)| watch.is_outstanding());
            held.push((nonce, reservation.watch()));
        }

        Ok(TxContext {
            from: *address,
            key: account.key(),
            nonce,
            fee_price,
            gas_limit: self.config.gas_limit,
            chain_id: self.config.chain_id,
            reservation,
        })
    }

    /// Resets the local nonce of `address` to the ledger's pending nonce, or
    /// to just past the highest nonce still held by an unsubmitted context,
    /// whichever is larger.
    ///
    /// Needed after a reserved nonce was never submitted (the ledger refused
    /// the call before pooling it): every later call from that identity would
    /// otherwise wait behind the gap forever.
    pub async fn resync_nonce(&self, address: &Address) -> AllocatorResult<u64> {
        let lock = self.identity_lock(address);
        let _guard = lock.lock().await;

        let pending = self.ledger.pending_nonce(address).await?;
        let outstanding = self.reserved.get_mut(address).and_then(|mut held| {
            held.retain(|(_, watch)| watch.is_outstanding());
            held.iter().map(|(nonce, _)| nonce + 1).max()
        });
        let next_nonce = outstanding.map_or(pending, |floor| floor.max(pending));
        self.db
            .update_account(address, |current| {
                let mut next = current.clone();
                next.nonce = next_nonce;
                Some(next)
            })
            .map_err(|e| match e {
                DbError::NotFound(_) => AllocatorError::UnknownAccount(*address),
                other => other.into(),
            })?;

        tracing::info!(
            address = %address,
            nonce = next_nonce,
            pending,
            outstanding = ?outstanding,
            "nonce resynchronised with ledger"
        );
        Ok(next_nonce)
    }

    // -- Claims ---------------------------------------------------------------

    /// Claims `n` unassigned accounts for `role`, in table order. All or
    /// nothing.
    pub fn select_unused(&self, n: usize, role: AccountRole) -> AllocatorResult<Vec<Account>> {
        self.select_unused_with(n, role, SelectionOrder::Sequential)
    }

    pub fn select_unused_with(
        &self,
        n: usize,
        role: AccountRole,
        order: SelectionOrder,
    ) -> AllocatorResult<Vec<Account>> {
        if role == AccountRole::Unassigned {
            return Err(AllocatorError::InvalidRole);
        }
        let _guard = self.selection.lock();

        if self.db.account_count() == 0 {
            return Err(AllocatorError::NoAccountsFound);
        }

        let mut candidates = self.db.accounts_filtered(Account::is_unassigned)?;
        if order == SelectionOrder::Random {
            candidates.shuffle(&mut rand::thread_rng());
        }
        let mut claimed = Vec::with_capacity(n);
        for candidate in candidates {
            if claimed.len() == n {
                break;
            }
            let won = self.db.update_account(&candidate.address, |current| {
                current.is_unassigned().then(|| {
                    let mut next = current.clone();
                    next.role = role;
                    next
                })
            })?;
            if let Some(account) = won {
                claimed.push(account);
            }
        }

        if claimed.len() < n {
            let available = claimed.len();
            self.release(&claimed, role)?;
            tracing::warn!(requested = n, available, %role, "account selection rolled back");
            return Err(AllocatorError::InsufficientAccounts {
                requested: n,
                available,
            });
        }

        tracing::debug!(count = n, %role, "accounts selected");
        Ok(claimed)
    }

    fn release(&self, claimed: &[Account], role: AccountRole) -> AllocatorResult<()> {
        for account in claimed {
            self.db.update_account(&account.address, |current| {
                (current.role == role).then(|| {
                    let mut next = current.clone();
                    next.role = AccountRole::Unassigned;
                    next
                })
            })?;
        }
        Ok(())
    }

    /// Assigns a role to one specific account. Roles are assigned exactly
    /// once; a second assignment is rejected.
    pub fn assign_role(&self, address: &Address, role: AccountRole) -> AllocatorResult<Account> {
        if address.is_zero() {
            return Err(AllocatorError::ZeroAddress);
        }
        if role == AccountRole::Unassigned {
            return Err(AllocatorError::InvalidRole);
        }

        let mut existing = None;
        let written = self
            .db
            .update_account(address, |current| {
                if current.is_unassigned() {
                    let mut next = current.clone();
                    next.role = role;
                    Some(next)
                } else {
                    existing = Some(current.role);
                    None
                }
            })
            .map_err(|e| match e {
                DbError::NotFound(_) => AllocatorError::UnknownAccount(*address),
                other => other.into(),
            })?;

        match (written, existing) {
            (Some(account), _) => Ok(account),
            (None, Some(role)) => Err(AllocatorError::RoleAlreadyAssigned {
                address: *address,
                role,
            }),
            (None, None) => Err(AllocatorError::UnknownAccount(*address)),
        }
    }

    /// Records that `address` owns or participates in `contract`.
    pub fn assign_contract(&self, address: &Address, contract: Address) -> AllocatorResult<()> {
        self.db
            .update_account(address, |current| {
                if current.contracts.contains(&contract) {
                    return None;
                }
                let mut next = current.clone();
                next.contracts.push(contract);
                Some(next)
            })
            .map_err(|e| match e {
                DbError::NotFound(_) => AllocatorError::UnknownAccount(*address),
                other => other.into(),
            })?;
        Ok(())
    }

    // -- Snapshots ------------------------------------------------------------

    pub fn get(&self, address: &Address) -> AllocatorResult<Account> {
        if address.is_zero() {
            return Err(AllocatorError::ZeroAddress);
        }
        self.db
            .get_account(address)?
            .ok_or(AllocatorError::UnknownAccount(*address))
    }

    pub fn by_role(&self, role: AccountRole) -> AllocatorResult<Vec<Account>> {
        Ok(self.db.accounts_filtered(|a| a.role == role)?)
    }

    pub fn all(&self) -> AllocatorResult<Vec<Account>> {
        Ok(self.db.accounts()?)
    }

    /// Accounts whose address starts with the given raw bytes.
    pub fn with_prefix(&self, prefix: &[u8]) -> AllocatorResult<Vec<Account>> {
        Ok(self.db.accounts_with_prefix(prefix)?)
    }

    // -- Creation -------------------------------------------------------------

    /// Creates `n` fresh unassigned accounts.
    pub fn generate(&self, n: usize) -> AllocatorResult<Vec<Address>> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let account = Account::new(&AccountKey::generate());
            self.db.put_account(&account)?;
            out.push(account.address);
        }
        tracing::info!(count = n, "accounts generated");
        Ok(out)
    }

    /// Adds an existing key to the table. Importing a key twice keeps the
    /// first row, nonce and role included.
    pub fn import(&self, key: &AccountKey) -> AllocatorResult<Account> {
        let address = key.address();
        if let Some(existing) = self.db.get_account(&address)? {
            return Ok(existing);
        }
        let account = Account::new(key);
        self.db.put_account(&account)?;
        Ok(account)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
