//! Ready-to-sign transaction context.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::crypto::keys::AccountKey;
use crate::ledger::{CallRequest, ContractCall};
use crate::primitives::Address;

/// Everything needed to sign exactly one call. The nonce in here has been
/// reserved for this context alone; using it twice is a bug, and dropping
/// it unused leaves a gap the allocator has to resync. While the context is
/// alive and not yet submitted, a resync never hands its nonce out again.
///
/// `Debug` shows the signer's address, never the key.
#[derive(Debug, Clone)]
pub struct TxContext {
    pub from: Address,
    pub key: AccountKey,
    pub nonce: u64,
    pub fee_price: u64,
    pub gas_limit: u64,
    pub chain_id: u64,
    pub(crate) reservation: Reservation,
}

impl TxContext {
    /// Builds the unsigned request for `call` sent to `to` (`None` deploys).
    pub fn request(&self, to: Option<Address>, call: ContractCall) -> CallRequest {
        CallRequest {
            from: self.from,
            to,
            nonce: self.nonce,
            fee_price: self.fee_price,
            gas_limit: self.gas_limit,
            chain_id: self.chain_id,
            call,
        }
    }
}

/// Whether a reserved nonce has been offered to the ledger. Shared by a
/// context and its clones; the allocator only keeps a weak reference, so a
/// dropped context stops counting as outstanding.
#[derive(Debug, Clone, Default)]
pub(crate) struct Reservation(Arc<AtomicBool>);

impl Reservation {
    /// Marks the nonce as offered. Called once the call is handed to the
    /// ledger, whatever the ledger answers.
    pub(crate) fn settle(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub(crate) fn watch(&self) -> ReservationWatch {
        ReservationWatch(Arc::downgrade(&self.0))
    }
}

/// The allocator's view of a [`Reservation`].
#[derive(Debug, Clone)]
pub(crate) struct ReservationWatch(Weak<AtomicBool>);

impl ReservationWatch {
    /// Reserved, still held by someone, and not yet offered to the ledger.
    pub(crate) fn is_outstanding(&self) -> bool {
        self.0
            .upgrade()
            .map(|settled| !settled.load(Ordering::Acquire))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_copies_context_fields() {
        let key = AccountKey::generate();
        let ctx = TxContext {
            from: key.address(),
            key: key.clone(),
            nonce: 12,
            fee_price: 7,
            gas_limit: 21_000,
            chain_id: 1337,
            reservation: Reservation::default(),
        };
        let req = ctx.request(None, ContractCall::AddChild { child: Address::ZERO });
        assert_eq!(req.from, key.address());
        assert_eq!(req.nonce, 12);
        assert_eq!(req.to, None);

        let dbg = format!("{:?}", ctx);
        assert!(!dbg.contains(&hex::encode(key.secret_bytes())));
    }

    #[test]
    fn reservation_is_outstanding_until_settled_or_dropped() {
        let reservation = Reservation::default();
        let watch = reservation.watch();
        assert!(watch.is_outstanding());

        let clone = reservation.clone();
        clone.settle();
        assert!(!watch.is_outstanding());

        let dropped = Reservation::default();
        let watch = dropped.watch();
        drop(dropped);
        assert!(!watch.is_outstanding());
    }
}
