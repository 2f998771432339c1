//! # Account Keys
//!
//! Ed25519 signing keys for the identities that submit calls to the ledger.
//! An account's address is derived from its public key (see
//! [`Address::from_public_key`]), so a key and its address can never drift
//! apart.
//!
//! Key bytes are never logged. `AccountKey`'s `Debug` impl prints the address
//! and nothing else; if you need the secret, ask for it by name with
//! [`AccountKey::secret_bytes`].

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey, SECRET_KEY_LENGTH};
use rand::rngs::OsRng;
use std::fmt;

use crate::primitives::Address;

/// Errors that can occur while loading keys or checking signatures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("invalid secret key bytes")]
    InvalidSecretKey,

    #[error("invalid public key bytes")]
    InvalidPublicKey,

    #[error("invalid signature")]
    InvalidSignature,
}

/// The signing identity of one ledger account.
///
/// Intentionally not `Serialize`: persisting a key is done explicitly via
/// [`secret_bytes`](Self::secret_bytes).
#[derive(Clone)]
pub struct AccountKey {
    signing_key: SigningKey,
}

impl AccountKey {
    /// Generates a fresh key from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Rebuilds a key from its 32 secret bytes.
    pub fn from_bytes(secret: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(secret),
        }
    }

    /// Rebuilds a key from hex (with or without `0x`).
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(trimmed).map_err(|_| KeyError::InvalidSecretKey)?;
        let secret: [u8; SECRET_KEY_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self::from_bytes(&secret))
    }

    pub fn secret_bytes(&self) -> [u8; SECRET_KEY_LENGTH] {
        self.signing_key.to_bytes()
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn address(&self) -> Address {
        Address::from_public_key(&self.public_key_bytes())
    }

    /// Signs `message`, returning the 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }

    /// Verifies `signature` over `message` against a raw public key.
    pub fn verify(public_key: &[u8; 32], message: &[u8], signature: &[u8]) -> Result<(), KeyError> {
        let key = VerifyingKey::from_bytes(public_key).map_err(|_| KeyError::InvalidPublicKey)?;
        let sig = Signature::from_slice(signature).map_err(|_| KeyError::InvalidSignature)?;
        key.verify(message, &sig)
            .map_err(|_| KeyError::InvalidSignature)
    }
}

impl fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountKey")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}
