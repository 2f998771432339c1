//! # Primitive Types
//!
//! Addresses, digests and transaction hashes. These are the nouns every
//! other module talks in, so they get careful `Display`/`FromStr`/serde
//! implementations and nothing else.
//!
//! Addresses follow the ledger's convention: the last 20 bytes of a
//! Keccak-256 hash. For accounts the hash input is the public key; for
//! contracts it is the deployer address followed by the deployment nonce.

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::config::ADDRESS_LENGTH;
use crate::crypto::hash::keccak256;

/// A 32-byte content hash identifying a credential document.
pub type Digest = [u8; 32];

/// Hex-encodes a digest with a `0x` prefix, for logs and error messages.
pub fn digest_hex(digest: &Digest) -> String {
    format!("0x{}", hex::encode(digest))
}

/// Parses a hex digest, with or without the `0x` prefix.
pub fn parse_digest(s: &str) -> Result<Digest, ParseError> {
    decode_prefixed::<32>(s)
}

/// Errors parsing hex-encoded primitives.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

fn decode_prefixed<const N: usize>(s: &str) -> Result<[u8; N], ParseError> {
    let trimmed = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(trimmed).map_err(|e| ParseError::InvalidHex(e.to_string()))?;
    if bytes.len() != N {
        return Err(ParseError::InvalidLength {
            expected: N,
            actual: bytes.len(),
        });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A 20-byte ledger address: an account or a deployed contract.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    /// The zero address. Never a valid owner, subject or witness.
    pub const ZERO: Address = Address([0u8; ADDRESS_LENGTH]);

    pub const fn from_bytes(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LENGTH]
    }

    /// Account address: last 20 bytes of `keccak256(public_key)`.
    pub fn from_public_key(public_key: &[u8]) -> Self {
        Self::from_hash(&keccak256(public_key))
    }

    /// Contract address: last 20 bytes of `keccak256(deployer || nonce)`,
    /// nonce big-endian. Deterministic, so a deployer can predict where its
    /// next contract will land.
    pub fn for_contract(deployer: &Address, nonce: u64) -> Self {
        let mut preimage = Vec::with_capacity(ADDRESS_LENGTH + 8);
        preimage.extend_from_slice(&deployer.0);
        preimage.extend_from_slice(&nonce.to_be_bytes());
        Self::from_hash(&keccak256(&preimage))
    }

    fn from_hash(hash: &Digest) -> Self {
        let mut out = [0u8; ADDRESS_LENGTH];
        out.copy_from_slice(&hash[32 - ADDRESS_LENGTH..]);
        Self(out)
    }

    /// Lowercase `0x`-prefixed hex, the same as `Display`.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_prefixed::<ADDRESS_LENGTH>(s).map(Self)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            struct HexVisitor;

            impl<'de> Visitor<'de> for HexVisitor {
                type Value = Address;

                fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                    f.write_str("a 0x-prefixed 20-byte hex address")
                }

                fn visit_str<E: de::Error>(self, v: &str) -> Result<Address, E> {
                    v.parse().map_err(E::custom)
                }
            }

            deserializer.deserialize_str(HexVisitor)
        } else {
            <[u8; ADDRESS_LENGTH]>::deserialize(deserializer).map(Self)
        }
    }
}

// ---------------------------------------------------------------------------
// Transaction Hash
// ---------------------------------------------------------------------------

/// Hash of a signed call, used to poll for its receipt.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHash(pub Digest);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", self)
    }
}

impl FromStr for TxHash {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_prefixed::<32>(s).map(Self)
    }
}
