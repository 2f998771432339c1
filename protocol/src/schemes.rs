//! # Credential Documents
//!
//! The off-ledger documents whose digests get notarized. The ledger never
//! sees these; it sees `sha256(bincode(document))`, and anyone holding the
//! document can recompute that digest and ask a node whether it was issued.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::hash::sha256;
use crate::primitives::{Address, Digest};

/// An exam result issued by a course's evaluators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamCredential {
    pub course: Address,
    pub subject: Address,
    pub exam: String,
    pub grade: u8,
    pub issued_at: DateTime<Utc>,
}

/// A course completion, backed by the course's aggregated exam root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseCredential {
    pub course: Address,
    pub subject: Address,
    pub final_grade: u8,
    pub issued_at: DateTime<Utc>,
}

/// A diploma issued by a faculty, witnessed by the courses it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiplomaCredential {
    pub faculty: Address,
    pub subject: Address,
    pub degree: String,
    pub courses: Vec<Address>,
    pub issued_at: DateTime<Utc>,
}

/// Errors computing a document digest.
#[derive(Debug, thiserror::Error)]
pub enum SchemeError {
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Content digest of a credential document: SHA-256 over its bincode form.
pub fn document_digest<T: Serialize>(document: &T) -> Result<Digest, SchemeError> {
    let bytes =
        bincode::serialize(document).map_err(|e| SchemeError::Serialization(e.to_string()))?;
    Ok(sha256(&bytes))
}
