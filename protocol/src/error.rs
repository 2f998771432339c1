//! # Error Classes
//!
//! Every error in the crate belongs to one of five classes. The class decides
//! what a caller is allowed to do next: policy and integrity violations are
//! real negative answers and must be reported verbatim, infrastructure
//! failures may be retried with backoff, and resource exhaustion means the
//! caller asked for more than exists.

use std::fmt;

/// Coarse classification shared by all error types in the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// A credential, root, contract or account does not exist.
    NotFound,
    /// The request is well-formed but the policy says no (wrong subject,
    /// not approved, not quorum-signed, not an owner).
    PolicyViolation,
    /// The stored evidence contradicts itself (wrong root, revoked, cycle).
    IntegrityViolation,
    /// Not enough unused accounts to satisfy a selection.
    ResourceExhaustion,
    /// Ledger unavailable, timeout, reverted transaction.
    Infrastructure,
}

impl ErrorClass {
    /// Only infrastructure failures are worth retrying. Everything else is
    /// an answer, not an accident.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorClass::Infrastructure)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorClass::NotFound => "not-found",
            ErrorClass::PolicyViolation => "policy-violation",
            ErrorClass::IntegrityViolation => "integrity-violation",
            ErrorClass::ResourceExhaustion => "resource-exhaustion",
            ErrorClass::Infrastructure => "infrastructure",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_infrastructure_is_retryable() {
        assert!(ErrorClass::Infrastructure.is_retryable());
        for class in [
            ErrorClass::NotFound,
            ErrorClass::PolicyViolation,
            ErrorClass::IntegrityViolation,
            ErrorClass::ResourceExhaustion,
        ] {
            assert!(!class.is_retryable(), "{class} must not be retried");
        }
    }

    #[test]
    fn display_is_kebab_case() {
        assert_eq!(ErrorClass::PolicyViolation.to_string(), "policy-violation");
    }
}
