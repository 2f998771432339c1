//! # Storage Module
//!
//! Local persistence for the parts of credtree that are not on the ledger:
//! the allocator's account table and the driver's records of what it
//! deployed.
//!
//! ```text
//! db.rs       CredDb: sled trees, bincode rows, compare-and-swap updates
//! records.rs  CourseRecord / FacultyRecord
//! ```
//!
//! Credential proofs are not stored here. They live in contract state on the
//! ledger.

pub mod db;
pub mod records;

pub use db::{CredDb, DbError, DbResult};
pub use records::{CourseRecord, FacultyRecord};
