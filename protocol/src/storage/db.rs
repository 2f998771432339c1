//! # CredDb: Persistent Storage Engine
//!
//! The persistence layer for allocator accounts and driver records, built on
//! sled's embedded key-value store.
//!
//! ## Tree Layout
//!
//! | Tree        | Key                 | Value                   |
//! |-------------|---------------------|-------------------------|
//! | `accounts`  | `address` (20B)     | `bincode(Account)`      |
//! | `courses`   | `address` (20B)     | `bincode(CourseRecord)` |
//! | `faculties` | `address` (20B)     | `bincode(FacultyRecord)`|
//! | `metadata`  | key (UTF-8)         | bytes, or `bincode(T)`  |
//!
//! Keys are raw address bytes, so a prefix scan over `accounts` is a range
//! scan in sled and costs nothing extra.
//!
//! ## Atomicity
//!
//! Every read-modify-write on an account goes through
//! [`CredDb::update_account`], a compare-and-swap loop. Two writers racing
//! on the same row never both win; the loser re-reads and re-decides.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{CompareAndSwapError, Db, Tree};
use std::path::Path;

use super::records::{CourseRecord, FacultyRecord};
use crate::accounts::Account;
use crate::error::ErrorClass;
use crate::primitives::Address;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("key not found: {0}")]
    NotFound(String),
}

impl DbError {
    pub fn class(&self) -> ErrorClass {
        match self {
            DbError::NotFound(_) => ErrorClass::NotFound,
            _ => ErrorClass::Infrastructure,
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

fn encode<T: Serialize>(value: &T) -> DbResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| DbError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> DbResult<T> {
    bincode::deserialize(bytes).map_err(|e| DbError::Serialization(e.to_string()))
}

// ---------------------------------------------------------------------------
// CredDb
// ---------------------------------------------------------------------------

/// Persistent storage for accounts, course and faculty records.
///
/// Cheap to clone: every clone shares the same sled handle.
#[derive(Debug, Clone)]
pub struct CredDb {
    db: Db,
    accounts: Tree,
    courses: Tree,
    faculties: Tree,
    metadata: Tree,
}

impl CredDb {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database removed when the last handle drops.
    pub fn open_temporary() -> DbResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let accounts = db.open_tree("accounts")?;
        let courses = db.open_tree("courses")?;
        let faculties = db.open_tree("faculties")?;
        let metadata = db.open_tree("metadata")?;

        Ok(Self {
            db,
            accounts,
            courses,
            faculties,
            metadata,
        })
    }

    // -- Account operations -------------------------------------------------

    pub fn put_account(&self, account: &Account) -> DbResult<()> {
        self.accounts
            .insert(account.address.as_bytes(), encode(account)?)?;
        Ok(())
    }

    pub fn get_account(&self, address: &Address) -> DbResult<Option<Account>> {
        match self.accounts.get(address.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Removes an account. Returns whether it existed.
    pub fn delete_account(&self, address: &Address) -> DbResult<bool> {
        Ok(self.accounts.remove(address.as_bytes())?.is_some())
    }

    /// All accounts, in address order.
    pub fn accounts(&self) -> DbResult<Vec<Account>> {
        self.accounts_filtered(|_| true)
    }

    /// Accounts matching `filter`, in address order.
    pub fn accounts_filtered<F>(&self, filter: F) -> DbResult<Vec<Account>>
    where
        F: Fn(&Account) -> bool,
    {
        let mut out = Vec::new();
        for item in self.accounts.iter() {
            let (_key, value) = item?;
            let account: Account = decode(&value)?;
            if filter(&account) {
                out.push(account);
            }
        }
        Ok(out)
    }

    /// Accounts whose raw address bytes start with `prefix`.
    pub fn accounts_with_prefix(&self, prefix: &[u8]) -> DbResult<Vec<Account>> {
        let mut out = Vec::new();
        for item in self.accounts.scan_prefix(prefix) {
            let (_key, value) = item?;
            out.push(decode(&value)?);
        }
        Ok(out)
    }

    /// Atomic read-modify-write of one account.
    ///
    /// `f` sees the current row and returns the replacement, or `None` to
    /// leave the row untouched. If another writer changes the row between
    /// the read and the write, `f` runs again on the fresh value. Returns
    /// the written account, or `None` if `f` declined.
    pub fn update_account<F>(&self, address: &Address, mut f: F) -> DbResult<Option<Account>>
    where
        F: FnMut(&Account) -> Option<Account>,
    {
        let key = address.as_bytes();
        loop {
            let current_bytes = self
                .accounts
                .get(key)?
                .ok_or_else(|| DbError::NotFound(address.to_hex()))?;
            let current: Account = decode(&current_bytes)?;

            let Some(updated) = f(&current) else {
                return Ok(None);
            };
            let updated_bytes = encode(&updated)?;

            match self
                .accounts
                .compare_and_swap(key, Some(current_bytes), Some(updated_bytes))?
            {
                Ok(()) => return Ok(Some(updated)),
                Err(CompareAndSwapError { .. }) => {
                    tracing::trace!(address = %address, "account row changed underneath, retrying");
                }
            }
        }
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    // -- Course and faculty records -----------------------------------------

    pub fn put_course(&self, course: &CourseRecord) -> DbResult<()> {
        self.courses.insert(course.address.as_bytes(), encode(course)?)?;
        Ok(())
    }

    pub fn get_course(&self, address: &Address) -> DbResult<Option<CourseRecord>> {
        match self.courses.get(address.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn courses(&self) -> DbResult<Vec<CourseRecord>> {
        self.courses
            .iter()
            .map(|item| decode(&item?.1))
            .collect()
    }

    pub fn put_faculty(&self, faculty: &FacultyRecord) -> DbResult<()> {
        self.faculties
            .insert(faculty.address.as_bytes(), encode(faculty)?)?;
        Ok(())
    }

    pub fn get_faculty(&self, address: &Address) -> DbResult<Option<FacultyRecord>> {
        match self.faculties.get(address.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn faculties(&self) -> DbResult<Vec<FacultyRecord>> {
        self.faculties
            .iter()
            .map(|item| decode(&item?.1))
            .collect()
    }

    // -- Metadata operations ------------------------------------------------

    pub fn put_metadata(&self, key: &str, value: &[u8]) -> DbResult<()> {
        self.metadata.insert(key.as_bytes(), value)?;
        Ok(())
    }

    pub fn get_metadata(&self, key: &str) -> DbResult<Option<Vec<u8>>> {
        Ok(self.metadata.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    /// Stores any serializable value under `key` in the metadata tree.
    pub fn put_metadata_record<T: Serialize>(&self, key: &str, value: &T) -> DbResult<()> {
        self.put_metadata(key, &encode(value)?)
    }

    pub fn get_metadata_record<T: DeserializeOwned>(&self, key: &str) -> DbResult<Option<T>> {
        match self.metadata.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Force a flush of all pending writes to disk.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::AccountRole;
    use crate::crypto::AccountKey;

    // -- Helpers ------------------------------------------------------------

    fn fresh_account() -> Account {
        Account::new(&AccountKey::generate())
    }

    fn course(address: Address) -> CourseRecord {
        CourseRecord {
            address,
            faculty: None,
            evaluators: vec![],
            quorum: 1,
            students: vec![],
            exams: vec![],
        }
    }

    // -- Tests --------------------------------------------------------------

    #[test]
    fn open_temporary_database() {
        let db = CredDb::open_temporary().expect("should create temp db");
        assert_eq!(db.account_count(), 0);
        assert!(db.courses().unwrap().is_empty());
    }

    #[test]
    fn accounts_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let account = fresh_account();
        {
            let db = CredDb::open(dir.path()).expect("should open db");
            db.put_account(&account).unwrap();
            db.flush().unwrap();
        }
        let db = CredDb::open(dir.path()).expect("should reopen db");
        let loaded = db.get_account(&account.address).unwrap().expect("persisted");
        assert_eq!(loaded, account);
    }

    #[test]
    fn missing_account_is_none() {
        let db = CredDb::open_temporary().unwrap();
        assert!(db.get_account(&Address::from_bytes([9; 20])).unwrap().is_none());
    }

    #[test]
    fn delete_reports_existence() {
        let db = CredDb::open_temporary().unwrap();
        let account = fresh_account();
        db.put_account(&account).unwrap();
        assert!(db.delete_account(&account.address).unwrap());
        assert!(!db.delete_account(&account.address).unwrap());
    }

    #[test]
    fn filtered_scan_by_role() {
        let db = CredDb::open_temporary().unwrap();
        for i in 0..6 {
            let mut account = fresh_account();
            if i % 2 == 0 {
                account.role = AccountRole::Student;
            }
            db.put_account(&account).unwrap();
        }
        let students = db
            .accounts_filtered(|a| a.role == AccountRole::Student)
            .unwrap();
        assert_eq!(students.len(), 3);
        assert_eq!(db.accounts().unwrap().len(), 6);
    }

    #[test]
    fn prefix_scan_matches_leading_bytes() {
        let db = CredDb::open_temporary().unwrap();
        let accounts: Vec<Account> = (0..16).map(|_| fresh_account()).collect();
        for a in &accounts {
            db.put_account(a).unwrap();
        }
        let first_byte = accounts[0].address.as_bytes()[0];
        let expected = accounts
            .iter()
            .filter(|a| a.address.as_bytes()[0] == first_byte)
            .count();
        let found = db.accounts_with_prefix(&[first_byte]).unwrap();
        assert_eq!(found.len(), expected);
        assert!(found.iter().all(|a| a.address.as_bytes()[0] == first_byte));
    }

    #[test]
    fn update_account_applies_and_declines() {
        let db = CredDb::open_temporary().unwrap();
        let account = fresh_account();
        db.put_account(&account).unwrap();

        let updated = db
            .update_account(&account.address, |a| {
                let mut next = a.clone();
                next.nonce += 5;
                Some(next)
            })
            .unwrap()
            .expect("written");
        assert_eq!(updated.nonce, 5);

        let declined = db.update_account(&account.address, |_| None).unwrap();
        assert!(declined.is_none());
        assert_eq!(db.get_account(&account.address).unwrap().unwrap().nonce, 5);
    }

    #[test]
    fn update_missing_account_is_not_found() {
        let db = CredDb::open_temporary().unwrap();
        let err = db
            .update_account(&Address::from_bytes([1; 20]), |a| Some(a.clone()))
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
        assert_eq!(err.class(), ErrorClass::NotFound);
    }

    #[test]
    fn concurrent_updates_do_not_lose_writes() {
        let db = CredDb::open_temporary().unwrap();
        let account = fresh_account();
        db.put_account(&account).unwrap();

        std::thread::scope(|s| {
            for _ in 0..8 {
                let db = db.clone();
                let address = account.address;
                s.spawn(move || {
                    for _ in 0..25 {
                        db.update_account(&address, |a| {
                            let mut next = a.clone();
                            next.nonce += 1;
                            Some(next)
                        })
                        .unwrap();
                    }
                });
            }
        });

        assert_eq!(db.get_account(&account.address).unwrap().unwrap().nonce, 200);
    }

    #[test]
    fn course_and_faculty_records_round_trip() {
        let db = CredDb::open_temporary().unwrap();
        let mut record = course(Address::from_bytes([3; 20]));
        assert!(record.enroll(Address::from_bytes([4; 20])));
        assert!(!record.enroll(Address::from_bytes([4; 20])));
        db.put_course(&record).unwrap();

        let faculty = FacultyRecord {
            address: Address::from_bytes([5; 20]),
            administrators: vec![Address::from_bytes([6; 20])],
            quorum: 1,
            courses: vec![record.address],
        };
        db.put_faculty(&faculty).unwrap();

        assert_eq!(db.get_course(&record.address).unwrap(), Some(record));
        assert_eq!(db.faculties().unwrap(), vec![faculty]);
    }

    #[test]
    fn metadata_round_trip() {
        let db = CredDb::open_temporary().unwrap();
        assert!(db.get_metadata("scenario").unwrap().is_none());
        db.put_metadata("scenario", b"{}").unwrap();
        assert_eq!(db.get_metadata("scenario").unwrap().as_deref(), Some(&b"{}"[..]));
    }

    #[test]
    fn metadata_records_are_bincode() {
        let db = CredDb::open_temporary().unwrap();
        let owners = vec![Address::from_bytes([1; 20]), Address::from_bytes([2; 20])];
        assert_eq!(db.get_metadata_record::<Vec<Address>>("owners").unwrap(), None);

        db.put_metadata_record("owners", &owners).unwrap();
        assert_eq!(db.get_metadata_record::<Vec<Address>>("owners").unwrap(), Some(owners));

        db.put_metadata("owners", b"\x01").unwrap();
        assert!(matches!(
            db.get_metadata_record::<Vec<Address>>("owners"),
            Err(DbError::Serialization(_))
        ));
    }
}
