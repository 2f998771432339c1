//! Off-chain records the driver keeps about deployed contracts.
//!
//! The ledger is the source of truth for everything that matters; these
//! records exist so a benchmark run can find its own faculties, courses
//! and enrolled students again without replaying event logs.

use serde::{Deserialize, Serialize};

use crate::primitives::Address;

/// A deployed Course contract and the people attached to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRecord {
    pub address: Address,
    /// Faculty the course was registered under, if any.
    pub faculty: Option<Address>,
    pub evaluators: Vec<Address>,
    pub quorum: usize,
    pub students: Vec<Address>,
    /// Exam names issued in this course, in issuance order.
    pub exams: Vec<String>,
}

impl CourseRecord {
    pub fn is_enrolled(&self, student: &Address) -> bool {
        self.students.contains(student)
    }

    /// Adds `student` unless already present. Returns whether it was added.
    pub fn enroll(&mut self, student: Address) -> bool {
        if self.is_enrolled(&student) {
            return false;
        }
        self.students.push(student);
        true
    }
}

/// A deployed Faculty contract and its registered courses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacultyRecord {
    pub address: Address,
    pub administrators: Vec<Address>,
    pub quorum: usize,
    pub courses: Vec<Address>,
}
