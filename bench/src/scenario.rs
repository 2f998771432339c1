//! Scenario configuration: the shape of the credential tree a run builds.

use serde::{Deserialize, Serialize};
use std::path::Path;

use credtree_protocol::accounts::SelectionOrder;

/// Sizes are per parent: `courses` and `students` per faculty, `evaluators`
/// per course, `exams` per student per course. A faculty's students are
/// enrolled in every one of its courses, so each diploma is witnessed by all
/// of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub total_accounts: usize,
    pub account_distribution: SelectionOrder,
    pub faculties: usize,
    pub faculty_members: usize,
    pub courses: usize,
    pub evaluators: usize,
    pub exams: usize,
    pub students: usize,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            total_accounts: 100,
            account_distribution: SelectionOrder::Sequential,
            faculties: 1,
            faculty_members: 1,
            courses: 3,
            evaluators: 1,
            exams: 2,
            students: 20,
        }
    }
}

impl ScenarioConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Accounts the tree consumes: every administrator, evaluator and
    /// student gets its own account.
    pub fn required_accounts(&self) -> usize {
        self.faculties * (self.faculty_members + self.courses * self.evaluators + self.students)
    }

    /// Credentials issued: exams, then one diploma per student.
    pub fn credentials(&self) -> usize {
        self.faculties * self.students * (self.courses * self.exams + 1)
    }

    /// Number of contracts deployed.
    pub fn contracts(&self) -> usize {
        self.faculties * (1 + self.courses)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.faculty_members == 0 {
            return Err("a faculty needs at least one member".into());
        }
        if self.courses > 0 && self.evaluators == 0 {
            return Err("a course needs at least one evaluator".into());
        }
        if self.students > 0 && self.exams == 0 {
            return Err("students need at least one exam to graduate".into());
        }
        let required = self.required_accounts();
        if required > self.total_accounts {
            return Err(format!(
                "scenario needs {required} accounts but total_accounts is {}",
                self.total_accounts
            ));
        }
        Ok(())
    }
}
