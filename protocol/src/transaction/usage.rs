//! Per-call gas usage records.

use parking_lot::Mutex;
use serde::Serialize;

use crate::primitives::Address;

/// Gas spent by one mined call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageMetric {
    /// Target contract; `None` for deployments.
    pub contract: Option<Address>,
    pub sender: Address,
    /// Set for the methods whose cost is attributed per subject.
    pub subject: Option<Address>,
    pub method: &'static str,
    pub gas_used: u64,
    pub reverted: bool,
}

/// Append-only, shareable collection of [`UsageMetric`]s.
#[derive(Debug, Default)]
pub struct UsageLog {
    entries: Mutex<Vec<UsageMetric>>,
}

impl UsageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, metric: UsageMetric) {
        self.entries.lock().push(metric);
    }

    pub fn snapshot(&self) -> Vec<UsageMetric> {
        self.entries.lock().clone()
    }

    pub fn total_gas(&self) -> u64 {
        self.entries.lock().iter().map(|m| m.gas_used).sum()
    }

    /// Total gas per method name.
    pub fn gas_by_method(&self) -> Vec<(&'static str, u64)> {
        let mut totals: Vec<(&'static str, u64)> = Vec::new();
        for m in self.entries.lock().iter() {
            match totals.iter_mut().find(|(name, _)| *name == m.method) {
                Some((_, gas)) => *gas += m.gas_used,
                None => totals.push((m.method, m.gas_used)),
            }
        }
        totals
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(method: &'static str, gas: u64) -> UsageMetric {
        UsageMetric {
            contract: None,
            sender: Address::from_bytes([1; 20]),
            subject: None,
            method,
            gas_used: gas,
            reverted: false,
        }
    }

    #[test]
    fn totals_by_method_keep_first_seen_order() {
        let log = UsageLog::new();
        log.record(metric("registerCredential", 100));
        log.record(metric("approveCredential", 40));
        log.record(metric("registerCredential", 60));

        assert_eq!(log.total_gas(), 200);
        assert_eq!(
            log.gas_by_method(),
            vec![("registerCredential", 160), ("approveCredential", 40)]
        );
        assert_eq!(log.len(), 3);
    }
}
