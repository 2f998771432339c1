//! # Transaction Metrics
//!
//! Prometheus handles for the lifecycle manager. Registered into a registry
//! owned by the caller so a binary can expose them next to its own metrics.

use prometheus::{Histogram, HistogramOpts, IntCounter, Registry};

/// Counters and latency histogram for submitted transactions.
#[derive(Clone)]
pub struct TxMetrics {
    pub submitted_total: IntCounter,
    pub confirmed_total: IntCounter,
    pub reverted_total: IntCounter,
    pub timed_out_total: IntCounter,
    pub gas_used_total: IntCounter,
    /// Seconds from submission to receipt.
    pub confirmation_latency_seconds: Histogram,
}

impl TxMetrics {
    /// Creates all metrics and registers them into `registry`.
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let submitted_total =
            IntCounter::new("tx_submitted_total", "Transactions accepted into the pending pool")?;
        registry.register(Box::new(submitted_total.clone()))?;

        let confirmed_total =
            IntCounter::new("tx_confirmed_total", "Transactions mined with success status")?;
        registry.register(Box::new(confirmed_total.clone()))?;

        let reverted_total =
            IntCounter::new("tx_reverted_total", "Transactions mined with reverted status")?;
        registry.register(Box::new(reverted_total.clone()))?;

        let timed_out_total = IntCounter::new(
            "tx_timed_out_total",
            "Transactions whose receipt did not appear before the timeout",
        )?;
        registry.register(Box::new(timed_out_total.clone()))?;

        let gas_used_total = IntCounter::new("tx_gas_used_total", "Gas used by mined transactions")?;
        registry.register(Box::new(gas_used_total.clone()))?;

        let confirmation_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "tx_confirmation_latency_seconds",
                "Time from submission to receipt in seconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
        )?;
        registry.register(Box::new(confirmation_latency_seconds.clone()))?;

        Ok(Self {
            submitted_total,
            confirmed_total,
            reverted_total,
            timed_out_total,
            gas_used_total,
            confirmation_latency_seconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_once_per_registry() {
        let registry = Registry::new();
        let metrics = TxMetrics::new(&registry).unwrap();
        metrics.submitted_total.inc();
        assert_eq!(metrics.submitted_total.get(), 1);
        assert!(TxMetrics::new(&registry).is_err());
    }
}
