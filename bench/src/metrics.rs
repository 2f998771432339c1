//! # Benchmark Metrics
//!
//! Two views of the same run:
//!
//! - [`LatencyStats`] / [`BenchmarkResult`]: the summary printed in the run
//!   report. Latencies are folded with Welford's online algorithm, and
//!   per-worker accumulators are combined with the parallel variant, so no
//!   sample list is ever kept.
//! - [`BenchMetrics`]: a Prometheus registry holding the transactor's
//!   metrics plus verification counters, written out in text exposition
//!   format when `--metrics-out` is given.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use serde::Serialize;
use std::time::Duration;

use credtree_protocol::transaction::TxMetrics;
use credtree_protocol::tree::VerificationMode;

// ---------------------------------------------------------------------------
// Latency statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LatencyStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl LatencyStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one sample, in seconds.
    pub fn add(&mut self, sample: f64) {
        self.count += 1;
        let delta = sample - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (sample - self.mean);
    }

    pub fn add_duration(&mut self, elapsed: Duration) {
        self.add(elapsed.as_secs_f64());
    }

    /// Folds `other` into `self` as if its samples had been added here.
    pub fn merge(&mut self, other: &LatencyStats) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        let count = self.count + other.count;
        let delta = other.mean - self.mean;
        let mean = self.mean + delta * other.count as f64 / count as f64;
        let m2 = self.m2
            + other.m2
            + delta * delta * (self.count as f64 * other.count as f64) / count as f64;
        self.count = count;
        self.mean = mean;
        self.m2 = m2;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance. Zero with fewer than two samples.
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }
}

/// Issuance summary of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkResult {
    pub total_ops: u64,
    pub total_gas: u64,
    /// Operations per second of wall-clock time.
    pub throughput: f64,
    /// Seconds.
    pub latency_avg: f64,
    /// Seconds squared.
    pub latency_var: f64,
}

impl BenchmarkResult {
    pub fn new(stats: &LatencyStats, total_gas: u64, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        let throughput = if secs > 0.0 {
            stats.count() as f64 / secs
        } else {
            0.0
        };
        Self {
            total_ops: stats.count(),
            total_gas,
            throughput,
            latency_avg: stats.mean(),
            latency_var: stats.variance(),
        }
    }
}

// ---------------------------------------------------------------------------
// Prometheus
// ---------------------------------------------------------------------------

/// Registry and handles for one benchmark run.
#[derive(Clone)]
pub struct BenchMetrics {
    registry: Registry,
    pub tx: TxMetrics,
    /// Labelled by `mode` and `outcome` (`accepted` / `rejected`).
    pub verifications_total: IntCounterVec,
    pub verification_latency_seconds: HistogramVec,
    /// Subjects for which the two modes reached different decisions.
    pub mode_disagreements_total: IntCounter,
}

impl BenchMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("credtree".into()), None)?;
        let tx = TxMetrics::new(&registry)?;

        let verifications_total = IntCounterVec::new(
            Opts::new("verifications_total", "Tree verifications by mode and outcome"),
            &["mode", "outcome"],
        )?;
        registry.register(Box::new(verifications_total.clone()))?;

        let verification_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "verification_latency_seconds",
                "Latency of one full tree verification in seconds",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            &["mode"],
        )?;
        registry.register(Box::new(verification_latency_seconds.clone()))?;

        let mode_disagreements_total = IntCounter::new(
            "mode_disagreements_total",
            "Subjects on which on-chain and off-chain verification disagreed",
        )?;
        registry.register(Box::new(mode_disagreements_total.clone()))?;

        Ok(Self {
            registry,
            tx,
            verifications_total,
            verification_latency_seconds,
            mode_disagreements_total,
        })
    }

    pub fn observe_verification(&self, mode: VerificationMode, accepted: bool, elapsed: Duration) {
        let mode = mode.to_string();
        let outcome = if accepted { "accepted" } else { "rejected" };
        self.verifications_total
            .with_label_values(&[mode.as_str(), outcome])
            .inc();
        self.verification_latency_seconds
            .with_label_values(&[mode.as_str()])
            .observe(elapsed.as_secs_f64());
    }

    /// Encodes all registered metrics in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
