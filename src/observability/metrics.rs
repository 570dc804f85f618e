//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `cluster_encryption_reconciliations_total` - Total number of reconciliations
//! - `cluster_encryption_reconciliation_errors_total{kind}` - Reconciliation errors by error kind
//! - `cluster_encryption_reconciliation_duration_seconds` - Duration of reconciliations
//! - `cluster_encryption_phase_transitions_total{phase}` - Phase changes by target phase
//! - `cluster_encryption_jobs_created_total` - Re-encryption jobs created
//! - `cluster_encryption_job_outcomes_total{result}` - Observed terminal job outcomes
//! - `cluster_encryption_requeues_total{reason}` - Requeues scheduled by the error policy

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "cluster_encryption_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "cluster_encryption_reconciliation_errors_total",
            "Total number of reconciliation errors",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "cluster_encryption_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static PHASE_TRANSITIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "cluster_encryption_phase_transitions_total",
            "Total number of encryption phase transitions by target phase",
        ),
        &["phase"],
    )
    .expect("Failed to create PHASE_TRANSITIONS_TOTAL metric - this should never happen")
});

static JOBS_CREATED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "cluster_encryption_jobs_created_total",
        "Total number of re-encryption jobs created",
    )
    .expect("Failed to create JOBS_CREATED_TOTAL metric - this should never happen")
});

static JOB_OUTCOMES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "cluster_encryption_job_outcomes_total",
            "Total number of observed re-encryption job outcomes",
        ),
        &["result"],
    )
    .expect("Failed to create JOB_OUTCOMES_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "cluster_encryption_requeues_total",
            "Total number of requeues scheduled by the error policy",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

/// Register all metrics with the process registry
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(PHASE_TRANSITIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(JOBS_CREATED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(JOB_OUTCOMES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors(kind: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn observe_reconciliation_duration(duration_secs: f64) {
    RECONCILIATION_DURATION.observe(duration_secs);
}

pub fn increment_phase_transitions(phase: &str) {
    PHASE_TRANSITIONS_TOTAL.with_label_values(&[phase]).inc();
}

pub fn increment_jobs_created() {
    JOBS_CREATED_TOTAL.inc();
}

pub fn increment_job_outcomes(result: &str) {
    JOB_OUTCOMES_TOTAL.with_label_values(&[result]).inc();
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics() {
        assert!(register_metrics().is_ok());
    }

    #[test]
    fn test_increment_reconciliations() {
        let before = RECONCILIATIONS_TOTAL.get();
        increment_reconciliations();
        assert!(RECONCILIATIONS_TOTAL.get() > before);
    }

    #[test]
    fn test_errors_are_labelled_by_kind() {
        let before = RECONCILIATION_ERRORS_TOTAL
            .with_label_values(&["validation"])
            .get();
        increment_reconciliation_errors("validation");
        let after = RECONCILIATION_ERRORS_TOTAL
            .with_label_values(&["validation"])
            .get();
        assert!(after > before);
    }

    #[test]
    fn test_observe_reconciliation_duration() {
        observe_reconciliation_duration(0.25);
    }

    #[test]
    fn test_job_outcomes_are_labelled() {
        let before = JOB_OUTCOMES_TOTAL.with_label_values(&["failed"]).get();
        increment_job_outcomes("failed");
        assert!(JOB_OUTCOMES_TOTAL.with_label_values(&["failed"]).get() > before);
    }
}
