//! Prometheus metrics instrumentation for regatta.
//!
//! This module provides Prometheus metrics for monitoring speculative job
//! scheduling. All metrics are conditionally compiled behind the `metrics`
//! feature flag.
//!
//! # Metrics
//!
//! ## Counters
//! - `regatta_jobs_submitted_total` - Total number of jobs submitted
//! - `regatta_jobs_completed_total` - Total number of jobs completed (success + failure)
//! - `regatta_probes_dispatched_total` - Total number of probe dispatches per lane
//! - `regatta_cancellations_total` - Total number of probes revoked by short-circuits
//! - `regatta_artifact_transfers_total` - Total number of artifact uploads and downloads
//!
//! ## Gauges
//! - `regatta_active_jobs` - Jobs currently in the active set
//!
//! ## Histograms
//! - `regatta_job_duration_seconds` - Submission-to-terminal duration in seconds
//! - `regatta_completion_wait_seconds` - Consumer wait for completion signals
#![cfg(feature = "metrics")]

use prometheus::{CounterVec, GaugeVec, HistogramVec, Opts, Registry, exponential_buckets};
use std::sync::LazyLock;

/// Global Prometheus registry for regatta metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Counter for total jobs submitted.
///
/// Labels:
/// - `tenant`: The submitting tenant
/// - `job_kind`: The job kind (train, predict)
pub static JOBS_SUBMITTED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "regatta_jobs_submitted_total",
        "Total number of jobs submitted",
    );
    CounterVec::new(opts, &["tenant", "job_kind"])
        .expect("regatta_jobs_submitted_total metric creation failed")
});

/// Counter for total jobs completed (success or failure).
///
/// Labels:
/// - `tenant`: The submitting tenant
/// - `job_kind`: The job kind (train, predict)
/// - `status`: The terminal status (success, failure)
pub static JOBS_COMPLETED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "regatta_jobs_completed_total",
        "Total number of jobs completed",
    );
    CounterVec::new(opts, &["tenant", "job_kind", "status"])
        .expect("regatta_jobs_completed_total metric creation failed")
});

/// Counter for total probe dispatches.
///
/// Labels:
/// - `method`: The candidate method name
/// - `lane`: The execution lane the task landed on (gpu, cpu)
pub static PROBES_DISPATCHED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "regatta_probes_dispatched_total",
        "Total number of probe dispatches",
    );
    CounterVec::new(opts, &["method", "lane"])
        .expect("regatta_probes_dispatched_total metric creation failed")
});

/// Counter for probes revoked because another probe scored perfectly.
///
/// Labels:
/// - `method`: The cancelled candidate's method name
pub static CANCELLATIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "regatta_cancellations_total",
        "Total number of probes revoked by race short-circuits",
    );
    CounterVec::new(opts, &["method"])
        .expect("regatta_cancellations_total metric creation failed")
});

/// Counter for artifact uploads and downloads.
///
/// Labels:
/// - `direction`: upload or download
/// - `outcome`: ok or error
pub static ARTIFACT_TRANSFERS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        "regatta_artifact_transfers_total",
        "Total number of artifact transfers",
    );
    CounterVec::new(opts, &["direction", "outcome"])
        .expect("regatta_artifact_transfers_total metric creation failed")
});

/// Gauge for jobs currently in the active set.
///
/// Labels:
/// - `job_kind`: The job kind (train, predict)
pub static ACTIVE_JOBS: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new("regatta_active_jobs", "Jobs currently in the active set");
    GaugeVec::new(opts, &["job_kind"]).expect("regatta_active_jobs metric creation failed")
});

/// Histogram for submission-to-terminal job duration in seconds.
///
/// Labels:
/// - `tenant`: The submitting tenant
/// - `job_kind`: The job kind (train, predict)
/// - `status`: The terminal status (success, failure)
pub static JOB_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let buckets = exponential_buckets(1.0, 2.0, 16).expect("bucket creation failed");
    let opts = prometheus::HistogramOpts::new(
        "regatta_job_duration_seconds",
        "Submission-to-terminal job duration in seconds",
    )
    .buckets(buckets);
    HistogramVec::new(opts, &["tenant", "job_kind", "status"])
        .expect("regatta_job_duration_seconds metric creation failed")
});

/// Histogram for consumer wait on completion signals, in seconds.
///
/// Labels:
/// - `outcome`: found or timeout
pub static COMPLETION_WAIT_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let buckets = exponential_buckets(1.0, 2.0, 14).expect("bucket creation failed");
    let opts = prometheus::HistogramOpts::new(
        "regatta_completion_wait_seconds",
        "Consumer wait for completion signals in seconds",
    )
    .buckets(buckets);
    HistogramVec::new(opts, &["outcome"])
        .expect("regatta_completion_wait_seconds metric creation failed")
});

/// Initialize all metrics by registering them with the global registry.
///
/// This function is idempotent - calling it multiple times is safe.
pub fn init_metrics() -> anyhow::Result<()> {
    let registry = &*REGISTRY;

    for metric in [
        Box::new(JOBS_SUBMITTED_TOTAL.clone()) as Box<dyn prometheus::core::Collector>,
        Box::new(JOBS_COMPLETED_TOTAL.clone()),
        Box::new(PROBES_DISPATCHED_TOTAL.clone()),
        Box::new(CANCELLATIONS_TOTAL.clone()),
        Box::new(ARTIFACT_TRANSFERS_TOTAL.clone()),
        Box::new(ACTIVE_JOBS.clone()),
        Box::new(JOB_DURATION_SECONDS.clone()),
        Box::new(COMPLETION_WAIT_SECONDS.clone()),
    ] {
        if let Err(e) = registry.register(metric) {
            let msg = e.to_string();
            if !msg.contains("Duplicate metrics collector registration attempted") {
                return Err(e.into());
            }
        }
    }

    Ok(())
}

/// Helper to record a job submission.
pub fn record_job_submitted(tenant: &str, job_kind: &str) {
    JOBS_SUBMITTED_TOTAL
        .with_label_values(&[tenant, job_kind])
        .inc();
}

/// Helper to record a job completion.
pub fn record_job_completed(tenant: &str, job_kind: &str, status: &str) {
    JOBS_COMPLETED_TOTAL
        .with_label_values(&[tenant, job_kind, status])
        .inc();
}

/// Helper to record a probe dispatch.
pub fn record_probe_dispatched(method: &str, lane: &str) {
    PROBES_DISPATCHED_TOTAL
        .with_label_values(&[method, lane])
        .inc();
}

/// Helper to record a probe cancellation.
pub fn record_cancellation(method: &str) {
    CANCELLATIONS_TOTAL.with_label_values(&[method]).inc();
}

/// Helper to record an artifact transfer.
pub fn record_artifact_transfer(direction: &str, outcome: &str) {
    ARTIFACT_TRANSFERS_TOTAL
        .with_label_values(&[direction, outcome])
        .inc();
}

/// Helper to update the active-job gauge.
pub fn set_active_jobs(job_kind: &str, count: f64) {
    ACTIVE_JOBS.with_label_values(&[job_kind]).set(count);
}

/// Helper to observe job duration.
pub fn observe_job_duration(tenant: &str, job_kind: &str, status: &str, duration_secs: f64) {
    JOB_DURATION_SECONDS
        .with_label_values(&[tenant, job_kind, status])
        .observe(duration_secs);
}

/// Helper to observe completion-signal wait time.
pub fn observe_completion_wait(outcome: &str, waited_secs: f64) {
    COMPLETION_WAIT_SECONDS
        .with_label_values(&[outcome])
        .observe(waited_secs);
}

/// Gather all registered metrics in Prometheus text format.
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder
        .encode_to_string(&metric_families)
        .map_err(Into::into)
}
