//! Tracing and telemetry instrumentation for regatta.
//!
//! This module provides helper functions for creating tracing spans and
//! recording metrics during job lifecycle events. All functions work both
//! with and without the `metrics` feature flag.
//!
//! # Features
//!
//! - Tracing spans for job lifecycle: submit, dispatch, train, replicate
//! - Integration with the `metrics` module for Prometheus metrics
//! - Helper functions that are no-ops when features are disabled
//!
//! # Example
//!
//! ```ignore
//! use regatta::telemetry::{probe_dispatch_span, record_job_submitted};
//!
//! let span = probe_dispatch_span(job_id, method, "gpu");
//! let _enter = span.enter();
//! // ... probe dispatch
//! record_job_submitted(tenant, job_kind);
//! ```

use std::future::Future;
use tracing::{Instrument, Span, info_span};

/// Create a tracing span for job submission.
///
/// The span includes the job_id and job_kind as fields for observability.
#[must_use]
pub fn job_submit_span(job_id: impl AsRef<str>, job_kind: impl AsRef<str>) -> Span {
    info_span!(
        "regatta.submit",
        job_id = %job_id.as_ref(),
        job_kind = %job_kind.as_ref(),
    )
}

/// Create a tracing span for a probe dispatch.
///
/// The span includes the job_id, method, and execution lane as fields.
#[must_use]
pub fn probe_dispatch_span(
    job_id: impl AsRef<str>,
    method: impl AsRef<str>,
    lane: impl AsRef<str>,
) -> Span {
    info_span!(
        "regatta.dispatch",
        job_id = %job_id.as_ref(),
        method = %method.as_ref(),
        lane = %lane.as_ref(),
    )
}

/// Create a tracing span covering a winner's full training run.
///
/// The span includes the job_id and winning method as fields.
#[must_use]
pub fn final_training_span(job_id: impl AsRef<str>, method: impl AsRef<str>) -> Span {
    info_span!(
        "regatta.train",
        job_id = %job_id.as_ref(),
        method = %method.as_ref(),
    )
}

/// Create a tracing span for artifact replication.
///
/// The span includes the extraction namespace and transfer direction.
#[must_use]
pub fn replication_span(extraction: impl AsRef<str>, direction: impl AsRef<str>) -> Span {
    info_span!(
        "regatta.replicate",
        extraction = %extraction.as_ref(),
        direction = %direction.as_ref(),
    )
}

/// Instrument a future with a probe dispatch span.
///
/// This is a convenience wrapper that attaches a dispatch span to any
/// future.
pub fn instrument_probe<F>(
    job_id: impl AsRef<str>,
    method: impl AsRef<str>,
    lane: impl AsRef<str>,
    future: F,
) -> impl Future<Output = F::Output>
where
    F: Future,
{
    let span = probe_dispatch_span(job_id, method, lane);
    future.instrument(span)
}

/// Record a job submission event.
///
/// This function records the event both in tracing logs and in Prometheus
/// metrics (when the `metrics` feature is enabled).
pub fn record_job_submitted(tenant: impl AsRef<str>, job_kind: impl AsRef<str>) {
    tracing::info!(
        tenant = %tenant.as_ref(),
        job_kind = %job_kind.as_ref(),
        "job submitted"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::record_job_submitted(tenant.as_ref(), job_kind.as_ref());
}

/// Record a job reaching its terminal state.
///
/// `status` is either "success" or "failure".
pub fn record_job_completed(
    tenant: impl AsRef<str>,
    job_kind: impl AsRef<str>,
    status: impl AsRef<str>,
) {
    tracing::info!(
        tenant = %tenant.as_ref(),
        job_kind = %job_kind.as_ref(),
        status = %status.as_ref(),
        "job completed"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::record_job_completed(tenant.as_ref(), job_kind.as_ref(), status.as_ref());
}

/// Count a probe dispatch on the given execution lane.
pub fn record_probe_dispatched(method: impl AsRef<str>, lane: impl AsRef<str>) {
    tracing::debug!(
        method = %method.as_ref(),
        lane = %lane.as_ref(),
        "probe dispatch counted"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::record_probe_dispatched(method.as_ref(), lane.as_ref());
}

/// Count a probe cancellation after a race short-circuit.
pub fn record_cancellation(method: impl AsRef<str>) {
    tracing::debug!(method = %method.as_ref(), "cancellation counted");

    #[cfg(feature = "metrics")]
    crate::metrics::record_cancellation(method.as_ref());
}

/// Count an artifact transfer.
///
/// `direction` is "upload" or "download"; `outcome` is "ok" or "error".
pub fn record_artifact_transfer(direction: impl AsRef<str>, outcome: impl AsRef<str>) {
    tracing::info!(
        direction = %direction.as_ref(),
        outcome = %outcome.as_ref(),
        "artifact transfer"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::record_artifact_transfer(direction.as_ref(), outcome.as_ref());
}

/// Update the active-job gauge for a job kind.
pub fn set_active_jobs(job_kind: impl AsRef<str>, count: usize) {
    tracing::debug!(
        job_kind = %job_kind.as_ref(),
        count = count,
        "active jobs updated"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::set_active_jobs(job_kind.as_ref(), count as f64);
}

/// Observe how long a job took from submission to its terminal message.
pub fn observe_job_duration(
    tenant: impl AsRef<str>,
    job_kind: impl AsRef<str>,
    status: impl AsRef<str>,
    duration_secs: f64,
) {
    tracing::info!(
        tenant = %tenant.as_ref(),
        job_kind = %job_kind.as_ref(),
        status = %status.as_ref(),
        duration_secs = duration_secs,
        "job duration observed"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::observe_job_duration(
        tenant.as_ref(),
        job_kind.as_ref(),
        status.as_ref(),
        duration_secs,
    );
}

/// Observe how long a consumer waited for a completion signal.
///
/// `outcome` is "found" or "timeout".
pub fn observe_completion_wait(outcome: impl AsRef<str>, waited_secs: f64) {
    tracing::debug!(
        outcome = %outcome.as_ref(),
        waited_secs = waited_secs,
        "completion wait observed"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::observe_completion_wait(outcome.as_ref(), waited_secs);
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Spans are only enabled (and carry metadata) while a subscriber is
    /// installed, so run each span constructor under a scoped default.
    fn with_subscriber<T>(f: impl FnOnce() -> T) -> T {
        tracing::subscriber::with_default(tracing_subscriber::registry(), f)
    }

    #[test]
    fn test_job_submit_span() {
        let span = with_subscriber(|| job_submit_span("job-123", "train"));
        assert_eq!(span.metadata().unwrap().name(), "regatta.submit");
    }

    #[test]
    fn test_probe_dispatch_span() {
        let span = with_subscriber(|| probe_dispatch_span("job-123", "fast_text", "gpu"));
        assert_eq!(span.metadata().unwrap().name(), "regatta.dispatch");
    }

    #[test]
    fn test_final_training_span() {
        let span = with_subscriber(|| final_training_span("job-123", "fast_text"));
        assert_eq!(span.metadata().unwrap().name(), "regatta.train");
    }

    #[test]
    fn test_replication_span() {
        let span = with_subscriber(|| replication_span("run-a/total", "upload"));
        assert_eq!(span.metadata().unwrap().name(), "regatta.replicate");
    }

    #[test]
    fn test_record_helpers_do_not_panic() {
        record_job_submitted("tenant-a", "train");
        record_job_completed("tenant-a", "train", "success");
        record_probe_dispatched("fast_text", "cpu");
        record_cancellation("fast_text");
        record_artifact_transfer("upload", "ok");
        set_active_jobs("predict", 3);
        observe_job_duration("tenant-a", "predict", "failure", 1.25);
        observe_completion_wait("found", 42.0);
    }
}
