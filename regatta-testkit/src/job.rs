use chrono::Duration;
use regatta::*;
use uuid::Uuid;

pub const TEST_MAX_RETRIES: u32 = 3;

pub fn sample_extraction() -> ExtractionIdentifier {
    ExtractionIdentifier::new("run-a", "total")
}

/// An extraction with a namespace no other fixture shares, for tests that
/// touch storage or the winner registry concurrently.
pub fn unique_extraction() -> ExtractionIdentifier {
    ExtractionIdentifier::new(format!("run-{}", Uuid::now_v7()), "total")
}

pub fn sample_request() -> TaskRequest {
    TaskRequest::new(
        "acme",
        "extract_fields",
        serde_json::json!({"field": "total"}),
    )
}

pub fn candidate(method_name: &str, requires_gpu: bool) -> Candidate {
    candidate_for(method_name, requires_gpu, sample_extraction())
}

pub fn candidate_for(
    method_name: &str,
    requires_gpu: bool,
    extraction: ExtractionIdentifier,
) -> Candidate {
    Candidate::new(method_name, requires_gpu, extraction)
}

/// A training job racing the given CPU methods against [`sample_extraction`].
pub fn training_job(methods: &[&str]) -> DistributedJob {
    training_job_for(&sample_extraction(), methods)
}

pub fn training_job_for(
    extraction: &ExtractionIdentifier,
    methods: &[&str],
) -> DistributedJob {
    let candidates = methods
        .iter()
        .map(|method| candidate_for(method, false, extraction.clone()))
        .collect();
    DistributedJob::training(sample_request(), candidates, TEST_MAX_RETRIES)
}

pub fn prediction_job(method: &str) -> DistributedJob {
    DistributedJob::prediction(
        sample_request(),
        candidate(method, false),
        TEST_MAX_RETRIES,
    )
}

/// Shift a dispatched sub-job's submit time `secs` into the past, so
/// deadline checks see an old attempt without the test sleeping.
pub fn backdate_dispatch(sub: &mut SubJob, secs: i64) {
    if let Some(at) = sub.dispatched_at.as_mut() {
        *at -= Duration::seconds(secs);
    }
}
