//! Prediction job lifecycle tests: dispatch, lane selection, retry
//! budgets, and terminal result publication.

use std::sync::Arc;

use regatta::{
    DistributedJob, ExecutionLane, OrchestratorConfig,
    PredictionOrchestrator, PredictionOrchestratorBuilder, TaskOp,
    TaskOutcome, TaskStatus,
};
use regatta_testkit::{
    backdate_dispatch, candidate, prediction_job, sample_request,
    InMemoryTaskBackend, RecordingResultsBus, TaskScript, TEST_MAX_RETRIES,
};

struct Harness {
    backend: Arc<InMemoryTaskBackend>,
    bus: Arc<RecordingResultsBus>,
    orchestrator: PredictionOrchestrator,
}

fn harness() -> Harness {
    harness_with_config(OrchestratorConfig::default())
}

fn harness_with_config(config: OrchestratorConfig) -> Harness {
    let backend = Arc::new(InMemoryTaskBackend::new());
    let bus = Arc::new(RecordingResultsBus::new());
    let orchestrator = PredictionOrchestratorBuilder::new(config)
        .with_backend(backend.clone())
        .with_publisher(bus.clone())
        .build()
        .expect("build orchestrator");
    Harness {
        backend,
        bus,
        orchestrator,
    }
}

async fn tick_until_messages(harness: &Harness, expected: usize, max_ticks: usize) {
    for _ in 0..max_ticks {
        harness.orchestrator.tick().await;
        if harness.bus.messages().len() >= expected {
            return;
        }
    }
    panic!(
        "Expected {} messages within {} ticks, got {}",
        expected,
        max_ticks,
        harness.bus.messages().len()
    );
}

#[tokio::test]
async fn successful_prediction_publishes_full_contract() {
    let harness = harness();
    harness
        .backend
        .script("fast_text", TaskOp::Predict, TaskScript::completion(true));

    let id = harness
        .orchestrator
        .submit(prediction_job("fast_text"))
        .await
        .unwrap();
    assert!(harness.orchestrator.active_jobs().contains(id).await);

    assert_eq!(harness.orchestrator.tick().await, 0);
    assert_eq!(harness.orchestrator.tick().await, 1);

    harness.bus.assert_message_count_eq(1);
    let outbound = harness.bus.last().expect("terminal message");
    assert_eq!(outbound.queue, "results");
    assert!(outbound.message.success);
    assert!(outbound.message.error_message.is_empty());
    assert_eq!(outbound.message.tenant, "acme");
    assert_eq!(outbound.message.task, "extract_fields");
    assert_eq!(outbound.message.params, serde_json::json!({"field": "total"}));
    assert_eq!(
        outbound.message.data_url.as_deref(),
        Some("http://localhost:5056/get_suggestions/run-a/total")
    );

    let submits = harness.backend.submits();
    assert_eq!(submits.len(), 1);
    assert_eq!(submits[0].lane, ExecutionLane::Cpu);
    assert_eq!(submits[0].op, TaskOp::Predict);
    assert!(harness.orchestrator.active_jobs().is_empty().await);
}

#[tokio::test]
async fn retry_budget_spends_then_job_fails_terminally() {
    let harness = harness();
    harness
        .backend
        .script("fast_text", TaskOp::Predict, TaskScript::failed());

    harness
        .orchestrator
        .submit(prediction_job("fast_text"))
        .await
        .unwrap();

    tick_until_messages(&harness, 1, 12).await;

    let outbound = harness.bus.last().expect("terminal message");
    assert!(!outbound.message.success);
    assert_eq!(outbound.message.error_message, "max retries reached");
    assert_eq!(outbound.message.data_url, None);

    // Initial dispatch plus one per retry, and nothing after the terminal
    // message.
    assert_eq!(
        harness.backend.submit_count(),
        (TEST_MAX_RETRIES + 1) as usize
    );
    harness.orchestrator.tick().await;
    harness.orchestrator.tick().await;
    harness.bus.assert_message_count_eq(1);
    assert_eq!(
        harness.backend.submit_count(),
        (TEST_MAX_RETRIES + 1) as usize
    );
}

#[tokio::test]
async fn worker_reported_error_is_terminal_without_retry() {
    let harness = harness();
    harness.backend.script(
        "fast_text",
        TaskOp::Predict,
        TaskScript::completion_error("unreadable pdf"),
    );

    harness
        .orchestrator
        .submit(prediction_job("fast_text"))
        .await
        .unwrap();

    harness.orchestrator.tick().await;
    harness.orchestrator.tick().await;

    harness.bus.assert_message_count_eq(1);
    let outbound = harness.bus.last().expect("terminal message");
    assert!(!outbound.message.success);
    assert_eq!(outbound.message.error_message, "unreadable pdf");

    // The worker ran and said no; the retry budget stays untouched.
    harness.backend.assert_submit_count_eq(1);
}

#[tokio::test]
async fn gpu_candidate_targets_gpu_lane() {
    let harness = harness();
    harness
        .backend
        .script("layoutlm", TaskOp::Predict, TaskScript::completion(true));

    let job = DistributedJob::prediction(
        sample_request(),
        candidate("layoutlm", true),
        TEST_MAX_RETRIES,
    );
    harness.orchestrator.submit(job).await.unwrap();

    harness.orchestrator.tick().await;

    let submits = harness.backend.submits();
    assert_eq!(submits.len(), 1);
    assert_eq!(submits[0].lane, ExecutionLane::Gpu);
}

#[tokio::test]
async fn gpu_rejection_falls_back_to_cpu_lane() {
    let harness = harness();
    harness.backend.set_reject_gpu(true);
    harness
        .backend
        .script("layoutlm", TaskOp::Predict, TaskScript::completion(true));

    let job = DistributedJob::prediction(
        sample_request(),
        candidate("layoutlm", true),
        TEST_MAX_RETRIES,
    );
    harness.orchestrator.submit(job).await.unwrap();

    harness.orchestrator.tick().await;
    harness.orchestrator.tick().await;

    // The GPU rejection never produced a task; the job ran on CPU instead.
    let submits = harness.backend.submits();
    assert_eq!(submits.len(), 1);
    assert_eq!(submits[0].lane, ExecutionLane::Cpu);
    assert!(harness.bus.last().expect("terminal message").message.success);
}

#[tokio::test]
async fn deadline_expiry_cancels_and_consumes_the_budget() {
    let config = OrchestratorConfig {
        sub_job_deadline_secs: Some(1),
        ..OrchestratorConfig::default()
    };
    let harness = harness_with_config(config);
    harness.backend.script(
        "fast_text",
        TaskOp::Predict,
        TaskScript {
            statuses: vec![TaskStatus::Running],
            outcome: TaskOutcome::Completion {
                success: true,
                error_message: None,
            },
        },
    );

    // No retries: the first deadline miss is terminal.
    let job = DistributedJob::prediction(
        sample_request(),
        candidate("fast_text", false),
        0,
    );
    harness.orchestrator.submit(job).await.unwrap();

    harness.orchestrator.tick().await;

    // Age the dispatched attempt past the one-second deadline.
    let active = harness.orchestrator.active_jobs();
    let mut jobs = active.take_all().await;
    backdate_dispatch(&mut jobs[0].sub_jobs[0], 5);
    active.restore(jobs).await;

    harness.orchestrator.tick().await;

    harness.bus.assert_message_count_eq(1);
    let outbound = harness.bus.last().expect("terminal message");
    assert!(!outbound.message.success);
    assert_eq!(outbound.message.error_message, "max retries reached");

    assert_eq!(harness.backend.revoked_handles().len(), 1);
    harness.backend.assert_submit_count_eq(1);
}

#[tokio::test]
async fn erroring_status_polls_cannot_outlive_the_deadline() {
    let config = OrchestratorConfig {
        sub_job_deadline_secs: Some(1),
        ..OrchestratorConfig::default()
    };
    let harness = harness_with_config(config);
    harness
        .backend
        .script("fast_text", TaskOp::Predict, TaskScript::completion(true));
    // The task would succeed, but the broker never answers a poll.
    harness.backend.fail_statuses_for("fast_text", 10);

    // No retries: the first deadline miss is terminal.
    let job = DistributedJob::prediction(
        sample_request(),
        candidate("fast_text", false),
        0,
    );
    harness.orchestrator.submit(job).await.unwrap();

    harness.orchestrator.tick().await;

    // Age the dispatched attempt past the one-second deadline.
    let active = harness.orchestrator.active_jobs();
    let mut jobs = active.take_all().await;
    backdate_dispatch(&mut jobs[0].sub_jobs[0], 600);
    active.restore(jobs).await;

    // The poll errors, and the deadline must still end the job.
    harness.orchestrator.tick().await;

    harness.bus.assert_message_count_eq(1);
    let outbound = harness.bus.last().expect("terminal message");
    assert!(!outbound.message.success);
    assert_eq!(outbound.message.error_message, "max retries reached");
    assert_eq!(harness.backend.revoked_handles().len(), 1);

    // Ticks after the terminal message change nothing.
    harness.orchestrator.tick().await;
    harness.orchestrator.tick().await;
    harness.bus.assert_message_count_eq(1);
    harness.backend.assert_submit_count_eq(1);
}

#[tokio::test]
async fn deadline_on_an_erroring_poll_consumes_one_retry() {
    let config = OrchestratorConfig {
        sub_job_deadline_secs: Some(1),
        ..OrchestratorConfig::default()
    };
    let harness = harness_with_config(config);
    harness
        .backend
        .script("fast_text", TaskOp::Predict, TaskScript::completion(true));
    harness.backend.fail_statuses_for("fast_text", 1);

    harness
        .orchestrator
        .submit(prediction_job("fast_text"))
        .await
        .unwrap();
    harness.orchestrator.tick().await;

    // Age the dispatched attempt past the one-second deadline.
    let active = harness.orchestrator.active_jobs();
    let mut jobs = active.take_all().await;
    backdate_dispatch(&mut jobs[0].sub_jobs[0], 600);
    active.restore(jobs).await;

    // The poll errors, the deadline fires, the attempt is revoked.
    harness.orchestrator.tick().await;
    assert_eq!(harness.backend.revoked_handles().len(), 1);
    harness.bus.assert_message_count_eq(0);

    // The fresh attempt polls cleanly and completes.
    harness.orchestrator.tick().await;
    harness.orchestrator.tick().await;

    harness.bus.assert_message_count_eq(1);
    assert!(harness.bus.last().expect("terminal message").message.success);
    harness.backend.assert_submit_count_eq(2);
}

#[tokio::test]
async fn result_fetch_errors_retry_the_fetch_without_spending_budget() {
    let harness = harness();
    harness
        .backend
        .script("fast_text", TaskOp::Predict, TaskScript::completion(true));
    harness.backend.fail_results_for("fast_text", 2);

    harness
        .orchestrator
        .submit(prediction_job("fast_text"))
        .await
        .unwrap();

    harness.orchestrator.tick().await;
    // Two polls see success but cannot fetch the outcome.
    harness.orchestrator.tick().await;
    harness.orchestrator.tick().await;
    harness.bus.assert_message_count_eq(0);

    // The third fetch lands; no retry was consumed along the way.
    harness.orchestrator.tick().await;
    harness.bus.assert_message_count_eq(1);
    assert!(harness.bus.last().expect("terminal message").message.success);
    harness.backend.assert_submit_count_eq(1);
}

#[tokio::test]
async fn erroring_result_fetches_cannot_outlive_the_deadline() {
    let config = OrchestratorConfig {
        sub_job_deadline_secs: Some(1),
        ..OrchestratorConfig::default()
    };
    let harness = harness_with_config(config);
    harness
        .backend
        .script("fast_text", TaskOp::Predict, TaskScript::completion(true));
    harness.backend.fail_results_for("fast_text", 10);

    // No retries: the first deadline miss is terminal.
    let job = DistributedJob::prediction(
        sample_request(),
        candidate("fast_text", false),
        0,
    );
    harness.orchestrator.submit(job).await.unwrap();

    harness.orchestrator.tick().await;

    let active = harness.orchestrator.active_jobs();
    let mut jobs = active.take_all().await;
    backdate_dispatch(&mut jobs[0].sub_jobs[0], 600);
    active.restore(jobs).await;

    harness.orchestrator.tick().await;

    harness.bus.assert_message_count_eq(1);
    let outbound = harness.bus.last().expect("terminal message");
    assert!(!outbound.message.success);
    assert_eq!(outbound.message.error_message, "max retries reached");
    // The worker had finished, so nothing was revoked.
    assert!(harness.backend.revoked_handles().is_empty());
}
