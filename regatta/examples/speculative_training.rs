//! Speculative training example with the in-memory backend.
//!
//! This example demonstrates how to wire the training and prediction
//! orchestrators with regatta-testkit's scripted fakes:
//! - A three-way training race ending in a perfect-score short-circuit
//! - Rival cancellation and artifact publication for the winner
//! - A prediction that retries a flaky worker before succeeding
//!
//! Run with `RUST_LOG=debug` to watch the orchestrators work.

use std::sync::Arc;
use std::time::Duration;

use regatta::*;
use regatta_testkit::{
    InMemoryStorage, InMemoryTaskBackend, InMemoryWinnerRegistry, RecordingResultsBus,
    TaskScript,
};
use tokio::time::timeout;

/// Polls a recording bus until `count` results arrive.
async fn await_results(bus: &RecordingResultsBus, count: usize) -> anyhow::Result<()> {
    let wait = timeout(Duration::from_secs(10), async {
        while bus.messages().len() < count {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    anyhow::ensure!(wait.is_ok(), "timed out waiting for results");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("=== Regatta Speculative Training Example ===\n");
    println!("This example demonstrates:");
    println!("- Racing candidate methods and short-circuiting on a perfect score");
    println!("- Cancelling the losing candidates' tasks");
    println!("- Publishing the winner's artifact with a completion signal");
    println!("- Retrying a failed prediction within its budget\n");

    let config = OrchestratorConfig {
        poll_interval_ms: 100,
        ..OrchestratorConfig::default()
    };

    // Wire both orchestrators against scripted in-memory services.
    println!("1. Wiring orchestrators...");
    let training_backend = Arc::new(InMemoryTaskBackend::new());
    let storage = Arc::new(InMemoryStorage::new());
    let registry = Arc::new(InMemoryWinnerRegistry::new());
    let training_bus = Arc::new(RecordingResultsBus::new());
    let training = Arc::new(
        TrainingOrchestratorBuilder::new(config.clone())
            .with_backend(training_backend.clone())
            .with_storage(storage.clone())
            .with_registry(registry.clone())
            .with_publisher(training_bus.clone())
            .build()?,
    );

    let prediction_backend = Arc::new(InMemoryTaskBackend::new());
    let prediction_bus = Arc::new(RecordingResultsBus::new());
    let prediction = Arc::new(
        PredictionOrchestratorBuilder::new(config)
            .with_backend(prediction_backend.clone())
            .with_publisher(prediction_bus.clone())
            .build()?,
    );

    // Script what each worker will report back.
    println!("2. Scripting worker outcomes...");
    println!("   regex scores 61, fuzzy scores 74, setfit hits 100");
    training_backend.script("regex", TaskOp::Probe, TaskScript::performance(61.0));
    training_backend.script("fuzzy", TaskOp::Probe, TaskScript::performance(74.0));
    training_backend.script("setfit", TaskOp::Probe, TaskScript::performance(100.0));
    training_backend.script("setfit", TaskOp::Train, TaskScript::completion(true));
    println!("   fast_text fails once, then succeeds");
    prediction_backend.script("fast_text", TaskOp::Predict, TaskScript::failed());
    prediction_backend.script("fast_text", TaskOp::Predict, TaskScript::completion(true));

    let shutdown = ShutdownToken::new();
    let training_worker = {
        let orchestrator = training.clone();
        let token = shutdown.clone();
        tokio::spawn(async move { orchestrator.run(token).await })
    };
    let prediction_worker = {
        let orchestrator = prediction.clone();
        let token = shutdown.clone();
        tokio::spawn(async move { orchestrator.run(token).await })
    };

    // Race three methods at the same extraction.
    println!("\n3. Submitting a three-way training race...");
    let extraction = ExtractionIdentifier::new("invoices-2024", "total_amount");
    let request = TaskRequest::new(
        "acme-corp",
        "extract_fields",
        serde_json::json!({"field": "total_amount"}),
    );
    let candidates = vec![
        Candidate::new("regex", false, extraction.clone()),
        Candidate::new("fuzzy", false, extraction.clone()),
        Candidate::new("setfit", true, extraction.clone()),
    ];
    let race = DistributedJob::training(request.clone(), candidates, 2);
    let race_id = training.submit(race).await?;
    println!("   Submitted race {race_id}");

    println!("\n4. Submitting a prediction for a second extraction...");
    let prediction_extraction = ExtractionIdentifier::new("invoices-2024", "due_date");
    let prediction_job = DistributedJob::prediction(
        TaskRequest::new(
            "acme-corp",
            "extract_fields",
            serde_json::json!({"field": "due_date"}),
        ),
        Candidate::new("fast_text", false, prediction_extraction),
        3,
    );
    let prediction_id = prediction.submit(prediction_job).await?;
    println!("   Submitted prediction {prediction_id}");

    await_results(&training_bus, 1).await?;
    await_results(&prediction_bus, 1).await?;

    // The artifact upload runs in the background; wait for its signal.
    let signalled = timeout(Duration::from_secs(10), async {
        while !storage.has_object(&extraction.namespace(), &extraction.completion_signal_name()) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    anyhow::ensure!(signalled.is_ok(), "timed out waiting for the artifact");

    shutdown.cancel();
    training_worker.await?;
    prediction_worker.await?;

    println!("\n5. Race outcome:");
    let winner = registry
        .winner(&extraction)
        .ok_or_else(|| anyhow::anyhow!("no winner recorded"))?;
    println!("   Winner: {} (score {})", winner.method_name, winner.score);
    println!(
        "   Cancelled rivals: {:?}",
        training_backend.revoked_methods()
    );
    println!(
        "   Artifacts in {}: {:?}",
        extraction.namespace(),
        storage.object_names(&extraction.namespace())
    );
    let training_result = &training_bus.messages()[0].message;
    println!(
        "   Result message: success={} data_url={:?}",
        training_result.success, training_result.data_url
    );

    println!("\n6. Prediction outcome:");
    println!(
        "   Attempts made: {}",
        prediction_backend.submit_count_for("fast_text")
    );
    let prediction_result = &prediction_bus.messages()[0].message;
    println!(
        "   Result message: success={} data_url={:?}",
        prediction_result.success, prediction_result.data_url
    );

    println!("\n=== Example Complete ===");
    println!("\nKey takeaways:");
    println!("- A perfect probe score ends the race without waiting for rivals");
    println!("- Losing candidates' running tasks are revoked, not abandoned");
    println!("- The artifact lands before its completion signal, so consumers");
    println!("  that see the signal always see a whole artifact");
    println!("- Failed attempts retry until the budget runs out, then the job");
    println!("  reports a single terminal failure");

    Ok(())
}
