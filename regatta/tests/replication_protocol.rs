//! Artifact replication protocol tests: payload-then-signal publication
//! and the consumer's poll-then-download sequence.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use regatta::{ArtifactReplicator, ReplicationConfig, SchedulerError};
use regatta_testkit::{unique_extraction, InMemoryStorage, StorageOp};

/// Polling config whose sleeps all round to zero, for fast timeout tests.
fn fast_config(max_attempts: u32) -> ReplicationConfig {
    ReplicationConfig {
        base_delay_secs: 0,
        max_delay_secs: 0,
        max_attempts,
    }
}

fn replicator(
    storage: &Arc<InMemoryStorage>,
    config: ReplicationConfig,
) -> ArtifactReplicator {
    ArtifactReplicator::new(storage.clone(), config)
}

#[tokio::test]
async fn publish_writes_payload_before_signal() {
    let storage = Arc::new(InMemoryStorage::new());
    let replicator = replicator(&storage, ReplicationConfig::default());
    let extraction = unique_extraction();
    let namespace = extraction.namespace();

    replicator
        .publish(&extraction, Path::new("/tmp/regatta-artifact"))
        .await
        .unwrap();

    assert_eq!(
        storage.ops(),
        vec![
            StorageOp::UploadDir {
                namespace: namespace.clone(),
            },
            StorageOp::UploadObject {
                namespace: namespace.clone(),
                name: extraction.completion_signal_name(),
            },
        ]
    );
    assert!(storage.has_object(&namespace, &extraction.completion_signal_name()));
}

#[tokio::test]
async fn publish_failure_skips_the_signal() {
    let storage = Arc::new(InMemoryStorage::new());
    storage.set_fail_uploads(true);
    let replicator = replicator(&storage, ReplicationConfig::default());
    let extraction = unique_extraction();

    let err = replicator
        .publish(&extraction, Path::new("/tmp/regatta-artifact"))
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::ArtifactUpload { .. }));

    // A consumer must never see a signal for a partial artifact.
    assert_eq!(
        storage.ops(),
        vec![StorageOp::UploadDir {
            namespace: extraction.namespace(),
        }]
    );
    assert!(!storage.has_object(
        &extraction.namespace(),
        &extraction.completion_signal_name()
    ));
}

#[tokio::test]
async fn await_artifact_downloads_once_signalled() {
    let storage = Arc::new(InMemoryStorage::new());
    let extraction = unique_extraction();
    let namespace = extraction.namespace();
    storage.insert_object(&namespace, "model.bin", b"weights".to_vec());
    storage.insert_object(
        &namespace,
        &extraction.completion_signal_name(),
        Vec::new(),
    );

    let replicator = replicator(&storage, fast_config(3));
    let fetched = replicator
        .await_artifact(&extraction, Path::new("/tmp/regatta-artifact"))
        .await
        .unwrap();
    assert_eq!(fetched, 2);

    // The signal is checked before anything is downloaded.
    assert_eq!(
        storage.ops(),
        vec![
            StorageOp::Exists {
                namespace: namespace.clone(),
                name: extraction.completion_signal_name(),
            },
            StorageOp::DownloadDir {
                namespace: namespace.clone(),
            },
        ]
    );
}

#[tokio::test]
async fn await_artifact_times_out_naming_attempts() {
    let storage = Arc::new(InMemoryStorage::new());
    let extraction = unique_extraction();
    let replicator = replicator(&storage, fast_config(10));

    let err = replicator
        .await_artifact(&extraction, Path::new("/tmp/regatta-artifact"))
        .await
        .unwrap_err();

    assert!(
        matches!(err, SchedulerError::CompletionTimeout { attempts: 10, .. }),
        "unexpected error: {err}"
    );
    assert!(err.to_string().contains("10 attempts"));

    let ops = storage.ops();
    assert_eq!(ops.len(), 10);
    assert!(ops
        .iter()
        .all(|op| matches!(op, StorageOp::Exists { .. })));
}

#[tokio::test(start_paused = true)]
async fn timeout_elapses_exactly_nine_backoff_delays() {
    let storage = Arc::new(InMemoryStorage::new());
    let extraction = unique_extraction();
    let replicator = replicator(&storage, ReplicationConfig::default());

    let started = tokio::time::Instant::now();
    let err = replicator
        .await_artifact(&extraction, Path::new("/tmp/regatta-artifact"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SchedulerError::CompletionTimeout { attempts: 10, .. }
    ));
    // Ten checks separated by nine delays, with no sleep after the last
    // miss: 30 + 60 + 120 + 240 + 480 + 4 * 900 = 4530 seconds.
    assert_eq!(started.elapsed(), Duration::from_secs(4530));
    assert_eq!(storage.ops().len(), 10);
}

#[tokio::test]
async fn signal_transport_errors_count_as_attempts() {
    let storage = Arc::new(InMemoryStorage::new());
    storage.set_fail_exists(true);
    let extraction = unique_extraction();
    let replicator = replicator(&storage, fast_config(2));

    let err = replicator
        .await_artifact(&extraction, Path::new("/tmp/regatta-artifact"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SchedulerError::CompletionTimeout { attempts: 2, .. }
    ));
    assert_eq!(storage.ops().len(), 2);
}

#[tokio::test]
async fn download_failure_after_signal_is_hard() {
    let storage = Arc::new(InMemoryStorage::new());
    let extraction = unique_extraction();
    storage.insert_object(
        &extraction.namespace(),
        &extraction.completion_signal_name(),
        Vec::new(),
    );
    storage.set_fail_downloads(true);

    let replicator = replicator(&storage, fast_config(3));
    let err = replicator
        .await_artifact(&extraction, Path::new("/tmp/regatta-artifact"))
        .await
        .unwrap_err();

    assert!(matches!(err, SchedulerError::ArtifactDownload { .. }));

    // One signal check, one failed download, no retries of either.
    assert_eq!(storage.ops().len(), 2);
    assert!(matches!(storage.ops()[1], StorageOp::DownloadDir { .. }));
}
