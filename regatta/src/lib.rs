//! Regatta - speculative multi-candidate scheduling for extraction models.
//!
//! A crate for racing several candidate training methods against the same
//! request, picking the best performer, and promoting it to a full training
//! run, with artifact replication between producer and consumer processes.
//!
//! # Core Concepts
//!
//! - **Job**: A [`DistributedJob`] tracks one request and its [`SubJob`]
//!   candidates in race order. Prediction jobs carry exactly one candidate.
//!
//! - **Backend**: The [`TaskBackend`] trait abstracts the remote execution
//!   engine. The scheduler only ever holds opaque [`TaskHandle`]s and polls
//!   them.
//!
//! - **Runner**: The [`Runner`] dispatches sub-jobs onto GPU or CPU lanes,
//!   polls their status, and resets them between retries.
//!
//! - **Orchestrators**: [`TrainingOrchestrator`] races probes and trains the
//!   winner; [`PredictionOrchestrator`] drives single-candidate predictions.
//!   Both advance their active set one step per tick and publish exactly one
//!   terminal [`ResultsMessage`] per job.
//!
//! - **Replication**: The [`ArtifactReplicator`] moves trained artifacts
//!   through [`ObjectStorage`], writing a completion signal only after the
//!   payload so consumers never read a partial artifact.
//!
//! # Feature Flags
//!
//! - `object-store` - Remote artifact storage via the `object_store` crate
//! - `metrics` - Prometheus metrics support
//!
//! # Example
//!
//! ```ignore
//! use regatta::*;
//!
//! let orchestrator = TrainingOrchestratorBuilder::new(OrchestratorConfig::default())
//!     .with_backend(backend)
//!     .with_storage(storage)
//!     .with_registry(registry)
//!     .with_publisher(publisher)
//!     .build()?;
//!
//! let job = DistributedJob::training(request, candidates, 3);
//! orchestrator.submit(job).await?;
//! orchestrator.run(shutdown).await;
//! ```

/// Remote task execution abstraction.
///
/// The `backend` module defines the seam to the execution engine:
/// - [`TaskBackend`] trait - submit, status, result, revoke
/// - [`TaskHandle`] - opaque handle for a submitted task
/// - [`TaskStatus`] - task lifecycle states
/// - [`TaskOp`] - probe, train, or predict
/// - [`TaskPayload`] and [`TaskOutcome`] - wire shapes in and out
/// - [`ExecutionLane`] - GPU or CPU placement
pub mod backend;

/// Configuration for the orchestrators.
///
/// The `config` module defines [`OrchestratorConfig`] for tick pacing,
/// deadlines, and artifact/suggestion locations.
pub mod config;

/// Scheduler error types.
///
/// The `error` module defines [`SchedulerError`] and the crate-wide
/// [`Result`] alias.
pub mod error;

/// Core job definitions.
///
/// The `job` module defines the scheduling domain:
/// - [`DistributedJob`] - one request with its candidates
/// - [`SubJob`] - a candidate's live execution state
/// - [`Candidate`] and [`ExtractionIdentifier`] - what is being trained
/// - [`TaskRequest`] - tenant, task, and parameters
/// - [`JobKind`], [`JobId`], [`PerformanceResult`], [`ProbeResolution`]
pub mod job;

/// Tick-driven orchestration.
///
/// The `orchestrator` module provides:
/// - [`TrainingOrchestrator`] - races probes, trains the winner
/// - [`PredictionOrchestrator`] - drives single-candidate predictions
/// - [`ActiveJobs`] - the shared active set with take/restore semantics
/// - [`ShutdownToken`] - graceful shutdown signaling
/// - Builders for constructing orchestrators
pub mod orchestrator;

/// Winning-method persistence.
///
/// The `registry` module defines the [`WinnerRegistry`] trait and the
/// [`WinnerRecord`] descriptor persisted after a race.
pub mod registry;

/// Artifact replication between processes.
///
/// The `replication` module provides [`ArtifactReplicator`] with its
/// signal-after-payload upload protocol and exponential-backoff consumer
/// poll, tuned by [`ReplicationConfig`].
pub mod replication;

/// Terminal outcome publishing.
///
/// The `results` module defines the outbound [`ResultsMessage`] contract,
/// the [`ResultsPublisher`] trait, and [`InProcResultsBus`] for in-process
/// fan-out.
pub mod results;

/// Sub-job dispatch and polling.
///
/// The `runner` module provides the [`Runner`], which owns all direct
/// backend interaction: lane selection with CPU fallback, retry resets,
/// cancellation, and bounded terminal waits.
pub mod runner;

/// Object storage abstraction for artifacts.
///
/// The `storage` module defines the [`ObjectStorage`] trait and, behind the
/// `object-store` feature, the `RemoteArtifactStore` implementation.
pub mod storage;

/// Tracing spans and metric recording helpers.
///
/// The `telemetry` module provides span constructors and record functions
/// that log through `tracing` and, with the `metrics` feature, update
/// Prometheus metrics.
pub mod telemetry;

#[cfg(feature = "metrics")]
/// Prometheus metrics.
///
/// The `metrics` module defines the registry, counters, gauges, and
/// histograms exported when the `metrics` feature is enabled.
pub mod metrics;

pub use backend::*;
pub use config::*;
pub use error::*;
pub use job::*;
pub use orchestrator::*;
pub use registry::*;
pub use replication::*;
pub use results::*;
pub use runner::*;
pub use storage::*;
