use std::fmt;
use std::sync::Arc;

use crate::backend::TaskBackend;
use crate::config::OrchestratorConfig;
use crate::registry::WinnerRegistry;
use crate::replication::{ArtifactReplicator, ReplicationConfig};
use crate::results::ResultsPublisher;
use crate::storage::ObjectStorage;

use super::predict::PredictionOrchestrator;
use super::train::TrainingOrchestrator;

/// Builder for a [`PredictionOrchestrator`] with explicit dependencies.
///
/// # Example
///
/// ```ignore
/// use regatta::*;
///
/// let orchestrator = PredictionOrchestratorBuilder::new(config)
///     .with_backend(backend)
///     .with_publisher(publisher)
///     .build()?;
/// ```
pub struct PredictionOrchestratorBuilder {
    config: OrchestratorConfig,
    backend: Option<Arc<dyn TaskBackend>>,
    publisher: Option<Arc<dyn ResultsPublisher>>,
}

impl fmt::Debug for PredictionOrchestratorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredictionOrchestratorBuilder")
            .field("config", &self.config)
            .field("backend_set", &self.backend.is_some())
            .field("publisher_set", &self.publisher.is_some())
            .finish()
    }
}

impl PredictionOrchestratorBuilder {
    /// Create a new builder with the given configuration.
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            backend: None,
            publisher: None,
        }
    }

    /// Set the task backend.
    pub fn with_backend(mut self, backend: Arc<dyn TaskBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set the results publisher.
    pub fn with_publisher(mut self, publisher: Arc<dyn ResultsPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Build the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if any required dependency is missing.
    pub fn build(self) -> anyhow::Result<PredictionOrchestrator> {
        let backend = self
            .backend
            .ok_or_else(|| anyhow::anyhow!("backend dependency missing"))?;
        let publisher = self
            .publisher
            .ok_or_else(|| anyhow::anyhow!("publisher dependency missing"))?;

        Ok(PredictionOrchestrator::new(self.config, backend, publisher))
    }
}

/// Builder for a [`TrainingOrchestrator`] with explicit dependencies.
///
/// # Example
///
/// ```ignore
/// use regatta::*;
///
/// let orchestrator = TrainingOrchestratorBuilder::new(config)
///     .with_backend(backend)
///     .with_storage(storage)
///     .with_registry(registry)
///     .with_publisher(publisher)
///     .build()?;
/// ```
pub struct TrainingOrchestratorBuilder {
    config: OrchestratorConfig,
    replication: ReplicationConfig,
    backend: Option<Arc<dyn TaskBackend>>,
    storage: Option<Arc<dyn ObjectStorage>>,
    registry: Option<Arc<dyn WinnerRegistry>>,
    publisher: Option<Arc<dyn ResultsPublisher>>,
}

impl fmt::Debug for TrainingOrchestratorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrainingOrchestratorBuilder")
            .field("config", &self.config)
            .field("replication", &self.replication)
            .field("backend_set", &self.backend.is_some())
            .field("storage_set", &self.storage.is_some())
            .field("registry_set", &self.registry.is_some())
            .field("publisher_set", &self.publisher.is_some())
            .finish()
    }
}

impl TrainingOrchestratorBuilder {
    /// Create a new builder with the given configuration.
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            replication: ReplicationConfig::default(),
            backend: None,
            storage: None,
            registry: None,
            publisher: None,
        }
    }

    /// Set the task backend.
    pub fn with_backend(mut self, backend: Arc<dyn TaskBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set the artifact storage.
    pub fn with_storage(mut self, storage: Arc<dyn ObjectStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Set the winner registry.
    pub fn with_registry(mut self, registry: Arc<dyn WinnerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the results publisher.
    pub fn with_publisher(mut self, publisher: Arc<dyn ResultsPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Override the replication tuning.
    pub fn with_replication_config(mut self, replication: ReplicationConfig) -> Self {
        self.replication = replication;
        self
    }

    /// Build the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if any required dependency is missing.
    pub fn build(self) -> anyhow::Result<TrainingOrchestrator> {
        let backend = self
            .backend
            .ok_or_else(|| anyhow::anyhow!("backend dependency missing"))?;
        let storage = self
            .storage
            .ok_or_else(|| anyhow::anyhow!("storage dependency missing"))?;
        let registry = self
            .registry
            .ok_or_else(|| anyhow::anyhow!("registry dependency missing"))?;
        let publisher = self
            .publisher
            .ok_or_else(|| anyhow::anyhow!("publisher dependency missing"))?;

        let replicator = ArtifactReplicator::new(storage, self.replication);

        Ok(TrainingOrchestrator::new(
            self.config,
            backend,
            replicator,
            registry,
            publisher,
        ))
    }
}
