//! Durable artifact storage behind the replication protocol.
//!
//! The scheduler never interprets artifact bytes; it moves whole directories
//! between a local filesystem and a namespaced remote store and checks for
//! the presence of completion-signal objects.

use async_trait::async_trait;
use std::path::Path;

#[cfg(feature = "object-store")]
pub mod object_store;

#[cfg(feature = "object-store")]
pub use object_store::RemoteArtifactStore;

/// Namespaced object store for trained artifacts and completion signals.
///
/// Implementations are external (cloud buckets, shared filesystems). Keys
/// are `namespace/name`; a namespace is an [`ExtractionIdentifier`]'s
/// `run_name/extraction_name` pair.
///
/// [`ExtractionIdentifier`]: crate::job::ExtractionIdentifier
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload every file under `local_dir` into `namespace`, keyed by the
    /// path relative to `local_dir`. Returns the number of objects written.
    async fn upload_dir(
        &self,
        namespace: &str,
        local_dir: &Path,
    ) -> anyhow::Result<usize>;

    /// Upload a single object into `namespace` under `name`.
    async fn upload_object(
        &self,
        namespace: &str,
        name: &str,
        bytes: Vec<u8>,
    ) -> anyhow::Result<()>;

    /// True when an object called `name` exists in `namespace`.
    async fn object_exists(
        &self,
        namespace: &str,
        name: &str,
    ) -> anyhow::Result<bool>;

    /// Download every object in `namespace` into `local_dir`, creating it
    /// if needed. Returns the number of objects fetched.
    async fn download_dir(
        &self,
        namespace: &str,
        local_dir: &Path,
    ) -> anyhow::Result<usize>;
}
