use async_trait::async_trait;
use parking_lot::Mutex;
use regatta::*;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// One storage call, in the order the store received it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageOp {
    UploadDir { namespace: String },
    UploadObject { namespace: String, name: String },
    Exists { namespace: String, name: String },
    DownloadDir { namespace: String },
}

#[derive(Default)]
struct StorageState {
    objects: HashMap<String, Vec<u8>>,
    ops: Vec<StorageOp>,
    fail_uploads: bool,
    fail_downloads: bool,
    fail_exists: bool,
}

/// In-memory [`ObjectStorage`] that records every call.
///
/// Local paths are ignored: `upload_dir` stands in a single synthetic
/// artifact object for the directory contents, and `download_dir` only
/// counts the namespace's objects. Each operation is appended to an op
/// log so tests can assert ordering, e.g. that the completion signal was
/// written after the artifact payload.
#[derive(Clone)]
pub struct InMemoryStorage {
    inner: Arc<Mutex<StorageState>>,
}

const SYNTHETIC_ARTIFACT: &str = "model.bin";

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StorageState::default())),
        }
    }

    pub fn insert_object(&self, namespace: &str, name: &str, bytes: Vec<u8>) {
        self.inner
            .lock()
            .objects
            .insert(format!("{}/{}", namespace, name), bytes);
    }

    pub fn has_object(&self, namespace: &str, name: &str) -> bool {
        self.inner
            .lock()
            .objects
            .contains_key(&format!("{}/{}", namespace, name))
    }

    pub fn object_names(&self, namespace: &str) -> Vec<String> {
        let prefix = format!("{}/", namespace);
        let mut names: Vec<String> = self
            .inner
            .lock()
            .objects
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
            .collect();
        names.sort();
        names
    }

    pub fn ops(&self) -> Vec<StorageOp> {
        self.inner.lock().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.inner.lock().ops.clear();
    }

    pub fn set_fail_uploads(&self, fail: bool) {
        self.inner.lock().fail_uploads = fail;
    }

    pub fn set_fail_downloads(&self, fail: bool) {
        self.inner.lock().fail_downloads = fail;
    }

    pub fn set_fail_exists(&self, fail: bool) {
        self.inner.lock().fail_exists = fail;
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStorage for InMemoryStorage {
    async fn upload_dir(
        &self,
        namespace: &str,
        _local_dir: &Path,
    ) -> anyhow::Result<usize> {
        let mut state = self.inner.lock();
        state.ops.push(StorageOp::UploadDir {
            namespace: namespace.to_string(),
        });
        if state.fail_uploads {
            anyhow::bail!("Scripted upload failure");
        }
        state.objects.insert(
            format!("{}/{}", namespace, SYNTHETIC_ARTIFACT),
            b"artifact".to_vec(),
        );
        Ok(1)
    }

    async fn upload_object(
        &self,
        namespace: &str,
        name: &str,
        bytes: Vec<u8>,
    ) -> anyhow::Result<()> {
        let mut state = self.inner.lock();
        state.ops.push(StorageOp::UploadObject {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        if state.fail_uploads {
            anyhow::bail!("Scripted upload failure");
        }
        state
            .objects
            .insert(format!("{}/{}", namespace, name), bytes);
        Ok(())
    }

    async fn object_exists(
        &self,
        namespace: &str,
        name: &str,
    ) -> anyhow::Result<bool> {
        let mut state = self.inner.lock();
        state.ops.push(StorageOp::Exists {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        if state.fail_exists {
            anyhow::bail!("Scripted exists failure");
        }
        let key = format!("{}/{}", namespace, name);
        Ok(state.objects.contains_key(&key))
    }

    async fn download_dir(
        &self,
        namespace: &str,
        _local_dir: &Path,
    ) -> anyhow::Result<usize> {
        let mut state = self.inner.lock();
        state.ops.push(StorageOp::DownloadDir {
            namespace: namespace.to_string(),
        });
        if state.fail_downloads {
            anyhow::bail!("Scripted download failure");
        }
        let prefix = format!("{}/", namespace);
        let count = state
            .objects
            .keys()
            .filter(|key| key.starts_with(&prefix))
            .count();
        Ok(count)
    }
}
