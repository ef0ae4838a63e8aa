use async_trait::async_trait;
use futures::StreamExt;
use object_store::path::Path as StorePath;
use object_store::ObjectStore;
use std::path::Path;
use std::sync::Arc;

use super::ObjectStorage;

/// [`ObjectStorage`] adapter over any `object_store` backend.
///
/// Works against local filesystems, S3, GCS, and Azure transparently; the
/// backend choice is made by whoever constructs the inner store.
#[derive(Clone)]
pub struct RemoteArtifactStore {
    store: Arc<dyn ObjectStore>,
}

impl RemoteArtifactStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    fn key(namespace: &str, name: &str) -> StorePath {
        StorePath::from(format!("{namespace}/{name}"))
    }

    /// Collect every regular file under `dir`, depth first.
    async fn collect_files(dir: &Path) -> anyhow::Result<Vec<std::path::PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![dir.to_path_buf()];
        while let Some(current) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&current).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else {
                    files.push(path);
                }
            }
        }
        Ok(files)
    }
}

impl std::fmt::Debug for RemoteArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteArtifactStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl ObjectStorage for RemoteArtifactStore {
    async fn upload_dir(
        &self,
        namespace: &str,
        local_dir: &Path,
    ) -> anyhow::Result<usize> {
        let files = Self::collect_files(local_dir).await?;
        let mut uploaded = 0usize;
        for file in files {
            let relative = file
                .strip_prefix(local_dir)
                .unwrap_or(&file)
                .to_string_lossy()
                .replace('\\', "/");
            let bytes = tokio::fs::read(&file).await?;
            self.store
                .put(&Self::key(namespace, &relative), bytes.into())
                .await?;
            uploaded += 1;
        }
        tracing::debug!(namespace, objects = uploaded, "uploaded artifact directory");
        Ok(uploaded)
    }

    async fn upload_object(
        &self,
        namespace: &str,
        name: &str,
        bytes: Vec<u8>,
    ) -> anyhow::Result<()> {
        self.store
            .put(&Self::key(namespace, name), bytes.into())
            .await?;
        Ok(())
    }

    async fn object_exists(
        &self,
        namespace: &str,
        name: &str,
    ) -> anyhow::Result<bool> {
        match self.store.head(&Self::key(namespace, name)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn download_dir(
        &self,
        namespace: &str,
        local_dir: &Path,
    ) -> anyhow::Result<usize> {
        let prefix = StorePath::from(namespace);
        let mut listing = self.store.list(Some(&prefix));
        let mut fetched = 0usize;

        while let Some(meta) = listing.next().await {
            let meta = meta?;
            let relative = meta
                .location
                .as_ref()
                .strip_prefix(prefix.as_ref())
                .map(|rest| rest.trim_start_matches('/'))
                .unwrap_or_else(|| meta.location.as_ref());
            let target = local_dir.join(relative);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let bytes = self.store.get(&meta.location).await?.bytes().await?;
            tokio::fs::write(&target, &bytes).await?;
            fetched += 1;
        }

        tracing::debug!(namespace, objects = fetched, "downloaded artifact directory");
        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::local::LocalFileSystem;

    fn temp_dir(tag: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "regatta-store-{}-{}",
            tag,
            uuid::Uuid::now_v7()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn local_store(root: &Path) -> RemoteArtifactStore {
        RemoteArtifactStore::new(Arc::new(
            LocalFileSystem::new_with_prefix(root).unwrap(),
        ))
    }

    #[tokio::test]
    async fn test_upload_then_exists() {
        let root = temp_dir("exists");
        let store = local_store(&root);

        store
            .upload_object("run-a/total", "model.completed", Vec::new())
            .await
            .unwrap();

        assert!(store
            .object_exists("run-a/total", "model.completed")
            .await
            .unwrap());
        assert!(!store
            .object_exists("run-a/total", "missing")
            .await
            .unwrap());

        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn test_dir_round_trip() {
        let root = temp_dir("roundtrip");
        let store = local_store(&root);

        let src = temp_dir("src");
        std::fs::write(src.join("weights.bin"), b"abc").unwrap();
        std::fs::create_dir_all(src.join("tokenizer")).unwrap();
        std::fs::write(src.join("tokenizer/vocab.txt"), b"a b c").unwrap();

        let uploaded = store.upload_dir("run-a/total", &src).await.unwrap();
        assert_eq!(uploaded, 2);

        let dst = temp_dir("dst");
        let fetched = store.download_dir("run-a/total", &dst).await.unwrap();
        assert_eq!(fetched, 2);
        assert_eq!(std::fs::read(dst.join("weights.bin")).unwrap(), b"abc");
        assert_eq!(
            std::fs::read(dst.join("tokenizer/vocab.txt")).unwrap(),
            b"a b c"
        );

        for dir in [&root, &src, &dst] {
            std::fs::remove_dir_all(dir).ok();
        }
    }
}
