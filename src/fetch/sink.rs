//! アーカイブの保存先

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::MirrorError;
use crate::storage::list_all_keys;
use crate::traits::{ArchiveSink, ObjectStore};

/// ローカルディレクトリ
#[derive(Debug, Clone)]
pub struct LocalDirSink {
    dir: PathBuf,
}

impl LocalDirSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ArchiveSink for LocalDirSink {
    async fn index(&mut self) -> Result<(), MirrorError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    async fn contains(&self, key: &str) -> bool {
        tokio::fs::try_exists(self.dir.join(key))
            .await
            .unwrap_or(false)
    }

    async fn store(&mut self, key: &str, bytes: &[u8]) -> Result<(), MirrorError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(key);
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            MirrorError::Storage(format!("書き込み失敗 {:?}: {}", path, e))
        })?;
        debug!("Wrote {} bytes to {:?}", bytes.len(), path);
        Ok(())
    }
}

/// オブジェクトストレージ（`<prefix>/<key>` に保存）
pub struct ObjectStoreSink<S> {
    store: S,
    prefix: String,
    present: HashSet<String>,
}

impl<S: ObjectStore> ObjectStoreSink<S> {
    pub fn new(store: S, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into().trim_end_matches('/').to_string(),
            present: HashSet::new(),
        }
    }

    pub fn object_key(&self, key: &str) -> String {
        format!("{}/{}", self.prefix, key)
    }

    pub fn inner(&self) -> &S {
        &self.store
    }
}

#[async_trait]
impl<S: ObjectStore> ArchiveSink for ObjectStoreSink<S> {
    async fn index(&mut self) -> Result<(), MirrorError> {
        let keys = list_all_keys(&self.store, &self.prefix).await?;
        let strip = format!("{}/", self.prefix);
        self.present = keys
            .into_iter()
            .map(|key| match key.strip_prefix(&strip) {
                Some(rest) => rest.to_string(),
                None => key,
            })
            .collect();
        info!(
            "{} archives already uploaded under '{}'",
            self.present.len(),
            self.prefix
        );
        Ok(())
    }

    async fn contains(&self, key: &str) -> bool {
        self.present.contains(key)
    }

    async fn store(&mut self, key: &str, bytes: &[u8]) -> Result<(), MirrorError> {
        let object_key = self.object_key(key);
        info!("Uploading {} ({} bytes)", object_key, bytes.len());
        self.store.put(&object_key, bytes).await?;
        self.present.insert(key.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryObjectStore;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_local_sink_store_and_contains() {
        let dir = tempdir().unwrap();
        let mut sink = LocalDirSink::new(dir.path().join("download"));
        sink.index().await.unwrap();

        assert!(!sink.contains("1.qp").await);
        sink.store("1.qp", b"PK\x03\x04").await.unwrap();
        assert!(sink.contains("1.qp").await);
        assert_eq!(
            std::fs::read(dir.path().join("download").join("1.qp")).unwrap(),
            b"PK\x03\x04"
        );
    }

    #[tokio::test]
    async fn test_object_sink_index_strips_prefix() {
        let store = MemoryObjectStore::with_page_size(2);
        store.put("mapsets/10.qp", b"a").await.unwrap();
        store.put("mapsets/20.qp", b"b").await.unwrap();
        store.put("mapsets/30.qp", b"c").await.unwrap();

        let mut sink = ObjectStoreSink::new(store, "mapsets/");
        sink.index().await.unwrap();

        assert!(sink.contains("10.qp").await);
        assert!(sink.contains("30.qp").await);
        assert!(!sink.contains("mapsets/10.qp").await);
        assert!(!sink.contains("40.qp").await);
    }

    #[tokio::test]
    async fn test_object_sink_store_marks_present() {
        let mut sink = ObjectStoreSink::new(MemoryObjectStore::default(), "mapsets");
        sink.store("7.qp", b"data").await.unwrap();

        assert!(sink.contains("7.qp").await);
        assert_eq!(sink.inner().get("mapsets/7.qp").unwrap(), b"data");
    }
}
