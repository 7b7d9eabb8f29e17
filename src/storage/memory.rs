use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::MirrorError;
use crate::traits::ObjectStore;

use super::ListPage;

/// メモリ上のオブジェクトストレージ（ページ分割あり）
#[derive(Debug)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    page_size: usize,
    list_calls: Mutex<usize>,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::with_page_size(1000)
    }
}

impl MemoryObjectStore {
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            page_size: page_size.max(1),
            list_calls: Mutex::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .ok()
            .and_then(|objects| objects.get(key).cloned())
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.lock().map(|calls| *calls).unwrap_or(0)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list_page(
        &self,
        prefix: &str,
        marker: Option<&str>,
    ) -> Result<ListPage, MirrorError> {
        if let Ok(mut calls) = self.list_calls.lock() {
            *calls += 1;
        }

        let objects = self
            .objects
            .lock()
            .map_err(|e| MirrorError::ObjectStore(e.to_string()))?;

        let mut matching = objects
            .keys()
            .filter(|key| key.starts_with(prefix))
            .filter(|key| marker.map_or(true, |m| key.as_str() > m));

        let keys: Vec<String> = matching.by_ref().take(self.page_size).cloned().collect();
        let is_truncated = matching.next().is_some();

        Ok(ListPage {
            keys,
            next_marker: None,
            is_truncated,
        })
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), MirrorError> {
        self.objects
            .lock()
            .map_err(|e| MirrorError::ObjectStore(e.to_string()))?
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}
