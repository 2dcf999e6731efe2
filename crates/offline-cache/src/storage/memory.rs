//! In-memory namespace storage

use super::CacheStorage;
use crate::error::Result;
use crate::types::{CacheStats, RequestKey, StoredResponse};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

type Namespace = HashMap<RequestKey, StoredResponse>;

/// Namespaces kept in process memory; lost on restart
#[derive(Default)]
pub struct MemoryStorage {
    namespaces: RwLock<HashMap<String, Namespace>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, namespace: &str) -> Result<()> {
        let mut namespaces = self.namespaces.write().await;
        namespaces.entry(namespace.to_string()).or_default();
        Ok(())
    }

    async fn namespaces(&self) -> Result<Vec<String>> {
        let namespaces = self.namespaces.read().await;
        let mut names: Vec<String> = namespaces.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<bool> {
        let removed = self.namespaces.write().await.remove(namespace);
        if let Some(ref entries) = removed {
            debug!(namespace, entries = entries.len(), "Deleted namespace");
        }
        Ok(removed.is_some())
    }

    async fn get(&self, namespace: &str, key: &RequestKey) -> Result<Option<StoredResponse>> {
        let entry = {
            let namespaces = self.namespaces.read().await;
            namespaces.get(namespace).and_then(|ns| ns.get(key)).cloned()
        };

        if entry.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(entry)
    }

    async fn put(
        &self,
        namespace: &str,
        key: &RequestKey,
        response: &StoredResponse,
    ) -> Result<()> {
        let mut namespaces = self.namespaces.write().await;
        namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(key.clone(), response.clone());
        Ok(())
    }

    async fn put_existing(
        &self,
        namespace: &str,
        key: &RequestKey,
        response: &StoredResponse,
    ) -> Result<bool> {
        let mut namespaces = self.namespaces.write().await;
        match namespaces.get_mut(namespace) {
            Some(entries) => {
                entries.insert(key.clone(), response.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn len(&self, namespace: &str) -> Result<usize> {
        let namespaces = self.namespaces.read().await;
        Ok(namespaces.get(namespace).map(|ns| ns.len()).unwrap_or(0))
    }

    async fn stats(&self) -> CacheStats {
        let namespaces = self.namespaces.read().await;
        CacheStats {
            namespaces: namespaces.len(),
            entries: namespaces.values().map(|ns| ns.len()).sum(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
