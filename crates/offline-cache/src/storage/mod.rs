//! Versioned cache namespaces
//!
//! A backend holds any number of named namespaces, each a map from
//! [`RequestKey`] to [`StoredResponse`]. Individual `get`/`put` calls are
//! atomic per key; concurrent writers to the same key resolve as
//! last-write-wins.

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::error::Result;
use crate::types::{CacheStats, RequestKey, StoredResponse};
use async_trait::async_trait;

#[async_trait]
pub trait CacheStorage: Send + Sync + 'static {
    /// Create the namespace if it does not exist yet
    async fn open(&self, namespace: &str) -> Result<()>;

    /// Names of every namespace currently present
    async fn namespaces(&self) -> Result<Vec<String>>;

    async fn has_namespace(&self, namespace: &str) -> Result<bool> {
        Ok(self.namespaces().await?.iter().any(|n| n == namespace))
    }

    /// Delete a namespace and all of its entries; returns whether it existed
    async fn delete_namespace(&self, namespace: &str) -> Result<bool>;

    async fn get(&self, namespace: &str, key: &RequestKey) -> Result<Option<StoredResponse>>;

    /// Store an entry, creating the namespace if needed
    async fn put(&self, namespace: &str, key: &RequestKey, response: &StoredResponse)
        -> Result<()>;

    /// Store an entry only if the namespace still exists; returns whether it
    /// was written
    async fn put_existing(
        &self,
        namespace: &str,
        key: &RequestKey,
        response: &StoredResponse,
    ) -> Result<bool> {
        if !self.has_namespace(namespace).await? {
            return Ok(false);
        }
        self.put(namespace, key, response).await?;
        Ok(true)
    }

    /// Number of entries in a namespace (0 if absent)
    async fn len(&self, namespace: &str) -> Result<usize>;

    async fn stats(&self) -> CacheStats;
}
