//! File-based namespace storage
//!
//! Layout: `<root>/<hex(namespace)>/<sha256(key)>.entry`. Each entry file is a
//! big-endian `u32` header length, a JSON header, then the raw body. Writes go
//! to a temporary file that is renamed into place, so readers never observe a
//! partially written entry.

use super::CacheStorage;
use crate::error::{OfflineCacheError, Result};
use crate::types::{CacheStats, RequestKey, StoredResponse};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tracing::{debug, info, warn};

const ENTRY_EXTENSION: &str = "entry";

#[derive(Serialize, Deserialize)]
struct EntryHeader {
    key: RequestKey,
    response: StoredResponse,
}

/// Namespaces persisted on disk; they survive restarts until deleted
pub struct FileStorage {
    root: PathBuf,
    tmp_counter: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl FileStorage {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            tmp_counter: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Ensure the root directory exists
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        info!(root = ?self.root, "File cache storage initialized");
        Ok(())
    }

    /// File name for a request key
    pub fn entry_name(key: &RequestKey) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_str().as_bytes());
        format!("{}.{}", hex::encode(hasher.finalize()), ENTRY_EXTENSION)
    }

    fn namespace_dir(&self, namespace: &str) -> PathBuf {
        self.root.join(hex::encode(namespace.as_bytes()))
    }

    fn decode_namespace(dir_name: &str) -> Option<String> {
        let bytes = hex::decode(dir_name).ok()?;
        String::from_utf8(bytes).ok()
    }

    fn encode_entry(key: &RequestKey, response: &StoredResponse) -> Result<Vec<u8>> {
        let header = serde_json::to_vec(&EntryHeader {
            key: key.clone(),
            response: response.clone(),
        })?;
        let header_len = u32::try_from(header.len())
            .map_err(|_| OfflineCacheError::CacheWrite("entry header too large".into()))?;

        let mut buf = Vec::with_capacity(4 + header.len() + response.body.len());
        buf.extend_from_slice(&header_len.to_be_bytes());
        buf.extend_from_slice(&header);
        buf.extend_from_slice(&response.body);
        Ok(buf)
    }

    fn decode_entry(bytes: &[u8]) -> Result<(RequestKey, StoredResponse)> {
        let corrupt = || OfflineCacheError::Serialization("truncated cache entry".into());
        let len_bytes: [u8; 4] = bytes
            .get(..4)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(corrupt)?;
        let header_len = u32::from_be_bytes(len_bytes) as usize;
        let header_bytes = bytes.get(4..4 + header_len).ok_or_else(corrupt)?;

        let header: EntryHeader = serde_json::from_slice(header_bytes)?;
        let mut response = header.response;
        response.body = bytes[4 + header_len..].to_vec();
        Ok((header.key, response))
    }

    /// Write to a temporary file in `dir`, then rename over the entry
    async fn write_entry(
        &self,
        dir: &Path,
        key: &RequestKey,
        response: &StoredResponse,
    ) -> Result<()> {
        let data = Self::encode_entry(key, response)?;
        let final_path = dir.join(Self::entry_name(key));
        let tmp_path = dir.join(format!(
            ".{}.{}.tmp",
            std::process::id(),
            self.tmp_counter.fetch_add(1, Ordering::Relaxed)
        ));

        fs::write(&tmp_path, &data).await?;
        if let Err(e) = fs::rename(&tmp_path, &final_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn count_entries(dir: &Path) -> Result<usize> {
        let mut read_dir = match fs::read_dir(dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut count = 0;
        while let Some(item) = read_dir.next_entry().await? {
            if item.path().extension().and_then(|e| e.to_str()) == Some(ENTRY_EXTENSION) {
                count += 1;
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl CacheStorage for FileStorage {
    async fn open(&self, namespace: &str) -> Result<()> {
        fs::create_dir_all(self.namespace_dir(namespace)).await?;
        Ok(())
    }

    async fn namespaces(&self) -> Result<Vec<String>> {
        let mut read_dir = match fs::read_dir(&self.root).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(item) = read_dir.next_entry().await? {
            if !item.file_type().await?.is_dir() {
                continue;
            }
            let dir_name = item.file_name();
            match dir_name.to_str().and_then(Self::decode_namespace) {
                Some(name) => names.push(name),
                None => warn!(dir = ?dir_name, "Skipping unrecognised directory in cache root"),
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<bool> {
        match fs::remove_dir_all(self.namespace_dir(namespace)).await {
            Ok(()) => {
                debug!(namespace, "Deleted namespace directory");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, namespace: &str, key: &RequestKey) -> Result<Option<StoredResponse>> {
        let path = self.namespace_dir(namespace).join(Self::entry_name(key));

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match Self::decode_entry(&bytes) {
            Ok((stored_key, response)) if &stored_key == key => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(response))
            }
            Ok(_) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            Err(e) => {
                warn!(path = ?path, error = %e, "Unreadable cache entry, removing");
                let _ = fs::remove_file(&path).await;
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn put(
        &self,
        namespace: &str,
        key: &RequestKey,
        response: &StoredResponse,
    ) -> Result<()> {
        let dir = self.namespace_dir(namespace);
        fs::create_dir_all(&dir).await?;
        self.write_entry(&dir, key, response).await?;
        debug!(namespace, key = %key, "Stored cache entry");
        Ok(())
    }

    async fn put_existing(
        &self,
        namespace: &str,
        key: &RequestKey,
        response: &StoredResponse,
    ) -> Result<bool> {
        let dir = self.namespace_dir(namespace);
        match fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Ok(false),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        match self.write_entry(&dir, key, response).await {
            Ok(()) => {
                debug!(namespace, key = %key, "Stored cache entry");
                Ok(true)
            }
            // Namespace deleted between the check and the write
            Err(OfflineCacheError::Storage(e)) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn len(&self, namespace: &str) -> Result<usize> {
        Self::count_entries(&self.namespace_dir(namespace)).await
    }

    async fn stats(&self) -> CacheStats {
        let names = self.namespaces().await.unwrap_or_default();
        let mut entries = 0;
        for name in &names {
            entries += self.len(name).await.unwrap_or(0);
        }
        CacheStats {
            namespaces: names.len(),
            entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
