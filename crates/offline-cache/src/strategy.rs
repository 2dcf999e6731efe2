//! Per-category fetch strategies over the current cache namespace
//!
//! Navigation: network first, offline document on failure.
//! Static assets: network first with a background write-through, cached copy
//! on failure. Everything else is passed through without touching the cache.

use crate::classify::{classify, Classification};
use crate::config::WorkerConfig;
use crate::error::{OfflineCacheError, Result};
use crate::race::{Fetcher, NetworkRace};
use crate::storage::CacheStorage;
use crate::types::{FetchRequest, RequestKey, ResponseSource, StoredResponse};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const PARTIAL_CONTENT: u16 = 206;
const SET_COOKIE_HEADERS: &[&str] = &["set-cookie", "set-cookie2"];

/// A response the worker answered with
#[derive(Debug)]
pub struct Served {
    pub response: StoredResponse,
    pub source: ResponseSource,
    /// Background cache write started for this response, if any.
    /// Dropping the handle detaches the write; it still runs to completion.
    pub cache_write: Option<JoinHandle<()>>,
}

/// Terminal state of an intercepted (or skipped) fetch
#[derive(Debug)]
pub enum FetchOutcome {
    Respond(Served),
    /// Not intercepted; the host applies default network handling
    Passthrough(Classification),
    /// No active worker controls the client; default network handling applies
    Uncontrolled,
    /// Intercepted but neither the network nor the cache could answer
    Unresolved {
        classification: Classification,
        error: OfflineCacheError,
    },
}

impl FetchOutcome {
    pub fn served(&self) -> Option<&Served> {
        match self {
            FetchOutcome::Respond(served) => Some(served),
            _ => None,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(
            self,
            FetchOutcome::Passthrough(_) | FetchOutcome::Uncontrolled
        )
    }
}

/// Executes the strategy for each request against one namespace
#[derive(Clone)]
pub struct CacheStrategy {
    config: Arc<WorkerConfig>,
    storage: Arc<dyn CacheStorage>,
    race: NetworkRace,
}

impl CacheStrategy {
    pub fn new(
        config: Arc<WorkerConfig>,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        let race = NetworkRace::new(fetcher, config.network_timeout, config.late_response);
        Self {
            config,
            storage,
            race,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.config.version
    }

    pub async fn handle(&self, request: FetchRequest) -> FetchOutcome {
        let classification = classify(&request.url, request.mode, &self.config);
        debug!(
            method = %request.method,
            url = %request.url,
            classification = %classification,
            "Classified request"
        );

        match classification {
            Classification::Navigation => self.navigate(&request).await,
            Classification::StaticAsset => self.static_asset(request).await,
            other => FetchOutcome::Passthrough(other),
        }
    }

    async fn navigate(&self, request: &FetchRequest) -> FetchOutcome {
        let error = match self.race.race(request).await {
            Ok(response) => {
                return FetchOutcome::Respond(Served {
                    response,
                    source: ResponseSource::Network,
                    cache_write: None,
                })
            }
            Err(e) => e,
        };

        debug!(url = %request.url, error = %error, "Navigation failed, serving offline document");
        match self.offline_document().await {
            Ok(Some(response)) => FetchOutcome::Respond(Served {
                response,
                source: ResponseSource::OfflineFallback,
                cache_write: None,
            }),
            Ok(None) => {
                warn!(
                    namespace = self.namespace(),
                    path = %self.config.offline_path,
                    "Offline document missing from cache"
                );
                FetchOutcome::Unresolved {
                    classification: Classification::Navigation,
                    error: OfflineCacheError::CacheMiss(self.config.offline_path.clone()),
                }
            }
            Err(e) => FetchOutcome::Unresolved {
                classification: Classification::Navigation,
                error: e,
            },
        }
    }

    async fn static_asset(&self, request: FetchRequest) -> FetchOutcome {
        match self.race.race(&request).await {
            Ok(response) => {
                let cache_write = match check_cacheable(&request, &response) {
                    Ok(()) => Some(self.spawn_cache_write(request, response.clone())),
                    Err(reason) => {
                        debug!(url = %request.url, reason = %reason, "Not caching static asset");
                        None
                    }
                };
                FetchOutcome::Respond(Served {
                    response,
                    source: ResponseSource::Network,
                    cache_write,
                })
            }
            Err(error) => {
                let key = request.key();
                debug!(key = %key, error = %error, "Static asset fetch failed, trying cache");
                match self.storage.get(self.namespace(), &key).await {
                    Ok(Some(response)) => FetchOutcome::Respond(Served {
                        response,
                        source: ResponseSource::Cache,
                        cache_write: None,
                    }),
                    Ok(None) => FetchOutcome::Unresolved {
                        classification: Classification::StaticAsset,
                        error: OfflineCacheError::CacheMiss(key.to_string()),
                    },
                    Err(e) => {
                        warn!(key = %key, error = %e, "Cache lookup failed");
                        FetchOutcome::Unresolved {
                            classification: Classification::StaticAsset,
                            error: e,
                        }
                    }
                }
            }
        }
    }

    async fn offline_document(&self) -> Result<Option<StoredResponse>> {
        let url = self.config.resolve(&self.config.offline_path)?;
        let key = RequestKey::new("GET", &url);
        self.storage.get(self.namespace(), &key).await
    }

    /// Copy a network response into the namespace without blocking the caller.
    /// Failures are logged and dropped.
    fn spawn_cache_write(&self, request: FetchRequest, response: StoredResponse) -> JoinHandle<()> {
        let storage = Arc::clone(&self.storage);
        let namespace = self.config.version.clone();
        tokio::spawn(async move {
            match store(storage.as_ref(), &namespace, &request, &response).await {
                Ok(true) => {}
                Ok(false) => debug!(
                    url = %request.url,
                    namespace = %namespace,
                    "Namespace gone, dropping cache write"
                ),
                Err(e) => warn!(url = %request.url, error = %e, "Failed to cache static asset"),
            }
        })
    }
}

/// Whether a response may be kept in a cache shared by every client
pub fn check_cacheable(request: &FetchRequest, response: &StoredResponse) -> Result<()> {
    let reject = |reason: String| Err(OfflineCacheError::CacheWrite(reason));

    if !request.is_get() {
        return reject(format!("refusing to cache {} request", request.method));
    }
    if response.status == PARTIAL_CONTENT {
        return reject("refusing to cache partial response".into());
    }
    if !response.is_success() {
        return reject(format!("refusing to cache status {}", response.status));
    }
    if let Some(cache_control) = response.header("cache-control") {
        let forbidden = cache_control.split(',').any(|directive| {
            let directive = directive.trim().to_ascii_lowercase();
            directive == "no-store" || directive.starts_with("private")
        });
        if forbidden {
            return reject(format!("refusing to cache Cache-Control: {}", cache_control));
        }
    }
    Ok(())
}

/// Copy of a response without per-client headers
pub fn shareable(response: &StoredResponse) -> StoredResponse {
    let mut shared = response.clone();
    shared
        .headers
        .retain(|(name, _)| !SET_COOKIE_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name)));
    shared
}

/// Write a response under the request's key, rejecting what the cache must
/// not hold. Returns `false` when the namespace no longer exists.
pub async fn store(
    storage: &dyn CacheStorage,
    namespace: &str,
    request: &FetchRequest,
    response: &StoredResponse,
) -> Result<bool> {
    check_cacheable(request, response)?;
    storage
        .put_existing(namespace, &request.key(), &shareable(response))
        .await
        .map_err(|e| OfflineCacheError::CacheWrite(e.to_string()))
}
