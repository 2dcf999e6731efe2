//! Network fetch raced against a timeout

use crate::config::LateResponse;
use crate::error::{OfflineCacheError, Result};
use crate::types::{FetchRequest, StoredResponse};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Source of network responses
///
/// A rejected fetch (connection refused, reset, DNS failure) is an `Err`;
/// any HTTP status, including 4xx/5xx, is an `Ok` response.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    async fn fetch(&self, request: &FetchRequest) -> Result<StoredResponse>;
}

/// Races a fetch against a timer
#[derive(Clone)]
pub struct NetworkRace {
    fetcher: Arc<dyn Fetcher>,
    timeout: Duration,
    late_response: LateResponse,
}

impl NetworkRace {
    pub fn new(fetcher: Arc<dyn Fetcher>, timeout: Duration, late_response: LateResponse) -> Self {
        Self {
            fetcher,
            timeout,
            late_response,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the network response if it arrives before the timeout.
    ///
    /// The fetch runs as its own task. When it wins, the timer is dropped with
    /// the `timeout` future. When the timer wins, the task is either detached
    /// (its result is discarded when it eventually lands) or aborted,
    /// depending on the configured `LateResponse`.
    pub async fn race(&self, request: &FetchRequest) -> Result<StoredResponse> {
        let fetcher = Arc::clone(&self.fetcher);
        let owned = request.clone();
        let mut task = tokio::spawn(async move { fetcher.fetch(&owned).await });

        match tokio::time::timeout(self.timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(OfflineCacheError::Network(format!(
                "fetch task failed: {}",
                join_err
            ))),
            Err(_) => {
                if self.late_response == LateResponse::Abort {
                    task.abort();
                }
                debug!(
                    url = %request.url,
                    timeout_ms = self.timeout.as_millis() as u64,
                    policy = ?self.late_response,
                    "Network lost the race"
                );
                Err(OfflineCacheError::Timeout(self.timeout))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// What the scripted fetcher does for a path
    #[derive(Clone)]
    pub enum Scripted {
        Respond(StoredResponse),
        RespondAfter(Duration, StoredResponse),
        Fail(String),
        Hang,
    }

    /// Fetcher driven by a per-path script; unknown paths fail
    #[derive(Default)]
    pub struct ScriptedFetcher {
        script: Mutex<HashMap<String, Scripted>>,
        calls: AtomicUsize,
        completed: AtomicUsize,
    }

    impl ScriptedFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn on(self, path: &str, behaviour: Scripted) -> Self {
            self.script
                .lock()
                .unwrap()
                .insert(path.to_string(), behaviour);
            self
        }

        pub fn set(&self, path: &str, behaviour: Scripted) {
            self.script
                .lock()
                .unwrap()
                .insert(path.to_string(), behaviour);
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn completed(&self) -> usize {
            self.completed.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn fetch(&self, request: &FetchRequest) -> Result<StoredResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let behaviour = self
                .script
                .lock()
                .unwrap()
                .get(request.url.path())
                .cloned();
            let result = match behaviour {
                Some(Scripted::Respond(response)) => Ok(response),
                Some(Scripted::RespondAfter(delay, response)) => {
                    tokio::time::sleep(delay).await;
                    Ok(response)
                }
                Some(Scripted::Fail(msg)) => Err(OfflineCacheError::Network(msg)),
                Some(Scripted::Hang) => std::future::pending().await,
                None => Err(OfflineCacheError::Network(format!(
                    "no route to {}",
                    request.url
                ))),
            };
            self.completed.fetch_add(1, Ordering::SeqCst);
            result
        }
    }
}
