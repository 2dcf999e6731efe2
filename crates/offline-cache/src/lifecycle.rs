//! Worker lifecycle: install priming and activate cleanup
//!
//! State changes are computed by [`transition`], a pure function from the
//! current state and an event to the next state plus the action the worker
//! must carry out. [`LifecycleManager`] performs those actions against the
//! cache storage.

use crate::config::WorkerConfig;
use crate::error::{OfflineCacheError, Result};
use crate::race::Fetcher;
use crate::storage::CacheStorage;
use crate::strategy::shareable;
use crate::types::{FetchRequest, RequestMode, StoredResponse};
use futures::future::{join_all, try_join_all};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerState {
    /// Constructed, not yet installed
    Parsed,
    Installing,
    /// Installed, waiting for activation
    Waiting,
    Active,
    /// Replaced by a newer active worker
    Superseded,
    /// Install failed; this worker never serves
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Waiting => "waiting",
            WorkerState::Active => "active",
            WorkerState::Superseded => "superseded",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Install,
    SeedsStored { skip_waiting: bool },
    SeedsFailed,
    Activate,
    Replaced,
}

/// What the worker must do after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    PrimeSeeds,
    /// Installed with skip-waiting: activate now
    ActivateNow,
    /// Installed: wait until the host promotes this worker
    Wait,
    CleanupAndClaim,
    Discard,
    Retire,
}

pub fn transition(
    state: WorkerState,
    event: LifecycleEvent,
) -> Result<(LifecycleAction, WorkerState)> {
    use LifecycleAction as A;
    use LifecycleEvent as E;
    use WorkerState as S;

    match (state, event) {
        (S::Parsed, E::Install) => Ok((A::PrimeSeeds, S::Installing)),
        (S::Installing, E::SeedsStored { skip_waiting: true }) => Ok((A::ActivateNow, S::Waiting)),
        (S::Installing, E::SeedsStored { skip_waiting: false }) => Ok((A::Wait, S::Waiting)),
        (S::Installing, E::SeedsFailed) => Ok((A::Discard, S::Redundant)),
        (S::Waiting, E::Activate) => Ok((A::CleanupAndClaim, S::Active)),
        (S::Waiting | S::Active, E::Replaced) => Ok((A::Retire, S::Superseded)),
        (state, event) => Err(OfflineCacheError::InvalidTransition {
            state: state.to_string(),
            event: format!("{:?}", event),
        }),
    }
}

/// Result of the activate cleanup pass
#[derive(Debug, Default, Clone, Serialize)]
pub struct ActivationReport {
    pub deleted: Vec<String>,
    /// Namespaces whose deletion failed, with the error message
    pub failed: Vec<(String, String)>,
}

/// Performs install and activate work for one version
pub struct LifecycleManager {
    config: Arc<WorkerConfig>,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
}

impl LifecycleManager {
    pub fn new(
        config: Arc<WorkerConfig>,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            config,
            storage,
            fetcher,
        }
    }

    /// Open the current namespace and store every seed resource.
    ///
    /// All seeds are fetched before anything is written; one failed fetch
    /// (rejection or non-2xx status) fails the whole install without
    /// creating the namespace. No timeout is applied.
    pub async fn install(&self) -> Result<usize> {
        let namespace = &self.config.version;

        let requests = self
            .config
            .seed_paths
            .iter()
            .map(|path| -> Result<(String, FetchRequest)> {
                let url = self.config.resolve(path)?;
                Ok((path.clone(), FetchRequest::get(url, RequestMode::Cors)))
            })
            .collect::<Result<Vec<_>>>()?;

        let fetched = try_join_all(
            requests
                .iter()
                .map(|(path, request)| self.fetch_seed(path, request)),
        )
        .await?;

        self.storage.open(namespace).await?;
        for ((_, request), response) in requests.iter().zip(fetched.iter()) {
            self.storage
                .put(namespace, &request.key(), &shareable(response))
                .await?;
        }

        info!(namespace = %namespace, seeds = fetched.len(), "Seed resources cached");
        Ok(fetched.len())
    }

    async fn fetch_seed(&self, path: &str, request: &FetchRequest) -> Result<StoredResponse> {
        let seed_error = |reason: String| OfflineCacheError::SeedPriming {
            path: path.to_string(),
            reason,
        };

        let response = self
            .fetcher
            .fetch(request)
            .await
            .map_err(|e| seed_error(e.to_string()))?;

        if !response.is_success() {
            return Err(seed_error(format!("status {}", response.status)));
        }
        Ok(response)
    }

    /// Delete every namespace other than the current one.
    ///
    /// Deletions run independently; a failure is recorded in the report and
    /// does not stop the others.
    pub async fn activate(&self) -> Result<ActivationReport> {
        let current = &self.config.version;
        let stale: Vec<String> = self
            .storage
            .namespaces()
            .await?
            .into_iter()
            .filter(|name| name != current)
            .collect();

        let results = join_all(stale.iter().map(|name| self.storage.delete_namespace(name))).await;

        let mut report = ActivationReport::default();
        for (name, result) in stale.into_iter().zip(results) {
            match result {
                Ok(_) => {
                    info!(namespace = %name, "Deleted stale cache namespace");
                    report.deleted.push(name);
                }
                Err(e) => {
                    warn!(namespace = %name, error = %e, "Failed to delete stale cache namespace");
                    report.failed.push((name, e.to_string()));
                }
            }
        }
        Ok(report)
    }
}
