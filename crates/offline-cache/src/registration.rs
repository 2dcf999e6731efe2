//! Host-side registration: which worker controls clients, which one waits

use crate::error::Result;
use crate::lifecycle::{ActivationReport, LifecycleAction, WorkerState};
use crate::strategy::FetchOutcome;
use crate::types::FetchRequest;
use crate::worker::ServiceWorker;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug)]
pub enum RegisterOutcome {
    /// The worker activated and now controls every client
    Activated(ActivationReport),
    /// Installed; waits until `skip_waiting` promotes it
    Waiting,
}

/// Routes fetches to the controlling worker and sequences version upgrades
#[derive(Default)]
pub struct Registration {
    controller: RwLock<Option<Arc<ServiceWorker>>>,
    waiting: RwLock<Option<Arc<ServiceWorker>>>,
}

impl Registration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a worker and activate it when allowed.
    ///
    /// A failed install leaves the current controller in place.
    pub async fn register(&self, worker: Arc<ServiceWorker>) -> Result<RegisterOutcome> {
        let action = worker.install().await?;

        let has_controller = self.controller.read().await.is_some();
        if action == LifecycleAction::ActivateNow || !has_controller {
            // Its namespace is about to be deleted; it must never be promoted later
            let stale = self.waiting.write().await.take();
            if let Some(stale) = stale {
                info!(version = stale.version(), "Retiring waiting worker");
                stale.retire().await;
            }
            let report = self.activate(worker).await?;
            return Ok(RegisterOutcome::Activated(report));
        }

        info!(version = worker.version(), "Installed, waiting for activation");
        let replaced = self.waiting.write().await.replace(worker);
        if let Some(previous) = replaced {
            previous.retire().await;
        }
        Ok(RegisterOutcome::Waiting)
    }

    /// Promote the waiting worker, if there is one
    pub async fn skip_waiting(&self) -> Result<Option<ActivationReport>> {
        let waiting = self.waiting.write().await.take();
        match waiting {
            Some(worker) => Ok(Some(self.activate(worker).await?)),
            None => Ok(None),
        }
    }

    /// Dispatch a fetch to the controlling worker
    pub async fn fetch(&self, request: FetchRequest) -> FetchOutcome {
        let controller = self.controller.read().await.clone();
        match controller {
            Some(worker) => worker.fetch(request).await,
            None => FetchOutcome::Uncontrolled,
        }
    }

    pub async fn controller(&self) -> Option<Arc<ServiceWorker>> {
        self.controller.read().await.clone()
    }

    pub async fn waiting(&self) -> Option<Arc<ServiceWorker>> {
        self.waiting.read().await.clone()
    }

    /// Version and state of the controlling worker
    pub async fn status(&self) -> Option<(String, WorkerState)> {
        let controller = self.controller().await?;
        let state = controller.state().await;
        Some((controller.version().to_string(), state))
    }

    /// Clean up stale namespaces, then claim every client for `worker`
    async fn activate(&self, worker: Arc<ServiceWorker>) -> Result<ActivationReport> {
        let report = worker.activate().await?;
        if !report.failed.is_empty() {
            warn!(
                version = worker.version(),
                failed = report.failed.len(),
                "Some stale namespaces could not be deleted"
            );
        }

        let previous = self.controller.write().await.replace(Arc::clone(&worker));
        if let Some(previous) = previous {
            if !Arc::ptr_eq(&previous, &worker) {
                previous.retire().await;
            }
        }
        info!(version = worker.version(), "Claimed clients");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;
    use crate::race::testing::{Scripted, ScriptedFetcher};
    use crate::storage::{CacheStorage, MemoryStorage};
    use crate::types::{RequestKey, RequestMode, StoredResponse};
    use url::Url;

    fn origin() -> Url {
        Url::parse("https://app.test").unwrap()
    }

    fn fetcher() -> Arc<ScriptedFetcher> {
        Arc::new(
            ScriptedFetcher::new()
                .on(
                    "/offline.html",
                    Scripted::Respond(StoredResponse::ok("offline", "text/html")),
                )
                .on(
                    "/logo.png",
                    Scripted::Respond(StoredResponse::ok(vec![1, 2, 3], "image/png")),
                )
                .on(
                    "/app.js",
                    Scripted::Respond(StoredResponse::ok("const x=1", "text/javascript")),
                ),
        )
    }

    fn worker(
        version: &str,
        skip_waiting: bool,
        storage: &Arc<MemoryStorage>,
        fetcher: &Arc<ScriptedFetcher>,
    ) -> Arc<ServiceWorker> {
        let config = WorkerConfig::new(origin())
            .with_version(version)
            .with_skip_waiting(skip_waiting);
        Arc::new(ServiceWorker::new(config, storage.clone(), fetcher.clone()).unwrap())
    }

    #[tokio::test]
    async fn test_no_controller_means_uncontrolled() {
        let registration = Registration::new();
        let request = FetchRequest::get(origin().join("/app.js").unwrap(), RequestMode::NoCors);
        assert!(matches!(
            registration.fetch(request).await,
            FetchOutcome::Uncontrolled
        ));
        assert!(registration.status().await.is_none());
    }

    #[tokio::test]
    async fn test_first_worker_activates_even_without_skip_waiting() {
        let storage = Arc::new(MemoryStorage::new());
        let registration = Registration::new();

        let outcome = registration
            .register(worker("v1", false, &storage, &fetcher()))
            .await
            .unwrap();
        assert!(matches!(outcome, RegisterOutcome::Activated(_)));
        assert_eq!(
            registration.status().await,
            Some(("v1".to_string(), WorkerState::Active))
        );
    }

    #[tokio::test]
    async fn test_version_bump_cleans_up_and_claims() {
        let storage = Arc::new(MemoryStorage::new());
        let fetcher = fetcher();
        let registration = Registration::new();
        let old = worker("vA", true, &storage, &fetcher);
        registration.register(old.clone()).await.unwrap();

        let outcome = registration
            .register(worker("vB", true, &storage, &fetcher))
            .await
            .unwrap();
        let RegisterOutcome::Activated(report) = outcome else {
            panic!("expected activation");
        };
        assert_eq!(report.deleted, vec!["vA"]);
        assert_eq!(storage.namespaces().await.unwrap(), vec!["vB"]);
        assert_eq!(old.state().await, WorkerState::Superseded);

        let key = RequestKey::new("GET", &origin().join("/logo.png").unwrap());
        assert!(storage.get("vB", &key).await.unwrap().is_some());
        assert_eq!(registration.controller().await.unwrap().version(), "vB");
    }

    #[tokio::test]
    async fn test_waiting_worker_is_promoted_by_skip_waiting() {
        let storage = Arc::new(MemoryStorage::new());
        let fetcher = fetcher();
        let registration = Registration::new();
        registration
            .register(worker("v1", false, &storage, &fetcher))
            .await
            .unwrap();

        let outcome = registration
            .register(worker("v2", false, &storage, &fetcher))
            .await
            .unwrap();
        assert!(matches!(outcome, RegisterOutcome::Waiting));
        assert_eq!(registration.controller().await.unwrap().version(), "v1");
        assert_eq!(registration.waiting().await.unwrap().version(), "v2");
        // Both namespaces coexist until the new version activates
        assert_eq!(storage.namespaces().await.unwrap(), vec!["v1", "v2"]);

        let report = registration.skip_waiting().await.unwrap().unwrap();
        assert_eq!(report.deleted, vec!["v1"]);
        assert_eq!(registration.controller().await.unwrap().version(), "v2");
        assert!(registration.waiting().await.is_none());
        assert!(registration.skip_waiting().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_install_keeps_previous_version_active() {
        let storage = Arc::new(MemoryStorage::new());
        let good = fetcher();
        let registration = Registration::new();
        registration
            .register(worker("vA", true, &storage, &good))
            .await
            .unwrap();

        let broken = fetcher();
        broken.set("/logo.png", Scripted::Fail("connection reset".into()));
        let candidate = worker("vB", true, &storage, &broken);

        assert!(registration.register(candidate.clone()).await.is_err());
        assert_eq!(candidate.state().await, WorkerState::Redundant);
        assert_eq!(
            registration.status().await,
            Some(("vA".to_string(), WorkerState::Active))
        );

        let request = FetchRequest::get(origin().join("/app.js").unwrap(), RequestMode::NoCors);
        let outcome = registration.fetch(request).await;
        assert_eq!(outcome.served().unwrap().response.body, b"const x=1");
    }

    #[tokio::test]
    async fn test_direct_activation_retires_waiting_worker() {
        let storage = Arc::new(MemoryStorage::new());
        let fetcher = fetcher();
        let registration = Registration::new();
        registration
            .register(worker("v1", false, &storage, &fetcher))
            .await
            .unwrap();
        let parked = worker("v2", false, &storage, &fetcher);
        registration.register(parked.clone()).await.unwrap();

        let outcome = registration
            .register(worker("v3", true, &storage, &fetcher))
            .await
            .unwrap();
        assert!(matches!(outcome, RegisterOutcome::Activated(_)));
        assert!(registration.waiting().await.is_none());
        assert_eq!(parked.state().await, WorkerState::Superseded);
        assert_eq!(storage.namespaces().await.unwrap(), vec!["v3"]);

        // Nothing left to promote; v3 keeps control and its seeds
        assert!(registration.skip_waiting().await.unwrap().is_none());
        assert_eq!(
            registration.status().await,
            Some(("v3".to_string(), WorkerState::Active))
        );
        let request = FetchRequest::get(origin().join("/dashboard").unwrap(), RequestMode::Navigate);
        fetcher.set("/dashboard", Scripted::Fail("offline".into()));
        let served = registration.fetch(request).await;
        assert_eq!(served.served().unwrap().response.body, b"offline");
    }
}
