//! A single versioned worker: lifecycle state plus the fetch strategy

use crate::classify::classify;
use crate::config::WorkerConfig;
use crate::error::Result;
use crate::lifecycle::{
    transition, ActivationReport, LifecycleAction, LifecycleEvent, LifecycleManager, WorkerState,
};
use crate::race::Fetcher;
use crate::storage::CacheStorage;
use crate::strategy::{CacheStrategy, FetchOutcome};
use crate::types::FetchRequest;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Events delivered by the host
#[derive(Debug)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(FetchRequest),
}

#[derive(Debug)]
pub enum EventResult {
    Installed(LifecycleAction),
    Activated(ActivationReport),
    Fetched(FetchOutcome),
}

pub struct ServiceWorker {
    config: Arc<WorkerConfig>,
    lifecycle: LifecycleManager,
    strategy: CacheStrategy,
    state: RwLock<WorkerState>,
}

impl ServiceWorker {
    pub fn new(
        config: WorkerConfig,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        Ok(Self {
            lifecycle: LifecycleManager::new(
                Arc::clone(&config),
                Arc::clone(&storage),
                Arc::clone(&fetcher),
            ),
            strategy: CacheStrategy::new(Arc::clone(&config), storage, fetcher),
            config,
            state: RwLock::new(WorkerState::Parsed),
        })
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    pub async fn handle_event(&self, event: WorkerEvent) -> Result<EventResult> {
        match event {
            WorkerEvent::Install => self.install().await.map(EventResult::Installed),
            WorkerEvent::Activate => self.activate().await.map(EventResult::Activated),
            WorkerEvent::Fetch(request) => Ok(EventResult::Fetched(self.fetch(request).await)),
        }
    }

    /// Prime the seed resources. Returns whether the worker wants to
    /// activate right away or wait to be promoted.
    pub async fn install(&self) -> Result<LifecycleAction> {
        self.apply(LifecycleEvent::Install).await?;
        info!(version = self.version(), "Installing");

        match self.lifecycle.install().await {
            Ok(_) => {
                self.apply(LifecycleEvent::SeedsStored {
                    skip_waiting: self.config.skip_waiting,
                })
                .await
            }
            Err(e) => {
                warn!(version = self.version(), error = %e, "Install failed");
                self.apply(LifecycleEvent::SeedsFailed).await?;
                Err(e)
            }
        }
    }

    /// Drop every other namespace. Claiming clients is up to the registration.
    pub async fn activate(&self) -> Result<ActivationReport> {
        self.apply(LifecycleEvent::Activate).await?;
        let report = self.lifecycle.activate().await?;
        info!(
            version = self.version(),
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "Activated"
        );
        Ok(report)
    }

    pub async fn fetch(&self, request: FetchRequest) -> FetchOutcome {
        if self.state().await != WorkerState::Active {
            return FetchOutcome::Passthrough(classify(&request.url, request.mode, &self.config));
        }
        self.strategy.handle(request).await
    }

    pub(crate) async fn retire(&self) {
        if let Err(e) = self.apply(LifecycleEvent::Replaced).await {
            warn!(version = self.version(), error = %e, "Could not retire worker");
        }
    }

    async fn apply(&self, event: LifecycleEvent) -> Result<LifecycleAction> {
        let mut state = self.state.write().await;
        let (action, next) = transition(*state, event)?;
        *state = next;
        Ok(action)
    }
}

impl std::fmt::Debug for ServiceWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceWorker")
            .field("version", &self.config.version)
            .finish_non_exhaustive()
    }
}
