//! End-to-end scenarios through a registration backed by on-disk storage

use async_trait::async_trait;
use offline_cache::{
    CacheStorage, FetchOutcome, FetchRequest, FileStorage, OfflineCacheError, RegisterOutcome,
    Registration, RequestKey, RequestMode, ResponseSource, ServiceWorker, StoredResponse,
    WorkerConfig, WorkerState,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;
use url::Url;

const ORIGIN: &str = "https://app.test";

/// Simulated origin server; paths not listed hang forever (unreachable network)
#[derive(Default)]
struct FakeOrigin {
    routes: Mutex<HashMap<String, Result<StoredResponse, String>>>,
    calls: AtomicUsize,
}

impl FakeOrigin {
    fn with_seeds() -> Arc<Self> {
        let origin = Arc::new(Self::default());
        origin.serve("/offline.html", StoredResponse::ok("<h1>You are offline</h1>", "text/html"));
        origin.serve("/logo.png", StoredResponse::ok(vec![0x89, b'P', b'N', b'G'], "image/png"));
        origin
    }

    fn serve(&self, path: &str, response: StoredResponse) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), Ok(response));
    }

    fn reject(&self, path: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), Err("connection refused".to_string()));
    }

    fn unplug(&self, path: &str) {
        self.routes.lock().unwrap().remove(path);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl offline_cache::Fetcher for FakeOrigin {
    async fn fetch(&self, request: &FetchRequest) -> offline_cache::Result<StoredResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let route = self.routes.lock().unwrap().get(request.url.path()).cloned();
        match route {
            Some(Ok(response)) => Ok(response),
            Some(Err(msg)) => Err(OfflineCacheError::Network(msg)),
            None => std::future::pending().await,
        }
    }
}

fn config(version: &str) -> WorkerConfig {
    WorkerConfig::new(Url::parse(ORIGIN).unwrap())
        .with_version(version)
        .with_seed_paths(["/offline.html", "/logo.png"])
        .with_network_timeout(Duration::from_millis(5000))
}

fn request(path: &str, mode: RequestMode) -> FetchRequest {
    FetchRequest::get(Url::parse(ORIGIN).unwrap().join(path).unwrap(), mode)
}

fn key(path: &str) -> RequestKey {
    request(path, RequestMode::Cors).key()
}

async fn active_registration(
    storage: &Arc<FileStorage>,
    origin: &Arc<FakeOrigin>,
    version: &str,
) -> Registration {
    let registration = Registration::new();
    let worker = ServiceWorker::new(config(version), storage.clone(), origin.clone()).unwrap();
    registration.register(Arc::new(worker)).await.unwrap();
    registration
}

#[tokio::test(start_paused = true)]
async fn dashboard_navigation_times_out_to_offline_document() {
    let dir = tempdir().unwrap();
    let storage = Arc::new(FileStorage::new(dir.path().to_path_buf()));
    let origin = FakeOrigin::with_seeds();
    let registration = active_registration(&storage, &origin, "v1").await;

    let outcome = registration
        .fetch(request("/dashboard", RequestMode::Navigate))
        .await;

    let served = outcome.served().expect("offline document");
    assert_eq!(served.source, ResponseSource::OfflineFallback);
    assert_eq!(served.response.body, b"<h1>You are offline</h1>");
}

#[tokio::test]
async fn app_js_is_served_and_cached() {
    let dir = tempdir().unwrap();
    let storage = Arc::new(FileStorage::new(dir.path().to_path_buf()));
    let origin = FakeOrigin::with_seeds();
    origin.serve("/app.js", StoredResponse::ok("const x=1", "text/javascript"));
    let registration = active_registration(&storage, &origin, "v1").await;

    let outcome = registration.fetch(request("/app.js", RequestMode::NoCors)).await;
    let FetchOutcome::Respond(served) = outcome else {
        panic!("expected /app.js to be served");
    };
    assert_eq!(served.response.body, b"const x=1");
    served.cache_write.unwrap().await.unwrap();

    let cached = storage.get("v1", &key("/app.js")).await.unwrap().unwrap();
    assert_eq!(cached.body, b"const x=1");

    // Once the network goes away the cached copy is served
    origin.reject("/app.js");
    let outcome = registration.fetch(request("/app.js", RequestMode::NoCors)).await;
    let served = outcome.served().unwrap();
    assert_eq!(served.source, ResponseSource::Cache);
    assert_eq!(served.response.body, b"const x=1");
}

#[tokio::test]
async fn api_requests_are_never_intercepted() {
    let dir = tempdir().unwrap();
    let storage = Arc::new(FileStorage::new(dir.path().to_path_buf()));
    let origin = FakeOrigin::with_seeds();
    let registration = active_registration(&storage, &origin, "v1").await;
    let calls_after_install = origin.calls();
    let stats_before = storage.stats().await;

    let outcome = registration.fetch(request("/api/data", RequestMode::Cors)).await;

    assert!(outcome.is_passthrough());
    assert_eq!(origin.calls(), calls_after_install);
    let stats_after = storage.stats().await;
    assert_eq!(stats_after.hits, stats_before.hits);
    assert_eq!(stats_after.misses, stats_before.misses);
    assert_eq!(stats_after.entries, stats_before.entries);
}

#[tokio::test]
async fn failed_logo_seed_keeps_previous_version() {
    let dir = tempdir().unwrap();
    let storage = Arc::new(FileStorage::new(dir.path().to_path_buf()));
    let origin = FakeOrigin::with_seeds();
    let registration = active_registration(&storage, &origin, "vA").await;

    origin.reject("/logo.png");
    let next = Arc::new(ServiceWorker::new(config("vB"), storage.clone(), origin.clone()).unwrap());
    let err = registration.register(next.clone()).await.unwrap_err();

    assert!(matches!(err, OfflineCacheError::SeedPriming { .. }));
    assert_eq!(next.state().await, WorkerState::Redundant);
    assert_eq!(
        registration.status().await,
        Some(("vA".to_string(), WorkerState::Active))
    );
    assert!(storage.get("vA", &key("/offline.html")).await.unwrap().is_some());
    assert_eq!(storage.namespaces().await.unwrap(), vec!["vA"]);
}

#[tokio::test]
async fn version_bump_leaves_only_the_new_namespace() {
    let dir = tempdir().unwrap();
    let origin = FakeOrigin::with_seeds();

    // First process run with vA, plus a leftover from an even older release
    {
        let storage = Arc::new(FileStorage::new(dir.path().to_path_buf()));
        storage.open("v0-legacy").await.unwrap();
        active_registration(&storage, &origin, "vA").await;
    }

    // Restart with vB against the same cache directory
    let storage = Arc::new(FileStorage::new(dir.path().to_path_buf()));
    let registration = Registration::new();
    let worker = ServiceWorker::new(config("vB"), storage.clone(), origin.clone()).unwrap();
    let outcome = registration.register(Arc::new(worker)).await.unwrap();

    let RegisterOutcome::Activated(report) = outcome else {
        panic!("expected activation");
    };
    assert!(report.failed.is_empty());
    assert_eq!(storage.namespaces().await.unwrap(), vec!["vB"]);
    assert!(storage.get("vB", &key("/offline.html")).await.unwrap().is_some());
    assert!(storage.get("vB", &key("/logo.png")).await.unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn navigation_success_is_verbatim_even_when_offline_page_exists() {
    let dir = tempdir().unwrap();
    let storage = Arc::new(FileStorage::new(dir.path().to_path_buf()));
    let origin = FakeOrigin::with_seeds();
    let page = StoredResponse::new(
        200,
        vec![
            ("content-type".to_string(), "text/html".to_string()),
            ("etag".to_string(), "\"abc\"".to_string()),
        ],
        b"<h1>Dashboard</h1>".to_vec(),
    );
    origin.serve("/dashboard", page.clone());
    let registration = active_registration(&storage, &origin, "v1").await;

    let outcome = registration
        .fetch(request("/dashboard", RequestMode::Navigate))
        .await;
    assert_eq!(outcome.served().unwrap().response, page);

    origin.unplug("/dashboard");
    let outcome = registration
        .fetch(request("/dashboard", RequestMode::Navigate))
        .await;
    assert_eq!(
        outcome.served().unwrap().source,
        ResponseSource::OfflineFallback
    );
}
