//! Offline-first request interception
//!
//! Classifies each request for an origin, races the network against a
//! timeout, and falls back to a versioned cache namespace for page
//! navigations and static assets. Install primes the namespace with seed
//! resources; activate drops every namespace left behind by older versions.

pub mod classify;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logs;
pub mod race;
pub mod registration;
pub mod storage;
pub mod strategy;
pub mod types;
pub mod worker;

pub use classify::{classify, Classification};
pub use config::{LateResponse, WorkerConfig};
pub use error::{OfflineCacheError, Result};
pub use lifecycle::{ActivationReport, LifecycleAction, LifecycleEvent, WorkerState};
pub use logs::{LogBuffer, LogCaptureLayer, LogEntry, DEFAULT_LOG_LIMIT};
pub use race::{Fetcher, NetworkRace};
pub use registration::{RegisterOutcome, Registration};
pub use storage::{CacheStorage, FileStorage, MemoryStorage};
pub use strategy::{CacheStrategy, FetchOutcome, Served};
pub use types::{CacheStats, FetchRequest, RequestKey, RequestMode, ResponseSource, StoredResponse};
pub use worker::{EventResult, ServiceWorker, WorkerEvent};
