//! Admin endpoint payloads

use offline_cache::{ActivationReport, CacheStats, WorkerState, DEFAULT_LOG_LIMIT};
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    /// Version of the controlling worker, if any
    pub version: Option<String>,
    pub state: Option<WorkerState>,
    pub waiting: Option<String>,
    pub cache: CacheStats,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_LOG_LIMIT
}

#[derive(Debug, Serialize)]
pub struct SkipWaitingResponse {
    pub activated: Option<ActivationReport>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
