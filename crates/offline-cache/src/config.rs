//! Worker configuration, passed explicitly into every entry point

use crate::error::{OfflineCacheError, Result};
use std::collections::BTreeSet;
use std::time::Duration;
use url::Url;

pub const DEFAULT_VERSION: &str = "offline-cache-v1";
pub const DEFAULT_OFFLINE_PATH: &str = "/offline.html";
pub const DEFAULT_API_PREFIX: &str = "/api/";
pub const DEFAULT_NETWORK_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_SEED_PATHS: &[&str] = &["/offline.html", "/logo.png"];
pub const DEFAULT_STATIC_EXTENSIONS: &[&str] = &[
    "js", "mjs", "css", "png", "jpg", "jpeg", "gif", "svg", "ico", "webp", "avif", "woff",
    "woff2", "ttf", "otf", "eot",
];

/// What to do with a network fetch that loses the race against the timer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LateResponse {
    /// Stop waiting; let the fetch finish in the background and drop its result
    #[default]
    Discard,
    /// Abort the fetch task as soon as the timer wins
    Abort,
}

/// Configuration for a single worker version
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Cache namespace owned by this version
    pub version: String,
    /// Origin the worker serves; requests to any other origin are external
    pub origin: Url,
    pub api_prefix: String,
    pub offline_path: String,
    pub seed_paths: Vec<String>,
    pub network_timeout: Duration,
    /// Lowercase file extensions (without the dot) treated as static assets
    pub static_extensions: BTreeSet<String>,
    /// Activate right after install instead of waiting for the old version to go away
    pub skip_waiting: bool,
    pub late_response: LateResponse,
}

impl WorkerConfig {
    /// Configuration with the default constants for the given serving origin
    pub fn new(origin: Url) -> Self {
        Self {
            version: DEFAULT_VERSION.to_string(),
            origin,
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            offline_path: DEFAULT_OFFLINE_PATH.to_string(),
            seed_paths: DEFAULT_SEED_PATHS.iter().map(|s| s.to_string()).collect(),
            network_timeout: DEFAULT_NETWORK_TIMEOUT,
            static_extensions: DEFAULT_STATIC_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            skip_waiting: true,
            late_response: LateResponse::Discard,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_seed_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.seed_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_network_timeout(mut self, timeout: Duration) -> Self {
        self.network_timeout = timeout;
        self
    }

    pub fn with_skip_waiting(mut self, skip_waiting: bool) -> Self {
        self.skip_waiting = skip_waiting;
        self
    }

    pub fn with_late_response(mut self, late_response: LateResponse) -> Self {
        self.late_response = late_response;
        self
    }

    /// Parse a comma-separated extension list, tolerating leading dots and whitespace
    pub fn parse_extensions(list: &str) -> BTreeSet<String> {
        list.split(',')
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect()
    }

    /// Absolute URL of a path on the serving origin
    pub fn resolve(&self, path: &str) -> Result<Url> {
        Ok(self.origin.join(path)?)
    }

    /// Check invariants that the rest of the crate relies on
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(OfflineCacheError::Config("version must not be empty".into()));
        }
        if !self.api_prefix.starts_with('/') {
            return Err(OfflineCacheError::Config(format!(
                "api prefix must start with '/': {}",
                self.api_prefix
            )));
        }
        if !self.offline_path.starts_with('/') {
            return Err(OfflineCacheError::Config(format!(
                "offline path must start with '/': {}",
                self.offline_path
            )));
        }
        if let Some(bad) = self.seed_paths.iter().find(|p| !p.starts_with('/')) {
            return Err(OfflineCacheError::Config(format!(
                "seed path must start with '/': {}",
                bad
            )));
        }
        if self.network_timeout.is_zero() {
            return Err(OfflineCacheError::Config(
                "network timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
