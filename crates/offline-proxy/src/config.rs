use crate::error::{ProxyError, Result};
use offline_cache::config::{
    DEFAULT_API_PREFIX, DEFAULT_OFFLINE_PATH, DEFAULT_SEED_PATHS, DEFAULT_STATIC_EXTENSIONS,
    DEFAULT_VERSION,
};
use offline_cache::{LateResponse, WorkerConfig};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Proxy configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub port: u16,
    /// Where requests are actually served from
    pub upstream_url: Url,
    /// Origin clients use to reach the proxy
    pub public_origin: Url,
    /// On-disk namespace storage; in-memory when unset
    pub cache_dir: Option<PathBuf>,
    pub version: String,
    pub network_timeout: Duration,
    pub offline_path: String,
    pub seed_paths: Vec<String>,
    pub api_prefix: String,
    pub static_extensions: String,
    pub skip_waiting: bool,
    pub abort_late_fetch: bool,
}

impl ProxyConfig {
    /// Parse configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let port = lookup("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let upstream_url = Url::parse(
            &lookup("UPSTREAM_URL").unwrap_or_else(|| "http://localhost:5173".to_string()),
        )?;

        let public_origin = Url::parse(
            &lookup("PUBLIC_ORIGIN").unwrap_or_else(|| format!("http://localhost:{}", port)),
        )?;

        let cache_dir = lookup("CACHE_DIR").map(PathBuf::from);

        let version = lookup("CACHE_VERSION").unwrap_or_else(|| DEFAULT_VERSION.to_string());

        let network_timeout = lookup("NETWORK_TIMEOUT_MS")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(5000));

        let offline_path =
            lookup("OFFLINE_PATH").unwrap_or_else(|| DEFAULT_OFFLINE_PATH.to_string());

        let seed_paths = lookup("SEED_PATHS")
            .map(|s| {
                s.split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| DEFAULT_SEED_PATHS.iter().map(|s| s.to_string()).collect());

        let api_prefix = lookup("API_PREFIX").unwrap_or_else(|| DEFAULT_API_PREFIX.to_string());

        let static_extensions =
            lookup("STATIC_EXTENSIONS").unwrap_or_else(|| DEFAULT_STATIC_EXTENSIONS.join(","));

        let skip_waiting = lookup("SKIP_WAITING")
            .map(|v| parse_bool(&v))
            .unwrap_or(true);

        let abort_late_fetch = lookup("ABORT_LATE_FETCH")
            .map(|v| parse_bool(&v))
            .unwrap_or(false);

        if upstream_url.cannot_be_a_base() {
            return Err(ProxyError::Config(format!(
                "UPSTREAM_URL is not a base URL: {}",
                upstream_url
            )));
        }

        Ok(Self {
            port,
            upstream_url,
            public_origin,
            cache_dir,
            version,
            network_timeout,
            offline_path,
            seed_paths,
            api_prefix,
            static_extensions,
            skip_waiting,
            abort_late_fetch,
        })
    }

    /// Worker configuration for the version this process serves
    pub fn worker_config(&self) -> WorkerConfig {
        let mut config = WorkerConfig::new(self.public_origin.clone())
            .with_version(self.version.clone())
            .with_seed_paths(self.seed_paths.clone())
            .with_network_timeout(self.network_timeout)
            .with_skip_waiting(self.skip_waiting)
            .with_late_response(if self.abort_late_fetch {
                LateResponse::Abort
            } else {
                LateResponse::Discard
            });
        config.api_prefix = self.api_prefix.clone();
        config.offline_path = self.offline_path.clone();
        config.static_extensions = WorkerConfig::parse_extensions(&self.static_extensions);
        config
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
