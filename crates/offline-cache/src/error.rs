//! Error types for the offline cache

use std::fmt;
use std::time::Duration;

#[derive(Debug)]
pub enum OfflineCacheError {
    /// The network race timer elapsed before the fetch resolved
    Timeout(Duration),
    /// The underlying fetch was rejected
    Network(String),
    /// No cached entry exists for the request key
    CacheMiss(String),
    /// A cache write was rejected or failed
    CacheWrite(String),
    /// A seed resource could not be fetched during install
    SeedPriming { path: String, reason: String },
    Storage(Box<std::io::Error>),
    Serialization(String),
    InvalidTransition { state: String, event: String },
    Config(String),
}

impl OfflineCacheError {
    /// Whether the error came out of the network race (and is recoverable by fallback)
    pub fn is_network_failure(&self) -> bool {
        matches!(
            self,
            OfflineCacheError::Timeout(_) | OfflineCacheError::Network(_)
        )
    }
}

impl fmt::Display for OfflineCacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OfflineCacheError::Timeout(after) => {
                write!(f, "Network timed out after {}ms", after.as_millis())
            }
            OfflineCacheError::Network(msg) => write!(f, "Network error: {}", msg),
            OfflineCacheError::CacheMiss(key) => write!(f, "No cached entry for {}", key),
            OfflineCacheError::CacheWrite(msg) => write!(f, "Cache write failed: {}", msg),
            OfflineCacheError::SeedPriming { path, reason } => {
                write!(f, "Failed to prime seed resource {}: {}", path, reason)
            }
            OfflineCacheError::Storage(err) => write!(f, "Storage error: {}", err),
            OfflineCacheError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            OfflineCacheError::InvalidTransition { state, event } => {
                write!(f, "Invalid lifecycle transition: {} in state {}", event, state)
            }
            OfflineCacheError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for OfflineCacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OfflineCacheError::Storage(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for OfflineCacheError {
    fn from(err: std::io::Error) -> Self {
        OfflineCacheError::Storage(Box::new(err))
    }
}

impl From<serde_json::Error> for OfflineCacheError {
    fn from(err: serde_json::Error) -> Self {
        OfflineCacheError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for OfflineCacheError {
    fn from(err: url::ParseError) -> Self {
        OfflineCacheError::Config(format!("invalid URL: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, OfflineCacheError>;
