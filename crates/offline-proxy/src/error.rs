//! Error types for the offline proxy

use std::fmt;

#[derive(Debug)]
pub enum ProxyError {
    Worker(offline_cache::OfflineCacheError),
    Upstream(Box<reqwest::Error>),
    Io(Box<std::io::Error>),
    Config(String),
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::Worker(err) => write!(f, "Worker error: {}", err),
            ProxyError::Upstream(err) => write!(f, "Upstream error: {}", err),
            ProxyError::Io(err) => write!(f, "IO error: {}", err),
            ProxyError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for ProxyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProxyError::Worker(err) => Some(err),
            ProxyError::Upstream(err) => Some(err.as_ref()),
            ProxyError::Io(err) => Some(err.as_ref()),
            ProxyError::Config(_) => None,
        }
    }
}

impl From<offline_cache::OfflineCacheError> for ProxyError {
    fn from(err: offline_cache::OfflineCacheError) -> Self {
        ProxyError::Worker(err)
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        ProxyError::Upstream(Box::new(err))
    }
}

impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        ProxyError::Io(Box::new(err))
    }
}

impl From<url::ParseError> for ProxyError {
    fn from(err: url::ParseError) -> Self {
        ProxyError::Config(format!("invalid URL: {}", err))
    }
}

impl From<tracing_subscriber::filter::ParseError> for ProxyError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        ProxyError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
