//! Core request/response types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// How the client issued the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    /// Top-level document load
    Navigate,
    SameOrigin,
    NoCors,
    Cors,
}

impl RequestMode {
    /// Parse a `Sec-Fetch-Mode` header value
    pub fn from_fetch_mode(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "navigate" => Some(RequestMode::Navigate),
            "same-origin" => Some(RequestMode::SameOrigin),
            "no-cors" => Some(RequestMode::NoCors),
            "cors" => Some(RequestMode::Cors),
            _ => None,
        }
    }
}

/// An intercepted request
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: String,
    pub url: Url,
    pub mode: RequestMode,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl FetchRequest {
    /// A bodiless GET request
    pub fn get(url: Url, mode: RequestMode) -> Self {
        Self {
            method: "GET".to_string(),
            url,
            mode,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Cache identity for this request
    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, &self.url)
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }
}

/// Request identity used as the key within a cache namespace (method + URL)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn new(method: &str, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self(format!("{} {}", method.to_ascii_uppercase(), url))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A response as produced by the network or stored in a namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    #[serde(skip)]
    pub body: Vec<u8>,
    pub stored_at: DateTime<Utc>,
}

impl StoredResponse {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
            stored_at: Utc::now(),
        }
    }

    pub fn ok(body: impl Into<Vec<u8>>, content_type: &str) -> Self {
        Self::new(
            200,
            vec![("content-type".to_string(), content_type.to_string())],
            body.into(),
        )
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Where a served response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResponseSource {
    Network,
    Cache,
    OfflineFallback,
}

impl ResponseSource {
    /// Value used for the `X-Offline-Cache` response header
    pub fn header_value(&self) -> &'static str {
        match self {
            ResponseSource::Network => "NETWORK",
            ResponseSource::Cache => "HIT",
            ResponseSource::OfflineFallback => "OFFLINE",
        }
    }
}

/// Statistics about a cache backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub namespaces: usize,
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}
