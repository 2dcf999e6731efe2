//! Upstream origin fetching

use crate::error::Result;
use async_trait::async_trait;
use offline_cache::{FetchRequest, Fetcher, OfflineCacheError, StoredResponse};
use reqwest::Client;
use tracing::debug;
use url::Url;

/// Headers that describe a single connection and must not be forwarded
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Fetches requests from the real origin behind the proxy
pub struct UpstreamFetcher {
    client: Client,
    upstream: Url,
}

impl UpstreamFetcher {
    pub fn new(upstream: Url) -> Result<Self> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client, upstream })
    }

    /// Rebase a request URL onto the upstream origin, keeping path and query
    pub fn upstream_url(&self, url: &Url) -> Url {
        let mut target = self.upstream.clone();
        let base_path = self.upstream.path().trim_end_matches('/');
        target.set_path(&format!("{}{}", base_path, url.path()));
        target.set_query(url.query());
        target
    }

    async fn send(&self, request: &FetchRequest) -> reqwest::Result<StoredResponse> {
        let target = self.upstream_url(&request.url);
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .unwrap_or(reqwest::Method::GET);

        let mut builder = self.client.request(method, target.clone());
        for (name, value) in &request.headers {
            if !is_hop_by_hop(name) {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        debug!(url = %target, status, size = body.len(), "Fetched from upstream");
        Ok(StoredResponse::new(status, headers, body))
    }
}

#[async_trait]
impl Fetcher for UpstreamFetcher {
    async fn fetch(&self, request: &FetchRequest) -> offline_cache::Result<StoredResponse> {
        self.send(request)
            .await
            .map_err(|e| OfflineCacheError::Network(e.to_string()))
    }
}
