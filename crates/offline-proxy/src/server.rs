//! HTTP server: intercepts every request and exposes admin endpoints
//!
//! Admin endpoints live under `/__offline/`: health, captured logs, and
//! skip-waiting. Everything else goes through the controlling worker.

use crate::types::{ErrorResponse, HealthResponse, LogsQuery, SkipWaitingResponse};
use crate::upstream::is_hop_by_hop;
use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use offline_cache::{
    CacheStorage, FetchOutcome, FetchRequest, Fetcher, LogBuffer, Registration, RequestMode,
    ResponseSource, StoredResponse,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use url::Url;

const CACHE_SOURCE_HEADER: &str = "x-offline-cache";

/// Shared state for the HTTP server
pub struct ServerState {
    pub registration: Arc<Registration>,
    pub storage: Arc<dyn CacheStorage>,
    /// Used for requests the worker does not intercept
    pub upstream: Arc<dyn Fetcher>,
    pub logs: LogBuffer,
    pub public_origin: Url,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(
        registration: Arc<Registration>,
        storage: Arc<dyn CacheStorage>,
        upstream: Arc<dyn Fetcher>,
        logs: LogBuffer,
        public_origin: Url,
    ) -> Self {
        Self {
            registration,
            storage,
            upstream,
            logs,
            public_origin,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    let admin = Router::new()
        .route("/__offline/health", get(health))
        .route("/__offline/logs", get(get_logs).delete(clear_logs))
        .route("/__offline/skip-waiting", post(skip_waiting))
        .layer(CorsLayer::permissive());

    // Passthrough uploads are forwarded whole, whatever their size
    Router::new()
        .merge(admin)
        .fallback(intercept)
        .layer(DefaultBodyLimit::disable())
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(state: SharedState, port: u16) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds() as u64;
    let (version, worker_state) = match state.registration.status().await {
        Some((version, worker_state)) => (Some(version), Some(worker_state)),
        None => (None, None),
    };
    let waiting = state
        .registration
        .waiting()
        .await
        .map(|w| w.version().to_string());

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        version,
        state: worker_state,
        waiting,
        cache: state.storage.stats().await,
    })
}

async fn get_logs(
    State(state): State<SharedState>,
    Query(params): Query<LogsQuery>,
) -> Response {
    Json(state.logs.recent(params.limit)).into_response()
}

async fn clear_logs(State(state): State<SharedState>) -> StatusCode {
    state.logs.clear();
    StatusCode::NO_CONTENT
}

async fn skip_waiting(State(state): State<SharedState>) -> Response {
    match state.registration.skip_waiting().await {
        Ok(activated) => Json(SkipWaitingResponse { activated }).into_response(),
        Err(e) => {
            error!(error = %e, "Skip waiting failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Activation failed")
        }
    }
}

/// Every non-admin request
async fn intercept(
    State(state): State<SharedState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = match fetch_request(&state.public_origin, &method, &uri, &headers, body) {
        Ok(request) => request,
        Err(e) => {
            warn!(uri = %uri, error = %e, "Rejected unparseable request URL");
            return error_response(StatusCode::BAD_REQUEST, "Invalid request URL");
        }
    };

    match state.registration.fetch(request.clone()).await {
        FetchOutcome::Respond(served) => stored_response(served.response, Some(served.source)),
        FetchOutcome::Passthrough(_) | FetchOutcome::Uncontrolled => {
            passthrough(&state, &request).await
        }
        FetchOutcome::Unresolved {
            classification,
            error,
        } => {
            warn!(
                url = %request.url,
                classification = %classification,
                error = %error,
                "Request unresolved"
            );
            error_response(StatusCode::GATEWAY_TIMEOUT, "Resource unavailable offline")
        }
    }
}

async fn passthrough(state: &ServerState, request: &FetchRequest) -> Response {
    match state.upstream.fetch(request).await {
        Ok(response) => stored_response(response, None),
        Err(e) => {
            warn!(url = %request.url, error = %e, "Upstream request failed");
            error_response(StatusCode::BAD_GATEWAY, "Upstream unavailable")
        }
    }
}

/// Build the intercepted request as the client addressed it
pub fn fetch_request(
    origin: &Url,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<FetchRequest, url::ParseError> {
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let url = match headers.get(header::HOST).and_then(|h| h.to_str().ok()) {
        Some(host) => Url::parse(&format!("{}://{}{}", origin.scheme(), host, path_and_query))?,
        None => origin.join(path_and_query)?,
    };

    let header_pairs = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    Ok(FetchRequest {
        method: method.as_str().to_string(),
        url,
        mode: request_mode(method, headers),
        headers: header_pairs,
        body: body.to_vec(),
    })
}

/// `Sec-Fetch-Mode` when the client sends it; otherwise an HTML-accepting GET
/// is a navigation and anything else a subresource load
pub fn request_mode(method: &Method, headers: &HeaderMap) -> RequestMode {
    if let Some(mode) = headers
        .get("sec-fetch-mode")
        .and_then(|v| v.to_str().ok())
        .and_then(RequestMode::from_fetch_mode)
    {
        return mode;
    }

    let accepts_html = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|accept| accept.contains("text/html"))
        .unwrap_or(false);

    if method == Method::GET && accepts_html {
        RequestMode::Navigate
    } else {
        RequestMode::NoCors
    }
}

fn stored_response(stored: StoredResponse, source: Option<ResponseSource>) -> Response {
    let status = StatusCode::from_u16(stored.status).unwrap_or(StatusCode::BAD_GATEWAY);

    let mut headers = HeaderMap::new();
    for (name, value) in &stored.headers {
        if is_hop_by_hop(name) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(name, value);
        }
    }
    if let Some(source) = source {
        headers.insert(
            HeaderName::from_static(CACHE_SOURCE_HEADER),
            HeaderValue::from_static(source.header_value()),
        );
    }

    (status, headers, Body::from(stored.body)).into_response()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}
