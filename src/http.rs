//! HTTP transport for the ecosnap service
//!
//! Axum router with the classification proxy, the classification ledger, and
//! plain JSON health and metrics endpoints. Cross-origin access is open and
//! pre-flight requests are answered before authentication.

use std::any::Any;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{
        DefaultBodyLimit, Path, Query, State,
        rejection::{BytesRejection, QueryRejection},
    },
    http::{HeaderMap, HeaderName, Method, Request, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{self, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::classification::ClassificationResult;
use crate::config::{Config, LimitsConfig};
use crate::error::{EcoSnapError, Result};
use crate::service::Classifier;
use crate::store::{ClassificationRecord, ClassificationStore, NewClassification, Profile};

const LATENCY_WINDOW: usize = 256;

/// Shared state for HTTP server
#[derive(Clone)]
pub struct AppState {
    pub classifier: Classifier,
    pub store: Arc<dyn ClassificationStore>,
    pub limits: LimitsConfig,
    pub bearer_token: Option<String>,
    pub metrics: Arc<Mutex<HttpMetrics>>,
}

impl AppState {
    pub fn new(classifier: Classifier, store: Arc<dyn ClassificationStore>, config: &Config) -> Self {
        Self {
            classifier,
            store,
            limits: config.limits.clone(),
            bearer_token: config.runtime.bearer_token.clone(),
            metrics: Arc::new(Mutex::new(HttpMetrics::new())),
        }
    }
}

/// Metrics for HTTP server
#[derive(Debug, Clone)]
pub struct HttpMetrics {
    pub total_requests: u64,
    pub last_request_unix: u64,
    pub errors_total: u64,
    pub latencies: Vec<f64>, // ring buffer for p95
    pub classifications_total: u64,
    pub credits_awarded_total: u64,
    pub categories: HashMap<String, u64>,
    pub errors_by_kind: HashMap<String, u64>,
}

impl HttpMetrics {
    fn new() -> Self {
        Self {
            total_requests: 0,
            last_request_unix: unix_now(),
            errors_total: 0,
            latencies: Vec::with_capacity(LATENCY_WINDOW),
            classifications_total: 0,
            credits_awarded_total: 0,
            categories: HashMap::new(),
            errors_by_kind: HashMap::new(),
        }
    }

    fn observe_classification(&mut self, outcome: &Result<ClassificationResult>) {
        match outcome {
            Ok(result) => {
                self.classifications_total = self.classifications_total.saturating_add(1);
                self.credits_awarded_total = self
                    .credits_awarded_total
                    .saturating_add(u64::from(result.credits_earned));
                *self
                    .categories
                    .entry(result.category.to_string())
                    .or_default() += 1;
            }
            Err(e) => {
                *self.errors_by_kind.entry(e.kind().to_string()).or_default() += 1;
            }
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyRequest {
    #[serde(default)]
    pub image_base64: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

/// Health check endpoint
pub async fn health_handler() -> impl IntoResponse {
    "ok"
}

/// Classification proxy endpoint
pub async fn classify_handler(
    State(state): State<AppState>,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<Json<ClassificationResult>> {
    let outcome = classify_body(&state, body).await;
    state.metrics.lock().await.observe_classification(&outcome);
    outcome.map(Json)
}

async fn classify_body(
    state: &AppState,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<ClassificationResult> {
    let body = body.map_err(body_rejection)?;
    let request: ClassifyRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ClassifyRequest::default()
    } else {
        // Unreadable bodies are reported like any other unexpected failure
        serde_json::from_slice(&body).map_err(|e| EcoSnapError::Internal {
            message: e.to_string(),
        })?
    };
    state
        .classifier
        .classify_base64(request.image_base64.as_deref())
        .await
}

/// Oversized bodies keep their 413; anything else unreadable is bad input
fn body_rejection(e: BytesRejection) -> EcoSnapError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        EcoSnapError::PayloadTooLarge {
            message: e.body_text(),
        }
    } else {
        EcoSnapError::invalid_input(e.body_text())
    }
}

/// Record a classification for a user and bump their totals
pub async fn record_handler(
    State(state): State<AppState>,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<ClassificationRecord>)> {
    let body = body.map_err(body_rejection)?;
    let entry: NewClassification = serde_json::from_slice(&body)
        .map_err(|e| EcoSnapError::invalid_input(format!("Invalid request body: {}", e)))?;
    let record = state.store.record(entry).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn profile_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Profile>> {
    Ok(Json(state.store.profile(&user_id).await?))
}

pub async fn history_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    params: std::result::Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<Vec<ClassificationRecord>>> {
    let Query(params) = params.map_err(|e| EcoSnapError::invalid_input(e.body_text()))?;
    let limit = params
        .limit
        .unwrap_or(state.limits.history_default)
        .clamp(1, state.limits.history_max);
    Ok(Json(state.store.history(&user_id, limit).await?))
}

/// Metrics endpoint
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let metrics = state.metrics.lock().await.clone();

    let (avg_latency_ms, p95_latency_ms) = if metrics.latencies.is_empty() {
        (None, None)
    } else {
        let sum: f64 = metrics.latencies.iter().sum();
        let avg = sum / metrics.latencies.len() as f64;
        let mut sorted = metrics.latencies.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        let p95_idx = ((sorted.len() as f64 * 0.95) as usize).min(sorted.len() - 1);
        (Some(avg), sorted.get(p95_idx).copied())
    };

    Json(json!({
        "metrics_version": "1",
        "total_requests": metrics.total_requests,
        "last_request_unix": metrics.last_request_unix,
        "errors_total": metrics.errors_total,
        "avg_latency_ms": avg_latency_ms,
        "p95_latency_ms": p95_latency_ms,
        "classifications_total": metrics.classifications_total,
        "credits_awarded_total": metrics.credits_awarded_total,
        "categories": metrics.categories,
        "errors_by_kind": metrics.errors_by_kind,
    }))
}

async fn track_metrics(
    State(metrics): State<Arc<Mutex<HttpMetrics>>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let resp = next.run(req).await;
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

    let mut m = metrics.lock().await;
    m.latencies.push(latency_ms);
    if m.latencies.len() > LATENCY_WINDOW {
        m.latencies.remove(0);
    }
    if !resp.status().is_success() {
        m.errors_total = m.errors_total.saturating_add(1);
    }
    m.total_requests = m.total_requests.saturating_add(1);
    m.last_request_unix = unix_now();
    resp
}

async fn require_bearer(
    State(token): State<Option<String>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = token else {
        return next.run(req).await;
    };
    if req.uri().path() == "/health" || req.method() == Method::OPTIONS {
        return next.run(req).await;
    }
    let headers: &HeaderMap = req.headers();
    let header_ok = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|v| v == expected);
    if !header_ok {
        return EcoSnapError::Unauthorized.into_response();
    }
    next.run(req).await
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unknown error occurred".to_string()
    };
    EcoSnapError::Internal { message }.into_response()
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(cors::Any)
        .allow_methods(cors::Any)
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
        ])
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let body_limit = state.limits.request_body_limit();
    let metrics = state.metrics.clone();
    let token = state.bearer_token.clone();

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/classify-waste", post(classify_handler))
        .route("/classifications", post(record_handler))
        .route("/profiles/:user_id", get(profile_handler))
        .route("/profiles/:user_id/classifications", get(history_handler))
        .with_state(state)
        .layer(middleware::from_fn_with_state(token, require_bearer))
        .layer(middleware::from_fn_with_state(metrics, track_metrics))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(CatchPanicLayer::custom(handle_panic)),
        )
        .layer(cors_layer())
}

/// Start the HTTP server
pub async fn start_http_server(config: &Config, state: AppState) -> anyhow::Result<()> {
    if state.bearer_token.is_none() {
        tracing::warn!("ECOSNAP_BEARER_TOKEN is not set; all routes are unauthenticated");
    }

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.runtime.http_bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind HTTP listener: {}", e))?;

    tracing::info!(
        "Starting HTTP server on {} (model {})",
        config.runtime.http_bind,
        config.gateway.model
    );

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

    Ok(())
}
