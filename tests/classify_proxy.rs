//! End-to-end tests for the HTTP surface, driven in-process through the router
//! with a scripted chat gateway.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use ecosnap::clients::{ChatGateway, ChatRequest, GatewayError};
use ecosnap::config::Config;
use ecosnap::http::{AppState, router};
use ecosnap::service::Classifier;
use ecosnap::store::SqliteStore;

const PNG: &str = "data:image/png;base64,iVBORw0KGgo=";

type Script = Box<dyn Fn() -> Result<String, GatewayError> + Send + Sync>;

struct ScriptedGateway {
    script: Script,
    configured: bool,
    calls: AtomicUsize,
    last_request: Mutex<Option<Value>>,
}

impl ScriptedGateway {
    fn replying(reply: &str) -> Arc<Self> {
        let reply = reply.to_string();
        Self::with(Box::new(move || Ok(reply.clone())), true)
    }

    fn failing(make: fn() -> GatewayError) -> Arc<Self> {
        Self::with(Box::new(move || Err(make())), true)
    }

    fn with(script: Script, configured: bool) -> Arc<Self> {
        Arc::new(Self {
            script,
            configured,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatGateway for ScriptedGateway {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(serde_json::to_value(request).unwrap());
        (self.script)()
    }
}

fn state_with(gateway: Arc<ScriptedGateway>) -> AppState {
    let config = Config::default();
    let classifier = Classifier::new(gateway, &config);
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    AppState::new(classifier, store, &config)
}

fn app(gateway: Arc<ScriptedGateway>) -> Router {
    router(state_with(gateway))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, body)
}

#[tokio::test]
async fn classifies_reply_wrapped_in_code_fence() {
    let gw = ScriptedGateway::replying(
        "Here you go:\n```json\n{\"category\":\"organic\",\"confidence\":72,\"reasoning\":\"food scraps\"}\n```",
    );
    let app = app(gw.clone());

    let (status, body) = send(&app, post_json("/classify-waste", json!({ "imageBase64": PNG }))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "category": "organic",
            "confidence": 72,
            "reasoning": "food scraps",
            "creditsEarned": 10
        })
    );
    assert_eq!(gw.calls(), 1);

    let sent = gw.last_request.lock().unwrap().clone().unwrap();
    assert_eq!(sent["model"], "google/gemini-2.5-flash");
    assert!(sent["temperature"].as_f64().unwrap() < 0.5);
    assert_eq!(sent["messages"][0]["role"], "system");
    assert_eq!(sent["messages"][1]["content"][1]["image_url"]["url"], PNG);
}

#[tokio::test]
async fn missing_image_is_rejected_without_upstream_call() {
    let gw = ScriptedGateway::replying("{}");
    let app = app(gw.clone());

    for body in [json!({}), json!({ "imageBase64": "" }), json!({ "imageBase64": null })] {
        let (status, resp) = send(&app, post_json("/classify-waste", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp, json!({ "error": "Image data is required" }));
    }

    let empty = Request::builder()
        .method("POST")
        .uri("/classify-waste")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, empty).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(gw.calls(), 0);
}

#[tokio::test]
async fn non_image_payload_is_rejected_without_upstream_call() {
    let gw = ScriptedGateway::replying("{}");
    let app = app(gw.clone());

    let (status, resp) = send(
        &app,
        post_json(
            "/classify-waste",
            json!({ "imageBase64": "data:text/plain;base64,aGVsbG8=" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(resp["error"], "Please select an image file");
    assert_eq!(gw.calls(), 0);
}

#[tokio::test]
async fn missing_credentials_fail_before_upstream_call() {
    let gw = ScriptedGateway::with(Box::new(|| Ok(String::new())), false);
    let app = app(gw.clone());

    let (status, resp) = send(&app, post_json("/classify-waste", json!({ "imageBase64": PNG }))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp, json!({ "error": "AI service not configured" }));
    assert_eq!(gw.calls(), 0);
}

#[tokio::test]
async fn upstream_failures_map_to_stable_statuses() {
    let cases: [(fn() -> GatewayError, StatusCode, &str); 4] = [
        (
            || GatewayError::RateLimited,
            StatusCode::TOO_MANY_REQUESTS,
            "Rate limit exceeded. Please try again later.",
        ),
        (
            || GatewayError::QuotaExhausted,
            StatusCode::PAYMENT_REQUIRED,
            "AI credits exhausted. Please add credits to continue.",
        ),
        (
            || GatewayError::Status {
                status: 503,
                body: "rate limit".to_string(),
            },
            StatusCode::INTERNAL_SERVER_ERROR,
            "AI classification failed",
        ),
        (
            || GatewayError::EmptyReply,
            StatusCode::INTERNAL_SERVER_ERROR,
            "No response from AI service",
        ),
    ];

    for (make, expected_status, expected_message) in cases {
        let gw = ScriptedGateway::failing(make);
        let app = app(gw.clone());
        let (status, resp) =
            send(&app, post_json("/classify-waste", json!({ "imageBase64": PNG }))).await;
        assert_eq!(status, expected_status);
        assert_eq!(resp, json!({ "error": expected_message }));
        assert_eq!(gw.calls(), 1, "no retries");
    }
}

#[tokio::test]
async fn unparseable_reply_is_malformed() {
    let gw = ScriptedGateway::replying("Sorry, I can't tell what this is.");
    let app = app(gw.clone());

    let (status, resp) = send(&app, post_json("/classify-waste", json!({ "imageBase64": PNG }))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp, json!({ "error": "Failed to parse classification result" }));
}

#[tokio::test]
async fn reply_without_category_is_invalid() {
    let gw = ScriptedGateway::replying(r#"{"confidence": 88, "reasoning": "shiny"}"#);
    let app = app(gw.clone());

    let (status, resp) = send(&app, post_json("/classify-waste", json!({ "imageBase64": PNG }))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp, json!({ "error": "Invalid classification result" }));
}

#[tokio::test]
async fn unreadable_body_is_reported_as_server_error() {
    let gw = ScriptedGateway::replying("{}");
    let app = app(gw.clone());

    let req = Request::builder()
        .method("POST")
        .uri("/classify-waste")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, resp) = send(&app, req).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(resp["error"].as_str().is_some_and(|s| !s.is_empty()));
    assert_eq!(gw.calls(), 0);
}

#[tokio::test]
async fn preflight_is_answered_permissively_even_with_auth() {
    let gw = ScriptedGateway::replying("{}");
    let mut state = state_with(gw.clone());
    state.bearer_token = Some("secret".to_string());
    let app = router(state);

    let req = Request::builder()
        .method("OPTIONS")
        .uri("/classify-waste")
        .header(header::ORIGIN, "https://ecosnap.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type, apikey")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();

    assert!(resp.status().is_success());
    assert_eq!(
        resp.headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert!(body.is_empty());
    assert_eq!(gw.calls(), 0);
}

#[tokio::test]
async fn bearer_token_guards_routes_except_health() {
    let gw = ScriptedGateway::replying(r#"{"category":"general","confidence":40}"#);
    let mut state = state_with(gw.clone());
    state.bearer_token = Some("secret".to_string());
    let app = router(state);

    let (status, resp) = send(&app, post_json("/classify-waste", json!({ "imageBase64": PNG }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp, json!({ "error": "Unauthorized" }));

    let (status, _) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);

    let mut req = post_json("/classify-waste", json!({ "imageBase64": PNG }));
    req.headers_mut()
        .insert(header::AUTHORIZATION, "Bearer secret".parse().unwrap());
    let (status, resp) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resp["creditsEarned"], 5);
    assert_eq!(gw.calls(), 1);
}

#[tokio::test]
async fn ledger_records_and_aggregates() {
    let app = app(ScriptedGateway::replying("{}"));

    let (status, rec) = send(
        &app,
        post_json(
            "/classifications",
            json!({
                "userId": "user-1",
                "imageUrl": "https://cdn.example/user-1/1.jpg",
                "category": "organic",
                "confidence": 72,
                "creditsEarned": 999
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(rec["creditsEarned"], 10);
    assert_eq!(rec["predictedCategory"], "organic");

    let (status, _) = send(
        &app,
        post_json(
            "/classifications",
            json!({ "userId": "user-1", "category": "hazardous", "confidence": 91 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, profile) = send(&app, get("/profiles/user-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["totalCredits"], 25);
    assert_eq!(profile["totalClassifications"], 2);

    let (status, history) = send(&app, get("/profiles/user-1/classifications?limit=1")).await;
    assert_eq!(status, StatusCode::OK);
    let rows = history.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["predictedCategory"], "hazardous");

    let (status, resp) = send(&app, get("/profiles/nobody")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(resp["error"].is_string());

    for uri in [
        "/profiles/user-1/classifications?limit=abc",
        "/profiles/user-1/classifications?limit=-1",
    ] {
        let (status, resp) = send(&app, get(uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert!(resp["error"].is_string(), "{}", uri);
    }

    let (status, _) = send(
        &app,
        post_json(
            "/classifications",
            json!({ "userId": "user-1", "category": "compost", "confidence": 50 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_body_is_payload_too_large() {
    let gw = ScriptedGateway::replying("{}");
    let mut config = Config::default();
    config.limits.max_image_bytes = 1024;
    let limit = config.limits.request_body_limit();
    let state = AppState::new(
        Classifier::new(gw.clone(), &config),
        Arc::new(SqliteStore::in_memory().unwrap()),
        &config,
    );
    let app = router(state);

    let huge = "A".repeat(limit + 1024);
    for uri in ["/classify-waste", "/classifications"] {
        let (status, resp) = send(&app, post_json(uri, json!({ "imageBase64": huge }))).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE, "{}", uri);
        assert!(resp["error"].is_string(), "{}", uri);
    }
    assert_eq!(gw.calls(), 0);
}

#[tokio::test]
async fn metrics_count_classifications() {
    let app = app(ScriptedGateway::replying(
        r#"{"category":"recyclable","confidence":85,"reasoning":"can"}"#,
    ));

    send(&app, post_json("/classify-waste", json!({ "imageBase64": PNG }))).await;
    send(&app, post_json("/classify-waste", json!({}))).await;

    let (status, metrics) = send(&app, get("/metrics")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(metrics["classifications_total"], 1);
    assert_eq!(metrics["credits_awarded_total"], 15);
    assert_eq!(metrics["categories"]["recyclable"], 1);
    assert_eq!(metrics["errors_by_kind"]["invalid_input"], 1);
    assert_eq!(metrics["total_requests"], 2);
    assert_eq!(metrics["errors_total"], 1);
}
