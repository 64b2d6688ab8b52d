// tests/common/mod.rs
//
// Shared helpers: throwaway mock upstreams on 127.0.0.1:0, fakes with call
// counters, and small request/response utilities.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Request, Response},
    Router,
};
use serde_json::Value;
use tokio::net::TcpListener;

use dealer_reviews_bff::auth::InMemoryIdentityProvider;
use dealer_reviews_bff::catalog::InMemoryCatalogStore;
use dealer_reviews_bff::error::{SubmitError, UpstreamError};
use dealer_reviews_bff::model::{
    Dealer, DealerId, Fetched, Review, SentimentResult, StateFilter,
};
use dealer_reviews_bff::reviews::ReviewStore;
use dealer_reviews_bff::sentiment::SentimentClassifier;
use dealer_reviews_bff::{AppState, GatewayConfig};

pub const BODY_LIMIT: usize = 1024 * 1024;

/// Serve `router` on an ephemeral local port; returns its base URL.
pub async fn spawn_upstream(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock upstream");
    let addr = listener.local_addr().expect("mock upstream addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("mock upstream died");
    });
    format!("http://{addr}")
}

/// A base URL nothing listens on.
pub async fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    format!("http://{addr}")
}

pub fn test_config(backend_url: &str, sentiment_url: &str) -> GatewayConfig {
    GatewayConfig {
        backend_url: backend_url.to_string(),
        sentiment_analyzer_url: sentiment_url.to_string(),
        request_timeout_secs: 2,
        get_retries: 0,
        retry_base_delay_ms: 10,
        ..GatewayConfig::default()
    }
}

pub async fn body_json(resp: Response<Body>) -> Value {
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("body is json")
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build GET")
}

pub fn post_json(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut b = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(c) = cookie {
        b = b.header("cookie", c);
    }
    b.body(Body::from(body.to_string())).expect("build POST")
}

/// `sessionid=<token>` taken from a Set-Cookie response header.
pub fn session_cookie_of(resp: &Response<Body>) -> String {
    let raw = resp
        .headers()
        .get("set-cookie")
        .and_then(|h| h.to_str().ok())
        .expect("set-cookie present");
    raw.split(';').next().expect("cookie pair").to_string()
}

/// Review store fake: fixed data, counts every call.
#[derive(Default)]
pub struct CountingStore {
    pub reviews: Vec<Review>,
    pub dealers: Vec<Dealer>,
    pub submit_answer: Option<Result<Value, SubmitError>>,
    pub calls: AtomicUsize,
    pub submits: AtomicUsize,
}

impl CountingStore {
    pub fn with_reviews(texts: &[&str]) -> Self {
        Self {
            reviews: texts
                .iter()
                .enumerate()
                .map(|(i, t)| Review::with_text(i as i64 + 1, 5, t))
                .collect(),
            ..Self::default()
        }
    }

    pub fn total_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst) + self.submits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReviewStore for CountingStore {
    async fn fetch_reviews(&self, _dealer_id: DealerId) -> Fetched<Vec<Review>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Fetched::ok(self.reviews.clone())
    }

    async fn fetch_dealers(&self, _filter: &StateFilter) -> Fetched<Vec<Dealer>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Fetched::ok(self.dealers.clone())
    }

    async fn fetch_dealer_detail(&self, dealer_id: DealerId) -> Fetched<Option<Value>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Fetched::ok(Some(serde_json::json!({ "id": dealer_id.get() })))
    }

    async fn submit_review(&self, _payload: &Value) -> Result<Value, SubmitError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        self.submit_answer
            .clone()
            .unwrap_or_else(|| Ok(serde_json::json!({ "status": "success" })))
    }
}

/// "Great service" → positive, "Terrible wait" → transport failure, anything else → neutral.
pub struct ScenarioClassifier;

#[async_trait]
impl SentimentClassifier for ScenarioClassifier {
    async fn classify(&self, text: &str) -> Result<Option<SentimentResult>, UpstreamError> {
        match text {
            "Great service" => Ok(Some(SentimentResult {
                sentiment: Some("positive".into()),
            })),
            "Terrible wait" => Err(UpstreamError::Network {
                url: "http://sentiment/analyze".into(),
                message: "connection reset".into(),
            }),
            _ => Ok(Some(SentimentResult {
                sentiment: Some("neutral".into()),
            })),
        }
    }
}

pub fn state_with(store: Arc<CountingStore>) -> AppState {
    AppState::new(
        store,
        Arc::new(ScenarioClassifier),
        Arc::new(InMemoryIdentityProvider::new(std::time::Duration::from_secs(600))),
        Arc::new(InMemoryCatalogStore::default()),
        &GatewayConfig::default(),
    )
}
