// tests/upstream_client.rs
//
// UpstreamClient against real sockets: mock upstreams are tiny Axum routers
// bound to 127.0.0.1:0.

mod common;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use common::{spawn_upstream, test_config, unreachable_url};
use dealer_reviews_bff::error::UpstreamError;
use dealer_reviews_bff::model::{DealerId, StateFilter, UpstreamStatus};
use dealer_reviews_bff::reviews::{HttpReviewStore, ReviewStore};
use dealer_reviews_bff::sentiment::{HttpSentimentClassifier, SentimentClassifier};
use dealer_reviews_bff::upstream::UpstreamClient;

fn mock_router() -> Router {
    Router::new()
        .route(
            "/echo/{segment}",
            get(
                |Path(segment): Path<String>, Query(q): Query<HashMap<String, String>>| async move {
                    Json(json!({ "segment": segment, "query": q }))
                },
            ),
        )
        .route(
            "/broken",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        )
        .route("/not-json", get(|| async { "plain text" }))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                Json(json!({ "late": true }))
            }),
        )
        .route(
            "/insert_review",
            post(|Json(body): Json<Value>| async move {
                (StatusCode::CREATED, Json(json!({ "status": "success", "echo": body })))
            }),
        )
        .route(
            "/insert_text",
            post(|| async { (StatusCode::CREATED, "created, but not json") }),
        )
}

#[tokio::test]
async fn get_decodes_json_and_encodes_segments_and_query() {
    let base = spawn_upstream(mock_router()).await;
    let client = UpstreamClient::new("test", &base, &test_config(&base, &base)).unwrap();

    let v = client
        .get(&["echo", "New York/East"], &[("filter", "a&b=c")])
        .await
        .expect("echo ok");

    assert_eq!(v["segment"], json!("New York/East"));
    assert_eq!(v["query"]["filter"], json!("a&b=c"));
}

#[tokio::test]
async fn get_non_success_status_is_rejected() {
    let base = spawn_upstream(mock_router()).await;
    let client = UpstreamClient::new("test", &base, &test_config(&base, &base)).unwrap();

    match client.get(&["broken"], &[]).await {
        Err(UpstreamError::Rejected { status, .. }) => assert_eq!(status, 500),
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn get_plain_text_is_invalid_body() {
    let base = spawn_upstream(mock_router()).await;
    let client = UpstreamClient::new("test", &base, &test_config(&base, &base)).unwrap();

    let err = client.get(&["not-json"], &[]).await.unwrap_err();
    assert_eq!(err.kind(), "invalid_response_body");
}

#[tokio::test]
async fn unreachable_upstream_is_a_network_error() {
    let base = unreachable_url().await;
    let client = UpstreamClient::new("test", &base, &test_config(&base, &base)).unwrap();

    let err = client.get(&["fetchDealers"], &[]).await.unwrap_err();
    assert!(err.is_network(), "got {err:?}");
}

#[tokio::test]
async fn network_failures_are_retried_with_backoff_for_get() {
    let base = unreachable_url().await;
    let mut cfg = test_config(&base, &base);
    cfg.get_retries = 2;
    cfg.retry_base_delay_ms = 25;
    let client = UpstreamClient::new("test", &base, &cfg).unwrap();

    let started = Instant::now();
    let err = client.get(&["fetchDealers"], &[]).await.unwrap_err();
    assert!(err.is_network());
    // 25ms + 50ms of backoff between the three attempts
    assert!(
        started.elapsed() >= Duration::from_millis(75),
        "retries finished too fast: {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn slow_get_hits_the_timeout() {
    let base = spawn_upstream(mock_router()).await;
    let mut cfg = test_config(&base, &base);
    cfg.request_timeout_secs = 1;
    let client = UpstreamClient::new("test", &base, &cfg).unwrap();

    let started = Instant::now();
    let err = client.get(&["slow"], &[]).await.unwrap_err();
    assert!(err.is_network(), "timeout should be a network error: {err:?}");
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn post_returns_status_and_decoded_body() {
    let base = spawn_upstream(mock_router()).await;
    let client = UpstreamClient::new("test", &base, &test_config(&base, &base)).unwrap();

    let (status, body) = client
        .post(&["insert_review"], &json!({ "dealership": 15, "review": "ok" }))
        .await
        .expect("post ok");
    assert_eq!(status.as_u16(), 201);
    assert_eq!(body["status"], json!("success"));
    assert_eq!(body["echo"]["dealership"], json!(15));
}

#[tokio::test]
async fn post_non_json_body_is_invalid_even_when_created() {
    let base = spawn_upstream(mock_router()).await;
    let client = UpstreamClient::new("test", &base, &test_config(&base, &base)).unwrap();

    let err = client.post(&["insert_text"], &json!({})).await.unwrap_err();
    assert!(matches!(err, UpstreamError::InvalidResponseBody { .. }), "got {err:?}");
}

// ---- HttpReviewStore / HttpSentimentClassifier over the same client ----

fn review_backend() -> Router {
    Router::new()
        .route(
            "/fetchReviews/dealer/{id}",
            get(|Path(id): Path<u64>| async move {
                Json(json!([
                    { "id": 1, "dealership": id, "review": "Great service", "car_year": 2010 },
                    { "id": 2, "dealership": id, "review": null, "car_year": "2011", "purchase": "true" },
                    { "id": 3, "dealership": id, "review": "Terrible wait" }
                ]))
            }),
        )
        .route(
            "/fetchDealers",
            get(|| async {
                Json(json!([
                    { "full_name": "no id" },
                    { "id": 2, "full_name": "Temp Car Dealership", "state": "Kansas" }
                ]))
            }),
        )
        .route(
            "/fetchDealers/{state}",
            get(|Path(state): Path<String>| async move {
                Json(json!([{ "id": 9, "full_name": "filtered", "state": state }]))
            }),
        )
        .route(
            "/insert_review",
            post(|Json(body): Json<Value>| async move {
                match body["review"].as_str() {
                    Some("reject me") => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({ "error": "db down" })),
                    )
                        .into_response(),
                    Some("plain text") => (StatusCode::CREATED, "inserted").into_response(),
                    _ => (StatusCode::CREATED, Json(json!({ "status": "success" }))).into_response(),
                }
            }),
        )
}

async fn review_store() -> HttpReviewStore {
    let base = spawn_upstream(review_backend()).await;
    let client = UpstreamClient::new("reviews", &base, &test_config(&base, &base)).unwrap();
    HttpReviewStore::new(client)
}

#[tokio::test]
async fn off_shape_review_is_kept_next_to_good_ones() {
    let store = review_store().await;
    let fetched = store.fetch_reviews(DealerId::parse("5").unwrap()).await;

    assert_eq!(fetched.status, UpstreamStatus::Ok);
    let texts: Vec<&str> = fetched.data.iter().map(|r| r.text()).collect();
    assert_eq!(texts, vec!["Great service", "", "Terrible wait"]);

    let odd = serde_json::to_value(&fetched.data[1]).unwrap();
    assert_eq!(odd["car_year"], json!("2011"));
    assert_eq!(odd["review"], Value::Null);
    assert_eq!(odd["dealership"], json!(5));
}

#[tokio::test]
async fn dealers_all_is_unfiltered_and_state_is_a_path_segment() {
    let store = review_store().await;

    let all = store.fetch_dealers(&StateFilter::from_path(Some("All"))).await;
    assert_eq!(all.status, UpstreamStatus::Ok);
    assert_eq!(all.data.len(), 2);
    assert_eq!(all.data[0].id, None);
    assert_eq!(all.data[0].full_name.as_deref(), Some("no id"));

    let filtered = store.fetch_dealers(&StateFilter::from_path(Some("New Mexico"))).await;
    assert_eq!(filtered.data.len(), 1);
    assert_eq!(filtered.data[0].state.as_deref(), Some("New Mexico"));
}

#[tokio::test]
async fn submit_review_keeps_the_failure_reason() {
    let store = review_store().await;

    let ok = store.submit_review(&json!({ "review": "fine" })).await.unwrap();
    assert_eq!(ok, json!({ "status": "success" }));

    match store.submit_review(&json!({ "review": "reject me" })).await {
        Err(UpstreamError::Rejected { status, .. }) => assert_eq!(status, 500),
        other => panic!("expected Rejected, got {other:?}"),
    }

    let err = store
        .submit_review(&json!({ "review": "plain text" }))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_response_body");
}

#[tokio::test]
async fn unreachable_analyzer_is_an_error_without_leaking_the_text() {
    let base = unreachable_url().await;
    let client = UpstreamClient::new("sentiment", &base, &test_config(&base, &base))
        .unwrap()
        .with_redacted_path();
    let classifier = HttpSentimentClassifier::new(client, 2000);

    let err = classifier
        .classify("my private complaint")
        .await
        .unwrap_err();
    assert!(err.is_network(), "got {err:?}");
    let shown = err.to_string();
    assert!(!shown.contains("private"), "{shown}");
    assert!(!shown.contains("complaint"), "{shown}");
}
