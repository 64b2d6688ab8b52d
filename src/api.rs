// src/api.rs
//! HTTP surface for the client app. Every handler answers with a JSON
//! envelope carrying an integer `status`, even when upstreams are down.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::{AuthError, IdentityProvider, InMemoryIdentityProvider, NewUser, SessionToken};
use crate::catalog::{CarCatalog, CatalogStore, InMemoryCatalogStore};
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::metrics::Metrics;
use crate::model::{DealerId, StateFilter, UpstreamStatus};
use crate::pipeline::ReviewEnrichmentPipeline;
use crate::reviews::{HttpReviewStore, ReviewStore};
use crate::sentiment::{HttpSentimentClassifier, SentimentClassifier};
use crate::upstream::UpstreamClient;

pub const SESSION_COOKIE: &str = "sessionid";
pub const UPSTREAM_STATUS_HEADER: &str = "x-upstream-status";

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ReviewEnrichmentPipeline>,
    pub reviews: Arc<dyn ReviewStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub catalog: Arc<CarCatalog>,
    session_ttl_secs: u64,
}

impl AppState {
    pub fn new(
        reviews: Arc<dyn ReviewStore>,
        sentiment: Arc<dyn SentimentClassifier>,
        identity: Arc<dyn IdentityProvider>,
        catalog: Arc<dyn CatalogStore>,
        cfg: &GatewayConfig,
    ) -> Self {
        let pipeline = ReviewEnrichmentPipeline::new(
            reviews.clone(),
            sentiment,
            cfg.enrichment_concurrency,
        );
        Self {
            pipeline: Arc::new(pipeline),
            reviews,
            identity,
            catalog: Arc::new(CarCatalog::new(catalog)),
            session_ttl_secs: cfg.session_ttl_secs,
        }
    }

    /// Production wiring: HTTP upstreams plus in-memory identity and catalog.
    pub fn from_config(cfg: &GatewayConfig) -> anyhow::Result<Self> {
        let reviews_client = UpstreamClient::new("reviews", &cfg.backend_url, cfg)?;
        let sentiment_client =
            UpstreamClient::new("sentiment", &cfg.sentiment_analyzer_url, cfg)?.with_redacted_path();

        Ok(Self::new(
            Arc::new(HttpReviewStore::new(reviews_client)),
            Arc::new(HttpSentimentClassifier::new(
                sentiment_client,
                cfg.max_sentiment_text_chars,
            )),
            Arc::new(InMemoryIdentityProvider::new(Duration::from_secs(
                cfg.session_ttl_secs,
            ))),
            Arc::new(InMemoryCatalogStore::default()),
            cfg,
        ))
    }
}

pub fn router(state: AppState) -> Router {
    create_router(state, None)
}

pub fn create_router(state: AppState, metrics: Option<&Metrics>) -> Router {
    let mut app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/login", post(login))
        .route("/logout", get(logout).post(logout))
        .route("/register", post(register))
        .route("/get_dealers", get(list_dealers))
        .route("/get_dealers/", get(list_dealers))
        .route("/get_dealers/{state}", get(list_dealers_by_state))
        .route("/dealer/", get(missing_dealer_id))
        .route("/dealer/{id}", get(dealer_detail))
        .route("/reviews/dealer/", get(missing_dealer_id))
        .route("/reviews/dealer/{id}", get(dealer_reviews))
        .route("/add_review", any(add_review))
        .route("/get_cars", get(list_cars));

    if let Some(m) = metrics {
        app = app.merge(m.router());
    }

    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// `{ "status": <int>, ...payload }` plus the HTTP status and optional
/// upstream availability header.
#[derive(Debug)]
pub struct Envelope {
    status: StatusCode,
    http_status: StatusCode,
    payload: Map<String, Value>,
    upstream: Option<UpstreamStatus>,
}

impl Envelope {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            http_status: status,
            payload: Map::new(),
            upstream: None,
        }
    }

    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    pub fn field(mut self, key: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or_else(|e| {
            warn!(key, error = %e, "envelope field not serializable");
            Value::Null
        });
        self.payload.insert(key.to_string(), value);
        self
    }

    pub fn http_status(mut self, status: StatusCode) -> Self {
        self.http_status = status;
        self
    }

    pub fn upstream(mut self, status: UpstreamStatus) -> Self {
        self.upstream = Some(status);
        self
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        let mut body = Map::with_capacity(self.payload.len() + 1);
        body.insert("status".into(), json!(self.status.as_u16()));
        body.extend(self.payload);

        let mut resp = (self.http_status, Json(Value::Object(body))).into_response();
        if let Some(u) = self.upstream {
            resp.headers_mut()
                .insert(UPSTREAM_STATUS_HEADER, HeaderValue::from_static(u.as_str()));
        }
        resp
    }
}

fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, GatewayError> {
    serde_json::from_slice(body).map_err(|e| {
        warn!(error = %e, "rejecting request body");
        GatewayError::BadRequest("Invalid JSON")
    })
}

fn session_token(headers: &HeaderMap) -> Option<SessionToken> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, v)| *k == SESSION_COOKIE && !v.is_empty())
        .map(|(_, v)| SessionToken::new(v))
}

fn session_cookie(token: &SessionToken, ttl_secs: u64) -> String {
    format!(
        "{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_secs}",
        token.as_str()
    )
}

fn expired_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// Success markers the review backend has been seen to use in `status`.
pub fn is_success_marker(body: &Value) -> bool {
    match body.get("status") {
        Some(Value::String(s)) => s.eq_ignore_ascii_case("success") || s.eq_ignore_ascii_case("ok"),
        Some(Value::Number(n)) => matches!(n.as_u64(), Some(200) | Some(201)),
        _ => false,
    }
}

// ---- identity ----

#[derive(Deserialize)]
struct LoginReq {
    #[serde(rename = "userName")]
    username: String,
    password: String,
}

async fn login(State(state): State<AppState>, body: Bytes) -> Result<Response, GatewayError> {
    let req: LoginReq = parse_json(&body)?;

    let Some(identity) = state.identity.authenticate(&req.username, &req.password).await else {
        info!(username = %req.username, "login refused");
        return Ok(Json(json!({ "userName": req.username })).into_response());
    };

    let token = state.identity.login(&identity).await;
    Ok((
        [(header::SET_COOKIE, session_cookie(&token, state.session_ttl_secs))],
        Json(json!({ "userName": identity.username, "status": "Authenticated" })),
    )
        .into_response())
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = session_token(&headers) {
        state.identity.logout(&token).await;
    }
    (
        [(header::SET_COOKIE, expired_session_cookie())],
        Json(json!({ "userName": "" })),
    )
        .into_response()
}

async fn register(State(state): State<AppState>, body: Bytes) -> Result<Response, GatewayError> {
    let new_user: NewUser = parse_json(&body)?;
    let username = new_user.username.clone();

    match state.identity.create_user(new_user).await {
        Ok(identity) => {
            let token = state.identity.login(&identity).await;
            Ok((
                [(header::SET_COOKIE, session_cookie(&token, state.session_ttl_secs))],
                Json(json!({ "userName": identity.username, "status": "Authenticated" })),
            )
                .into_response())
        }
        Err(AuthError::AlreadyRegistered) => Ok(Json(json!({
            "userName": username,
            "error": AuthError::AlreadyRegistered.to_string(),
        }))
        .into_response()),
        Err(AuthError::EmptyUsername) => Err(GatewayError::BadRequest("Invalid registration")),
    }
}

// ---- dealers & reviews ----

async fn list_dealers(State(state): State<AppState>) -> Envelope {
    dealers_for(&state, &StateFilter::All).await
}

async fn list_dealers_by_state(
    State(state): State<AppState>,
    Path(raw_state): Path<String>,
) -> Envelope {
    dealers_for(&state, &StateFilter::from_path(Some(&raw_state))).await
}

async fn dealers_for(state: &AppState, filter: &StateFilter) -> Envelope {
    let fetched = state.reviews.fetch_dealers(filter).await;
    Envelope::ok()
        .field("dealers", &fetched.data)
        .upstream(fetched.status)
}

async fn missing_dealer_id() -> GatewayError {
    GatewayError::BadRequest("Bad Request")
}

async fn dealer_detail(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Envelope, GatewayError> {
    let id = DealerId::parse(&raw_id).ok_or(GatewayError::BadRequest("Bad Request"))?;
    let fetched = state.reviews.fetch_dealer_detail(id).await;
    Ok(Envelope::ok()
        .field("dealer", &fetched.data)
        .upstream(fetched.status))
}

async fn dealer_reviews(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Envelope, GatewayError> {
    let id = DealerId::parse(&raw_id).ok_or(GatewayError::BadRequest("Bad Request"))?;
    let enriched = state.pipeline.enrich(id).await;
    Ok(Envelope::ok()
        .field("reviews", &enriched.data)
        .upstream(enriched.status))
}

/// Auth is checked before the method so anonymous callers always get 403.
async fn add_review(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Envelope, GatewayError> {
    let identity = match session_token(&headers) {
        Some(token) => state.identity.identity_for(&token).await,
        None => None,
    };
    let Some(identity) = identity else {
        return Err(GatewayError::Unauthorized);
    };
    if method != Method::POST {
        return Err(GatewayError::MethodNotAllowed);
    }

    let payload: Value = parse_json(&body)?;
    info!(
        username = %identity.username,
        dealer_id = ?payload.get("dealership"),
        "received review"
    );

    let backend = state
        .reviews
        .submit_review(&payload)
        .await
        .map_err(GatewayError::SubmitFailed)?;

    if is_success_marker(&backend) {
        Ok(Envelope::ok()
            .field("message", "Review posted successfully")
            .field("backend_response", backend))
    } else {
        Err(GatewayError::UpstreamRejected {
            backend_response: backend,
        })
    }
}

// ---- catalog ----

async fn list_cars(State(state): State<AppState>) -> Envelope {
    let cars = state.catalog.list_cars().await;
    Envelope::ok().field("CarModels", cars)
}
