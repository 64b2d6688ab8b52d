// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod reviews;
pub mod sentiment;
pub mod upstream;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::config::GatewayConfig;
pub use crate::pipeline::ReviewEnrichmentPipeline;

use axum::Router;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber.
///
/// Filter comes from `RUST_LOG` (default `dealer_reviews_bff=info,tower_http=info,warn`);
/// `LOG_FORMAT=json` switches to JSON lines. A no-op if the hosting runtime
/// already installed a subscriber.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("dealer_reviews_bff=info,tower_http=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

/// Build the full application from `GatewayConfig::load()`.
pub async fn app() -> anyhow::Result<Router> {
    let cfg = GatewayConfig::load()?;
    app_with_config(&cfg)
}

pub fn app_with_config(cfg: &GatewayConfig) -> anyhow::Result<Router> {
    let metrics = metrics::Metrics::init()?;
    let state = AppState::from_config(cfg)?;
    info!(
        backend_url = %cfg.backend_url,
        sentiment_analyzer_url = %cfg.sentiment_analyzer_url,
        timeout_secs = cfg.request_timeout_secs,
        concurrency = cfg.enrichment_concurrency,
        "gateway configured"
    );
    Ok(api::create_router(state, Some(&metrics)))
}
