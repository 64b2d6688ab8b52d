//! Dealer Reviews BFF: binary entrypoint.
//! Boots the Axum HTTP server with upstream clients built from configuration.
//!
//! See `README.md` for the environment variables.

use shuttle_axum::ShuttleAxum;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    dealer_reviews_bff::init_tracing();

    let router = dealer_reviews_bff::app().await?;

    Ok(router.into())
}
