//! Guest Review Hub: binary entrypoint
//! Boots the Axum HTTP server through Shuttle; all wiring lives in
//! `guest_review_hub::app()`.

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Enable compact tracing logs in development.
/// Activation requires either a debug build or REVIEWS_DEV_LOG=1.
fn enable_dev_tracing() {
    let dev_flag = std::env::var("REVIEWS_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    if !(dev_flag || cfg!(debug_assertions)) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("guest_review_hub=info,warn"));

    // The Shuttle runtime may already own the global subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    enable_dev_tracing();

    let router = guest_review_hub::app().await?;
    Ok(router.into())
}
