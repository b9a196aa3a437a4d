// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod aggregate;
pub mod api;
pub mod approvals;
pub mod clock;
pub mod config;
pub mod error;
pub mod ingest;
pub mod insights;
pub mod metrics;
pub mod property;
pub mod rating;
pub mod review;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::error::{Result, ReviewsError};
pub use crate::review::{Channel, NormalizedReview, ReviewId};

use anyhow::Context;
use tracing::info;

/// Build the full service from `config/` and the environment: channel
/// config, approval store selection, and `/metrics` when enabled.
pub async fn app() -> anyhow::Result<shuttle_axum::axum::Router> {
    let cfg = config::AppConfig::load_default().context("loading reviews config")?;
    let client = reqwest::Client::builder()
        .user_agent(concat!("guest-review-hub/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("building http client")?;
    let clock = clock::system();
    let store = approvals::select_store(cfg.approvals.store, &client)?;
    info!(
        store = store.kind(),
        google_places = cfg.google.places.len(),
        timeout_ms = cfg.fetch.timeout_ms,
        "reviews service configured"
    );
    let approvals = approvals::ApprovalSet::new(store, clock.clone());
    let state = AppState::new(cfg, client, approvals, clock);

    let mut router = api::router(state);
    if metrics::routes_enabled() {
        let m = metrics::Metrics::init()?;
        router = router.merge(m.router());
    }
    Ok(router)
}
