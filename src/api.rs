// src/api.rs
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shuttle_axum::axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::aggregate::{
    aggregate, available_categories, available_listings, AggregateResult, FilterParams,
    ListingOption, ReviewFilter, SortKey,
};
use crate::approvals::{ApprovalSet, MemoryKv};
use crate::clock::SharedClock;
use crate::config::AppConfig;
use crate::error::{Result, ReviewsError};
use crate::ingest::providers::{google, google::GooglePlacesProvider, hostaway::HostawayProvider};
use crate::ingest::types::{PlaceMetadata, ReviewProvider};
use crate::ingest::{self, ChannelFailure, IngestReport};
use crate::insights::TieBreak;
use crate::property::{property_view, PropertyView};
use crate::review::{ListingSummary, NormalizedReview};

#[derive(Clone)]
pub struct AppState {
    config: Arc<AppConfig>,
    client: reqwest::Client,
    approvals: ApprovalSet,
    clock: SharedClock,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        client: reqwest::Client,
        approvals: ApprovalSet,
        clock: SharedClock,
    ) -> Self {
        Self {
            config: Arc::new(config),
            client,
            approvals,
            clock,
        }
    }

    /// State with a process-local approval store.
    pub fn in_memory(config: AppConfig, clock: SharedClock) -> Self {
        let approvals = ApprovalSet::new(Arc::new(MemoryKv::new()), clock.clone());
        Self::new(config, reqwest::Client::new(), approvals, clock)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn timeout(&self) -> Duration {
        self.config.fetch.timeout()
    }

    fn hostaway_provider(&self) -> HostawayProvider {
        let cfg = &self.config.hostaway;
        if let Some(url) = cfg.url.as_deref().filter(|u| !u.trim().is_empty()) {
            HostawayProvider::from_url(url, self.config.hostaway_api_key(), self.client.clone())
        } else if let Some(path) = &cfg.fixture_path {
            HostawayProvider::from_file(path.clone())
        } else {
            HostawayProvider::bundled_mock()
        }
    }

    fn google_provider(
        &self,
        api_key: &str,
        place_id: &str,
        listing_id: Option<String>,
    ) -> GooglePlacesProvider {
        GooglePlacesProvider::new(self.client.clone(), api_key, place_id, self.clock.clone())
            .with_base_url(self.config.google.base_url.clone())
            .with_listing_id(listing_id)
    }

    /// Every configured channel. Configured Google places without an API key
    /// are reported as a failure, not skipped.
    fn channel_providers(&self) -> (Vec<Box<dyn ReviewProvider>>, Vec<ChannelFailure>) {
        let mut providers: Vec<Box<dyn ReviewProvider>> = vec![Box::new(self.hostaway_provider())];
        let mut failures = Vec::new();

        let places = &self.config.google.places;
        if !places.is_empty() {
            match self.config.google_api_key() {
                Some(key) => {
                    for p in places {
                        providers.push(Box::new(self.google_provider(
                            &key,
                            &p.place_id,
                            p.listing_id.clone(),
                        )));
                    }
                }
                None => failures.push(ChannelFailure::from_error(
                    google::CHANNEL,
                    &google_key_missing(),
                )),
            }
        }
        (providers, failures)
    }

    async fn all_reviews(&self) -> IngestReport {
        let (providers, mut unconfigured) = self.channel_providers();
        let mut report = ingest::run_once(&providers, self.timeout()).await;
        report.failures.append(&mut unconfigured);
        report
    }
}

fn google_key_missing() -> ReviewsError {
    ReviewsError::NotConfigured("Google Places API key (GOOGLE_MAPS_API_KEY)".to_string())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/reviews", get(merged_reviews))
        .route("/api/reviews/hostaway", get(hostaway_reviews))
        .route("/api/reviews/google", get(google_reviews))
        .route("/api/reviews/facets", get(facets))
        .route(
            "/api/reviews/approved",
            get(approved_ids).post(set_approved),
        )
        .route("/api/properties/{listing_id}", get(property))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct MergedResponse {
    reviews: Vec<NormalizedReview>,
    listings: Vec<ListingSummary>,
    failures: Vec<ChannelFailure>,
}

async fn merged_reviews(
    State(state): State<AppState>,
    Query(params): Query<FilterParams>,
) -> Json<MergedResponse> {
    let report = state.all_reviews().await;
    let AggregateResult { reviews, listings } =
        aggregate(&report.reviews, &params.to_filter(), params.sort_key());
    Json(MergedResponse {
        reviews,
        listings,
        failures: report.failures,
    })
}

async fn hostaway_reviews(
    State(state): State<AppState>,
    Query(params): Query<FilterParams>,
) -> Result<Json<AggregateResult>> {
    let provider = state.hostaway_provider();
    let batch = ingest::fetch_with_timeout(&provider, state.timeout()).await?;
    Ok(Json(aggregate(
        &batch.reviews,
        &params.to_filter(),
        params.sort_key(),
    )))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleQuery {
    place_id: Option<String>,
    listing_id: Option<String>,
}

#[derive(Serialize)]
struct PlaceResponse {
    #[serde(flatten)]
    place: PlaceMetadata,
    reviews: Vec<NormalizedReview>,
}

async fn google_reviews(
    State(state): State<AppState>,
    Query(q): Query<GoogleQuery>,
) -> Result<Json<PlaceResponse>> {
    let place_id = q
        .place_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ReviewsError::missing_fields(&["placeId"]))?;
    let api_key = state.config.google_api_key().ok_or_else(google_key_missing)?;

    let provider = state.google_provider(&api_key, place_id, q.listing_id);
    let batch = ingest::fetch_with_timeout(&provider, state.timeout()).await?;
    let place = batch.place.ok_or_else(|| {
        ReviewsError::upstream(google::CHANNEL, None, "place details missing from response")
    })?;
    Ok(Json(PlaceResponse {
        place,
        reviews: batch.reviews,
    }))
}

#[derive(Serialize)]
struct FacetsResponse {
    categories: Vec<String>,
    listings: Vec<ListingOption>,
}

async fn facets(State(state): State<AppState>) -> Json<FacetsResponse> {
    let report = state.all_reviews().await;
    Json(FacetsResponse {
        categories: available_categories(&report.reviews),
        listings: available_listings(&report.reviews),
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListingQuery {
    listing_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ApprovedIdsResponse {
    approved_review_ids: Vec<String>,
}

async fn approved_ids(
    State(state): State<AppState>,
    Query(q): Query<ListingQuery>,
) -> Result<Json<ApprovedIdsResponse>> {
    let ids = state
        .approvals
        .approved_ids(q.listing_id.as_deref().unwrap_or_default())
        .await?;
    Ok(Json(ApprovedIdsResponse {
        approved_review_ids: ids,
    }))
}

/// Review ids arrive as strings or numbers depending on the channel.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApprovalReq {
    #[serde(default)]
    review_id: Option<Value>,
    #[serde(default)]
    listing_id: Option<Value>,
    #[serde(default)]
    approved: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ApprovalResp {
    review_id: String,
    listing_id: String,
    approved: bool,
}

fn id_text(v: &Option<Value>) -> String {
    match v {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

async fn set_approved(
    State(state): State<AppState>,
    Json(body): Json<ApprovalReq>,
) -> Result<Json<ApprovalResp>> {
    let review_id = id_text(&body.review_id);
    let listing_id = id_text(&body.listing_id);
    let outcome = state
        .approvals
        .set_approved(&review_id, &listing_id, body.approved)
        .await?;
    Ok(Json(ApprovalResp {
        review_id,
        listing_id,
        approved: outcome.approved,
    }))
}

async fn property(
    State(state): State<AppState>,
    Path(listing_id): Path<String>,
) -> Result<Json<PropertyView>> {
    let report = state.all_reviews().await;
    let filter = ReviewFilter {
        listing_id: Some(listing_id.clone()),
        ..ReviewFilter::default()
    };
    let listing = aggregate(&report.reviews, &filter, SortKey::Newest).reviews;
    let approved = state.approvals.approved_ids(&listing_id).await?;
    Ok(Json(property_view(
        &listing_id,
        &listing,
        &approved,
        state.clock.now(),
        TieBreak::default(),
    )))
}
