// src/ingest/providers/google.rs
//! Maps channel (Google Places API, place details with reviews).
//!
//! Google carries a single 1–5 star rating per review and no category
//! breakdown. Place-level numbers travel beside the reviews as
//! [`PlaceMetadata`].

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use metrics::{counter, histogram};
use serde::Deserialize;

use crate::clock::SharedClock;
use crate::error::{Result, ReviewsError};
use crate::ingest::types::{ChannelBatch, PlaceMetadata, ReviewProvider};
use crate::rating::normalize_optional;
use crate::review::{Channel, NormalizedReview, ReviewId};

pub const CHANNEL: &str = "Google";
pub const DEFAULT_BASE_URL: &str = "https://places.googleapis.com";
const FIELD_MASK: &str = "id,displayName,rating,userRatingCount,googleMapsUri,reviews";

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlaceDetails {
    pub id: Option<String>,
    pub display_name: Option<LocalizedText>,
    pub rating: Option<f64>,
    pub user_rating_count: Option<u64>,
    pub google_maps_uri: Option<String>,
    pub reviews: Vec<PlaceReview>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LocalizedText {
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlaceReview {
    pub name: Option<String>,
    pub rating: Option<f64>,
    pub text: Option<LocalizedText>,
    pub publish_time: Option<String>,
    pub author_attribution: Option<AuthorAttribution>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuthorAttribution {
    pub display_name: Option<String>,
}

/// Convert a place-details response into canonical reviews plus place metadata.
///
/// `listing_id` defaults to `place_id`. A review without `publishTime` gets
/// `now` as its `submittedAt`: that is the time of the request, not the time
/// of the review, and it is logged as a fallback.
pub fn normalize_place(
    place_id: &str,
    listing_id: Option<&str>,
    place: PlaceDetails,
    now: DateTime<Utc>,
) -> ChannelBatch {
    let listing_id = listing_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(place_id)
        .to_string();
    let listing_name = place
        .display_name
        .and_then(|d| d.text)
        .unwrap_or_else(|| format!("Google Place {place_id}"));

    let mut fallbacks = 0usize;
    let reviews: Vec<NormalizedReview> = place
        .reviews
        .into_iter()
        .map(|r| {
            let author = r
                .author_attribution
                .and_then(|a| a.display_name)
                .unwrap_or_default();
            let id = r.name.clone().unwrap_or_else(|| {
                format!(
                    "{place_id}:{}:{author}",
                    r.publish_time.as_deref().unwrap_or_default()
                )
            });
            let submitted_at = match r.publish_time {
                Some(t) => t,
                None => {
                    fallbacks += 1;
                    now.to_rfc3339_opts(SecondsFormat::Millis, true)
                }
            };
            NormalizedReview {
                id: ReviewId::Text(id),
                listing_id: listing_id.clone(),
                listing_name: listing_name.clone(),
                channel: Channel::Google,
                overall_rating: normalize_optional(r.rating),
                categories: Vec::new(),
                public_review: r.text.and_then(|t| t.text).unwrap_or_default(),
                submitted_at,
            }
        })
        .collect();

    if fallbacks > 0 {
        tracing::warn!(
            target: "ingest",
            channel = CHANNEL,
            place_id,
            count = fallbacks,
            "reviews without publishTime; submittedAt set to request time"
        );
    }
    counter!("reviews_normalized_total", "channel" => CHANNEL).increment(reviews.len() as u64);

    ChannelBatch {
        reviews,
        place: Some(PlaceMetadata {
            place_id: place_id.to_string(),
            listing_id,
            listing_name,
            place_rating: place.rating,
            user_rating_count: place.user_rating_count,
            google_maps_uri: place.google_maps_uri,
        }),
    }
}

pub struct GooglePlacesProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    place_id: String,
    listing_id: Option<String>,
    clock: SharedClock,
}

impl GooglePlacesProvider {
    pub fn new(
        client: reqwest::Client,
        api_key: impl Into<String>,
        place_id: impl Into<String>,
        clock: SharedClock,
    ) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            place_id: place_id.into(),
            listing_id: None,
            clock,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_listing_id(mut self, listing_id: Option<String>) -> Self {
        self.listing_id = listing_id;
        self
    }

    fn details_url(&self) -> String {
        format!(
            "{}/v1/places/{}",
            self.base_url,
            urlencoding::encode(&self.place_id)
        )
    }
}

#[async_trait]
impl ReviewProvider for GooglePlacesProvider {
    async fn fetch_reviews(&self) -> Result<ChannelBatch> {
        let t0 = std::time::Instant::now();
        let resp = self
            .client
            .get(self.details_url())
            .header("X-Goog-Api-Key", &self.api_key)
            .header("X-Goog-FieldMask", FIELD_MASK)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = ?e, provider = CHANNEL, "provider http error");
                ReviewsError::upstream(CHANNEL, None, e.to_string())
            })?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        histogram!("channel_fetch_ms", "channel" => CHANNEL)
            .record(t0.elapsed().as_secs_f64() * 1_000.0);
        if !status.is_success() {
            return Err(ReviewsError::upstream(CHANNEL, Some(status.as_u16()), body));
        }

        let place: PlaceDetails = serde_json::from_str(&body).map_err(|e| {
            ReviewsError::upstream(
                CHANNEL,
                Some(status.as_u16()),
                format!("invalid place details ({e}): {body}"),
            )
        })?;
        Ok(normalize_place(
            &self.place_id,
            self.listing_id.as_deref(),
            place,
            self.clock.now(),
        ))
    }

    fn name(&self) -> &'static str {
        CHANNEL
    }
}
