// src/ingest/types.rs
use serde::Serialize;

use crate::error::Result;
use crate::review::NormalizedReview;

/// Google place-level numbers, returned beside the reviews and never merged
/// into them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceMetadata {
    pub place_id: String,
    pub listing_id: String,
    pub listing_name: String,
    pub place_rating: Option<f64>,
    pub user_rating_count: Option<u64>,
    pub google_maps_uri: Option<String>,
}

/// What one channel fetch yields after normalization.
#[derive(Debug, Clone, Default)]
pub struct ChannelBatch {
    pub reviews: Vec<NormalizedReview>,
    pub place: Option<PlaceMetadata>,
}

impl From<Vec<NormalizedReview>> for ChannelBatch {
    fn from(reviews: Vec<NormalizedReview>) -> Self {
        Self {
            reviews,
            place: None,
        }
    }
}

#[async_trait::async_trait]
pub trait ReviewProvider: Send + Sync {
    /// Fetch the channel payload and normalize it. Transport and HTTP failures
    /// are errors, an empty channel is `Ok` with no reviews.
    async fn fetch_reviews(&self) -> Result<ChannelBatch>;
    fn name(&self) -> &'static str;
}
