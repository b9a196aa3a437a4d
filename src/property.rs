//! Public property payload: insights over every review of the listing, but
//! only manager-approved reviews in the visible list.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;

use crate::insights::{compute_insights, InsightBundle, TieBreak};
use crate::review::NormalizedReview;

pub const NOTICE_NONE_SELECTED: &str = "No reviews have been selected for display yet.";
pub const NOTICE_NONE_MATCHED: &str = "No approved reviews found for this property.";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyView {
    pub listing_id: String,
    pub listing_name: String,
    pub insights: InsightBundle,
    pub approved_reviews: Vec<NormalizedReview>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

/// `reviews` should already be narrowed to the listing.
pub fn property_view(
    listing_id: &str,
    reviews: &[NormalizedReview],
    approved_ids: &[String],
    now: DateTime<Utc>,
    tie_break: TieBreak,
) -> PropertyView {
    let listing_name = reviews
        .first()
        .map(|r| r.listing_name.clone())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| format!("Property #{listing_id}"));

    let approved: HashSet<&str> = approved_ids.iter().map(String::as_str).collect();
    let approved_reviews: Vec<NormalizedReview> = reviews
        .iter()
        .filter(|r| approved.contains(r.id.as_key().as_str()))
        .cloned()
        .collect();

    let notice = if approved.is_empty() {
        Some(NOTICE_NONE_SELECTED)
    } else if approved_reviews.is_empty() {
        Some(NOTICE_NONE_MATCHED)
    } else {
        None
    };

    PropertyView {
        listing_id: listing_id.to_string(),
        listing_name,
        insights: compute_insights(reviews, now, tie_break),
        approved_reviews,
        notice: notice.map(str::to_string),
    }
}
