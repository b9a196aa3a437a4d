//! # Canonical review model
//! `NormalizedReview` is the only review shape the aggregator, insight engine
//! and API ever see. Channel payloads are converted into it at the adapter
//! boundary (`crate::ingest::providers`).

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Review channel. Upstream strings are open-ended; anything unrecognized
/// collapses to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Airbnb,
    Booking,
    Hostaway,
    Google,
    Unknown,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Airbnb => "Airbnb",
            Channel::Booking => "Booking.com",
            Channel::Hostaway => "Hostaway",
            Channel::Google => "Google",
            Channel::Unknown => "Unknown",
        }
    }

    /// Case-insensitive lookup of a channel label as sent by upstream APIs.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "airbnb" => Channel::Airbnb,
            "booking.com" | "booking" | "bookingcom" => Channel::Booking,
            "hostaway" => Channel::Hostaway,
            "google" => Channel::Google,
            _ => Channel::Unknown,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Channel {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Channel {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        Ok(Channel::from_label(&raw))
    }
}

/// Review identifier: upstream systems use either numeric or string ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReviewId {
    Number(i64),
    Text(String),
}

impl ReviewId {
    /// String form used as the approval key.
    pub fn as_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ReviewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewId::Number(n) => write!(f, "{n}"),
            ReviewId::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ReviewId {
    fn from(s: &str) -> Self {
        ReviewId::Text(s.to_string())
    }
}

impl From<i64> for ReviewId {
    fn from(n: i64) -> Self {
        ReviewId::Number(n)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRating {
    pub category: String,
    /// Always on the 0–5 scale.
    pub rating: f64,
}

impl CategoryRating {
    /// Build the canonical category list: sorted by name, one entry per name.
    /// When a name repeats, the last value wins.
    pub fn collect_sorted<I>(entries: I) -> Vec<CategoryRating>
    where
        I: IntoIterator<Item = (String, f64)>,
    {
        let mut by_name: BTreeMap<String, f64> = BTreeMap::new();
        for (category, rating) in entries {
            by_name.insert(category, rating);
        }
        by_name
            .into_iter()
            .map(|(category, rating)| CategoryRating { category, rating })
            .collect()
    }
}

/// Canonical review record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedReview {
    pub id: ReviewId,
    pub listing_id: String,
    pub listing_name: String,
    pub channel: Channel,
    /// 0–5, `None` when upstream carried no rating.
    pub overall_rating: Option<f64>,
    pub categories: Vec<CategoryRating>,
    pub public_review: String,
    /// Timestamp as received; see [`parse_timestamp`].
    pub submitted_at: String,
}

impl NormalizedReview {
    /// Parsed `submitted_at`, `None` for an unknown date.
    pub fn submitted_instant(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.submitted_at)
    }

    pub fn category_rating(&self, category: &str) -> Option<f64> {
        self.categories
            .iter()
            .find(|c| c.category == category)
            .map(|c| c.rating)
    }
}

/// Per-listing statistics over a (filtered) review set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingSummary {
    pub listing_id: String,
    pub listing_name: String,
    pub average_rating: Option<f64>,
    pub review_count: usize,
    pub category_averages: BTreeMap<String, f64>,
}

/// Parse the timestamp formats the channels emit.
///
/// Accepts RFC 3339 (`2024-05-01T10:00:00Z`), the Hostaway form
/// `2024-05-01 10:00:00` and bare dates. Offset-less values are read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
