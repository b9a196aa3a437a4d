// src/ingest/providers/hostaway.rs
//! Property-management channel (Hostaway).
//!
//! Two payload shapes reach us: the paged API list (`{"data": [...]}`, records
//! already carry ids and a 0–10 category map) and the example/result list
//! (`{"result": [...]}`, loosely typed, no listing id). [`normalize`] detects
//! the shape and converts both into `NormalizedReview`s.

use async_trait::async_trait;
use metrics::{counter, histogram};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::PathBuf;

use crate::error::{Result, ReviewsError};
use crate::ingest::types::{ChannelBatch, ReviewProvider};
use crate::rating::to_five_star_scale;
use crate::review::{CategoryRating, Channel, NormalizedReview, ReviewId};

pub const CHANNEL: &str = "Hostaway";

/// Paged API record.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PagedRecord {
    pub id: Option<Value>,
    pub listing_id: Option<Value>,
    pub listing_name: Option<Value>,
    pub channel: Option<Value>,
    pub rating: Option<Value>,
    pub review_text: Option<Value>,
    pub submitted_at: Option<Value>,
    /// Usually an object; anything else (PHP sends `[]` for empty) means none.
    pub category_ratings: Option<Value>,
}

/// Example/result record. Every field is loose; conversion decides what is usable.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResultRecord {
    pub id: Option<Value>,
    #[serde(rename = "type")]
    pub kind: Option<Value>,
    pub listing_name: Option<Value>,
    pub guest_name: Option<Value>,
    pub rating: Option<Value>,
    pub public_review: Option<Value>,
    pub submitted_at: Option<Value>,
    pub review_category: Option<Value>,
}

/// The upstream shapes this adapter knows about.
#[derive(Debug)]
pub enum HostawayPayload {
    Paged(Vec<PagedRecord>),
    Results(Vec<ResultRecord>),
    Unrecognized,
}

impl HostawayPayload {
    /// Classify a raw payload by its top-level field. Records that are not
    /// even objects are dropped here; the count is returned alongside.
    pub fn classify(raw: &Value) -> (Self, usize) {
        if let Some(items) = raw.get("data").and_then(Value::as_array) {
            let (kept, dropped) = parse_records::<PagedRecord>(items);
            return (HostawayPayload::Paged(kept), dropped);
        }
        if let Some(items) = raw.get("result").and_then(Value::as_array) {
            let (kept, dropped) = parse_records::<ResultRecord>(items);
            return (HostawayPayload::Results(kept), dropped);
        }
        (HostawayPayload::Unrecognized, 0)
    }
}

fn parse_records<T: serde::de::DeserializeOwned>(items: &[Value]) -> (Vec<T>, usize) {
    let mut kept = Vec::with_capacity(items.len());
    let mut dropped = 0usize;
    for item in items {
        match serde_json::from_value::<T>(item.clone()) {
            Ok(rec) => kept.push(rec),
            Err(e) => {
                tracing::debug!(target: "ingest", channel = CHANNEL, error = %e, "dropping malformed record");
                dropped += 1;
            }
        }
    }
    (kept, dropped)
}

/// Normalize a raw Hostaway payload. Unknown shapes give an empty list.
pub fn normalize(raw: &Value) -> Vec<NormalizedReview> {
    let t0 = std::time::Instant::now();
    let (payload, mut dropped) = HostawayPayload::classify(raw);

    let mut out = Vec::new();
    match payload {
        HostawayPayload::Paged(records) => {
            for rec in records {
                match from_paged(rec) {
                    Some(r) => out.push(r),
                    None => dropped += 1,
                }
            }
        }
        HostawayPayload::Results(records) => {
            for rec in records {
                match from_result(rec) {
                    Some(r) => out.push(r),
                    None => dropped += 1,
                }
            }
        }
        HostawayPayload::Unrecognized => {
            tracing::debug!(target: "ingest", channel = CHANNEL, "unrecognized payload shape");
        }
    }

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("channel_parse_ms", "channel" => CHANNEL).record(ms);
    counter!("reviews_normalized_total", "channel" => CHANNEL).increment(out.len() as u64);
    counter!("reviews_dropped_total", "channel" => CHANNEL).increment(dropped as u64);
    out
}

fn from_paged(rec: PagedRecord) -> Option<NormalizedReview> {
    let id = rec.id.as_ref().and_then(explicit_id)?;
    let text = |v: &Option<Value>| v.as_ref().and_then(loose_string).unwrap_or_default();
    let listing_name = text(&rec.listing_name);
    let listing_id = rec
        .listing_id
        .as_ref()
        .and_then(loose_string)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| listing_slug(&listing_name));

    let categories = CategoryRating::collect_sorted(
        rec.category_ratings
            .as_ref()
            .and_then(Value::as_object)
            .into_iter()
            .flatten()
            .filter_map(|(name, v)| {
                v.as_f64()
                    .filter(|x| x.is_finite())
                    .map(|x| (name.clone(), to_five_star_scale(x)))
            }),
    );

    Some(NormalizedReview {
        id,
        listing_id,
        listing_name,
        channel: Channel::from_label(&text(&rec.channel)),
        overall_rating: rec.rating.as_ref().and_then(coerce_rating),
        categories,
        public_review: text(&rec.review_text),
        submitted_at: text(&rec.submitted_at),
    })
}

fn from_result(rec: ResultRecord) -> Option<NormalizedReview> {
    let listing_name = rec
        .listing_name
        .as_ref()
        .and_then(loose_string)
        .unwrap_or_default();
    let public_review = rec
        .public_review
        .as_ref()
        .and_then(loose_string)
        .unwrap_or_default();
    let submitted_at = rec
        .submitted_at
        .as_ref()
        .and_then(loose_string)
        .unwrap_or_default();

    let id = match rec.id.as_ref().and_then(explicit_id) {
        Some(id) => id,
        None if !submitted_at.is_empty() || !public_review.is_empty() => {
            let guest = rec
                .guest_name
                .as_ref()
                .and_then(loose_string)
                .unwrap_or_default();
            ReviewId::Text(derived_id(&[&listing_name, &submitted_at, &guest, &public_review]))
        }
        None => return None,
    };

    let categories = CategoryRating::collect_sorted(
        rec.review_category
            .as_ref()
            .and_then(Value::as_array)
            .map(|entries| entries.iter().filter_map(category_entry).collect::<Vec<_>>())
            .unwrap_or_default(),
    );

    Some(NormalizedReview {
        id,
        listing_id: listing_slug(&listing_name),
        listing_name,
        channel: channel_from_type(
            rec.kind
                .as_ref()
                .and_then(loose_string)
                .as_deref()
                .unwrap_or_default(),
        ),
        overall_rating: rec.rating.as_ref().and_then(coerce_rating),
        categories,
        public_review,
        submitted_at,
    })
}

fn category_entry(v: &Value) -> Option<(String, f64)> {
    let name = v.get("category")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }
    let rating = v.get("rating")?.as_f64().filter(|x| x.is_finite())?;
    Some((name.to_string(), to_five_star_scale(rating)))
}

/// Derive a listing id from its display name: lower-case, every run of
/// non-alphanumerics becomes `_`, no leading or trailing `_`.
pub fn listing_slug(name: &str) -> String {
    static RE_SEP: OnceCell<Regex> = OnceCell::new();
    let re = RE_SEP.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("static regex"));
    let lower = name.to_lowercase();
    re.replace_all(&lower, "_").trim_matches('_').to_string()
}

/// Infer the channel from the free-text `type` hint.
pub fn channel_from_type(kind: &str) -> Channel {
    let k = kind.to_ascii_lowercase();
    if k.contains("airbnb") {
        Channel::Airbnb
    } else if k.contains("booking") {
        Channel::Booking
    } else {
        Channel::Hostaway
    }
}

/// `null` stays unrated; numbers and numeric strings are normalized; any other
/// value is not a finite number and normalizes to 0.
fn coerce_rating(v: &Value) -> Option<f64> {
    let raw = match v {
        Value::Null => return None,
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        _ => f64::NAN,
    };
    Some(to_five_star_scale(raw))
}

fn explicit_id(v: &Value) -> Option<ReviewId> {
    match v {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(ReviewId::Number(i)),
            None => Some(ReviewId::Text(n.to_string())),
        },
        Value::String(s) if !s.trim().is_empty() => Some(ReviewId::Text(s.trim().to_string())),
        _ => None,
    }
}

fn loose_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Stable id for records that arrive without one.
fn derived_id(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for p in parts {
        hasher.update(p.as_bytes());
        hasher.update([0x1f]);
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(9 + 12);
    out.push_str("hostaway:");
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

pub struct HostawayProvider {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    File(PathBuf),
    Http {
        url: String,
        api_key: Option<String>,
        client: reqwest::Client,
    },
}

/// Mock payload shipped with the service, used when neither a fixture path
/// nor an API url is configured.
const BUNDLED_MOCK: &str = include_str!("../../../config/fixtures/hostaway_reviews.json");

impl HostawayProvider {
    pub fn bundled_mock() -> Self {
        Self::from_fixture_str(BUNDLED_MOCK)
    }

    pub fn from_fixture_str(s: &str) -> Self {
        Self {
            mode: Mode::Fixture(s.to_string()),
        }
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            mode: Mode::File(path.into()),
        }
    }

    pub fn from_url(url: impl Into<String>, api_key: Option<String>, client: reqwest::Client) -> Self {
        Self {
            mode: Mode::Http {
                url: url.into(),
                api_key,
                client,
            },
        }
    }

    async fn load_raw(&self) -> Result<String> {
        match &self.mode {
            Mode::Fixture(s) => Ok(s.clone()),
            Mode::File(path) => tokio::fs::read_to_string(path).await.map_err(|e| {
                ReviewsError::upstream(CHANNEL, None, format!("reading {}: {e}", path.display()))
            }),
            Mode::Http {
                url,
                api_key,
                client,
            } => {
                let mut req = client.get(url.as_str());
                if let Some(key) = api_key {
                    req = req.bearer_auth(key);
                }
                let resp = req.send().await.map_err(|e| {
                    tracing::warn!(error = ?e, provider = CHANNEL, "provider http error");
                    ReviewsError::upstream(CHANNEL, None, e.to_string())
                })?;
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                if !status.is_success() {
                    return Err(ReviewsError::upstream(CHANNEL, Some(status.as_u16()), body));
                }
                Ok(body)
            }
        }
    }
}

#[async_trait]
impl ReviewProvider for HostawayProvider {
    async fn fetch_reviews(&self) -> Result<ChannelBatch> {
        let t0 = std::time::Instant::now();
        let body = self.load_raw().await?;
        histogram!("channel_fetch_ms", "channel" => CHANNEL)
            .record(t0.elapsed().as_secs_f64() * 1_000.0);
        let raw: Value = serde_json::from_str(&body).map_err(|e| {
            ReviewsError::upstream(CHANNEL, None, format!("invalid JSON ({e}): {body}"))
        })?;
        Ok(normalize(&raw).into())
    }

    fn name(&self) -> &'static str {
        CHANNEL
    }
}
