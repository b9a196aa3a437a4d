//! # Review Aggregator
//! Pure filter → sort → group over canonical reviews. No I/O.
//!
//! Policy notes:
//! - rating bounds never exclude unrated reviews (`includeUnrated` is the
//!   separate switch for that);
//! - a review with an unknown date passes date bounds;
//! - "lowest" ranks unrated reviews as 5 stars, "highest" as 0.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::review::{parse_timestamp, ListingSummary, NormalizedReview};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Newest,
    Oldest,
    Highest,
    Lowest,
}

impl SortKey {
    /// Unknown keys fall back to `Newest`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "oldest" => SortKey::Oldest,
            "highest" => SortKey::Highest,
            "lowest" => SortKey::Lowest,
            _ => SortKey::Newest,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewFilter {
    pub listing_id: Option<String>,
    pub channel: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub min_rating: Option<f64>,
    pub max_rating: Option<f64>,
    pub include_unrated: bool,
    pub category: Option<String>,
    pub min_category_rating: Option<f64>,
}

impl Default for ReviewFilter {
    fn default() -> Self {
        Self {
            listing_id: None,
            channel: None,
            from: None,
            to: None,
            min_rating: None,
            max_rating: None,
            include_unrated: true,
            category: None,
            min_category_rating: None,
        }
    }
}

/// Filter + sort as they arrive on a query string. Every field is optional
/// and malformed values are ignored rather than rejected.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterParams {
    pub listing_id: Option<String>,
    pub channel: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub min_rating: Option<String>,
    pub max_rating: Option<String>,
    pub sort_by: Option<String>,
    pub include_unrated: Option<String>,
    pub category: Option<String>,
    pub min_category_rating: Option<String>,
}

impl FilterParams {
    pub fn to_filter(&self) -> ReviewFilter {
        ReviewFilter {
            listing_id: non_empty(&self.listing_id),
            channel: non_empty(&self.channel),
            from: self.from.as_deref().and_then(parse_timestamp),
            to: self.to.as_deref().and_then(parse_timestamp),
            min_rating: self.min_rating.as_deref().and_then(parse_number),
            max_rating: self.max_rating.as_deref().and_then(parse_number),
            include_unrated: self
                .include_unrated
                .as_deref()
                .and_then(parse_flag)
                .unwrap_or(true),
            category: non_empty(&self.category),
            min_category_rating: self.min_category_rating.as_deref().and_then(parse_number),
        }
    }

    pub fn sort_key(&self) -> SortKey {
        self.sort_by.as_deref().map(SortKey::parse).unwrap_or_default()
    }
}

fn non_empty(v: &Option<String>) -> Option<String> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|x| x.is_finite())
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregateResult {
    pub reviews: Vec<NormalizedReview>,
    pub listings: Vec<ListingSummary>,
}

impl ReviewFilter {
    pub fn matches(&self, review: &NormalizedReview) -> bool {
        if let Some(id) = &self.listing_id {
            if &review.listing_id != id {
                return false;
            }
        }

        if let Some(ch) = &self.channel {
            if !review.channel.as_str().eq_ignore_ascii_case(ch) {
                return false;
            }
        }

        match review.overall_rating {
            Some(r) => {
                if self.min_rating.is_some_and(|min| r < min) {
                    return false;
                }
                if self.max_rating.is_some_and(|max| r > max) {
                    return false;
                }
            }
            None if !self.include_unrated => return false,
            None => {}
        }

        if self.from.is_some() || self.to.is_some() {
            if let Some(at) = review.submitted_instant() {
                if self.from.is_some_and(|from| at < from) {
                    return false;
                }
                if self.to.is_some_and(|to| at > to) {
                    return false;
                }
            }
        }

        if let Some(cat) = &self.category {
            match review.category_rating(cat) {
                None => return false,
                Some(r) => {
                    if self.min_category_rating.is_some_and(|min| r < min) {
                        return false;
                    }
                }
            }
        }

        true
    }
}

pub fn apply_filter(reviews: &[NormalizedReview], filter: &ReviewFilter) -> Vec<NormalizedReview> {
    reviews
        .iter()
        .filter(|r| filter.matches(r))
        .cloned()
        .collect()
}

/// Stable sort. Unknown dates order as the earliest instant.
pub fn apply_sort(reviews: &mut [NormalizedReview], key: SortKey) {
    match key {
        // `None < Some(_)`, so unknown dates trail "newest" and lead "oldest".
        SortKey::Newest => reviews.sort_by_cached_key(|r| Reverse(r.submitted_instant())),
        SortKey::Oldest => reviews.sort_by_cached_key(|r| r.submitted_instant()),
        SortKey::Highest => reviews.sort_by(|a, b| {
            rating_or(b, 0.0).total_cmp(&rating_or(a, 0.0))
        }),
        SortKey::Lowest => reviews.sort_by(|a, b| {
            rating_or(a, 5.0).total_cmp(&rating_or(b, 5.0))
        }),
    }
}

fn rating_or(r: &NormalizedReview, default: f64) -> f64 {
    r.overall_rating.unwrap_or(default)
}

/// Group by listing and compute summary stats, best listings first.
pub fn summarize_listings(reviews: &[NormalizedReview]) -> Vec<ListingSummary> {
    #[derive(Default)]
    struct Acc {
        name: String,
        count: usize,
        rating_sum: f64,
        rated: usize,
        categories: BTreeMap<String, (f64, usize)>,
    }

    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Acc> = HashMap::new();

    for r in reviews {
        let acc = groups.entry(r.listing_id.clone()).or_insert_with(|| {
            order.push(r.listing_id.clone());
            Acc {
                name: r.listing_name.clone(),
                ..Acc::default()
            }
        });
        acc.count += 1;
        if let Some(v) = r.overall_rating {
            acc.rating_sum += v;
            acc.rated += 1;
        }
        for c in &r.categories {
            let slot = acc.categories.entry(c.category.clone()).or_insert((0.0, 0));
            slot.0 += c.rating;
            slot.1 += 1;
        }
    }

    let mut out: Vec<ListingSummary> = order
        .into_iter()
        .filter_map(|id| {
            let acc = groups.remove(&id)?;
            Some(ListingSummary {
                listing_id: id,
                listing_name: acc.name,
                average_rating: (acc.rated > 0).then(|| acc.rating_sum / acc.rated as f64),
                review_count: acc.count,
                category_averages: acc
                    .categories
                    .into_iter()
                    .map(|(k, (sum, n))| (k, sum / n as f64))
                    .collect(),
            })
        })
        .collect();

    out.sort_by(|a, b| {
        let ra = a.average_rating.unwrap_or(-1.0);
        let rb = b.average_rating.unwrap_or(-1.0);
        match rb.total_cmp(&ra) {
            Ordering::Equal => b.review_count.cmp(&a.review_count),
            other => other,
        }
    });
    out
}

/// Filter, sort and group in one pass; the summaries cover the filtered set.
pub fn aggregate(
    reviews: &[NormalizedReview],
    filter: &ReviewFilter,
    sort: SortKey,
) -> AggregateResult {
    let mut filtered = apply_filter(reviews, filter);
    apply_sort(&mut filtered, sort);
    let listings = summarize_listings(&filtered);
    AggregateResult {
        reviews: filtered,
        listings,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingOption {
    pub id: String,
    pub name: String,
}

/// Distinct category names, sorted.
pub fn available_categories(reviews: &[NormalizedReview]) -> Vec<String> {
    reviews
        .iter()
        .flat_map(|r| r.categories.iter().map(|c| c.category.clone()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Distinct listings in first-seen order, name taken from the first review.
pub fn available_listings(reviews: &[NormalizedReview]) -> Vec<ListingOption> {
    let mut seen = BTreeSet::new();
    reviews
        .iter()
        .filter(|r| seen.insert(r.listing_id.clone()))
        .map(|r| ListingOption {
            id: r.listing_id.clone(),
            name: r.listing_name.clone(),
        })
        .collect()
}
