//! # Insight Engine
//! Listing-level snapshot for a property page: overall average, last-30-day
//! average against the 30 days before, and the weakest category.
//!
//! All time math is against a caller-supplied `now` so the windows are
//! testable. Labels are pre-formatted for display.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::review::NormalizedReview;

pub const NOT_AVAILABLE: &str = "N/A";
pub const NOT_ENOUGH_DATA: &str = "Not enough data";
pub const NOTE_NO_RECENT: &str = "No reviews in the last 30 days.";
pub const NOTE_NO_PRIOR: &str = "Not enough prior reviews to calculate a 30-day comparison.";
pub const NO_CATEGORY_DATA: &str = "No category data";

const WINDOW_DAYS: i64 = 30;

/// How to choose between categories with the same (lowest) mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreak {
    /// First category encountered in review order wins. Reordering the input
    /// can change the answer.
    #[default]
    FirstSeen,
    /// Alphabetically smallest name wins; input order does not matter.
    Alphabetical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeakestCategory {
    pub category: String,
    pub average: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightBundle {
    pub review_count: usize,
    pub average_rating_label: String,
    pub last30_label: String,
    pub delta_label: String,
    pub weakest_category: Option<WeakestCategory>,
    pub weakest_category_label: String,
    pub weakest_category_sub_label: String,
    pub trend_note: String,
}

fn mean<I: IntoIterator<Item = f64>>(values: I) -> Option<f64> {
    let (sum, n) = values
        .into_iter()
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

fn rated<'a>(reviews: impl IntoIterator<Item = &'a NormalizedReview>) -> Option<f64> {
    mean(reviews.into_iter().filter_map(|r| r.overall_rating))
}

/// One decimal, halves rounded away from zero (`4.25` -> `"4.3"`).
fn one_decimal(x: f64) -> String {
    let r = (x * 10.0).round() / 10.0 + 0.0;
    format!("{r:.1}")
}

fn label(v: Option<f64>) -> String {
    v.map_or_else(|| NOT_AVAILABLE.to_string(), one_decimal)
}

/// `"+0.4 vs prior 30d"` / `"-1.2 vs prior 30d"`.
pub fn delta_label(last30: Option<f64>, prior30: Option<f64>) -> String {
    match (last30, prior30) {
        (Some(a), Some(b)) => {
            let d = one_decimal(a - b);
            let sign = if d.starts_with('-') { "" } else { "+" };
            format!("{sign}{d} vs prior 30d")
        }
        _ => NOT_ENOUGH_DATA.to_string(),
    }
}

/// Per-category means over the whole set; the lowest mean wins.
pub fn weakest_category(reviews: &[NormalizedReview], tie_break: TieBreak) -> Option<WeakestCategory> {
    // Insertion-ordered buckets: (name, sum, count).
    let mut buckets: Vec<(String, f64, usize)> = Vec::new();
    for r in reviews {
        for c in &r.categories {
            match buckets.iter_mut().find(|b| b.0 == c.category) {
                Some(b) => {
                    b.1 += c.rating;
                    b.2 += 1;
                }
                None => buckets.push((c.category.clone(), c.rating, 1)),
            }
        }
    }

    let mut best: Option<WeakestCategory> = None;
    for (category, sum, count) in buckets {
        let average = sum / count as f64;
        let replace = match &best {
            None => true,
            Some(cur) if average < cur.average => true,
            Some(cur) if average == cur.average => {
                tie_break == TieBreak::Alphabetical && category < cur.category
            }
            Some(_) => false,
        };
        if replace {
            best = Some(WeakestCategory {
                category,
                average,
                count,
            });
        }
    }
    best
}

/// `"respect_house_rules"` → `"Respect House Rules"`.
pub fn title_case(input: &str) -> String {
    input
        .replace('_', " ")
        .split(' ')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build the insight bundle for one listing's full review set.
///
/// Windows: last 30 days is `[now-30d, now]`, prior is `[now-60d, now-30d)`.
/// Reviews with an unknown date fall in neither.
pub fn compute_insights(
    reviews: &[NormalizedReview],
    now: DateTime<Utc>,
    tie_break: TieBreak,
) -> InsightBundle {
    let last_start = now - Duration::days(WINDOW_DAYS);
    let prior_start = now - Duration::days(2 * WINDOW_DAYS);

    let mut last30 = Vec::new();
    let mut prior30 = Vec::new();
    for r in reviews {
        let Some(at) = r.submitted_instant() else {
            continue;
        };
        if at >= last_start && at <= now {
            last30.push(r);
        } else if at >= prior_start && at < last_start {
            prior30.push(r);
        }
    }

    let last_avg = rated(last30.iter().copied());
    let prior_avg = rated(prior30.iter().copied());

    let trend_note = if last30.is_empty() {
        NOTE_NO_RECENT
    } else if prior30.is_empty() {
        NOTE_NO_PRIOR
    } else {
        ""
    };

    let weakest = weakest_category(reviews, tie_break);
    let (weakest_label, weakest_sub) = match &weakest {
        Some(w) => (
            title_case(&w.category),
            format!("{} avg ({} ratings)", one_decimal(w.average), w.count),
        ),
        None => (NOT_AVAILABLE.to_string(), NO_CATEGORY_DATA.to_string()),
    };

    InsightBundle {
        review_count: reviews.len(),
        average_rating_label: label(rated(reviews)),
        last30_label: label(last_avg),
        delta_label: delta_label(last_avg, prior_avg),
        weakest_category: weakest,
        weakest_category_label: weakest_label,
        weakest_category_sub_label: weakest_sub,
        trend_note: trend_note.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::{CategoryRating, Channel, ReviewId};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap()
    }

    fn at_days_ago(id: i64, days: i64, rating: Option<f64>) -> NormalizedReview {
        NormalizedReview {
            id: ReviewId::Number(id),
            listing_id: "L1".into(),
            listing_name: "Loft".into(),
            channel: Channel::Hostaway,
            overall_rating: rating,
            categories: Vec::new(),
            public_review: String::new(),
            submitted_at: (now() - Duration::days(days)).to_rfc3339(),
        }
    }

    fn cats(mut r: NormalizedReview, c: &[(&str, f64)]) -> NormalizedReview {
        r.categories = CategoryRating::collect_sorted(c.iter().map(|(n, v)| (n.to_string(), *v)));
        r
    }

    #[test]
    fn empty_input() {
        let b = compute_insights(&[], now(), TieBreak::FirstSeen);
        assert_eq!(b.review_count, 0);
        assert_eq!(b.average_rating_label, "N/A");
        assert_eq!(b.last30_label, "N/A");
        assert_eq!(b.delta_label, "Not enough data");
        assert_eq!(b.weakest_category_label, "N/A");
        assert_eq!(b.weakest_category_sub_label, "No category data");
        assert_eq!(b.trend_note, NOTE_NO_RECENT);
    }

    #[test]
    fn positive_and_negative_deltas() {
        let up = vec![at_days_ago(1, 3, Some(4.5)), at_days_ago(2, 40, Some(4.1))];
        let b = compute_insights(&up, now(), TieBreak::FirstSeen);
        assert_eq!(b.last30_label, "4.5");
        assert_eq!(b.delta_label, "+0.4 vs prior 30d");
        assert_eq!(b.trend_note, "");
        assert_eq!(b.average_rating_label, "4.3");

        let down = vec![at_days_ago(1, 3, Some(3.0)), at_days_ago(2, 40, Some(4.2))];
        let b = compute_insights(&down, now(), TieBreak::FirstSeen);
        assert_eq!(b.delta_label, "-1.2 vs prior 30d");
    }

    #[test]
    fn equal_windows_show_plus_zero() {
        let r = vec![at_days_ago(1, 1, Some(4.0)), at_days_ago(2, 45, Some(4.0))];
        let b = compute_insights(&r, now(), TieBreak::FirstSeen);
        assert_eq!(b.delta_label, "+0.0 vs prior 30d");
    }

    #[test]
    fn empty_recent_window_with_prior_data() {
        let r = vec![at_days_ago(1, 35, Some(4.0)), at_days_ago(2, 50, Some(2.0))];
        let b = compute_insights(&r, now(), TieBreak::FirstSeen);
        assert_eq!(b.last30_label, "N/A");
        assert_eq!(b.delta_label, "Not enough data");
        assert_eq!(b.trend_note, "No reviews in the last 30 days.");
    }

    #[test]
    fn empty_prior_window() {
        let r = vec![at_days_ago(1, 2, Some(4.0)), at_days_ago(2, 90, Some(2.0))];
        let b = compute_insights(&r, now(), TieBreak::FirstSeen);
        assert_eq!(b.delta_label, "Not enough data");
        assert_eq!(b.trend_note, NOTE_NO_PRIOR);
        assert_eq!(b.average_rating_label, "3.0");
    }

    #[test]
    fn unrated_recent_reviews_fill_window_but_not_mean() {
        let r = vec![at_days_ago(1, 2, None), at_days_ago(2, 40, Some(4.0))];
        let b = compute_insights(&r, now(), TieBreak::FirstSeen);
        assert_eq!(b.last30_label, "N/A");
        assert_eq!(b.delta_label, "Not enough data");
        assert_eq!(b.trend_note, "");
    }

    #[test]
    fn window_edges() {
        // exactly 30 days ago belongs to the recent window; the future to neither
        let r = vec![at_days_ago(1, 30, Some(5.0)), at_days_ago(2, -2, Some(1.0))];
        let b = compute_insights(&r, now(), TieBreak::FirstSeen);
        assert_eq!(b.last30_label, "5.0");
        assert_eq!(b.trend_note, NOTE_NO_PRIOR);
    }

    #[test]
    fn unknown_dates_are_outside_both_windows() {
        let mut r = at_days_ago(1, 1, Some(4.0));
        r.submitted_at = "sometime".into();
        let b = compute_insights(&[r], now(), TieBreak::FirstSeen);
        assert_eq!(b.review_count, 1);
        assert_eq!(b.average_rating_label, "4.0");
        assert_eq!(b.trend_note, NOTE_NO_RECENT);
    }

    #[test]
    fn weakest_category_label_and_sub_label() {
        let r = vec![
            cats(at_days_ago(1, 1, Some(4.0)), &[("cleanliness", 3.0), ("respect_house_rules", 5.0)]),
            cats(at_days_ago(2, 2, Some(4.0)), &[("cleanliness", 4.0)]),
        ];
        let b = compute_insights(&r, now(), TieBreak::FirstSeen);
        assert_eq!(b.weakest_category_label, "Cleanliness");
        assert_eq!(b.weakest_category_sub_label, "3.5 avg (2 ratings)");
    }

    #[test]
    fn labels_round_halves_up() {
        let r = vec![at_days_ago(1, 1, Some(4.0)), at_days_ago(2, 2, Some(4.5))];
        let b = compute_insights(&r, now(), TieBreak::FirstSeen);
        assert_eq!(b.average_rating_label, "4.3");
        assert_eq!(one_decimal(0.25), "0.3");
        assert_eq!(one_decimal(-0.25), "-0.3");
        assert_eq!(one_decimal(-0.01), "0.0");
        assert_eq!(delta_label(Some(4.25), Some(4.0)), "+0.3 vs prior 30d");
        assert_eq!(delta_label(Some(4.0), Some(4.04)), "+0.0 vs prior 30d");

        let c = vec![
            cats(at_days_ago(1, 1, None), &[("value", 4.0)]),
            cats(at_days_ago(2, 2, None), &[("value", 4.5)]),
        ];
        let b = compute_insights(&c, now(), TieBreak::FirstSeen);
        assert_eq!(b.weakest_category_sub_label, "4.3 avg (2 ratings)");
    }

    #[test]
    fn ties_follow_the_chosen_policy() {
        let r = vec![
            cats(at_days_ago(1, 1, None), &[("value", 3.0)]),
            cats(at_days_ago(2, 1, None), &[("location", 3.0)]),
        ];
        let first = weakest_category(&r, TieBreak::FirstSeen).unwrap();
        assert_eq!(first.category, "value");
        let alpha = weakest_category(&r, TieBreak::Alphabetical).unwrap();
        assert_eq!(alpha.category, "location");

        let reversed: Vec<_> = r.into_iter().rev().collect();
        assert_eq!(
            weakest_category(&reversed, TieBreak::FirstSeen).unwrap().category,
            "location"
        );
        assert_eq!(
            weakest_category(&reversed, TieBreak::Alphabetical).unwrap().category,
            "location"
        );
    }

    #[test]
    fn title_case_handles_underscores() {
        assert_eq!(title_case("respect_house_rules"), "Respect House Rules");
        assert_eq!(title_case("checkIn"), "CheckIn");
        assert_eq!(title_case("__x__"), "X");
    }
}
