//! # Rating Normalizer
//! Every channel rating passes through [`to_five_star_scale`] before it
//! reaches a `NormalizedReview`. Adapters must not convert scales themselves.

/// Upper bound of the canonical scale.
pub const MAX_STARS: f64 = 5.0;

/// Convert a rating on an arbitrary scale to the canonical 0–5 scale.
///
/// - non-finite input → `0.0`
/// - `value <= 5` is taken as already canonical and clamped to `[0, 5]`
/// - `value > 5` is taken as a 0–10 rating, halved, then clamped
pub fn to_five_star_scale(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let scaled = if value > MAX_STARS { value / 2.0 } else { value };
    // `+ 0.0` folds -0.0 into 0.0.
    scaled.clamp(0.0, MAX_STARS) + 0.0
}

/// Null-preserving variant: an absent upstream rating stays absent.
pub fn normalize_optional(value: Option<f64>) -> Option<f64> {
    value.map(to_five_star_scale)
}
