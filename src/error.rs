use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReviewsError>;

#[derive(Debug, Error)]
pub enum ReviewsError {
    /// Required identifying fields missing on a write. Raised before any side effect.
    #[error("{0}")]
    Validation(String),

    /// A channel's backing request did not succeed. Never used for "zero reviews".
    #[error("{channel} upstream fetch failed (status {})", status_label(.status))]
    Upstream {
        channel: String,
        status: Option<u16>,
        body: String,
    },

    #[error("{channel} fetch timed out after {after_ms}ms")]
    Timeout { channel: String, after_ms: u64 },

    /// Approval store unreachable or returned garbage.
    #[error("approval store unavailable: {0}")]
    Store(String),

    #[error("{0} is not configured")]
    NotConfigured(String),
}

fn status_label(status: &Option<u16>) -> String {
    status.map_or_else(|| "n/a".to_string(), |s| s.to_string())
}

impl ReviewsError {
    /// Build a validation error naming every missing field.
    pub fn missing_fields(fields: &[&str]) -> Self {
        let verb = if fields.len() == 1 { "is" } else { "are" };
        ReviewsError::Validation(format!("{} {verb} required", fields.join(" and ")))
    }

    pub fn upstream(channel: &str, status: Option<u16>, body: impl Into<String>) -> Self {
        ReviewsError::Upstream {
            channel: channel.to_string(),
            status,
            body: body.into(),
        }
    }

    /// Channel name for fetch failures, `None` for everything else.
    pub fn channel(&self) -> Option<&str> {
        match self {
            ReviewsError::Upstream { channel, .. } | ReviewsError::Timeout { channel, .. } => {
                Some(channel)
            }
            _ => None,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ReviewsError::Validation(_) | ReviewsError::NotConfigured(_) => {
                StatusCode::BAD_REQUEST
            }
            ReviewsError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            ReviewsError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ReviewsError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ReviewsError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            ReviewsError::Upstream {
                channel,
                status: upstream_status,
                body,
            } => json!({
                "error": self.to_string(),
                "channel": channel,
                "status": upstream_status,
                "body": body,
            }),
            ReviewsError::Timeout { channel, after_ms } => json!({
                "error": self.to_string(),
                "channel": channel,
                "afterMs": after_ms,
            }),
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_message_names_each_field() {
        let e = ReviewsError::missing_fields(&["reviewId", "listingId"]);
        assert_eq!(e.to_string(), "reviewId and listingId are required");
        let one = ReviewsError::missing_fields(&["listingId"]);
        assert_eq!(one.to_string(), "listingId is required");
    }

    #[test]
    fn upstream_maps_to_bad_gateway() {
        let e = ReviewsError::upstream("Google", Some(403), "denied");
        assert_eq!(e.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(e.channel(), Some("Google"));
        assert_eq!(e.to_string(), "Google upstream fetch failed (status 403)");
    }

    #[test]
    fn transport_failure_has_no_status() {
        let e = ReviewsError::upstream("Hostaway", None, "connection refused");
        assert_eq!(e.to_string(), "Hostaway upstream fetch failed (status n/a)");
    }
}
