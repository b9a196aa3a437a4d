// src/ingest/mod.rs
pub mod providers;
pub mod types;

use crate::error::{Result, ReviewsError};
use crate::ingest::types::{ChannelBatch, PlaceMetadata, ReviewProvider};
use crate::review::NormalizedReview;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::time::Duration;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "reviews_normalized_total",
            "Reviews produced by channel adapters."
        );
        describe_counter!(
            "reviews_dropped_total",
            "Upstream records dropped because they could not be identified."
        );
        describe_counter!(
            "channel_fetch_errors_total",
            "Channel fetch failures (HTTP, transport, timeout)."
        );
        describe_histogram!("channel_fetch_ms", "Channel fetch time in milliseconds.");
        describe_histogram!("channel_parse_ms", "Channel payload normalization time in milliseconds.");
        describe_gauge!(
            "ingest_last_run_ts",
            "Unix ts when all channels were last fetched."
        );
    });
}

/// A channel that did not deliver. Reported next to whatever the other
/// channels returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelFailure {
    pub channel: String,
    pub status: Option<u16>,
    pub message: String,
}

impl ChannelFailure {
    pub fn from_error(channel: &str, err: &ReviewsError) -> Self {
        let status = match err {
            ReviewsError::Upstream { status, .. } => *status,
            _ => None,
        };
        Self {
            channel: err.channel().unwrap_or(channel).to_string(),
            status,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub reviews: Vec<NormalizedReview>,
    pub places: Vec<PlaceMetadata>,
    pub failures: Vec<ChannelFailure>,
}

/// Fetch one channel, giving up after `timeout`.
pub async fn fetch_with_timeout(
    provider: &dyn ReviewProvider,
    timeout: Duration,
) -> Result<ChannelBatch> {
    let t0 = std::time::Instant::now();
    let res = match tokio::time::timeout(timeout, provider.fetch_reviews()).await {
        Ok(res) => res,
        Err(_) => Err(ReviewsError::Timeout {
            channel: provider.name().to_string(),
            after_ms: timeout.as_millis() as u64,
        }),
    };
    tracing::debug!(
        target: "ingest",
        provider = provider.name(),
        ok = res.is_ok(),
        ms = t0.elapsed().as_millis() as u64,
        "channel fetch finished"
    );
    res
}

/// Fetch every provider concurrently and merge what succeeded.
/// A failing or slow channel never hides the others.
pub async fn run_once(providers: &[Box<dyn ReviewProvider>], timeout: Duration) -> IngestReport {
    ensure_metrics_described();

    let results = futures::future::join_all(
        providers
            .iter()
            .map(|p| async move { (p.name(), fetch_with_timeout(p.as_ref(), timeout).await) }),
    )
    .await;

    let mut report = IngestReport::default();
    for (name, res) in results {
        match res {
            Ok(mut batch) => {
                report.reviews.append(&mut batch.reviews);
                if let Some(place) = batch.place {
                    report.places.push(place);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, provider = name, "provider error");
                counter!("channel_fetch_errors_total", "channel" => name).increment(1);
                report.failures.push(ChannelFailure::from_error(name, &e));
            }
        }
    }

    let now = chrono::Utc::now().timestamp().max(0);
    gauge!("ingest_last_run_ts").set(now as f64);
    tracing::info!(
        target: "ingest",
        reviews = report.reviews.len(),
        places = report.places.len(),
        failures = report.failures.len(),
        "ingest run"
    );

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::providers::hostaway::HostawayProvider;
    use async_trait::async_trait;

    struct Failing;

    #[async_trait]
    impl ReviewProvider for Failing {
        async fn fetch_reviews(&self) -> Result<ChannelBatch> {
            Err(ReviewsError::upstream("Google", Some(500), "boom"))
        }
        fn name(&self) -> &'static str {
            "Google"
        }
    }

    struct Slow;

    #[async_trait]
    impl ReviewProvider for Slow {
        async fn fetch_reviews(&self) -> Result<ChannelBatch> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ChannelBatch::default())
        }
        fn name(&self) -> &'static str {
            "Slow"
        }
    }

    fn fixture() -> Box<dyn ReviewProvider> {
        Box::new(HostawayProvider::from_fixture_str(
            r#"{"result":[{"id":1,"rating":8,"listingName":"Loft","submittedAt":"2024-01-01"}]}"#,
        ))
    }

    #[tokio::test]
    async fn one_failing_channel_does_not_hide_the_other() {
        let providers: Vec<Box<dyn ReviewProvider>> = vec![fixture(), Box::new(Failing)];
        let report = run_once(&providers, Duration::from_secs(2)).await;
        assert_eq!(report.reviews.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].channel, "Google");
        assert_eq!(report.failures[0].status, Some(500));
    }

    #[tokio::test]
    async fn slow_channel_surfaces_as_timeout() {
        let err = fetch_with_timeout(&Slow, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewsError::Timeout { after_ms: 20, .. }));

        let providers: Vec<Box<dyn ReviewProvider>> = vec![fixture(), Box::new(Slow)];
        let report = run_once(&providers, Duration::from_millis(20)).await;
        assert_eq!(report.reviews.len(), 1);
        assert_eq!(report.failures[0].channel, "Slow");
        assert_eq!(report.failures[0].status, None);
    }
}
