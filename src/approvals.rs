//! # Approval Set
//! Which reviews a manager has approved for the public property page.
//!
//! Records live in one index document (`approvals:index`) keyed by review id
//! alone, so approving an id under a second listing overwrites the first
//! record. Toggles are read-modify-write without a lock around the store:
//! concurrent writers race and the last write wins.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::clock::SharedClock;
use crate::config::reviews::{ENV_KV_TOKEN, ENV_KV_URL};
use crate::config::StoreKind;
use crate::error::{Result, ReviewsError};

pub const INDEX_KEY: &str = "approvals:index";

/// Minimal key-value store the approval set is written against.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> Result<()>;
    fn kind(&self) -> &'static str;
}

/// Process-local store. Lives as long as whoever built it; nothing persists.
#[derive(Debug, Default)]
pub struct MemoryKv {
    inner: Mutex<HashMap<String, Value>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let map = self
            .inner
            .lock()
            .map_err(|_| ReviewsError::Store("memory store mutex poisoned".into()))?;
        Ok(map.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut map = self
            .inner
            .lock()
            .map_err(|_| ReviewsError::Store("memory store mutex poisoned".into()))?;
        map.insert(key.to_string(), value);
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

/// REST key-value store (Upstash / Vercel KV wire format): values are stored
/// as JSON strings, `GET /get/{key}` answers `{"result": "<json>" | null}`.
pub struct RestKv {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl RestKv {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    async fn call(&self, req: reqwest::RequestBuilder) -> Result<Value> {
        let resp = req
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ReviewsError::Store(e.to_string()))?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(ReviewsError::Store(format!("kv status {}: {body}", status.as_u16())));
        }
        serde_json::from_str(&body).map_err(|e| ReviewsError::Store(format!("kv response: {e}")))
    }
}

#[async_trait]
impl KvStore for RestKv {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let url = format!("{}/get/{}", self.base_url, key);
        let resp = self.call(self.client.get(url)).await?;
        match resp.get("result") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => serde_json::from_str(s)
                .map(Some)
                .map_err(|e| ReviewsError::Store(format!("kv value for {key}: {e}"))),
            Some(other) => Ok(Some(other.clone())),
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let url = format!("{}/set/{}", self.base_url, key);
        self.call(self.client.post(url).body(value.to_string()))
            .await
            .map(|_| ())
    }

    fn kind(&self) -> &'static str {
        "kv"
    }
}

fn kv_env() -> Option<(String, String)> {
    let url = std::env::var(ENV_KV_URL).ok().filter(|v| !v.trim().is_empty())?;
    let token = std::env::var(ENV_KV_TOKEN).ok().filter(|v| !v.trim().is_empty())?;
    Some((url, token))
}

/// Pick the approval backend from config and environment.
///
/// `Auto` uses the REST store when both KV env vars are set and otherwise
/// falls back to memory, warning once per process: approvals then vanish on
/// restart and are not shared between instances. `Kv` without the env vars
/// is a startup error.
pub fn select_store(kind: StoreKind, client: &reqwest::Client) -> anyhow::Result<Arc<dyn KvStore>> {
    static FALLBACK_WARNED: once_cell::sync::OnceCell<()> = once_cell::sync::OnceCell::new();

    match (kind, kv_env()) {
        (StoreKind::Memory, _) => Ok(Arc::new(MemoryKv::new())),
        (StoreKind::Kv | StoreKind::Auto, Some((url, token))) => {
            Ok(Arc::new(RestKv::new(client.clone(), url, token)))
        }
        (StoreKind::Kv, None) => Err(anyhow::anyhow!(
            "approvals.store = \"kv\" needs {ENV_KV_URL} and {ENV_KV_TOKEN}"
        )),
        (StoreKind::Auto, None) => {
            FALLBACK_WARNED.get_or_init(|| {
                tracing::warn!(
                    target: "approvals",
                    "KV env vars not set; approvals kept in memory and lost on restart"
                );
            });
            Ok(Arc::new(MemoryKv::new()))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRecord {
    pub review_id: String,
    pub listing_id: String,
    pub approved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ApprovalOutcome {
    pub approved: bool,
}

#[derive(Clone)]
pub struct ApprovalSet {
    store: Arc<dyn KvStore>,
    clock: SharedClock,
}

impl ApprovalSet {
    pub fn new(store: Arc<dyn KvStore>, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    pub fn store_kind(&self) -> &'static str {
        self.store.kind()
    }

    async fn load(&self) -> Result<BTreeMap<String, ApprovalRecord>> {
        match self.store.get(INDEX_KEY).await? {
            None | Some(Value::Null) => Ok(BTreeMap::new()),
            Some(v) => serde_json::from_value(v)
                .map_err(|e| ReviewsError::Store(format!("corrupt approval index: {e}"))),
        }
    }

    async fn save(&self, records: &BTreeMap<String, ApprovalRecord>) -> Result<()> {
        let v = serde_json::to_value(records)
            .map_err(|e| ReviewsError::Store(format!("encoding approval index: {e}")))?;
        self.store.set(INDEX_KEY, v).await
    }

    /// Approved review ids for one listing, ascending. Empty id → empty list.
    pub async fn approved_ids(&self, listing_id: &str) -> Result<Vec<String>> {
        if listing_id.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .load()
            .await?
            .into_values()
            .filter(|r| r.listing_id == listing_id)
            .map(|r| r.review_id)
            .collect())
    }

    /// Approve or un-approve one review. Both ids are required; nothing is
    /// read or written when either is missing.
    pub async fn set_approved(
        &self,
        review_id: &str,
        listing_id: &str,
        approved: bool,
    ) -> Result<ApprovalOutcome> {
        let review_id = review_id.trim();
        let listing_id = listing_id.trim();
        let mut missing = Vec::new();
        if review_id.is_empty() {
            missing.push("reviewId");
        }
        if listing_id.is_empty() {
            missing.push("listingId");
        }
        if !missing.is_empty() {
            return Err(ReviewsError::missing_fields(&missing));
        }

        let mut records = self.load().await?;
        if approved {
            let record = ApprovalRecord {
                review_id: review_id.to_string(),
                listing_id: listing_id.to_string(),
                approved_at: self.clock.now(),
            };
            if let Some(prev) = records.insert(review_id.to_string(), record) {
                if prev.listing_id != listing_id {
                    tracing::warn!(
                        target: "approvals",
                        review_id,
                        from = %prev.listing_id,
                        to = listing_id,
                        "approval moved between listings"
                    );
                }
            }
        } else if records.remove(review_id).is_none() {
            return Ok(ApprovalOutcome { approved });
        }

        self.save(&records).await?;
        tracing::info!(target: "approvals", review_id, listing_id, approved, "approval updated");
        Ok(ApprovalOutcome { approved })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn set_with(store: Arc<dyn KvStore>) -> ApprovalSet {
        let clock = Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()));
        ApprovalSet::new(store, clock)
    }

    fn memory_set() -> ApprovalSet {
        set_with(Arc::new(MemoryKv::new()))
    }

    /// Counts calls so tests can prove nothing touched the store.
    #[derive(Default)]
    struct CountingKv {
        inner: MemoryKv,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl KvStore for CountingKv {
        async fn get(&self, key: &str) -> Result<Option<Value>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.get(key).await
        }
        async fn set(&self, key: &str, value: Value) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.set(key, value).await
        }
        fn kind(&self) -> &'static str {
            "counting"
        }
    }

    struct DownKv;

    #[async_trait]
    impl KvStore for DownKv {
        async fn get(&self, _key: &str) -> Result<Option<Value>> {
            Err(ReviewsError::Store("connection refused".into()))
        }
        async fn set(&self, _key: &str, _value: Value) -> Result<()> {
            Err(ReviewsError::Store("connection refused".into()))
        }
        fn kind(&self) -> &'static str {
            "down"
        }
    }

    #[tokio::test]
    async fn approve_twice_is_idempotent() {
        let set = memory_set();
        set.set_approved("R1", "L1", true).await.unwrap();
        let once = set.approved_ids("L1").await.unwrap();
        set.set_approved("R1", "L1", true).await.unwrap();
        assert_eq!(set.approved_ids("L1").await.unwrap(), once);
        assert_eq!(once, vec!["R1".to_string()]);
    }

    #[tokio::test]
    async fn unapprove_absent_is_noop() {
        let set = memory_set();
        set.set_approved("R1", "L1", true).await.unwrap();
        let out = set.set_approved("R2", "L1", false).await.unwrap();
        assert!(!out.approved);
        assert_eq!(set.approved_ids("L1").await.unwrap(), vec!["R1".to_string()]);

        set.set_approved("R1", "L1", false).await.unwrap();
        assert!(set.approved_ids("L1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn ids_are_scoped_by_listing() {
        let set = memory_set();
        set.set_approved("b", "L1", true).await.unwrap();
        set.set_approved("a", "L1", true).await.unwrap();
        set.set_approved("c", "L2", true).await.unwrap();
        assert_eq!(set.approved_ids("L1").await.unwrap(), vec!["a", "b"]);
        assert_eq!(set.approved_ids("L2").await.unwrap(), vec!["c"]);
        assert!(set.approved_ids("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn same_review_id_under_two_listings_overwrites() {
        let set = memory_set();
        set.set_approved("R1", "L1", true).await.unwrap();
        set.set_approved("R1", "L2", true).await.unwrap();
        assert!(set.approved_ids("L1").await.unwrap().is_empty());
        assert_eq!(set.approved_ids("L2").await.unwrap(), vec!["R1"]);
    }

    #[tokio::test]
    async fn validation_happens_before_store_access() {
        let store = Arc::new(CountingKv::default());
        let set = set_with(store.clone());
        let err = set.set_approved("", "  ", true).await.unwrap_err();
        assert!(matches!(err, ReviewsError::Validation(_)));
        assert_eq!(err.to_string(), "reviewId and listingId are required");
        let err = set.set_approved("R1", "", true).await.unwrap_err();
        assert_eq!(err.to_string(), "listingId is required");
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn store_failure_is_surfaced() {
        let set = set_with(Arc::new(DownKv));
        assert!(matches!(
            set.approved_ids("L1").await.unwrap_err(),
            ReviewsError::Store(_)
        ));
        assert!(matches!(
            set.set_approved("R1", "L1", true).await.unwrap_err(),
            ReviewsError::Store(_)
        ));
    }

    #[tokio::test]
    async fn corrupt_index_is_a_store_error() {
        let store = Arc::new(MemoryKv::new());
        store.set(INDEX_KEY, Value::from("garbage")).await.unwrap();
        let set = set_with(store);
        assert!(matches!(
            set.approved_ids("L1").await.unwrap_err(),
            ReviewsError::Store(_)
        ));
    }

    #[serial_test::serial]
    #[test]
    fn store_selection_follows_env() {
        let client = reqwest::Client::new();
        std::env::remove_var(ENV_KV_URL);
        std::env::remove_var(ENV_KV_TOKEN);
        assert_eq!(select_store(StoreKind::Auto, &client).unwrap().kind(), "memory");
        assert!(select_store(StoreKind::Kv, &client).is_err());

        std::env::set_var(ENV_KV_URL, "https://kv.example.test");
        std::env::set_var(ENV_KV_TOKEN, "t0ken");
        assert_eq!(select_store(StoreKind::Auto, &client).unwrap().kind(), "kv");
        assert_eq!(select_store(StoreKind::Memory, &client).unwrap().kind(), "memory");
        std::env::remove_var(ENV_KV_URL);
        std::env::remove_var(ENV_KV_TOKEN);
    }

    #[tokio::test]
    async fn record_carries_clock_time() {
        let store = Arc::new(MemoryKv::new());
        let set = set_with(store.clone());
        set.set_approved("R1", "L1", true).await.unwrap();
        let raw = store.get(INDEX_KEY).await.unwrap().unwrap();
        assert_eq!(raw["R1"]["listingId"], "L1");
        assert_eq!(raw["R1"]["approvedAt"], "2024-06-01T00:00:00Z");
    }
}
