// tests/approvals_kv.rs
//
// ApprovalSet over the REST key-value store, against a local fake that
// speaks the `/get/{key}` + `/set/{key}` protocol with bearer auth.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{TimeZone, Utc};
use serde_json::json;

use guest_review_hub::approvals::{ApprovalSet, KvStore, RestKv, INDEX_KEY};
use guest_review_hub::clock::FixedClock;
use guest_review_hub::ReviewsError;

const TOKEN: &str = "kv-token";

type Db = Arc<Mutex<HashMap<String, String>>>;

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TOKEN}"))
}

async fn kv_get(State(db): State<Db>, Path(key): Path<String>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "bad token").into_response();
    }
    let value = db.lock().unwrap().get(&key).cloned();
    Json(json!({ "result": value })).into_response()
}

async fn kv_set(
    State(db): State<Db>,
    Path(key): Path<String>,
    headers: HeaderMap,
    body: String,
) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "bad token").into_response();
    }
    db.lock().unwrap().insert(key, body);
    Json(json!({ "result": "OK" })).into_response()
}

async fn spawn_fake_kv() -> (String, Db) {
    let db: Db = Arc::default();
    let app = Router::new()
        .route("/get/{key}", get(kv_get))
        .route("/set/{key}", post(kv_set))
        .with_state(db.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), db)
}

fn approvals(base: &str, token: &str) -> ApprovalSet {
    let store: Arc<dyn KvStore> = Arc::new(RestKv::new(reqwest::Client::new(), base, token));
    let clock = Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 8, 25, 12, 0, 0).unwrap()));
    ApprovalSet::new(store, clock)
}

#[tokio::test]
async fn approvals_persist_through_rest_store() {
    let (base, db) = spawn_fake_kv().await;
    let set = approvals(&base, TOKEN);
    assert_eq!(set.store_kind(), "kv");

    assert!(set.approved_ids("L1").await.unwrap().is_empty());
    set.set_approved("hx-1", "L1", true).await.unwrap();
    set.set_approved("hx-2", "L1", true).await.unwrap();
    set.set_approved("hx-1", "L1", false).await.unwrap();

    // A second handle on the same store sees the same state.
    let other = approvals(&base, TOKEN);
    assert_eq!(other.approved_ids("L1").await.unwrap(), vec!["hx-2"]);

    let raw = db.lock().unwrap().get(INDEX_KEY).cloned().expect("index stored");
    let stored: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(stored["hx-2"]["listingId"], "L1");
    assert_eq!(stored["hx-2"]["approvedAt"], "2024-08-25T12:00:00Z");
}

#[tokio::test]
async fn rejected_token_is_a_store_error() {
    let (base, _db) = spawn_fake_kv().await;
    let set = approvals(&base, "wrong");
    let err = set.set_approved("hx-1", "L1", true).await.unwrap_err();
    assert!(matches!(err, ReviewsError::Store(_)), "{err}");
    assert!(err.to_string().contains("401"));
}

#[tokio::test]
async fn unreachable_store_is_a_store_error() {
    // Bind then drop to get a port nothing listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let set = approvals(&format!("http://{addr}"), TOKEN);
    assert!(matches!(
        set.approved_ids("L1").await.unwrap_err(),
        ReviewsError::Store(_)
    ));
}
