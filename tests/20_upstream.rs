mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::{json, Value};

use campus_hub::upstream::{AuthScheme, LmsClient, RetryPolicy, SisClient, UpstreamClient, UpstreamError};

type Params = Query<HashMap<String, String>>;

#[derive(Clone, Default)]
struct Hits {
    count: Arc<AtomicUsize>,
    queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

impl Hits {
    fn record(&self, query: &HashMap<String, String>) -> usize {
        self.queries.lock().unwrap().push(query.clone());
        self.count.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    fn queries(&self) -> Vec<HashMap<String, String>> {
        self.queries.lock().unwrap().clone()
    }
}

async fn lms_students(State(hits): State<Hits>, headers: HeaderMap, Query(q): Params) -> impl IntoResponse {
    if headers.get("auth-token").and_then(|v| v.to_str().ok()) != Some("lms-token") {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "bad token" })));
    }
    hits.record(&q);
    let page: u64 = q.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    let students: Vec<Value> = match page {
        1 => vec![json!({ "id": 1 }), json!({ "id": 2 })],
        2 => vec![json!({ "id": 3 }), json!({ "id": 4 })],
        3 => vec![json!({ "id": 5 })],
        _ => vec![],
    };
    (StatusCode::OK, Json(json!({ "students": students, "meta": { "total_pages": 3 } })))
}

#[tokio::test]
async fn lms_students_walk_every_page_with_auth_header() -> Result<()> {
    let hits = Hits::default();
    let router = Router::new().route("/students", get(lms_students)).with_state(hits.clone());
    let base = common::spawn_server(router).await?;

    let client = LmsClient::new(&base, "lms-token", &common::sync_config())?;
    let since = Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap();
    let students = client.students(Some(since)).await?;

    let ids: Vec<i64> = students.iter().filter_map(|s| s["id"].as_i64()).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    assert_eq!(hits.count(), 3);

    let first = &hits.queries()[0];
    assert_eq!(first.get("per_page").map(String::as_str), Some("2"));
    assert_eq!(first.get("modified_since").map(String::as_str), Some("2024-09-01T00:00:00Z"));
    Ok(())
}

#[tokio::test]
async fn wrong_lms_token_fails_without_retrying() -> Result<()> {
    let hits = Hits::default();
    let router = Router::new().route("/students", get(lms_students)).with_state(hits.clone());
    let base = common::spawn_server(router).await?;

    let client = LmsClient::new(&base, "stale-token", &common::sync_config())?;
    let err = client.students(None).await.unwrap_err();

    assert_eq!(err.status(), Some(reqwest::StatusCode::UNAUTHORIZED));
    assert!(!err.is_retryable());
    Ok(())
}

async fn flaky_year_groups(State(hits): State<Hits>, Query(q): Params) -> impl IntoResponse {
    let n = hits.record(&q);
    if n <= 2 {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "try again" })));
    }
    (
        StatusCode::OK,
        Json(json!({ "year_groups": [{ "id": 7, "name": "Year 7" }], "meta": { "total_pages": 1 } })),
    )
}

#[tokio::test]
async fn server_errors_are_retried_until_success() -> Result<()> {
    let hits = Hits::default();
    let router = Router::new().route("/year-groups", get(flaky_year_groups)).with_state(hits.clone());
    let base = common::spawn_server(router).await?;

    let client = LmsClient::new(&base, "lms-token", &common::sync_config())?;
    let year_groups = client.year_groups().await?;

    assert_eq!(year_groups.len(), 1);
    assert_eq!(year_groups[0]["name"], "Year 7");
    assert_eq!(hits.count(), 3);
    Ok(())
}

async fn always_unavailable(State(hits): State<Hits>, Query(q): Params) -> StatusCode {
    hits.record(&q);
    StatusCode::SERVICE_UNAVAILABLE
}

#[tokio::test]
async fn retries_stop_after_the_configured_attempts() -> Result<()> {
    let hits = Hits::default();
    let router = Router::new().route("/classes", get(always_unavailable)).with_state(hits.clone());
    let base = common::spawn_server(router).await?;

    let client = LmsClient::new(&base, "lms-token", &common::sync_config())?;
    let err = client.classes().await.unwrap_err();

    assert_eq!(hits.count(), 3);
    assert!(err.is_retryable());
    assert!(matches!(err, UpstreamError::Status { .. }));
    Ok(())
}

async fn rate_limited_once(State(hits): State<Hits>, Query(q): Params) -> impl IntoResponse {
    let n = hits.record(&q);
    if n == 1 {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", "30".parse().unwrap());
        return (StatusCode::TOO_MANY_REQUESTS, headers, Json(json!({})));
    }
    (StatusCode::OK, HeaderMap::new(), Json(json!({ "ok": true })))
}

#[tokio::test]
async fn retry_after_is_honoured_up_to_the_cap() -> Result<()> {
    let hits = Hits::default();
    let router = Router::new().route("/ping", get(rate_limited_once)).with_state(hits.clone());
    let base = common::spawn_server(router).await?;

    // Backoff alone would wait 10s; the capped Retry-After wins
    let policy = RetryPolicy {
        attempts: 2,
        base_delay: Duration::from_secs(10),
        retry_after_cap: Duration::from_millis(50),
    };
    let client = UpstreamClient::with_policy(&base, AuthScheme::None, &common::sync_config(), policy)?;

    let started = Instant::now();
    let body = client.get_json(&["ping"], &[]).await?;

    assert_eq!(body["ok"], true);
    assert_eq!(hits.count(), 2);
    assert!(started.elapsed() < Duration::from_secs(5));
    Ok(())
}

#[test]
fn non_http_base_urls_are_rejected() {
    let err = UpstreamClient::new("ftp://lms.example", AuthScheme::None, &common::sync_config()).unwrap_err();
    assert!(matches!(err, UpstreamError::InvalidUrl(_)));
}

async fn class_students(Path(class_id): Path<String>) -> impl IntoResponse {
    if class_id == "broken" {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "no such class" })));
    }
    (
        StatusCode::OK,
        Json(json!({ "student_ids": ["s1", { "id": 2 }], "meta": { "total_pages": 1 } })),
    )
}

#[tokio::test]
async fn class_memberships_continue_past_a_failed_class() -> Result<()> {
    let router = Router::new().route("/classes/:id/students", get(class_students));
    let base = common::spawn_server(router).await?;

    let client = LmsClient::new(&base, "lms-token", &common::sync_config())?;
    let class_ids = vec!["c1".to_string(), "broken".to_string(), "c2".to_string()];
    let outcome = client.class_memberships(&class_ids).await;

    assert_eq!(outcome.items.len(), 4);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].0, "broken");

    let ids: Vec<&str> = outcome.items.iter().filter_map(|m| m["id"].as_str()).collect();
    assert!(ids.contains(&"c1:s1"));
    assert!(ids.contains(&"c2:2"));
    assert_eq!(outcome.items[0]["class_id"], "c1");
    Ok(())
}

#[tokio::test]
async fn class_ids_with_slashes_stay_one_segment() -> Result<()> {
    let router = Router::new().route("/classes/:id/students", get(class_students));
    let base = common::spawn_server(router).await?;

    let client = LmsClient::new(&base, "lms-token", &common::sync_config())?;
    let outcome = client.class_memberships(&["2024/7B".to_string()]).await;

    assert!(outcome.failures.is_empty());
    assert_eq!(outcome.items.len(), 2);
    assert_eq!(outcome.items[0]["id"], "2024/7B:s1");
    Ok(())
}

async fn sis_attendance(
    State(hits): State<Hits>,
    Path(school): Path<String>,
    headers: HeaderMap,
    Query(q): Params,
) -> impl IntoResponse {
    let authorized = headers.get("authorization").and_then(|v| v.to_str().ok()) == Some("Bearer sis-key");
    if !authorized || school != "S-100" {
        return (StatusCode::FORBIDDEN, Json(json!({})));
    }
    hits.record(&q);
    let records: Vec<Value> = q
        .get("student_ids")
        .map(|ids| ids.split(',').map(|id| json!({ "id": format!("att-{}", id), "student_id": id })).collect())
        .unwrap_or_default();
    (StatusCode::OK, Json(json!({ "data": records, "meta": { "total_pages": "1" } })))
}

#[tokio::test]
async fn sis_attendance_is_requested_in_id_batches() -> Result<()> {
    let hits = Hits::default();
    let router = Router::new()
        .route("/schools/:school/attendance", get(sis_attendance))
        .with_state(hits.clone());
    let base = common::spawn_server(router).await?;

    let client = SisClient::new(&base, "sis-key", "S-100", &common::sync_config())?;
    let student_ids: Vec<String> = (1..=30).map(|i| format!("st{}", i)).collect();
    let start = NaiveDate::from_ymd_opt(2024, 9, 2).unwrap();
    let outcome = client.attendance(&student_ids, start).await;

    assert!(outcome.failures.is_empty());
    assert_eq!(outcome.items.len(), 30);

    let queries = hits.queries();
    assert_eq!(queries.len(), 2);
    let batch_sizes: Vec<usize> = queries.iter().map(|q| q["student_ids"].split(',').count()).collect();
    assert_eq!(batch_sizes, vec![25, 5]);
    assert!(queries.iter().all(|q| q["start_date"] == "2024-09-02"));
    Ok(())
}

async fn sis_students(Query(q): Params) -> Json<Value> {
    let page: u64 = q.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    let data = if page == 1 {
        json!([{ "id": "a" }, { "id": "b" }])
    } else {
        json!([{ "id": "c" }])
    };
    Json(json!({ "data": data, "meta": { "total_pages": "2" } }))
}

#[tokio::test]
async fn sis_students_accept_string_page_counts() -> Result<()> {
    let router = Router::new().route("/schools/:school/students", get(sis_students));
    let base = common::spawn_server(router).await?;

    let client = SisClient::new(&base, "sis-key", "S-100", &common::sync_config())?;
    let students = client.students(None).await?;

    let ids: Vec<&str> = students.iter().filter_map(|s| s["id"].as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    Ok(())
}

async fn malformed() -> Json<Value> {
    Json(json!({ "data": { "not": "a list" } }))
}

#[tokio::test]
async fn non_array_payloads_are_reported() -> Result<()> {
    let router = Router::new().route("/schools/:school/staff", get(malformed));
    let base = common::spawn_server(router).await?;

    let client = SisClient::new(&base, "sis-key", "S-100", &common::sync_config())?;
    let err = client.staff(None).await.unwrap_err();
    assert!(matches!(err, UpstreamError::Payload { .. }));
    Ok(())
}
