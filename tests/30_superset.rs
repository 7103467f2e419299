mod common;

use std::sync::{Arc, Mutex};

use anyhow::Result;
use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use uuid::Uuid;

use campus_hub::superset::{GuestUser, SupersetClient};
use campus_hub::upstream::UpstreamError;

#[derive(Clone, Default)]
struct Seen {
    guest_requests: Arc<Mutex<Vec<Value>>>,
}

async fn login(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if body["username"] == "svc" && body["password"] == "svc-password" && body["provider"] == "db" {
        (StatusCode::OK, Json(json!({ "access_token": "svc-access" })))
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "message": "bad credentials" })))
    }
}

async fn guest_token(State(seen): State<Seen>, headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer svc-access") {
        return (StatusCode::UNAUTHORIZED, Json(json!({})));
    }
    seen.guest_requests.lock().unwrap().push(body);
    (StatusCode::OK, Json(json!({ "token": "guest-123" })))
}

async fn fake_superset() -> Result<(String, Seen)> {
    let seen = Seen::default();
    let router = Router::new()
        .route("/api/v1/security/login", post(login))
        .route("/api/v1/security/guest_token/", post(guest_token))
        .with_state(seen.clone());
    Ok((common::spawn_server(router).await?, seen))
}

fn viewer() -> GuestUser {
    GuestUser {
        username: "viewer@school.test".to_string(),
        first_name: "Vera".to_string(),
        last_name: "Viewer".to_string(),
    }
}

#[tokio::test]
async fn guest_token_carries_school_rls() -> Result<()> {
    let (base, seen) = fake_superset().await?;
    let client = SupersetClient::new(common::superset_config(Some(base)))?;

    let school = Uuid::new_v4();
    let token = client.guest_token("dash-1", &viewer(), Some(&[school][..])).await?;
    assert_eq!(token.token, "guest-123");

    let requests = seen.guest_requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    let body = &requests[0];
    assert_eq!(body["resources"][0]["type"], "dashboard");
    assert_eq!(body["resources"][0]["id"], "dash-1");
    assert_eq!(body["user"]["username"], "viewer@school.test");
    assert_eq!(
        body["rls"][0]["clause"],
        format!("school_node_id IN ('{}')", school)
    );
    Ok(())
}

#[tokio::test]
async fn unrestricted_guest_token_has_no_rls() -> Result<()> {
    let (base, seen) = fake_superset().await?;
    let client = SupersetClient::new(common::superset_config(Some(base)))?;

    client.guest_token("dash-2", &viewer(), None).await?;

    let requests = seen.guest_requests.lock().unwrap().clone();
    assert_eq!(requests[0]["rls"], json!([]));
    Ok(())
}

#[tokio::test]
async fn bad_service_credentials_surface_as_status_error() -> Result<()> {
    let (base, seen) = fake_superset().await?;
    let mut config = common::superset_config(Some(base));
    config.password = "wrong".to_string();
    let client = SupersetClient::new(config)?;

    let err = client.guest_token("dash-1", &viewer(), None).await.unwrap_err();
    assert_eq!(err.status(), Some(reqwest::StatusCode::UNAUTHORIZED));
    assert!(seen.guest_requests.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn unconfigured_superset_is_reported() -> Result<()> {
    let client = SupersetClient::new(common::superset_config(None))?;
    assert!(!client.is_configured());

    let err = client.guest_token("dash-1", &viewer(), None).await.unwrap_err();
    assert!(matches!(err, UpstreamError::NotConfigured(_)));
    Ok(())
}
