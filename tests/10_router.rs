mod common;

use anyhow::Result;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use campus_hub::app::app;
use campus_hub::config;

fn router(rate_limit_requests: Option<u32>) -> Result<Router> {
    Ok(app(common::offline_state(rate_limit_requests)?, config::config()))
}

async fn send(router: Router, request: Request<Body>) -> Result<(StatusCode, Value)> {
    let response = router.oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, body))
}

fn get(uri: &str, bearer: Option<&str>) -> Result<Request<Body>> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, token);
    }
    Ok(builder.body(Body::empty())?)
}

fn post_json(uri: &str, bearer: &str, body: Value) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::AUTHORIZATION, bearer)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))?)
}

#[tokio::test]
async fn root_banner_is_public() -> Result<()> {
    let (status, body) = send(router(None)?, get("/", None)?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["name"], "Campus Hub");
    Ok(())
}

#[tokio::test]
async fn health_reports_unreachable_database() -> Result<()> {
    let (status, body) = send(router(None)?, get("/health", None)?).await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
    Ok(())
}

#[tokio::test]
async fn api_routes_require_a_bearer_token() -> Result<()> {
    let (status, body) = send(router(None)?, get("/api/nodes", None)?).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _) = send(router(None)?, get("/api/nodes", Some("Bearer not-a-jwt"))?).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(router(None)?, get("/api/nodes", Some("Basic dXNlcjpwdw=="))?).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn viewers_cannot_reach_admin_routes() -> Result<()> {
    let viewer = common::bearer_for("viewer")?;

    let (status, body) = send(router(None)?, get("/api/users", Some(&viewer))?).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, _) = send(router(None)?, post_json("/api/sync/runs", &viewer, json!({}))?).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(router(None)?, get("/api/sync/schedules", Some(&viewer))?).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn dashboards_are_unavailable_without_superset() -> Result<()> {
    let admin = common::bearer_for("admin")?;
    let (status, body) = send(
        router(None)?,
        post_json("/api/dashboards/dash-1/guest-token", &admin, json!({}))?,
    )
    .await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "SERVICE_UNAVAILABLE");
    Ok(())
}

#[tokio::test]
async fn rate_limiter_rejects_requests_over_quota() -> Result<()> {
    let router = router(Some(2))?;

    for _ in 0..2 {
        let (status, _) = send(router.clone(), get("/", None)?).await?;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = send(router, get("/", None)?).await?;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "TOO_MANY_REQUESTS");
    Ok(())
}

#[tokio::test]
async fn login_rejects_malformed_bodies() -> Result<()> {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"email": "a@b.test"}"#))?;
    let response = router(None)?.oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    Ok(())
}
