use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::app::AppState;
use crate::database::DatabaseManager;

/// GET / - service banner and route map
pub async fn root() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "name": "Campus Hub",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "School data integration hub: LMS and SIS sync, access control, dashboard tokens",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "auth": "/auth/login, /auth/refresh (public - token acquisition)",
                "whoami": "/api/auth/whoami (protected)",
                "nodes": "/api/nodes[/:id] (protected)",
                "users": "/api/users[/:id] (admin)",
                "access_groups": "/api/access-groups[/:id[/members|/nodes]] (admin)",
                "tenant_configs": "/api/tenant-configs[/:id] (admin)",
                "sync": "/api/sync/runs[/:id], /api/sync/schedules[/:id], /api/sync/cursors/:node_id (admin)",
                "dashboards": "/api/dashboards/:dashboard_id/guest-token (protected)",
            }
        }
    }))
}

/// GET /health - database connectivity and sync state
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();
    let sync_running = state.orchestrator.is_running();

    match DatabaseManager::health_check(&state.pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok",
                    "sync_running": sync_running,
                }
            })),
        ),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "database unavailable",
                    "code": "SERVICE_UNAVAILABLE",
                    "data": {
                        "status": "degraded",
                        "timestamp": now,
                        "sync_running": sync_running,
                    }
                })),
            )
        }
    }
}
