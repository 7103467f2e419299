use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app::AppState;
use crate::database::models::{SyncCursor, SyncRun, SyncSchedule};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::rbac::{self, require_role, Role};
use crate::services::{ScheduleInput, ScheduleService, SyncRunDetail, SyncRunService};
use crate::sync::{cursor, Trigger};

#[derive(Debug, Default, Deserialize)]
pub struct StartRunBody {
    pub node_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct StartedRun {
    pub run_id: Uuid,
    pub status: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct RunListQuery {
    pub limit: Option<i64>,
}

/// POST /api/sync/runs - start a sync in the background (admin)
///
/// Expected Input (optional):
/// ```json
/// { "node_id": "uuid" }
/// ```
///
/// Returns 202 with the run id, or 409 when a run is already in progress.
pub async fn start_run(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Option<Json<StartRunBody>>,
) -> ApiResult<StartedRun> {
    require_role(&user, Role::Admin)?;
    let node_id = body.and_then(|Json(b)| b.node_id);

    if let Some(node) = node_id {
        rbac::ensure_node_access(&state.pool, &user, node).await?;
    }

    let run_id = state.orchestrator.start(Trigger::Manual, node_id).await?;
    tracing::info!("{} started sync run {}", user.email, run_id);
    Ok(ApiResponse::accepted(StartedRun {
        run_id,
        status: "running",
    }))
}

/// GET /api/sync/runs?limit=50 - most recent runs first (admin)
pub async fn list_runs(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<RunListQuery>,
) -> ApiResult<Vec<SyncRun>> {
    require_role(&user, Role::Admin)?;
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let runs = SyncRunService::new(state.pool.clone()).select_recent(limit).await?;
    Ok(ApiResponse::success(runs))
}

/// GET /api/sync/runs/:id - run with its error rows (admin)
pub async fn show_run(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<SyncRunDetail> {
    require_role(&user, Role::Admin)?;
    let detail = SyncRunService::new(state.pool.clone()).select_404(id).await?;
    Ok(ApiResponse::success(detail))
}

/// GET /api/sync/cursors/:node_id - incremental sync positions for a school (admin)
pub async fn list_cursors(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(node_id): Path<Uuid>,
) -> ApiResult<Vec<SyncCursor>> {
    require_role(&user, Role::Admin)?;
    rbac::ensure_node_access(&state.pool, &user, node_id).await?;
    Ok(ApiResponse::success(cursor::list_cursors(&state.pool, node_id).await?))
}

/// GET /api/sync/schedules (admin)
pub async fn list_schedules(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Vec<SyncSchedule>> {
    require_role(&user, Role::Admin)?;
    Ok(ApiResponse::success(ScheduleService::new(state.pool.clone()).select_all().await?))
}

/// POST /api/sync/schedules (admin)
///
/// Expected Input:
/// ```json
/// { "cron_expression": "0 0 2 * * *", "enabled": true, "node_id": null, "description": "nightly" }
/// ```
///
/// Cron expressions have six fields, seconds first. Changes are picked up on the next scheduler reload.
pub async fn create_schedule(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<ScheduleInput>,
) -> ApiResult<SyncSchedule> {
    require_role(&user, Role::Admin)?;
    if let Some(node) = body.node_id {
        rbac::ensure_node_access(&state.pool, &user, node).await?;
    }
    let schedule = ScheduleService::new(state.pool.clone()).create_one(&body).await?;
    Ok(ApiResponse::created(schedule))
}

/// PUT /api/sync/schedules/:id (admin)
pub async fn update_schedule(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<ScheduleInput>,
) -> ApiResult<SyncSchedule> {
    require_role(&user, Role::Admin)?;
    if let Some(node) = body.node_id {
        rbac::ensure_node_access(&state.pool, &user, node).await?;
    }
    let schedule = ScheduleService::new(state.pool.clone()).update_404(id, &body).await?;
    Ok(ApiResponse::success(schedule))
}

/// DELETE /api/sync/schedules/:id (admin)
pub async fn delete_schedule(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<()>, ApiError> {
    require_role(&user, Role::Admin)?;
    ScheduleService::new(state.pool.clone()).delete_404(id).await?;
    Ok(ApiResponse::no_content())
}
