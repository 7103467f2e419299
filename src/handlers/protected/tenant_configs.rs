use axum::{
    extract::{Path, State},
    Extension, Json,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::database::models::TenantConfigResponse;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::rbac::{self, require_role, Role};
use crate::services::{TenantConfigInput, TenantConfigService};

/// GET /api/tenant-configs - configs for schools the caller can reach (admin)
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Vec<TenantConfigResponse>> {
    require_role(&user, Role::Admin)?;
    let accessible = rbac::accessible_node_ids(&state.pool, &user).await?;
    let configs = TenantConfigService::new(state.pool.clone())
        .select_all()
        .await?
        .into_iter()
        .filter(|c| accessible.contains(&c.node_id))
        .map(TenantConfigResponse::from)
        .collect();
    Ok(ApiResponse::success(configs))
}

/// POST /api/tenant-configs (admin)
///
/// Expected Input:
/// ```json
/// {
///   "node_id": "school uuid",
///   "lms_enabled": true, "lms_base_url": "https://lms.example/api/v2", "lms_api_token": "...",
///   "sis_enabled": false
/// }
/// ```
///
/// Secrets are write-only; responses carry `has_lms_api_token` / `has_sis_api_key`.
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<TenantConfigInput>,
) -> ApiResult<TenantConfigResponse> {
    require_role(&user, Role::Admin)?;
    let node_id = body
        .node_id
        .ok_or_else(|| ApiError::field("node_id", "is required"))?;
    rbac::ensure_node_access(&state.pool, &user, node_id).await?;

    let config = TenantConfigService::new(state.pool.clone()).create_one(body).await?;
    tracing::info!("{} configured school {}", user.email, config.node_id);
    Ok(ApiResponse::created(config.into()))
}

/// GET /api/tenant-configs/:id (admin)
pub async fn show(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<TenantConfigResponse> {
    require_role(&user, Role::Admin)?;
    let config = TenantConfigService::new(state.pool.clone()).select_404(id).await?;
    rbac::ensure_node_access(&state.pool, &user, config.node_id).await?;
    Ok(ApiResponse::success(config.into()))
}

/// PUT /api/tenant-configs/:id (admin). Omitted secrets are kept, "" clears them.
pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<TenantConfigInput>,
) -> ApiResult<TenantConfigResponse> {
    require_role(&user, Role::Admin)?;
    let service = TenantConfigService::new(state.pool.clone());
    let existing = service.select_404(id).await?;
    rbac::ensure_node_access(&state.pool, &user, existing.node_id).await?;

    let config = service.update_404(id, body).await?;
    Ok(ApiResponse::success(config.into()))
}

/// DELETE /api/tenant-configs/:id (admin)
pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<()>, ApiError> {
    require_role(&user, Role::Admin)?;
    let service = TenantConfigService::new(state.pool.clone());
    let existing = service.select_404(id).await?;
    rbac::ensure_node_access(&state.pool, &user, existing.node_id).await?;
    service.delete_404(id).await?;
    Ok(ApiResponse::no_content())
}
