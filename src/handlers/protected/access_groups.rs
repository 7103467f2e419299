use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use std::collections::HashSet;
use uuid::Uuid;

use crate::app::AppState;
use crate::database::models::{AccessGroup, AccessGroupDetail};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::rbac::{self, require_role, Role};
use crate::services::{AccessGroupInput, AccessGroupService};

#[derive(Debug, Deserialize)]
pub struct MembersBody {
    pub user_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct NodesBody {
    pub node_ids: Vec<Uuid>,
}

/// GET /api/access-groups (admin)
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Vec<AccessGroupDetail>> {
    require_role(&user, Role::Admin)?;
    Ok(ApiResponse::success(AccessGroupService::new(state.pool.clone()).select_all().await?))
}

/// POST /api/access-groups (admin)
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<AccessGroupInput>,
) -> ApiResult<AccessGroup> {
    require_role(&user, Role::Admin)?;
    let group = AccessGroupService::new(state.pool.clone()).create_one(&body).await?;
    Ok(ApiResponse::created(group))
}

/// GET /api/access-groups/:id (admin)
pub async fn show(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<AccessGroupDetail> {
    require_role(&user, Role::Admin)?;
    Ok(ApiResponse::success(AccessGroupService::new(state.pool.clone()).select_404(id).await?))
}

/// PUT /api/access-groups/:id (admin)
pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<AccessGroupInput>,
) -> ApiResult<AccessGroup> {
    require_role(&user, Role::Admin)?;
    let group = AccessGroupService::new(state.pool.clone()).update_404(id, &body).await?;
    Ok(ApiResponse::success(group))
}

/// DELETE /api/access-groups/:id (admin)
pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<()>, ApiError> {
    require_role(&user, Role::Admin)?;
    AccessGroupService::new(state.pool.clone()).delete_404(id).await?;
    Ok(ApiResponse::no_content())
}

/// PUT /api/access-groups/:id/members - replace the member list (admin)
///
/// Expected Input:
/// ```json
/// { "user_ids": ["uuid", "uuid"] }
/// ```
pub async fn set_members(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<MembersBody>,
) -> ApiResult<AccessGroupDetail> {
    require_role(&user, Role::Admin)?;
    let group = AccessGroupService::new(state.pool.clone())
        .set_members(id, &body.user_ids)
        .await?;
    Ok(ApiResponse::success(group))
}

/// PUT /api/access-groups/:id/nodes - replace the granted nodes (admin)
///
/// Admins can only grant nodes inside their own reach.
pub async fn set_nodes(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<NodesBody>,
) -> ApiResult<AccessGroupDetail> {
    require_role(&user, Role::Admin)?;
    if user.role != Role::SuperAdmin {
        // Unknown ids fall through to the service's 422
        let known: HashSet<Uuid> = rbac::load_node_links(&state.pool).await?.into_iter().map(|(id, _)| id).collect();
        let accessible = rbac::accessible_node_ids(&state.pool, &user).await?;
        if let Some(outside) = body
            .node_ids
            .iter()
            .find(|n| known.contains(n) && !accessible.contains(n))
        {
            return Err(ApiError::forbidden(format!("Node {} is outside your access", outside)));
        }
    }

    let group = AccessGroupService::new(state.pool.clone())
        .set_nodes(id, &body.node_ids)
        .await?;
    Ok(ApiResponse::success(group))
}
