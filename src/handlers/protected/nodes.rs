use axum::{
    extract::{Path, State},
    Extension, Json,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::database::models::Node;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::rbac::{self, require_role, Role};
use crate::services::{NodeInput, NodeService};

/// GET /api/nodes - nodes visible to the caller
pub async fn list(State(state): State<AppState>, Extension(user): Extension<AuthUser>) -> ApiResult<Vec<Node>> {
    let accessible = rbac::accessible_node_ids(&state.pool, &user).await?;
    let nodes = NodeService::new(state.pool.clone())
        .select_all()
        .await?
        .into_iter()
        .filter(|n| accessible.contains(&n.id))
        .collect();
    Ok(ApiResponse::success(nodes))
}

/// POST /api/nodes - create a node (admin)
///
/// Expected Input:
/// ```json
/// { "parent_id": "uuid|null", "name": "North High", "kind": "school", "code": "NH" }
/// ```
///
/// Root nodes (no parent) are reserved for super_admin.
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<NodeInput>,
) -> ApiResult<Node> {
    require_role(&user, Role::Admin)?;
    match body.parent_id {
        Some(parent) => rbac::ensure_node_access(&state.pool, &user, parent).await?,
        None => require_role(&user, Role::SuperAdmin)?,
    }

    let node = NodeService::new(state.pool.clone()).create_one(&body).await?;
    tracing::info!("{} created node {} ({})", user.email, node.id, node.kind);
    Ok(ApiResponse::created(node))
}

/// GET /api/nodes/:id
pub async fn show(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Node> {
    rbac::ensure_node_access(&state.pool, &user, id).await?;
    let node = NodeService::new(state.pool.clone()).select_404(id).await?;
    Ok(ApiResponse::success(node))
}

/// PUT /api/nodes/:id - replace name, kind, code and parent (admin)
pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<NodeInput>,
) -> ApiResult<Node> {
    require_role(&user, Role::Admin)?;
    rbac::ensure_node_access(&state.pool, &user, id).await?;

    let service = NodeService::new(state.pool.clone());
    let existing = service.select_404(id).await?;
    if body.parent_id != existing.parent_id {
        match body.parent_id {
            Some(parent) => rbac::ensure_node_access(&state.pool, &user, parent).await?,
            None => require_role(&user, Role::SuperAdmin)?,
        }
    }

    let node = service.update_404(id, &body).await?;
    Ok(ApiResponse::success(node))
}

/// DELETE /api/nodes/:id - only leaf nodes can be deleted (admin)
pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<()>, ApiError> {
    require_role(&user, Role::Admin)?;
    rbac::ensure_node_access(&state.pool, &user, id).await?;
    NodeService::new(state.pool.clone()).delete_404(id).await?;
    tracing::info!("{} deleted node {}", user.email, id);
    Ok(ApiResponse::no_content())
}
