use axum::{extract::State, Extension};
use serde::Serialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::config;
use crate::database::models::User;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::rbac;
use crate::services::UserService;

#[derive(Debug, Serialize)]
pub struct WhoAmI {
    #[serde(flatten)]
    pub user: User,
    pub accessible_node_ids: Vec<Uuid>,
}

/// GET /api/auth/whoami - the caller's account and every node they can reach
pub async fn whoami(State(state): State<AppState>, Extension(auth): Extension<AuthUser>) -> ApiResult<WhoAmI> {
    let user = UserService::new(state.pool.clone(), config::config().security.bcrypt_cost)
        .select_one(auth.id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("User no longer exists"))?;

    let mut accessible_node_ids: Vec<Uuid> = rbac::accessible_node_ids(&state.pool, &auth).await?.into_iter().collect();
    accessible_node_ids.sort();

    Ok(ApiResponse::success(WhoAmI { user, accessible_node_ids }))
}
