use axum::{
    extract::{Path, State},
    Extension, Json,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::config;
use crate::database::models::User;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::rbac::{require_role, Role};
use crate::services::{NewUser, UserService, UserUpdate};

fn service(state: &AppState) -> UserService {
    UserService::new(state.pool.clone(), config::config().security.bcrypt_cost)
}

/// Admins manage admins and viewers; super_admin accounts are managed by super_admins only
fn ensure_can_manage(actor: &AuthUser, target_role: &str) -> Result<(), ApiError> {
    let target: Role = target_role.parse().map_err(ApiError::internal_server_error)?;
    if target == Role::SuperAdmin {
        require_role(actor, Role::SuperAdmin)?;
    }
    Ok(())
}

/// GET /api/users (admin)
pub async fn list(State(state): State<AppState>, Extension(user): Extension<AuthUser>) -> ApiResult<Vec<User>> {
    require_role(&user, Role::Admin)?;
    Ok(ApiResponse::success(service(&state).select_all().await?))
}

/// POST /api/users (admin)
///
/// Expected Input:
/// ```json
/// { "email": "teacher@school.test", "name": "A Teacher", "role": "viewer", "password": "at-least-8" }
/// ```
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<NewUser>,
) -> ApiResult<User> {
    require_role(&user, Role::Admin)?;
    ensure_can_manage(&user, body.role.as_str())?;

    let created = service(&state).create_one(&body).await?;
    tracing::info!("{} created user {} ({})", user.email, created.email, created.role);
    Ok(ApiResponse::created(created))
}

/// GET /api/users/:id (admin)
pub async fn show(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<User> {
    require_role(&user, Role::Admin)?;
    Ok(ApiResponse::success(service(&state).select_404(id).await?))
}

/// PUT /api/users/:id - partial update (admin)
pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<UserUpdate>,
) -> ApiResult<User> {
    require_role(&user, Role::Admin)?;
    let service = service(&state);

    let existing = service.select_404(id).await?;
    ensure_can_manage(&user, &existing.role)?;
    if let Some(role) = body.role {
        ensure_can_manage(&user, role.as_str())?;
        if id == user.id && role < user.role {
            return Err(ApiError::bad_request("You cannot demote yourself"));
        }
    }
    if id == user.id && body.is_active == Some(false) {
        return Err(ApiError::bad_request("You cannot deactivate yourself"));
    }

    Ok(ApiResponse::success(service.update_404(id, &body).await?))
}

/// DELETE /api/users/:id (admin)
pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<()>, ApiError> {
    require_role(&user, Role::Admin)?;
    if id == user.id {
        return Err(ApiError::bad_request("You cannot delete yourself"));
    }

    let service = service(&state);
    let existing = service.select_404(id).await?;
    ensure_can_manage(&user, &existing.role)?;
    service.delete_404(id).await?;
    tracing::info!("{} deleted user {}", user.email, existing.email);
    Ok(ApiResponse::no_content())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(role: Role) -> AuthUser {
        AuthUser { id: Uuid::new_v4(), email: "a@school.test".into(), role }
    }

    #[test]
    fn only_super_admins_manage_super_admins() {
        assert!(ensure_can_manage(&actor(Role::Admin), "viewer").is_ok());
        assert!(ensure_can_manage(&actor(Role::Admin), "admin").is_ok());
        assert!(ensure_can_manage(&actor(Role::Admin), "super_admin").is_err());
        assert!(ensure_can_manage(&actor(Role::SuperAdmin), "super_admin").is_ok());
    }
}
