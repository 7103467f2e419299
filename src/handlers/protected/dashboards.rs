use axum::{
    extract::{Path, State},
    Extension,
};

use crate::app::AppState;
use crate::config;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::rbac::{self, Role};
use crate::services::UserService;
use crate::superset::{GuestToken, GuestUser};

/// "Ada Lovelace" → ("Ada", "Lovelace"); single names leave the last name empty
fn split_name(name: &str) -> (String, String) {
    let name = name.trim();
    match name.split_once(char::is_whitespace) {
        Some((first, last)) => (first.to_string(), last.trim().to_string()),
        None => (name.to_string(), String::new()),
    }
}

/// POST /api/dashboards/:dashboard_id/guest-token - embed token scoped to the caller's schools
///
/// super_admin tokens carry no row-level filter. Callers without any accessible school get 403.
pub async fn guest_token(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(dashboard_id): Path<String>,
) -> ApiResult<GuestToken> {
    if !state.superset.is_configured() {
        return Err(ApiError::service_unavailable("Dashboards are not configured"));
    }

    let schools = if user.role == Role::SuperAdmin {
        None
    } else {
        let ids = rbac::accessible_school_ids(&state.pool, &user).await?;
        if ids.is_empty() {
            return Err(ApiError::forbidden("You do not have access to any school"));
        }
        Some(ids)
    };

    let account = UserService::new(state.pool.clone(), config::config().security.bcrypt_cost)
        .select_404(user.id)
        .await?;
    let (first_name, last_name) = split_name(&account.name);
    let guest = GuestUser {
        username: account.email,
        first_name,
        last_name,
    };

    let token = state
        .superset
        .guest_token(&dashboard_id, &guest, schools.as_deref())
        .await?;
    Ok(ApiResponse::success(token))
}
