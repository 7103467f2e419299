use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::app::AppState;
use crate::auth::{self, verify_password, verify_unknown_user};
use crate::config;
use crate::database::models::User;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::UserService;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub expires_in: i64,
    pub user: User,
}

fn users(state: &AppState) -> UserService {
    UserService::new(state.pool.clone(), config::config().security.bcrypt_cost)
}

/// POST /auth/login - exchange email and password for a JWT
///
/// Expected Input:
/// ```json
/// { "email": "head@school.test", "password": "..." }
/// ```
///
/// Unknown emails and wrong passwords get the same 401; inactive accounts get 403.
pub async fn login(State(state): State<AppState>, Json(body): Json<LoginRequest>) -> ApiResult<TokenResponse> {
    let users = users(&state);

    let found = users.select_by_email(&body.email).await?;
    let verified = match &found {
        Some(user) => verify_password(&body.password, &user.password_hash),
        None => verify_unknown_user(&body.password),
    };
    let user = match found {
        Some(user) if verified => user,
        _ => {
            warn!("Failed login for {}", body.email.trim());
            return Err(auth::AuthError::InvalidCredentials.into());
        }
    };

    if !user.is_active {
        return Err(ApiError::forbidden("Account is disabled"));
    }

    let issued = auth::issue_token(&user)?;
    users.touch_login(user.id).await?;
    info!("User {} logged in", user.email);

    Ok(ApiResponse::success(TokenResponse {
        token: issued.token,
        expires_in: issued.expires_in,
        user,
    }))
}

/// POST /auth/refresh - trade a recently expired (or still valid) token for a new one
///
/// Expected Input:
/// ```json
/// { "token": "eyJhbGciOiJIUzI1NiI..." }
/// ```
pub async fn refresh(State(state): State<AppState>, Json(body): Json<RefreshRequest>) -> ApiResult<TokenResponse> {
    let claims = auth::refreshable_claims(&body.token, &config::config().security)?;

    let user = users(&state)
        .select_one(claims.sub)
        .await?
        .ok_or_else(|| ApiError::unauthorized("User no longer exists"))?;
    if !user.is_active {
        return Err(ApiError::forbidden("Account is disabled"));
    }

    let issued = auth::issue_token(&user)?;
    Ok(ApiResponse::success(TokenResponse {
        token: issued.token,
        expires_in: issued.expires_in,
        user,
    }))
}
