pub mod password;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::{self, SecurityConfig};
use crate::database::models::User;

pub use password::{hash_password, verify_password, verify_unknown_user};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("{0}")]
    InvalidToken(String),

    #[error("refresh window exceeded")]
    RefreshWindowExceeded,

    #[error("JWT secret not configured")]
    MissingSecret,

    #[error("JWT generation error: {0}")]
    TokenGeneration(String),

    #[error("password hashing error: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
}

impl Claims {
    pub fn for_user(user: &User, security: &SecurityConfig) -> Self {
        let now = Utc::now();
        let exp = (now + Duration::hours(security.jwt_expiry_hours as i64)).timestamp();

        Self {
            sub: user.id,
            email: user.email.clone(),
            role: user.role.clone(),
            exp,
            iat: now.timestamp(),
            iss: security.jwt_issuer.clone(),
        }
    }
}

/// A freshly issued token and its lifetime in seconds
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_in: i64,
}

pub fn issue_token(user: &User) -> Result<IssuedToken, AuthError> {
    issue_token_with(user, &config::config().security)
}

pub fn issue_token_with(user: &User, security: &SecurityConfig) -> Result<IssuedToken, AuthError> {
    if security.jwt_secret.is_empty() {
        return Err(AuthError::MissingSecret);
    }

    let claims = Claims::for_user(user, security);
    let expires_in = claims.exp - claims.iat;
    let encoding_key = EncodingKey::from_secret(security.jwt_secret.as_bytes());

    let token = encode(&Header::default(), &claims, &encoding_key)
        .map_err(|e| AuthError::TokenGeneration(e.to_string()))?;

    Ok(IssuedToken { token, expires_in })
}

pub fn decode_token(token: &str, allow_expired: bool) -> Result<Claims, AuthError> {
    decode_token_with(token, allow_expired, &config::config().security)
}

/// Verify signature and issuer; expiry is only enforced when `allow_expired` is false
pub fn decode_token_with(
    token: &str,
    allow_expired: bool,
    security: &SecurityConfig,
) -> Result<Claims, AuthError> {
    if security.jwt_secret.is_empty() {
        return Err(AuthError::MissingSecret);
    }

    let decoding_key = DecodingKey::from_secret(security.jwt_secret.as_bytes());
    let mut validation = Validation::default();
    validation.validate_exp = !allow_expired;
    validation.set_issuer(&[security.jwt_issuer.as_str()]);

    let token_data = decode::<Claims>(token, &decoding_key, &validation)
        .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

    Ok(token_data.claims)
}

/// Claims of a token presented for refresh: valid signature, expired no longer ago than the window
pub fn refreshable_claims(token: &str, security: &SecurityConfig) -> Result<Claims, AuthError> {
    let claims = decode_token_with(token, true, security)?;
    let oldest_exp = (Utc::now() - Duration::days(security.refresh_window_days)).timestamp();
    if claims.exp < oldest_exp {
        return Err(AuthError::RefreshWindowExceeded);
    }
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "head@school.test".into(),
            name: "Head Teacher".into(),
            role: "admin".into(),
            is_active: true,
            password_hash: String::new(),
            last_login_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn security() -> SecurityConfig {
        AppConfig::from_env().security
    }

    #[test]
    fn issued_token_decodes_to_same_user() {
        let mut sec = security();
        sec.jwt_secret = "unit-test-secret".into();
        let u = user();
        let issued = issue_token_with(&u, &sec).unwrap();
        assert_eq!(issued.expires_in, sec.jwt_expiry_hours as i64 * 3600);

        let claims = decode_token_with(&issued.token, false, &sec).unwrap();
        assert_eq!(claims.sub, u.id);
        assert_eq!(claims.role, "admin");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let mut sec = security();
        sec.jwt_secret = "one".into();
        let issued = issue_token_with(&user(), &sec).unwrap();
        sec.jwt_secret = "two".into();
        assert!(matches!(
            decode_token_with(&issued.token, false, &sec),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn missing_secret_is_an_error() {
        let mut sec = security();
        sec.jwt_secret.clear();
        assert!(matches!(issue_token_with(&user(), &sec), Err(AuthError::MissingSecret)));
    }

    #[test]
    fn expired_token_refreshes_only_inside_window() {
        let mut sec = security();
        sec.jwt_secret = "unit-test-secret".into();
        sec.refresh_window_days = 7;
        let u = user();
        let key = EncodingKey::from_secret(sec.jwt_secret.as_bytes());

        let mut claims = Claims::for_user(&u, &sec);
        claims.exp = (Utc::now() - Duration::days(1)).timestamp();
        let recent = encode(&Header::default(), &claims, &key).unwrap();
        assert!(decode_token_with(&recent, false, &sec).is_err());
        assert_eq!(refreshable_claims(&recent, &sec).unwrap().sub, u.id);

        claims.exp = (Utc::now() - Duration::days(30)).timestamp();
        let stale = encode(&Header::default(), &claims, &key).unwrap();
        assert!(matches!(
            refreshable_claims(&stale, &sec),
            Err(AuthError::RefreshWindowExceeded)
        ));
    }
}
