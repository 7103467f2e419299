use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use super::{required_text, ServiceError};
use crate::auth::password::{hash_password_with_cost, validate_password_strength};
use crate::database::models::User;
use crate::rbac::Role;

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub role: Role,
    pub password: String,
}

/// Partial update; absent fields are left alone
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    pub password: Option<String>,
}

fn normalize_email(email: &str) -> Result<String, ServiceError> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    };
    if !valid {
        return Err(ServiceError::invalid("email", "must be a valid email address"));
    }
    Ok(email)
}

fn checked_password(password: &str) -> Result<(), ServiceError> {
    validate_password_strength(password).map_err(|e| ServiceError::invalid("password", e))
}

pub struct UserService {
    pool: PgPool,
    bcrypt_cost: u32,
}

impl UserService {
    pub fn new(pool: PgPool, bcrypt_cost: u32) -> Self {
        Self { pool, bcrypt_cost }
    }

    pub async fn select_all(&self) -> Result<Vec<User>, ServiceError> {
        let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY email")
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    pub async fn select_one(&self, id: Uuid) -> Result<Option<User>, ServiceError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn select_404(&self, id: Uuid) -> Result<User, ServiceError> {
        self.select_one(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User".to_string()))
    }

    /// Case-insensitive lookup used by login
    pub async fn select_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE lower(email) = lower($1)")
            .bind(email.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn create_one(&self, input: &NewUser) -> Result<User, ServiceError> {
        let email = normalize_email(&input.email)?;
        let name = required_text("name", &input.name)?;
        checked_password(&input.password)?;
        let hash = hash_password_with_cost(&input.password, self.bcrypt_cost)?;

        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (email, name, role, password_hash) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(email)
        .bind(name)
        .bind(input.role.as_str())
        .bind(hash)
        .fetch_one(&self.pool)
        .await
        .map_err(unique_email)?;
        Ok(user)
    }

    pub async fn update_404(&self, id: Uuid, update: &UserUpdate) -> Result<User, ServiceError> {
        let existing = self.select_404(id).await?;

        let email = match &update.email {
            Some(e) => normalize_email(e)?,
            None => existing.email,
        };
        let name = match &update.name {
            Some(n) => required_text("name", n)?,
            None => existing.name,
        };
        let role = update.role.map(|r| r.as_str().to_string()).unwrap_or(existing.role);
        let is_active = update.is_active.unwrap_or(existing.is_active);
        let password_hash = match &update.password {
            Some(p) => {
                checked_password(p)?;
                hash_password_with_cost(p, self.bcrypt_cost)?
            }
            None => existing.password_hash,
        };

        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET email = $2, name = $3, role = $4, is_active = $5, password_hash = $6, \
             updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(email)
        .bind(name)
        .bind(role)
        .bind(is_active)
        .bind(password_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(unique_email)?
        .ok_or_else(|| ServiceError::NotFound("User".to_string()))?;
        Ok(user)
    }

    pub async fn delete_404(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound("User".to_string()));
        }
        Ok(())
    }

    pub async fn touch_login(&self, id: Uuid) -> Result<(), ServiceError> {
        sqlx::query("UPDATE users SET last_login_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn unique_email(e: sqlx::Error) -> ServiceError {
    let err = ServiceError::from(e);
    match &err {
        ServiceError::Database(db) if db.is_unique_violation() => {
            ServiceError::Conflict("A user with this email already exists".to_string())
        }
        _ => err,
    }
}
