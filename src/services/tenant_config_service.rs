use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use super::ServiceError;
use crate::database::models::{NodeKind, TenantConfig};

/// Create/update body. Secrets left as `None` on update keep their stored value;
/// an empty string clears them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TenantConfigInput {
    pub node_id: Option<Uuid>,
    #[serde(default)]
    pub lms_enabled: bool,
    pub lms_base_url: Option<String>,
    pub lms_api_token: Option<String>,
    #[serde(default)]
    pub sis_enabled: bool,
    pub sis_base_url: Option<String>,
    pub sis_api_key: Option<String>,
    pub sis_school_id: Option<String>,
}

fn blank_to_none(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn check_url(field: &str, value: &Option<String>) -> Result<(), ServiceError> {
    if let Some(raw) = value {
        let ok = url::Url::parse(raw)
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false);
        if !ok {
            return Err(ServiceError::invalid(field, "must be an http(s) URL"));
        }
    }
    Ok(())
}

/// Merge `input` over `existing` and enforce the enabled-track requirements
pub fn merge(existing: Option<&TenantConfig>, input: TenantConfigInput) -> Result<TenantConfig, ServiceError> {
    let keep = |new: Option<String>, old: Option<&Option<String>>| match new {
        Some(v) => blank_to_none(Some(v)),
        None => old.cloned().flatten(),
    };

    let now = chrono::Utc::now();
    let merged = TenantConfig {
        id: existing.map(|c| c.id).unwrap_or_else(Uuid::new_v4),
        node_id: match (existing, input.node_id) {
            (Some(c), _) => c.node_id,
            (None, Some(node)) => node,
            (None, None) => return Err(ServiceError::invalid("node_id", "is required")),
        },
        lms_enabled: input.lms_enabled,
        lms_base_url: keep(input.lms_base_url, existing.map(|c| &c.lms_base_url)),
        lms_api_token: keep(input.lms_api_token, existing.map(|c| &c.lms_api_token)),
        sis_enabled: input.sis_enabled,
        sis_base_url: keep(input.sis_base_url, existing.map(|c| &c.sis_base_url)),
        sis_api_key: keep(input.sis_api_key, existing.map(|c| &c.sis_api_key)),
        sis_school_id: keep(input.sis_school_id, existing.map(|c| &c.sis_school_id)),
        created_at: existing.map(|c| c.created_at).unwrap_or(now),
        updated_at: now,
    };

    check_url("lms_base_url", &merged.lms_base_url)?;
    check_url("sis_base_url", &merged.sis_base_url)?;

    if merged.lms_enabled {
        if merged.lms_base_url.is_none() {
            return Err(ServiceError::invalid("lms_base_url", "required when LMS sync is enabled"));
        }
        if merged.lms_api_token.is_none() {
            return Err(ServiceError::invalid("lms_api_token", "required when LMS sync is enabled"));
        }
    }
    if merged.sis_enabled {
        if merged.sis_base_url.is_none() {
            return Err(ServiceError::invalid("sis_base_url", "required when SIS sync is enabled"));
        }
        if merged.sis_api_key.is_none() {
            return Err(ServiceError::invalid("sis_api_key", "required when SIS sync is enabled"));
        }
        if merged.sis_school_id.is_none() {
            return Err(ServiceError::invalid("sis_school_id", "required when SIS sync is enabled"));
        }
    }

    Ok(merged)
}

pub struct TenantConfigService {
    pool: PgPool,
}

impl TenantConfigService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn select_all(&self) -> Result<Vec<TenantConfig>, ServiceError> {
        let rows = sqlx::query_as::<_, TenantConfig>("SELECT * FROM tenant_configs ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn select_404(&self, id: Uuid) -> Result<TenantConfig, ServiceError> {
        sqlx::query_as::<_, TenantConfig>("SELECT * FROM tenant_configs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Tenant config".to_string()))
    }

    pub async fn create_one(&self, input: TenantConfigInput) -> Result<TenantConfig, ServiceError> {
        let config = merge(None, input)?;

        let kind: Option<String> = sqlx::query_scalar("SELECT kind FROM nodes WHERE id = $1")
            .bind(config.node_id)
            .fetch_optional(&self.pool)
            .await?;
        match kind.as_deref() {
            None => return Err(ServiceError::invalid("node_id", "node does not exist")),
            Some(k) if k != NodeKind::School.as_str() => {
                return Err(ServiceError::invalid("node_id", "tenant configs attach to school nodes only"))
            }
            Some(_) => {}
        }

        let row = sqlx::query_as::<_, TenantConfig>(
            "INSERT INTO tenant_configs (id, node_id, lms_enabled, lms_base_url, lms_api_token, \
             sis_enabled, sis_base_url, sis_api_key, sis_school_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING *",
        )
        .bind(config.id)
        .bind(config.node_id)
        .bind(config.lms_enabled)
        .bind(&config.lms_base_url)
        .bind(&config.lms_api_token)
        .bind(config.sis_enabled)
        .bind(&config.sis_base_url)
        .bind(&config.sis_api_key)
        .bind(&config.sis_school_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            let err = ServiceError::from(e);
            match &err {
                ServiceError::Database(db) if db.is_unique_violation() => {
                    ServiceError::Conflict("This school already has a tenant config".to_string())
                }
                _ => err,
            }
        })?;
        Ok(row)
    }

    pub async fn update_404(&self, id: Uuid, input: TenantConfigInput) -> Result<TenantConfig, ServiceError> {
        let existing = self.select_404(id).await?;
        let config = merge(Some(&existing), input)?;

        sqlx::query_as::<_, TenantConfig>(
            "UPDATE tenant_configs SET lms_enabled = $2, lms_base_url = $3, lms_api_token = $4, \
             sis_enabled = $5, sis_base_url = $6, sis_api_key = $7, sis_school_id = $8, updated_at = now() \
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(config.lms_enabled)
        .bind(&config.lms_base_url)
        .bind(&config.lms_api_token)
        .bind(config.sis_enabled)
        .bind(&config.sis_base_url)
        .bind(&config.sis_api_key)
        .bind(&config.sis_school_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Tenant config".to_string()))
    }

    pub async fn delete_404(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = sqlx::query("DELETE FROM tenant_configs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound("Tenant config".to_string()));
        }
        Ok(())
    }
}
