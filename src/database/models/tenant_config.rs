use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Upstream connection settings for one school node
#[derive(Debug, Clone, FromRow)]
pub struct TenantConfig {
    pub id: Uuid,
    pub node_id: Uuid,
    pub lms_enabled: bool,
    pub lms_base_url: Option<String>,
    pub lms_api_token: Option<String>,
    pub sis_enabled: bool,
    pub sis_base_url: Option<String>,
    pub sis_api_key: Option<String>,
    pub sis_school_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Client-facing view; secrets are write-only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfigResponse {
    pub id: Uuid,
    pub node_id: Uuid,
    pub lms_enabled: bool,
    pub lms_base_url: Option<String>,
    pub has_lms_api_token: bool,
    pub sis_enabled: bool,
    pub sis_base_url: Option<String>,
    pub has_sis_api_key: bool,
    pub sis_school_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn present(secret: &Option<String>) -> bool {
    secret.as_deref().map(|s| !s.is_empty()).unwrap_or(false)
}

impl From<TenantConfig> for TenantConfigResponse {
    fn from(c: TenantConfig) -> Self {
        Self {
            has_lms_api_token: present(&c.lms_api_token),
            has_sis_api_key: present(&c.sis_api_key),
            id: c.id,
            node_id: c.node_id,
            lms_enabled: c.lms_enabled,
            lms_base_url: c.lms_base_url,
            sis_enabled: c.sis_enabled,
            sis_base_url: c.sis_base_url,
            sis_school_id: c.sis_school_id,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}
