//! Guest tokens for embedded Superset dashboards.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::config::SupersetConfig;
use crate::upstream::UpstreamError;

/// The dashboard viewer as Superset should see them
#[derive(Debug, Clone, Serialize)]
pub struct GuestUser {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestToken {
    pub token: String,
}

/// `<column> IN ('a', 'b')` restricting rows to the given schools
pub fn rls_clause(column: &str, school_ids: &[Uuid]) -> String {
    let ids: Vec<String> = school_ids.iter().map(|id| format!("'{}'", id)).collect();
    format!("{} IN ({})", column, ids.join(", "))
}

/// Request body for `/api/v1/security/guest_token/`; `schools: None` means no row-level filter
pub fn guest_token_request(
    dashboard_id: &str,
    user: &GuestUser,
    rls_column: &str,
    schools: Option<&[Uuid]>,
) -> Value {
    let rls = match schools {
        Some(ids) => json!([{ "clause": rls_clause(rls_column, ids) }]),
        None => json!([]),
    };
    json!({
        "resources": [{ "type": "dashboard", "id": dashboard_id }],
        "user": user,
        "rls": rls,
    })
}

pub struct SupersetClient {
    http: Client,
    config: SupersetConfig,
}

impl SupersetClient {
    pub fn new(config: SupersetConfig) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| UpstreamError::Client(e.to_string()))?;
        Ok(Self { http, config })
    }

    pub fn is_configured(&self) -> bool {
        self.config.base_url.is_some()
    }

    pub fn rls_column(&self) -> &str {
        &self.config.rls_column
    }

    fn url(&self, path: &str) -> Result<String, UpstreamError> {
        let base = self
            .config
            .base_url
            .as_deref()
            .ok_or_else(|| UpstreamError::NotConfigured("Superset".to_string()))?;
        Ok(format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/')))
    }

    async fn post(&self, path: &str, bearer: Option<&str>, body: &Value) -> Result<Value, UpstreamError> {
        let url = self.url(path)?;
        let mut request = self.http.post(&url).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|source| UpstreamError::Transport {
            url: url.clone(),
            source,
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status { url, status, body });
        }
        response.json::<Value>().await.map_err(|e| UpstreamError::Payload {
            url,
            message: e.to_string(),
        })
    }

    /// Service-account login; returns the access token
    async fn login(&self) -> Result<String, UpstreamError> {
        let body = json!({
            "username": self.config.username,
            "password": self.config.password,
            "provider": "db",
            "refresh": false,
        });
        let response = self.post("api/v1/security/login", None, &body).await?;
        response
            .get("access_token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| UpstreamError::Payload {
                url: "api/v1/security/login".to_string(),
                message: "missing access_token".to_string(),
            })
    }

    pub async fn guest_token(
        &self,
        dashboard_id: &str,
        user: &GuestUser,
        schools: Option<&[Uuid]>,
    ) -> Result<GuestToken, UpstreamError> {
        let access_token = self.login().await?;
        let body = guest_token_request(dashboard_id, user, &self.config.rls_column, schools);
        debug!("Requesting guest token for dashboard {}", dashboard_id);

        let response = self.post("api/v1/security/guest_token/", Some(&access_token), &body).await?;
        let token = response
            .get("token")
            .and_then(Value::as_str)
            .ok_or_else(|| UpstreamError::Payload {
                url: "api/v1/security/guest_token/".to_string(),
                message: "missing token".to_string(),
            })?;
        Ok(GuestToken { token: token.to_string() })
    }
}
