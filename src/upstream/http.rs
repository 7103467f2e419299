use reqwest::{header, Client, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use url::Url;

use super::error::UpstreamError;
use crate::config::SyncConfig;

/// How the client authenticates against an upstream API
#[derive(Debug, Clone)]
pub enum AuthScheme {
    /// Static token in a named header (e.g. `auth-token: ...`)
    Header { name: String, value: String },
    /// `Authorization: Bearer <token>`
    Bearer(String),
    None,
}

/// Bounded retry with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
    pub retry_after_cap: Duration,
}

impl RetryPolicy {
    pub fn from_config(sync: &SyncConfig) -> Self {
        Self {
            attempts: sync.retry_attempts.max(1),
            base_delay: Duration::from_millis(sync.retry_base_delay_ms),
            retry_after_cap: Duration::from_secs(sync.retry_after_cap_secs),
        }
    }

    /// Wait before the attempt following `attempt` (1-based). A server-provided
    /// Retry-After wins over the computed backoff, up to the cap.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(wait) => wait.min(self.retry_after_cap),
            None => {
                let exp = attempt.saturating_sub(1).min(16);
                self.base_delay.saturating_mul(1u32 << exp)
            }
        }
    }
}

struct Failure {
    error: UpstreamError,
    retry_after: Option<Duration>,
}

impl From<UpstreamError> for Failure {
    fn from(error: UpstreamError) -> Self {
        Self { error, retry_after: None }
    }
}

/// JSON-over-HTTP client for one upstream base URL
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: Client,
    base_url: Url,
    auth: AuthScheme,
    retry: RetryPolicy,
}

impl UpstreamClient {
    pub fn new(base_url: &str, auth: AuthScheme, sync: &SyncConfig) -> Result<Self, UpstreamError> {
        Self::with_policy(base_url, auth, sync, RetryPolicy::from_config(sync))
    }

    pub fn with_policy(
        base_url: &str,
        auth: AuthScheme,
        sync: &SyncConfig,
        retry: RetryPolicy,
    ) -> Result<Self, UpstreamError> {
        let parsed = Url::parse(base_url).map_err(|_| UpstreamError::InvalidUrl(base_url.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(UpstreamError::InvalidUrl(base_url.to_string()));
        }

        let http = Client::builder()
            .timeout(sync.request_timeout())
            .user_agent(sync.user_agent.clone())
            .build()
            .map_err(|e| UpstreamError::Client(e.to_string()))?;

        Ok(Self {
            http,
            base_url: parsed,
            auth,
            retry,
        })
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Absolute URL for path segments under the base URL. Each segment is
    /// percent-encoded, so an id containing `/` stays inside its segment.
    pub fn url(&self, segments: &[&str]) -> String {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url.to_string()
    }

    /// GET a JSON document, retrying transient failures
    pub async fn get_json(&self, segments: &[&str], query: &[(String, String)]) -> Result<Value, UpstreamError> {
        let url = self.url(segments);
        let mut last_error = None;

        for attempt in 1..=self.retry.attempts {
            match self.get_once(&url, query).await {
                Ok(body) => {
                    debug!("Fetched {} on attempt {}", url, attempt);
                    return Ok(body);
                }
                Err(failure) => {
                    if !failure.error.is_retryable() {
                        return Err(failure.error);
                    }
                    if attempt < self.retry.attempts {
                        let delay = self.retry.delay_for(attempt, failure.retry_after);
                        warn!(
                            "Attempt {}/{} failed for {}: {}. Retrying in {:?}",
                            attempt, self.retry.attempts, url, failure.error, delay
                        );
                        sleep(delay).await;
                    }
                    last_error = Some(failure.error);
                }
            }
        }

        error!("All {} attempts failed for {}", self.retry.attempts, url);
        Err(last_error.unwrap_or_else(|| UpstreamError::Payload {
            url,
            message: "no attempts were made".to_string(),
        }))
    }

    async fn get_once(&self, url: &str, query: &[(String, String)]) -> Result<Value, Failure> {
        let mut request = self.http.get(url).query(query).header(header::ACCEPT, "application/json");
        request = match &self.auth {
            AuthScheme::Header { name, value } => request.header(name.as_str(), value.as_str()),
            AuthScheme::Bearer(token) => request.bearer_auth(token),
            AuthScheme::None => request,
        };

        let response = request.send().await.map_err(|source| UpstreamError::Transport {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            let wait = retry_after(&response);
            let body = response.text().await.unwrap_or_default();
            return Err(Failure {
                error: UpstreamError::Status {
                    url: url.to_string(),
                    status,
                    body: truncate(&body, 512),
                },
                retry_after: if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                    wait
                } else {
                    None
                },
            });
        }

        response.json::<Value>().await.map_err(|e| {
            UpstreamError::Payload {
                url: url.to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }
}

/// Retry-After in delta-seconds form; HTTP-date values are ignored
fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn truncate(body: &str, max: usize) -> String {
    if body.len() <= max {
        return body.to_string();
    }
    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
