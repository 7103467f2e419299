use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::{Request, State}, middleware::Next, response::Response};
use governor::{Quota, RateLimiter};

use crate::app::AppState;
use crate::config::ApiConfig;
use crate::error::ApiError;

/// Process-wide limiter; no per-client bucketing
pub type GlobalRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// `requests` per `window` with the full allowance available as a burst.
/// Returns None when limiting is disabled or the quota is degenerate.
pub fn build_rate_limiter(api: &ApiConfig) -> Option<Arc<GlobalRateLimiter>> {
    if !api.enable_rate_limiting {
        return None;
    }
    let burst = NonZeroU32::new(api.rate_limit_requests)?;
    let window = Duration::from_secs(api.rate_limit_window_secs.max(1));
    let quota = Quota::with_period(window / burst.get())?.allow_burst(burst);
    Some(Arc::new(RateLimiter::direct(quota)))
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // If rate limiting is disabled, pass through
    if let Some(limiter) = &state.rate_limiter {
        if limiter.check().is_err() {
            tracing::warn!("Rate limit exceeded for {}", request.uri().path());
            return Err(ApiError::too_many_requests(
                "Too many requests. Please wait before retrying.",
            ));
        }
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(enabled: bool, requests: u32) -> ApiConfig {
        ApiConfig {
            port: 0,
            enable_rate_limiting: enabled,
            rate_limit_requests: requests,
            rate_limit_window_secs: 60,
            max_request_size_bytes: 1024,
        }
    }

    #[test]
    fn disabled_or_zero_quota_builds_nothing() {
        assert!(build_rate_limiter(&api(false, 10)).is_none());
        assert!(build_rate_limiter(&api(true, 0)).is_none());
    }

    #[test]
    fn burst_is_exhausted_after_quota() {
        let limiter = build_rate_limiter(&api(true, 3)).unwrap();
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }
}
