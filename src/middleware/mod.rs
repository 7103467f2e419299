pub mod auth;
pub mod rate_limit;
pub mod response;

pub use auth::{jwt_auth_middleware, AuthUser};
pub use rate_limit::{build_rate_limiter, rate_limit_middleware, GlobalRateLimiter};
pub use response::{ApiResponse, ApiResult};
