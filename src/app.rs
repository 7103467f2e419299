use axum::{
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::handlers::{protected, public};
use crate::middleware::{build_rate_limiter, jwt_auth_middleware, rate_limit_middleware, GlobalRateLimiter};
use crate::superset::SupersetClient;
use crate::sync::SyncOrchestrator;
use crate::upstream::UpstreamError;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub superset: Arc<SupersetClient>,
    pub rate_limiter: Option<Arc<GlobalRateLimiter>>,
}

impl AppState {
    pub fn new(pool: PgPool, config: &AppConfig) -> Result<Self, UpstreamError> {
        Ok(Self {
            orchestrator: Arc::new(SyncOrchestrator::new(pool.clone(), config.sync.clone())),
            superset: Arc::new(SupersetClient::new(config.superset.clone())?),
            rate_limiter: build_rate_limiter(&config.api),
            pool,
        })
    }
}

fn cors(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .security
        .cors_origins
        .iter()
        .filter(|o| o.as_str() != "*")
        .filter_map(|o| o.parse().ok())
        .collect();

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if origins.is_empty() || config.security.cors_origins.iter().any(|o| o == "*") {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(origins)
    }
}

pub fn app(state: AppState, config: &AppConfig) -> Router {
    Router::new()
        // Public
        .route("/", get(public::root))
        .route("/health", get(public::health))
        .route("/auth/login", post(public::login))
        .route("/auth/refresh", post(public::refresh))
        // Protected API
        .merge(api_routes())
        // Global middleware
        .layer(from_fn_with_state(state.clone(), rate_limit_middleware))
        .layer(RequestBodyLimitLayer::new(config.api.max_request_size_bytes))
        .layer(cors(config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    use protected::{access_groups, auth, dashboards, nodes, sync, tenant_configs, users};

    Router::new()
        .route("/api/auth/whoami", get(auth::whoami))
        .route("/api/nodes", get(nodes::list).post(nodes::create))
        .route("/api/nodes/:id", get(nodes::show).put(nodes::update).delete(nodes::delete))
        .route("/api/users", get(users::list).post(users::create))
        .route("/api/users/:id", get(users::show).put(users::update).delete(users::delete))
        .route("/api/access-groups", get(access_groups::list).post(access_groups::create))
        .route(
            "/api/access-groups/:id",
            get(access_groups::show)
                .put(access_groups::update)
                .delete(access_groups::delete),
        )
        .route("/api/access-groups/:id/members", put(access_groups::set_members))
        .route("/api/access-groups/:id/nodes", put(access_groups::set_nodes))
        .route("/api/tenant-configs", get(tenant_configs::list).post(tenant_configs::create))
        .route(
            "/api/tenant-configs/:id",
            get(tenant_configs::show)
                .put(tenant_configs::update)
                .delete(tenant_configs::delete),
        )
        .route("/api/sync/runs", get(sync::list_runs).post(sync::start_run))
        .route("/api/sync/runs/:id", get(sync::show_run))
        .route("/api/sync/cursors/:node_id", get(sync::list_cursors))
        .route("/api/sync/schedules", get(sync::list_schedules).post(sync::create_schedule))
        .route(
            "/api/sync/schedules/:id",
            put(sync::update_schedule).delete(sync::delete_schedule),
        )
        .route("/api/dashboards/:dashboard_id/guest-token", post(dashboards::guest_token))
        .route_layer(from_fn(jwt_auth_middleware))
}
