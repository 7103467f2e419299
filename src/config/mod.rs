use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub sync: SyncConfig,
    pub superset: SupersetConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub connection_timeout: u64,
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub enable_rate_limiting: bool,
    pub rate_limit_requests: u32,
    pub rate_limit_window_secs: u64,
    pub max_request_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_expiry_hours: u64,
    pub refresh_window_days: i64,
    pub bcrypt_cost: u32,
    pub cors_origins: Vec<String>,
}

/// Upstream pull behaviour shared by both sync tracks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_after_cap_secs: u64,
    pub request_timeout_secs: u64,
    pub page_size: u32,
    pub id_batch_size: usize,
    pub batch_pause_ms: u64,
    pub attendance_lookback_days: i64,
    pub scheduler_enabled: bool,
    pub scheduler_reload_secs: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupersetConfig {
    pub base_url: Option<String>,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub rls_column: String,
    pub request_timeout_secs: u64,
}

/// External-id batches are kept inside this window to avoid bursting upstream rate limits
pub const MIN_ID_BATCH: usize = 25;
pub const MAX_ID_BATCH: usize = 150;

impl SyncConfig {
    pub fn effective_batch_size(&self) -> usize {
        self.id_batch_size.clamp(MIN_ID_BATCH, MAX_ID_BATCH)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }
        if let Ok(v) = env::var("DATABASE_RUN_MIGRATIONS") {
            self.database.run_migrations = v.parse().unwrap_or(self.database.run_migrations);
        }

        // API overrides
        if let Some(port) = env::var("HUB_API_PORT")
            .ok()
            .or_else(|| env::var("PORT").ok())
            .and_then(|s| s.parse::<u16>().ok())
        {
            self.api.port = port;
        }
        if let Ok(v) = env::var("API_ENABLE_RATE_LIMITING") {
            self.api.enable_rate_limiting = v.parse().unwrap_or(self.api.enable_rate_limiting);
        }
        if let Ok(v) = env::var("API_RATE_LIMIT_REQUESTS") {
            self.api.rate_limit_requests = v.parse().unwrap_or(self.api.rate_limit_requests);
        }
        if let Ok(v) = env::var("API_RATE_LIMIT_WINDOW_SECS") {
            self.api.rate_limit_window_secs = v.parse().unwrap_or(self.api.rate_limit_window_secs);
        }
        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }

        // Security overrides
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }
        if let Ok(v) = env::var("SECURITY_REFRESH_WINDOW_DAYS") {
            self.security.refresh_window_days = v.parse().unwrap_or(self.security.refresh_window_days);
        }
        if let Ok(v) = env::var("SECURITY_BCRYPT_COST") {
            self.security.bcrypt_cost = v.parse().unwrap_or(self.security.bcrypt_cost);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }

        // Sync overrides
        if let Ok(v) = env::var("SYNC_RETRY_ATTEMPTS") {
            self.sync.retry_attempts = v.parse().unwrap_or(self.sync.retry_attempts);
        }
        if let Ok(v) = env::var("SYNC_RETRY_BASE_DELAY_MS") {
            self.sync.retry_base_delay_ms = v.parse().unwrap_or(self.sync.retry_base_delay_ms);
        }
        if let Ok(v) = env::var("SYNC_REQUEST_TIMEOUT_SECS") {
            self.sync.request_timeout_secs = v.parse().unwrap_or(self.sync.request_timeout_secs);
        }
        if let Ok(v) = env::var("SYNC_PAGE_SIZE") {
            self.sync.page_size = v.parse().unwrap_or(self.sync.page_size);
        }
        if let Ok(v) = env::var("SYNC_ID_BATCH_SIZE") {
            self.sync.id_batch_size = v.parse().unwrap_or(self.sync.id_batch_size);
        }
        if let Ok(v) = env::var("SYNC_BATCH_PAUSE_MS") {
            self.sync.batch_pause_ms = v.parse().unwrap_or(self.sync.batch_pause_ms);
        }
        if let Ok(v) = env::var("SYNC_ATTENDANCE_LOOKBACK_DAYS") {
            self.sync.attendance_lookback_days = v.parse().unwrap_or(self.sync.attendance_lookback_days);
        }
        if let Ok(v) = env::var("SYNC_SCHEDULER_ENABLED") {
            self.sync.scheduler_enabled = v.parse().unwrap_or(self.sync.scheduler_enabled);
        }
        if let Ok(v) = env::var("SYNC_SCHEDULER_RELOAD_SECS") {
            self.sync.scheduler_reload_secs = v.parse().unwrap_or(self.sync.scheduler_reload_secs);
        }

        // Superset overrides
        if let Ok(v) = env::var("SUPERSET_URL") {
            self.superset.base_url = Some(v).filter(|s| !s.trim().is_empty());
        }
        if let Ok(v) = env::var("SUPERSET_USERNAME") {
            self.superset.username = v;
        }
        if let Ok(v) = env::var("SUPERSET_PASSWORD") {
            self.superset.password = v;
        }
        if let Ok(v) = env::var("SUPERSET_RLS_COLUMN") {
            self.superset.rls_column = v;
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                max_connections: 10,
                connection_timeout: 30,
                run_migrations: true,
            },
            api: ApiConfig {
                port: 3000,
                enable_rate_limiting: false,
                rate_limit_requests: 1000,
                rate_limit_window_secs: 60,
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
            },
            security: SecurityConfig {
                jwt_secret: "development-only-secret".to_string(),
                jwt_issuer: "campus-hub".to_string(),
                jwt_expiry_hours: 24 * 7, // 1 week
                refresh_window_days: 7,
                bcrypt_cost: 4,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
            },
            sync: SyncConfig {
                retry_attempts: 3,
                retry_base_delay_ms: 500,
                retry_after_cap_secs: 60,
                request_timeout_secs: 30,
                page_size: 100,
                id_batch_size: 50,
                batch_pause_ms: 250,
                attendance_lookback_days: 30,
                scheduler_enabled: false,
                scheduler_reload_secs: 60,
                user_agent: format!("campus-hub/{}", env!("CARGO_PKG_VERSION")),
            },
            superset: SupersetConfig {
                base_url: Some("http://localhost:8088".to_string()),
                username: "admin".to_string(),
                password: "admin".to_string(),
                rls_column: "node_id".to_string(),
                request_timeout_secs: 10,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                max_connections: 20,
                connection_timeout: 10,
                run_migrations: true,
            },
            api: ApiConfig {
                port: 3000,
                enable_rate_limiting: true,
                rate_limit_requests: 300,
                rate_limit_window_secs: 60,
                max_request_size_bytes: 5 * 1024 * 1024, // 5MB
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_issuer: "campus-hub".to_string(),
                jwt_expiry_hours: 24,
                refresh_window_days: 7,
                bcrypt_cost: 10,
                cors_origins: vec!["https://staging.example.com".to_string()],
            },
            sync: SyncConfig {
                retry_attempts: 3,
                retry_base_delay_ms: 1000,
                retry_after_cap_secs: 60,
                request_timeout_secs: 30,
                page_size: 100,
                id_batch_size: 100,
                batch_pause_ms: 500,
                attendance_lookback_days: 30,
                scheduler_enabled: true,
                scheduler_reload_secs: 300,
                user_agent: format!("campus-hub/{}", env!("CARGO_PKG_VERSION")),
            },
            superset: SupersetConfig {
                base_url: None,
                username: String::new(),
                password: String::new(),
                rls_column: "node_id".to_string(),
                request_timeout_secs: 10,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                max_connections: 50,
                connection_timeout: 5,
                run_migrations: false,
            },
            api: ApiConfig {
                port: 3000,
                enable_rate_limiting: true,
                rate_limit_requests: 120,
                rate_limit_window_secs: 60,
                max_request_size_bytes: 2 * 1024 * 1024, // 2MB
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_issuer: "campus-hub".to_string(),
                jwt_expiry_hours: 8,
                refresh_window_days: 7,
                bcrypt_cost: 12,
                cors_origins: vec!["https://app.example.com".to_string()],
            },
            sync: SyncConfig {
                retry_attempts: 3,
                retry_base_delay_ms: 1000,
                retry_after_cap_secs: 60,
                request_timeout_secs: 60,
                page_size: 100,
                id_batch_size: 100,
                batch_pause_ms: 1000,
                attendance_lookback_days: 30,
                scheduler_enabled: true,
                scheduler_reload_secs: 300,
                user_agent: format!("campus-hub/{}", env!("CARGO_PKG_VERSION")),
            },
            superset: SupersetConfig {
                base_url: None,
                username: String::new(),
                password: String::new(),
                rls_column: "node_id".to_string(),
                request_timeout_secs: 10,
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

// Helper macros for common checks
#[macro_export]
macro_rules! is_development {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Development)
    };
}

#[macro_export]
macro_rules! is_production {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Production)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert!(!config.api.enable_rate_limiting);
        assert!(!config.security.jwt_secret.is_empty());
        assert_eq!(config.sync.retry_attempts, 3);
        assert!(!config.sync.scheduler_enabled);
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::production();
        assert!(config.api.enable_rate_limiting);
        // production must receive its secret from the environment
        assert!(config.security.jwt_secret.is_empty());
        assert!(config.superset.base_url.is_none());
    }

    #[test]
    fn batch_size_is_clamped() {
        let mut sync = AppConfig::development().sync;
        sync.id_batch_size = 5;
        assert_eq!(sync.effective_batch_size(), MIN_ID_BATCH);
        sync.id_batch_size = 1000;
        assert_eq!(sync.effective_batch_size(), MAX_ID_BATCH);
        sync.id_batch_size = 80;
        assert_eq!(sync.effective_batch_size(), 80);
    }
}
