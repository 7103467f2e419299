pub mod access_group_service;
pub mod node_service;
pub mod schedule_service;
pub mod sync_run_service;
pub mod tenant_config_service;
pub mod user_service;

use std::collections::HashMap;

use crate::auth::AuthError;
use crate::database::DatabaseError;
use crate::error::ApiError;

pub use access_group_service::{AccessGroupInput, AccessGroupService};
pub use node_service::{NodeInput, NodeService};
pub use schedule_service::{ScheduleInput, ScheduleService};
pub use sync_run_service::{SyncRunDetail, SyncRunService};
pub use tenant_config_service::{TenantConfigInput, TenantConfigService};
pub use user_service::{NewUser, UserService, UserUpdate};

/// Errors shared by the CRUD services
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{field}: {message}")]
    Invalid { field: String, message: String },

    #[error("{0}")]
    Forbidden(String),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl ServiceError {
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        ServiceError::Invalid {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(e: sqlx::Error) -> Self {
        ServiceError::Database(e.into())
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Database(e) => e.into(),
            ServiceError::NotFound(what) => ApiError::not_found(format!("{} not found", what)),
            ServiceError::Conflict(msg) => ApiError::conflict(msg),
            ServiceError::Invalid { field, message } => {
                let mut field_errors = HashMap::new();
                field_errors.insert(field, message);
                ApiError::unprocessable_entity("Validation failed", field_errors)
            }
            ServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            ServiceError::Auth(e) => e.into(),
        }
    }
}

/// Trimmed, non-empty string or a field error
pub(crate) fn required_text(field: &str, value: &str) -> Result<String, ServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::invalid(field, "must not be empty"));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn maps_to_api_statuses() {
        let cases = [
            (ServiceError::NotFound("Node".into()), StatusCode::NOT_FOUND),
            (ServiceError::Conflict("dup".into()), StatusCode::CONFLICT),
            (ServiceError::invalid("email", "bad"), StatusCode::UNPROCESSABLE_ENTITY),
            (ServiceError::Forbidden("no".into()), StatusCode::FORBIDDEN),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }

    #[test]
    fn required_text_trims() {
        assert_eq!(required_text("name", "  North  ").unwrap(), "North");
        assert!(matches!(required_text("name", "   "), Err(ServiceError::Invalid { .. })));
    }
}
