use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use super::ServiceError;
use crate::database::models::SyncSchedule;
use crate::sync::validate_cron;

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleInput {
    pub cron_expression: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub node_id: Option<Uuid>,
    pub description: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl ScheduleInput {
    fn cron(&self) -> Result<String, ServiceError> {
        let cron = self.cron_expression.trim().to_string();
        validate_cron(&cron).map_err(|e| ServiceError::invalid("cron_expression", e))?;
        Ok(cron)
    }
}

#[derive(Clone)]
pub struct ScheduleService {
    pool: PgPool,
}

impl ScheduleService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn select_all(&self) -> Result<Vec<SyncSchedule>, ServiceError> {
        let rows = sqlx::query_as::<_, SyncSchedule>("SELECT * FROM sync_schedules ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn ensure_node(&self, node_id: Option<Uuid>) -> Result<(), ServiceError> {
        if let Some(id) = node_id {
            let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM nodes WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
            if !exists {
                return Err(ServiceError::invalid("node_id", "node does not exist"));
            }
        }
        Ok(())
    }

    pub async fn create_one(&self, input: &ScheduleInput) -> Result<SyncSchedule, ServiceError> {
        let cron = input.cron()?;
        self.ensure_node(input.node_id).await?;

        let row = sqlx::query_as::<_, SyncSchedule>(
            "INSERT INTO sync_schedules (cron_expression, enabled, node_id, description) \
             VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(cron)
        .bind(input.enabled)
        .bind(input.node_id)
        .bind(input.description.as_deref())
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn update_404(&self, id: Uuid, input: &ScheduleInput) -> Result<SyncSchedule, ServiceError> {
        let cron = input.cron()?;
        self.ensure_node(input.node_id).await?;

        sqlx::query_as::<_, SyncSchedule>(
            "UPDATE sync_schedules SET cron_expression = $2, enabled = $3, node_id = $4, description = $5, \
             updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(cron)
        .bind(input.enabled)
        .bind(input.node_id)
        .bind(input.description.as_deref())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Schedule".to_string()))
    }

    pub async fn delete_404(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = sqlx::query("DELETE FROM sync_schedules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound("Schedule".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cron_is_trimmed_and_validated() {
        let input: ScheduleInput = serde_json::from_str(r#"{"cron_expression": " 0 0 2 * * * "}"#).unwrap();
        assert!(input.enabled);
        assert_eq!(input.cron().unwrap(), "0 0 2 * * *");

        let bad: ScheduleInput = serde_json::from_str(r#"{"cron_expression": "0 2 * * *"}"#).unwrap();
        assert!(matches!(bad.cron(), Err(ServiceError::Invalid { .. })));
    }
}
