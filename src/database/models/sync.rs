use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SyncSchedule {
    pub id: Uuid,
    pub cron_expression: String,
    pub enabled: bool,
    pub node_id: Option<Uuid>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SyncRun {
    pub id: Uuid,
    pub trigger: String,
    pub status: String,
    pub node_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub summary: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SyncErrorRow {
    pub id: i64,
    pub run_id: Uuid,
    pub node_id: Option<Uuid>,
    pub source: String,
    pub endpoint: String,
    pub item: Option<String>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SyncCursor {
    pub node_id: Uuid,
    pub source: String,
    pub endpoint: String,
    pub last_synced_at: DateTime<Utc>,
}
