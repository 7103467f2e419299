use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::report::Source;
use crate::database::models::SyncCursor;
use crate::database::DatabaseError;

pub async fn load_cursor(
    pool: &PgPool,
    node_id: Uuid,
    source: Source,
    endpoint: &str,
) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    let ts = sqlx::query_scalar::<_, DateTime<Utc>>(
        "SELECT last_synced_at FROM sync_cursors WHERE node_id = $1 AND source = $2 AND endpoint = $3",
    )
    .bind(node_id)
    .bind(source.as_str())
    .bind(endpoint)
    .fetch_optional(pool)
    .await?;
    Ok(ts)
}

/// Cursors never move backwards
pub async fn advance_cursor(
    pool: &PgPool,
    node_id: Uuid,
    source: Source,
    endpoint: &str,
    synced_at: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    sqlx::query(
        "INSERT INTO sync_cursors (node_id, source, endpoint, last_synced_at) VALUES ($1, $2, $3, $4) \
         ON CONFLICT (node_id, source, endpoint) \
         DO UPDATE SET last_synced_at = GREATEST(sync_cursors.last_synced_at, EXCLUDED.last_synced_at)",
    )
    .bind(node_id)
    .bind(source.as_str())
    .bind(endpoint)
    .bind(synced_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_cursors(pool: &PgPool, node_id: Uuid) -> Result<Vec<SyncCursor>, DatabaseError> {
    let rows = sqlx::query_as::<_, SyncCursor>(
        "SELECT node_id, source, endpoint, last_synced_at FROM sync_cursors WHERE node_id = $1 ORDER BY source, endpoint",
    )
    .bind(node_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
