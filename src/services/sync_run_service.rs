use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::models::{SyncErrorRow, SyncRun};
use crate::database::DatabaseError;
use crate::sync::{RunStatus, RunSummary};

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunDetail {
    #[serde(flatten)]
    pub run: SyncRun,
    pub errors: Vec<SyncErrorRow>,
}

/// A flattened `sync_errors` row before insert
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    pub node_id: Option<Uuid>,
    pub source: String,
    pub endpoint: String,
    pub item: Option<String>,
    pub message: String,
}

/// Every school, endpoint and item failure in a summary as error rows
pub fn error_records(summary: &RunSummary) -> Vec<ErrorRecord> {
    let mut records = Vec::new();

    if let Some(message) = &summary.error {
        records.push(ErrorRecord {
            node_id: None,
            source: "run".to_string(),
            endpoint: "*".to_string(),
            item: None,
            message: message.clone(),
        });
    }

    for track in &summary.tracks {
        let source = track.source.as_str().to_string();
        for school in &track.schools {
            if let Some(message) = &school.error {
                records.push(ErrorRecord {
                    node_id: Some(school.node_id),
                    source: source.clone(),
                    endpoint: "*".to_string(),
                    item: None,
                    message: message.clone(),
                });
            }
            for endpoint in &school.endpoints {
                if let Some(reason) = &endpoint.aborted {
                    records.push(ErrorRecord {
                        node_id: Some(school.node_id),
                        source: source.clone(),
                        endpoint: endpoint.endpoint.clone(),
                        item: None,
                        message: reason.clone(),
                    });
                }
                for failure in &endpoint.failures {
                    records.push(ErrorRecord {
                        node_id: Some(school.node_id),
                        source: source.clone(),
                        endpoint: endpoint.endpoint.clone(),
                        item: failure.item.clone(),
                        message: failure.message.clone(),
                    });
                }
            }
        }
    }

    records
}

pub struct SyncRunService {
    pool: PgPool,
}

impl SyncRunService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn begin(&self, run_id: Uuid, trigger: &str, node_id: Option<Uuid>) -> Result<SyncRun, DatabaseError> {
        let run = sqlx::query_as::<_, SyncRun>(
            "INSERT INTO sync_runs (id, trigger, status, node_id) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(run_id)
        .bind(trigger)
        .bind(RunStatus::Running.as_str())
        .bind(node_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(run)
    }

    pub async fn record_errors(&self, run_id: Uuid, summary: &RunSummary) -> Result<usize, DatabaseError> {
        let records = error_records(summary);
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for r in &records {
            sqlx::query(
                "INSERT INTO sync_errors (run_id, node_id, source, endpoint, item, message) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(run_id)
            .bind(r.node_id)
            .bind(&r.source)
            .bind(&r.endpoint)
            .bind(&r.item)
            .bind(&r.message)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(records.len())
    }

    pub async fn finish(&self, run_id: Uuid, status: RunStatus, summary: &RunSummary) -> Result<(), DatabaseError> {
        let summary = serde_json::to_value(summary).map_err(|e| DatabaseError::QueryError(e.to_string()))?;
        sqlx::query("UPDATE sync_runs SET status = $2, finished_at = now(), summary = $3 WHERE id = $1")
            .bind(run_id)
            .bind(status.as_str())
            .bind(summary)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Runs left `running` by a previous process can never finish
    pub async fn fail_interrupted(&self) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "UPDATE sync_runs SET status = 'failed', finished_at = now(), \
             summary = jsonb_build_object('error', 'interrupted by restart') WHERE status = 'running'",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn select_recent(&self, limit: i64) -> Result<Vec<SyncRun>, DatabaseError> {
        let runs = sqlx::query_as::<_, SyncRun>("SELECT * FROM sync_runs ORDER BY started_at DESC LIMIT $1")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(runs)
    }

    pub async fn select_404(&self, run_id: Uuid) -> Result<SyncRunDetail, DatabaseError> {
        let run = sqlx::query_as::<_, SyncRun>("SELECT * FROM sync_runs WHERE id = $1")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DatabaseError::NotFound("Sync run not found".to_string()))?;

        let errors = sqlx::query_as::<_, SyncErrorRow>("SELECT * FROM sync_errors WHERE run_id = $1 ORDER BY id")
            .bind(run_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(SyncRunDetail { run, errors })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{EndpointReport, ItemFailure, SchoolReport, Source, TrackReport};

    #[test]
    fn flattens_every_failure_level() {
        let node = Uuid::new_v4();
        let mut school = SchoolReport::new(node, "North High");
        let mut students = EndpointReport::new("students");
        students.failures.push(ItemFailure::new(Some("s-1".into()), "bad date"));
        school.endpoints.push(students);
        school.endpoints.push(EndpointReport::aborted("staff", "502 Bad Gateway"));

        let mut broken = SchoolReport::new(Uuid::new_v4(), "South High");
        broken.error = Some("SIS API key is not configured".into());

        let summary = RunSummary::from_tracks(
            Uuid::nil(),
            2,
            vec![TrackReport { source: Source::Sis, schools: vec![school, broken] }],
        );
        let records = error_records(&summary);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].item.as_deref(), Some("s-1"));
        assert_eq!(records[1].endpoint, "staff");
        assert_eq!(records[1].node_id, Some(node));
        assert_eq!(records[2].endpoint, "*");
        assert!(records.iter().all(|r| r.source == "sis"));
    }

    #[test]
    fn aborted_run_yields_one_record() {
        let records = error_records(&RunSummary::aborted(Uuid::nil(), "db down"));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source, "run");
    }
}
