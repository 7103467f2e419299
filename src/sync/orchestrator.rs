use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::report::{RunSummary, TrackReport};
use super::tracks::{LmsTrack, SchoolContext, SisTrack, SyncTrack};
use super::SyncError;
use crate::config::SyncConfig;
use crate::database::models::TenantConfig;
use crate::database::DatabaseError;
use crate::services::SyncRunService;

/// What started a run; stored in `sync_runs.trigger`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Manual,
    Schedule(Uuid),
    Cli,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Manual => f.write_str("manual"),
            Trigger::Schedule(id) => write!(f, "schedule:{}", id),
            Trigger::Cli => f.write_str("cli"),
        }
    }
}

/// A school with at least one enabled track
#[derive(Debug, Clone, FromRow)]
pub struct School {
    #[sqlx(flatten)]
    pub config: TenantConfig,
    pub node_name: String,
}

pub struct SyncOrchestrator {
    pool: PgPool,
    sync: SyncConfig,
    lms: Arc<dyn SyncTrack>,
    sis: Arc<dyn SyncTrack>,
    running: Arc<Mutex<()>>,
}

impl SyncOrchestrator {
    pub fn new(pool: PgPool, sync: SyncConfig) -> Self {
        Self::with_tracks(pool, sync, Arc::new(LmsTrack), Arc::new(SisTrack))
    }

    pub fn with_tracks(pool: PgPool, sync: SyncConfig, lms: Arc<dyn SyncTrack>, sis: Arc<dyn SyncTrack>) -> Self {
        Self {
            pool,
            sync,
            lms,
            sis,
            running: Arc::new(Mutex::new(())),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }

    fn claim(&self) -> Result<OwnedMutexGuard<()>, SyncError> {
        Arc::clone(&self.running)
            .try_lock_owned()
            .map_err(|_| SyncError::AlreadyRunning)
    }

    fn runs(&self) -> SyncRunService {
        SyncRunService::new(self.pool.clone())
    }

    /// Record a run and execute it in the background. Returns the run id.
    pub async fn start(self: &Arc<Self>, trigger: Trigger, node_id: Option<Uuid>) -> Result<Uuid, SyncError> {
        let guard = self.claim()?;
        let run_id = Uuid::new_v4();
        self.runs().begin(run_id, &trigger.to_string(), node_id).await?;

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = guard;
            this.execute(run_id, node_id).await;
        });

        Ok(run_id)
    }

    /// Record a run and execute it to completion
    pub async fn run(&self, trigger: Trigger, node_id: Option<Uuid>) -> Result<RunSummary, SyncError> {
        let _guard = self.claim()?;
        let run_id = Uuid::new_v4();
        self.runs().begin(run_id, &trigger.to_string(), node_id).await?;
        Ok(self.execute(run_id, node_id).await)
    }

    /// Schools with an enabled track, optionally limited to the subtree under `node_id`
    pub async fn load_schools(&self, node_id: Option<Uuid>) -> Result<Vec<School>, DatabaseError> {
        let schools = sqlx::query_as::<_, School>(
            "WITH RECURSIVE subtree AS ( \
                 SELECT id FROM nodes WHERE id = $1 \
                 UNION ALL \
                 SELECT n.id FROM nodes n JOIN subtree s ON n.parent_id = s.id \
             ) \
             SELECT tc.*, n.name AS node_name \
             FROM tenant_configs tc JOIN nodes n ON n.id = tc.node_id \
             WHERE n.kind = 'school' AND (tc.lms_enabled OR tc.sis_enabled) \
               AND ($1::uuid IS NULL OR tc.node_id IN (SELECT id FROM subtree)) \
             ORDER BY n.name",
        )
        .bind(node_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(schools)
    }

    async fn execute(&self, run_id: Uuid, node_id: Option<Uuid>) -> RunSummary {
        let started_at = Utc::now();
        info!("Sync run {} started", run_id);

        let summary = match self.load_schools(node_id).await {
            Ok(schools) => {
                info!("Sync run {}: {} schools", run_id, schools.len());
                let (lms, sis) = tokio::join!(
                    self.run_track(self.lms.as_ref(), &schools, started_at),
                    self.run_track(self.sis.as_ref(), &schools, started_at),
                );
                RunSummary::from_tracks(run_id, schools.len(), vec![lms, sis])
            }
            Err(e) => {
                error!("Sync run {}: cannot load tenant configs: {}", run_id, e);
                RunSummary::aborted(run_id, format!("cannot load tenant configs: {}", e))
            }
        };

        let runs = self.runs();
        if let Err(e) = runs.record_errors(run_id, &summary).await {
            warn!("Sync run {}: failed to store error rows: {}", run_id, e);
        }
        if let Err(e) = runs.finish(run_id, summary.status, &summary).await {
            error!("Sync run {}: failed to finalize: {}", run_id, e);
        }

        info!(
            "Sync run {} finished: {} ({} rows upserted, {} errors)",
            run_id, summary.status, summary.upserted, summary.errors
        );
        summary
    }

    async fn run_track(&self, track: &dyn SyncTrack, schools: &[School], started_at: DateTime<Utc>) -> TrackReport {
        let mut report = TrackReport::new(track.source());

        for school in schools.iter().filter(|s| track.applies_to(&s.config)) {
            let ctx = SchoolContext {
                pool: &self.pool,
                sync: &self.sync,
                config: &school.config,
                node_name: &school.node_name,
                started_at,
            };
            report.schools.push(track.sync_school(&ctx).await);
        }

        report
    }
}
