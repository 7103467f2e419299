use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::orchestrator::{SyncOrchestrator, Trigger};
use super::SyncError;
use crate::database::models::SyncSchedule;
use crate::services::ScheduleService;

/// Reject anything but a 6-field (seconds-first) cron expression the scheduler can parse
pub fn validate_cron(expression: &str) -> Result<(), String> {
    let fields = expression.split_whitespace().count();
    if fields != 6 {
        return Err(format!(
            "expected 6 fields (sec min hour day month weekday), got {}",
            fields
        ));
    }
    Job::new_async(expression, |_uuid, _l| Box::pin(async {}))
        .map(|_| ())
        .map_err(|e| format!("invalid cron expression: {:?}", e))
}

/// Identity of the registered job set; jobs are rebuilt only when this changes
type ScheduleKey = (Uuid, String, Option<Uuid>);

fn schedule_keys(rows: &[SyncSchedule]) -> BTreeSet<ScheduleKey> {
    rows.iter()
        .filter(|s| s.enabled)
        .map(|s| (s.id, s.cron_expression.trim().to_string(), s.node_id))
        .collect()
}

/// Cron-driven trigger for the orchestrator. Schedule rows are re-read every
/// `reload_every`; overlapping firings are skipped while a run is in progress.
pub struct SyncScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    schedules: ScheduleService,
    reload_every: Duration,
}

impl SyncScheduler {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, schedules: ScheduleService, reload_every: Duration) -> Self {
        Self {
            orchestrator,
            schedules,
            reload_every,
        }
    }

    /// Start the job scheduler and the reload loop
    pub async fn start(self) -> Result<JoinHandle<()>, JobSchedulerError> {
        let sched = JobScheduler::new().await?;
        sched.start().await?;
        info!("Sync scheduler started (reload every {:?})", self.reload_every);

        Ok(tokio::spawn(async move {
            let mut registered: Vec<Uuid> = Vec::new();
            let mut current: Option<BTreeSet<ScheduleKey>> = None;
            let mut ticker = tokio::time::interval(self.reload_every);

            loop {
                ticker.tick().await;

                let rows = match self.schedules.select_all().await {
                    Ok(rows) => rows,
                    Err(e) => {
                        warn!("Scheduler: cannot load schedules: {}", e);
                        continue;
                    }
                };

                let keys = schedule_keys(&rows);
                if current.as_ref() == Some(&keys) {
                    continue;
                }

                for job_id in registered.drain(..) {
                    if let Err(e) = sched.remove(&job_id).await {
                        warn!("Scheduler: failed to remove job {}: {:?}", job_id, e);
                    }
                }

                for (schedule_id, cron, node_id) in &keys {
                    match self.register(&sched, *schedule_id, cron, *node_id).await {
                        Ok(job_id) => registered.push(job_id),
                        Err(e) => error!("Scheduler: schedule {} skipped: {}", schedule_id, e),
                    }
                }
                info!("Scheduler: {} jobs registered", registered.len());
                current = Some(keys);
            }
        }))
    }

    async fn register(
        &self,
        sched: &JobScheduler,
        schedule_id: Uuid,
        cron: &str,
        node_id: Option<Uuid>,
    ) -> Result<Uuid, String> {
        validate_cron(cron)?;
        let orchestrator = Arc::clone(&self.orchestrator);

        let job = Job::new_async(cron, move |_uuid, _l| {
            let orchestrator = Arc::clone(&orchestrator);
            Box::pin(async move {
                match orchestrator.start(Trigger::Schedule(schedule_id), node_id).await {
                    Ok(run_id) => info!("Schedule {} started run {}", schedule_id, run_id),
                    Err(SyncError::AlreadyRunning) => {
                        warn!("Schedule {} fired while a run is in progress; skipping", schedule_id)
                    }
                    Err(e) => error!("Schedule {} failed to start a run: {}", schedule_id, e),
                }
            })
        })
        .map_err(|e| format!("{:?}", e))?;

        sched.add(job).await.map_err(|e| format!("{:?}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn schedule(cron: &str, enabled: bool) -> SyncSchedule {
        SyncSchedule {
            id: Uuid::new_v4(),
            cron_expression: cron.into(),
            enabled,
            node_id: None,
            description: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn accepts_six_field_cron() {
        assert!(validate_cron("0 0 2 * * *").is_ok());
        assert!(validate_cron("0 */15 6-18 * * Mon-Fri").is_ok());
    }

    #[test]
    fn rejects_bad_cron() {
        assert!(validate_cron("0 2 * * *").is_err());
        assert!(validate_cron("0 0 2 * * * 2030").is_err());
        assert!(validate_cron("every night").is_err());
        assert!(validate_cron("0 0 25 * * *").is_err());
    }

    #[test]
    fn keys_ignore_disabled_rows_and_change_with_cron() {
        let a = schedule("0 0 2 * * *", true);
        let b = schedule("0 0 3 * * *", false);
        let keys = schedule_keys(&[a.clone(), b]);
        assert_eq!(keys.len(), 1);

        let mut edited = a.clone();
        edited.cron_expression = "0 30 2 * * *".into();
        assert_ne!(keys, schedule_keys(&[edited]));
        assert_eq!(keys, schedule_keys(&[a]));
    }
}
