use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

use super::http::{AuthScheme, UpstreamClient};
use super::pagination::{chunked, fetch_all_pages, pause_between, PageShape};
use super::{BatchOutcome, UpstreamError};
use crate::config::SyncConfig;

const LIST: PageShape = PageShape::new("/data", "/meta/total_pages");

/// Student-information API client, scoped to one upstream school id
#[derive(Debug, Clone)]
pub struct SisClient {
    http: UpstreamClient,
    school_id: String,
    per_page: u32,
    batch_size: usize,
    batch_pause: Duration,
}

impl SisClient {
    pub fn new(base_url: &str, api_key: &str, school_id: &str, sync: &SyncConfig) -> Result<Self, UpstreamError> {
        let http = UpstreamClient::new(base_url, AuthScheme::Bearer(api_key.to_string()), sync)?;
        Ok(Self::from_client(http, school_id, sync))
    }

    pub fn from_client(http: UpstreamClient, school_id: &str, sync: &SyncConfig) -> Self {
        Self {
            http,
            school_id: school_id.to_string(),
            per_page: sync.page_size,
            batch_size: sync.effective_batch_size(),
            batch_pause: sync.batch_pause(),
        }
    }

    fn path<'a>(&'a self, resource: &'a str) -> [&'a str; 3] {
        ["schools", self.school_id.as_str(), resource]
    }

    pub async fn students(&self, updated_since: Option<DateTime<Utc>>) -> Result<Vec<Value>, UpstreamError> {
        fetch_all_pages(&self.http, &self.path("students"), &since(updated_since), &LIST, self.per_page).await
    }

    pub async fn staff(&self, updated_since: Option<DateTime<Utc>>) -> Result<Vec<Value>, UpstreamError> {
        fetch_all_pages(&self.http, &self.path("staff"), &since(updated_since), &LIST, self.per_page).await
    }

    /// Attendance from `start_date` onward, requested for `student_ids` in batches
    pub async fn attendance(&self, student_ids: &[String], start_date: NaiveDate) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let batches = chunked(student_ids, self.batch_size);
        let path = self.path("attendance");

        for (index, batch) in batches.iter().enumerate() {
            let query = vec![
                ("student_ids".to_string(), batch.join(",")),
                ("start_date".to_string(), start_date.format("%Y-%m-%d").to_string()),
            ];
            match fetch_all_pages(&self.http, &path, &query, &LIST, self.per_page).await {
                Ok(records) => outcome.items.extend(records),
                Err(e) => {
                    warn!("Attendance batch {}/{} failed: {}", index + 1, batches.len(), e);
                    let label = format!("students {}..{}", batch[0], batch[batch.len() - 1]);
                    outcome.failures.push((label, e));
                }
            }
            info!(
                "Attendance: batch {}/{} done ({} records so far)",
                index + 1,
                batches.len(),
                outcome.items.len()
            );
            pause_between(index, batches.len(), self.batch_pause).await;
        }

        outcome
    }
}

fn since(updated_since: Option<DateTime<Utc>>) -> Vec<(String, String)> {
    updated_since
        .map(|ts| vec![("updated_since".to_string(), ts.to_rfc3339_opts(SecondsFormat::Secs, true))])
        .unwrap_or_default()
}

/// First attendance day to request: the cursor's date, or `lookback_days` before `now`
pub fn attendance_start(cursor: Option<DateTime<Utc>>, now: DateTime<Utc>, lookback_days: i64) -> NaiveDate {
    match cursor {
        Some(ts) => ts.date_naive(),
        None => (now - chrono::Duration::days(lookback_days)).date_naive(),
    }
}
