use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};

use super::http::{AuthScheme, UpstreamClient};
use super::pagination::{chunked, fetch_all_pages, pause_between, PageShape};
use super::{json_id, BatchOutcome, UpstreamError};
use crate::config::SyncConfig;

const YEAR_GROUPS: PageShape = PageShape::new("/year_groups", "/meta/total_pages");
const CLASSES: PageShape = PageShape::new("/classes", "/meta/total_pages");
const TEACHERS: PageShape = PageShape::new("/teachers", "/meta/total_pages");
const STUDENTS: PageShape = PageShape::new("/students", "/meta/total_pages");
const CLASS_STUDENTS: PageShape = PageShape::new("/student_ids", "/meta/total_pages");

/// Learning-management API client. Authenticates with an `auth-token` header.
#[derive(Debug, Clone)]
pub struct LmsClient {
    http: UpstreamClient,
    per_page: u32,
    batch_size: usize,
    batch_pause: Duration,
}

impl LmsClient {
    pub fn new(base_url: &str, token: &str, sync: &SyncConfig) -> Result<Self, UpstreamError> {
        let auth = AuthScheme::Header {
            name: "auth-token".to_string(),
            value: token.to_string(),
        };
        Ok(Self::from_client(UpstreamClient::new(base_url, auth, sync)?, sync))
    }

    pub fn from_client(http: UpstreamClient, sync: &SyncConfig) -> Self {
        Self {
            http,
            per_page: sync.page_size,
            batch_size: sync.effective_batch_size(),
            batch_pause: sync.batch_pause(),
        }
    }

    pub async fn year_groups(&self) -> Result<Vec<Value>, UpstreamError> {
        fetch_all_pages(&self.http, &["year-groups"], &[], &YEAR_GROUPS, self.per_page).await
    }

    pub async fn classes(&self) -> Result<Vec<Value>, UpstreamError> {
        fetch_all_pages(&self.http, &["classes"], &[], &CLASSES, self.per_page).await
    }

    pub async fn teachers(&self, modified_since: Option<DateTime<Utc>>) -> Result<Vec<Value>, UpstreamError> {
        fetch_all_pages(&self.http, &["teachers"], &since(modified_since), &TEACHERS, self.per_page).await
    }

    pub async fn students(&self, modified_since: Option<DateTime<Utc>>) -> Result<Vec<Value>, UpstreamError> {
        fetch_all_pages(&self.http, &["students"], &since(modified_since), &STUDENTS, self.per_page).await
    }

    /// Student ids enrolled in each class, flattened into membership records.
    /// Classes are walked in batches with a pause between batches; a class whose
    /// request fails is reported in `failures` and the rest continue.
    pub async fn class_memberships(&self, class_ids: &[String]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let batches = chunked(class_ids, self.batch_size);

        for (index, batch) in batches.iter().enumerate() {
            for class_id in batch {
                let segments = ["classes", class_id.as_str(), "students"];
                match fetch_all_pages(&self.http, &segments, &[], &CLASS_STUDENTS, self.per_page).await {
                    Ok(students) => {
                        outcome
                            .items
                            .extend(students.iter().filter_map(|s| membership(class_id, s)));
                    }
                    Err(e) => {
                        warn!("Class {} membership fetch failed: {}", class_id, e);
                        outcome.failures.push((class_id.clone(), e));
                    }
                }
            }
            info!(
                "Class memberships: batch {}/{} done ({} records so far)",
                index + 1,
                batches.len(),
                outcome.items.len()
            );
            pause_between(index, batches.len(), self.batch_pause).await;
        }

        outcome
    }
}

fn since(modified_since: Option<DateTime<Utc>>) -> Vec<(String, String)> {
    modified_since
        .map(|ts| vec![("modified_since".to_string(), ts.to_rfc3339_opts(SecondsFormat::Secs, true))])
        .unwrap_or_default()
}

/// Entries are bare ids or objects carrying `id`
fn membership(class_id: &str, entry: &Value) -> Option<Value> {
    let student_id = json_id(entry).or_else(|| entry.get("id").and_then(json_id))?;
    Some(json!({
        "id": format!("{}:{}", class_id, student_id),
        "class_id": class_id,
        "student_id": student_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn modified_since_is_rfc3339() {
        let ts = Utc.with_ymd_and_hms(2024, 9, 1, 6, 30, 0).unwrap();
        assert_eq!(
            since(Some(ts)),
            vec![("modified_since".to_string(), "2024-09-01T06:30:00Z".to_string())]
        );
        assert!(since(None).is_empty());
    }

    #[test]
    fn memberships_accept_ids_and_objects() {
        let m = membership("c1", &json!(17)).unwrap();
        assert_eq!(m["id"], "c1:17");
        assert_eq!(m["student_id"], "17");

        let m = membership("c1", &json!({"id": "s-9"})).unwrap();
        assert_eq!(m["id"], "c1:s-9");

        assert!(membership("c1", &json!({"name": "nobody"})).is_none());
    }
}
