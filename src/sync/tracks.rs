//! The two sync tracks. Each walks its schools serially and, per school, its
//! endpoints serially; a failing endpoint is recorded and the next one runs.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use std::future::Future;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::cursor::{advance_cursor, load_cursor};
use super::mapping::{self, EntityMapping};
use super::report::{EndpointReport, ItemFailure, SchoolReport, Source};
use super::upsert::upsert_items;
use crate::config::SyncConfig;
use crate::database::models::TenantConfig;
use crate::upstream::sis::attendance_start;
use crate::upstream::{BatchOutcome, LmsClient, SisClient, UpstreamError};

/// Everything a track needs to sync one school
pub struct SchoolContext<'a> {
    pub pool: &'a PgPool,
    pub sync: &'a SyncConfig,
    pub config: &'a TenantConfig,
    pub node_name: &'a str,
    /// Run start; becomes the new cursor for completed endpoints
    pub started_at: DateTime<Utc>,
}

impl SchoolContext<'_> {
    pub fn node_id(&self) -> Uuid {
        self.config.node_id
    }
}

#[async_trait]
pub trait SyncTrack: Send + Sync {
    fn source(&self) -> Source;

    /// Is this track enabled and configured for the school?
    fn applies_to(&self, config: &TenantConfig) -> bool;

    async fn sync_school(&self, ctx: &SchoolContext<'_>) -> SchoolReport;
}

/// Fetch, upsert, and advance the cursor for one endpoint
async fn run_endpoint<F, Fut>(
    ctx: &SchoolContext<'_>,
    source: Source,
    endpoint: &str,
    mapping: &EntityMapping,
    fetch: F,
) -> EndpointReport
where
    F: FnOnce(Option<DateTime<Utc>>) -> Fut,
    Fut: Future<Output = anyhow::Result<BatchOutcome>>,
{
    let node_id = ctx.node_id();
    let cursor = match load_cursor(ctx.pool, node_id, source, endpoint).await {
        Ok(c) => c,
        Err(e) => {
            error!("[{}] {} {}: cannot read cursor: {}", source, ctx.node_name, endpoint, e);
            return EndpointReport::aborted(endpoint, format!("cursor lookup failed: {}", e));
        }
    };

    let outcome = match fetch(cursor).await {
        Ok(o) => o,
        Err(e) => {
            error!("[{}] {} {}: aborted: {:#}", source, ctx.node_name, endpoint, e);
            return EndpointReport::aborted(endpoint, format!("{:#}", e));
        }
    };

    let mut report = EndpointReport::new(endpoint);
    report.fetched = outcome.items.len();
    let fetch_complete = outcome.failures.is_empty();
    report.failures.extend(
        outcome
            .failures
            .into_iter()
            .map(|(item, e)| ItemFailure::new(Some(item), e.to_string())),
    );

    let upserted = upsert_items(ctx.pool, mapping, node_id, &outcome.items).await;
    report.upserted = upserted.upserted;
    report.failures.extend(upserted.failures);

    // Cursor stays put while any batch is missing
    if fetch_complete {
        if let Err(e) = advance_cursor(ctx.pool, node_id, source, endpoint, ctx.started_at).await {
            warn!("[{}] {} {}: cursor not advanced: {}", source, ctx.node_name, endpoint, e);
            report.failures.push(ItemFailure::new(None, format!("cursor update failed: {}", e)));
        }
    }

    info!(
        "[{}] {} {}: fetched {}, upserted {}, {} failures",
        source,
        ctx.node_name,
        endpoint,
        report.fetched,
        report.upserted,
        report.failures.len()
    );
    report
}

fn required<'a>(value: &'a Option<String>, what: &str) -> Result<&'a str, String> {
    value
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| format!("{} is not configured", what))
}

async fn fetched(
    request: impl Future<Output = Result<Vec<Value>, UpstreamError>>,
) -> anyhow::Result<BatchOutcome> {
    Ok(request.await?.into())
}

async fn external_ids(pool: &PgPool, sql: &str, node_id: Uuid) -> anyhow::Result<Vec<String>> {
    let ids = sqlx::query_scalar::<_, String>(sql)
        .bind(node_id)
        .fetch_all(pool)
        .await
        .context("loading external ids")?;
    Ok(ids)
}

/// Memberships for every non-archived class already mirrored for the school
async fn class_memberships(ctx: &SchoolContext<'_>, client: &LmsClient) -> anyhow::Result<BatchOutcome> {
    let class_ids = external_ids(
        ctx.pool,
        "SELECT external_id FROM lms_classes WHERE node_id = $1 AND archived IS NOT TRUE ORDER BY external_id",
        ctx.node_id(),
    )
    .await?;
    Ok(client.class_memberships(&class_ids).await)
}

async fn attendance(
    ctx: &SchoolContext<'_>,
    client: &SisClient,
    since: Option<DateTime<Utc>>,
) -> anyhow::Result<BatchOutcome> {
    let student_ids = external_ids(
        ctx.pool,
        "SELECT external_id FROM sis_students WHERE node_id = $1 ORDER BY external_id",
        ctx.node_id(),
    )
    .await?;
    let start = attendance_start(since, ctx.started_at, ctx.sync.attendance_lookback_days);
    Ok(client.attendance(&student_ids, start).await)
}

pub struct LmsTrack;

impl LmsTrack {
    fn client(ctx: &SchoolContext<'_>) -> Result<LmsClient, String> {
        let base_url = required(&ctx.config.lms_base_url, "LMS base URL")?;
        let token = required(&ctx.config.lms_api_token, "LMS API token")?;
        LmsClient::new(base_url, token, ctx.sync).map_err(|e| e.to_string())
    }
}

#[async_trait]
impl SyncTrack for LmsTrack {
    fn source(&self) -> Source {
        Source::Lms
    }

    fn applies_to(&self, config: &TenantConfig) -> bool {
        config.lms_enabled
    }

    async fn sync_school(&self, ctx: &SchoolContext<'_>) -> SchoolReport {
        let mut report = SchoolReport::new(ctx.node_id(), ctx.node_name);
        let client = match Self::client(ctx) {
            Ok(c) => c,
            Err(e) => {
                error!("[lms] {}: skipped: {}", ctx.node_name, e);
                report.error = Some(e);
                return report;
            }
        };
        let client = &client;
        let src = Source::Lms;

        report.endpoints.push(
            run_endpoint(ctx, src, "year_groups", &mapping::LMS_YEAR_GROUPS, |_| {
                fetched(client.year_groups())
            })
            .await,
        );
        report.endpoints.push(
            run_endpoint(ctx, src, "classes", &mapping::LMS_CLASSES, |_| {
                fetched(client.classes())
            })
            .await,
        );
        report.endpoints.push(
            run_endpoint(ctx, src, "teachers", &mapping::LMS_TEACHERS, |since| {
                fetched(client.teachers(since))
            })
            .await,
        );
        report.endpoints.push(
            run_endpoint(ctx, src, "students", &mapping::LMS_STUDENTS, |since| {
                fetched(client.students(since))
            })
            .await,
        );

        report.endpoints.push(
            run_endpoint(ctx, src, "class_memberships", &mapping::LMS_CLASS_MEMBERSHIPS, |_| {
                class_memberships(ctx, client)
            })
            .await,
        );

        report
    }
}

pub struct SisTrack;

impl SisTrack {
    fn client(ctx: &SchoolContext<'_>) -> Result<SisClient, String> {
        let base_url = required(&ctx.config.sis_base_url, "SIS base URL")?;
        let api_key = required(&ctx.config.sis_api_key, "SIS API key")?;
        let school_id = required(&ctx.config.sis_school_id, "SIS school id")?;
        SisClient::new(base_url, api_key, school_id, ctx.sync).map_err(|e| e.to_string())
    }
}

#[async_trait]
impl SyncTrack for SisTrack {
    fn source(&self) -> Source {
        Source::Sis
    }

    fn applies_to(&self, config: &TenantConfig) -> bool {
        config.sis_enabled
    }

    async fn sync_school(&self, ctx: &SchoolContext<'_>) -> SchoolReport {
        let mut report = SchoolReport::new(ctx.node_id(), ctx.node_name);
        let client = match Self::client(ctx) {
            Ok(c) => c,
            Err(e) => {
                error!("[sis] {}: skipped: {}", ctx.node_name, e);
                report.error = Some(e);
                return report;
            }
        };
        let client = &client;
        let src = Source::Sis;

        report.endpoints.push(
            run_endpoint(ctx, src, "students", &mapping::SIS_STUDENTS, |since| {
                fetched(client.students(since))
            })
            .await,
        );
        report.endpoints.push(
            run_endpoint(ctx, src, "staff", &mapping::SIS_STAFF, |since| {
                fetched(client.staff(since))
            })
            .await,
        );

        report.endpoints.push(
            run_endpoint(ctx, src, "attendance", &mapping::SIS_ATTENDANCE, |since| {
                attendance(ctx, client, since)
            })
            .await,
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TenantConfig {
        TenantConfig {
            id: Uuid::new_v4(),
            node_id: Uuid::new_v4(),
            lms_enabled: true,
            lms_base_url: Some("https://lms.test/v2".into()),
            lms_api_token: None,
            sis_enabled: false,
            sis_base_url: None,
            sis_api_key: None,
            sis_school_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn tracks_follow_enabled_flags() {
        let c = config();
        assert!(LmsTrack.applies_to(&c));
        assert!(!SisTrack.applies_to(&c));
    }

    #[test]
    fn missing_secret_is_reported() {
        let c = config();
        assert_eq!(required(&c.lms_api_token, "LMS API token").unwrap_err(), "LMS API token is not configured");
        assert_eq!(required(&Some("  ".into()), "x").unwrap_err(), "x is not configured");
        assert_eq!(required(&c.lms_base_url, "LMS base URL").unwrap(), "https://lms.test/v2");
    }
}
