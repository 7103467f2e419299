use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

/// Upstream system a track pulls from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Lms,
    Sis,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Lms => "lms",
            Source::Sis => "sis",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Succeeded,
    Partial,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemFailure {
    pub item: Option<String>,
    pub message: String,
}

impl ItemFailure {
    pub fn new(item: Option<String>, message: impl Into<String>) -> Self {
        Self { item, message: message.into() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointReport {
    pub endpoint: String,
    pub fetched: usize,
    pub upserted: usize,
    /// Item detail is written to `sync_errors`; the stored summary keeps the count
    #[serde(rename = "failure_count", serialize_with = "serialize_count", skip_deserializing)]
    pub failures: Vec<ItemFailure>,
    /// Set when the endpoint stopped early; its cursor is left untouched
    pub aborted: Option<String>,
}

impl EndpointReport {
    pub fn new(endpoint: &str) -> Self {
        Self { endpoint: endpoint.to_string(), ..Default::default() }
    }

    pub fn aborted(endpoint: &str, reason: impl Into<String>) -> Self {
        Self { aborted: Some(reason.into()), ..Self::new(endpoint) }
    }

    pub fn error_count(&self) -> usize {
        self.failures.len() + usize::from(self.aborted.is_some())
    }
}

fn serialize_count<S: Serializer>(failures: &[ItemFailure], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(failures.len() as u64)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchoolReport {
    pub node_id: Uuid,
    pub node_name: String,
    pub endpoints: Vec<EndpointReport>,
    /// The school could not be processed at all (e.g. a bad base URL)
    pub error: Option<String>,
}

impl SchoolReport {
    pub fn new(node_id: Uuid, node_name: &str) -> Self {
        Self { node_id, node_name: node_name.to_string(), endpoints: Vec::new(), error: None }
    }

    pub fn upserted(&self) -> usize {
        self.endpoints.iter().map(|e| e.upserted).sum()
    }

    pub fn error_count(&self) -> usize {
        usize::from(self.error.is_some()) + self.endpoints.iter().map(EndpointReport::error_count).sum::<usize>()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackReport {
    pub source: Source,
    pub schools: Vec<SchoolReport>,
}

impl TrackReport {
    pub fn new(source: Source) -> Self {
        Self { source, schools: Vec::new() }
    }

    pub fn upserted(&self) -> usize {
        self.schools.iter().map(SchoolReport::upserted).sum()
    }

    pub fn error_count(&self) -> usize {
        self.schools.iter().map(SchoolReport::error_count).sum()
    }
}

/// Stored as `sync_runs.summary`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub schools: usize,
    pub upserted: usize,
    pub errors: usize,
    pub tracks: Vec<TrackReport>,
    /// Run-level failure before any track started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunSummary {
    pub fn from_tracks(run_id: Uuid, schools: usize, tracks: Vec<TrackReport>) -> Self {
        let upserted = tracks.iter().map(TrackReport::upserted).sum();
        let errors = tracks.iter().map(TrackReport::error_count).sum();
        Self {
            run_id,
            status: final_status(upserted, errors),
            schools,
            upserted,
            errors,
            tracks,
            error: None,
        }
    }

    pub fn aborted(run_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            run_id,
            status: RunStatus::Failed,
            schools: 0,
            upserted: 0,
            errors: 1,
            tracks: Vec::new(),
            error: Some(message.into()),
        }
    }
}

/// succeeded: no errors; partial: errors but some rows landed; failed: errors and nothing landed
pub fn final_status(upserted: usize, errors: usize) -> RunStatus {
    match (errors, upserted) {
        (0, _) => RunStatus::Succeeded,
        (_, 0) => RunStatus::Failed,
        _ => RunStatus::Partial,
    }
}
