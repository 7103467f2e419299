//! Clients for the two upstream school systems.

pub mod error;
pub mod http;
pub mod lms;
pub mod pagination;
pub mod sis;

use serde_json::Value;

pub use error::UpstreamError;
pub use http::{AuthScheme, RetryPolicy, UpstreamClient};
pub use lms::LmsClient;
pub use pagination::{chunked, fetch_all_pages, parse_page, Page, PageShape};
pub use sis::SisClient;

/// Items fetched across id batches plus the ids whose requests failed
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub items: Vec<Value>,
    pub failures: Vec<(String, UpstreamError)>,
}

impl From<Vec<Value>> for BatchOutcome {
    fn from(items: Vec<Value>) -> Self {
        Self { items, failures: Vec::new() }
    }
}

/// Upstream ids arrive as strings or numbers; normalize to text
pub fn json_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_ids() {
        assert_eq!(json_id(&json!(42)), Some("42".into()));
        assert_eq!(json_id(&json!(" abc ")), Some("abc".into()));
        assert_eq!(json_id(&json!("")), None);
        assert_eq!(json_id(&json!(null)), None);
        assert_eq!(json_id(&json!({"id": 1})), None);
    }
}
