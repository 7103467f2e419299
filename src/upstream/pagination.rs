use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use super::error::UpstreamError;
use super::http::UpstreamClient;

/// Hard stop for runaway pagination when an upstream keeps returning full pages
const MAX_PAGES: u64 = 10_000;

/// Where a paginated response keeps its items and page count (JSON pointers)
#[derive(Debug, Clone, Copy)]
pub struct PageShape {
    /// Pointer to the item array; "" when the body itself is the array
    pub items: &'static str,
    pub total_pages: Option<&'static str>,
}

impl PageShape {
    pub const fn new(items: &'static str, total_pages: &'static str) -> Self {
        Self { items, total_pages: Some(total_pages) }
    }
}

/// One decoded page
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub items: Vec<Value>,
    pub total_pages: Option<u64>,
}

pub fn parse_page(body: &Value, shape: &PageShape, url: &str) -> Result<Page, UpstreamError> {
    let items = match body.pointer(shape.items) {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Null) | None => Vec::new(),
        Some(_) => {
            return Err(UpstreamError::Payload {
                url: url.to_string(),
                message: format!("'{}' is not an array", shape.items),
            })
        }
    };

    let total_pages = shape
        .total_pages
        .and_then(|p| body.pointer(p))
        .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())));

    Ok(Page { items, total_pages })
}

/// Should the loop request another page after `page`?
pub fn has_next_page(page: u64, decoded: &Page) -> bool {
    if decoded.items.is_empty() || page >= MAX_PAGES {
        return false;
    }
    match decoded.total_pages {
        Some(total) => page < total,
        None => false,
    }
}

/// Request `page=1..` until the last page, collecting every item
pub async fn fetch_all_pages(
    client: &UpstreamClient,
    segments: &[&str],
    query: &[(String, String)],
    shape: &PageShape,
    per_page: u32,
) -> Result<Vec<Value>, UpstreamError> {
    let mut all = Vec::new();
    let mut page: u64 = 1;

    loop {
        let mut params = query.to_vec();
        params.push(("page".to_string(), page.to_string()));
        params.push(("per_page".to_string(), per_page.to_string()));

        let body = client.get_json(segments, &params).await?;
        let decoded = parse_page(&body, shape, &client.url(segments))?;
        debug!(
            "{} page {}/{}: {} items",
            segments.join("/"),
            page,
            decoded.total_pages.map(|t| t.to_string()).unwrap_or_else(|| "?".into()),
            decoded.items.len()
        );

        let more = has_next_page(page, &decoded);
        all.extend(decoded.items);
        if !more {
            break;
        }
        page += 1;
    }

    Ok(all)
}

/// Split ids into batches of at most `size`
pub fn chunked<T: Clone>(ids: &[T], size: usize) -> Vec<Vec<T>> {
    ids.chunks(size.max(1)).map(|c| c.to_vec()).collect()
}

/// Pause between id batches; skipped after the last one
pub async fn pause_between(index: usize, total: usize, pause: Duration) {
    if index + 1 < total && !pause.is_zero() {
        sleep(pause).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SHAPE: PageShape = PageShape::new("/data", "/meta/total_pages");

    #[test]
    fn parses_items_and_total_pages() {
        let body = json!({"data": [{"id": 1}, {"id": 2}], "meta": {"total_pages": 3}});
        let page = parse_page(&body, &SHAPE, "u").unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total_pages, Some(3));
    }

    #[test]
    fn accepts_string_page_counts_and_root_arrays() {
        let body = json!({"data": [], "meta": {"total_pages": "7"}});
        assert_eq!(parse_page(&body, &SHAPE, "u").unwrap().total_pages, Some(7));

        let root = PageShape { items: "", total_pages: None };
        let page = parse_page(&json!([1, 2, 3]), &root, "u").unwrap();
        assert_eq!(page.items.len(), 3);
        assert_eq!(page.total_pages, None);
    }

    #[test]
    fn non_array_items_is_a_payload_error() {
        let body = json!({"data": {"id": 1}});
        assert!(matches!(parse_page(&body, &SHAPE, "u"), Err(UpstreamError::Payload { .. })));
    }

    #[test]
    fn stop_conditions() {
        let full = |total| Page { items: vec![json!(1)], total_pages: total };
        assert!(has_next_page(1, &full(Some(3))));
        assert!(!has_next_page(3, &full(Some(3))));
        assert!(!has_next_page(1, &full(None)));
        assert!(!has_next_page(1, &Page { items: vec![], total_pages: Some(9) }));
    }

    #[test]
    fn chunks_ids() {
        let ids: Vec<u32> = (0..60).collect();
        let batches = chunked(&ids, 25);
        assert_eq!(batches.iter().map(Vec::len).collect::<Vec<_>>(), vec![25, 25, 10]);
        assert!(chunked::<u32>(&[], 25).is_empty());
    }
}
