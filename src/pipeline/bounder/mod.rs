
use serde::Serialize;
use serde_json::Value;

use super::executor::QueryResult;

/// A result reduced for display, carrying the true row count
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoundedResult {
    pub display_text: String,
    /// Total rows before truncation; `None` when the engine reported an error
    pub full_count: Option<usize>,
    pub truncated: bool,
}

#[inline]
pub fn truncation_marker(cap: usize, total: usize) -> String {
    format!("Showing only the first {} of {} rows:", cap, total)
}

fn serialize_rows(rows: &[Value]) -> String {
    serde_json::to_string(rows).unwrap_or_else(|_| format!("{:?}", rows))
}

/// Cap `rows` at `cap` entries for display
#[inline]
pub fn bound_rows(rows: &[Value], cap: usize) -> BoundedResult {
    let total = rows.len();
    if total <= cap {
        return BoundedResult {
            display_text: serialize_rows(rows),
            full_count: Some(total),
            truncated: false,
        };
    }

    let shown = rows.get(..cap).unwrap_or(rows);
    BoundedResult {
        display_text: format!("{}\n{}", truncation_marker(cap, total), serialize_rows(shown)),
        full_count: Some(total),
        truncated: true,
    }
}

/// Bound a query result. Engine errors pass through verbatim.
#[inline]
pub fn bound(result: &QueryResult, cap: usize) -> BoundedResult {
    match result {
        QueryResult::Rows(rows) => bound_rows(rows, cap),
        QueryResult::EngineError(message) => BoundedResult {
            display_text: message.clone(),
            full_count: None,
            truncated: false,
        },
    }
}
