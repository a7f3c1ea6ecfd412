//! Core data models shared across the reconciliation engine and the API.
//!
//! These types represent the scanned source files, the indexed rows they are
//! reconciled into, and the summary a reconciliation run reports.

use serde::Serialize;

/// A post source file as seen on disk, after front matter extraction.
///
/// Ephemeral: descriptors are rebuilt from scratch on every scan and never
/// persisted. `relative_path` (POSIX-style, relative to the content root) is
/// the identity key used to match descriptors against indexed rows.
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    pub relative_path: String,
    pub slug: String,
    pub title: String,
    pub category: String,
    pub content: String,
    pub content_hash: String,
    pub is_hidden: bool,
}

/// Site metadata (single row).
#[derive(Debug, Clone)]
pub struct Platform {
    pub title: String,
    pub description: String,
    pub footer: String,
}

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub added: u64,
    pub updated: u64,
    pub deleted: u64,
}

/// Pagination envelope shared by every list endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub total: i64,
    pub page: i64,
    pub size: i64,
    pub items: Vec<T>,
}

/// Out-of-range paging values are clamped, not rejected.
pub(crate) fn clamp_page_params(page: i64, size: i64) -> (i64, i64) {
    (page.max(1), size.clamp(1, 100))
}

/// OFFSET for a clamped page/size pair. Saturates so an absurd page number
/// yields an empty page instead of overflowing.
pub(crate) fn page_offset(page: i64, size: i64) -> i64 {
    page.saturating_sub(1).saturating_mul(size)
}

impl SyncSummary {
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.deleted == 0
    }
}

pub(crate) fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
