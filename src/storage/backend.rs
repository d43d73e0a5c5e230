//! The document-search backend seam
//!
//! Everything the engine needs from the search/storage collaborator:
//! keyed reads, predicate search and count, bulk writes with per-item
//! results, and time-bounded scroll cursors. Documents are plain JSON.

use async_trait::async_trait;
use cfql::Predicate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by a backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The backend could not be reached at all
    #[error("Search backend unavailable: {0}")]
    Unavailable(String),

    /// The backend refused the request (bad query, window too large...)
    #[error("Search backend rejected the request: {0}")]
    Rejected(String),

    /// Expired or unknown scroll cursor
    #[error("No search context found for scroll id '{0}'")]
    ScrollNotFound(String),
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Result ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Sort {
    /// Score descending, ties broken by name
    #[default]
    Relevance,
    /// Name ascending; required for `search_after`
    Name,
}

/// One search call
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub predicate: Predicate,
    pub size: usize,
    pub from: usize,
    pub sort: Sort,
    /// Only hits sorting strictly after this name (requires [`Sort::Name`])
    pub search_after: Option<String>,
    /// Report the full match count in [`SearchResponse::total`]
    pub track_total_hits: bool,
}

impl SearchRequest {
    pub fn new(predicate: Predicate, size: usize) -> Self {
        Self {
            predicate,
            size,
            from: 0,
            sort: Sort::Relevance,
            search_after: None,
            track_total_hits: false,
        }
    }

    pub fn offset(mut self, from: usize) -> Self {
        self.from = from;
        self
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    pub fn search_after(mut self, after: Option<String>) -> Self {
        self.search_after = after;
        self
    }

    pub fn track_total_hits(mut self, track: bool) -> Self {
        self.track_total_hits = track;
        self
    }
}

/// A matching document
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub id: String,
    pub score: f64,
    pub source: Value,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchResponse {
    pub hits: Vec<Hit>,
    /// Full match count, present when it was asked for
    pub total: Option<u64>,
}

/// A page from a scroll cursor
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollPage {
    pub cursor_id: String,
    pub hits: Vec<Hit>,
    /// Page size the cursor was opened with
    pub page_size: usize,
}

/// Write visibility requested for a bulk batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Refresh {
    /// Visible to the very next read
    #[default]
    Immediate,
    /// Visible eventually
    None,
}

/// One mutation inside a bulk batch
#[derive(Debug, Clone, PartialEq)]
pub enum BulkOp {
    /// Create or replace a whole document
    Index { index: String, id: String, doc: Value },
    /// Replace an existing document; fails if it is gone
    Update { index: String, id: String, doc: Value },
    /// Delete a document
    Delete { index: String, id: String },
}

impl BulkOp {
    pub fn index(&self) -> &str {
        match self {
            BulkOp::Index { index, .. } | BulkOp::Update { index, .. } | BulkOp::Delete { index, .. } => {
                index
            }
        }
    }

    pub fn id(&self) -> &str {
        match self {
            BulkOp::Index { id, .. } | BulkOp::Update { id, .. } | BulkOp::Delete { id, .. } => id,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            BulkOp::Index { .. } => "index",
            BulkOp::Update { .. } => "update",
            BulkOp::Delete { .. } => "delete",
        }
    }
}

/// Per-item outcome of a bulk batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
    Created,
    Updated,
    Deleted,
    /// Delete of a document that was not there
    NotFound,
    Failed { reason: String },
}

impl ItemStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, ItemStatus::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItemResult {
    pub index: String,
    pub id: String,
    pub action: &'static str,
    pub status: ItemStatus,
}

/// The search/storage collaborator
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Fetch one document
    async fn get(&self, index: &str, id: &str) -> BackendResult<Option<Value>>;

    /// Fetch the documents that exist among `ids`, in request order
    async fn multi_get(&self, index: &str, ids: &[String]) -> BackendResult<Vec<(String, Value)>>;

    /// Which of `ids` exist, without fetching sources
    async fn exists(&self, index: &str, ids: &[String]) -> BackendResult<Vec<String>>;

    async fn search(&self, index: &str, request: &SearchRequest) -> BackendResult<SearchResponse>;

    async fn count(&self, index: &str, predicate: &Predicate) -> BackendResult<u64>;

    /// Execute every operation independently; one result per operation
    async fn bulk(&self, ops: Vec<BulkOp>, refresh: Refresh) -> BackendResult<Vec<BulkItemResult>>;

    async fn open_scroll(
        &self,
        index: &str,
        predicate: &Predicate,
        page_size: usize,
        ttl: Duration,
    ) -> BackendResult<ScrollPage>;

    /// Next page; extends the cursor's time-to-live
    async fn continue_scroll(&self, cursor_id: &str, ttl: Duration) -> BackendResult<ScrollPage>;

    async fn close_scroll(&self, cursor_id: &str) -> BackendResult<()>;
}
