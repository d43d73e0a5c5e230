//! In-process search backend
//!
//! Keeps every index as an ordered map of JSON documents and evaluates
//! predicates with [`crate::query::filter`]. Behaves like the real
//! collaborator where the engine can observe it: per-item bulk results,
//! a bounded result window, and scroll cursors that expire.

use async_trait::async_trait;
use cfql::Predicate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::backend::{
    BackendError, BackendResult, BulkItemResult, BulkOp, Hit, ItemStatus, Refresh, ScrollPage,
    SearchBackend, SearchRequest, SearchResponse, Sort,
};
use crate::error::{Error, Result};
use crate::query::filter::Filter;

/// Every hit gets the same score; ties are broken by name
const CONSTANT_SCORE: f64 = 1.0;

/// On-disk form of a [`MemoryBackend`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub indices: BTreeMap<String, BTreeMap<String, Value>>,
}

#[derive(Debug)]
struct ScrollContext {
    remaining: VecDeque<Hit>,
    page_size: usize,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct State {
    indices: HashMap<String, BTreeMap<String, Value>>,
    scrolls: HashMap<String, ScrollContext>,
}

/// A [`SearchBackend`] held entirely in memory
#[derive(Debug)]
pub struct MemoryBackend {
    state: RwLock<State>,
    available: AtomicBool,
    max_result_window: usize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            available: AtomicBool::new(true),
            max_result_window: 10_000,
        }
    }

    pub fn with_max_result_window(mut self, max: usize) -> Self {
        self.max_result_window = max;
        self
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let backend = Self::new();
        let indices = snapshot.indices.into_iter().collect();
        Self {
            state: RwLock::new(State {
                indices,
                scrolls: HashMap::new(),
            }),
            ..backend
        }
    }

    pub async fn snapshot(&self) -> Snapshot {
        let state = self.state.read().await;
        Snapshot {
            indices: state
                .indices
                .iter()
                .map(|(name, docs)| (name.clone(), docs.clone()))
                .collect(),
        }
    }

    /// Load a JSON snapshot; a missing file gives an empty backend
    pub async fn load(path: &Path) -> Result<Self> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| Error::FileReadError {
                path: path.to_path_buf(),
                source,
            })?;
        if !exists {
            return Ok(Self::new());
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| Error::FileReadError {
                path: path.to_path_buf(),
                source,
            })?;
        let snapshot: Snapshot = serde_json::from_str(&content)?;
        Ok(Self::from_snapshot(snapshot))
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.snapshot().await)?;
        tokio::fs::write(path, content)
            .await
            .map_err(|source| Error::FileWriteError {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Simulate the backend going away (or coming back)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of open scroll cursors
    pub async fn open_scrolls(&self) -> usize {
        self.state.read().await.scrolls.len()
    }

    fn check_available(&self) -> BackendResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError::Unavailable("connection refused".to_string()))
        }
    }

    /// Matching hits of `index` in name order
    fn matching(state: &State, index: &str, predicate: &Predicate) -> BackendResult<Vec<Hit>> {
        let filter = Filter::compile(predicate).map_err(|e| BackendError::Rejected(e.to_string()))?;
        let Some(docs) = state.indices.get(index) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<Hit> = docs
            .iter()
            .filter(|(_, doc)| filter.matches(doc))
            .map(|(id, doc)| Hit {
                id: id.clone(),
                score: CONSTANT_SCORE,
                source: doc.clone(),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| sort_name(a).cmp(sort_name(b)))
        });
        Ok(hits)
    }
}

fn sort_name(hit: &Hit) -> &str {
    hit.source
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or(&hit.id)
}

#[async_trait]
impl SearchBackend for MemoryBackend {
    async fn get(&self, index: &str, id: &str) -> BackendResult<Option<Value>> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state.indices.get(index).and_then(|docs| docs.get(id)).cloned())
    }

    async fn multi_get(&self, index: &str, ids: &[String]) -> BackendResult<Vec<(String, Value)>> {
        self.check_available()?;
        let state = self.state.read().await;
        let Some(docs) = state.indices.get(index) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| docs.get(id).map(|doc| (id.clone(), doc.clone())))
            .collect())
    }

    async fn exists(&self, index: &str, ids: &[String]) -> BackendResult<Vec<String>> {
        self.check_available()?;
        let state = self.state.read().await;
        let Some(docs) = state.indices.get(index) else {
            return Ok(Vec::new());
        };
        Ok(ids.iter().filter(|id| docs.contains_key(*id)).cloned().collect())
    }

    async fn search(&self, index: &str, request: &SearchRequest) -> BackendResult<SearchResponse> {
        self.check_available()?;

        let window = request.from.saturating_add(request.size);
        if window > self.max_result_window {
            return Err(BackendError::Rejected(format!(
                "Result window is too large, from + size must be less than or equal to: [{}] but was [{}]. \
                 See the scroll api for a more efficient way to request large data sets.",
                self.max_result_window, window
            )));
        }
        if request.search_after.is_some() && request.sort != Sort::Name {
            return Err(BackendError::Rejected(
                "search_after requires an explicit name sort".to_string(),
            ));
        }

        let state = self.state.read().await;
        let mut hits = Self::matching(&state, index, &request.predicate)?;
        let total = request.track_total_hits.then_some(hits.len() as u64);

        if let Some(after) = &request.search_after {
            hits.retain(|hit| sort_name(hit) > after.as_str());
        }

        let hits = hits
            .into_iter()
            .skip(request.from)
            .take(request.size)
            .collect();
        Ok(SearchResponse { hits, total })
    }

    async fn count(&self, index: &str, predicate: &Predicate) -> BackendResult<u64> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(Self::matching(&state, index, predicate)?.len() as u64)
    }

    async fn bulk(&self, ops: Vec<BulkOp>, _refresh: Refresh) -> BackendResult<Vec<BulkItemResult>> {
        self.check_available()?;
        // Writes are applied under the lock, so every refresh policy is immediate here.
        let mut state = self.state.write().await;

        let results = ops
            .into_iter()
            .map(|op| {
                let index = op.index().to_string();
                let id = op.id().to_string();
                let action = op.action();
                let status = match op {
                    BulkOp::Index { index, id, doc } => {
                        match state.indices.entry(index).or_default().insert(id, doc) {
                            Some(_) => ItemStatus::Updated,
                            None => ItemStatus::Created,
                        }
                    }
                    BulkOp::Update { index, id, doc } => {
                        match state.indices.get_mut(&index).and_then(|docs| docs.get_mut(&id)) {
                            Some(existing) => {
                                *existing = doc;
                                ItemStatus::Updated
                            }
                            None => ItemStatus::Failed {
                                reason: format!("document_missing_exception: [{}]: document missing", id),
                            },
                        }
                    }
                    BulkOp::Delete { index, id } => {
                        match state.indices.get_mut(&index).and_then(|docs| docs.remove(&id)) {
                            Some(_) => ItemStatus::Deleted,
                            None => ItemStatus::NotFound,
                        }
                    }
                };
                BulkItemResult {
                    index,
                    id,
                    action,
                    status,
                }
            })
            .collect();
        Ok(results)
    }

    async fn open_scroll(
        &self,
        index: &str,
        predicate: &Predicate,
        page_size: usize,
        ttl: Duration,
    ) -> BackendResult<ScrollPage> {
        self.check_available()?;
        if page_size == 0 {
            return Err(BackendError::Rejected("scroll page size must be positive".to_string()));
        }

        let mut state = self.state.write().await;
        let now = Instant::now();
        state.scrolls.retain(|_, ctx| ctx.expires_at > now);

        let mut remaining: VecDeque<Hit> = Self::matching(&state, index, predicate)?.into();
        let take = page_size.min(remaining.len());
        let hits: Vec<Hit> = remaining.drain(..take).collect();

        let cursor_id = uuid::Uuid::new_v4().to_string();
        state.scrolls.insert(
            cursor_id.clone(),
            ScrollContext {
                remaining,
                page_size,
                expires_at: now + ttl,
            },
        );
        Ok(ScrollPage {
            cursor_id,
            hits,
            page_size,
        })
    }

    async fn continue_scroll(&self, cursor_id: &str, ttl: Duration) -> BackendResult<ScrollPage> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let now = Instant::now();
        state.scrolls.retain(|_, ctx| ctx.expires_at > now);

        let ctx = state
            .scrolls
            .get_mut(cursor_id)
            .ok_or_else(|| BackendError::ScrollNotFound(cursor_id.to_string()))?;
        let take = ctx.page_size.min(ctx.remaining.len());
        let hits = ctx.remaining.drain(..take).collect();
        ctx.expires_at = now + ttl;

        Ok(ScrollPage {
            cursor_id: cursor_id.to_string(),
            hits,
            page_size: ctx.page_size,
        })
    }

    async fn close_scroll(&self, cursor_id: &str) -> BackendResult<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        match state.scrolls.remove(cursor_id) {
            Some(_) => Ok(()),
            None => Err(BackendError::ScrollNotFound(cursor_id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const INDEX: &str = "channelfinder";

    async fn seeded(n: usize) -> MemoryBackend {
        let backend = MemoryBackend::new();
        let ops = (0..n)
            .map(|i| {
                let name = format!("ch{:03}", i);
                BulkOp::Index {
                    index: INDEX.into(),
                    id: name.clone(),
                    doc: json!({"name": name, "owner": "o1", "tags": [], "properties": []}),
                }
            })
            .collect();
        backend.bulk(ops, Refresh::Immediate).await.unwrap();
        backend
    }

    fn names(hits: &[Hit]) -> Vec<&str> {
        hits.iter().map(|h| h.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_bulk_item_results() {
        let backend = seeded(1).await;
        let results = backend
            .bulk(
                vec![
                    BulkOp::Index {
                        index: INDEX.into(),
                        id: "ch000".into(),
                        doc: json!({"name": "ch000", "owner": "o2"}),
                    },
                    BulkOp::Update {
                        index: INDEX.into(),
                        id: "gone".into(),
                        doc: json!({"name": "gone"}),
                    },
                    BulkOp::Delete {
                        index: INDEX.into(),
                        id: "gone".into(),
                    },
                ],
                Refresh::Immediate,
            )
            .await
            .unwrap();

        assert_eq!(results[0].status, ItemStatus::Updated);
        assert!(results[1].status.is_failure());
        assert_eq!(results[2].status, ItemStatus::NotFound);
    }

    #[tokio::test]
    async fn test_search_window_and_total() {
        let backend = seeded(10).await;
        let request = SearchRequest::new(Predicate::MatchAll, 3)
            .offset(2)
            .track_total_hits(true);
        let response = backend.search(INDEX, &request).await.unwrap();
        assert_eq!(names(&response.hits), vec!["ch002", "ch003", "ch004"]);
        assert_eq!(response.total, Some(10));
    }

    #[tokio::test]
    async fn test_result_window_limit() {
        let backend = seeded(1).await.with_max_result_window(5);
        let request = SearchRequest::new(Predicate::MatchAll, 4).offset(2);
        assert!(matches!(
            backend.search(INDEX, &request).await,
            Err(BackendError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_search_after_requires_name_sort() {
        let backend = seeded(5).await;
        let request = SearchRequest::new(Predicate::MatchAll, 10).search_after(Some("ch001".into()));
        assert!(backend.search(INDEX, &request).await.is_err());

        let request = request.sort(Sort::Name);
        let response = backend.search(INDEX, &request).await.unwrap();
        assert_eq!(names(&response.hits), vec!["ch002", "ch003", "ch004"]);
    }

    #[tokio::test]
    async fn test_scroll_pages_and_close() {
        let backend = seeded(5).await;
        let ttl = Duration::from_secs(60);
        let first = backend
            .open_scroll(INDEX, &Predicate::MatchAll, 2, ttl)
            .await
            .unwrap();
        assert_eq!(first.hits.len(), 2);

        let second = backend.continue_scroll(&first.cursor_id, ttl).await.unwrap();
        let third = backend.continue_scroll(&first.cursor_id, ttl).await.unwrap();
        assert_eq!(names(&second.hits), vec!["ch002", "ch003"]);
        assert_eq!(names(&third.hits), vec!["ch004"]);

        backend.close_scroll(&first.cursor_id).await.unwrap();
        assert_eq!(backend.open_scrolls().await, 0);
        assert!(matches!(
            backend.continue_scroll(&first.cursor_id, ttl).await,
            Err(BackendError::ScrollNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_continue_prunes_expired_scrolls() {
        let backend = seeded(5).await;
        for _ in 0..3 {
            backend
                .open_scroll(INDEX, &Predicate::MatchAll, 2, Duration::from_millis(1))
                .await
                .unwrap();
        }
        let live = backend
            .open_scroll(INDEX, &Predicate::MatchAll, 2, Duration::from_secs(60))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(backend.open_scrolls().await, 4);

        let page = backend.continue_scroll(&live.cursor_id, Duration::from_secs(60)).await.unwrap();
        assert_eq!(page.page_size, 2);
        assert_eq!(backend.open_scrolls().await, 1);
    }

    #[tokio::test]
    async fn test_scroll_expires() {
        let backend = seeded(5).await;
        let page = backend
            .open_scroll(INDEX, &Predicate::MatchAll, 2, Duration::from_millis(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(matches!(
            backend.continue_scroll(&page.cursor_id, Duration::from_secs(60)).await,
            Err(BackendError::ScrollNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unavailable() {
        let backend = seeded(1).await;
        backend.set_available(false);
        assert!(matches!(
            backend.get(INDEX, "ch000").await,
            Err(BackendError::Unavailable(_))
        ));
        backend.set_available(true);
        assert!(backend.get(INDEX, "ch000").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_snapshot_round_trip_on_disk() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("directory.json");

        let backend = seeded(3).await;
        backend.save(&path).await.unwrap();

        let reloaded = MemoryBackend::load(&path).await.unwrap();
        assert_eq!(reloaded.count(INDEX, &Predicate::MatchAll).await.unwrap(), 3);

        let empty = MemoryBackend::load(&tmp.path().join("missing.json")).await.unwrap();
        assert_eq!(empty.count(INDEX, &Predicate::MatchAll).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_load_unreadable_path_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("plain-file");
        std::fs::write(&file, "{}").unwrap();

        // a regular file used as a directory: not "missing", but unreadable
        let result = MemoryBackend::load(&file.join("directory.json")).await;
        assert!(matches!(result, Err(Error::FileReadError { .. })));
    }
}
