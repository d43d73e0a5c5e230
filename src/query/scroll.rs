//! Scroll cursors for full-set export
//!
//! A cursor is held by the backend, never by this process. A page shorter
//! than the size the cursor was opened with means the result set is
//! exhausted; the cursor is closed before that page is returned and the
//! caller gets no id back.

use cfql::{Predicate, QueryParams};
use std::sync::Arc;
use std::time::Duration;

use crate::config::DirectoryConfig;
use crate::error::{Error, Result};
use crate::storage::backend::{ScrollPage as BackendScrollPage, SearchBackend};
use crate::storage::collection::Collection;
use crate::storage::document::Channel;

/// One page of a scroll
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollPage {
    /// Id to continue with; `None` once the cursor is exhausted and closed
    pub cursor_id: Option<String>,
    pub channels: Vec<Channel>,
}

impl ScrollPage {
    pub fn is_last(&self) -> bool {
        self.cursor_id.is_none()
    }
}

#[derive(Clone)]
pub struct ScrollManager {
    backend: Arc<dyn SearchBackend>,
    channels: Collection<Channel>,
    index: String,
    page_size: usize,
    ttl: Duration,
}

impl ScrollManager {
    pub fn new(backend: Arc<dyn SearchBackend>, config: &DirectoryConfig) -> Self {
        Self {
            channels: Collection::open(Arc::clone(&backend), config.channel_index.clone(), config.query_size),
            backend,
            index: config.channel_index.clone(),
            page_size: config.scroll_page_size.max(1),
            ttl: config.scroll_ttl(),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Bind `predicate` to a new cursor and return the first page
    pub async fn open(&self, predicate: &Predicate) -> Result<ScrollPage> {
        let page = self
            .backend
            .open_scroll(&self.index, predicate, self.page_size, self.ttl)
            .await
            .map_err(|e| {
                tracing::error!("Failed to open scroll for {:?}: {}", predicate, e);
                Error::Backend(e)
            })?;
        tracing::info!("Opened scroll {} ({} channels in first page)", page.cursor_id, page.hits.len());
        self.finish_page(page).await
    }

    /// Open a scroll for query parameters; `~size` overrides the page size
    pub async fn open_query(&self, params: &QueryParams) -> Result<ScrollPage> {
        let compiled = cfql::compile(params)?;
        match compiled.size {
            Some(size) if size > 0 => {
                let size = usize::try_from(size).unwrap_or(usize::MAX);
                self.clone().with_page_size(size).open(&compiled.predicate).await
            }
            _ => self.open(&compiled.predicate).await,
        }
    }

    /// Next page of an open cursor
    ///
    /// Unknown or expired ids fail with the backend's own error.
    pub async fn next(&self, cursor_id: &str) -> Result<ScrollPage> {
        let page = self.backend.continue_scroll(cursor_id, self.ttl).await?;
        self.finish_page(page).await
    }

    /// Drain a whole result set
    pub async fn export(&self, predicate: &Predicate) -> Result<Vec<Channel>> {
        let mut page = self.open(predicate).await?;
        let mut channels = std::mem::take(&mut page.channels);
        while let Some(cursor_id) = page.cursor_id.take() {
            page = self.next(&cursor_id).await?;
            channels.append(&mut page.channels);
        }
        Ok(channels)
    }

    async fn finish_page(&self, page: BackendScrollPage) -> Result<ScrollPage> {
        let exhausted = page.hits.len() < page.page_size;
        let cursor_id = page.cursor_id;
        let decoded = page
            .hits
            .into_iter()
            .map(|hit| self.channels.decode(&hit.id, hit.source))
            .collect::<Result<Vec<_>>>();

        let channels = match decoded {
            Ok(channels) => channels,
            Err(e) => {
                if let Err(close_err) = self.backend.close_scroll(&cursor_id).await {
                    tracing::error!("Failed to close scroll {}: {}", cursor_id, close_err);
                }
                return Err(e);
            }
        };

        if exhausted {
            self.backend.close_scroll(&cursor_id).await?;
            tracing::info!("Closed exhausted scroll {}", cursor_id);
            return Ok(ScrollPage {
                cursor_id: None,
                channels,
            });
        }
        Ok(ScrollPage {
            cursor_id: Some(cursor_id),
            channels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::backend::{BackendError, BulkOp, Refresh};
    use crate::storage::memory::MemoryBackend;

    async fn make_manager(n: usize) -> (Arc<MemoryBackend>, ScrollManager) {
        let backend = Arc::new(MemoryBackend::new());
        let config = DirectoryConfig::default();
        let channels: Collection<Channel> =
            Collection::open(backend.clone(), config.channel_index.clone(), 100);
        let records: Vec<Channel> = (0..n).map(|i| Channel::new(format!("ch{:04}", i), "o1")).collect();
        channels.put_all(&records).await.unwrap();

        let manager = ScrollManager::new(backend.clone(), &config);
        (backend, manager)
    }

    #[tokio::test]
    async fn test_pages_until_short_page() {
        let (backend, manager) = make_manager(5).await;
        let manager = manager.with_page_size(2);

        let first = manager.open(&Predicate::MatchAll).await.unwrap();
        assert_eq!(first.channels.len(), 2);
        let id = first.cursor_id.clone().unwrap();

        let second = manager.next(&id).await.unwrap();
        assert_eq!(second.channels.len(), 2);
        let third = manager.next(&id).await.unwrap();
        assert_eq!(third.channels.len(), 1);
        assert!(third.is_last());
        assert_eq!(backend.open_scrolls().await, 0);
    }

    #[tokio::test]
    async fn test_small_result_closes_on_open() {
        let (backend, manager) = make_manager(3).await;
        let page = manager.open(&Predicate::MatchAll).await.unwrap();
        assert_eq!(page.channels.len(), 3);
        assert!(page.is_last());
        assert_eq!(backend.open_scrolls().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_cursor_is_backend_error() {
        let (_backend, manager) = make_manager(1).await;
        assert!(matches!(
            manager.next("no-such-cursor").await,
            Err(Error::Backend(BackendError::ScrollNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_export_drains_everything() {
        let (_backend, manager) = make_manager(7).await;
        let all = manager.with_page_size(3).export(&Predicate::MatchAll).await.unwrap();
        assert_eq!(all.len(), 7);
    }

    #[tokio::test]
    async fn test_open_query_size_survives_continue() {
        let (backend, manager) = make_manager(10).await;
        let mut page = manager
            .open_query(&QueryParams::parse("~name=ch*&~size=4"))
            .await
            .unwrap();
        let mut sizes = vec![page.channels.len()];
        while let Some(id) = page.cursor_id.clone() {
            // continued through the manager's default page size
            page = manager.next(&id).await.unwrap();
            sizes.push(page.channels.len());
        }
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(backend.open_scrolls().await, 0);
    }

    #[tokio::test]
    async fn test_undecodable_hit_closes_cursor() {
        let (backend, manager) = make_manager(3).await;
        backend
            .bulk(
                vec![BulkOp::Index {
                    index: "channelfinder".to_string(),
                    id: "broken".to_string(),
                    doc: serde_json::json!({"name": 42}),
                }],
                Refresh::Immediate,
            )
            .await
            .unwrap();

        let result = manager.with_page_size(2).open(&Predicate::MatchAll).await;
        assert!(matches!(result, Err(Error::InvalidDocument { .. })));
        assert_eq!(backend.open_scrolls().await, 0);
    }

    #[tokio::test]
    async fn test_open_query_size_sets_page() {
        let (_backend, manager) = make_manager(5).await;
        let page = manager
            .open_query(&QueryParams::parse("~name=ch*&~size=4"))
            .await
            .unwrap();
        assert_eq!(page.channels.len(), 4);
        assert!(!page.is_last());
    }
}
