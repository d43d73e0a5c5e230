//! Result execution: paginated listing and unbounded counting
//!
//! Both modes share one compiled predicate. Listing validates the page
//! window; counting ignores `~size`/`~from` entirely, so a request with a
//! bad `~from` can still be counted.

use cfql::{CompiledQuery, Predicate, QueryParams};
use std::sync::Arc;

use crate::config::DirectoryConfig;
use crate::error::{Error, Result};
use crate::storage::backend::{SearchBackend, SearchRequest, Sort};
use crate::storage::collection::Collection;
use crate::storage::document::Channel;

/// A page of channels plus a match count
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub channels: Vec<Channel>,
    /// Full match count when `~track_total_hits=true`, otherwise the page length
    pub count: u64,
}

/// Runs compiled queries against the channel index
#[derive(Clone)]
pub struct ResultExecutor {
    backend: Arc<dyn SearchBackend>,
    config: Arc<DirectoryConfig>,
    channels: Collection<Channel>,
}

impl ResultExecutor {
    pub fn new(backend: Arc<dyn SearchBackend>, config: Arc<DirectoryConfig>) -> Self {
        let channels = Collection::open(
            Arc::clone(&backend),
            config.channel_index.clone(),
            config.query_size,
        );
        Self {
            backend,
            config,
            channels,
        }
    }

    pub fn compile(&self, params: &QueryParams) -> Result<CompiledQuery> {
        Ok(cfql::compile(params)?)
    }

    /// Channels matching `params`, one page
    pub async fn query(&self, params: &QueryParams) -> Result<Vec<Channel>> {
        let compiled = self.compile(params)?;
        self.list(&compiled).await
    }

    /// Number of channels matching `params`; paging keys are ignored
    pub async fn query_count(&self, params: &QueryParams) -> Result<u64> {
        let compiled = self.compile(params)?;
        self.count(&compiled.predicate).await
    }

    /// Page + count in one call
    pub async fn query_search(&self, params: &QueryParams) -> Result<SearchResult> {
        let compiled = self.compile(params)?;
        self.search(&compiled).await
    }

    /// One page of matches, ordered by score then name
    pub async fn list(&self, query: &CompiledQuery) -> Result<Vec<Channel>> {
        Ok(self.search(query).await?.channels)
    }

    pub async fn search(&self, query: &CompiledQuery) -> Result<SearchResult> {
        let request = self.request(query)?;
        let response = self
            .backend
            .search(&self.config.channel_index, &request)
            .await
            .map_err(|e| {
                tracing::error!("Search failed for {:?}: {}", query.predicate, e);
                Error::Backend(e)
            })?;

        let channels = response
            .hits
            .into_iter()
            .map(|hit| self.channels.decode(&hit.id, hit.source))
            .collect::<Result<Vec<_>>>()?;
        let count = response.total.unwrap_or(channels.len() as u64);
        Ok(SearchResult { channels, count })
    }

    /// Total matches of `predicate`
    pub async fn count(&self, predicate: &Predicate) -> Result<u64> {
        self.backend
            .count(&self.config.channel_index, predicate)
            .await
            .map_err(|e| {
                tracing::error!("Count failed for {:?}: {}", predicate, e);
                Error::Backend(e)
            })
    }

    /// Channels carrying tag `name`
    pub async fn count_by_tag(&self, name: &str) -> Result<u64> {
        self.count(&Predicate::has_tag(name)).await
    }

    /// Channels carrying property `name`, optionally with a value matching
    /// the `value` pattern
    pub async fn count_by_property(&self, name: &str, value: Option<&str>) -> Result<u64> {
        let params = QueryParams::new().with(name, value.unwrap_or("*"));
        self.query_count(&params).await
    }

    /// Every match of `predicate`, however many, in name order
    ///
    /// Pages with `search_after`, so the result window limit does not apply.
    pub async fn members(&self, predicate: &Predicate) -> Result<Vec<Channel>> {
        self.channels.find_matching(predicate).await
    }

    fn request(&self, query: &CompiledQuery) -> Result<SearchRequest> {
        let pagination = query.pagination(self.config.query_size)?;
        if pagination.end() > self.config.max_result_window {
            return Err(Error::ResultWindowTooLarge {
                window: pagination.end(),
                max: self.config.max_result_window,
            });
        }

        let sort = if query.search_after.is_some() {
            Sort::Name
        } else {
            Sort::Relevance
        };
        Ok(SearchRequest::new(query.predicate.clone(), pagination.size)
            .offset(pagination.from)
            .sort(sort)
            .search_after(query.search_after.clone())
            .track_total_hits(query.track_total_hits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::document::{PropertyRef, TagRef};
    use crate::storage::memory::MemoryBackend;

    async fn make_executor() -> ResultExecutor {
        let backend: Arc<dyn SearchBackend> = Arc::new(MemoryBackend::new());
        let config = Arc::new(DirectoryConfig::default());
        let channels: Collection<Channel> =
            Collection::open(Arc::clone(&backend), config.channel_index.clone(), 100);

        let records: Vec<Channel> = (0..6)
            .map(|i| {
                let mut channel = Channel::new(format!("ch{}", i), "o1")
                    .with_property(PropertyRef::new("index", "o1", i.to_string()));
                if i % 2 == 0 {
                    channel.add_tag(TagRef::new("even", "o1"));
                }
                channel
            })
            .collect();
        channels.put_all(&records).await.unwrap();

        ResultExecutor::new(backend, config)
    }

    fn params(query: &str) -> QueryParams {
        QueryParams::parse(query)
    }

    #[tokio::test]
    async fn test_query_and_count() {
        let executor = make_executor().await;
        let found = executor.query(&params("~tag=even")).await.unwrap();
        let names: Vec<_> = found.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["ch0", "ch2", "ch4"]);
        assert_eq!(executor.count_by_tag("even").await.unwrap(), 3);
        assert_eq!(executor.count_by_property("index", Some("1|2")).await.unwrap(), 2);
        assert_eq!(executor.count_by_property("index", None).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_count_ignores_pagination() {
        let executor = make_executor().await;
        let plain = executor.query_count(&params("~name=ch*")).await.unwrap();
        let paged = executor
            .query_count(&params("~name=ch*&~size=2&~from=-1"))
            .await
            .unwrap();
        assert_eq!(plain, 6);
        assert_eq!(paged, plain);

        assert!(matches!(
            executor.query(&params("~name=ch*&~from=-1")).await,
            Err(Error::Compile(_))
        ));
    }

    #[tokio::test]
    async fn test_window_too_large() {
        let executor = make_executor().await;
        let err = executor
            .query(&params("~size=10000&~from=1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ResultWindowTooLarge { window: 10_001, max: 10_000 }));
    }

    #[tokio::test]
    async fn test_search_tracks_total() {
        let executor = make_executor().await;
        let result = executor
            .query_search(&params("~size=2&~track_total_hits=true"))
            .await
            .unwrap();
        assert_eq!(result.channels.len(), 2);
        assert_eq!(result.count, 6);

        let result = executor.query_search(&params("~size=2")).await.unwrap();
        assert_eq!(result.count, 2);
    }

    #[tokio::test]
    async fn test_search_after() {
        let executor = make_executor().await;
        let found = executor
            .query(&params("~search_after=ch3&~size=10"))
            .await
            .unwrap();
        let names: Vec<_> = found.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["ch4", "ch5"]);
    }

    #[tokio::test]
    async fn test_zero_matches() {
        let executor = make_executor().await;
        assert!(executor.query(&params("~name=nothing")).await.unwrap().is_empty());
        assert_eq!(executor.query_count(&params("~name=nothing")).await.unwrap(), 0);
    }
}
