//! Collection - typed access to one backend index
//!
//! Collections are analogous to tables: one per record type, keyed by the
//! record's name.
//!
//! ```text
//! channelfinder   Channel  {name, owner, tags, properties}
//! cf_tags         Tag      {name, owner}
//! cf_properties   Property {name, owner}
//! ```

use cfql::Predicate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

use super::backend::{BulkOp, SearchBackend, SearchRequest, Sort};
use super::document::{Channel, Property, Tag};
use crate::bulk::{BulkBatch, BulkWriter};
use crate::error::{Error, Result};

/// A record type stored in its own index
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Lower-case record kind, for messages
    const KIND: &'static str;

    fn id(&self) -> &str;

    /// The form written to the index
    fn stored(&self) -> Self {
        self.clone()
    }

    fn not_found(name: &str) -> Error;
}

impl Entity for Channel {
    const KIND: &'static str = "channel";

    fn id(&self) -> &str {
        &self.name
    }

    fn not_found(name: &str) -> Error {
        Error::ChannelNotFound {
            name: name.to_string(),
        }
    }
}

impl Entity for Tag {
    const KIND: &'static str = "tag";

    fn id(&self) -> &str {
        &self.name
    }

    fn stored(&self) -> Self {
        self.canonical()
    }

    fn not_found(name: &str) -> Error {
        Error::TagNotFound {
            name: name.to_string(),
        }
    }
}

impl Entity for Property {
    const KIND: &'static str = "property";

    fn id(&self) -> &str {
        &self.name
    }

    fn stored(&self) -> Self {
        self.canonical()
    }

    fn not_found(name: &str) -> Error {
        Error::PropertyNotFound {
            name: name.to_string(),
        }
    }
}

/// A collection of records of type `T`
pub struct Collection<T> {
    backend: Arc<dyn SearchBackend>,
    writer: BulkWriter,
    /// Name of the backend index
    pub index: String,
    /// Page size used when reading the whole collection
    page_size: usize,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            writer: self.writer.clone(),
            index: self.index.clone(),
            page_size: self.page_size,
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> Collection<T> {
    pub fn open(backend: Arc<dyn SearchBackend>, index: impl Into<String>, page_size: usize) -> Self {
        Self {
            writer: BulkWriter::new(Arc::clone(&backend)),
            backend,
            index: index.into(),
            page_size: page_size.max(1),
            _entity: PhantomData,
        }
    }

    pub fn backend(&self) -> &Arc<dyn SearchBackend> {
        &self.backend
    }

    /// Read a single record by name
    pub async fn get(&self, id: &str) -> Result<Option<T>> {
        match self.backend.get(&self.index, id).await? {
            Some(doc) => self.decode(id, doc).map(Some),
            None => Ok(None),
        }
    }

    /// Like [`Collection::get`], but absence is an error
    pub async fn require(&self, id: &str) -> Result<T> {
        self.get(id).await?.ok_or_else(|| T::not_found(id))
    }

    pub async fn exists(&self, id: &str) -> Result<bool> {
        let found = self.backend.exists(&self.index, &[id.to_string()]).await?;
        Ok(!found.is_empty())
    }

    /// Names among `ids` with no record, in input order
    pub async fn missing(&self, ids: &[String]) -> Result<Vec<String>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let found = self.backend.exists(&self.index, ids).await?;
        Ok(ids.iter().filter(|id| !found.contains(id)).cloned().collect())
    }

    pub async fn exists_all(&self, ids: &[String]) -> Result<bool> {
        Ok(self.missing(ids).await?.is_empty())
    }

    /// Records that exist among `ids`, in input order
    pub async fn find_all_by_id(&self, ids: &[String]) -> Result<Vec<T>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.backend
            .multi_get(&self.index, ids)
            .await?
            .into_iter()
            .map(|(id, doc)| self.decode(&id, doc))
            .collect()
    }

    /// Every record, in name order
    pub async fn list_all(&self) -> Result<Vec<T>> {
        self.find_matching(&Predicate::MatchAll).await
    }

    /// Every record matching `predicate`, in name order, paging with
    /// `search_after` so no result window limit applies
    pub async fn find_matching(&self, predicate: &Predicate) -> Result<Vec<T>> {
        let mut records = Vec::new();
        let mut after: Option<String> = None;
        loop {
            let request = SearchRequest::new(predicate.clone(), self.page_size)
                .sort(Sort::Name)
                .search_after(after.take());
            let response = self.backend.search(&self.index, &request).await?;
            let page_len = response.hits.len();
            for hit in response.hits {
                let record = self.decode(&hit.id, hit.source)?;
                after = Some(record.id().to_string());
                records.push(record);
            }
            if page_len < self.page_size {
                break;
            }
        }
        Ok(records)
    }

    pub async fn count(&self) -> Result<u64> {
        Ok(self.backend.count(&self.index, &Predicate::MatchAll).await?)
    }

    /// Create or replace one record; visible to the next read
    pub async fn put(&self, record: &T) -> Result<T> {
        let stored = record.stored();
        let mut batch = BulkBatch::new();
        batch.push(self.index_op(&stored)?);
        self.writer.execute(batch).await?;
        Ok(stored)
    }

    /// Create or replace several records in one batch
    pub async fn put_all(&self, records: &[T]) -> Result<Vec<T>> {
        let stored: Vec<T> = records.iter().map(T::stored).collect();
        let batch = stored
            .iter()
            .map(|r| self.index_op(r))
            .collect::<Result<BulkBatch>>()?;
        self.writer.execute(batch).await?;
        Ok(stored)
    }

    /// Returns false when there was nothing to delete
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let mut batch = BulkBatch::new();
        batch.push(self.delete_op(id));
        let summary = self.writer.execute(batch).await?;
        Ok(summary.deleted > 0)
    }

    // -------------------------------------------------------------------------
    // Operation builders, for callers assembling their own batches
    // -------------------------------------------------------------------------

    pub fn index_op(&self, record: &T) -> Result<BulkOp> {
        Ok(BulkOp::Index {
            index: self.index.clone(),
            id: record.id().to_string(),
            doc: serde_json::to_value(record.stored())?,
        })
    }

    pub fn update_op(&self, record: &T) -> Result<BulkOp> {
        Ok(BulkOp::Update {
            index: self.index.clone(),
            id: record.id().to_string(),
            doc: serde_json::to_value(record.stored())?,
        })
    }

    pub fn delete_op(&self, id: &str) -> BulkOp {
        BulkOp::Delete {
            index: self.index.clone(),
            id: id.to_string(),
        }
    }

    pub fn decode(&self, id: &str, doc: Value) -> Result<T> {
        serde_json::from_value(doc).map_err(|e| Error::InvalidDocument {
            index: self.index.clone(),
            id: id.to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::document::TagRef;
    use crate::storage::memory::MemoryBackend;

    fn channels(page_size: usize) -> Collection<Channel> {
        Collection::open(Arc::new(MemoryBackend::new()), "channelfinder", page_size)
    }

    #[tokio::test]
    async fn test_collection_crud() {
        let collection = channels(10);

        // Create
        let channel = Channel::new("ch1", "o1").with_tag(TagRef::new("t1", "o1"));
        collection.put(&channel).await.unwrap();

        // Read
        let fetched = collection.get("ch1").await.unwrap().unwrap();
        assert_eq!(fetched, channel);
        assert!(collection.exists("ch1").await.unwrap());

        // Replace
        let mut updated = fetched;
        updated.owner = "o2".into();
        collection.put(&updated).await.unwrap();
        assert_eq!(collection.require("ch1").await.unwrap().owner, "o2");

        // Delete
        assert!(collection.delete("ch1").await.unwrap());
        assert!(!collection.delete("ch1").await.unwrap());
        assert!(collection.get("ch1").await.unwrap().is_none());
        assert!(matches!(
            collection.require("ch1").await,
            Err(Error::ChannelNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_all_pages_past_page_size() {
        let collection = channels(2);
        let records: Vec<Channel> = (0..5).map(|i| Channel::new(format!("ch{}", i), "o1")).collect();
        collection.put_all(&records).await.unwrap();

        let all = collection.list_all().await.unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[4].name, "ch4");
        assert_eq!(collection.count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_missing_and_find_all() {
        let collection = channels(10);
        collection
            .put_all(&[Channel::new("a", "o"), Channel::new("b", "o")])
            .await
            .unwrap();

        let ids = vec!["a".to_string(), "x".to_string(), "b".to_string()];
        assert_eq!(collection.missing(&ids).await.unwrap(), vec!["x".to_string()]);
        assert!(!collection.exists_all(&ids).await.unwrap());
        let found = collection.find_all_by_id(&ids).await.unwrap();
        assert_eq!(found.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_tags_are_stored_canonical() {
        let tags: Collection<Tag> =
            Collection::open(Arc::new(MemoryBackend::new()), "cf_tags", 10);
        let stored = tags.put(&Tag::new("t1", "o1").with_channels(["ch1"])).await.unwrap();
        assert!(stored.channels.is_empty());
        assert!(tags.get("t1").await.unwrap().unwrap().channels.is_empty());
    }
}
