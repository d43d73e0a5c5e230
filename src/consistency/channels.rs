//! Channel manager
//!
//! Channel writes never touch tag or property records. They do check that
//! every referenced tag and property exists, and they stamp embedded
//! references with the canonical owner.

use cfql::QueryParams;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::bulk::{BulkBatch, BulkWriter};
use crate::config::DirectoryConfig;
use crate::error::{Error, Result};
use crate::query::{ResultExecutor, SearchResult};
use crate::storage::backend::SearchBackend;
use crate::storage::collection::Collection;
use crate::storage::document::{Channel, Property, Tag};
use crate::validation;

#[derive(Clone)]
pub struct ChannelManager {
    channels: Collection<Channel>,
    tags: Collection<Tag>,
    properties: Collection<Property>,
    executor: ResultExecutor,
    writer: BulkWriter,
}

impl ChannelManager {
    pub fn new(backend: Arc<dyn SearchBackend>, config: Arc<DirectoryConfig>) -> Self {
        Self {
            channels: Collection::open(Arc::clone(&backend), config.channel_index.clone(), config.query_size),
            tags: Collection::open(Arc::clone(&backend), config.tag_index.clone(), config.query_size),
            properties: Collection::open(
                Arc::clone(&backend),
                config.property_index.clone(),
                config.query_size,
            ),
            executor: ResultExecutor::new(Arc::clone(&backend), config),
            writer: BulkWriter::new(backend),
        }
    }

    pub fn collection(&self) -> &Collection<Channel> {
        &self.channels
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn read(&self, name: &str) -> Result<Channel> {
        self.channels.require(name).await
    }

    pub async fn query(&self, params: &QueryParams) -> Result<Vec<Channel>> {
        self.executor.query(params).await
    }

    pub async fn count(&self, params: &QueryParams) -> Result<u64> {
        self.executor.query_count(params).await
    }

    pub async fn search(&self, params: &QueryParams) -> Result<SearchResult> {
        self.executor.query_search(params).await
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// PUT: create or replace `name`
    pub async fn create(&self, name: &str, channel: Channel) -> Result<Channel> {
        if channel.name != name {
            return Err(Error::NameMismatch {
                kind: "channel",
                requested: name.to_string(),
                payload: channel.name,
            });
        }
        let mut prepared = self.prepare(vec![channel]).await?;
        let channel = prepared.pop().ok_or_else(|| Error::Other("empty channel batch".into()))?;

        let stored = self.channels.put(&channel).await?;
        tracing::info!("Created channel '{}' owned by {}", stored.name, stored.owner);
        Ok(stored)
    }

    /// PUT many: create or replace each, one batch
    pub async fn create_many(&self, channels: Vec<Channel>) -> Result<Vec<Channel>> {
        let prepared = self.prepare(channels).await?;
        let stored = self.channels.put_all(&prepared).await?;
        tracing::info!("Created {} channels", stored.len());
        Ok(stored)
    }

    /// POST: merge into the existing channel, renaming it when the payload
    /// carries a different name
    pub async fn update(&self, name: &str, payload: Channel) -> Result<Channel> {
        let mut merged = self.read(name).await?;
        merged.merge(&payload);
        let new_name = if payload.name.is_empty() {
            name.to_string()
        } else {
            payload.name.clone()
        };
        merged.name = new_name.clone();

        let mut prepared = self.prepare(vec![merged]).await?;
        let channel = prepared.pop().ok_or_else(|| Error::Other("empty channel batch".into()))?;

        let mut batch = BulkBatch::new();
        if new_name != name {
            batch.push(self.channels.delete_op(name));
            tracing::info!("Renaming channel '{}' to '{}'", name, new_name);
        }
        batch.push(self.channels.index_op(&channel)?);
        self.writer.execute(batch).await?;
        Ok(channel)
    }

    /// POST many: merge each payload into its existing channel, creating
    /// channels that do not exist yet
    pub async fn update_many(&self, payloads: Vec<Channel>) -> Result<Vec<Channel>> {
        let names: Vec<String> = payloads.iter().map(|c| c.name.clone()).collect();
        let mut existing: BTreeMap<String, Channel> = self
            .channels
            .find_all_by_id(&names)
            .await?
            .into_iter()
            .map(|c| (c.name.clone(), c))
            .collect();

        let merged = payloads
            .into_iter()
            .map(|payload| match existing.remove(&payload.name) {
                Some(mut channel) => {
                    channel.merge(&payload);
                    channel
                }
                None => payload,
            })
            .collect();

        let prepared = self.prepare(merged).await?;
        let stored = self.channels.put_all(&prepared).await?;
        tracing::info!("Updated {} channels", stored.len());
        Ok(stored)
    }

    /// Delete a channel; tags and properties are left as they are
    pub async fn remove(&self, name: &str) -> Result<()> {
        if !self.channels.delete(name).await? {
            return Err(Error::ChannelNotFound {
                name: name.to_string(),
            });
        }
        tracing::info!("Deleted channel '{}'", name);
        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Validate, dedup, and stamp canonical owners onto embedded references
    ///
    /// Later payloads for the same channel name replace earlier ones.
    async fn prepare(&self, channels: Vec<Channel>) -> Result<Vec<Channel>> {
        let mut by_name: BTreeMap<String, Channel> = BTreeMap::new();
        for mut channel in channels {
            validation::validate_name("channel", &channel.name)?;
            validation::validate_owner("channel", &channel.name, &channel.owner)?;
            channel.dedup();
            for property in &channel.properties {
                validation::validate_property_value(
                    &property.name,
                    &channel.name,
                    Some(property.value.as_str()),
                )?;
            }
            by_name.insert(channel.name.clone(), channel);
        }

        let tag_names: BTreeSet<String> = by_name
            .values()
            .flat_map(|c| c.tags.iter().map(|t| t.name.clone()))
            .collect();
        let property_names: BTreeSet<String> = by_name
            .values()
            .flat_map(|c| c.properties.iter().map(|p| p.name.clone()))
            .collect();

        let tag_owners = self.canonical_owners(&self.tags, &tag_names).await?;
        if let Some(name) = tag_names.iter().find(|n| !tag_owners.contains_key(*n)) {
            return Err(Error::TagNotFound { name: name.clone() });
        }
        let property_owners = self.canonical_owners(&self.properties, &property_names).await?;
        if let Some(name) = property_names.iter().find(|n| !property_owners.contains_key(*n)) {
            return Err(Error::PropertyNotFound { name: name.clone() });
        }

        Ok(by_name
            .into_values()
            .map(|mut channel| {
                for tag in &mut channel.tags {
                    if let Some(owner) = tag_owners.get(&tag.name) {
                        tag.owner = owner.clone();
                    }
                }
                for property in &mut channel.properties {
                    if let Some(owner) = property_owners.get(&property.name) {
                        property.owner = owner.clone();
                    }
                }
                channel
            })
            .collect())
    }

    async fn canonical_owners<T>(
        &self,
        collection: &Collection<T>,
        names: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, String>>
    where
        T: crate::consistency::Attribute,
    {
        let ids: Vec<String> = names.iter().cloned().collect();
        Ok(collection
            .find_all_by_id(&ids)
            .await?
            .into_iter()
            .map(|r| (r.name().to_string(), r.owner().to_string()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::document::{PropertyRef, TagRef};
    use crate::storage::memory::MemoryBackend;

    async fn make_manager() -> ChannelManager {
        let backend: Arc<dyn SearchBackend> = Arc::new(MemoryBackend::new());
        let config = Arc::new(DirectoryConfig::default());
        let manager = ChannelManager::new(backend, config);
        manager.tags.put(&Tag::new("t1", "tag-owner")).await.unwrap();
        manager
            .properties
            .put(&Property::new("domain", "prop-owner"))
            .await
            .unwrap();
        manager
    }

    #[tokio::test]
    async fn test_create_stamps_canonical_owners() {
        let manager = make_manager().await;
        let channel = Channel::new("ch1", "o1")
            .with_tag(TagRef::new("t1", "whoever"))
            .with_property(PropertyRef::new("domain", "", "cryo"));

        let stored = manager.create("ch1", channel).await.unwrap();
        assert_eq!(stored.tag("t1").unwrap().owner, "tag-owner");
        assert_eq!(stored.property("domain").unwrap().owner, "prop-owner");
        assert_eq!(manager.read("ch1").await.unwrap(), stored);
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_references() {
        let manager = make_manager().await;
        let err = manager
            .create("ch1", Channel::new("ch1", "o1").with_tag(TagRef::new("nope", "o1")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TagNotFound { .. }));

        let err = manager
            .create(
                "ch1",
                Channel::new("ch1", "o1").with_property(PropertyRef::new("nope", "o1", "v")),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PropertyNotFound { .. }));
    }

    #[tokio::test]
    async fn test_create_validates_shape() {
        let manager = make_manager().await;
        assert!(matches!(
            manager.create("ch1", Channel::new("ch1", "")).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            manager
                .create("ch1", Channel::new("ch1", "o1").with_property(PropertyRef::new("domain", "o1", "")))
                .await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            manager.create("ch1", Channel::new("ch2", "o1")).await,
            Err(Error::NameMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_merges() {
        let manager = make_manager().await;
        manager
            .create("ch1", Channel::new("ch1", "o1").with_tag(TagRef::new("t1", "")))
            .await
            .unwrap();
        let updated = manager
            .update(
                "ch1",
                Channel::new("ch1", "").with_property(PropertyRef::new("domain", "", "rf")),
            )
            .await
            .unwrap();
        assert_eq!(updated.owner, "o1");
        assert!(updated.has_tag("t1"));
        assert_eq!(updated.property("domain").unwrap().value, "rf");
    }

    #[tokio::test]
    async fn test_update_renames() {
        let manager = make_manager().await;
        manager.create("ch1", Channel::new("ch1", "o1")).await.unwrap();
        manager.update("ch1", Channel::new("ch9", "")).await.unwrap();
        assert!(matches!(manager.read("ch1").await, Err(Error::ChannelNotFound { .. })));
        assert_eq!(manager.read("ch9").await.unwrap().owner, "o1");
    }

    #[tokio::test]
    async fn test_update_many_creates_missing() {
        let manager = make_manager().await;
        manager.create("a", Channel::new("a", "o1")).await.unwrap();
        let stored = manager
            .update_many(vec![
                Channel::new("a", "").with_tag(TagRef::new("t1", "")),
                Channel::new("b", "o2"),
            ])
            .await
            .unwrap();
        assert_eq!(stored.len(), 2);
        assert!(manager.read("a").await.unwrap().has_tag("t1"));
        assert_eq!(manager.read("b").await.unwrap().owner, "o2");
    }

    #[tokio::test]
    async fn test_remove() {
        let manager = make_manager().await;
        manager.create("ch1", Channel::new("ch1", "o1")).await.unwrap();
        manager.remove("ch1").await.unwrap();
        assert!(matches!(manager.remove("ch1").await, Err(Error::ChannelNotFound { .. })));
        // Tag record untouched
        assert!(manager.tags.exists("t1").await.unwrap());
    }

    #[tokio::test]
    async fn test_query_passthrough() {
        let manager = make_manager().await;
        manager
            .create_many(vec![
                Channel::new("a", "o1").with_tag(TagRef::new("t1", "")),
                Channel::new("b", "o1"),
            ])
            .await
            .unwrap();
        let params = QueryParams::parse("~tag=t1");
        assert_eq!(manager.count(&params).await.unwrap(), 1);
        assert_eq!(manager.query(&params).await.unwrap()[0].name, "a");
        assert_eq!(manager.search(&params).await.unwrap().count, 1);
    }
}
