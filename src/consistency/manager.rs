//! Tag and property managers
//!
//! Canonical records and the references embedded in channels are written
//! in one bulk batch per request. Current membership is always read from
//! the channel documents themselves.
//!
//! | Operation      | Membership effect                                   |
//! |----------------|-----------------------------------------------------|
//! | `create`       | payload channels become the exact member set        |
//! | `update`       | payload channels are added; owner change refreshed  |
//! | `update` (new name) | old name stripped, new name on old/payload set |
//! | `remove`       | stripped from every member                          |

use std::collections::BTreeMap;
use std::sync::Arc;

use super::attribute::{validate_record, Attribute};
use super::delta::MembershipDelta;
use super::edits::ChannelEdits;
use crate::bulk::{BulkBatch, BulkSummary, BulkWriter};
use crate::config::DirectoryConfig;
use crate::error::{Error, Result};
use crate::query::ResultExecutor;
use crate::storage::backend::SearchBackend;
use crate::storage::collection::Collection;
use crate::storage::document::{Channel, Property, Tag};

/// Propagating manager for one attribute kind
#[derive(Clone)]
pub struct AttributeManager<A: Attribute> {
    records: Collection<A>,
    channels: Collection<Channel>,
    executor: ResultExecutor,
    writer: BulkWriter,
}

pub type TagManager = AttributeManager<Tag>;
pub type PropertyManager = AttributeManager<Property>;

impl TagManager {
    pub fn for_tags(backend: Arc<dyn SearchBackend>, config: Arc<DirectoryConfig>) -> Self {
        let index = config.tag_index.clone();
        Self::new(backend, config, index)
    }
}

impl PropertyManager {
    pub fn for_properties(backend: Arc<dyn SearchBackend>, config: Arc<DirectoryConfig>) -> Self {
        let index = config.property_index.clone();
        Self::new(backend, config, index)
    }
}

impl<A: Attribute> AttributeManager<A> {
    pub fn new(backend: Arc<dyn SearchBackend>, config: Arc<DirectoryConfig>, index: String) -> Self {
        Self {
            records: Collection::open(Arc::clone(&backend), index, config.query_size),
            channels: Collection::open(
                Arc::clone(&backend),
                config.channel_index.clone(),
                config.query_size,
            ),
            executor: ResultExecutor::new(Arc::clone(&backend), config),
            writer: BulkWriter::new(backend),
        }
    }

    pub fn records(&self) -> &Collection<A> {
        &self.records
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Every canonical record, without channels
    pub async fn list(&self) -> Result<Vec<A>> {
        self.records.list_all().await
    }

    /// One record, optionally with its member channels
    pub async fn read(&self, name: &str, with_channels: bool) -> Result<A> {
        let mut record = self.records.require(name).await?;
        if with_channels {
            let members = self.executor.members(&A::member_predicate(name)).await?;
            record.set_channels(members);
        }
        Ok(record)
    }

    /// Channel name → the reference it currently carries for `name`
    pub async fn current_members(&self, name: &str) -> Result<BTreeMap<String, A::Ref>> {
        let members = self.executor.members(&A::member_predicate(name)).await?;
        Ok(members
            .iter()
            .filter_map(|c| A::current_ref(c, name).map(|r| (c.name.clone(), r)))
            .collect())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// PUT: create or replace `name`; payload channels become its members
    pub async fn create(&self, name: &str, record: A) -> Result<A> {
        check_name::<A>(name, &record)?;
        self.validate(&record).await?;

        let mut edits = ChannelEdits::new();
        let mut batch = BulkBatch::new();
        self.stage_replace(&record, &mut edits).await?;
        batch.push(self.records.index_op(&record)?);

        self.submit(batch, edits).await?;
        tracing::info!("Created {} '{}' owned by {}", A::KIND, name, record.owner());
        self.read(name, true).await
    }

    /// PUT many: each record replaces its own membership
    ///
    /// All channel edits are grouped by channel, so two records landing on
    /// the same channel produce one mutation for it.
    pub async fn create_many(&self, records: Vec<A>) -> Result<Vec<A>> {
        let records = dedup_by_name(records);
        for record in records.values() {
            self.validate(record).await?;
        }

        let mut edits = ChannelEdits::new();
        let mut batch = BulkBatch::new();
        for record in records.values() {
            self.stage_replace(record, &mut edits).await?;
            batch.push(self.records.index_op(record)?);
        }

        self.submit(batch, edits).await?;
        tracing::info!("Created {} {} records", records.len(), A::KIND);
        self.read_all(records.keys()).await
    }

    /// Assign `name` to a single channel
    pub async fn add_single(&self, name: &str, channel: &str, payload: &A) -> Result<A> {
        check_name::<A>(name, payload)?;
        let canonical = self.records.require(name).await?;
        self.require_channel(channel).await?;

        let mut edits = ChannelEdits::new();
        A::put_edit(&mut edits, channel, canonical.single_ref(payload, channel)?);
        self.submit(BulkBatch::new(), edits).await?;

        tracing::info!("Added {} '{}' to channel '{}'", A::KIND, name, channel);
        Ok(canonical)
    }

    /// POST: add payload channels, refresh owner, rename when the payload
    /// carries a different name
    pub async fn update(&self, name: &str, payload: A) -> Result<A> {
        let existing = self.records.require(name).await?;

        let new_name = if payload.name().is_empty() {
            name.to_string()
        } else {
            payload.name().to_string()
        };
        let owner = if payload.owner().is_empty() {
            existing.owner().to_string()
        } else {
            payload.owner().to_string()
        };

        let mut record = payload;
        record.set_name(new_name.clone());
        record.set_owner(owner.clone());
        self.validate(&record).await?;

        let desired = record.payload_members()?;
        let current = self.current_members(name).await?;
        let mut edits = ChannelEdits::new();
        let mut batch = BulkBatch::new();

        if new_name != name {
            // Old members follow the rename unless the payload names the members itself
            let target: BTreeMap<String, A::Ref> = if desired.is_empty() {
                current
                    .iter()
                    .map(|(channel, r)| (channel.clone(), A::rebind(r, &new_name, &owner)))
                    .collect()
            } else {
                desired
            };
            for channel in current.keys() {
                A::remove_edit(&mut edits, channel, name);
            }
            // The new name may already be in use; its membership is replaced
            let taken = self.current_members(&new_name).await?;
            stage_delta::<A>(&mut edits, &new_name, &MembershipDelta::replace(&taken, &target));
            batch.push(self.records.delete_op(name));
            batch.push(self.records.index_op(&record)?);
            tracing::info!("Renamed {} '{}' to '{}'", A::KIND, name, new_name);
        } else {
            let delta = MembershipDelta::merge(&current, &desired)
                .refresh_others(&current, |r| A::rebind(r, &new_name, &owner));
            tracing::info!(
                "Updating {} '{}': {} added, {} refreshed",
                A::KIND,
                name,
                delta.to_add.len(),
                delta.to_refresh.len()
            );
            stage_delta::<A>(&mut edits, name, &delta);
            batch.push(self.records.index_op(&record)?);
        }

        self.submit(batch, edits).await?;
        self.read(&new_name, true).await
    }

    /// POST many: incremental adds; records that already exist keep their
    /// owner, new ones are created
    pub async fn update_many(&self, records: Vec<A>) -> Result<Vec<A>> {
        let records = dedup_by_name(records);
        let mut edits = ChannelEdits::new();
        let mut batch = BulkBatch::new();

        for (name, record) in &records {
            let mut record = record.clone();
            match self.records.get(name).await? {
                Some(existing) => record.set_owner(existing.owner().to_string()),
                None => {
                    batch.push(self.records.index_op(&record)?);
                }
            }
            self.validate(&record).await?;

            let desired = record.payload_members()?;
            let current = self.current_members(name).await?;
            stage_delta::<A>(&mut edits, name, &MembershipDelta::merge(&current, &desired));
        }

        self.submit(batch, edits).await?;
        tracing::info!("Updated {} {} records", records.len(), A::KIND);
        self.read_all(records.keys()).await
    }

    /// Delete `name` and strip it from every member channel
    pub async fn remove(&self, name: &str) -> Result<()> {
        self.records.require(name).await?;
        let current = self.current_members(name).await?;

        let mut edits = ChannelEdits::new();
        stage_delta::<A>(&mut edits, name, &MembershipDelta::strip(&current));
        let mut batch = BulkBatch::new();
        batch.push(self.records.delete_op(name));

        self.submit(batch, edits).await?;
        tracing::info!("Deleted {} '{}' from {} channels", A::KIND, name, current.len());
        Ok(())
    }

    /// Take `name` off one channel
    pub async fn remove_single(&self, name: &str, channel: &str) -> Result<()> {
        self.records.require(name).await?;
        self.require_channel(channel).await?;

        let mut edits = ChannelEdits::new();
        A::remove_edit(&mut edits, channel, name);
        self.submit(BulkBatch::new(), edits).await?;

        tracing::info!("Removed {} '{}' from channel '{}'", A::KIND, name, channel);
        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Name, owner, and every payload channel exists
    async fn validate(&self, record: &A) -> Result<()> {
        validate_record(record)?;
        let names: Vec<String> = record.channels().iter().map(|c| c.name.clone()).collect();
        if let Some(name) = self.channels.missing(&names).await?.into_iter().next() {
            return Err(Error::ChannelNotFound { name });
        }
        Ok(())
    }

    async fn require_channel(&self, channel: &str) -> Result<()> {
        if self.channels.exists(channel).await? {
            Ok(())
        } else {
            Err(Error::ChannelNotFound {
                name: channel.to_string(),
            })
        }
    }

    async fn stage_replace(&self, record: &A, edits: &mut ChannelEdits) -> Result<()> {
        let desired = record.payload_members()?;
        let current = self.current_members(record.name()).await?;
        let delta = MembershipDelta::replace(&current, &desired);
        tracing::info!(
            "Replacing {} '{}' membership: {} added, {} removed, {} refreshed",
            A::KIND,
            record.name(),
            delta.to_add.len(),
            delta.to_remove.len(),
            delta.to_refresh.len()
        );
        stage_delta::<A>(edits, record.name(), &delta);
        Ok(())
    }

    async fn submit(&self, mut batch: BulkBatch, edits: ChannelEdits) -> Result<BulkSummary> {
        batch.append(edits.into_batch(&self.channels).await?);
        self.writer.execute(batch).await
    }

    async fn read_all<'a>(&self, names: impl Iterator<Item = &'a String>) -> Result<Vec<A>> {
        let mut result = Vec::new();
        for name in names {
            result.push(self.read(name, true).await?);
        }
        Ok(result)
    }
}

fn check_name<A: Attribute>(requested: &str, record: &A) -> Result<()> {
    if record.name() == requested {
        Ok(())
    } else {
        Err(Error::NameMismatch {
            kind: A::KIND,
            requested: requested.to_string(),
            payload: record.name().to_string(),
        })
    }
}

fn stage_delta<A: Attribute>(edits: &mut ChannelEdits, name: &str, delta: &MembershipDelta<A::Ref>) {
    for channel in &delta.to_remove {
        A::remove_edit(edits, channel, name);
    }
    for (channel, r) in delta.upserts() {
        A::put_edit(edits, channel, r.clone());
    }
}

/// Last record per name wins
fn dedup_by_name<A: Attribute>(records: Vec<A>) -> BTreeMap<String, A> {
    records
        .into_iter()
        .map(|r| (r.name().to_string(), r))
        .collect()
}
