//! Per-channel edit grouping
//!
//! Every tag/property change destined for one channel is collected into a
//! single [`ChannelEdit`], so a request touching the same channel several
//! times produces exactly one document mutation for it.

use std::collections::{BTreeMap, BTreeSet};

use crate::bulk::BulkBatch;
use crate::error::{Error, Result};
use crate::storage::collection::Collection;
use crate::storage::document::{Channel, PropertyRef, TagRef};

/// Pending changes to one channel's embedded references
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelEdit {
    pub remove_tags: BTreeSet<String>,
    pub put_tags: BTreeMap<String, TagRef>,
    pub remove_properties: BTreeSet<String>,
    pub put_properties: BTreeMap<String, PropertyRef>,
}

impl ChannelEdit {
    /// Removals first, then replace-by-key insertions
    pub fn apply(&self, channel: &mut Channel) {
        for name in &self.remove_tags {
            channel.remove_tag(name);
        }
        for name in &self.remove_properties {
            channel.remove_property(name);
        }
        for tag in self.put_tags.values() {
            channel.add_tag(tag.clone());
        }
        for property in self.put_properties.values() {
            channel.add_property(property.clone());
        }
    }

    /// True when the edit only takes references away
    pub fn is_removal_only(&self) -> bool {
        self.put_tags.is_empty() && self.put_properties.is_empty()
    }
}

/// Edits for many channels, keyed by channel name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelEdits {
    edits: BTreeMap<String, ChannelEdit>,
}

impl ChannelEdits {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, channel: &str) -> &mut ChannelEdit {
        self.edits.entry(channel.to_string()).or_default()
    }

    pub fn put_tag(&mut self, channel: &str, tag: TagRef) {
        let edit = self.entry(channel);
        edit.remove_tags.remove(&tag.name);
        edit.put_tags.insert(tag.name.clone(), tag);
    }

    pub fn remove_tag(&mut self, channel: &str, tag: &str) {
        let edit = self.entry(channel);
        edit.put_tags.remove(tag);
        edit.remove_tags.insert(tag.to_string());
    }

    pub fn put_property(&mut self, channel: &str, property: PropertyRef) {
        let edit = self.entry(channel);
        edit.remove_properties.remove(&property.name);
        edit.put_properties.insert(property.name.clone(), property);
    }

    pub fn remove_property(&mut self, channel: &str, property: &str) {
        let edit = self.entry(channel);
        edit.put_properties.remove(property);
        edit.remove_properties.insert(property.to_string());
    }

    pub fn get(&self, channel: &str) -> Option<&ChannelEdit> {
        self.edits.get(channel)
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.edits.keys().cloned().collect()
    }

    /// Number of channels touched
    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Read the touched channels and build one update per changed channel
    ///
    /// A channel that must gain a reference but does not exist is an error.
    /// A channel that only loses references and is already gone is skipped.
    pub async fn into_batch(self, channels: &Collection<Channel>) -> Result<BulkBatch> {
        let mut batch = BulkBatch::new();
        if self.edits.is_empty() {
            return Ok(batch);
        }

        let mut current: BTreeMap<String, Channel> = channels
            .find_all_by_id(&self.channel_names())
            .await?
            .into_iter()
            .map(|c| (c.name.clone(), c))
            .collect();

        for (name, edit) in &self.edits {
            let Some(mut channel) = current.remove(name) else {
                if edit.is_removal_only() {
                    continue;
                }
                return Err(Error::ChannelNotFound { name: name.clone() });
            };

            let before = channel.clone();
            edit.apply(&mut channel);
            if channel != before {
                batch.push(channels.update_op(&channel)?);
            }
        }
        Ok(batch)
    }
}
