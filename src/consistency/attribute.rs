//! What tags and properties have in common
//!
//! Both are canonical records whose membership lives in the channel
//! documents as embedded references. [`Attribute`] captures the parts that
//! differ (reference type, how a payload names its members) so one manager
//! can propagate either.

use cfql::Predicate;
use std::collections::BTreeMap;

use super::edits::ChannelEdits;
use crate::error::Result;
use crate::storage::collection::Entity;
use crate::storage::document::{Channel, Property, PropertyRef, Tag, TagRef};
use crate::validation::{self, ValidationError};

pub trait Attribute: Entity {
    /// The reference embedded in a channel
    type Ref: Clone + PartialEq + Send + Sync + std::fmt::Debug;

    fn name(&self) -> &str {
        self.id()
    }

    fn owner(&self) -> &str;

    fn set_owner(&mut self, owner: String);

    fn set_name(&mut self, name: String);

    /// Channels in the payload (or, after a read, the members)
    fn channels(&self) -> &[Channel];

    fn set_channels(&mut self, channels: Vec<Channel>);

    /// Channels carrying a reference named exactly `name`
    fn member_predicate(name: &str) -> Predicate;

    /// The reference `channel` carries for `name`, if any
    fn current_ref(channel: &Channel, name: &str) -> Option<Self::Ref>;

    /// Desired reference for each payload channel, owned by `self`
    fn payload_members(&self) -> Result<BTreeMap<String, Self::Ref>>;

    /// The reference to write when assigning `self` to one channel
    ///
    /// `payload` is the request body; it supplies the value for properties.
    fn single_ref(&self, payload: &Self, channel: &str) -> Result<Self::Ref>;

    /// Same reference under a new name and owner, keeping channel data
    fn rebind(reference: &Self::Ref, name: &str, owner: &str) -> Self::Ref;

    fn put_edit(edits: &mut ChannelEdits, channel: &str, reference: Self::Ref);

    fn remove_edit(edits: &mut ChannelEdits, channel: &str, name: &str);
}

impl Attribute for Tag {
    type Ref = TagRef;

    fn owner(&self) -> &str {
        &self.owner
    }

    fn set_owner(&mut self, owner: String) {
        self.owner = owner;
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn channels(&self) -> &[Channel] {
        &self.channels
    }

    fn set_channels(&mut self, channels: Vec<Channel>) {
        self.channels = channels;
    }

    fn member_predicate(name: &str) -> Predicate {
        Predicate::has_tag(name)
    }

    fn current_ref(channel: &Channel, name: &str) -> Option<TagRef> {
        channel.tag(name).cloned()
    }

    fn payload_members(&self) -> Result<BTreeMap<String, TagRef>> {
        Ok(self
            .channels
            .iter()
            .map(|c| (c.name.clone(), self.to_ref()))
            .collect())
    }

    fn single_ref(&self, _payload: &Self, _channel: &str) -> Result<TagRef> {
        Ok(self.to_ref())
    }

    fn rebind(_reference: &TagRef, name: &str, owner: &str) -> TagRef {
        TagRef::new(name, owner)
    }

    fn put_edit(edits: &mut ChannelEdits, channel: &str, reference: TagRef) {
        edits.put_tag(channel, reference);
    }

    fn remove_edit(edits: &mut ChannelEdits, channel: &str, name: &str) {
        edits.remove_tag(channel, name);
    }
}

impl Attribute for Property {
    type Ref = PropertyRef;

    fn owner(&self) -> &str {
        &self.owner
    }

    fn set_owner(&mut self, owner: String) {
        self.owner = owner;
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn channels(&self) -> &[Channel] {
        &self.channels
    }

    fn set_channels(&mut self, channels: Vec<Channel>) {
        self.channels = channels;
    }

    fn member_predicate(name: &str) -> Predicate {
        Predicate::has_property(name)
    }

    fn current_ref(channel: &Channel, name: &str) -> Option<PropertyRef> {
        channel.property(name).cloned()
    }

    /// Each payload channel must carry this property with a non-empty value
    fn payload_members(&self) -> Result<BTreeMap<String, PropertyRef>> {
        self.channels
            .iter()
            .map(|c| -> Result<(String, PropertyRef)> {
                let value = c.property(&self.name).map(|p| p.value.as_str());
                validation::validate_property_value(&self.name, &c.name, value)?;
                Ok((c.name.clone(), self.to_ref(value.unwrap_or_default())))
            })
            .collect()
    }

    fn single_ref(&self, payload: &Self, channel: &str) -> Result<PropertyRef> {
        let value = payload.value.as_deref();
        validation::validate_property_value(&self.name, channel, value)?;
        Ok(self.to_ref(value.unwrap_or_default()))
    }

    fn rebind(reference: &PropertyRef, name: &str, owner: &str) -> PropertyRef {
        PropertyRef::new(name, owner, reference.value.clone())
    }

    fn put_edit(edits: &mut ChannelEdits, channel: &str, reference: PropertyRef) {
        edits.put_property(channel, reference);
    }

    fn remove_edit(edits: &mut ChannelEdits, channel: &str, name: &str) {
        edits.remove_property(channel, name);
    }
}

/// Shape checks on a tag/property payload
pub fn validate_record<A: Attribute>(record: &A) -> std::result::Result<(), ValidationError> {
    validation::validate_name(A::KIND, record.name())?;
    validation::validate_owner(A::KIND, record.name(), record.owner())
}
