//! Document representation
//!
//! Channels are the unit of storage and carry their own copies of tag and
//! property assignments ([`TagRef`], [`PropertyRef`]). Tags and properties
//! are canonical records holding only a name and an owner; their member
//! channels are derived from the channel documents on demand.

use serde::{Deserialize, Serialize};

/// A tag assignment embedded in a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRef {
    pub name: String,
    #[serde(default)]
    pub owner: String,
}

impl TagRef {
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
        }
    }
}

/// A property assignment embedded in a channel, with the channel's value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyRef {
    pub name: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub value: String,
}

impl PropertyRef {
    pub fn new(name: impl Into<String>, owner: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            value: value.into(),
        }
    }
}

/// A channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Unique name, also the document id
    pub name: String,

    #[serde(default)]
    pub owner: String,

    /// Unique by name
    #[serde(default)]
    pub tags: Vec<TagRef>,

    /// Unique by name
    #[serde(default)]
    pub properties: Vec<PropertyRef>,
}

impl Channel {
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            tags: Vec::new(),
            properties: Vec::new(),
        }
    }

    pub fn with_tag(mut self, tag: TagRef) -> Self {
        self.add_tag(tag);
        self
    }

    pub fn with_property(mut self, property: PropertyRef) -> Self {
        self.add_property(property);
        self
    }

    pub fn tag(&self, name: &str) -> Option<&TagRef> {
        self.tags.iter().find(|t| t.name == name)
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.tag(name).is_some()
    }

    pub fn property(&self, name: &str) -> Option<&PropertyRef> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Replace-by-key: drop any tag with the same name, then insert
    pub fn add_tag(&mut self, tag: TagRef) {
        self.tags.retain(|t| t.name != tag.name);
        self.tags.push(tag);
    }

    /// Returns true if a tag was removed
    pub fn remove_tag(&mut self, name: &str) -> bool {
        let before = self.tags.len();
        self.tags.retain(|t| t.name != name);
        self.tags.len() != before
    }

    /// Replace-by-key: drop any property with the same name, then insert
    pub fn add_property(&mut self, property: PropertyRef) {
        self.properties.retain(|p| p.name != property.name);
        self.properties.push(property);
    }

    pub fn remove_property(&mut self, name: &str) -> bool {
        let before = self.properties.len();
        self.properties.retain(|p| p.name != name);
        self.properties.len() != before
    }

    /// Collapse duplicate tag/property names, last entry wins
    pub fn dedup(&mut self) {
        for tag in std::mem::take(&mut self.tags) {
            self.add_tag(tag);
        }
        for property in std::mem::take(&mut self.properties) {
            self.add_property(property);
        }
    }

    /// Merge a POST payload into this channel
    ///
    /// A non-empty owner replaces the current one; tags and properties are
    /// added by key, existing entries not named in `update` are kept.
    pub fn merge(&mut self, update: &Channel) {
        if !update.owner.is_empty() {
            self.owner = update.owner.clone();
        }
        for tag in &update.tags {
            self.add_tag(tag.clone());
        }
        for property in &update.properties {
            self.add_property(property.clone());
        }
    }
}

/// A canonical tag record
///
/// `channels` is transient: filled only when a caller asks for members,
/// or carried in a payload to describe the desired membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,

    #[serde(default)]
    pub owner: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<Channel>,
}

impl Tag {
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            channels: Vec::new(),
        }
    }

    /// Builder: member channels by name
    pub fn with_channels<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels = names
            .into_iter()
            .map(|name| Channel::new(name, ""))
            .collect();
        self
    }

    /// The stored form: name and owner only
    pub fn canonical(&self) -> Tag {
        Tag::new(&self.name, &self.owner)
    }

    pub fn to_ref(&self) -> TagRef {
        TagRef::new(&self.name, &self.owner)
    }
}

/// A canonical property record
///
/// The value is per channel: a payload lists member channels each carrying
/// a [`PropertyRef`] for this property. `value` is only used when the
/// property is assigned to one channel at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,

    #[serde(default)]
    pub owner: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<Channel>,
}

impl Property {
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            value: None,
            channels: Vec::new(),
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Builder: member channels as `(channel, value)` pairs
    pub fn with_channel_values<I, C, V>(mut self, members: I) -> Self
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<String>,
    {
        let name = self.name.clone();
        let owner = self.owner.clone();
        self.channels = members
            .into_iter()
            .map(|(channel, value)| {
                Channel::new(channel, "").with_property(PropertyRef::new(&name, &owner, value))
            })
            .collect();
        self
    }

    /// The stored form: name and owner only
    pub fn canonical(&self) -> Property {
        Property::new(&self.name, &self.owner)
    }

    pub fn to_ref(&self, value: impl Into<String>) -> PropertyRef {
        PropertyRef::new(&self.name, &self.owner, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_add_tag_replaces_by_key() {
        let mut channel = Channel::new("ch1", "o1");
        channel.add_tag(TagRef::new("t1", "old"));
        channel.add_tag(TagRef::new("t1", "new"));
        assert_eq!(channel.tags, vec![TagRef::new("t1", "new")]);
    }

    #[test]
    fn test_remove_property() {
        let mut channel = Channel::new("ch1", "o1").with_property(PropertyRef::new("p", "o1", "v"));
        assert!(channel.remove_property("p"));
        assert!(!channel.remove_property("p"));
        assert!(channel.properties.is_empty());
    }

    #[test]
    fn test_merge_keeps_unmentioned_entries() {
        let mut channel = Channel::new("ch1", "o1")
            .with_tag(TagRef::new("t1", "o1"))
            .with_property(PropertyRef::new("p", "o1", "1"));
        let update = Channel::new("ch1", "")
            .with_tag(TagRef::new("t2", "o1"))
            .with_property(PropertyRef::new("p", "o1", "2"));

        channel.merge(&update);
        assert_eq!(channel.owner, "o1");
        assert!(channel.has_tag("t1") && channel.has_tag("t2"));
        assert_eq!(channel.property("p").map(|p| p.value.as_str()), Some("2"));
    }

    #[test]
    fn test_json_shapes() {
        let channel = Channel::new("ch1", "o1").with_tag(TagRef::new("t1", "o1"));
        assert_eq!(
            serde_json::to_value(&channel).unwrap(),
            json!({"name": "ch1", "owner": "o1", "tags": [{"name": "t1", "owner": "o1"}], "properties": []})
        );

        let tag = Tag::new("t1", "o1").with_channels(["ch1"]);
        assert_eq!(
            serde_json::to_value(tag.canonical()).unwrap(),
            json!({"name": "t1", "owner": "o1"})
        );
    }

    #[test]
    fn test_property_payload_members() {
        let property = Property::new("domain", "o1").with_channel_values([("ch1", "cryo")]);
        let member = &property.channels[0];
        assert_eq!(member.property("domain").map(|p| p.value.as_str()), Some("cryo"));
    }

    #[test]
    fn test_dedup_last_wins() {
        let mut channel = Channel::new("ch1", "o1");
        channel.tags = vec![TagRef::new("t1", "a"), TagRef::new("t1", "b")];
        channel.dedup();
        assert_eq!(channel.tags, vec![TagRef::new("t1", "b")]);
    }
}
