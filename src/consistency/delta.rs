//! Membership deltas
//!
//! Membership maps a channel name to the embedded reference that channel
//! carries (or should carry) for one tag or property.

use std::collections::{BTreeMap, BTreeSet};

/// Channel changes needed to move from one membership to another
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipDelta<R> {
    /// Channels that must gain the reference
    pub to_add: BTreeMap<String, R>,
    /// Channels that must lose the reference
    pub to_remove: BTreeSet<String>,
    /// Members whose existing reference is stale (owner or value differs)
    pub to_refresh: BTreeMap<String, R>,
}

impl<R> Default for MembershipDelta<R> {
    fn default() -> Self {
        Self {
            to_add: BTreeMap::new(),
            to_remove: BTreeSet::new(),
            to_refresh: BTreeMap::new(),
        }
    }
}

impl<R: Clone + PartialEq> MembershipDelta<R> {
    /// PUT: `desired` alone decides membership
    pub fn replace(current: &BTreeMap<String, R>, desired: &BTreeMap<String, R>) -> Self {
        let mut delta = Self::merge(current, desired);
        delta.to_remove = current
            .keys()
            .filter(|name| !desired.contains_key(*name))
            .cloned()
            .collect();
        delta
    }

    /// POST: add `desired`, leave every other member alone
    pub fn merge(current: &BTreeMap<String, R>, desired: &BTreeMap<String, R>) -> Self {
        let mut delta = Self::default();
        for (name, wanted) in desired {
            match current.get(name) {
                None => {
                    delta.to_add.insert(name.clone(), wanted.clone());
                }
                Some(existing) if existing != wanted => {
                    delta.to_refresh.insert(name.clone(), wanted.clone());
                }
                Some(_) => {}
            }
        }
        delta
    }

    /// Delete: every current member loses the reference
    pub fn strip(current: &BTreeMap<String, R>) -> Self {
        Self {
            to_remove: current.keys().cloned().collect(),
            ..Self::default()
        }
    }

    /// Also rewrite members outside `desired` through `refresh`
    ///
    /// Used when the canonical owner changes: members the payload did not
    /// mention still need their copy of the owner brought up to date.
    pub fn refresh_others(mut self, current: &BTreeMap<String, R>, refresh: impl Fn(&R) -> R) -> Self {
        for (name, existing) in current {
            if self.to_add.contains_key(name)
                || self.to_refresh.contains_key(name)
                || self.to_remove.contains(name)
            {
                continue;
            }
            let updated = refresh(existing);
            if &updated != existing {
                self.to_refresh.insert(name.clone(), updated);
            }
        }
        self
    }

    /// Channels whose reference is written (added or refreshed)
    pub fn upserts(&self) -> impl Iterator<Item = (&String, &R)> {
        self.to_add.iter().chain(self.to_refresh.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty() && self.to_refresh.is_empty()
    }
}
