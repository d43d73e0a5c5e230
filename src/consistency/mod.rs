//! Denormalization consistency
//!
//! Tags and properties are stored twice: once as canonical records, and
//! once per member channel as embedded references. This module keeps the
//! two in step, computing membership deltas and turning them into one
//! grouped bulk batch per request.

mod attribute;
mod channels;
mod delta;
mod edits;
mod manager;

pub use attribute::{validate_record, Attribute};
pub use channels::ChannelManager;
pub use delta::MembershipDelta;
pub use edits::{ChannelEdit, ChannelEdits};
pub use manager::{AttributeManager, PropertyManager, TagManager};
