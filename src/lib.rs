//! chanfind - Channel Directory
//!
//! A directory of named data channels. Each channel has an owner, a set of
//! tags and a set of key/value properties, and is found again through
//! pattern queries.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Directory                               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐  ┌─────────────────────────────────────────┐   │
//! │  │   CFQL      │  │   Consistency                           │   │
//! │  │   Compiler  │  │   (Channel / Tag / Property managers,   │   │
//! │  │             │  │    membership deltas, per-channel edits)│   │
//! │  └──────┬──────┘  └──────────┬──────────────────┬───────────┘   │
//! │         │                    │                  │               │
//! │         ▼                    ▼                  ▼               │
//! │  ┌─────────────────────────────────┐  ┌─────────────────────┐   │
//! │  │   Query                         │  │   Bulk Writer       │   │
//! │  │   (list / count / scroll)       │  │   (per-item results)│   │
//! │  └──────────────┬──────────────────┘  └──────────┬──────────┘   │
//! │                 │                                │              │
//! │                 ▼                                ▼              │
//! │  ┌─────────────────────────────────────────────────────────────┐│
//! │  │              SearchBackend (async trait)                    ││
//! │  │   channelfinder: Channel   cf_tags: Tag   cf_properties     ││
//! │  └─────────────────────────────────────────────────────────────┘│
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod bulk;
pub mod config;
pub mod consistency;
pub mod error;
pub mod query;
pub mod storage;
pub mod validation;

pub use config::DirectoryConfig;
pub use error::{Error, ErrorKind, Result};

pub use consistency::{ChannelManager, PropertyManager, TagManager};
pub use query::{ResultExecutor, ScrollManager, ScrollPage, SearchResult};
pub use storage::backend::{BackendError, SearchBackend};
pub use storage::collection::Collection;
pub use storage::document::{Channel, Property, PropertyRef, Tag, TagRef};
pub use storage::memory::MemoryBackend;

use std::sync::Arc;

/// The main directory handle
///
/// Cheap to clone; every component shares the same backend and config.
#[derive(Clone)]
pub struct Directory {
    backend: Arc<dyn SearchBackend>,
    config: Arc<DirectoryConfig>,
    executor: ResultExecutor,
    scroll: ScrollManager,
    channels: ChannelManager,
    tags: TagManager,
    properties: PropertyManager,
}

impl Directory {
    pub fn new(backend: Arc<dyn SearchBackend>, config: DirectoryConfig) -> Self {
        let config = Arc::new(config);
        Self {
            executor: ResultExecutor::new(Arc::clone(&backend), Arc::clone(&config)),
            scroll: ScrollManager::new(Arc::clone(&backend), &config),
            channels: ChannelManager::new(Arc::clone(&backend), Arc::clone(&config)),
            tags: TagManager::for_tags(Arc::clone(&backend), Arc::clone(&config)),
            properties: PropertyManager::for_properties(Arc::clone(&backend), Arc::clone(&config)),
            backend,
            config,
        }
    }

    /// A directory over a fresh in-memory backend
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()), DirectoryConfig::default())
    }

    pub fn backend(&self) -> &Arc<dyn SearchBackend> {
        &self.backend
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    pub fn executor(&self) -> &ResultExecutor {
        &self.executor
    }

    pub fn scroll(&self) -> &ScrollManager {
        &self.scroll
    }

    pub fn channels(&self) -> &ChannelManager {
        &self.channels
    }

    pub fn tags(&self) -> &TagManager {
        &self.tags
    }

    pub fn properties(&self) -> &PropertyManager {
        &self.properties
    }
}
