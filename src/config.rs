//! Directory configuration
//!
//! Loaded once from YAML and shared as an immutable `Arc<DirectoryConfig>`.
//!
//! ```yaml
//! channel_index: channelfinder
//! tag_index: cf_tags
//! property_index: cf_properties
//! query_size: 10000
//! max_result_window: 10000
//! scroll_page_size: 100
//! scroll_ttl_secs: 1800
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Index holding channel documents
    pub channel_index: String,
    /// Index holding canonical tags
    pub tag_index: String,
    /// Index holding canonical properties
    pub property_index: String,
    /// Default listing size when `~size` is absent
    pub query_size: usize,
    /// Largest `~from + ~size` a listing may reach
    pub max_result_window: usize,
    /// Scroll page size
    pub scroll_page_size: usize,
    /// Scroll cursor time-to-live, in seconds
    pub scroll_ttl_secs: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            channel_index: "channelfinder".to_string(),
            tag_index: "cf_tags".to_string(),
            property_index: "cf_properties".to_string(),
            query_size: 10_000,
            max_result_window: 10_000,
            scroll_page_size: 100,
            scroll_ttl_secs: 30 * 60,
        }
    }
}

impl DirectoryConfig {
    /// Load from a YAML file; absent keys keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::FileReadError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn scroll_ttl(&self) -> Duration {
        Duration::from_secs(self.scroll_ttl_secs)
    }
}
