use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub print_metrics: Option<bool>,

    // Feature configs
    pub inbox: Option<InboxConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct InboxConfig {
    /// Notifications requested per "load older" page
    pub page_size: Option<usize>,
    /// Category used for analytics events
    pub analytics_category: Option<String>,
    /// Seconds before a pending backend call is failed
    pub backend_timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
