mod file_config;

pub use file_config::{FileConfig, InboxConfig};

use std::time::Duration;

use anyhow::{bail, Result};

use crate::inbox::{DEFAULT_BACKEND_TIMEOUT, DEFAULT_PAGE_SIZE};

/// Default analytics category for inbox events.
pub const DEFAULT_ANALYTICS_CATEGORY: &str = "notification_inbox";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub page_size: usize,
    pub analytics_category: String,
    pub backend_timeout_secs: u64,
    pub print_metrics: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            analytics_category: DEFAULT_ANALYTICS_CATEGORY.to_string(),
            backend_timeout_secs: DEFAULT_BACKEND_TIMEOUT.as_secs(),
            print_metrics: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub print_metrics: bool,
    pub inbox: InboxSettings,
}

/// Settings of one inbox engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboxSettings {
    pub page_size: usize,
    pub analytics_category: String,
    /// Backend calls still pending after this long are failed.
    pub backend_timeout: Duration,
}

impl Default for InboxSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            analytics_category: DEFAULT_ANALYTICS_CATEGORY.to_string(),
            backend_timeout: DEFAULT_BACKEND_TIMEOUT,
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let print_metrics = file.print_metrics.unwrap_or(cli.print_metrics);

        let inbox_file = file.inbox.unwrap_or_default();
        let page_size = inbox_file.page_size.unwrap_or(cli.page_size);
        if page_size == 0 {
            bail!("page_size must be greater than zero");
        }

        let analytics_category = inbox_file
            .analytics_category
            .unwrap_or_else(|| cli.analytics_category.clone());
        if analytics_category.trim().is_empty() {
            bail!("analytics_category must not be empty");
        }

        let backend_timeout_secs = inbox_file
            .backend_timeout_secs
            .unwrap_or(cli.backend_timeout_secs);
        if backend_timeout_secs == 0 {
            bail!("backend_timeout_secs must be greater than zero");
        }

        Ok(Self {
            print_metrics,
            inbox: InboxSettings {
                page_size,
                analytics_category,
                backend_timeout: Duration::from_secs(backend_timeout_secs),
            },
        })
    }
}
