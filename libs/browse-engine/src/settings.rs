use std::time::Duration;

use serde::Deserialize;

fn default_page_size() -> usize {
    20
}

fn default_admin_timeout_ms() -> u64 {
    10_000
}

fn default_read_timeout_ms() -> u64 {
    5_000
}

/// Tunables of the browsing facade (`[browse]` table of the config).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BrowseSettings {
    /// Page size of "latest messages" views.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Deadline of each admin / metadata call.
    #[serde(default = "default_admin_timeout_ms")]
    pub admin_timeout_ms: u64,
    /// Deadline of each per-partition read inside a page fetch.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

impl Default for BrowseSettings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            admin_timeout_ms: default_admin_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl BrowseSettings {
    pub fn admin_timeout(&self) -> Duration {
        Duration::from_millis(self.admin_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}
