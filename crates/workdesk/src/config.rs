//! Core configuration

use serde::{Deserialize, Serialize};

/// Settings consumed by the resource services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Storage ceiling per user in bytes (default 10 GiB)
    #[serde(default = "default_storage_quota_bytes")]
    pub storage_quota_bytes: i64,

    /// Prefix for generated file download links
    #[serde(default = "default_download_url_prefix")]
    pub download_url_prefix: String,
}

fn default_storage_quota_bytes() -> i64 {
    10 * 1024 * 1024 * 1024
}

fn default_download_url_prefix() -> String {
    "/api/files".to_string()
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            storage_quota_bytes: default_storage_quota_bytes(),
            download_url_prefix: default_download_url_prefix(),
        }
    }
}

impl CoreConfig {
    pub fn with_storage_quota(mut self, bytes: i64) -> Self {
        self.storage_quota_bytes = bytes;
        self
    }
}
