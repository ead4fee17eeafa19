//! Configuration types for FuseTree Core

use serde::{Deserialize, Serialize};

/// Kernel cache policy settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CachePolicy {
    pub attr_ttl_ms: u32,
    pub entry_ttl_ms: u32,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            attr_ttl_ms: 1000,
            entry_ttl_ms: 1000,
        }
    }
}

/// Main filesystem configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FsConfig {
    /// Name reported to the kernel as the filesystem source.
    pub fsname: String,
    pub cache: CachePolicy,
    /// Trace every dispatched operation at debug level.
    pub log_operations: bool,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            fsname: "fusetree".to_string(),
            cache: CachePolicy::default(),
            log_operations: true,
        }
    }
}

impl FsConfig {
    /// Parse a JSON configuration document; missing fields take their defaults.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
