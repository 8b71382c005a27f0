//! Open-time configuration for storage engines.

use serde::{Deserialize, Serialize};

/// Options applied when a store is opened.
///
/// Field names deserialize in camelCase (`createIfMissing`, `writeBufferSize`,
/// ...). Missing fields take their documented defaults and unknown fields are
/// rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct OpenOptions {
    /// Create the store if it does not exist. Default: false.
    pub create_if_missing: bool,
    /// Fail if the store already exists. Default: false.
    pub error_if_exists: bool,
    /// Aggressively check data integrity and fail early on any corruption.
    /// Default: false.
    pub paranoid_checks: bool,
    /// Bytes buffered in memory before a flush to sorted tables.
    /// Default: 4 MiB.
    pub write_buffer_size: usize,
    /// Number of open files the engine may hold. Default: 1000.
    pub max_open_files: usize,
    /// Approximate size of user data packed per block. Default: 4096.
    pub block_size: usize,
    /// Keys between restart points for delta encoding. Default: 16.
    pub block_restart_interval: usize,
    /// Compress blocks. Default: true.
    pub compression: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            create_if_missing: false,
            error_if_exists: false,
            paranoid_checks: false,
            write_buffer_size: 4 * 1024 * 1024,
            max_open_files: 1000,
            block_size: 4096,
            block_restart_interval: 16,
            compression: true,
        }
    }
}

impl OpenOptions {
    /// Default options with `create_if_missing` set.
    pub fn create() -> Self {
        Self {
            create_if_missing: true,
            ..Self::default()
        }
    }
}
