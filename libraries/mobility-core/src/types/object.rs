//! Object storage value types

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One listed object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntry {
    /// Object key
    pub key: String,
    /// Size in bytes
    pub size: u64,
}

impl ObjectEntry {
    /// Create a listing entry
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
        }
    }
}

/// One planned transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyItem {
    /// Key in the source bucket
    pub source_key: String,
    /// Key in the destination bucket
    pub destination_key: String,
    /// Size in bytes
    pub size: u64,
}

/// Emitted by `ObjectStorage::copy_batch` once per finished item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyEvent {
    /// Items copied successfully so far in this batch
    pub copied: usize,
    /// Items in this batch
    pub total: usize,
    /// Bytes copied successfully so far in this batch
    pub bytes_copied: u64,
    /// Source key of the item that just finished
    pub current_key: String,
    /// Set when the item failed
    pub error: Option<String>,
}

/// Outcome of a batched copy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchCopyResult {
    /// Items copied
    pub copied: usize,
    /// Items that failed
    pub failed: usize,
    /// Source keys of failed items, in completion order
    pub failed_keys: Vec<String>,
    /// Error messages, parallel to `failed_keys`
    pub errors: Vec<String>,
    /// Bytes copied
    pub total_bytes: u64,
    /// Whether the batch stopped early on cancellation
    pub cancelled: bool,
}

impl BatchCopyResult {
    /// First recorded failure as `key: error`
    pub fn first_error(&self) -> Option<String> {
        self.failed_keys
            .first()
            .zip(self.errors.first())
            .map(|(key, err)| format!("{key}: {err}"))
    }
}

/// Result of counting a prefix
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectCount {
    /// Objects under the prefix
    pub count: u64,
    /// Distinct date partitions, when requested
    pub dates: Option<BTreeSet<String>>,
}
