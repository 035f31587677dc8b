//! Per-date progress ledger types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Status of one date partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DayStatus {
    /// Nothing copied yet
    #[default]
    Pending,
    /// Some files copied
    Copying,
    /// Every file copied, none failed
    Completed,
    /// At least one file failed
    Failed,
}

/// A failed file within a date partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayError {
    /// Source key
    pub file: String,
    /// Error message
    pub error: String,
}

/// Ledger entry for one date partition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayProgress {
    pub total_files: u64,
    pub copied_files: u64,
    pub failed_files: u64,
    pub total_bytes: u64,
    pub copied_bytes: u64,
    pub status: DayStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<DayError>,
}

impl DayProgress {
    /// Recompute `status` from the counters
    pub fn refresh_status(&mut self) {
        self.status = if self.failed_files > 0 {
            DayStatus::Failed
        } else if self.total_files > 0 && self.copied_files >= self.total_files {
            DayStatus::Completed
        } else if self.copied_files > 0 {
            DayStatus::Copying
        } else {
            DayStatus::Pending
        };
    }
}

/// Externally shaped progress payload, persisted and streamed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncProgress {
    /// Date partition of the most recently finished file
    pub current_day: Option<String>,
    /// 1-based index of that file within its day
    pub current_file_index: u64,
    /// Files in the current day
    pub total_in_day: u64,
    /// Most recently finished source key
    pub current_file: Option<String>,
    /// When this payload was produced
    pub updated_at: Option<DateTime<Utc>>,
    /// Ledger keyed by date
    pub days: BTreeMap<String, DayProgress>,
}

impl SyncProgress {
    /// Sum of copied files across the ledger
    pub fn copied_files(&self) -> u64 {
        self.days.values().map(|d| d.copied_files).sum()
    }

    /// Sum of copied bytes across the ledger
    pub fn copied_bytes(&self) -> u64 {
        self.days.values().map(|d| d.copied_bytes).sum()
    }

    /// Sum of failed files across the ledger
    pub fn failed_files(&self) -> u64 {
        self.days.values().map(|d| d.failed_files).sum()
    }
}
