//! Derived, externally visible sync status

use super::{DayProgress, JobId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reportable sync status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    NotStarted,
    Syncing,
    Completed,
    Cancelled,
    Error,
}

impl SyncStatus {
    /// Whether no further progress is expected without a new run
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Error)
    }
}

/// Status answer for the dashboard; `status` is authoritative, `message` is not
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatusResponse {
    pub job_id: JobId,
    pub status: SyncStatus,
    pub message: String,
    /// 0-100
    pub progress: u8,
    pub copied_objects: u64,
    pub expected_objects: Option<u64>,
    pub copied_bytes: u64,
    pub expected_bytes: Option<u64>,
    pub failed_objects: u64,
    pub current_day: Option<String>,
    pub days: BTreeMap<String, DayProgress>,
    pub updated_at: Option<DateTime<Utc>>,
}
