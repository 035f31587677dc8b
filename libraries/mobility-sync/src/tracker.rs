//! Per-date progress ledger
//!
//! Built once per run from the full candidate list, then advanced by one
//! call per copy event. Objects already present at the destination are
//! credited up front so a resumed run reports cumulative progress.

use chrono::Utc;
use mobility_core::{
    partition_date, BatchCopyResult, CopyEvent, CopyItem, DayError, DayProgress, StoragePath,
    SyncProgress,
};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Errors kept per day; the counters stay exact past this
const MAX_ERRORS_PER_DAY: usize = 20;

#[derive(Debug, Clone)]
struct Planned {
    day: String,
    size: u64,
}

/// In-memory ledger for one run, owned by the run's task
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    days: BTreeMap<String, DayProgress>,
    planned: HashMap<String, Planned>,
    finished: HashSet<String>,
    current_day: Option<String>,
    current_file: Option<String>,
    already_present: u64,
}

impl ProgressTracker {
    /// Build the ledger for `candidates` listed under `source`; items whose
    /// destination key is in `existing_destination_keys` count as already copied
    ///
    /// Days are read from keys relative to the source prefix, the same way
    /// the object store dates keys when counting a prefix.
    pub fn new(
        source: &StoragePath,
        candidates: &[CopyItem],
        existing_destination_keys: &HashSet<String>,
    ) -> Self {
        let mut days: BTreeMap<String, DayProgress> = BTreeMap::new();
        let mut planned = HashMap::with_capacity(candidates.len());
        let mut finished = HashSet::new();

        for item in candidates {
            let day = partition_date(source.relative_key(&item.source_key)).to_string();
            let entry = days.entry(day.clone()).or_default();
            entry.total_files += 1;
            entry.total_bytes += item.size;

            if existing_destination_keys.contains(&item.destination_key) {
                entry.copied_files += 1;
                entry.copied_bytes += item.size;
                finished.insert(item.source_key.clone());
            }

            planned.insert(item.source_key.clone(), Planned { day, size: item.size });
        }

        for day in days.values_mut() {
            day.refresh_status();
        }

        let already_present = finished.len() as u64;

        Self {
            days,
            planned,
            finished,
            current_day: None,
            current_file: None,
            already_present,
        }
    }

    /// Advance the ledger by one finished item
    ///
    /// Unknown keys and repeated events for the same key are ignored.
    pub fn apply(&mut self, event: &CopyEvent) {
        let Some(planned) = self.planned.get(&event.current_key) else {
            return;
        };
        if !self.finished.insert(event.current_key.clone()) {
            return;
        }

        let Some(day) = self.days.get_mut(&planned.day) else {
            return;
        };

        match &event.error {
            None => {
                day.copied_files += 1;
                day.copied_bytes += planned.size;
            }
            Some(error) => {
                day.failed_files += 1;
                if day.errors.len() < MAX_ERRORS_PER_DAY {
                    day.errors.push(DayError {
                        file: event.current_key.clone(),
                        error: error.clone(),
                    });
                }
            }
        }
        day.refresh_status();

        self.current_day = Some(planned.day.clone());
        self.current_file = Some(event.current_key.clone());
    }

    /// Record failures reported only in the batch result
    pub fn apply_failures(&mut self, result: &BatchCopyResult) {
        for (key, error) in result.failed_keys.iter().zip(&result.errors) {
            self.apply(&CopyEvent {
                copied: result.copied,
                total: result.copied + result.failed,
                bytes_copied: result.total_bytes,
                current_key: key.clone(),
                error: Some(error.clone()),
            });
        }
    }

    /// Externally shaped payload for persistence and streaming
    pub fn snapshot(&self) -> SyncProgress {
        let current = self.current_day.as_ref().and_then(|d| self.days.get(d));

        SyncProgress {
            current_day: self.current_day.clone(),
            current_file_index: current.map_or(0, |d| d.copied_files + d.failed_files),
            total_in_day: current.map_or(0, |d| d.total_files),
            current_file: self.current_file.clone(),
            updated_at: Some(Utc::now()),
            days: self.days.clone(),
        }
    }

    pub fn days(&self) -> &BTreeMap<String, DayProgress> {
        &self.days
    }

    /// Distinct date partitions of the candidate set
    pub fn source_dates(&self) -> BTreeSet<String> {
        self.days.keys().cloned().collect()
    }

    pub fn total_files(&self) -> u64 {
        self.days.values().map(|d| d.total_files).sum()
    }

    pub fn total_bytes(&self) -> u64 {
        self.days.values().map(|d| d.total_bytes).sum()
    }

    pub fn copied_files(&self) -> u64 {
        self.days.values().map(|d| d.copied_files).sum()
    }

    pub fn copied_bytes(&self) -> u64 {
        self.days.values().map(|d| d.copied_bytes).sum()
    }

    pub fn failed_files(&self) -> u64 {
        self.days.values().map(|d| d.failed_files).sum()
    }

    /// Objects credited because they were already at the destination
    pub fn already_present(&self) -> u64 {
        self.already_present
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mobility_core::DayStatus;

    fn item(key: &str, size: u64) -> CopyItem {
        CopyItem {
            source_key: format!("src/{key}"),
            destination_key: format!("dst/{key}"),
            size,
        }
    }

    fn source() -> StoragePath {
        StoragePath::new("vendor", "src/")
    }

    fn ok(key: &str) -> CopyEvent {
        CopyEvent {
            copied: 0,
            total: 0,
            bytes_copied: 0,
            current_key: format!("src/{key}"),
            error: None,
        }
    }

    #[test]
    fn builds_one_entry_per_date() {
        let items = vec![
            item("date=2024-01-01/a", 10),
            item("date=2024-01-01/b", 20),
            item("date=2024-01-02/c", 5),
        ];
        let tracker = ProgressTracker::new(&source(), &items, &HashSet::new());

        let day1 = &tracker.days()["2024-01-01"];
        assert_eq!(day1.total_files, 2);
        assert_eq!(day1.total_bytes, 30);
        assert_eq!(day1.status, DayStatus::Pending);
        assert_eq!(tracker.total_files(), 3);
    }

    #[test]
    fn credits_existing_objects() {
        let items = vec![item("date=2024-01-01/a", 10), item("date=2024-01-01/b", 20)];
        let existing: HashSet<String> = ["dst/date=2024-01-01/a".to_string()].into();
        let tracker = ProgressTracker::new(&source(), &items, &existing);

        assert_eq!(tracker.copied_files(), 1);
        assert_eq!(tracker.copied_bytes(), 10);
        assert_eq!(tracker.already_present(), 1);
        assert_eq!(tracker.days()["2024-01-01"].status, DayStatus::Copying);
    }

    #[test]
    fn completes_a_day_and_moves_the_cursor() {
        let items = vec![item("date=2024-01-01/a", 10), item("date=2024-01-02/b", 20)];
        let mut tracker = ProgressTracker::new(&source(), &items, &HashSet::new());

        tracker.apply(&ok("date=2024-01-01/a"));

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.current_day.as_deref(), Some("2024-01-01"));
        assert_eq!(snapshot.current_file_index, 1);
        assert_eq!(snapshot.total_in_day, 1);
        assert_eq!(snapshot.days["2024-01-01"].status, DayStatus::Completed);
        assert_eq!(snapshot.days["2024-01-02"].status, DayStatus::Pending);
    }

    #[test]
    fn failure_marks_day_failed_and_keeps_error() {
        let items = vec![item("date=2024-01-01/a", 10), item("date=2024-01-01/b", 20)];
        let mut tracker = ProgressTracker::new(&source(), &items, &HashSet::new());

        tracker.apply(&ok("date=2024-01-01/a"));
        tracker.apply(&CopyEvent {
            error: Some("access denied".into()),
            ..ok("date=2024-01-01/b")
        });

        let day = &tracker.days()["2024-01-01"];
        assert_eq!(day.status, DayStatus::Failed);
        assert_eq!(day.failed_files, 1);
        assert_eq!(day.errors[0].error, "access denied");
    }

    #[test]
    fn repeated_and_unknown_events_are_ignored() {
        let items = vec![item("date=2024-01-01/a", 10)];
        let existing: HashSet<String> = ["dst/date=2024-01-01/a".to_string()].into();
        let mut tracker = ProgressTracker::new(&source(), &items, &existing);

        tracker.apply(&ok("date=2024-01-01/a"));
        tracker.apply(&ok("date=2024-01-01/zzz"));

        assert_eq!(tracker.copied_files(), 1);
        assert_eq!(tracker.copied_bytes(), 10);
    }

    #[test]
    fn batch_failures_are_not_double_counted() {
        let items = vec![item("date=2024-01-01/a", 10)];
        let mut tracker = ProgressTracker::new(&source(), &items, &HashSet::new());
        tracker.apply(&CopyEvent {
            error: Some("timeout".into()),
            ..ok("date=2024-01-01/a")
        });

        tracker.apply_failures(&BatchCopyResult {
            failed: 1,
            failed_keys: vec!["src/date=2024-01-01/a".into()],
            errors: vec!["timeout".into()],
            ..Default::default()
        });

        assert_eq!(tracker.failed_files(), 1);
    }
}
