//! Post-copy verification
//!
//! Three fatal checks run in order (destination count, ETag sampling,
//! date-partition completeness), followed by an informational comparison
//! of requested vs delivered vendor days.

use crate::error::{Result, SyncError};
use crate::types::SyncConfig;
use chrono::{Duration, NaiveDate};
use futures_util::stream::{self, StreamExt};
use mobility_core::{CopyItem, Job, ObjectStorage, StoragePath, UNDATED_PARTITION};
use std::collections::BTreeSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Number of objects to sample out of `total`
pub fn sample_size(total: usize, ratio: f64, cap: usize) -> usize {
    if total == 0 {
        return 0;
    }
    let wanted = (total as f64 * ratio).ceil() as usize;
    wanted.clamp(1, cap.max(1)).min(total)
}

/// Fixed-stride indices of a sample of `size` out of `total`
pub fn sample_indices(total: usize, size: usize) -> Vec<usize> {
    if size == 0 {
        return Vec::new();
    }
    let stride = (total / size).max(1);
    (0..size).map(|i| i * stride).filter(|&i| i < total).collect()
}

fn is_multipart(etag: &str) -> bool {
    etag.contains('-')
}

fn normalize(etag: &str) -> &str {
    etag.trim_matches('"')
}

/// Outcome of the ETag sample
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    pub sampled: usize,
    pub matched: usize,
    /// Entries with a multipart ETag on either side; not comparable
    pub skipped_multipart: usize,
}

/// Requested vs delivered vendor days; informational only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryDiscrepancy {
    pub requested_days: usize,
    pub delivered_days: usize,
    pub missing_days: Vec<String>,
}

/// Everything the verifier learned about a successful copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    pub destination_count: u64,
    pub integrity: IntegrityReport,
    pub partitions: usize,
    pub discrepancy: Option<DeliveryDiscrepancy>,
}

impl VerificationReport {
    /// One-line summary stored on the job
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "count={}; etag sampled={} matched={} skipped_multipart={}; partitions={}",
            self.destination_count,
            self.integrity.sampled,
            self.integrity.matched,
            self.integrity.skipped_multipart,
            self.partitions,
        );
        if let Some(d) = &self.discrepancy {
            summary.push_str(&format!(
                "; vendor requested={} delivered={}",
                d.requested_days, d.delivered_days
            ));
        }
        summary
    }
}

/// Runs the verification checks against one source/destination pair
pub struct Verifier<'a> {
    storage: &'a dyn ObjectStorage,
    config: &'a SyncConfig,
}

impl<'a> Verifier<'a> {
    pub fn new(storage: &'a dyn ObjectStorage, config: &'a SyncConfig) -> Self {
        Self { storage, config }
    }

    /// Run all checks; the first failing check ends verification
    pub async fn verify(
        &self,
        job: &Job,
        source: &StoragePath,
        destination: &StoragePath,
        candidates: &[CopyItem],
        source_dates: &BTreeSet<String>,
        cancel: &CancellationToken,
    ) -> Result<VerificationReport> {
        debug!("Verifying {} objects at {}", candidates.len(), destination);

        let (destination_count, destination_dates) =
            self.check_count(destination, candidates.len() as u64, cancel).await?;

        let integrity = self
            .check_integrity(source, destination, candidates, cancel)
            .await?;

        self.check_partitions(source_dates, &destination_dates)?;

        let discrepancy = delivery_discrepancy(job, source_dates);
        if let Some(d) = discrepancy.as_ref().filter(|d| !d.missing_days.is_empty()) {
            // Vendor behavior, not ours: report and move on
            warn!(
                "Vendor delivered {} of {} requested days for job {}",
                d.delivered_days, d.requested_days, job.id
            );
        }

        Ok(VerificationReport {
            destination_count,
            integrity,
            partitions: source_dates.len(),
            discrepancy,
        })
    }

    /// Destination object count must equal the source count
    async fn check_count(
        &self,
        destination: &StoragePath,
        expected: u64,
        cancel: &CancellationToken,
    ) -> Result<(u64, BTreeSet<String>)> {
        let counted = self
            .storage
            .count_objects_by_prefix(&destination.bucket, &destination.prefix, true, cancel)
            .await?;

        if counted.count != expected {
            return Err(SyncError::CountMismatch {
                source_count: expected,
                destination_count: counted.count,
            });
        }

        Ok((counted.count, counted.dates.unwrap_or_default()))
    }

    /// Compare ETags of a fixed-stride sample
    async fn check_integrity(
        &self,
        source: &StoragePath,
        destination: &StoragePath,
        candidates: &[CopyItem],
        cancel: &CancellationToken,
    ) -> Result<IntegrityReport> {
        let size = sample_size(
            candidates.len(),
            self.config.etag_sample_ratio,
            self.config.etag_sample_cap,
        );
        let sample: Vec<usize> = sample_indices(candidates.len(), size);

        let fetches = stream::iter(sample)
            .map(|i| async move {
                let item: &CopyItem = &candidates[i];
                let source_etag = self
                    .storage
                    .get_object_etag(&source.bucket, &item.source_key)
                    .await?;
                let destination_etag = self
                    .storage
                    .get_object_etag(&destination.bucket, &item.destination_key)
                    .await?;
                Ok::<_, SyncError>((item, source_etag, destination_etag))
            })
            .buffer_unordered(self.config.etag_concurrency.max(1))
            .collect::<Vec<_>>();

        let fetched = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(SyncError::Cancelled),
            fetched = fetches => fetched,
        };

        let mut report = IntegrityReport::default();
        let mut mismatches = Vec::new();

        for entry in fetched {
            let (item, source_etag, destination_etag) = entry?;
            report.sampled += 1;

            let src = source_etag.as_deref().map(normalize).unwrap_or_default();
            let dst = destination_etag.as_deref().map(normalize).unwrap_or_default();

            if is_multipart(src) || is_multipart(dst) {
                report.skipped_multipart += 1;
            } else if !src.is_empty() && src == dst {
                report.matched += 1;
            } else {
                mismatches.push((item.source_key.clone(), src.to_string(), dst.to_string()));
            }
        }

        if let Some((key, source_etag, destination_etag)) = mismatches.first().cloned() {
            return Err(SyncError::IntegrityMismatch {
                sampled: report.sampled,
                mismatches: mismatches.len(),
                key,
                source_etag,
                destination_etag,
            });
        }

        if report.sampled > 0 && report.skipped_multipart == report.sampled {
            warn!(
                "All {} sampled objects have multipart ETags; integrity was not verified",
                report.sampled
            );
        } else if report.skipped_multipart > 0 {
            warn!(
                "{} of {} sampled objects skipped (multipart ETag)",
                report.skipped_multipart, report.sampled
            );
        }

        Ok(report)
    }

    /// Every source date must be present at the destination
    fn check_partitions(
        &self,
        source_dates: &BTreeSet<String>,
        destination_dates: &BTreeSet<String>,
    ) -> Result<()> {
        let missing: Vec<&String> = source_dates.difference(destination_dates).collect();
        if missing.is_empty() {
            return Ok(());
        }

        let limit = self.config.missing_dates_display_limit.max(1);
        let mut dates = missing
            .iter()
            .take(limit)
            .map(|d| d.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        if missing.len() > limit {
            dates.push_str(&format!(" (and {} more)", missing.len() - limit));
        }

        Err(SyncError::MissingPartitions {
            count: missing.len(),
            dates,
        })
    }
}

/// Compare the vendor request range with the delivered partitions
pub fn delivery_discrepancy(
    job: &Job,
    source_dates: &BTreeSet<String>,
) -> Option<DeliveryDiscrepancy> {
    let (start, end) = (job.requested_start_date?, job.requested_end_date?);
    if end < start {
        return None;
    }

    let requested: Vec<NaiveDate> = (0..=(end - start).num_days())
        .map(|offset| start + Duration::days(offset))
        .collect();
    let delivered_days = source_dates
        .iter()
        .filter(|d| d.as_str() != UNDATED_PARTITION)
        .count();
    let missing_days = requested
        .iter()
        .map(|d| d.format("%Y-%m-%d").to_string())
        .filter(|d| !source_dates.contains(d))
        .collect();

    Some(DeliveryDiscrepancy {
        requested_days: requested.len(),
        delivered_days,
        missing_days,
    })
}
