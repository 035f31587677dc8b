//! Local-directory object store
//!
//! Each bucket is a directory under the root and each key a relative path
//! inside it. ETags are the first 32 hex digits of the BLAKE3 digest of the
//! content, quoted like a single-part S3 ETag.
//!
//! Copies land in a `<name>.partial-<n>` sibling and are renamed into place,
//! so a reader never sees a half-written object. Listings skip those files.

use crate::batch;
use async_trait::async_trait;
use mobility_core::{
    partition_date, BatchCopyResult, CopyEvent, CopyItem, CoreError, ObjectCount, ObjectEntry,
    ObjectStorage, Result,
};
use std::collections::{BTreeSet, HashSet};
use std::io::{ErrorKind, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Read size when hashing object content
const CHUNK_SIZE: usize = 256 * 1024;

/// Marks an in-flight copy; never part of a listed key
const PARTIAL_MARKER: &str = ".partial-";

static NEXT_PARTIAL: AtomicU64 = AtomicU64::new(0);

/// Object store over a directory tree
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    copy_concurrency: usize,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            copy_concurrency: 16,
        }
    }

    pub fn with_copy_concurrency(mut self, concurrency: usize) -> Self {
        self.copy_concurrency = concurrency.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf> {
        if bucket.is_empty() || bucket.contains(['/', '\\']) || bucket == ".." || bucket == "." {
            return Err(CoreError::invalid_input(format!("invalid bucket name: {bucket:?}")));
        }
        Ok(self.root.join(bucket))
    }

    /// Resolve a key, refusing anything that would escape the bucket
    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        if key.is_empty()
            || !relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(CoreError::invalid_input(format!("invalid object key: {key:?}")));
        }
        Ok(self.bucket_dir(bucket)?.join(relative))
    }

    /// Every object under `prefix`, sorted by key
    async fn walk(
        &self,
        bucket: &str,
        prefix: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ObjectEntry>> {
        let bucket_dir = self.bucket_dir(bucket)?;
        let mut pending = vec![bucket_dir.clone()];
        let mut entries = Vec::new();

        while let Some(dir) = pending.pop() {
            if cancel.is_cancelled() {
                return Err(CoreError::Cancelled);
            }

            let mut read_dir = match tokio::fs::read_dir(&dir).await {
                Ok(read_dir) => read_dir,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            while let Some(entry) = read_dir.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;

                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }

                if is_partial(&path) {
                    continue;
                }
                let Some(key) = key_of(&bucket_dir, &path) else {
                    continue;
                };
                if key.starts_with(prefix) {
                    let size = entry.metadata().await?.len();
                    entries.push(ObjectEntry::new(key, size));
                }
            }
        }

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    async fn copy_one(
        &self,
        source_bucket: &str,
        destination_bucket: &str,
        item: &CopyItem,
    ) -> std::result::Result<(), String> {
        let from = self
            .object_path(source_bucket, &item.source_key)
            .map_err(|e| e.to_string())?;
        let to = self
            .object_path(destination_bucket, &item.destination_key)
            .map_err(|e| e.to_string())?;

        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| e.to_string())?;
        }

        let partial = partial_path(&to);
        if let Err(e) = tokio::fs::copy(&from, &partial).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(format!("{}: {}", from.display(), e));
        }
        if let Err(e) = tokio::fs::rename(&partial, &to).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(format!("{}: {}", to.display(), e));
        }

        Ok(())
    }
}

/// Unique in-flight sibling of `path`
fn partial_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let n = NEXT_PARTIAL.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!("{name}{PARTIAL_MARKER}{}-{n}", std::process::id()))
}

fn is_partial(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.contains(PARTIAL_MARKER))
}

/// BLAKE3 digest of a file, read in chunks; `None` if it does not exist
fn hash_file(path: &Path) -> std::io::Result<Option<blake3::Hash>> {
    let mut file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(Some(hasher.finalize()))
}

/// Key of `path` relative to the bucket directory, `/`-separated
fn key_of(bucket_dir: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(bucket_dir).ok()?;
    let segments: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
    Some(segments?.join("/"))
}

#[async_trait]
impl ObjectStorage for LocalObjectStore {
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ObjectEntry>> {
        self.walk(bucket, prefix, cancel).await
    }

    async fn list_key_set(
        &self,
        bucket: &str,
        prefix: &str,
        cancel: &CancellationToken,
    ) -> Result<HashSet<String>> {
        Ok(self
            .walk(bucket, prefix, cancel)
            .await?
            .into_iter()
            .map(|o| o.key)
            .collect())
    }

    async fn copy_batch(
        &self,
        source_bucket: &str,
        destination_bucket: &str,
        items: Vec<CopyItem>,
        progress: mpsc::UnboundedSender<CopyEvent>,
        cancel: CancellationToken,
    ) -> Result<BatchCopyResult> {
        debug!(
            "Copying {} objects from {} to {}",
            items.len(),
            source_bucket,
            destination_bucket
        );

        let result = batch::drive(items, self.copy_concurrency, progress, cancel, |item| async move {
            let outcome = self.copy_one(source_bucket, destination_bucket, &item).await;
            (item, outcome)
        })
        .await;
        Ok(result)
    }

    async fn get_object_etag(&self, bucket: &str, key: &str) -> Result<Option<String>> {
        let path = self.object_path(bucket, key)?;
        let digest = tokio::task::spawn_blocking(move || hash_file(&path))
            .await
            .map_err(|e| CoreError::storage(format!("hashing {key} failed: {e}")))??;

        Ok(digest.map(|digest| format!("\"{}\"", &digest.to_hex()[..32])))
    }

    async fn count_objects_by_prefix(
        &self,
        bucket: &str,
        prefix: &str,
        collect_dates: bool,
        cancel: &CancellationToken,
    ) -> Result<ObjectCount> {
        let listing = self.walk(bucket, prefix, cancel).await?;
        let dates = collect_dates.then(|| {
            listing
                .iter()
                .map(|o| partition_date(o.key.strip_prefix(prefix).unwrap_or(&o.key)).to_string())
                .collect::<BTreeSet<_>>()
        });

        Ok(ObjectCount {
            count: listing.len() as u64,
            dates,
        })
    }
}
