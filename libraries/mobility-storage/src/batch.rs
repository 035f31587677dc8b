//! Bounded-concurrency copy driver shared by the object stores

use futures_util::stream::{self, StreamExt};
use mobility_core::{BatchCopyResult, CopyEvent, CopyItem};
use std::future::Future;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Run `copy` over `items`, `concurrency` at a time
///
/// Emits one event per finished item. Once `cancel` fires no new copies are
/// started, in-flight ones are dropped and the result is marked cancelled.
pub(crate) async fn drive<F, Fut>(
    items: Vec<CopyItem>,
    concurrency: usize,
    progress: mpsc::UnboundedSender<CopyEvent>,
    cancel: CancellationToken,
    copy: F,
) -> BatchCopyResult
where
    F: Fn(CopyItem) -> Fut,
    Fut: Future<Output = (CopyItem, Result<(), String>)>,
{
    let total = items.len();
    let mut result = BatchCopyResult::default();

    if cancel.is_cancelled() {
        result.cancelled = true;
        return result;
    }

    let mut copies = stream::iter(items)
        .map(copy)
        .buffer_unordered(concurrency.max(1));

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("Copy batch cancelled after {} of {}", result.copied + result.failed, total);
                result.cancelled = true;
                break;
            }
            next = copies.next() => next,
        };

        let Some((item, outcome)) = next else {
            break;
        };

        let error = match outcome {
            Ok(()) => {
                result.copied += 1;
                result.total_bytes += item.size;
                None
            }
            Err(e) => {
                result.failed += 1;
                result.failed_keys.push(item.source_key.clone());
                result.errors.push(e.clone());
                Some(e)
            }
        };

        // The receiver may be gone; the result still carries everything
        let _ = progress.send(CopyEvent {
            copied: result.copied,
            total,
            bytes_copied: result.total_bytes,
            current_key: item.source_key,
            error,
        });
    }

    result
}
