//! Classification, fingerprinting and the two inventory producers.
//!
//! This module provides:
//! - The three-tier path classifier and the operator gate for unknown extensions
//! - Streaming content fingerprints and the shared hash-and-upsert step
//! - The one-shot bulk scanner
//! - The live watcher: notify events, batching and per-path handling

mod events;
mod filter;
mod handler;
mod hasher;
mod indexer;
mod resolver;
mod scanner;
#[allow(clippy::module_inception)]
mod watcher;

pub use events::{ChangeKind, EventBatch, EventTranslator, FileEvent};
pub use filter::{extension_of, Classifier, DenyReason, Disposition};
pub use handler::{EventHandler, WatcherStats, WatcherStatsSnapshot};
pub use hasher::{fingerprint, Fingerprint, CHUNK_SIZE};
pub use indexer::{IndexOutcome, Indexer};
pub use resolver::{
    resolve, CachedDecision, Decision, DecisionCache, OperatorPrompt, TerminalPrompt,
    UnattendedPrompt,
};
pub use scanner::{BulkScanner, ScanReport, ScanState};
pub use watcher::{FileWatcher, WatcherConfig};

use tokio::task::JoinSet;

use crate::observability::spans;
use tokio_util::sync::CancellationToken;

/// Feed batches from `watcher` to `handler` until shutdown.
///
/// Stops taking new events once `shutdown` fires or the watcher closes, then
/// waits for every in-flight path task so no write is cut short.
pub async fn run_watcher(
    mut watcher: FileWatcher,
    handler: EventHandler,
    shutdown: CancellationToken,
) -> WatcherStatsSnapshot {
    let stats = handler.stats();
    let mut tasks = JoinSet::new();

    tracing::info!(roots = watcher.watched_dirs().len(), "Live watcher started");

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                tracing::info!("Shutdown requested, stopping watcher");
                break;
            }
            batch = watcher.next_batch() => match batch {
                Some(batch) => {
                    spans::batch_span(batch.len()).in_scope(|| {
                        tracing::debug!("Dispatching event batch");
                        handler.dispatch(batch, &mut tasks);
                    });
                }
                None => {
                    tracing::warn!("Event source closed, stopping watcher");
                    break;
                }
            },
        }

        while let Some(result) = tasks.try_join_next() {
            log_task_result(result, &stats);
        }
    }

    let in_flight = tasks.len();
    if in_flight > 0 {
        tracing::info!(in_flight, "Waiting for in-flight event tasks");
    }
    while let Some(result) = tasks.join_next().await {
        log_task_result(result, &stats);
    }

    let snapshot = stats.snapshot();
    tracing::info!(
        received = snapshot.events_received,
        recorded = snapshot.files_recorded,
        filtered = snapshot.files_filtered,
        deletes = snapshot.deletes,
        moves = snapshot.moves,
        errors = snapshot.errors,
        "Live watcher stopped"
    );
    snapshot
}

fn log_task_result(result: Result<(), tokio::task::JoinError>, stats: &WatcherStats) {
    if let Err(e) = result {
        tracing::error!(error = %e, "Event task failed");
        stats
            .errors
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }
}
