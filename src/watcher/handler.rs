//! File change event handler.
//!
//! Every path in a batch is handled on its own blocking task. The handler
//! re-applies the classifier, records content through the [`Indexer`] and
//! appends one journal entry per handled event.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rusqlite::Connection;
use tokio::task::JoinSet;

use super::events::{ChangeKind, EventBatch};
use super::filter::Disposition;
use super::indexer::{IndexOutcome, Indexer};
use crate::config::UnattendedPolicy;
use crate::storage::{append_journal, get_asset_by_path, kinds, LinkConfidence};
use crate::Result;

/// Statistics for file watching.
#[derive(Debug, Default)]
pub struct WatcherStats {
    pub events_received: AtomicU64,
    pub files_recorded: AtomicU64,
    pub files_filtered: AtomicU64,
    pub races_skipped: AtomicU64,
    pub unclassified: AtomicU64,
    pub deletes: AtomicU64,
    pub moves: AtomicU64,
    pub errors: AtomicU64,
}

impl WatcherStats {
    /// Create new stats tracker.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get snapshot of current stats.
    #[must_use]
    pub fn snapshot(&self) -> WatcherStatsSnapshot {
        WatcherStatsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            files_recorded: self.files_recorded.load(Ordering::Relaxed),
            files_filtered: self.files_filtered.load(Ordering::Relaxed),
            races_skipped: self.races_skipped.load(Ordering::Relaxed),
            unclassified: self.unclassified.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            moves: self.moves.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of watcher stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatcherStatsSnapshot {
    pub events_received: u64,
    pub files_recorded: u64,
    pub files_filtered: u64,
    pub races_skipped: u64,
    pub unclassified: u64,
    pub deletes: u64,
    pub moves: u64,
    pub errors: u64,
}

/// Event handler that filters changes and records them.
///
/// Clone is cheap; each blocking task gets its own copy.
#[derive(Debug, Clone)]
pub struct EventHandler {
    indexer: Indexer,
    unattended: UnattendedPolicy,
    stats: Arc<WatcherStats>,
}

impl EventHandler {
    /// Create a new event handler.
    ///
    /// `unattended` decides what happens to files whose extension is on
    /// neither list, since nobody is asked while watching.
    #[must_use]
    pub fn new(indexer: Indexer, unattended: UnattendedPolicy, stats: Arc<WatcherStats>) -> Self {
        Self {
            indexer,
            unattended,
            stats,
        }
    }

    /// Get current stats.
    #[must_use]
    pub fn stats(&self) -> Arc<WatcherStats> {
        Arc::clone(&self.stats)
    }

    /// Spawn one blocking task per path in the batch onto `tasks`.
    pub fn dispatch(&self, batch: EventBatch, tasks: &mut JoinSet<()>) {
        self.stats
            .events_received
            .fetch_add(batch.len() as u64, Ordering::Relaxed);

        for (path, kind) in batch.changed {
            let handler = self.clone();
            tasks.spawn_blocking(move || handler.handle_change(&path, kind));
        }
        for path in batch.deleted {
            let handler = self.clone();
            tasks.spawn_blocking(move || handler.handle_delete(&path));
        }
        for (from, to) in batch.renamed {
            let handler = self.clone();
            tasks.spawn_blocking(move || handler.handle_rename(&from, &to));
        }
    }

    /// Process a batch and wait for every path in it.
    pub async fn process_batch(&self, batch: EventBatch) {
        let mut tasks = JoinSet::new();
        self.dispatch(batch, &mut tasks);

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Event task failed");
                WatcherStats::bump(&self.stats.errors);
            }
        }

        let snapshot = self.stats.snapshot();
        tracing::debug!(
            received = snapshot.events_received,
            recorded = snapshot.files_recorded,
            filtered = snapshot.files_filtered,
            deletes = snapshot.deletes,
            moves = snapshot.moves,
            "Processed event batch"
        );
    }

    /// A file was created or written.
    pub fn handle_change(&self, path: &Path, kind: ChangeKind) {
        let disposition = self.indexer.classifier().classify(path, None);
        if let Disposition::Deny(reason) = disposition {
            tracing::trace!(path = %path.display(), %reason, "Filtered change");
            WatcherStats::bump(&self.stats.files_filtered);
            return;
        }

        match std::fs::metadata(path) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return,
            Err(_) => {
                tracing::debug!(path = %path.display(), "Changed file already gone");
                WatcherStats::bump(&self.stats.races_skipped);
                return;
            }
        }

        if disposition == Disposition::Ask && self.unattended == UnattendedPolicy::Ignore {
            self.journal_unclassified(path);
            return;
        }

        let journal_kind = match kind {
            ChangeKind::Created => kinds::FILE_CREATED,
            ChangeKind::Modified => kinds::FILE_MODIFIED,
        };

        let result = self.indexer.index_file_then(path, |conn, outcome| {
            let context = format!("{} ({})", path.display(), outcome.describe());
            append_journal(
                conn,
                journal_kind,
                &context,
                Some(outcome.asset_id()),
                Some(LinkConfidence::High),
            )?;
            Ok(())
        });

        match result {
            Ok(IndexOutcome::Recorded(outcome)) => {
                tracing::info!(
                    path = %path.display(),
                    id = outcome.asset_id(),
                    outcome = outcome.describe(),
                    "Recorded change"
                );
                WatcherStats::bump(&self.stats.files_recorded);
            }
            Ok(IndexOutcome::Skipped(e)) if e.is_not_found() => {
                tracing::debug!(path = %path.display(), "File vanished while hashing");
                WatcherStats::bump(&self.stats.races_skipped);
            }
            Ok(IndexOutcome::Skipped(e)) => {
                tracing::warn!(path = %path.display(), error = %e, "Could not hash file");
                WatcherStats::bump(&self.stats.errors);
            }
            Err(e) => self.store_failed(path, &e),
        }
    }

    /// A file was deleted. The inventory row, if any, is left in place.
    pub fn handle_delete(&self, path: &Path) {
        if let Some(reason) = self.indexer.classifier().deny_reason(path) {
            tracing::trace!(path = %path.display(), %reason, "Filtered delete");
            WatcherStats::bump(&self.stats.files_filtered);
            return;
        }

        let path_str = path.to_string_lossy();
        let result = self.indexer.database().with_transaction(|conn| {
            let (asset_id, confidence) = match get_asset_by_path(conn, &path_str)? {
                Some(asset) => (Some(asset.id), LinkConfidence::High),
                None => (None, LinkConfidence::Unlinked),
            };
            append_journal(conn, kinds::FILE_DELETED, &path_str, asset_id, Some(confidence))
        });

        match result {
            Ok(_) => {
                tracing::info!(path = %path.display(), "Recorded delete");
                WatcherStats::bump(&self.stats.deletes);
            }
            Err(e) => self.store_failed(path, &e),
        }
    }

    /// A file moved from `from` to `to`.
    ///
    /// The destination, when safe and processable, is ingested as its own
    /// asset. Exactly one move entry is journaled, linked to the destination
    /// asset if one was recorded, else to the source asset if one exists.
    pub fn handle_rename(&self, from: &Path, to: &Path) {
        let classifier = self.indexer.classifier();
        let from_safe = classifier.deny_reason(from).is_none();
        let to_safe = classifier.deny_reason(to).is_none();

        if !from_safe && !to_safe {
            tracing::trace!(from = %from.display(), to = %to.display(), "Filtered move");
            WatcherStats::bump(&self.stats.files_filtered);
            return;
        }

        let context = format!("{} -> {}", from.display(), to.display());
        let journal_move = |conn: &Connection, dest: Option<i64>| -> Result<()> {
            let (asset_id, confidence) = if let Some(id) = dest {
                (Some(id), LinkConfidence::High)
            } else if let Some(source) = from_safe
                .then(|| get_asset_by_path(conn, &from.to_string_lossy()))
                .transpose()?
                .flatten()
            {
                (Some(source.id), LinkConfidence::Medium)
            } else {
                (None, LinkConfidence::Unlinked)
            };
            append_journal(conn, kinds::FILE_MOVED, &context, asset_id, Some(confidence))?;
            Ok(())
        };

        if to_safe && to.is_file() && self.should_ingest(to) {
            let result = self.indexer.index_file_then(to, |conn, outcome| {
                journal_move(conn, Some(outcome.asset_id()))
            });

            match result {
                Ok(IndexOutcome::Recorded(outcome)) => {
                    tracing::info!(
                        from = %from.display(),
                        to = %to.display(),
                        id = outcome.asset_id(),
                        "Recorded move"
                    );
                    WatcherStats::bump(&self.stats.files_recorded);
                    WatcherStats::bump(&self.stats.moves);
                    return;
                }
                Ok(IndexOutcome::Skipped(e)) => {
                    tracing::debug!(path = %to.display(), error = %e, "Move destination not hashed");
                }
                Err(e) => {
                    self.store_failed(to, &e);
                    return;
                }
            }
        }

        match self
            .indexer
            .database()
            .with_transaction(|conn| journal_move(conn, None))
        {
            Ok(()) => {
                tracing::info!(from = %from.display(), to = %to.display(), "Recorded move");
                WatcherStats::bump(&self.stats.moves);
            }
            Err(e) => self.store_failed(to, &e),
        }
    }

    /// Whether a safe destination gets recorded. Unknown extensions that the
    /// unattended policy leaves out are journaled as unclassified.
    fn should_ingest(&self, path: &Path) -> bool {
        match self.indexer.classifier().classify(path, None) {
            Disposition::Allow => true,
            Disposition::Ask if self.unattended == UnattendedPolicy::Process => true,
            Disposition::Ask => {
                self.journal_unclassified(path);
                false
            }
            Disposition::Deny(_) => false,
        }
    }

    fn journal_unclassified(&self, path: &Path) {
        WatcherStats::bump(&self.stats.unclassified);

        let context = format!("{} (unknown extension, ignored)", path.display());
        let result = self.indexer.database().with_conn(|conn| {
            append_journal(conn, kinds::FILE_UNCLASSIFIED, &context, None, None)
        });

        match result {
            Ok(_) => tracing::debug!(path = %path.display(), "Unclassified file left out"),
            Err(e) => self.store_failed(path, &e),
        }
    }

    fn store_failed(&self, path: &Path, error: &crate::Error) {
        tracing::error!(
            path = %path.display(),
            error = %error,
            store_unavailable = error.is_store_unavailable(),
            "Store failure while handling event"
        );
        WatcherStats::bump(&self.stats.errors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterRules;
    use crate::storage::{
        count_assets, init_storage, recent_journal, upsert_asset, AssetDraft, Database,
        JournalEntry,
    };
    use crate::watcher::filter::Classifier;
    use std::fs;
    use tempfile::TempDir;

    fn handler(root: &Path, unattended: UnattendedPolicy) -> EventHandler {
        let db = Database::open_in_memory().unwrap();
        init_storage(&db).unwrap();
        let set = |items: &[&str]| items.iter().map(|s| (*s).to_string()).collect();
        let rules = FilterRules {
            denied_dirs: set(&["build"]),
            denied_extensions: set(&["env"]),
            allowed_extensions: set(&["md", "pdf"]),
            ..FilterRules::empty()
        };
        let classifier = Classifier::new(rules, vec![root.to_path_buf()]);
        EventHandler::new(
            Indexer::new(db, Arc::new(classifier)),
            unattended,
            WatcherStats::new(),
        )
    }

    fn journal(handler: &EventHandler) -> Vec<JournalEntry> {
        handler
            .indexer
            .database()
            .with_conn(|conn| recent_journal(conn, 100))
            .unwrap()
    }

    fn assets(handler: &EventHandler) -> i64 {
        handler.indexer.database().with_conn(count_assets).unwrap()
    }

    #[test]
    fn test_change_records_and_journals() {
        let tmp = TempDir::new().unwrap();
        let h = handler(tmp.path(), UnattendedPolicy::Ignore);
        let path = tmp.path().join("a.md");
        fs::write(&path, "v1").unwrap();

        h.handle_change(&path, ChangeKind::Created);
        fs::write(&path, "v2").unwrap();
        h.handle_change(&path, ChangeKind::Modified);

        let entries = journal(&h);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, kinds::FILE_CREATED);
        assert!(entries[0].context.contains("new asset"));
        assert_eq!(entries[1].kind, kinds::FILE_MODIFIED);
        assert!(entries[1].context.contains("content changed"));
        assert_eq!(entries[1].confidence, Some(LinkConfidence::High));
        assert_eq!(entries[0].asset_id, entries[1].asset_id);
        assert_eq!(assets(&h), 1);
        assert_eq!(h.stats().snapshot().files_recorded, 2);
    }

    #[test]
    fn test_denied_change_is_filtered() {
        let tmp = TempDir::new().unwrap();
        let h = handler(tmp.path(), UnattendedPolicy::Process);
        fs::create_dir(tmp.path().join("build")).unwrap();
        let path = tmp.path().join("build").join("out.md");
        fs::write(&path, "x").unwrap();

        h.handle_change(&path, ChangeKind::Created);

        assert!(journal(&h).is_empty());
        assert_eq!(h.stats().snapshot().files_filtered, 1);
    }

    #[test]
    fn test_change_for_vanished_file_is_silent() {
        let tmp = TempDir::new().unwrap();
        let h = handler(tmp.path(), UnattendedPolicy::Ignore);

        h.handle_change(&tmp.path().join("gone.md"), ChangeKind::Modified);

        assert!(journal(&h).is_empty());
        let stats = h.stats().snapshot();
        assert_eq!(stats.races_skipped, 1);
        assert_eq!(stats.errors, 0);
    }

    #[test]
    fn test_unknown_extension_follows_unattended_policy() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data.xyz");
        fs::write(&path, "x").unwrap();

        let ignoring = handler(tmp.path(), UnattendedPolicy::Ignore);
        ignoring.handle_change(&path, ChangeKind::Created);
        let entries = journal(&ignoring);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, kinds::FILE_UNCLASSIFIED);
        assert_eq!(assets(&ignoring), 0);

        let processing = handler(tmp.path(), UnattendedPolicy::Process);
        processing.handle_change(&path, ChangeKind::Created);
        assert_eq!(journal(&processing)[0].kind, kinds::FILE_CREATED);
        assert_eq!(assets(&processing), 1);
    }

    #[test]
    fn test_delete_of_unknown_path_is_unlinked() {
        let tmp = TempDir::new().unwrap();
        let h = handler(tmp.path(), UnattendedPolicy::Ignore);

        h.handle_delete(&tmp.path().join("never-seen.pdf"));

        let entries = journal(&h);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, kinds::FILE_DELETED);
        assert_eq!(entries[0].asset_id, None);
        assert_eq!(entries[0].confidence, Some(LinkConfidence::Unlinked));
        assert_eq!(h.stats().snapshot().errors, 0);
    }

    #[test]
    fn test_delete_links_existing_asset_and_keeps_row() {
        let tmp = TempDir::new().unwrap();
        let h = handler(tmp.path(), UnattendedPolicy::Ignore);
        let path = tmp.path().join("a.md");
        fs::write(&path, "x").unwrap();
        h.handle_change(&path, ChangeKind::Created);
        fs::remove_file(&path).unwrap();

        h.handle_delete(&path);

        let entries = journal(&h);
        assert_eq!(entries[1].kind, kinds::FILE_DELETED);
        assert_eq!(entries[1].asset_id, entries[0].asset_id);
        assert_eq!(entries[1].confidence, Some(LinkConfidence::High));
        assert_eq!(assets(&h), 1);
    }

    #[test]
    fn test_rename_ingests_destination() {
        let tmp = TempDir::new().unwrap();
        let h = handler(tmp.path(), UnattendedPolicy::Ignore);
        let from = tmp.path().join("draft.md");
        let to = tmp.path().join("final.md");
        fs::write(&to, "content").unwrap();

        h.handle_rename(&from, &to);

        let entries = journal(&h);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, kinds::FILE_MOVED);
        assert!(entries[0].context.contains("draft.md -> "));
        assert_eq!(entries[0].confidence, Some(LinkConfidence::High));
        assert_eq!(assets(&h), 1);
        assert_eq!(h.stats().snapshot().moves, 1);
    }

    #[test]
    fn test_rename_to_unknown_extension_is_journaled_as_unclassified() {
        let tmp = TempDir::new().unwrap();
        let h = handler(tmp.path(), UnattendedPolicy::Ignore);
        let from = tmp.path().join("a.md");
        let to = tmp.path().join("b.gcode");
        fs::write(&to, "G28").unwrap();

        h.handle_rename(&from, &to);

        let entries = journal(&h);
        let kinds_seen: Vec<&str> = entries.iter().map(|e| e.kind.as_str()).collect();
        assert_eq!(kinds_seen, vec![kinds::FILE_UNCLASSIFIED, kinds::FILE_MOVED]);
        assert!(entries[0].context.contains("b.gcode"));
        assert_eq!(entries[0].asset_id, None);
        assert_eq!(entries[1].confidence, Some(LinkConfidence::Unlinked));
        assert_eq!(assets(&h), 0);

        let stats = h.stats().snapshot();
        assert_eq!(stats.unclassified, 1);
        assert_eq!(stats.moves, 1);
    }

    #[test]
    fn test_rename_into_denied_location_links_source() {
        let tmp = TempDir::new().unwrap();
        let h = handler(tmp.path(), UnattendedPolicy::Ignore);
        let from = tmp.path().join("notes.md");
        let to = tmp.path().join("notes.env");
        let source_id = h
            .indexer
            .database()
            .with_conn(|conn| {
                upsert_asset(
                    conn,
                    &AssetDraft::new(from.to_string_lossy(), "notes.md", "md", 1, 0, "f"),
                )
            })
            .unwrap()
            .asset_id();
        fs::write(&to, "x").unwrap();

        h.handle_rename(&from, &to);

        let entries = journal(&h);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].asset_id, Some(source_id));
        assert_eq!(entries[0].confidence, Some(LinkConfidence::Medium));
        assert_eq!(assets(&h), 1);
    }

    #[test]
    fn test_rename_between_denied_paths_is_filtered() {
        let tmp = TempDir::new().unwrap();
        let h = handler(tmp.path(), UnattendedPolicy::Ignore);

        h.handle_rename(&tmp.path().join("a.env"), &tmp.path().join("b.env"));

        assert!(journal(&h).is_empty());
        assert_eq!(h.stats().snapshot().files_filtered, 1);
    }

    #[tokio::test]
    async fn test_process_batch_handles_every_path() {
        let tmp = TempDir::new().unwrap();
        let h = handler(tmp.path(), UnattendedPolicy::Ignore);
        for name in ["a.md", "b.md", "c.pdf"] {
            fs::write(tmp.path().join(name), name).unwrap();
        }

        let mut batch = EventBatch::new();
        for name in ["a.md", "b.md", "c.pdf"] {
            batch.changed.push((tmp.path().join(name), ChangeKind::Created));
        }
        batch.deleted.push(tmp.path().join("old.md"));

        h.process_batch(batch).await;

        let stats = h.stats().snapshot();
        assert_eq!(stats.events_received, 4);
        assert_eq!(stats.files_recorded, 3);
        assert_eq!(stats.deletes, 1);
        assert_eq!(journal(&h).len(), 4);
        assert_eq!(assets(&h), 3);
    }
}
