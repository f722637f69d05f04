//! File system watcher using notify-rs.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use super::events::{EventBatch, EventTranslator};
use crate::error::WatcherError;
use crate::Result;

/// How long events are collected before a batch is handed out.
const DEBOUNCE_DURATION: Duration = Duration::from_millis(200);

/// How long the first half of a rename waits for its partner.
const RENAME_WINDOW: Duration = Duration::from_millis(500);

/// Raw events buffered between the notify thread and the batcher.
const RAW_CHANNEL_CAPACITY: usize = 1024;

/// File watcher configuration.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Directories to watch recursively.
    pub roots: Vec<PathBuf>,
    /// Debounce duration.
    pub debounce: Duration,
    /// Rename pairing window.
    pub rename_window: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            debounce: DEBOUNCE_DURATION,
            rename_window: RENAME_WINDOW,
        }
    }
}

impl WatcherConfig {
    /// Default timings for the given roots.
    #[must_use]
    pub fn with_roots(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            ..Self::default()
        }
    }
}

/// File system watcher.
///
/// notify delivers raw events on its own thread; they cross into tokio over
/// a bounded channel and are translated and coalesced by [`Self::next_batch`].
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    raw_rx: mpsc::Receiver<Event>,
    translator: EventTranslator,
    watched: Vec<PathBuf>,
    debounce: Duration,
    rename_window: Duration,
}

impl FileWatcher {
    /// Create a watcher and subscribe to every existing root.
    ///
    /// Roots that do not exist are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform watcher cannot be created or an
    /// existing root cannot be watched.
    pub fn new(config: &WatcherConfig) -> Result<Self> {
        let (raw_tx, raw_rx) = mpsc::channel(RAW_CHANNEL_CAPACITY);

        let watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) => {
                    if raw_tx.blocking_send(event).is_err() {
                        tracing::trace!("Event receiver dropped");
                    }
                }
                Err(e) => tracing::error!(error = %e, "Watch error"),
            }
        })
        .map_err(|e| WatcherError::WatchFailed {
            path: "init".to_string(),
            reason: e.to_string(),
        })?;

        let mut file_watcher = Self {
            watcher,
            raw_rx,
            translator: EventTranslator::new(config.rename_window),
            watched: Vec::new(),
            debounce: config.debounce,
            rename_window: config.rename_window,
        };

        for root in &config.roots {
            if !root.is_dir() {
                tracing::warn!(root = %root.display(), "Root does not exist, not watching");
                continue;
            }
            file_watcher.watch(root)?;
        }

        Ok(file_watcher)
    }

    /// Add a directory to watch.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be watched.
    pub fn watch(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            return Err(WatcherError::WatchFailed {
                path: path.display().to_string(),
                reason: "directory does not exist".to_string(),
            }
            .into());
        }

        self.watcher
            .watch(&path, RecursiveMode::Recursive)
            .map_err(|e| WatcherError::WatchFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!(path = %path.display(), "Watching directory");
        self.watched.push(path);

        Ok(())
    }

    /// Stop watching a directory.
    ///
    /// # Errors
    ///
    /// Returns an error if unwatching fails.
    pub fn unwatch(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        self.watcher
            .unwatch(path)
            .map_err(|e| WatcherError::WatchFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        self.watched.retain(|p| p != path);

        tracing::info!(path = %path.display(), "Stopped watching directory");
        Ok(())
    }

    /// Get list of watched directories.
    #[must_use]
    pub fn watched_dirs(&self) -> &[PathBuf] {
        &self.watched
    }

    /// Wait for the next non-empty batch of events.
    ///
    /// Returns `None` once the notify side has shut down.
    pub async fn next_batch(&mut self) -> Option<EventBatch> {
        loop {
            let mut batch = EventBatch::new();

            // With a rename half outstanding, wake up in time to expire it.
            let first = if self.translator.has_pending() {
                match tokio::time::timeout(self.rename_window, self.raw_rx.recv()).await {
                    Ok(Some(event)) => Some(event),
                    Ok(None) => return None,
                    Err(_) => None,
                }
            } else {
                Some(self.raw_rx.recv().await?)
            };

            if let Some(event) = first {
                self.ingest(event, &mut batch);

                let deadline = tokio::time::Instant::now() + self.debounce;
                while let Ok(Some(event)) =
                    tokio::time::timeout_at(deadline, self.raw_rx.recv()).await
                {
                    self.ingest(event, &mut batch);
                }
            }

            for event in self.translator.expire(Instant::now()) {
                batch.add(event);
            }

            batch.retain_under(&self.watched);
            if !batch.is_empty() {
                return Some(batch);
            }
        }
    }

    fn ingest(&mut self, event: Event, batch: &mut EventBatch) {
        for file_event in self.translator.translate(event, Instant::now()) {
            batch.add(file_event);
        }
    }
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("watched", &self.watched)
            .field("debounce", &self.debounce)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_watcher_config_default() {
        let config = WatcherConfig::default();
        assert!(config.roots.is_empty());
        assert_eq!(config.debounce, DEBOUNCE_DURATION);
        assert_eq!(config.rename_window, RENAME_WINDOW);
    }

    #[tokio::test]
    async fn test_missing_roots_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let config = WatcherConfig::with_roots(vec![
            PathBuf::from("/nonexistent/directory"),
            tmp.path().to_path_buf(),
        ]);

        let watcher = FileWatcher::new(&config).unwrap();
        assert_eq!(watcher.watched_dirs(), &[tmp.path().to_path_buf()]);
    }

    #[tokio::test]
    async fn test_watch_nonexistent_dir_fails() {
        let mut watcher = FileWatcher::new(&WatcherConfig::default()).unwrap();
        assert!(watcher.watch("/nonexistent/directory").is_err());
    }

    #[tokio::test]
    async fn test_watch_and_unwatch() {
        let tmp = TempDir::new().unwrap();
        let mut watcher = FileWatcher::new(&WatcherConfig::default()).unwrap();

        watcher.watch(tmp.path()).unwrap();
        assert_eq!(watcher.watched_dirs().len(), 1);

        watcher.unwatch(tmp.path()).unwrap();
        assert!(watcher.watched_dirs().is_empty());
    }
}
