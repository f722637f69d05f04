//! One-shot bulk scan of the configured roots.
//!
//! Walks every root once, prunes denied directories without entering them,
//! asks the operator about unknown extensions and records everything else.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use super::filter::{extension_of, Disposition};
use super::indexer::{IndexOutcome, Indexer};
use super::resolver::{resolve, CachedDecision, DecisionCache, OperatorPrompt};
use crate::observability::spans;
use crate::storage::{append_journal, kinds, LinkConfidence, UpsertOutcome};
use crate::{Error, Result};

/// Lifecycle of a scanner. A scanner runs exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Walking,
    Done,
}

/// Totals for one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    /// Files hashed and upserted.
    pub processed: u64,
    /// Processed files whose row was inserted or whose content changed.
    pub changed: u64,
    /// Files left out, plus one per pruned directory.
    pub ignored: u64,
    /// Directories skipped without being entered.
    pub pruned_dirs: u64,
    /// Calls into the hasher.
    pub hash_attempts: u64,
    /// Entries the walker could not read.
    pub walk_errors: u64,
    /// Roots that did not exist.
    pub missing_roots: Vec<PathBuf>,
    /// Roots abandoned after a store failure.
    pub failed_roots: Vec<PathBuf>,
    /// "Always" answers given during the scan.
    pub decisions: DecisionCache,
}

impl fmt::Display for ScanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scan complete")?;
        writeln!(f, "  processed:   {}", self.processed)?;
        writeln!(f, "  changed:     {}", self.changed)?;
        writeln!(f, "  ignored:     {}", self.ignored)?;
        writeln!(f, "  pruned dirs: {}", self.pruned_dirs)?;
        if self.walk_errors > 0 {
            writeln!(f, "  walk errors: {}", self.walk_errors)?;
        }
        for root in &self.missing_roots {
            writeln!(f, "  missing root: {}", root.display())?;
        }
        for root in &self.failed_roots {
            writeln!(f, "  failed root:  {}", root.display())?;
        }
        if !self.decisions.is_empty() {
            writeln!(f, "  decisions for this scan:")?;
            for (extension, decision) in self.decisions.iter() {
                let verb = match decision {
                    CachedDecision::AlwaysProcess => "process",
                    CachedDecision::AlwaysIgnore => "ignore",
                };
                writeln!(f, "    .{extension}: always {verb}")?;
            }
        }
        Ok(())
    }
}

/// Walks the roots once and feeds files through the [`Indexer`].
#[derive(Debug)]
pub struct BulkScanner {
    indexer: Indexer,
    roots: Vec<PathBuf>,
    state: ScanState,
}

impl BulkScanner {
    #[must_use]
    pub fn new(indexer: Indexer, roots: Vec<PathBuf>) -> Self {
        Self {
            indexer,
            roots,
            state: ScanState::Idle,
        }
    }

    #[must_use]
    pub const fn state(&self) -> ScanState {
        self.state
    }

    /// Run the scan.
    ///
    /// Missing roots and per-file failures are recorded in the report. A
    /// store failure abandons the root being walked and moves on to the next.
    ///
    /// # Errors
    ///
    /// Returns an error if this scanner has already run.
    pub fn scan(&mut self, prompt: &mut dyn OperatorPrompt) -> Result<ScanReport> {
        if self.state != ScanState::Idle {
            return Err(Error::internal("bulk scan already ran"));
        }
        self.state = ScanState::Walking;

        let mut report = ScanReport::default();
        let mut cache = DecisionCache::new();

        for root in &self.roots {
            if !root.is_dir() {
                tracing::warn!(root = %root.display(), "Root does not exist, skipping");
                report.missing_roots.push(root.clone());
                continue;
            }

            let _span = spans::scan_span(root).entered();
            tracing::info!(root = %root.display(), "Scanning root");
            if let Err(e) = self.scan_root(root, prompt, &mut cache, &mut report) {
                tracing::error!(
                    root = %root.display(),
                    error = %e,
                    store_unavailable = e.is_store_unavailable(),
                    "Store failure, abandoning root"
                );
                report.failed_roots.push(root.clone());
            }
        }

        report.decisions = cache;
        self.state = ScanState::Done;

        tracing::info!(
            processed = report.processed,
            changed = report.changed,
            ignored = report.ignored,
            pruned_dirs = report.pruned_dirs,
            walk_errors = report.walk_errors,
            "Bulk scan complete"
        );

        Ok(report)
    }

    fn scan_root(
        &self,
        root: &Path,
        prompt: &mut dyn OperatorPrompt,
        cache: &mut DecisionCache,
        report: &mut ScanReport,
    ) -> Result<()> {
        let classifier = self.indexer.classifier();
        let mut walker = WalkDir::new(root).follow_links(false).into_iter();

        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "Error walking directory");
                    report.walk_errors += 1;
                    continue;
                }
            };

            // The root itself is trusted even if its name is on the deny list.
            if entry.depth() == 0 {
                continue;
            }

            let file_type = entry.file_type();
            if file_type.is_dir() {
                let denied = entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| classifier.is_denied_dir_name(name));
                if denied {
                    tracing::trace!(path = %entry.path().display(), "Pruning directory");
                    walker.skip_current_dir();
                    report.pruned_dirs += 1;
                    report.ignored += 1;
                }
                continue;
            }

            // Symlinks and special files are not assets.
            if !file_type.is_file() {
                continue;
            }

            self.scan_file(entry.path(), prompt, cache, report)?;
        }

        Ok(())
    }

    fn scan_file(
        &self,
        path: &Path,
        prompt: &mut dyn OperatorPrompt,
        cache: &mut DecisionCache,
        report: &mut ScanReport,
    ) -> Result<()> {
        let gate = match self.indexer.classifier().classify(path, Some(cache)) {
            Disposition::Deny(reason) => {
                tracing::trace!(path = %path.display(), %reason, "Ignoring file");
                Gate::Skip
            }
            Disposition::Allow => Gate::Process,
            Disposition::Ask => self.ask(path, prompt, cache)?,
        };

        if gate == Gate::Skip {
            report.ignored += 1;
            return Ok(());
        }

        report.hash_attempts += 1;
        let indexed = match gate {
            Gate::Skip | Gate::Process => self.indexer.index_file(path)?,
            Gate::ProcessAudited => self.indexer.index_file_then(path, |conn, outcome| {
                let kind = match outcome {
                    UpsertOutcome::Inserted(_) => kinds::FILE_CREATED,
                    UpsertOutcome::Updated(_) | UpsertOutcome::Unchanged(_) => {
                        kinds::FILE_MODIFIED
                    }
                };
                let context = format!(
                    "{} ({}, unknown extension processed unattended)",
                    path.display(),
                    outcome.describe()
                );
                append_journal(
                    conn,
                    kind,
                    &context,
                    Some(outcome.asset_id()),
                    Some(LinkConfidence::High),
                )?;
                Ok(())
            })?,
        };

        match indexed {
            IndexOutcome::Recorded(outcome) => {
                report.processed += 1;
                if outcome.is_change() {
                    report.changed += 1;
                }
            }
            IndexOutcome::Skipped(e) => {
                if e.is_not_found() {
                    tracing::debug!(path = %path.display(), "File vanished before hashing");
                } else {
                    tracing::warn!(path = %path.display(), error = %e, "Could not hash file");
                }
                report.ignored += 1;
            }
        }

        Ok(())
    }

    /// Put an unknown file in front of the operator.
    ///
    /// Prompt failures read as "ignore once". Every unattended answer is
    /// journaled: ignores here, processed files alongside their upsert.
    fn ask(
        &self,
        path: &Path,
        prompt: &mut dyn OperatorPrompt,
        cache: &mut DecisionCache,
    ) -> Result<Gate> {
        let extension = extension_of(path);
        let decision = match resolve(prompt, cache, path, &extension) {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Prompt failed, ignoring file");
                return Ok(Gate::Skip);
            }
        };

        Ok(match (decision.is_process(), prompt.is_attended()) {
            (true, true) => Gate::Process,
            (true, false) => Gate::ProcessAudited,
            (false, true) => Gate::Skip,
            (false, false) => {
                let context =
                    format!("{} (unknown extension .{extension}, ignored)", path.display());
                self.indexer.database().with_conn(|conn| {
                    append_journal(conn, kinds::FILE_UNCLASSIFIED, &context, None, None)
                })?;
                Gate::Skip
            }
        })
    }
}

/// What the scanner does with one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Skip,
    Process,
    /// Processed on an unattended answer; the upsert is journaled.
    ProcessAudited,
}
