//! Hash-and-upsert: the unit of work shared by the scanner and the watcher.

use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;

use super::filter::{extension_of, Classifier};
use super::hasher::fingerprint;
use crate::error::HashError;
use crate::observability::spans;
use crate::storage::{upsert_asset, AssetDraft, Database, UpsertOutcome};
use crate::Result;

/// Result of processing one file.
#[derive(Debug)]
pub enum IndexOutcome {
    /// The file was hashed and the store updated.
    Recorded(UpsertOutcome),
    /// The file could not be hashed; nothing was written.
    Skipped(HashError),
}

/// Fingerprints files and records them in the inventory.
///
/// Clone is cheap - the database handle and classifier are shared.
#[derive(Debug, Clone)]
pub struct Indexer {
    db: Database,
    classifier: Arc<Classifier>,
}

impl Indexer {
    #[must_use]
    pub fn new(db: Database, classifier: Arc<Classifier>) -> Self {
        Self { db, classifier }
    }

    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    #[must_use]
    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Hash a file and build the row values for it.
    ///
    /// # Errors
    ///
    /// Returns the hashing failure; the file system is the only thing touched.
    pub fn draft(&self, path: &Path) -> std::result::Result<AssetDraft, HashError> {
        let fp = fingerprint(path)?;
        let extension = extension_of(path);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(AssetDraft::new(
            path.to_string_lossy(),
            name,
            extension.as_str(),
            i64::try_from(fp.bytes).unwrap_or(i64::MAX),
            self.classifier.token_estimate(&extension, fp.bytes),
            fp.hex,
        ))
    }

    /// Hash a file and upsert it.
    ///
    /// # Errors
    ///
    /// Only store failures are errors; a file that cannot be hashed comes
    /// back as [`IndexOutcome::Skipped`].
    pub fn index_file(&self, path: &Path) -> Result<IndexOutcome> {
        self.index_file_then(path, |_, _| Ok(()))
    }

    /// Hash a file, upsert it, and run `then` in the same transaction.
    ///
    /// `then` sees the upsert outcome; if it fails the upsert is rolled back.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert or `then` fails.
    pub fn index_file_then<F>(&self, path: &Path, then: F) -> Result<IndexOutcome>
    where
        F: FnOnce(&Connection, UpsertOutcome) -> Result<()>,
    {
        let draft = match self.draft(path) {
            Ok(draft) => draft,
            Err(e) => return Ok(IndexOutcome::Skipped(e)),
        };

        let outcome = spans::db_span("upsert", "assets").in_scope(|| {
            self.db.with_transaction(|conn| {
                let outcome = upsert_asset(conn, &draft)?;
                then(conn, outcome)?;
                Ok(outcome)
            })
        })?;

        tracing::debug!(
            path = %path.display(),
            id = outcome.asset_id(),
            outcome = outcome.describe(),
            "Recorded asset"
        );

        Ok(IndexOutcome::Recorded(outcome))
    }
}
