//! Data models for the inventory store.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Current time as Unix milliseconds.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Journal event kinds produced by this crate.
///
/// The journal accepts any tag; these are the ones the engine and the
/// monitors write.
pub mod kinds {
    pub const FILE_CREATED: &str = "file-created";
    pub const FILE_MODIFIED: &str = "file-modified";
    pub const FILE_DELETED: &str = "file-deleted";
    pub const FILE_MOVED: &str = "file-moved";
    pub const FILE_UNCLASSIFIED: &str = "file-unclassified";
    pub const RESOURCE_ALERT: &str = "resource-alert";
    pub const WINDOW_FOCUS_CHANGED: &str = "window-focus-changed";
}

/// Downstream processing state of an asset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetStatus {
    /// Waiting for (re)processing by downstream consumers.
    #[default]
    Pending,
    /// Processed downstream.
    Indexed,
    /// Downstream processing failed.
    Error,
}

impl AssetStatus {
    /// Column representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Indexed => "indexed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetStatus {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "indexed" => Ok(Self::Indexed),
            "error" => Ok(Self::Error),
            other => Err(StorageError::Database(format!(
                "unknown asset status '{other}'"
            ))),
        }
    }
}

/// A tracked file as stored in the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: i64,
    /// Absolute path; the asset's identity.
    pub path: String,
    pub name: String,
    /// Lower-cased, without the leading dot.
    pub extension: String,
    pub size: i64,
    pub token_estimate: i64,
    /// Hex digest of the content; `None` only before the first successful hash.
    pub fingerprint: Option<String>,
    pub status: AssetStatus,
    /// Unix ms of the first insert.
    pub created_at: i64,
    /// Unix ms of the last content change recorded for this row.
    pub modified_at: i64,
}

/// Values for an upsert, produced from a freshly hashed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetDraft {
    pub path: String,
    pub name: String,
    pub extension: String,
    pub size: i64,
    pub token_estimate: i64,
    pub fingerprint: String,
}

impl AssetDraft {
    /// Create a new draft.
    #[must_use]
    pub fn new(
        path: impl Into<String>,
        name: impl Into<String>,
        extension: impl Into<String>,
        size: i64,
        token_estimate: i64,
        fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            extension: extension.into(),
            size,
            token_estimate,
            fingerprint: fingerprint.into(),
        }
    }
}

/// What an upsert did to the asset table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new row was created.
    Inserted(i64),
    /// The fingerprint changed; the row was updated and reset to pending.
    Updated(i64),
    /// The fingerprint matched; status and modification time were left alone.
    Unchanged(i64),
}

impl UpsertOutcome {
    /// Id of the affected asset row.
    #[must_use]
    pub const fn asset_id(self) -> i64 {
        match self {
            Self::Inserted(id) | Self::Updated(id) | Self::Unchanged(id) => id,
        }
    }

    /// Whether the row's content fingerprint was written.
    #[must_use]
    pub const fn is_change(self) -> bool {
        !matches!(self, Self::Unchanged(_))
    }

    /// Short description used in logs and journal context.
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Inserted(_) => "new asset",
            Self::Updated(_) => "content changed",
            Self::Unchanged(_) => "content unchanged",
        }
    }
}

/// How sure we are that a journal entry points at the right asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkConfidence {
    /// The event itself names the asset.
    High,
    /// The link is inferred (e.g. the old identity of a moved file).
    Medium,
    /// No meaningful link.
    #[serde(rename = "none")]
    Unlinked,
}

impl LinkConfidence {
    /// Column representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Unlinked => "none",
        }
    }
}

impl fmt::Display for LinkConfidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkConfidence {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "none" => Ok(Self::Unlinked),
            other => Err(StorageError::Database(format!(
                "unknown link confidence '{other}'"
            ))),
        }
    }
}

/// One row of the action journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: i64,
    /// Unix ms at insert.
    pub recorded_at: i64,
    pub kind: String,
    pub context: String,
    pub asset_id: Option<i64>,
    pub confidence: Option<LinkConfidence>,
}
