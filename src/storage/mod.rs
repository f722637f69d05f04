//! `SQLite` inventory store.
//!
//! Two tables:
//! - `assets`: one row per absolute path, keyed on content fingerprint
//! - `journal`: append-only log of observed events, optionally linked to an asset

mod assets;
mod connection;
mod journal;
mod models;
mod schema;

pub use assets::{
    count_assets, get_asset_by_id, get_asset_by_path, list_assets_by_status, set_asset_status,
    upsert_asset,
};
pub use connection::Database;
pub use journal::{append_journal, count_journal_entries, journal_for_asset, recent_journal};
pub use models::{
    kinds, AssetDraft, AssetRecord, AssetStatus, JournalEntry, LinkConfidence, UpsertOutcome,
};
pub use schema::{migrate, verify_schema, SCHEMA_VERSION};

/// Initialize storage with migrations.
///
/// # Errors
///
/// Returns an error if database initialization fails.
pub fn init_storage(db: &Database) -> crate::Result<()> {
    db.with_conn(|conn| {
        migrate(conn)?;
        verify_schema(conn)?;

        tracing::info!(path = db.path(), "Storage initialized, schema version {SCHEMA_VERSION}");
        Ok(())
    })
}
