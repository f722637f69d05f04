//! Database schema definitions and migrations.

use rusqlite::Connection;

use crate::error::StorageError;
use crate::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Run all pending migrations.
///
/// # Errors
///
/// Returns an error if migrations fail.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )
    .map_err(|e| StorageError::Migration(format!("failed to create migrations table: {e}")))?;

    let current_version = get_current_version(conn)?;
    tracing::debug!(
        current = current_version,
        target = SCHEMA_VERSION,
        "Checking database migrations"
    );

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

fn get_current_version(conn: &Connection) -> Result<i32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(|e| StorageError::Migration(format!("failed to get version: {e}")).into())
}

fn record_migration(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)",
        rusqlite::params![version, chrono::Utc::now().timestamp()],
    )
    .map_err(|e| StorageError::Migration(format!("failed to record migration: {e}")))?;

    Ok(())
}

/// Migration v1: asset inventory and action journal.
fn migrate_v1(conn: &Connection) -> Result<()> {
    tracing::info!("Applying migration v1: assets and journal");

    conn.execute_batch(
        r"
        -- One row per absolute path
        CREATE TABLE IF NOT EXISTS assets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            path TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            extension TEXT NOT NULL,
            size INTEGER NOT NULL,
            token_estimate INTEGER NOT NULL DEFAULT 0,
            fingerprint TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at INTEGER NOT NULL,
            modified_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_assets_status ON assets(status);
        CREATE INDEX IF NOT EXISTS idx_assets_extension ON assets(extension);

        -- Append-only action journal
        CREATE TABLE IF NOT EXISTS journal (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            recorded_at INTEGER NOT NULL,
            kind TEXT NOT NULL,
            context TEXT NOT NULL,
            asset_id INTEGER REFERENCES assets(id),
            confidence TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_journal_asset ON journal(asset_id);
        CREATE INDEX IF NOT EXISTS idx_journal_kind ON journal(kind);

        CREATE TRIGGER IF NOT EXISTS journal_no_update
        BEFORE UPDATE ON journal
        BEGIN
            SELECT RAISE(ABORT, 'journal is append-only');
        END;

        CREATE TRIGGER IF NOT EXISTS journal_no_delete
        BEFORE DELETE ON journal
        BEGIN
            SELECT RAISE(ABORT, 'journal is append-only');
        END;
        ",
    )
    .map_err(|e| StorageError::Migration(format!("v1 migration failed: {e}")))?;

    record_migration(conn, 1)?;
    tracing::info!("Migration v1 complete");

    Ok(())
}

/// Verify all expected tables exist.
///
/// # Errors
///
/// Returns an error if any expected table is missing from the schema.
pub fn verify_schema(conn: &Connection) -> Result<()> {
    for table in ["assets", "journal"] {
        let exists: bool = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type='table' AND name=?",
                [table],
                |_| Ok(true),
            )
            .unwrap_or(false);

        if !exists {
            return Err(StorageError::Migration(format!("table '{table}' not found")).into());
        }
    }

    tracing::debug!("Schema verification passed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    #[test]
    fn test_migrate_empty_database() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            migrate(conn)?;
            verify_schema(conn)?;
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_migrate_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            migrate(conn)?;
            migrate(conn)?;
            verify_schema(conn)?;
            assert_eq!(get_current_version(conn)?, SCHEMA_VERSION);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_verify_schema_detects_missing_tables() {
        let db = Database::open_in_memory().unwrap();
        let result = db.with_conn(verify_schema);
        assert!(result.is_err());
    }

    #[test]
    fn test_unique_path_constraint() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            migrate(conn)?;

            let insert = "INSERT INTO assets (path, name, extension, size, created_at, \
                          modified_at) VALUES ('/docs/a.md', 'a.md', 'md', 1, 0, 0)";
            conn.execute(insert, []).unwrap();
            assert!(conn.execute(insert, []).is_err());

            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_journal_rejects_update_and_delete() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            migrate(conn)?;

            conn.execute(
                "INSERT INTO journal (recorded_at, kind, context) VALUES (1, 'file-created', 'x')",
                [],
            )
            .unwrap();

            assert!(conn
                .execute("UPDATE journal SET context = 'y'", [])
                .is_err());
            assert!(conn.execute("DELETE FROM journal", []).is_err());

            Ok(())
        })
        .unwrap();
    }
}
