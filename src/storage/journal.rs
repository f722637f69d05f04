//! Append-only action journal.

use rusqlite::{params, Connection, Row};

use super::models::{now_millis, JournalEntry, LinkConfidence};
use crate::error::StorageError;
use crate::Result;

const JOURNAL_COLUMNS: &str = "id, recorded_at, kind, context, asset_id, confidence";

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<JournalEntry> {
    let confidence: Option<String> = row.get(5)?;
    let confidence = confidence
        .map(|c| c.parse::<LinkConfidence>())
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(JournalEntry {
        id: row.get(0)?,
        recorded_at: row.get(1)?,
        kind: row.get(2)?,
        context: row.get(3)?,
        asset_id: row.get(4)?,
        confidence,
    })
}

/// Append one entry to the journal and return its id.
///
/// # Errors
///
/// Returns an error if the insert fails, including when `asset_id` names an
/// asset that does not exist.
pub fn append_journal(
    conn: &Connection,
    kind: &str,
    context: &str,
    asset_id: Option<i64>,
    confidence: Option<LinkConfidence>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO journal (recorded_at, kind, context, asset_id, confidence) \
         VALUES (?, ?, ?, ?, ?)",
        params![
            now_millis(),
            kind,
            context,
            asset_id,
            confidence.map(LinkConfidence::as_str),
        ],
    )
    .map_err(StorageError::from)?;

    let id = conn.last_insert_rowid();
    tracing::trace!(id, kind, ?asset_id, "Appended journal entry");
    Ok(id)
}

fn newest_first_window(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<JournalEntry>> {
    let mut stmt = conn.prepare(sql).map_err(StorageError::from)?;

    let mut entries = stmt
        .query_map(params, entry_from_row)
        .map_err(StorageError::from)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(StorageError::from)?;

    // Queried newest-first to pick the window; callers get chronological order.
    entries.reverse();
    Ok(entries)
}

/// The `limit` most recent entries, oldest first.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn recent_journal(conn: &Connection, limit: usize) -> Result<Vec<JournalEntry>> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    newest_first_window(
        conn,
        &format!("SELECT {JOURNAL_COLUMNS} FROM journal ORDER BY id DESC LIMIT ?"),
        params![limit],
    )
}

/// The `limit` most recent entries linked to one asset, oldest first.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn journal_for_asset(
    conn: &Connection,
    asset_id: i64,
    limit: usize,
) -> Result<Vec<JournalEntry>> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    newest_first_window(
        conn,
        &format!(
            "SELECT {JOURNAL_COLUMNS} FROM journal WHERE asset_id = ? ORDER BY id DESC LIMIT ?"
        ),
        params![asset_id, limit],
    )
}

/// Count journal entries.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn count_journal_entries(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM journal", [], |row| row.get(0))
        .map_err(|e| StorageError::from_sqlite(&e).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{kinds, migrate, upsert_asset, AssetDraft, Database};

    fn setup_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| migrate(conn)).unwrap();
        db
    }

    #[test]
    fn test_recent_journal_returns_window_in_chronological_order() {
        let db = setup_db();

        db.with_conn(|conn| {
            for n in 1..=5 {
                append_journal(conn, "test", &format!("E{n}"), None, None)?;
            }

            let contexts: Vec<String> = recent_journal(conn, 3)?
                .into_iter()
                .map(|e| e.context)
                .collect();
            assert_eq!(contexts, vec!["E3", "E4", "E5"]);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_recent_journal_limit_larger_than_log() {
        let db = setup_db();

        db.with_conn(|conn| {
            append_journal(conn, "test", "only", None, None)?;
            let entries = recent_journal(conn, 10)?;
            assert_eq!(entries.len(), 1);
            assert!(recent_journal(conn, 0)?.is_empty());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_append_linked_entry() {
        let db = setup_db();

        db.with_conn(|conn| {
            let asset_id = upsert_asset(
                conn,
                &AssetDraft::new("/docs/a.md", "a.md", "md", 8, 2, "f"),
            )?
            .asset_id();

            let id = append_journal(
                conn,
                kinds::FILE_CREATED,
                "/docs/a.md",
                Some(asset_id),
                Some(LinkConfidence::High),
            )?;
            append_journal(conn, kinds::RESOURCE_ALERT, "CPU=99.0%", None, None)?;

            let linked = journal_for_asset(conn, asset_id, 10)?;
            assert_eq!(linked.len(), 1);
            assert_eq!(linked[0].id, id);
            assert_eq!(linked[0].kind, "file-created");
            assert_eq!(linked[0].confidence, Some(LinkConfidence::High));
            assert!(linked[0].recorded_at > 0);

            let all = recent_journal(conn, 10)?;
            assert_eq!(all[1].asset_id, None);
            assert_eq!(all[1].confidence, None);
            assert_eq!(count_journal_entries(conn)?, 2);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_append_with_unknown_asset_fails() {
        let db = setup_db();
        let result = db.with_conn(|conn| {
            append_journal(conn, kinds::FILE_CREATED, "x", Some(404), None)
        });
        assert!(result.is_err());
    }
}
