//! Asset table operations.
//!
//! `upsert_asset` is the only writer of content fields. It must run inside
//! [`Database::with_transaction`](super::Database::with_transaction) so the
//! lookup and the insert/update it decides on cannot interleave with another
//! caller upserting the same path.

use rusqlite::{params, Connection, Row};

use super::models::{now_millis, AssetDraft, AssetRecord, AssetStatus, UpsertOutcome};
use crate::error::StorageError;
use crate::Result;

const ASSET_COLUMNS: &str =
    "id, path, name, extension, size, token_estimate, fingerprint, status, created_at, modified_at";

fn asset_from_row(row: &Row<'_>) -> rusqlite::Result<AssetRecord> {
    let status: String = row.get(7)?;
    let status = status.parse::<AssetStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(AssetRecord {
        id: row.get(0)?,
        path: row.get(1)?,
        name: row.get(2)?,
        extension: row.get(3)?,
        size: row.get(4)?,
        token_estimate: row.get(5)?,
        fingerprint: row.get(6)?,
        status,
        created_at: row.get(8)?,
        modified_at: row.get(9)?,
    })
}

fn query_one(conn: &Connection, sql: &str, param: &dyn rusqlite::ToSql) -> Result<Option<AssetRecord>> {
    match conn.query_row(sql, [param], asset_from_row) {
        Ok(asset) => Ok(Some(asset)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(StorageError::from_sqlite(&e).into()),
    }
}

/// Look up an asset by absolute path.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn get_asset_by_path(conn: &Connection, path: &str) -> Result<Option<AssetRecord>> {
    query_one(
        conn,
        &format!("SELECT {ASSET_COLUMNS} FROM assets WHERE path = ?"),
        &path,
    )
}

/// Look up an asset by id.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn get_asset_by_id(conn: &Connection, id: i64) -> Result<Option<AssetRecord>> {
    query_one(
        conn,
        &format!("SELECT {ASSET_COLUMNS} FROM assets WHERE id = ?"),
        &id,
    )
}

/// Insert or update the asset for `draft.path`, keyed on content fingerprint.
///
/// - No row: insert with status pending.
/// - Same fingerprint: status and `modified_at` are untouched; size and token
///   estimate are refreshed if they drifted.
/// - Different fingerprint: content fields and `modified_at` are written and
///   the status goes back to pending.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub fn upsert_asset(conn: &Connection, draft: &AssetDraft) -> Result<UpsertOutcome> {
    let Some(existing) = get_asset_by_path(conn, &draft.path)? else {
        let now = now_millis();
        conn.execute(
            "INSERT INTO assets (path, name, extension, size, token_estimate, fingerprint, \
             status, created_at, modified_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                draft.path,
                draft.name,
                draft.extension,
                draft.size,
                draft.token_estimate,
                draft.fingerprint,
                AssetStatus::Pending.as_str(),
                now,
                now,
            ],
        )
        .map_err(StorageError::from)?;

        let id = conn.last_insert_rowid();
        tracing::trace!(id, path = %draft.path, "Inserted asset");
        return Ok(UpsertOutcome::Inserted(id));
    };

    if existing.fingerprint.as_deref() == Some(draft.fingerprint.as_str()) {
        if existing.size != draft.size || existing.token_estimate != draft.token_estimate {
            conn.execute(
                "UPDATE assets SET size = ?, token_estimate = ? WHERE id = ?",
                params![draft.size, draft.token_estimate, existing.id],
            )
            .map_err(StorageError::from)?;
        }
        return Ok(UpsertOutcome::Unchanged(existing.id));
    }

    conn.execute(
        "UPDATE assets SET fingerprint = ?, size = ?, token_estimate = ?, modified_at = ?, \
         status = ? WHERE id = ?",
        params![
            draft.fingerprint,
            draft.size,
            draft.token_estimate,
            now_millis(),
            AssetStatus::Pending.as_str(),
            existing.id,
        ],
    )
    .map_err(StorageError::from)?;

    tracing::trace!(id = existing.id, path = %draft.path, "Updated asset fingerprint");
    Ok(UpsertOutcome::Updated(existing.id))
}

/// Record the outcome of downstream processing for an asset.
///
/// The scanner and watcher never call this; it belongs to consumers of the
/// inventory.
///
/// # Errors
///
/// Returns an error if the asset does not exist or the update fails.
pub fn set_asset_status(conn: &Connection, id: i64, status: AssetStatus) -> Result<()> {
    let rows = conn
        .execute(
            "UPDATE assets SET status = ? WHERE id = ?",
            params![status.as_str(), id],
        )
        .map_err(StorageError::from)?;

    if rows == 0 {
        return Err(StorageError::not_found("asset", id.to_string()).into());
    }
    Ok(())
}

/// List assets in a given state, least recently changed first.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn list_assets_by_status(
    conn: &Connection,
    status: AssetStatus,
    limit: usize,
) -> Result<Vec<AssetRecord>> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {ASSET_COLUMNS} FROM assets WHERE status = ? \
             ORDER BY modified_at, id LIMIT ?"
        ))
        .map_err(StorageError::from)?;

    let assets = stmt
        .query_map(params![status.as_str(), limit], asset_from_row)
        .map_err(StorageError::from)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(StorageError::from)?;

    Ok(assets)
}

/// Count tracked assets.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn count_assets(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM assets", [], |row| row.get(0))
        .map_err(|e| StorageError::from_sqlite(&e).into())
}
