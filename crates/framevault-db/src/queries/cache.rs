//! Cache store queries.
//!
//! Stores opaque serialized payloads keyed by a deterministic signature,
//! with a TTL. Entries whose `expires_at` is in the past are treated as
//! absent by [`get`] and reclaimed in bulk by [`clear_expired`].

use chrono::{Duration, Utc};
use framevault_common::{Error, Result};
use rusqlite::{params, Connection};

use crate::models::CacheEntry;
use crate::queries::parse_timestamp;

/// Fetch a cache entry by key. Expired entries are treated as absent.
pub fn get(conn: &Connection, key: &str) -> Result<Option<CacheEntry>> {
    let now = Utc::now().to_rfc3339();
    match conn.query_row(
        "SELECT key, value, entry_type, expires_at, created_at, updated_at
         FROM cache_entries WHERE key = ?1 AND expires_at > ?2",
        params![key, now],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        },
    ) {
        Ok((key, value, entry_type, expires_at, created_at, updated_at)) => {
            Ok(Some(CacheEntry {
                key,
                value,
                entry_type,
                expires_at: parse_timestamp(&expires_at)?,
                created_at: parse_timestamp(&created_at)?,
                updated_at: parse_timestamp(&updated_at)?,
            }))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Insert or overwrite a cache entry with the given TTL.
///
/// An upsert preserves the original `created_at` for an existing key and
/// bumps `updated_at`.
pub fn set(conn: &Connection, key: &str, value: &str, entry_type: &str, ttl: Duration) -> Result<()> {
    let now = Utc::now();
    let expires_at = now + ttl;

    conn.execute(
        "INSERT INTO cache_entries (key, value, entry_type, expires_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)
         ON CONFLICT(key) DO UPDATE SET
             value = excluded.value,
             entry_type = excluded.entry_type,
             expires_at = excluded.expires_at,
             updated_at = excluded.updated_at",
        params![
            key,
            value,
            entry_type,
            expires_at.to_rfc3339(),
            now.to_rfc3339(),
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(())
}

/// Delete a cache entry. Returns `true` when a row was removed.
pub fn delete(conn: &Connection, key: &str) -> Result<bool> {
    let affected = conn
        .execute("DELETE FROM cache_entries WHERE key = ?1", params![key])
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(affected > 0)
}

/// Remove all expired entries, returning the number evicted.
pub fn clear_expired(conn: &Connection) -> Result<usize> {
    let now = Utc::now().to_rfc3339();
    conn.execute("DELETE FROM cache_entries WHERE expires_at <= ?1", params![now])
        .map_err(|e| Error::database(e.to_string()))
}

/// Remove every entry in a logical namespace, returning the number removed.
pub fn clear_by_type(conn: &Connection, entry_type: &str) -> Result<usize> {
    conn.execute(
        "DELETE FROM cache_entries WHERE entry_type = ?1",
        params![entry_type],
    )
    .map_err(|e| Error::database(e.to_string()))
}
