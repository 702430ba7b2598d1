//! Retry queue and retry stats queries.
//!
//! The retry queue is a durable record of failed idempotent tasks. Each row
//! carries its own backoff schedule state (`attempt_count`, `next_attempt_at`)
//! and attempt budget (`max_attempts`). The stats table holds append-only
//! per-day counters for observability; nothing reads them for control flow.

use chrono::{DateTime, NaiveDate, Utc};
use framevault_common::{Error, Result};
use rusqlite::{params, Connection, Row};

use crate::models::{RetryQueueItem, RetryStatsRow};
use crate::queries::parse_timestamp;

/// Outcome of an enqueue attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new row was created with the given surrogate id.
    Queued(i64),
    /// A row with the same task_id already exists; nothing was written.
    Duplicate,
}

/// Which per-day counter to increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatCounter {
    Queued,
    Succeeded,
    Failed,
    Exhausted,
}

impl StatCounter {
    fn column(self) -> &'static str {
        match self {
            Self::Queued => "total_queued",
            Self::Succeeded => "total_succeeded",
            Self::Failed => "total_failed",
            Self::Exhausted => "total_exhausted",
        }
    }
}

/// Enqueue a task for retry.
///
/// Idempotent per `task_id`: a duplicate is reported as
/// [`EnqueueOutcome::Duplicate`], not an error, and leaves the existing row
/// untouched. A fresh enqueue also bumps the `total_queued` counter for
/// (`task_type`, today).
pub fn enqueue(
    conn: &Connection,
    task_id: &str,
    task_type: &str,
    payload: &str,
    max_attempts: u32,
    next_attempt_at: DateTime<Utc>,
) -> Result<EnqueueOutcome> {
    let now = Utc::now();
    let affected = conn
        .execute(
            "INSERT INTO retry_queue
                 (task_id, task_type, payload, attempt_count, max_attempts,
                  next_attempt_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, 0, ?4, ?5, ?6, ?6)
             ON CONFLICT(task_id) DO NOTHING",
            params![
                task_id,
                task_type,
                payload,
                max_attempts,
                next_attempt_at.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| Error::database(e.to_string()))?;

    if affected == 0 {
        return Ok(EnqueueOutcome::Duplicate);
    }

    bump_stat(conn, task_type, now.date_naive(), StatCounter::Queued)?;
    Ok(EnqueueOutcome::Queued(conn.last_insert_rowid()))
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<(RetryQueueItem, String, String, String)> {
    Ok((
        RetryQueueItem {
            id: row.get(0)?,
            task_id: row.get(1)?,
            task_type: row.get(2)?,
            payload: row.get(3)?,
            attempt_count: row.get(4)?,
            max_attempts: row.get(5)?,
            last_error: row.get(6)?,
            // Placeholder timestamps, replaced by the caller after parsing.
            next_attempt_at: Utc::now(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        },
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
    ))
}

fn finish_item(parts: (RetryQueueItem, String, String, String)) -> Result<RetryQueueItem> {
    let (mut item, next_attempt_at, created_at, updated_at) = parts;
    item.next_attempt_at = parse_timestamp(&next_attempt_at)?;
    item.created_at = parse_timestamp(&created_at)?;
    item.updated_at = parse_timestamp(&updated_at)?;
    Ok(item)
}

const ITEM_COLUMNS: &str = "id, task_id, task_type, payload, attempt_count, max_attempts,
     last_error, next_attempt_at, created_at, updated_at";

/// Fetch all items due at or before `now`, ordered by `next_attempt_at`.
pub fn due_items(conn: &Connection, now: DateTime<Utc>) -> Result<Vec<RetryQueueItem>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM retry_queue
             WHERE next_attempt_at <= ?1 ORDER BY next_attempt_at"
        ))
        .map_err(|e| Error::database(e.to_string()))?;

    let rows = stmt
        .query_map(params![now.to_rfc3339()], item_from_row)
        .map_err(|e| Error::database(e.to_string()))?;

    let mut items = Vec::new();
    for row in rows {
        items.push(finish_item(row.map_err(|e| Error::database(e.to_string()))?)?);
    }
    Ok(items)
}

/// Look up a queue item by its task id.
pub fn get_by_task_id(conn: &Connection, task_id: &str) -> Result<Option<RetryQueueItem>> {
    match conn.query_row(
        &format!("SELECT {ITEM_COLUMNS} FROM retry_queue WHERE task_id = ?1"),
        params![task_id],
        item_from_row,
    ) {
        Ok(parts) => Ok(Some(finish_item(parts)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Record a failed attempt: increment `attempt_count`, store the error, and
/// reschedule.
///
/// The caller decides whether the item survives (and computes the new
/// `next_attempt_at`) or is exhausted (and calls [`remove`] instead).
pub fn record_failure(
    conn: &Connection,
    id: i64,
    last_error: &str,
    next_attempt_at: DateTime<Utc>,
) -> Result<()> {
    let affected = conn
        .execute(
            "UPDATE retry_queue SET
                 attempt_count = attempt_count + 1,
                 last_error = ?2,
                 next_attempt_at = ?3,
                 updated_at = ?4
             WHERE id = ?1",
            params![
                id,
                last_error,
                next_attempt_at.to_rfc3339(),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| Error::database(e.to_string()))?;

    if affected == 0 {
        return Err(Error::not_found(format!("retry queue item {}", id)));
    }
    Ok(())
}

/// Remove an item from the active queue. Returns `true` when a row existed.
pub fn remove(conn: &Connection, id: i64) -> Result<bool> {
    let affected = conn
        .execute("DELETE FROM retry_queue WHERE id = ?1", params![id])
        .map_err(|e| Error::database(e.to_string()))?;

    Ok(affected > 0)
}

/// Number of items currently in the active queue.
pub fn count_active(conn: &Connection) -> Result<u64> {
    conn.query_row("SELECT COUNT(*) FROM retry_queue", [], |row| {
        row.get::<_, i64>(0)
    })
    .map(|n| n as u64)
    .map_err(|e| Error::database(e.to_string()))
}

/// Increment one counter for (`task_type`, `date`).
pub fn bump_stat(
    conn: &Connection,
    task_type: &str,
    date: NaiveDate,
    counter: StatCounter,
) -> Result<()> {
    let column = counter.column();
    conn.execute(
        &format!(
            "INSERT INTO retry_stats (task_type, date, {column})
             VALUES (?1, ?2, 1)
             ON CONFLICT(task_type, date) DO UPDATE SET {column} = {column} + 1"
        ),
        params![task_type, date.to_string()],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(())
}

/// Fetch the counters for (`task_type`, `date`), if any were recorded.
pub fn stats_for(conn: &Connection, task_type: &str, date: NaiveDate) -> Result<Option<RetryStatsRow>> {
    match conn.query_row(
        "SELECT task_type, date, total_queued, total_succeeded, total_failed, total_exhausted
         FROM retry_stats WHERE task_type = ?1 AND date = ?2",
        params![task_type, date.to_string()],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
            ))
        },
    ) {
        Ok((task_type, date, queued, succeeded, failed, exhausted)) => {
            let date = date
                .parse::<NaiveDate>()
                .map_err(|e| Error::database(format!("Invalid stats date '{}': {}", date, e)))?;
            Ok(Some(RetryStatsRow {
                task_type,
                date,
                total_queued: queued as u64,
                total_succeeded: succeeded as u64,
                total_failed: failed as u64,
                total_exhausted: exhausted as u64,
            }))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}
