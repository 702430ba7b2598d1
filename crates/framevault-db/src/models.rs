//! Internal Rust models matching the database schema.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A single cached payload.
///
/// The value is an opaque serialized blob; the engine's cache layer owns
/// (de)serialization. Entries whose `expires_at` is in the past are treated
/// as absent by the query layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub value: String,
    pub entry_type: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A durable retryable task.
///
/// `attempt_count` counts failed drain cycles; once it reaches
/// `max_attempts` the item is exhausted and removed from the active queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryQueueItem {
    pub id: i64,
    pub task_id: String,
    pub task_type: String,
    pub payload: String,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub next_attempt_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only per-day counters for retry observability.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryStatsRow {
    pub task_type: String,
    pub date: NaiveDate,
    pub total_queued: u64,
    pub total_succeeded: u64,
    pub total_failed: u64,
    pub total_exhausted: u64,
}
