//! Database query modules.
//!
//! This module organizes all database operations into logical groups:
//! - cache: cache-entry store (get/set/delete/bulk eviction)
//! - retry: durable retry queue and per-day retry stats
//!
//! Timestamps are stored as RFC3339 text and always written from Rust so
//! that string comparisons against bound parameters are well ordered.

pub mod cache;
pub mod retry;

use chrono::{DateTime, Utc};
use framevault_common::{Error, Result};

/// Parse an RFC3339 timestamp column.
pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::database(format!("Invalid timestamp '{}': {}", raw, e)))
}
