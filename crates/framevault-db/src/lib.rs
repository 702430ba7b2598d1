//! Framevault-DB: persistence substrate for the metadata engine.
//!
//! This crate provides the SQLite-backed stores the resolution engine relies
//! on, using rusqlite with r2d2 connection pooling:
//!
//! - `migrations` - embedded schema migrations
//! - `pool` - connection pool management (WAL mode, bounded size)
//! - `models` - Rust models matching the database schema
//! - `queries` - query operations for the cache store and the retry queue
//!
//! # Example
//!
//! ```no_run
//! use framevault_db::pool::{get_conn, init_pool};
//! use framevault_db::queries::cache;
//!
//! let pool = init_pool("/var/lib/framevault/db.sqlite").unwrap();
//! let conn = get_conn(&pool).unwrap();
//!
//! let entry = cache::get(&conn, "tmdb:movie_detail/550:en").unwrap();
//! assert!(entry.is_none());
//! ```

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;

pub use pool::{get_conn, init_memory_pool, init_pool, DbPool, PooledConnection};
