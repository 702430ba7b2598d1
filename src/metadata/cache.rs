//! Cache-aside layer over the SQLite cache store.
//!
//! Resolution results are expensive (several network round-trips) and stable
//! over days, so they are cached as JSON under a deterministic key signature.
//! Cache failures never break resolution: a read error or stale schema is a
//! miss, a write error is logged and swallowed. Fetch errors always propagate.

use std::future::Future;
use std::time::Duration;

use framevault_db::queries::cache as cache_queries;
use framevault_db::{get_conn, DbPool};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::ProviderError;

pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Build a deterministic cache key: `{service}:{operation}/{resource}:{params}`.
///
/// Params are joined in the order given, so callers must pass them in a
/// stable order for equal requests to hit the same entry.
pub fn cache_key(service: &str, operation: &str, resource: &str, params: &[&str]) -> String {
    let mut key = format!("{service}:{operation}/{resource}");
    if !params.is_empty() {
        key.push(':');
        key.push_str(&params.join(":"));
    }
    key
}

/// Cache-aside wrapper around the shared connection pool.
#[derive(Clone)]
pub struct MetadataCache {
    pool: DbPool,
    ttl: chrono::Duration,
}

impl MetadataCache {
    pub fn new(pool: DbPool, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(24));
        Self { pool, ttl }
    }

    /// Look up `key`; on a miss, run `fetch`, store the result, and return it.
    ///
    /// Any cache-side failure degrades to fetch-through. A payload that no
    /// longer deserializes (schema drift between releases) is a miss and is
    /// overwritten by the fresh result. A token that has already fired fails
    /// with `Cancelled` before the cache or the fetch closure is touched.
    pub async fn get_or_fetch<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        key: &str,
        entry_type: &str,
        fetch: F,
    ) -> Result<T, ProviderError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        if cancel.is_cancelled() {
            return Err(ProviderError::cancelled("cancelled before cache lookup"));
        }
        if let Some(hit) = self.get::<T>(cancel, key) {
            debug!(key = key, "Cache hit");
            return Ok(hit);
        }

        let value = fetch().await?;
        self.put(cancel, key, entry_type, &value);
        Ok(value)
    }

    /// Read and deserialize a live entry. Errors, stale payloads, and a fired
    /// token are all misses.
    pub fn get<T: DeserializeOwned>(&self, cancel: &CancellationToken, key: &str) -> Option<T> {
        if cancel.is_cancelled() {
            return None;
        }
        let conn = match get_conn(&self.pool) {
            Ok(conn) => conn,
            Err(err) => {
                warn!(key = key, error = %err, "Cache read skipped: no connection");
                return None;
            }
        };
        let entry = match cache_queries::get(&conn, key) {
            Ok(entry) => entry?,
            Err(err) => {
                warn!(key = key, error = %err, "Cache read failed");
                return None;
            }
        };
        match serde_json::from_str(&entry.value) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key = key, error = %err, "Cached payload no longer deserializes, treating as miss");
                None
            }
        }
    }

    /// Serialize and store a value. Failures are logged and swallowed; a fired
    /// token skips the write.
    pub fn put<T: Serialize>(
        &self,
        cancel: &CancellationToken,
        key: &str,
        entry_type: &str,
        value: &T,
    ) {
        if cancel.is_cancelled() {
            debug!(key = key, "Cache write skipped: cancelled");
            return;
        }
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(key = key, error = %err, "Cache write skipped: serialization failed");
                return;
            }
        };
        let conn = match get_conn(&self.pool) {
            Ok(conn) => conn,
            Err(err) => {
                warn!(key = key, error = %err, "Cache write skipped: no connection");
                return;
            }
        };
        if let Err(err) = cache_queries::set(&conn, key, &payload, entry_type, self.ttl) {
            warn!(key = key, error = %err, "Cache write failed");
        }
    }

    /// Drop a single entry, for callers that know a result is stale.
    pub fn invalidate(&self, cancel: &CancellationToken, key: &str) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        let Ok(conn) = get_conn(&self.pool) else {
            return false;
        };
        cache_queries::delete(&conn, key).unwrap_or(false)
    }

    /// Reclaim expired rows. Intended to run from a periodic maintenance task.
    pub fn sweep_expired(&self) -> usize {
        let Ok(conn) = get_conn(&self.pool) else {
            return 0;
        };
        match cache_queries::clear_expired(&conn) {
            Ok(removed) => {
                if removed > 0 {
                    debug!(removed = removed, "Swept expired cache entries");
                }
                removed
            }
            Err(err) => {
                warn!(error = %err, "Cache sweep failed");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framevault_db::init_memory_pool;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Payload {
        title: String,
        year: u16,
    }

    fn payload() -> Payload {
        Payload {
            title: "Dune".into(),
            year: 2021,
        }
    }

    #[test]
    fn key_signature_shape() {
        assert_eq!(
            cache_key("tmdb", "search", "movie", &["dune", "2021", "zh-TW"]),
            "tmdb:search/movie:dune:2021:zh-TW"
        );
        assert_eq!(cache_key("tmdb", "details", "movie/438631", &[]), "tmdb:details/movie/438631");
    }

    #[tokio::test]
    async fn second_lookup_skips_fetch() {
        let cache = MetadataCache::new(init_memory_pool().unwrap(), DEFAULT_TTL);
        let cancel = CancellationToken::new();
        let fetches = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let fetches = fetches.clone();
            let value = cache
                .get_or_fetch(&cancel, "tmdb:search/movie:dune", "search", || async move {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Ok(payload())
                })
                .await
                .unwrap();
            assert_eq!(value, payload());
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fetch_error_propagates_and_caches_nothing() {
        let cache = MetadataCache::new(init_memory_pool().unwrap(), DEFAULT_TTL);
        let cancel = CancellationToken::new();

        let err = cache
            .get_or_fetch::<Payload, _, _>(&cancel, "k", "search", || async {
                Err(ProviderError::Timeout("slow upstream".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)));
        assert!(cache.get::<Payload>(&cancel, "k").is_none());
    }

    #[tokio::test]
    async fn fired_token_short_circuits_without_fetching() {
        let cache = MetadataCache::new(init_memory_pool().unwrap(), DEFAULT_TTL);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let fetches = Arc::new(AtomicUsize::new(0));

        let counter = fetches.clone();
        let err = cache
            .get_or_fetch::<Payload, _, _>(&cancel, "k", "search", || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(payload())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Cancelled(_)));
        assert_eq!(fetches.load(Ordering::SeqCst), 0);

        // Writes and reads under a fired token are no-ops as well.
        cache.put(&cancel, "k", "search", &payload());
        assert!(cache.get::<Payload>(&CancellationToken::new(), "k").is_none());
    }

    #[tokio::test]
    async fn undeserializable_payload_is_a_miss() {
        let pool = init_memory_pool().unwrap();
        let cache = MetadataCache::new(pool.clone(), DEFAULT_TTL);
        let cancel = CancellationToken::new();

        // Seed an entry whose shape no longer matches the payload type.
        let conn = get_conn(&pool).unwrap();
        cache_queries::set(&conn, "k", r#"{"unexpected": true}"#, "search", chrono::Duration::hours(1))
            .unwrap();

        assert!(cache.get::<Payload>(&cancel, "k").is_none());

        // get_or_fetch falls through and overwrites the bad entry.
        let value = cache
            .get_or_fetch(&cancel, "k", "search", || async { Ok(payload()) })
            .await
            .unwrap();
        assert_eq!(value, payload());
        assert_eq!(cache.get::<Payload>(&cancel, "k"), Some(payload()));
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let cache = MetadataCache::new(init_memory_pool().unwrap(), DEFAULT_TTL);
        let cancel = CancellationToken::new();
        cache.put(&cancel, "k", "search", &payload());
        assert!(cache.invalidate(&cancel, "k"));
        assert!(!cache.invalidate(&cancel, "k"));
        assert!(cache.get::<Payload>(&cancel, "k").is_none());
    }
}
