//! Top-level resolution entry point.
//!
//! Wires the fallback chain, cache, health tracker, and retry queue together
//! from configuration and fronts the chain with a cache-aside read path. This
//! is the only type request-handling code needs to hold.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use framevault_db::DbPool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;

use super::cache::{cache_key, MetadataCache};
use super::coordinator::{
    ChainConfig, DegradationLevel, DegradedResult, FallbackChain, ResolveRequest,
    RESOLVE_TASK_TYPE,
};
use super::error::ProviderError;
use super::health::{HealthTracker, ServiceHealth};
use super::locale::LocaleFallback;
use super::provider::MetadataProvider;
use super::providers::{DoubanProvider, TmdbProvider, WikipediaProvider};
use super::retry::{spawn_drain_worker, RetryHandler, RetryQueue};
use super::semantic::{SemanticParser, SemanticProvider};

const CACHE_ENTRY_TYPE: &str = "resolution";

fn resolution_cache_key(request: &ResolveRequest) -> String {
    let media_type = request.media_type.to_string();
    let year = request.year.map(|y| y.to_string()).unwrap_or_default();
    cache_key(
        "chain",
        "resolve",
        &media_type,
        &[&request.title.to_lowercase(), &year],
    )
}

/// Replays parked resolutions through a chain without a retry hook, so a
/// replay failure is handled by the queue's own backoff instead of
/// re-enqueueing.
struct ResolveReplayHandler {
    chain: Arc<FallbackChain>,
    cache: MetadataCache,
}

#[async_trait]
impl RetryHandler for ResolveReplayHandler {
    fn task_type(&self) -> &str {
        RESOLVE_TASK_TYPE
    }

    async fn run(&self, cancel: &CancellationToken, payload: &str) -> Result<(), ProviderError> {
        let request: ResolveRequest = serde_json::from_str(payload).map_err(|err| {
            ProviderError::BadRequest(format!("unreadable retry payload: {err}"))
        })?;

        let result = self.chain.resolve(cancel, &request).await?;
        // An offline stub means nothing was actually reachable; keep the task
        // scheduled rather than declaring victory with placeholder data.
        if result.degradation_level == DegradationLevel::Offline {
            return Err(ProviderError::ServerError(
                "all sources still unreachable".to_string(),
            ));
        }

        self.cache
            .put(cancel, &resolution_cache_key(&request), CACHE_ENTRY_TYPE, &result);
        info!(title = request.title.as_str(), "Replayed resolution succeeded");
        Ok(())
    }
}

/// Cache-fronted metadata resolver.
pub struct MetadataResolver {
    chain: Arc<FallbackChain>,
    cache: MetadataCache,
    health: Arc<HealthTracker>,
    retry: Arc<RetryQueue>,
    drain_interval: Duration,
}

impl MetadataResolver {
    /// Build the full engine from configuration: providers in priority order
    /// (TMDB, Douban, Wikipedia, then the AI filename parser), one shared
    /// health tracker, and a retry queue wired with a replay handler.
    pub fn from_config(config: &Config, pool: DbPool) -> Self {
        let health = Arc::new(HealthTracker::new(config.health.error_threshold));

        let providers: Vec<Arc<dyn MetadataProvider>> = vec![
            Arc::new(TmdbProvider::new(config.tmdb.api_key.clone(), health.clone())),
            Arc::new(DoubanProvider::new(config.douban.enabled, health.clone())),
            Arc::new(WikipediaProvider::new(
                config.wikipedia.enabled,
                health.clone(),
            )),
            Arc::new(SemanticProvider::new(SemanticParser::new(
                config.semantic.backend,
                config.semantic.api_key.clone(),
                config.semantic.model.clone(),
                health.clone(),
            ))),
        ];

        for provider in &providers {
            health.register(provider.name());
        }

        let chain_config = ChainConfig {
            skip_down_sources: config.health.skip_down_sources,
            inter_source_delay: Duration::from_millis(config.resolution.inter_source_delay_ms),
            min_confidence: config.resolution.min_confidence,
        };
        let locales = || LocaleFallback::new(&config.locale.chain, &config.locale.preferred);
        let cache = MetadataCache::new(
            pool.clone(),
            Duration::from_secs(config.cache.ttl_hours * 60 * 60),
        );

        // The replay chain carries no retry hook: replay failures stay under
        // the queue's backoff control.
        let replay_chain = Arc::new(FallbackChain::new(
            providers.clone(),
            health.clone(),
            locales(),
            None,
            chain_config.clone(),
        ));

        let mut retry = RetryQueue::new(
            pool,
            Duration::from_secs(config.retry.base_delay_secs),
            config.retry.max_attempts,
        );
        retry.register(Arc::new(ResolveReplayHandler {
            chain: replay_chain,
            cache: cache.clone(),
        }));
        let retry = Arc::new(retry);

        let chain = Arc::new(FallbackChain::new(
            providers,
            health.clone(),
            locales(),
            Some(retry.clone()),
            chain_config,
        ));

        Self {
            chain,
            cache,
            health,
            retry,
            drain_interval: Duration::from_secs(config.retry.drain_interval_secs),
        }
    }

    /// Resolve a request, serving from cache when a fresh entry exists.
    ///
    /// Offline stubs are never cached: a stub reflects a momentary outage,
    /// not an answer worth pinning for a full TTL.
    pub async fn resolve(
        &self,
        cancel: &CancellationToken,
        request: &ResolveRequest,
    ) -> Result<DegradedResult, ProviderError> {
        let key = resolution_cache_key(request);
        if let Some(hit) = self.cache.get::<DegradedResult>(cancel, &key) {
            debug!(title = request.title.as_str(), "Resolution served from cache");
            return Ok(hit);
        }

        let result = self.chain.resolve(cancel, request).await?;
        if result.degradation_level != DegradationLevel::Offline {
            self.cache.put(cancel, &key, CACHE_ENTRY_TYPE, &result);
        }
        Ok(result)
    }

    /// Current health of every registered source.
    pub fn health_snapshot(&self) -> Vec<ServiceHealth> {
        self.health.snapshot()
    }

    /// Number of resolutions parked for retry.
    pub fn pending_retries(&self) -> framevault_common::Result<u64> {
        self.retry.active_count()
    }

    /// Start the periodic retry drain worker. Runs until `cancel` fires.
    pub fn spawn_retry_worker(&self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        spawn_drain_worker(self.retry.clone(), self.drain_interval, cancel)
    }

    /// Remove expired cache rows, returning how many were reclaimed.
    pub fn sweep_cache(&self) -> usize {
        self.cache.sweep_expired()
    }
}
