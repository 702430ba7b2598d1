//! Fallback chain coordinator.
//!
//! Walks an ordered list of metadata sources (structured APIs first, the AI
//! filename parser last), consulting the health tracker before each call and
//! stopping at the first source with an acceptable match. The outcome is
//! always a [`DegradedResult`] describing how complete the answer is; a hard
//! error surfaces only when sources were actually tried and every one failed.

use std::sync::Arc;
use std::time::Duration;

use framevault_common::MediaType;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::ProviderError;
use super::health::HealthTracker;
use super::locale::LocaleFallback;
use super::provider::{MediaMetadata, MetadataProvider, SearchQuery, SearchResult};
use super::retry::RetryQueue;

pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.2;
pub const DEFAULT_INTER_SOURCE_DELAY: Duration = Duration::from_millis(200);

/// Retry task type used for failed resolutions.
pub const RESOLVE_TASK_TYPE: &str = "resolve";

/// How complete a resolution outcome is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DegradationLevel {
    /// Primary source answered with full metadata.
    Normal,
    /// A fallback source or locale served, or some fields are missing.
    Partial,
    /// Only a bare title/year guess is available.
    Minimal,
    /// Every source was unavailable; the result is a stub.
    Offline,
}

/// A resolution outcome annotated with how degraded it is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegradedResult {
    pub metadata: MediaMetadata,
    pub degradation_level: DegradationLevel,
    /// Expected fields the serving source could not supply.
    pub missing_fields: Vec<String>,
    /// Alternate sources consulted beyond the primary, in order.
    pub fallback_used: Vec<String>,
    pub message: Option<String>,
}

/// A resolution request, serializable so failed ones can be parked for retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveRequest {
    pub title: String,
    pub year: Option<u16>,
    pub media_type: MediaType,
}

impl ResolveRequest {
    /// Stable retry-queue task id for this request.
    pub fn task_id(&self) -> String {
        let year = self.year.map(|y| y.to_string()).unwrap_or_default();
        format!("{}:{}:{}", self.media_type, self.title.to_lowercase(), year)
    }
}

/// Tuning knobs for the chain walk.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Skip sources the health tracker reports as down.
    pub skip_down_sources: bool,
    /// Pause between consecutive source attempts.
    pub inter_source_delay: Duration,
    /// Lowest confidence score accepted as a match.
    pub min_confidence: f64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            skip_down_sources: true,
            inter_source_delay: DEFAULT_INTER_SOURCE_DELAY,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }
}

const ENRICHMENT_FIELDS: [&str; 5] = [
    "overview",
    "genres",
    "premiere_date",
    "community_rating",
    "poster_url",
];

fn missing_fields(metadata: &MediaMetadata) -> Vec<String> {
    let mut missing = Vec::new();
    if metadata.overview.as_deref().map_or(true, |o| o.trim().is_empty()) {
        missing.push("overview".to_string());
    }
    if metadata.genres.is_empty() {
        missing.push("genres".to_string());
    }
    if metadata.premiere_date.is_none() {
        missing.push("premiere_date".to_string());
    }
    if metadata.community_rating.is_none() {
        missing.push("community_rating".to_string());
    }
    if metadata.poster_url.is_none() {
        missing.push("poster_url".to_string());
    }
    missing
}

/// Ordered chain of metadata sources with health gating and retry handoff.
pub struct FallbackChain {
    providers: Vec<Arc<dyn MetadataProvider>>,
    health: Arc<HealthTracker>,
    locales: LocaleFallback,
    retry: Option<Arc<RetryQueue>>,
    config: ChainConfig,
}

impl FallbackChain {
    pub fn new(
        providers: Vec<Arc<dyn MetadataProvider>>,
        health: Arc<HealthTracker>,
        locales: LocaleFallback,
        retry: Option<Arc<RetryQueue>>,
        config: ChainConfig,
    ) -> Self {
        Self {
            providers,
            health,
            locales,
            retry,
            config,
        }
    }

    /// Resolve a request by walking the chain in order.
    pub async fn resolve(
        &self,
        cancel: &CancellationToken,
        request: &ResolveRequest,
    ) -> Result<DegradedResult, ProviderError> {
        let query = SearchQuery {
            title: request.title.clone(),
            year: request.year,
            media_type: request.media_type,
            locale: String::new(),
        };

        let mut consulted: Vec<&'static str> = Vec::new();
        let mut last_error: Option<ProviderError> = None;

        for provider in &self.providers {
            if !provider.is_available() {
                debug!(provider = provider.name(), "Source not configured, skipping");
                continue;
            }
            if self.config.skip_down_sources && self.health.is_down(provider.name()) {
                info!(provider = provider.name(), "Source is down, skipping");
                continue;
            }

            if !consulted.is_empty() && !self.config.inter_source_delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(ProviderError::cancelled("cancelled between sources"));
                    }
                    _ = tokio::time::sleep(self.config.inter_source_delay) => {}
                }
            }
            consulted.push(provider.name());

            match self.locales.search(cancel, provider, &query).await {
                Ok(outcome) => {
                    let best = outcome
                        .results
                        .into_iter()
                        .max_by(|a, b| a.confidence.total_cmp(&b.confidence));
                    match best {
                        Some(best) if best.confidence >= self.config.min_confidence => {
                            let metadata = self
                                .fetch_details(cancel, provider, &best, request, &outcome.locale)
                                .await?;
                            return Ok(self.wrap(metadata, &consulted, outcome.fell_back));
                        }
                        Some(best) => {
                            debug!(
                                provider = provider.name(),
                                confidence = best.confidence,
                                "Best match below confidence floor, advancing"
                            );
                        }
                        None => {
                            debug!(provider = provider.name(), "No results, advancing");
                        }
                    }
                }
                Err(ProviderError::Cancelled(reason)) => {
                    return Err(ProviderError::Cancelled(reason));
                }
                Err(err) => {
                    warn!(provider = provider.name(), error = %err, "Source failed, advancing");
                    if err.is_retryable() {
                        self.park_for_retry(cancel, request);
                    }
                    last_error = Some(err);
                }
            }
        }

        if consulted.is_empty() {
            info!(title = request.title.as_str(), "Every source unavailable, returning offline stub");
            return Ok(self.offline_stub(request));
        }

        match last_error {
            Some(err) => Err(err),
            None => Err(ProviderError::NotFound(format!(
                "no source produced a usable match for '{}'",
                request.title
            ))),
        }
    }

    /// Fetch full metadata for an accepted match, falling back to what the
    /// search result already carries when the details call fails.
    async fn fetch_details(
        &self,
        cancel: &CancellationToken,
        provider: &Arc<dyn MetadataProvider>,
        best: &SearchResult,
        request: &ResolveRequest,
        locale: &str,
    ) -> Result<MediaMetadata, ProviderError> {
        match provider
            .get_details(cancel, &best.id, request.media_type, locale)
            .await
        {
            Ok(metadata) => Ok(metadata),
            Err(ProviderError::Cancelled(reason)) => Err(ProviderError::Cancelled(reason)),
            Err(err) => {
                warn!(
                    provider = provider.name(),
                    error = %err,
                    "Details fetch failed, using search result fields"
                );
                Ok(MediaMetadata {
                    title: best.title.clone(),
                    original_title: None,
                    overview: best.overview.clone(),
                    genres: Vec::new(),
                    production_year: best.year,
                    premiere_date: None,
                    community_rating: None,
                    runtime_minutes: None,
                    poster_url: best.poster_url.clone(),
                    provider_ids: Default::default(),
                })
            }
        }
    }

    fn wrap(
        &self,
        metadata: MediaMetadata,
        consulted: &[&'static str],
        locale_fell_back: bool,
    ) -> DegradedResult {
        let missing = missing_fields(&metadata);
        let primary = self.providers.first().map(|p| p.name());
        let fallback_used: Vec<String> = consulted
            .iter()
            .filter(|name| Some(**name) != primary)
            .map(|name| name.to_string())
            .collect();

        let degradation_level = if missing.len() == ENRICHMENT_FIELDS.len() {
            DegradationLevel::Minimal
        } else if fallback_used.is_empty() && !locale_fell_back && missing.is_empty() {
            DegradationLevel::Normal
        } else {
            DegradationLevel::Partial
        };

        let message = match degradation_level {
            DegradationLevel::Normal => None,
            DegradationLevel::Partial => {
                Some("resolved with fallback sources or incomplete fields".to_string())
            }
            DegradationLevel::Minimal => {
                Some("only a title guess is available; re-run once sources recover".to_string())
            }
            // Offline results are built by offline_stub, never here.
            DegradationLevel::Offline => None,
        };

        DegradedResult {
            metadata,
            degradation_level,
            missing_fields: missing,
            fallback_used,
            message,
        }
    }

    fn offline_stub(&self, request: &ResolveRequest) -> DegradedResult {
        DegradedResult {
            metadata: MediaMetadata {
                title: request.title.clone(),
                original_title: None,
                overview: None,
                genres: Vec::new(),
                production_year: request.year,
                premiere_date: None,
                community_rating: None,
                runtime_minutes: None,
                poster_url: None,
                provider_ids: Default::default(),
            },
            degradation_level: DegradationLevel::Offline,
            missing_fields: ENRICHMENT_FIELDS.iter().map(|f| f.to_string()).collect(),
            fallback_used: Vec::new(),
            message: Some("all metadata sources are down or disabled".to_string()),
        }
    }

    /// Park a failed request for later replay. Best effort: a queue error is
    /// logged, never surfaced, and a duplicate task id keeps its schedule.
    fn park_for_retry(&self, cancel: &CancellationToken, request: &ResolveRequest) {
        let Some(queue) = &self.retry else {
            return;
        };
        let payload = match serde_json::to_string(request) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(error = %err, "Could not serialize request for retry");
                return;
            }
        };
        if let Err(err) = queue.enqueue(cancel, &request.task_id(), RESOLVE_TASK_TYPE, &payload) {
            warn!(error = %err, "Could not park request for retry");
        }
    }
}
