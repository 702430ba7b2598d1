//! Wikipedia metadata provider — the tertiary, encyclopedia-style source.
//!
//! Uses the MediaWiki opensearch endpoint for title search and the REST page
//! summary endpoint for details. Wikipedia knows about nearly everything but
//! carries no structured media metadata, so results are capped at low
//! confidence and the chain only lands here when both richer sources have
//! come up empty.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use framevault_common::MediaType;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::metadata::error::ProviderError;
use crate::metadata::health::HealthTracker;
use crate::metadata::http::{windowed_quota, RateLimitedClient};
use crate::metadata::provider::{
    urlencoded, MediaMetadata, MetadataProvider, SearchQuery, SearchResult,
};

const WIKIPEDIA_BASE_URL: &str = "https://en.wikipedia.org";

const QUOTA_REQUESTS: u32 = 20;
const QUOTA_WINDOW: Duration = Duration::from_secs(10);

/// Encyclopedia text is a weak signal for media matching; never let it
/// outrank a structured source.
const MAX_CONFIDENCE: f64 = 0.3;

/// Opensearch returns a positional JSON array:
/// `[query, [titles...], [descriptions...], [urls...]]`.
#[derive(Debug, Deserialize)]
struct OpenSearchResponse(
    String,
    Vec<String>,
    #[serde(default)] Vec<String>,
    #[serde(default)] Vec<String>,
);

#[derive(Debug, Deserialize)]
struct PageSummary {
    title: Option<String>,
    extract: Option<String>,
    #[serde(default)]
    thumbnail: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    source: Option<String>,
}

/// Wikipedia metadata provider.
pub struct WikipediaProvider {
    client: RateLimitedClient,
    base_url: String,
    enabled: bool,
}

impl WikipediaProvider {
    pub fn new(enabled: bool, health: Arc<HealthTracker>) -> Self {
        Self::with_base_url(enabled, health, WIKIPEDIA_BASE_URL.to_string())
    }

    /// Create a provider pointed at a non-default base URL (used in tests).
    pub fn with_base_url(enabled: bool, health: Arc<HealthTracker>, base_url: String) -> Self {
        let client = RateLimitedClient::new(
            "wikipedia",
            windowed_quota(QUOTA_REQUESTS, QUOTA_WINDOW),
            health,
        );
        Self {
            client,
            base_url,
            enabled,
        }
    }

    async fn opensearch(
        &self,
        cancel: &CancellationToken,
        query: &SearchQuery,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        let url = format!(
            "{}/w/api.php?action=opensearch&format=json&limit=5&search={}",
            self.base_url,
            urlencoded(&query.title)
        );
        debug!(url = %url, "Wikipedia opensearch");

        let body: OpenSearchResponse = self.client.get_json(cancel, &url).await?;
        let OpenSearchResponse(_, titles, descriptions, _) = body;

        let results = titles
            .into_iter()
            .enumerate()
            .map(|(i, title)| {
                // Opensearch is already relevance-ordered; decay down from
                // the cap rather than re-scoring on title similarity.
                let score = MAX_CONFIDENCE / (i as f64 + 1.0);
                SearchResult {
                    id: title.clone(),
                    overview: descriptions.get(i).cloned().filter(|d| !d.is_empty()),
                    title,
                    year: None,
                    confidence: score,
                    provider_name: "wikipedia".to_string(),
                    poster_url: None,
                }
            })
            .collect();

        Ok(results)
    }
}

#[async_trait]
impl MetadataProvider for WikipediaProvider {
    fn name(&self) -> &'static str {
        "wikipedia"
    }

    fn is_available(&self) -> bool {
        self.enabled
    }

    async fn search_movies(
        &self,
        cancel: &CancellationToken,
        query: &SearchQuery,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        self.opensearch(cancel, query).await
    }

    async fn search_tv(
        &self,
        cancel: &CancellationToken,
        query: &SearchQuery,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        self.opensearch(cancel, query).await
    }

    async fn get_details(
        &self,
        cancel: &CancellationToken,
        provider_id: &str,
        _media_type: MediaType,
        _locale: &str,
    ) -> Result<MediaMetadata, ProviderError> {
        // The page title is the provider id.
        let url = format!(
            "{}/api/rest_v1/page/summary/{}",
            self.base_url,
            urlencoded(provider_id)
        );
        debug!(url = %url, "Wikipedia page summary");

        let summary: PageSummary = self.client.get_json(cancel, &url).await?;

        let mut provider_ids = HashMap::new();
        provider_ids.insert("wikipedia".to_string(), provider_id.to_string());

        Ok(MediaMetadata {
            title: summary.title.unwrap_or_else(|| provider_id.to_string()),
            original_title: None,
            overview: summary.extract.filter(|e| !e.is_empty()),
            genres: Vec::new(),
            production_year: None,
            premiere_date: None,
            community_rating: None,
            runtime_minutes: None,
            poster_url: summary.thumbnail.and_then(|t| t.source),
            provider_ids,
        })
    }
}
