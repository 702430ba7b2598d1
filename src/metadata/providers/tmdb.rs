//! TMDB (The Movie Database) metadata provider — the primary source.
//!
//! Wraps the TMDB v3 REST API with a token bucket sized to the published
//! quota (40 requests per 10-second window), a `language` query parameter for
//! locale-aware lookups, and confidence-scored search results.

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
    confidence, parse_year, sort_by_confidence, urlencoded, MediaMetadata, MetadataProvider,
    SearchQuery, SearchResult,
};

const TMDB_BASE_URL: &str = "https://api.themoviedb.org/3";
const TMDB_IMAGE_BASE: &str = "https://image.tmdb.org/t/p/original";

/// Published quota: 40 requests per 10-second window.
const QUOTA_REQUESTS: u32 = 40;
const QUOTA_WINDOW: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// TMDB API response types (private)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TmdbSearchResponse<T> {
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct TmdbMovieSearchResult {
    id: u64,
    title: Option<String>,
    release_date: Option<String>,
    overview: Option<String>,
    poster_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TmdbTvSearchResult {
    id: u64,
    name: Option<String>,
    first_air_date: Option<String>,
    overview: Option<String>,
    poster_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TmdbMovieDetail {
    id: u64,
    title: Option<String>,
    original_title: Option<String>,
    overview: Option<String>,
    release_date: Option<String>,
    vote_average: Option<f64>,
    runtime: Option<u32>,
    genres: Option<Vec<TmdbGenre>>,
    poster_path: Option<String>,
    imdb_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TmdbTvDetail {
    id: u64,
    name: Option<String>,
    original_name: Option<String>,
    overview: Option<String>,
    first_air_date: Option<String>,
    vote_average: Option<f64>,
    episode_run_time: Option<Vec<u32>>,
    genres: Option<Vec<TmdbGenre>>,
    poster_path: Option<String>,
    external_ids: Option<TmdbExternalIds>,
}

#[derive(Debug, Deserialize)]
struct TmdbGenre {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TmdbExternalIds {
    imdb_id: Option<String>,
    tvdb_id: Option<u64>,
}

// ---------------------------------------------------------------------------
// Provider implementation
// ---------------------------------------------------------------------------

/// TMDB metadata provider.
pub struct TmdbProvider {
    client: RateLimitedClient,
    api_key: String,
    base_url: String,
}

impl TmdbProvider {
    /// Create a new TMDB provider with the given API key.
    pub fn new(api_key: String, health: Arc<HealthTracker>) -> Self {
        Self::with_base_url(api_key, health, TMDB_BASE_URL.to_string())
    }

    /// Create a provider pointed at a non-default base URL (used in tests).
    pub fn with_base_url(api_key: String, health: Arc<HealthTracker>, base_url: String) -> Self {
        let client =
            RateLimitedClient::new("tmdb", windowed_quota(QUOTA_REQUESTS, QUOTA_WINDOW), health);
        Self {
            client,
            api_key,
            base_url,
        }
    }

    /// Build a full API URL with the API key and language query parameters.
    fn url(&self, path: &str, locale: &str, extra_params: &[(&str, &str)]) -> String {
        let mut url = format!(
            "{}{path}?api_key={}&language={}",
            self.base_url, self.api_key, locale
        );
        for (key, value) in extra_params {
            url.push('&');
            url.push_str(key);
            url.push('=');
            url.push_str(&urlencoded(value));
        }
        url
    }
}

fn image_url(path: &str) -> String {
    format!("{TMDB_IMAGE_BASE}{path}")
}

#[async_trait]
impl MetadataProvider for TmdbProvider {
    fn name(&self) -> &'static str {
        "tmdb"
    }

    fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn search_movies(
        &self,
        cancel: &CancellationToken,
        query: &SearchQuery,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        let mut params = vec![("query", query.title.as_str())];
        let year_str = query.year.map(|y| y.to_string());
        if let Some(ref y) = year_str {
            params.push(("year", y.as_str()));
        }

        let url = self.url("/search/movie", &query.locale, &params);
        debug!(url = %url, "TMDB search movie");

        let body: TmdbSearchResponse<TmdbMovieSearchResult> =
            self.client.get_json(cancel, &url).await?;

        let mut results: Vec<SearchResult> = body
            .results
            .into_iter()
            .map(|r| {
                let result_title = r.title.unwrap_or_default();
                let result_year = parse_year(r.release_date.as_deref());
                let score = confidence(&query.title, &result_title, query.year, result_year);
                SearchResult {
                    id: r.id.to_string(),
                    title: result_title,
                    year: result_year,
                    overview: r.overview.filter(|o| !o.is_empty()),
                    confidence: score,
                    provider_name: "tmdb".to_string(),
                    poster_url: r.poster_path.map(|p| image_url(&p)),
                }
            })
            .collect();

        sort_by_confidence(&mut results);
        Ok(results)
    }

    async fn search_tv(
        &self,
        cancel: &CancellationToken,
        query: &SearchQuery,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        let url = self.url("/search/tv", &query.locale, &[("query", &query.title)]);
        debug!(url = %url, "TMDB search TV");

        let body: TmdbSearchResponse<TmdbTvSearchResult> =
            self.client.get_json(cancel, &url).await?;

        let mut results: Vec<SearchResult> = body
            .results
            .into_iter()
            .map(|r| {
                let result_title = r.name.unwrap_or_default();
                let result_year = parse_year(r.first_air_date.as_deref());
                let score = confidence(&query.title, &result_title, query.year, result_year);
                SearchResult {
                    id: r.id.to_string(),
                    title: result_title,
                    year: result_year,
                    overview: r.overview.filter(|o| !o.is_empty()),
                    confidence: score,
                    provider_name: "tmdb".to_string(),
                    poster_url: r.poster_path.map(|p| image_url(&p)),
                }
            })
            .collect();

        sort_by_confidence(&mut results);
        Ok(results)
    }

    async fn get_details(
        &self,
        cancel: &CancellationToken,
        provider_id: &str,
        media_type: MediaType,
        locale: &str,
    ) -> Result<MediaMetadata, ProviderError> {
        match media_type {
            MediaType::Movie => {
                let url = self.url(&format!("/movie/{provider_id}"), locale, &[]);
                debug!(url = %url, "TMDB get movie detail");

                let detail: TmdbMovieDetail = self.client.get_json(cancel, &url).await?;

                let mut provider_ids = HashMap::new();
                provider_ids.insert("tmdb".to_string(), detail.id.to_string());
                if let Some(imdb) = detail.imdb_id {
                    provider_ids.insert("imdb".to_string(), imdb);
                }

                Ok(MediaMetadata {
                    title: detail.title.unwrap_or_default(),
                    original_title: detail.original_title,
                    overview: detail.overview.filter(|o| !o.is_empty()),
                    genres: detail
                        .genres
                        .unwrap_or_default()
                        .into_iter()
                        .map(|g| g.name)
                        .collect(),
                    production_year: parse_year(detail.release_date.as_deref()),
                    premiere_date: detail.release_date,
                    community_rating: detail.vote_average,
                    runtime_minutes: detail.runtime,
                    poster_url: detail.poster_path.map(|p| image_url(&p)),
                    provider_ids,
                })
            }
            MediaType::Tv => {
                let url = self.url(
                    &format!("/tv/{provider_id}"),
                    locale,
                    &[("append_to_response", "external_ids")],
                );
                debug!(url = %url, "TMDB get TV detail");

                let detail: TmdbTvDetail = self.client.get_json(cancel, &url).await?;

                let mut provider_ids = HashMap::new();
                provider_ids.insert("tmdb".to_string(), detail.id.to_string());
                if let Some(ref ext) = detail.external_ids {
                    if let Some(ref imdb) = ext.imdb_id {
                        provider_ids.insert("imdb".to_string(), imdb.clone());
                    }
                    if let Some(tvdb) = ext.tvdb_id {
                        provider_ids.insert("tvdb".to_string(), tvdb.to_string());
                    }
                }

                let runtime = detail
                    .episode_run_time
                    .as_ref()
                    .and_then(|v| v.first().copied());

                Ok(MediaMetadata {
                    title: detail.name.unwrap_or_default(),
                    original_title: detail.original_name,
                    overview: detail.overview.filter(|o| !o.is_empty()),
                    genres: detail
                        .genres
                        .unwrap_or_default()
                        .into_iter()
                        .map(|g| g.name)
                        .collect(),
                    production_year: parse_year(detail.first_air_date.as_deref()),
                    premiere_date: detail.first_air_date,
                    community_rating: detail.vote_average,
                    runtime_minutes: runtime,
                    poster_url: detail.poster_path.map(|p| image_url(&p)),
                    provider_ids,
                })
            }
        }
    }
}
