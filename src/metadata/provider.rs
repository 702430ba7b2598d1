//! Trait definition and types for metadata providers.
//!
//! This module defines the [`MetadataProvider`] trait that all metadata
//! backends (TMDB-style primary API, scraping services, encyclopedia APIs)
//! implement, along with the shared data types returned by provider queries.

use std::collections::HashMap;

use async_trait::async_trait;
use framevault_common::MediaType;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::error::ProviderError;

// ---------------------------------------------------------------------------
// Queries and results
// ---------------------------------------------------------------------------

/// A metadata search request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Title (or cleaned-up filename) to search for.
    pub title: String,
    /// Release or premiere year, when known, to narrow matches.
    pub year: Option<u16>,
    /// Whether this is a movie or TV lookup.
    pub media_type: MediaType,
    /// BCP-47 locale tag for localized titles and synopses.
    pub locale: String,
}

/// A single result returned from a metadata search query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Provider-specific identifier for this item.
    pub id: String,
    /// Display title in the requested locale (may fall back to the original).
    pub title: String,
    /// Release or premiere year, if known.
    pub year: Option<u16>,
    /// Synopsis / overview text in the requested locale.
    pub overview: Option<String>,
    /// How confident the provider is that this result matches (0.0 - 1.0).
    pub confidence: f64,
    /// Name of the provider that returned this result.
    pub provider_name: String,
    /// URL for the poster image, if available.
    pub poster_url: Option<String>,
}

impl SearchResult {
    /// Whether this result carries localized content: a non-empty title and
    /// a non-empty synopsis.
    pub fn is_localized(&self) -> bool {
        !self.title.trim().is_empty()
            && self
                .overview
                .as_deref()
                .is_some_and(|o| !o.trim().is_empty())
    }
}

/// Rich metadata for a movie or TV show.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaMetadata {
    /// Localized title.
    pub title: String,
    /// Original-language title, if different from `title`.
    pub original_title: Option<String>,
    /// Synopsis / overview text.
    pub overview: Option<String>,
    /// Genre labels.
    pub genres: Vec<String>,
    /// Year the media was first released or premiered.
    pub production_year: Option<u16>,
    /// Exact premiere / release date as an ISO-8601 string (YYYY-MM-DD).
    pub premiere_date: Option<String>,
    /// Community / audience rating (typically 0.0 - 10.0).
    pub community_rating: Option<f64>,
    /// Runtime in minutes, if known.
    pub runtime_minutes: Option<u32>,
    /// URL for the primary poster image, if available.
    pub poster_url: Option<String>,
    /// Map of external provider IDs keyed by provider name.
    pub provider_ids: HashMap<String, String>,
}

// ---------------------------------------------------------------------------
// Provider trait
// ---------------------------------------------------------------------------

/// Async capability interface implemented by every metadata source.
///
/// Each provider wraps a single external API. The fallback coordinator holds
/// an ordered list of this trait rather than knowing concrete types, and every
/// call threads the caller's cancellation token down to the wire.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Short, lowercase identifier for this provider (e.g. `"tmdb"`).
    fn name(&self) -> &'static str;

    /// Returns `true` when the provider has been configured with valid
    /// credentials and is enabled.
    fn is_available(&self) -> bool;

    /// Search for movies matching the query.
    ///
    /// Results are sorted by descending confidence.
    async fn search_movies(
        &self,
        cancel: &CancellationToken,
        query: &SearchQuery,
    ) -> Result<Vec<SearchResult>, ProviderError>;

    /// Search for TV shows matching the query.
    ///
    /// Results are sorted by descending confidence.
    async fn search_tv(
        &self,
        cancel: &CancellationToken,
        query: &SearchQuery,
    ) -> Result<Vec<SearchResult>, ProviderError>;

    /// Fetch full metadata for an item identified by `provider_id`.
    async fn get_details(
        &self,
        cancel: &CancellationToken,
        provider_id: &str,
        media_type: MediaType,
        locale: &str,
    ) -> Result<MediaMetadata, ProviderError>;

    /// Dispatch a search by the query's media type.
    async fn search(
        &self,
        cancel: &CancellationToken,
        query: &SearchQuery,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        match query.media_type {
            MediaType::Movie => self.search_movies(cancel, query).await,
            MediaType::Tv => self.search_tv(cancel, query).await,
        }
    }
}

// ---------------------------------------------------------------------------
// Scoring helpers shared by providers
// ---------------------------------------------------------------------------

/// Compute a confidence score from title similarity and year proximity.
pub(crate) fn confidence(
    query_title: &str,
    result_title: &str,
    query_year: Option<u16>,
    result_year: Option<u16>,
) -> f64 {
    let base = if query_title == result_title {
        0.5
    } else if query_title.eq_ignore_ascii_case(result_title) {
        0.4
    } else if result_title
        .to_lowercase()
        .contains(&query_title.to_lowercase())
    {
        0.2
    } else {
        0.1
    };

    let year_bonus = match (query_year, result_year) {
        (Some(q), Some(r)) if q == r => 0.3,
        (Some(q), Some(r)) if q.abs_diff(r) <= 1 => 0.15,
        _ => 0.0,
    };

    base + year_bonus
}

/// Sort results by descending confidence.
pub(crate) fn sort_by_confidence(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Extract a four-digit year from a date string like `"2023-04-15"`.
pub(crate) fn parse_year(date: Option<&str>) -> Option<u16> {
    date.and_then(|d| d.get(..4)).and_then(|y| y.parse().ok())
}

/// Minimal percent-encoding for URL components. Spaces become `%20`, not
/// `+`, so the output is safe in path segments as well as query values.
pub(crate) fn urlencoded(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char);
            }
            _ => {
                out.push('%');
                out.push(char::from(HEX[(b >> 4) as usize]));
                out.push(char::from(HEX[(b & 0x0f) as usize]));
            }
        }
    }
    out
}

const HEX: [u8; 16] = *b"0123456789ABCDEF";
