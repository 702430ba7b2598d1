//! Douban metadata provider — the secondary, scraping-style source.
//!
//! Douban exposes no official API; this provider leans on the lightweight
//! JSON suggest/abstract endpoints the site itself uses. Coverage is strong
//! for Chinese-language titles where the primary source is thin, which is why
//! it sits second in the fallback chain. The endpoints are unauthenticated
//! but brittle, so the quota is kept deliberately low.

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
    confidence, sort_by_confidence, urlencoded, MediaMetadata, MetadataProvider, SearchQuery,
    SearchResult,
};

const DOUBAN_BASE_URL: &str = "https://movie.douban.com";

/// Unofficial endpoints; keep well under any plausible scraping threshold.
const QUOTA_REQUESTS: u32 = 5;
const QUOTA_WINDOW: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct DoubanSuggestEntry {
    id: String,
    title: Option<String>,
    year: Option<String>,
    img: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DoubanAbstract {
    subject: DoubanSubject,
}

#[derive(Debug, Deserialize)]
struct DoubanSubject {
    title: Option<String>,
    rate: Option<String>,
    release_year: Option<String>,
    types: Option<Vec<String>>,
    short_comment: Option<DoubanComment>,
}

#[derive(Debug, Deserialize)]
struct DoubanComment {
    content: Option<String>,
}

/// Douban metadata provider.
pub struct DoubanProvider {
    client: RateLimitedClient,
    base_url: String,
    enabled: bool,
}

impl DoubanProvider {
    pub fn new(enabled: bool, health: Arc<HealthTracker>) -> Self {
        Self::with_base_url(enabled, health, DOUBAN_BASE_URL.to_string())
    }

    /// Create a provider pointed at a non-default base URL (used in tests).
    pub fn with_base_url(enabled: bool, health: Arc<HealthTracker>, base_url: String) -> Self {
        let client = RateLimitedClient::new(
            "douban",
            windowed_quota(QUOTA_REQUESTS, QUOTA_WINDOW),
            health,
        );
        Self {
            client,
            base_url,
            enabled,
        }
    }

    async fn suggest(
        &self,
        cancel: &CancellationToken,
        query: &SearchQuery,
        want_tv: bool,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        let url = format!(
            "{}/j/subject_suggest?q={}",
            self.base_url,
            urlencoded(&query.title)
        );
        debug!(url = %url, "Douban suggest");

        let entries: Vec<DoubanSuggestEntry> = self.client.get_json(cancel, &url).await?;

        let mut results: Vec<SearchResult> = entries
            .into_iter()
            .filter(|e| match e.kind.as_deref() {
                Some("tv") => want_tv,
                Some("movie") => !want_tv,
                // Unlabelled entries are kept; the suggest endpoint omits the
                // type for some older subjects.
                _ => true,
            })
            .map(|e| {
                let title = e.title.unwrap_or_default();
                let year = e.year.as_deref().and_then(|y| y.parse().ok());
                let score = confidence(&query.title, &title, query.year, year);
                SearchResult {
                    id: e.id,
                    title,
                    year,
                    // The suggest endpoint carries no synopsis; the abstract
                    // lookup in get_details fills that in.
                    overview: None,
                    confidence: score,
                    provider_name: "douban".to_string(),
                    poster_url: e.img,
                }
            })
            .collect();

        sort_by_confidence(&mut results);
        Ok(results)
    }
}

#[async_trait]
impl MetadataProvider for DoubanProvider {
    fn name(&self) -> &'static str {
        "douban"
    }

    fn is_available(&self) -> bool {
        self.enabled
    }

    async fn search_movies(
        &self,
        cancel: &CancellationToken,
        query: &SearchQuery,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        self.suggest(cancel, query, false).await
    }

    async fn search_tv(
        &self,
        cancel: &CancellationToken,
        query: &SearchQuery,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        self.suggest(cancel, query, true).await
    }

    async fn get_details(
        &self,
        cancel: &CancellationToken,
        provider_id: &str,
        _media_type: MediaType,
        _locale: &str,
    ) -> Result<MediaMetadata, ProviderError> {
        let url = format!(
            "{}/j/subject_abstract?subject_id={}",
            self.base_url,
            urlencoded(provider_id)
        );
        debug!(url = %url, "Douban abstract");

        let body: DoubanAbstract = self.client.get_json(cancel, &url).await?;
        let subject = body.subject;

        let mut provider_ids = HashMap::new();
        provider_ids.insert("douban".to_string(), provider_id.to_string());

        Ok(MediaMetadata {
            title: subject.title.unwrap_or_default(),
            original_title: None,
            overview: subject
                .short_comment
                .and_then(|c| c.content)
                .filter(|c| !c.is_empty()),
            genres: subject.types.unwrap_or_default(),
            production_year: subject.release_year.as_deref().and_then(|y| y.parse().ok()),
            premiere_date: None,
            community_rating: subject.rate.as_deref().and_then(|r| r.parse().ok()),
            runtime_minutes: None,
            poster_url: None,
            provider_ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> DoubanProvider {
        DoubanProvider::with_base_url(true, Arc::new(HealthTracker::default()), server.uri())
    }

    #[test]
    fn availability_follows_feature_flag() {
        let health = Arc::new(HealthTracker::default());
        assert!(DoubanProvider::new(true, health.clone()).is_available());
        assert!(!DoubanProvider::new(false, health).is_available());
    }

    #[tokio::test]
    async fn suggest_filters_by_media_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/j/subject_suggest"))
            .and(query_param("q", "流浪地球"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "26266893", "title": "流浪地球", "year": "2019",
                 "img": "https://img.example/p1.jpg", "type": "movie"},
                {"id": "35196946", "title": "流浪地球电视版", "year": "2021", "type": "tv"}
            ])))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let query = SearchQuery {
            title: "流浪地球".to_string(),
            year: Some(2019),
            media_type: MediaType::Movie,
            locale: "zh-CN".to_string(),
        };

        let results = provider
            .search_movies(&CancellationToken::new(), &query)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "26266893");
        assert_eq!(results[0].year, Some(2019));
        // Suggest responses carry no synopsis, so they never count as
        // localized content on their own.
        assert!(!results[0].is_localized());
    }

    #[tokio::test]
    async fn abstract_lookup_builds_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/j/subject_abstract"))
            .and(query_param("subject_id", "26266893"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "subject": {
                    "title": "流浪地球",
                    "rate": "7.9",
                    "release_year": "2019",
                    "types": ["科幻", "冒险"],
                    "short_comment": {"content": "中国科幻电影的里程碑"}
                }
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let metadata = provider
            .get_details(
                &CancellationToken::new(),
                "26266893",
                MediaType::Movie,
                "zh-CN",
            )
            .await
            .unwrap();

        assert_eq!(metadata.title, "流浪地球");
        assert_eq!(metadata.production_year, Some(2019));
        assert_eq!(metadata.community_rating, Some(7.9));
        assert_eq!(metadata.genres.len(), 2);
        assert_eq!(metadata.provider_ids.get("douban").unwrap(), "26266893");
    }
}
