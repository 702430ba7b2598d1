//! End-to-end resolution tests.
//!
//! Drives real provider implementations against wiremock servers through the
//! locale fallback, the fallback chain, the cache-aside layer, and the retry
//! queue, with an in-memory SQLite database.

use std::sync::Arc;
use std::time::Duration;

use framevault::metadata::cache::MetadataCache;
use framevault::metadata::coordinator::{ChainConfig, DegradationLevel, FallbackChain, ResolveRequest};
use framevault::metadata::locale::LocaleFallback;
use framevault::metadata::providers::{DoubanProvider, TmdbProvider};
use framevault::metadata::retry::{RetryQueue, DEFAULT_MAX_ATTEMPTS};
use framevault::metadata::{HealthTracker, MetadataProvider, SearchQuery};
use framevault_common::MediaType;
use framevault_db::init_memory_pool;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn tmdb_for(server: &MockServer, health: &Arc<HealthTracker>) -> Arc<TmdbProvider> {
    Arc::new(TmdbProvider::with_base_url(
        "test-key".to_string(),
        health.clone(),
        server.uri(),
    ))
}

fn chain_config() -> ChainConfig {
    ChainConfig {
        inter_source_delay: Duration::ZERO,
        ..ChainConfig::default()
    }
}

/// Locale chain [zh-TW, zh-CN, en] where only the English catalogue has the
/// series: the search walks the chain in order and answers from `en`.
#[tokio::test]
async fn locale_chain_falls_through_to_english() {
    let server = MockServer::start().await;
    for locale in ["zh-TW", "zh-CN"] {
        Mock::given(method("GET"))
            .and(path("/search/tv"))
            .and(query_param("language", locale))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"results": []})),
            )
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/search/tv"))
        .and(query_param("language", "en"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "results": [
                {"id": 85937, "name": "Demon Slayer", "first_air_date": "2019-04-06",
                 "overview": "A youth begins a quest...", "poster_path": "/ds.jpg"}
            ]
        })))
        .mount(&server)
        .await;

    let health = Arc::new(HealthTracker::default());
    let provider: Arc<dyn MetadataProvider> = tmdb_for(&server, &health);
    let locales = LocaleFallback::new(
        &["zh-TW".into(), "zh-CN".into(), "en".into()],
        "zh-TW",
    );

    let outcome = locales
        .search(
            &CancellationToken::new(),
            &provider,
            &SearchQuery {
                title: "Demon Slayer".to_string(),
                year: Some(2019),
                media_type: MediaType::Tv,
                locale: String::new(),
            },
        )
        .await
        .unwrap();

    assert_eq!(outcome.locale, "en");
    assert!(outcome.fell_back);
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].title, "Demon Slayer");
}

/// A second resolution within the TTL is served from the cache without a
/// single additional HTTP request.
#[tokio::test]
async fn cached_resolution_skips_the_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/movie"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "results": [
                {"id": 550, "title": "Fight Club", "release_date": "1999-10-15",
                 "overview": "A ticking-time-bomb insomniac...", "poster_path": "/fc.jpg"}
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/movie/550"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 550,
            "title": "Fight Club",
            "overview": "A ticking-time-bomb insomniac...",
            "release_date": "1999-10-15",
            "vote_average": 8.4,
            "runtime": 139,
            "genres": [{"id": 18, "name": "Drama"}],
            "poster_path": "/fc.jpg",
            "imdb_id": "tt0137523"
        })))
        .mount(&server)
        .await;

    let health = Arc::new(HealthTracker::default());
    let chain = FallbackChain::new(
        vec![tmdb_for(&server, &health)],
        health,
        LocaleFallback::new(&["en".to_string()], "en"),
        None,
        chain_config(),
    );
    let cache = MetadataCache::new(init_memory_pool().unwrap(), Duration::from_secs(24 * 60 * 60));

    let request = ResolveRequest {
        title: "Fight Club".to_string(),
        year: Some(1999),
        media_type: MediaType::Movie,
    };
    let cancel = CancellationToken::new();

    let first = cache
        .get_or_fetch(&cancel, "chain:resolve/movie:fight club:1999", "resolution", || {
            chain.resolve(&cancel, &request)
        })
        .await
        .unwrap();
    assert_eq!(first.degradation_level, DegradationLevel::Normal);
    let after_first = server.received_requests().await.unwrap().len();
    assert_eq!(after_first, 2);

    let second = cache
        .get_or_fetch(&cancel, "chain:resolve/movie:fight club:1999", "resolution", || {
            chain.resolve(&cancel, &request)
        })
        .await
        .unwrap();
    assert_eq!(second.metadata.title, first.metadata.title);
    assert_eq!(server.received_requests().await.unwrap().len(), after_first);
}

/// TMDB failing on every locale marks it down, parks the request for retry,
/// and lets Douban serve a degraded answer.
#[tokio::test]
async fn primary_outage_degrades_to_secondary() {
    let tmdb_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/movie"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&tmdb_server)
        .await;

    let douban_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/j/subject_suggest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"id": "26266893", "title": "流浪地球", "year": "2019",
             "img": "https://img.example/p1.jpg", "type": "movie"}
        ])))
        .mount(&douban_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/j/subject_abstract"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "subject": {
                "title": "流浪地球",
                "rate": "7.9",
                "release_year": "2019",
                "types": ["科幻"],
                "short_comment": {"content": "中国科幻电影的里程碑"}
            }
        })))
        .mount(&douban_server)
        .await;

    let health = Arc::new(HealthTracker::default());
    let queue = Arc::new(RetryQueue::new(
        init_memory_pool().unwrap(),
        Duration::from_secs(1),
        DEFAULT_MAX_ATTEMPTS,
    ));
    let chain = FallbackChain::new(
        vec![
            tmdb_for(&tmdb_server, &health),
            Arc::new(DoubanProvider::with_base_url(
                true,
                health.clone(),
                douban_server.uri(),
            )),
        ],
        health.clone(),
        // Three locales mean three failed TMDB calls, exactly the default
        // threshold for marking a source down.
        LocaleFallback::new(&["zh-TW".into(), "zh-CN".into(), "en".into()], "zh-TW"),
        Some(queue.clone()),
        chain_config(),
    );

    let result = chain
        .resolve(
            &CancellationToken::new(),
            &ResolveRequest {
                title: "流浪地球".to_string(),
                year: Some(2019),
                media_type: MediaType::Movie,
            },
        )
        .await
        .unwrap();

    assert_eq!(result.degradation_level, DegradationLevel::Partial);
    assert_eq!(result.fallback_used, ["douban"]);
    assert_eq!(result.metadata.title, "流浪地球");
    assert_eq!(result.metadata.community_rating, Some(7.9));
    // Douban's abstract endpoint has no premiere date or poster.
    assert!(result.missing_fields.contains(&"premiere_date".to_string()));

    assert!(health.is_down("tmdb"));
    assert_eq!(queue.active_count().unwrap(), 1);
}
