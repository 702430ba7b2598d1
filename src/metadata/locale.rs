//! Locale fallback search.
//!
//! Runs the same search against one provider across an ordered locale chain
//! and stops at the first locale that yields localized results (non-empty
//! title and overview). When no locale produces localized data, the last
//! non-error response is returned as a best-effort answer.

use std::sync::Arc;

use framevault_common::locale::{normalize_chain, FALLBACK_LOCALE};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::ProviderError;
use super::provider::{MetadataProvider, SearchQuery, SearchResult};

/// Outcome of a locale-chain search: the results plus the locale that
/// actually produced them.
#[derive(Debug, Clone)]
pub struct LocaleSearchOutcome {
    pub results: Vec<SearchResult>,
    pub locale: String,
    /// True when the results came from a locale later in the chain than the
    /// first, or are an unlocalized best-effort answer.
    pub fell_back: bool,
}

/// Searches a provider across an ordered locale chain.
pub struct LocaleFallback {
    locales: Vec<String>,
}

impl LocaleFallback {
    /// Build from a configured chain. Empty or blank entries are dropped and
    /// an empty chain is replaced with the default for the preferred locale.
    pub fn new(locales: &[String], preferred: &str) -> Self {
        Self {
            locales: normalize_chain(locales, preferred),
        }
    }

    pub fn locales(&self) -> &[String] {
        &self.locales
    }

    /// Try each locale in order against the provider. Returns the first
    /// localized response, or the last non-error response (possibly empty)
    /// when nothing in the chain is localized. Errors only when every locale
    /// errors; the error returned is the last one observed.
    pub async fn search(
        &self,
        cancel: &CancellationToken,
        provider: &Arc<dyn MetadataProvider>,
        query: &SearchQuery,
    ) -> Result<LocaleSearchOutcome, ProviderError> {
        let mut last_ok: Option<(Vec<SearchResult>, String)> = None;
        let mut last_error: Option<ProviderError> = None;

        for (index, locale) in self.locales.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(ProviderError::cancelled("cancelled during locale fallback"));
            }

            let localized_query = SearchQuery {
                locale: locale.clone(),
                ..query.clone()
            };

            match provider.search(cancel, &localized_query).await {
                Ok(results) => {
                    if results.iter().any(|r| r.is_localized()) {
                        debug!(
                            provider = provider.name(),
                            locale = locale.as_str(),
                            count = results.len(),
                            "Localized results found"
                        );
                        return Ok(LocaleSearchOutcome {
                            results,
                            locale: locale.clone(),
                            fell_back: index > 0,
                        });
                    }
                    // Keep the most recent answer, empty included, so the
                    // fallback reflects the last locale actually attempted.
                    last_ok = Some((results, locale.clone()));
                }
                Err(ProviderError::Cancelled(reason)) => {
                    return Err(ProviderError::Cancelled(reason));
                }
                Err(err) => {
                    warn!(
                        provider = provider.name(),
                        locale = locale.as_str(),
                        error = %err,
                        "Locale search failed, trying next locale"
                    );
                    last_error = Some(err);
                }
            }
        }

        if let Some((results, locale)) = last_ok {
            debug!(
                provider = provider.name(),
                locale = locale.as_str(),
                count = results.len(),
                "No localized results; returning best-effort answer"
            );
            return Ok(LocaleSearchOutcome {
                results,
                locale,
                fell_back: true,
            });
        }

        match last_error {
            Some(err) => Err(err),
            // Only reachable with an empty chain, which new() rules out.
            None => Ok(LocaleSearchOutcome {
                results: Vec::new(),
                locale: FALLBACK_LOCALE.to_string(),
                fell_back: true,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use framevault_common::MediaType;
    use parking_lot::Mutex;

    /// Scripted provider: each search pops the next canned response for the
    /// requested locale.
    struct ScriptedProvider {
        responses:
            Mutex<std::collections::HashMap<String, Result<Vec<SearchResult>, ProviderError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn new(
            responses: Vec<(&str, Result<Vec<SearchResult>, ProviderError>)>,
        ) -> Self {
            Self {
                responses: Mutex::new(
                    responses
                        .into_iter()
                        .map(|(l, r)| (l.to_string(), r))
                        .collect(),
                ),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MetadataProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn is_available(&self) -> bool {
            true
        }

        async fn search_movies(
            &self,
            _cancel: &CancellationToken,
            query: &SearchQuery,
        ) -> Result<Vec<SearchResult>, ProviderError> {
            self.calls.lock().push(query.locale.clone());
            self.responses
                .lock()
                .remove(&query.locale)
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn search_tv(
            &self,
            cancel: &CancellationToken,
            query: &SearchQuery,
        ) -> Result<Vec<SearchResult>, ProviderError> {
            self.search_movies(cancel, query).await
        }

        async fn get_details(
            &self,
            _cancel: &CancellationToken,
            _provider_id: &str,
            _media_type: MediaType,
            _locale: &str,
        ) -> Result<super::super::provider::MediaMetadata, ProviderError> {
            Err(ProviderError::NotFound("not scripted".into()))
        }
    }

    fn result(title: &str, overview: Option<&str>) -> SearchResult {
        SearchResult {
            id: "1".into(),
            title: title.into(),
            year: Some(2020),
            overview: overview.map(str::to_string),
            confidence: 0.5,
            provider_name: "scripted".into(),
            poster_url: None,
        }
    }

    fn query() -> SearchQuery {
        SearchQuery {
            title: "Dune".into(),
            year: Some(2020),
            media_type: MediaType::Movie,
            locale: String::new(),
        }
    }

    fn chain() -> Vec<String> {
        vec!["zh-TW".into(), "zh-CN".into(), "en".into()]
    }

    #[tokio::test]
    async fn first_localized_locale_wins() {
        let scripted = Arc::new(ScriptedProvider::new(vec![
            ("zh-TW", Ok(vec![result("沙丘", Some("沙漠星球"))])),
        ]));
        let provider: Arc<dyn MetadataProvider> = scripted.clone();
        let fallback = LocaleFallback::new(&chain(), "zh-TW");

        let outcome = fallback
            .search(&CancellationToken::new(), &provider, &query())
            .await
            .unwrap();
        assert_eq!(outcome.locale, "zh-TW");
        assert!(!outcome.fell_back);
        assert_eq!(outcome.results[0].title, "沙丘");
        // Later locales in the chain were never tried.
        assert_eq!(scripted.calls.lock().as_slice(), ["zh-TW"]);
    }

    #[tokio::test]
    async fn unlocalized_first_locale_falls_through() {
        // zh-TW answers with a title but no overview, zh-CN is fully localized.
        let provider: Arc<dyn MetadataProvider> = Arc::new(ScriptedProvider::new(vec![
            ("zh-TW", Ok(vec![result("Dune", None)])),
            ("zh-CN", Ok(vec![result("沙丘", Some("沙漠星球"))])),
        ]));
        let fallback = LocaleFallback::new(&chain(), "zh-TW");

        let outcome = fallback
            .search(&CancellationToken::new(), &provider, &query())
            .await
            .unwrap();
        assert_eq!(outcome.locale, "zh-CN");
        assert!(outcome.fell_back);
    }

    #[tokio::test]
    async fn best_effort_when_nothing_localized() {
        let provider: Arc<dyn MetadataProvider> = Arc::new(ScriptedProvider::new(vec![
            ("zh-TW", Ok(vec![result("Dune", None)])),
            ("zh-CN", Ok(Vec::new())),
            ("en", Ok(vec![result("Dune", None)])),
        ]));
        let fallback = LocaleFallback::new(&chain(), "zh-TW");

        let outcome = fallback
            .search(&CancellationToken::new(), &provider, &query())
            .await
            .unwrap();
        // Last non-empty response wins.
        assert_eq!(outcome.locale, "en");
        assert!(outcome.fell_back);
        assert_eq!(outcome.results.len(), 1);
    }

    #[tokio::test]
    async fn trailing_empty_locale_is_the_answer() {
        // zh-TW has an unlocalized hit but the later locales come back empty;
        // the outcome reports the last attempted locale and its empty result,
        // not the earlier non-empty one.
        let provider: Arc<dyn MetadataProvider> = Arc::new(ScriptedProvider::new(vec![
            ("zh-TW", Ok(vec![result("Dune", None)])),
            ("zh-CN", Ok(Vec::new())),
            ("en", Ok(Vec::new())),
        ]));
        let fallback = LocaleFallback::new(&chain(), "zh-TW");

        let outcome = fallback
            .search(&CancellationToken::new(), &provider, &query())
            .await
            .unwrap();
        assert_eq!(outcome.locale, "en");
        assert!(outcome.results.is_empty());
        assert!(outcome.fell_back);
    }

    #[tokio::test]
    async fn errors_skipped_until_success() {
        let provider: Arc<dyn MetadataProvider> = Arc::new(ScriptedProvider::new(vec![
            ("zh-TW", Err(ProviderError::Timeout("slow".into()))),
            ("zh-CN", Ok(vec![result("沙丘", Some("沙漠星球"))])),
        ]));
        let fallback = LocaleFallback::new(&chain(), "zh-TW");

        let outcome = fallback
            .search(&CancellationToken::new(), &provider, &query())
            .await
            .unwrap();
        assert_eq!(outcome.locale, "zh-CN");
    }

    #[tokio::test]
    async fn all_errors_propagates_last() {
        let provider: Arc<dyn MetadataProvider> = Arc::new(ScriptedProvider::new(vec![
            ("zh-TW", Err(ProviderError::Timeout("slow".into()))),
            ("zh-CN", Err(ProviderError::ServerError("500".into()))),
            ("en", Err(ProviderError::RateLimitExceeded("429".into()))),
        ]));
        let fallback = LocaleFallback::new(&chain(), "zh-TW");

        let err = fallback
            .search(&CancellationToken::new(), &provider, &query())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::RateLimitExceeded(_)));
    }

    #[tokio::test]
    async fn empty_chain_uses_default_for_preferred() {
        let fallback = LocaleFallback::new(&[], "zh-TW");
        assert_eq!(fallback.locales(), &["zh-TW", "zh-CN", "en"]);
    }
}
