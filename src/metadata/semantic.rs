//! AI semantic filename parsing — the last step in the fallback chain.
//!
//! When every structured source has failed, a completion model can usually
//! still pull a usable title/year/media-type out of a messy release filename.
//! Two wire-compatible backends are supported and selected by configuration:
//! an OpenAI-style chat-completions API and an Anthropic-style messages API.
//! The step is skipped entirely (not counted as a failure) when no credential
//! is configured.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use framevault_common::MediaType;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::ProviderError;
use super::health::HealthTracker;
use super::http::{windowed_quota, RateLimitedClient};
use super::provider::{MediaMetadata, MetadataProvider, SearchQuery, SearchResult};

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Completion calls are slow and billed; keep the bucket small.
const QUOTA_REQUESTS: u32 = 10;
const QUOTA_WINDOW: Duration = Duration::from_secs(60);

/// Which completion API dialect to speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SemanticBackend {
    #[default]
    OpenAi,
    Anthropic,
}

/// Structured guess produced from a filename.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticGuess {
    pub title: String,
    pub year: Option<u16>,
    pub media_type: Option<MediaType>,
}

// ---------------------------------------------------------------------------
// Wire types (private)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    #[serde(default)]
    text: String,
}

/// Parses release filenames with a completion model.
pub struct SemanticParser {
    client: RateLimitedClient,
    backend: SemanticBackend,
    api_key: String,
    model: String,
    base_url: String,
}

impl SemanticParser {
    pub fn new(
        backend: SemanticBackend,
        api_key: String,
        model: String,
        health: Arc<HealthTracker>,
    ) -> Self {
        let base_url = match backend {
            SemanticBackend::OpenAi => OPENAI_BASE_URL.to_string(),
            SemanticBackend::Anthropic => ANTHROPIC_BASE_URL.to_string(),
        };
        Self::with_base_url(backend, api_key, model, health, base_url)
    }

    /// Create a parser pointed at a non-default base URL (used in tests).
    pub fn with_base_url(
        backend: SemanticBackend,
        api_key: String,
        model: String,
        health: Arc<HealthTracker>,
        base_url: String,
    ) -> Self {
        let client = RateLimitedClient::new(
            "semantic",
            windowed_quota(QUOTA_REQUESTS, QUOTA_WINDOW),
            health,
        );
        Self {
            client,
            backend,
            api_key,
            model,
            base_url,
        }
    }

    /// Whether a credential is configured. An unavailable parser is skipped
    /// by the coordinator without counting as a failure.
    pub fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Ask the model to extract structured fields from a filename.
    pub async fn parse_filename(
        &self,
        cancel: &CancellationToken,
        filename: &str,
    ) -> Result<SemanticGuess, ProviderError> {
        let prompt = format!(
            "Extract the media title from this video filename. Respond with only a JSON \
             object with fields: title (string), year (number or null), media_type \
             (\"movie\" or \"tv\" or null). Filename: {filename}"
        );
        debug!(backend = ?self.backend, filename = filename, "Semantic filename parse");

        let content = match self.backend {
            SemanticBackend::OpenAi => {
                let url = format!("{}/v1/chat/completions", self.base_url);
                let auth = format!("Bearer {}", self.api_key);
                let body = serde_json::json!({
                    "model": self.model,
                    "messages": [{"role": "user", "content": prompt}],
                    "temperature": 0,
                });
                let resp: OpenAiResponse = self
                    .client
                    .post_json(cancel, &url, &[("authorization", auth.as_str())], &body)
                    .await?;
                resp.choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content)
                    .unwrap_or_default()
            }
            SemanticBackend::Anthropic => {
                let url = format!("{}/v1/messages", self.base_url);
                let body = serde_json::json!({
                    "model": self.model,
                    "max_tokens": 256,
                    "messages": [{"role": "user", "content": prompt}],
                });
                let resp: AnthropicResponse = self
                    .client
                    .post_json(
                        cancel,
                        &url,
                        &[
                            ("x-api-key", self.api_key.as_str()),
                            ("anthropic-version", ANTHROPIC_VERSION),
                        ],
                        &body,
                    )
                    .await?;
                resp.content
                    .into_iter()
                    .next()
                    .map(|b| b.text)
                    .unwrap_or_default()
            }
        };

        parse_guess(&content).ok_or_else(|| {
            ProviderError::ServerError(format!(
                "semantic backend returned an unparsable guess: {content}"
            ))
        })
    }
}

/// A model guess carries a title and maybe a year, nothing richer, so it
/// must never outrank a structured source.
const GUESS_CONFIDENCE: f64 = 0.25;

/// Adapter presenting the parser as the last source in the fallback chain.
///
/// A "search" runs the filename through the model and returns the guess as a
/// single low-confidence result; `get_details` re-parses the id (the original
/// filename) into minimal metadata.
pub struct SemanticProvider {
    parser: SemanticParser,
}

impl SemanticProvider {
    pub fn new(parser: SemanticParser) -> Self {
        Self { parser }
    }
}

#[async_trait]
impl MetadataProvider for SemanticProvider {
    fn name(&self) -> &'static str {
        "semantic"
    }

    fn is_available(&self) -> bool {
        self.parser.is_available()
    }

    async fn search_movies(
        &self,
        cancel: &CancellationToken,
        query: &SearchQuery,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        let guess = self.parser.parse_filename(cancel, &query.title).await?;
        Ok(vec![SearchResult {
            id: query.title.clone(),
            title: guess.title,
            year: guess.year,
            overview: None,
            confidence: GUESS_CONFIDENCE,
            provider_name: "semantic".to_string(),
            poster_url: None,
        }])
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
        cancel: &CancellationToken,
        provider_id: &str,
        _media_type: MediaType,
        _locale: &str,
    ) -> Result<MediaMetadata, ProviderError> {
        let guess = self.parser.parse_filename(cancel, provider_id).await?;
        Ok(MediaMetadata {
            title: guess.title,
            original_title: None,
            overview: None,
            genres: Vec::new(),
            production_year: guess.year,
            premiere_date: None,
            community_rating: None,
            runtime_minutes: None,
            poster_url: None,
            provider_ids: Default::default(),
        })
    }
}

/// Parse the model's reply, tolerating markdown code fences.
fn parse_guess(content: &str) -> Option<SemanticGuess> {
    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let guess: SemanticGuess = serde_json::from_str(trimmed).ok()?;
    if guess.title.trim().is_empty() {
        return None;
    }
    Some(guess)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn guess_parsing_tolerates_fences() {
        let plain = parse_guess(r#"{"title": "Dune", "year": 2021, "media_type": "movie"}"#);
        assert_eq!(plain.unwrap().year, Some(2021));

        let fenced =
            parse_guess("```json\n{\"title\": \"Dune\", \"year\": null, \"media_type\": null}\n```");
        assert_eq!(fenced.unwrap().title, "Dune");

        assert!(parse_guess("I could not parse that filename.").is_none());
        assert!(parse_guess(r#"{"title": "", "year": null, "media_type": null}"#).is_none());
    }

    #[test]
    fn availability_requires_credential() {
        let health = Arc::new(HealthTracker::default());
        let parser = SemanticParser::new(
            SemanticBackend::OpenAi,
            String::new(),
            "gpt-4o-mini".into(),
            health.clone(),
        );
        assert!(!parser.is_available());

        let parser = SemanticParser::new(
            SemanticBackend::Anthropic,
            "sk-key".into(),
            "claude-3-5-haiku-latest".into(),
            health,
        );
        assert!(parser.is_available());
    }

    #[tokio::test]
    async fn openai_backend_parses_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant",
                    "content": "{\"title\": \"The Wandering Earth\", \"year\": 2019, \"media_type\": \"movie\"}"}}]
            })))
            .mount(&server)
            .await;

        let parser = SemanticParser::with_base_url(
            SemanticBackend::OpenAi,
            "sk-test".into(),
            "gpt-4o-mini".into(),
            Arc::new(HealthTracker::default()),
            server.uri(),
        );

        let guess = parser
            .parse_filename(
                &CancellationToken::new(),
                "The.Wandering.Earth.2019.1080p.BluRay.x264.mkv",
            )
            .await
            .unwrap();
        assert_eq!(guess.title, "The Wandering Earth");
        assert_eq!(guess.year, Some(2019));
        assert_eq!(guess.media_type, Some(MediaType::Movie));
    }

    #[tokio::test]
    async fn anthropic_backend_parses_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-ant"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"type": "text",
                    "text": "{\"title\": \"Demon Slayer\", \"year\": 2019, \"media_type\": \"tv\"}"}]
            })))
            .mount(&server)
            .await;

        let parser = SemanticParser::with_base_url(
            SemanticBackend::Anthropic,
            "sk-ant".into(),
            "claude-3-5-haiku-latest".into(),
            Arc::new(HealthTracker::default()),
            server.uri(),
        );

        let guess = parser
            .parse_filename(&CancellationToken::new(), "Kimetsu.no.Yaiba.S01.1080p.mkv")
            .await
            .unwrap();
        assert_eq!(guess.title, "Demon Slayer");
        assert_eq!(guess.media_type, Some(MediaType::Tv));
    }

    #[tokio::test]
    async fn unparsable_reply_is_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "no can do"}}]
            })))
            .mount(&server)
            .await;

        let parser = SemanticParser::with_base_url(
            SemanticBackend::OpenAi,
            "sk-test".into(),
            "gpt-4o-mini".into(),
            Arc::new(HealthTracker::default()),
            server.uri(),
        );

        let err = parser
            .parse_filename(&CancellationToken::new(), "file.mkv")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ServerError(_)));
    }
}
