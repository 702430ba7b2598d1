//! Rate-limited HTTP client shared by the provider implementations.
//!
//! Each provider owns one [`RateLimitedClient`] sized to its published quota.
//! The client enforces a token-bucket limit via [`governor`], threads the
//! caller's cancellation token through both the token wait and the request
//! itself, maps outcomes into the canonical [`ProviderError`] taxonomy, and
//! reports every countable outcome to the [`HealthTracker`].

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{Quota, RateLimiter};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::ProviderError;
use super::health::HealthTracker;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type DirectLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Quota helper: `requests` per `window`, with the full window available as
/// burst (e.g. 40 requests / 10 s).
pub fn windowed_quota(requests: u32, window: Duration) -> Quota {
    let requests = NonZeroU32::new(requests.max(1)).expect("non-zero after max(1)");
    Quota::with_period(window / requests.get())
        .expect("window must be non-zero")
        .allow_burst(requests)
}

/// Error payload shape many JSON APIs use; parsed best-effort to enrich the
/// error message. An unparsable body falls back to status-only classification.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(alias = "status_message", alias = "error", alias = "detail")]
    message: Option<String>,
}

/// HTTP client with token-bucket rate limiting and health reporting.
pub struct RateLimitedClient {
    provider: &'static str,
    client: reqwest::Client,
    limiter: DirectLimiter,
    health: Arc<HealthTracker>,
}

impl RateLimitedClient {
    /// Create a client for `provider` limited to the given quota.
    pub fn new(provider: &'static str, quota: Quota, health: Arc<HealthTracker>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build reqwest client");

        Self {
            provider,
            client,
            limiter: RateLimiter::direct(quota),
            health,
        }
    }

    /// Execute a GET request and deserialize the JSON response.
    ///
    /// Blocks until a rate-limit token is available or `cancel` fires;
    /// cancellation yields [`ProviderError::Cancelled`] and is reported to
    /// neither the health tracker nor the retry machinery.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        url: &str,
    ) -> Result<T, ProviderError> {
        let request = self.client.get(url);
        self.execute_json(cancel, url, request).await
    }

    /// Execute a POST request with a JSON body and extra headers, and
    /// deserialize the JSON response. Same rate-limit, cancellation, and
    /// health semantics as [`get_json`](Self::get_json).
    pub async fn post_json<B: serde::Serialize, T: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        url: &str,
        headers: &[(&str, &str)],
        body: &B,
    ) -> Result<T, ProviderError> {
        let mut request = self.client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        self.execute_json(cancel, url, request).await
    }

    async fn execute_json<T: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        url: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ProviderError> {
        // Primary backpressure point: wait for a token.
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(provider = self.provider, url = url, "Cancelled while waiting for rate limit token");
                return Err(ProviderError::cancelled("cancelled while rate limited"));
            }
            _ = self.limiter.until_ready() => {}
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(provider = self.provider, url = url, "Cancelled mid-request");
                return Err(ProviderError::cancelled("cancelled during request"));
            }
            resp = request.send() => resp,
        };

        let outcome = match response {
            Ok(resp) => self.classify(resp).await,
            Err(e) => Err(ProviderError::from_transport(
                &e,
                &format!("{} request failed", self.provider),
            )),
        };

        match outcome {
            Ok(resp) => {
                let parsed = resp.json::<T>().await.map_err(|e| {
                    ProviderError::ServerError(format!(
                        "{} returned an unparsable response: {e}",
                        self.provider
                    ))
                });
                self.report(&parsed);
                parsed
            }
            Err(e) => {
                self.report::<T>(&Err(e.clone()));
                Err(e)
            }
        }
    }

    /// Turn a non-success response into a classified error, pulling a message
    /// out of the body when one is present.
    async fn classify(&self, resp: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let context = match resp.json::<ErrorBody>().await {
            Ok(ErrorBody {
                message: Some(message),
            }) => format!("{}: {}", self.provider, message),
            _ => format!("{}: HTTP {}", self.provider, status),
        };

        Err(ProviderError::from_status(status, &context))
    }

    /// Report the call outcome to the health tracker. Cancellations are
    /// deliberately invisible here.
    fn report<T>(&self, outcome: &Result<T, ProviderError>) {
        match outcome {
            Ok(_) => self.health.record_success(self.provider),
            Err(e) if e.counts_against_health() => {
                warn!(
                    provider = self.provider,
                    code = e.code(),
                    error = %e,
                    "Provider call failed"
                );
                self.health.record_error(self.provider, &e.to_string());
            }
            Err(_) => {}
        }
    }
}
