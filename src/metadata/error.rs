//! Canonical provider-facing error taxonomy.
//!
//! Every transport or HTTP failure from an external metadata source is mapped
//! into one of these kinds before it leaves the client layer. The taxonomy
//! drives two downstream decisions: whether the failure counts against the
//! provider's health (cancellations do not) and whether the failed work is
//! eligible for the retry queue.

use std::time::Duration;

use reqwest::StatusCode;

/// A classified failure from an external metadata provider.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// The request did not complete within the deadline.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The provider rejected the request for exceeding its quota.
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// The requested resource does not exist upstream.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Credentials are missing, invalid, or revoked.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The provider failed internally (HTTP 5xx or malformed response).
    #[error("Upstream server error: {0}")]
    ServerError(String),

    /// The request itself was malformed (HTTP 4xx other than the above).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The caller's cancellation token fired before the call completed.
    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl ProviderError {
    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::RateLimitExceeded(_) => "rate_limit_exceeded",
            Self::NotFound(_) => "not_found",
            Self::Unauthorized(_) => "unauthorized",
            Self::ServerError(_) => "server_error",
            Self::BadRequest(_) => "bad_request",
            Self::Cancelled(_) => "cancelled",
        }
    }

    /// Optional remediation hint suitable for logs or an admin surface.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::RateLimitExceeded(_) => {
                Some("reduce request volume or wait for the quota window to reset")
            }
            Self::Unauthorized(_) => Some("check the provider API key in the configuration"),
            Self::Timeout(_) => Some("the provider may be degraded; the call will be retried"),
            _ => None,
        }
    }

    /// Whether this failure is eligible for the retry queue.
    ///
    /// `BadRequest` and `NotFound` are deterministic and must fail fast;
    /// `Cancelled` reflects caller intent, not provider state, so it is
    /// neither retried nor counted against health.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::RateLimitExceeded(_) | Self::ServerError(_)
        )
    }

    /// Whether this outcome should be reported to the health tracker.
    pub fn counts_against_health(&self) -> bool {
        !matches!(self, Self::Cancelled(_))
    }

    /// Classify an HTTP status, used when the error body is unparsable or
    /// carries no provider-specific code.
    pub fn from_status(status: StatusCode, context: &str) -> Self {
        match status {
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
                Self::Timeout(context.to_string())
            }
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimitExceeded(context.to_string()),
            StatusCode::NOT_FOUND => Self::NotFound(context.to_string()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Self::Unauthorized(context.to_string())
            }
            s if s.is_server_error() => Self::ServerError(context.to_string()),
            s if s.is_client_error() => Self::BadRequest(context.to_string()),
            s => Self::ServerError(format!("{context}: unexpected status {s}")),
        }
    }

    /// Classify a reqwest transport error.
    pub fn from_transport(err: &reqwest::Error, context: &str) -> Self {
        if err.is_timeout() {
            Self::Timeout(format!("{context}: {err}"))
        } else if let Some(status) = err.status() {
            Self::from_status(status, context)
        } else {
            // Connection resets, DNS failures, and the like behave as
            // transient server-side trouble for retry purposes.
            Self::ServerError(format!("{context}: {err}"))
        }
    }

    /// Convenience constructor for the cancellation case.
    pub fn cancelled(context: &str) -> Self {
        Self::Cancelled(context.to_string())
    }
}

/// Backoff delay for a retry attempt: `base * 2^attempt_count`.
pub fn backoff_delay(base: Duration, attempt_count: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt_count))
}
