//! Error taxonomy shared across the scraping stack.
//!
//! Every upstream misbehavior the executor can observe maps onto one of
//! these variants; the recovery policy for each is fixed (see the executor
//! and pagination modules) so callers never need to inspect message text.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type ScraperResult<T> = Result<T, ScrapeError>;

#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Upstream answered 429. Retried locally with backoff.
    #[error("upstream rate limited the request")]
    RateLimited,

    /// Upstream answered 403 or an equivalent block page. Recovered through
    /// proxy escalation/rotation, bounded to one re-attempt.
    #[error("request blocked by upstream")]
    Blocked,

    /// The cached session (cookies / anti-forgery token) was rejected.
    /// Recovered through session re-acquisition, bounded to one re-attempt.
    #[error("session expired or invalid")]
    AuthExpired,

    /// The response body does not match the expected shape. Never retried at
    /// the request layer; pagination may apply a structural fallback.
    #[error("response did not match expected schema: {0}")]
    Parse(String),

    /// Transport-level failure (DNS, TLS, reset, timeout on the socket).
    #[error("network error: {0}")]
    Network(String),

    /// Every identity in the eligible proxy tier(s) is on cooldown. Terminal
    /// for the current scrape call.
    #[error("no proxy identity available")]
    NoProxyAvailable,

    /// The overall wall-clock budget for the scrape call elapsed.
    #[error("scrape wall-clock budget exceeded")]
    Timeout,
}

impl ScrapeError {
    /// Stable classification string surfaced in the `failed` JSON document.
    pub fn classification(&self) -> &'static str {
        match self {
            ScrapeError::RateLimited => "rate_limited",
            ScrapeError::Blocked => "blocked",
            ScrapeError::AuthExpired => "auth_expired",
            ScrapeError::Parse(_) => "parse_error",
            ScrapeError::Network(_) => "network_error",
            ScrapeError::NoProxyAvailable => "no_proxy_available",
            ScrapeError::Timeout => "timeout",
        }
    }

    /// Whether the executor's bounded retry loop may re-attempt this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScrapeError::RateLimited | ScrapeError::Network(_))
    }
}
