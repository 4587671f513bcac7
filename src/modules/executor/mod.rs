//! Single-request execution: proxy selection, rate gating, transport,
//! response classification, and the bounded retry/escalation ladder.
//!
//! The executor is the only path to the network. Classification maps every
//! observable upstream behavior onto the [`ScrapeError`] taxonomy; recovery
//! is fixed per variant: transient errors retry with exponential backoff,
//! blocks go through the escalation policy — a tier escalation re-attempts
//! once in place, a session rotation invalidates the store and surfaces so
//! the caller can re-attempt with freshly acquired session material — auth
//! expiry invalidates the session and surfaces to the caller (which
//! re-acquires and re-attempts once), parse drift propagates untouched.

mod transport;

pub use transport::{RawResponse, ReqwestTransport};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::Method;
use rand::Rng;
use tokio::time::sleep;
use url::Url;

use crate::error::ScrapeError;
use crate::modules::escalation::{BlockedDirective, EscalationPolicy};
use crate::modules::proxy::{ProxyOutcome, ProxyPool};
use crate::modules::rate_limit::RateLimiter;
use crate::modules::session::SessionStore;

/// One outbound request, transport-agnostic.
#[derive(Debug, Clone)]
pub struct ScrapeRequest {
    pub method: Method,
    pub url: Url,
    /// Extra headers beyond the transport's fingerprint defaults
    /// (session cookies, anti-forgery tokens, app ids).
    pub headers: Vec<(String, String)>,
    pub json_body: Option<serde_json::Value>,
}

impl ScrapeRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: Vec::new(),
            json_body: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Transport seam. The production implementation is reqwest with a
/// browser-like fingerprint; tests substitute scripted responses. Redirects
/// must not be followed — classification inspects them.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(
        &self,
        request: &ScrapeRequest,
        proxy: Option<&str>,
        timeout: Duration,
    ) -> Result<RawResponse, String>;
}

/// Map a raw upstream response onto the error taxonomy.
///
/// Redirects are treated as soft blocks except login redirects, which mean
/// the session is no longer honored. Unexpected 4xx statuses are contract
/// drift, not transient failures.
pub fn classify(response: RawResponse) -> Result<RawResponse, ScrapeError> {
    match response.status {
        200..=299 => Ok(response),
        429 => Err(ScrapeError::RateLimited),
        403 => Err(ScrapeError::Blocked),
        401 => Err(ScrapeError::AuthExpired),
        300..=399 => {
            if response
                .location
                .as_deref()
                .is_some_and(|location| location.contains("login"))
            {
                Err(ScrapeError::AuthExpired)
            } else {
                Err(ScrapeError::Blocked)
            }
        }
        500..=599 => Err(ScrapeError::Network(format!(
            "upstream status {}",
            response.status
        ))),
        status => Err(ScrapeError::Parse(format!("unexpected status {status}"))),
    }
}

/// Executes single requests for one platform.
pub struct RequestExecutor {
    transport: Arc<dyn HttpTransport>,
    pool: Arc<ProxyPool>,
    policy: Arc<dyn EscalationPolicy>,
    limiter: Arc<RateLimiter>,
    sessions: Arc<SessionStore>,
    max_retries: u32,
    backoff_base: Duration,
    request_timeout: Duration,
}

impl RequestExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        pool: Arc<ProxyPool>,
        policy: Arc<dyn EscalationPolicy>,
        limiter: Arc<RateLimiter>,
        sessions: Arc<SessionStore>,
        max_retries: u32,
        backoff_base: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            pool,
            policy,
            limiter,
            sessions,
            max_retries,
            backoff_base,
            request_timeout,
        }
    }

    /// Issue one request, driving retries, escalation, and session
    /// invalidation. Returns the classified response on success; callers
    /// needing cookies (session acquisition) read them off the response.
    pub async fn execute(&self, request: &ScrapeRequest) -> Result<RawResponse, ScrapeError> {
        let mut transient_attempts = 0u32;
        let mut blocked_reattempted = false;

        loop {
            let identity = self.pool.select(self.policy.tier())?;
            self.limiter.acquire().await;

            let raw = self
                .transport
                .send(request, identity.endpoint.as_deref(), self.request_timeout)
                .await;

            let classified = match raw {
                Ok(response) => classify(response),
                Err(message) => Err(ScrapeError::Network(message)),
            };

            match classified {
                Ok(response) => {
                    self.pool.report(&identity, ProxyOutcome::Ok);
                    return Ok(response);
                }
                Err(ScrapeError::Blocked) => {
                    self.pool.report(&identity, ProxyOutcome::Blocked);
                    match self.policy.on_blocked(&self.pool, &identity) {
                        BlockedDirective::RotateSessionAndRetry => {
                            // Re-attempting here would resend the stale
                            // cookies the block was answering. Invalidate
                            // and surface; the caller rebuilds the request
                            // from a freshly acquired session.
                            self.sessions.invalidate();
                            return Err(ScrapeError::Blocked);
                        }
                        BlockedDirective::RetryNewIdentity => {
                            if blocked_reattempted {
                                return Err(ScrapeError::Blocked);
                            }
                            blocked_reattempted = true;
                            log::debug!(
                                "blocked via identity {}, re-attempting once",
                                identity.id
                            );
                            continue;
                        }
                    }
                }
                Err(ScrapeError::AuthExpired) => {
                    // The identity itself worked; the session did not.
                    self.pool.report(&identity, ProxyOutcome::Ok);
                    self.sessions.invalidate();
                    return Err(ScrapeError::AuthExpired);
                }
                Err(error) if error.is_retryable() => {
                    self.pool.report(&identity, ProxyOutcome::NetworkError);
                    transient_attempts += 1;
                    if transient_attempts > self.max_retries {
                        return Err(error);
                    }
                    let delay = backoff_delay(self.backoff_base, transient_attempts);
                    log::debug!(
                        "transient error ({}), retry {}/{} after {:?}",
                        error.classification(),
                        transient_attempts,
                        self.max_retries,
                        delay
                    );
                    sleep(delay).await;
                }
                Err(error) => {
                    // Parse drift. Transport and identity were fine.
                    self.pool.report(&identity, ProxyOutcome::Ok);
                    return Err(error);
                }
            }
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Whether the configured policy answers blocks with a session rotation.
    /// When it does, a `Blocked` error from [`execute`](Self::execute) means
    /// the store was invalidated and the caller owns the single re-attempt
    /// with fresh session material.
    pub fn rotates_session_on_block(&self) -> bool {
        self.policy.rotates_session()
    }
}

/// Exponential backoff: base doubled per attempt, plus up to 25% jitter so
/// synchronized retries do not form a detectable cadence.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = base.saturating_mul(1u32 << (attempt - 1).min(16));
    let jitter = exp.mul_f64(rand::thread_rng().gen_range(0.0..0.25));
    exp + jitter
}
