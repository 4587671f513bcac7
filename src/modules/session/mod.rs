//! Short-lived session artifacts (cookies, anti-forgery tokens).
//!
//! A session is acquired lazily through the platform's landing fetch, cached
//! until its TTL elapses or a request classifies as `AuthExpired`, and
//! handed out as an immutable snapshot. An invalidation never retracts a
//! snapshot already in flight; the in-flight request fails and triggers its
//! own re-acquisition instead.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::ScrapeError;

/// Auth artifacts for one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Cookie pairs harvested from the landing response.
    pub cookies: Vec<(String, String)>,
    /// Anti-forgery token (e.g. Instagram's `csrftoken`) when the platform
    /// requires one on query endpoints.
    pub anti_forgery_token: Option<String>,
    pub acquired_at: Instant,
    pub ttl: Duration,
}

impl Session {
    pub fn new(cookies: Vec<(String, String)>, anti_forgery_token: Option<String>, ttl: Duration) -> Self {
        Self {
            cookies,
            anti_forgery_token,
            acquired_at: Instant::now(),
            ttl,
        }
    }

    fn expired(&self, now: Instant) -> bool {
        now.duration_since(self.acquired_at) >= self.ttl
    }

    /// Cookie header value in request order.
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Performed by the platform client: an unauthenticated landing fetch that
/// harvests cookies/tokens, going through the full executor path (rate
/// limiter and proxy pool included).
#[async_trait]
pub trait SessionAcquirer: Send + Sync {
    async fn acquire_session(&self) -> Result<Session, ScrapeError>;
}

/// Cached session for one platform.
///
/// The slot lock is never held across the landing fetch: the fetch itself
/// runs through the executor, and the executor invalidates this store on
/// blocks and auth expiry. A separate renewal lock serializes acquisitions,
/// so concurrent pagination requests of the same scrape call still share a
/// single landing fetch.
#[derive(Debug, Default)]
pub struct SessionStore {
    slot: Mutex<Option<Session>>,
    renewal: tokio::sync::Mutex<()>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached session, or acquire a fresh one if the slot is
    /// empty or past TTL.
    pub async fn get_or_acquire(
        &self,
        acquirer: &dyn SessionAcquirer,
    ) -> Result<Session, ScrapeError> {
        if let Some(session) = self.cached() {
            return Ok(session);
        }

        let _renewal = self.renewal.lock().await;
        // Another task may have finished acquiring while we waited.
        if let Some(session) = self.cached() {
            return Ok(session);
        }

        let session = acquirer.acquire_session().await?;
        *self.slot.lock().expect("session slot lock poisoned") = Some(session.clone());
        Ok(session)
    }

    fn cached(&self) -> Option<Session> {
        let mut slot = self.slot.lock().expect("session slot lock poisoned");
        match slot.as_ref() {
            Some(session) if !session.expired(Instant::now()) => Some(session.clone()),
            Some(_) => {
                log::debug!("session past TTL, discarding");
                *slot = None;
                None
            }
            None => None,
        }
    }

    /// Drop the cached session so the next `get_or_acquire` re-fetches.
    /// Safe to call from inside an in-flight acquisition's own request path.
    pub fn invalidate(&self) {
        let mut slot = self.slot.lock().expect("session slot lock poisoned");
        if slot.take().is_some() {
            log::info!("session invalidated");
        }
    }
}
