//! Platform clients: the upstream-specific request shapes and parsers that
//! sit between the orchestrator and the executor.
//!
//! Each client owns nothing stateful itself; the per-platform component
//! stack (pool, limiter, session store) lives inside the executor handed in
//! at construction, so two platforms never share mutable state.

pub mod instagram;
pub mod tiktok;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ScrapeError;
use crate::modules::executor::{RawResponse, RequestExecutor, ScrapeRequest};
use crate::modules::pagination::PageSource;
use crate::modules::session::{Session, SessionAcquirer};
use crate::types::{ContentItem, Platform, Profile};

/// Result of the base profile fetch. On Instagram the same response carries
/// the first timeline page; other platforms leave those fields empty.
#[derive(Debug, Clone)]
pub struct BaseFetch {
    pub profile: Profile,
    pub initial_items: Vec<ContentItem>,
    pub next_cursor: Option<String>,
    /// Opaque per-subject handle the platform's page sources need
    /// (Instagram numeric user id, TikTok secUid). Absent when the base
    /// response did not yield one, in which case pagination is unavailable.
    pub pagination_handle: Option<String>,
}

/// The secondary content source and the filter used when it falls back to
/// the timeline.
pub struct SecondaryPlan {
    pub source: Box<dyn PageSource>,
    pub fallback_filter: fn(&ContentItem) -> bool,
}

/// Upstream-specific operations the orchestrator drives.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    fn platform(&self) -> Platform;

    /// Single-request profile fetch; `failed` scrapes originate here.
    async fn fetch_base(&self, username: &str) -> Result<BaseFetch, ScrapeError>;

    /// Cursor source for the general content timeline, or `None` when the
    /// base response lacked the handle pagination needs.
    fn timeline_source(&self, base: &BaseFetch) -> Option<Box<dyn PageSource>>;

    /// Sub-type source (e.g. reels) plus its fallback filter; `None` on
    /// platforms without a distinct secondary source.
    fn secondary_plan(&self, base: &BaseFetch) -> Option<SecondaryPlan>;
}

/// Issue an authenticated request, re-acquiring the session and re-attempting
/// exactly once when the session itself was the casualty: auth expiry, or a
/// block under a session-rotating policy. The executor has already
/// invalidated the store by the time either error surfaces here, so the
/// rebuilt request carries freshly acquired cookies.
pub async fn send_authed<F>(
    executor: &RequestExecutor,
    acquirer: &dyn SessionAcquirer,
    build: F,
) -> Result<RawResponse, ScrapeError>
where
    F: Fn(&Session) -> ScrapeRequest,
{
    let session = executor.sessions().get_or_acquire(acquirer).await?;
    match executor.execute(&build(&session)).await {
        Err(ScrapeError::AuthExpired) => {
            log::debug!("session expired mid-request, re-acquiring once");
            let session = executor.sessions().get_or_acquire(acquirer).await?;
            executor.execute(&build(&session)).await
        }
        Err(ScrapeError::Blocked) if executor.rotates_session_on_block() => {
            log::debug!("block rotated the session, re-attempting with fresh material");
            let session = executor.sessions().get_or_acquire(acquirer).await?;
            executor.execute(&build(&session)).await
        }
        other => other,
    }
}

/// Shorthand used by the clients and the orchestrator wiring.
pub type SharedExecutor = Arc<RequestExecutor>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use bytes::Bytes;
    use http::Method;
    use url::Url;

    use crate::modules::escalation::PinnedTier;
    use crate::modules::executor::HttpTransport;
    use crate::modules::proxy::ProxyPool;
    use crate::modules::rate_limit::RateLimiter;
    use crate::modules::session::SessionStore;

    struct TokenAcquirer(AtomicU32);

    #[async_trait]
    impl SessionAcquirer for TokenAcquirer {
        async fn acquire_session(&self) -> Result<Session, ScrapeError> {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Session::new(
                vec![("csrftoken".into(), format!("t{n}"))],
                Some(format!("t{n}")),
                Duration::from_secs(3600),
            ))
        }
    }

    /// Scripted transport recording the cookie header each request carried.
    struct Scripted {
        responses: StdMutex<Vec<RawResponse>>,
        seen_cookies: StdMutex<Vec<Option<String>>>,
    }

    impl Scripted {
        fn new(responses: Vec<RawResponse>) -> Self {
            Self {
                responses: StdMutex::new(responses),
                seen_cookies: StdMutex::new(Vec::new()),
            }
        }

        fn cookies_seen(&self) -> Vec<Option<String>> {
            self.seen_cookies.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpTransport for Scripted {
        async fn send(
            &self,
            request: &ScrapeRequest,
            _proxy: Option<&str>,
            _timeout: Duration,
        ) -> Result<RawResponse, String> {
            let cookie = request
                .headers
                .iter()
                .find(|(name, _)| name == "cookie")
                .map(|(_, value)| value.clone());
            self.seen_cookies.lock().unwrap().push(cookie);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(RawResponse::ok(Bytes::from_static(b"{}")))
            } else {
                Ok(responses.remove(0))
            }
        }
    }

    fn executor(transport: Arc<Scripted>) -> RequestExecutor {
        RequestExecutor::new(
            transport,
            Arc::new(ProxyPool::new(&[], &[])),
            Arc::new(PinnedTier),
            Arc::new(RateLimiter::new(1000.0, 1000.0 * 3600.0)),
            Arc::new(SessionStore::new()),
            3,
            Duration::from_millis(10),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn send_authed_retries_once_with_fresh_session() {
        let transport = Arc::new(Scripted::new(vec![
            RawResponse::status(401),
            RawResponse::ok(Bytes::new()),
        ]));
        let executor = executor(transport);
        let acquirer = TokenAcquirer(AtomicU32::new(0));

        let tokens = StdMutex::new(Vec::new());
        let result = send_authed(&executor, &acquirer, |session| {
            tokens
                .lock()
                .unwrap()
                .push(session.anti_forgery_token.clone());
            ScrapeRequest {
                method: Method::GET,
                url: Url::parse("https://upstream.test/q").unwrap(),
                headers: Vec::new(),
                json_body: None,
            }
        })
        .await;

        assert!(result.is_ok());
        let tokens = tokens.lock().unwrap();
        assert_eq!(
            *tokens,
            vec![Some("t0".to_string()), Some("t1".to_string())]
        );
    }

    #[tokio::test]
    async fn send_authed_surfaces_second_expiry() {
        let transport = Arc::new(Scripted::new(vec![
            RawResponse::status(401),
            RawResponse::status(401),
        ]));
        let executor = executor(transport);
        let acquirer = TokenAcquirer(AtomicU32::new(0));
        let result = send_authed(&executor, &acquirer, |_session| {
            ScrapeRequest::get(Url::parse("https://upstream.test/q").unwrap())
        })
        .await;
        assert!(matches!(result, Err(ScrapeError::AuthExpired)));
    }

    fn cookied_request(session: &Session) -> ScrapeRequest {
        ScrapeRequest::get(Url::parse("https://upstream.test/q").unwrap())
            .with_header("cookie", session.cookie_header())
    }

    #[tokio::test]
    async fn rotated_block_retries_with_fresh_cookies() {
        let transport = Arc::new(Scripted::new(vec![
            RawResponse::status(403),
            RawResponse::ok(Bytes::new()),
        ]));
        let executor = executor(transport.clone());
        let acquirer = TokenAcquirer(AtomicU32::new(0));

        let result = send_authed(&executor, &acquirer, cookied_request).await;
        assert!(result.is_ok());

        // The retry presented the re-acquired session, not the one the
        // block was answering.
        assert_eq!(
            transport.cookies_seen(),
            vec![
                Some("csrftoken=t0".to_string()),
                Some("csrftoken=t1".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn persistent_block_surfaces_after_one_rotation() {
        let transport = Arc::new(Scripted::new(vec![
            RawResponse::status(403),
            RawResponse::status(403),
        ]));
        let executor = executor(transport.clone());
        let acquirer = TokenAcquirer(AtomicU32::new(0));

        let result = send_authed(&executor, &acquirer, cookied_request).await;
        assert!(matches!(result, Err(ScrapeError::Blocked)));
        assert_eq!(transport.cookies_seen().len(), 2);
    }
}
