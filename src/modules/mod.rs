//! Resilience building blocks, leaves first: each module is a standalone
//! component the orchestrator composes once per platform.

pub mod escalation;
pub mod executor;
pub mod fingerprint;
pub mod pagination;
pub mod proxy;
pub mod rate_limit;
pub mod session;

pub use escalation::{BlockedDirective, EscalationPolicy, PinnedTier, TierLadder};
pub use executor::{HttpTransport, RawResponse, ReqwestTransport, RequestExecutor, ScrapeRequest};
pub use pagination::{Collected, FallbackRoute, Page, PageSource, PaginationEngine, StopReason};
pub use proxy::{PoolHealth, ProxyIdentity, ProxyOutcome, ProxyPool, ProxyTier};
pub use rate_limit::RateLimiter;
pub use session::{Session, SessionAcquirer, SessionStore};
