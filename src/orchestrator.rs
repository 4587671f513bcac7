//! Per-platform scrape orchestration.
//!
//! One orchestrator per platform composes a full, independent component
//! stack: proxy pool, escalation policy, rate limiter, session store,
//! executor, platform client, pagination engine. Nothing here is shared
//! across platforms, so a blocking event on one can never perturb the
//! other's proxy, session, or rate state.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{timeout, Instant};

use crate::config::{PlatformConfig, ScraperConfig};
use crate::error::ScrapeError;
use crate::modules::escalation::{EscalationPolicy, PinnedTier, TierLadder};
use crate::modules::executor::{HttpTransport, ReqwestTransport, RequestExecutor};
use crate::modules::fingerprint::{random_desktop_profile, random_mobile_profile};
use crate::modules::pagination::{FallbackRoute, PaginationEngine, StopReason};
use crate::modules::proxy::{PoolHealth, ProxyPool};
use crate::modules::rate_limit::RateLimiter;
use crate::modules::session::SessionStore;
use crate::platforms::instagram::InstagramClient;
use crate::platforms::tiktok::TikTokClient;
use crate::platforms::PlatformClient;
use crate::types::{ContentItem, ProfileScrape, ScrapeOptions, ScrapeStatus};

/// Slack past the scrape budget before the whole call is cut off. The
/// pagination deadline lands first in normal operation; this guard only
/// catches a base fetch stuck deep in retries.
const BUDGET_GRACE: Duration = Duration::from_secs(10);

pub struct ScrapeOrchestrator {
    client: Arc<dyn PlatformClient>,
    engine: PaginationEngine,
    pool: Arc<ProxyPool>,
    budget: Duration,
}

impl ScrapeOrchestrator {
    pub fn new(
        client: Arc<dyn PlatformClient>,
        pool: Arc<ProxyPool>,
        config: &PlatformConfig,
    ) -> Self {
        Self {
            client,
            engine: PaginationEngine::new(
                config.page_size as usize,
                config.page_delay_min,
                config.page_delay_max,
            ),
            pool,
            budget: config.scrape_budget,
        }
    }

    /// Scrape one profile end to end. Never panics and never returns a raw
    /// transport error; every failure mode lands in the result's `status`
    /// and `error` fields.
    pub async fn scrape_profile(&self, username: &str, options: ScrapeOptions) -> ProfileScrape {
        let platform = self.client.platform();
        log::info!(
            "scraping {} profile {username} (max {} items)",
            platform.as_str(),
            options.max_items
        );
        match timeout(self.budget + BUDGET_GRACE, self.run(username, options)).await {
            Ok(result) => result,
            Err(_) => {
                log::warn!("{} scrape of {username} exceeded its budget", platform.as_str());
                ProfileScrape::failed(platform, username, &ScrapeError::Timeout)
            }
        }
    }

    async fn run(&self, username: &str, options: ScrapeOptions) -> ProfileScrape {
        let platform = self.client.platform();
        let deadline = Instant::now() + self.budget;

        let base = match self.client.fetch_base(username).await {
            Ok(base) => base,
            Err(error) => {
                log::warn!(
                    "{} base fetch for {username} failed: {error}",
                    platform.as_str()
                );
                return ProfileScrape::failed(platform, username, &error);
            }
        };

        let mut status = ScrapeStatus::Success;
        let mut error: Option<String> = None;

        let mut items: Vec<ContentItem> = base
            .initial_items
            .iter()
            .take(options.max_items)
            .cloned()
            .collect();

        // A base page that carried items but no cursor is already exhausted;
        // starting pagination without a cursor would re-fetch from the top.
        let base_exhausted = !base.initial_items.is_empty() && base.next_cursor.is_none();
        if options.max_items > items.len() && !base_exhausted {
            if let Some(source) = self.client.timeline_source(&base) {
                // Seeding with the base page means a re-served record
                // cannot eat into the remaining target.
                let collected = self
                    .engine
                    .collect(
                        source.as_ref(),
                        None,
                        options.max_items - items.len(),
                        base.next_cursor.clone(),
                        &items,
                        deadline,
                    )
                    .await;
                items.extend(collected.items);
                match assess(collected.reason, "timeline") {
                    Ok(None) => {}
                    Ok(Some(degraded)) => {
                        status = ScrapeStatus::Partial;
                        error.get_or_insert(degraded.classification().to_string());
                    }
                    Err(fatal) => return ProfileScrape::failed(platform, username, &fatal),
                }
            }
        }

        let mut secondary_items = Vec::new();
        if options.max_items > 0 && options.include_secondary {
            if let Some(plan) = self.client.secondary_plan(&base) {
                let fallback_source = self.client.timeline_source(&base);
                let fallback = fallback_source.as_deref().map(|source| FallbackRoute {
                    source,
                    filter: plan.fallback_filter,
                });
                let collected = self
                    .engine
                    .collect(plan.source.as_ref(), fallback, options.max_items, None, &[], deadline)
                    .await;
                secondary_items = collected.items;
                match assess(collected.reason, "secondary") {
                    Ok(None) => {}
                    Ok(Some(degraded)) => {
                        status = ScrapeStatus::Partial;
                        error.get_or_insert(degraded.classification().to_string());
                    }
                    Err(fatal) => return ProfileScrape::failed(platform, username, &fatal),
                }
            }
        }

        // A record collected by both sources belongs to the specialized one.
        if !secondary_items.is_empty() {
            let secondary_ids: HashSet<&str> =
                secondary_items.iter().map(|item| item.id.as_str()).collect();
            items.retain(|item| !secondary_ids.contains(item.id.as_str()));
        }

        log::info!(
            "{} scrape of {username} finished: {:?}, {} items, {} secondary",
            platform.as_str(),
            status,
            items.len(),
            secondary_items.len()
        );

        ProfileScrape {
            platform,
            username: username.to_string(),
            status,
            profile: Some(base.profile),
            items,
            secondary_items,
            error,
            scraped_at: Utc::now(),
        }
    }

    pub fn pool_health(&self) -> PoolHealth {
        self.pool.health()
    }
}

/// Map a collection stop onto the call's status: clean terminations keep
/// `success`, degradations downgrade to `partial`, and an exhausted proxy
/// configuration fails the whole call.
fn assess(reason: StopReason, stage: &str) -> Result<Option<ScrapeError>, ScrapeError> {
    match reason {
        StopReason::TargetReached | StopReason::Exhausted => Ok(None),
        StopReason::DeadlineExceeded => Ok(Some(ScrapeError::Timeout)),
        StopReason::Drifted => Ok(Some(ScrapeError::Parse(format!("{stage} source drifted")))),
        StopReason::Errored(ScrapeError::NoProxyAvailable) => Err(ScrapeError::NoProxyAvailable),
        StopReason::Errored(error) => {
            log::warn!("{stage} collection stopped early: {error}");
            Ok(Some(error))
        }
    }
}

/// Build the Instagram stack: tier-ladder escalation starting on the cheap
/// tier, desktop fingerprint.
pub fn build_instagram(config: &ScraperConfig) -> ScrapeOrchestrator {
    let platform = &config.instagram;
    let policy: Arc<dyn EscalationPolicy> = Arc::new(TierLadder::new(
        platform.escalation_threshold,
        platform.identity_cooldown,
    ));
    let transport = Arc::new(ReqwestTransport::new(random_desktop_profile()));
    let (executor, pool) = build_executor(transport, policy, platform);
    let client = Arc::new(InstagramClient::new(
        executor,
        config.instagram_queries.clone(),
        platform.session_ttl,
    ));
    ScrapeOrchestrator::new(client, pool, platform)
}

/// Build the TikTok stack: pinned residential tier, mobile-web fingerprint,
/// session rotation on blocks.
pub fn build_tiktok(config: &ScraperConfig) -> ScrapeOrchestrator {
    let platform = &config.tiktok;
    let policy: Arc<dyn EscalationPolicy> = Arc::new(PinnedTier);
    let transport = Arc::new(ReqwestTransport::new(random_mobile_profile()));
    let (executor, pool) = build_executor(transport, policy, platform);
    let client = Arc::new(TikTokClient::new(executor, platform.session_ttl));
    ScrapeOrchestrator::new(client, pool, platform)
}

fn build_executor(
    transport: Arc<dyn HttpTransport>,
    policy: Arc<dyn EscalationPolicy>,
    config: &PlatformConfig,
) -> (Arc<RequestExecutor>, Arc<ProxyPool>) {
    let pool = Arc::new(ProxyPool::new(
        &config.datacenter_proxies,
        &config.residential_proxies,
    ));
    let executor = Arc::new(RequestExecutor::new(
        transport,
        pool.clone(),
        policy,
        Arc::new(RateLimiter::new(config.rate_capacity, config.refill_per_hour)),
        Arc::new(SessionStore::new()),
        config.max_retries,
        config.backoff_base,
        config.request_timeout,
    ));
    (executor, pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use crate::modules::pagination::{Page, PageSource};
    use crate::platforms::{BaseFetch, SecondaryPlan};
    use crate::types::{Platform, Profile};

    fn item(id: &str, is_video: bool) -> ContentItem {
        ContentItem {
            id: id.to_string(),
            url: None,
            caption: String::new(),
            is_video,
            like_count: 0,
            comment_count: 0,
            view_count: None,
            display_url: None,
            taken_at: None,
        }
    }

    type PageScript = Arc<StdMutex<Vec<Result<Page, ScrapeError>>>>;

    struct ScriptedSource {
        pages: PageScript,
        fetches: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PageSource for ScriptedSource {
        async fn fetch_page(
            &self,
            _cursor: Option<&str>,
            _page_size: usize,
        ) -> Result<Page, ScrapeError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let mut pages = self.pages.lock().unwrap();
            if pages.is_empty() {
                Ok(Page::default())
            } else {
                pages.remove(0)
            }
        }

        fn label(&self) -> &'static str {
            "scripted"
        }
    }

    struct StubClient {
        base: Result<BaseFetch, ScrapeError>,
        timeline: PageScript,
        secondary: Option<PageScript>,
        timeline_fetches: Arc<AtomicUsize>,
    }

    impl StubClient {
        fn new(base: Result<BaseFetch, ScrapeError>) -> Self {
            Self {
                base,
                timeline: Arc::new(StdMutex::new(Vec::new())),
                secondary: None,
                timeline_fetches: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn with_timeline(mut self, pages: Vec<Result<Page, ScrapeError>>) -> Self {
            self.timeline = Arc::new(StdMutex::new(pages));
            self
        }

        fn with_secondary(mut self, pages: Vec<Result<Page, ScrapeError>>) -> Self {
            self.secondary = Some(Arc::new(StdMutex::new(pages)));
            self
        }
    }

    #[async_trait]
    impl PlatformClient for StubClient {
        fn platform(&self) -> Platform {
            Platform::Instagram
        }

        async fn fetch_base(&self, _username: &str) -> Result<BaseFetch, ScrapeError> {
            match &self.base {
                Ok(base) => Ok(base.clone()),
                Err(_) => Err(ScrapeError::NoProxyAvailable),
            }
        }

        fn timeline_source(&self, _base: &BaseFetch) -> Option<Box<dyn PageSource>> {
            Some(Box::new(ScriptedSource {
                pages: self.timeline.clone(),
                fetches: self.timeline_fetches.clone(),
            }))
        }

        fn secondary_plan(&self, _base: &BaseFetch) -> Option<SecondaryPlan> {
            self.secondary.as_ref().map(|pages| SecondaryPlan {
                source: Box::new(ScriptedSource {
                    pages: pages.clone(),
                    fetches: Arc::new(AtomicUsize::new(0)),
                }) as Box<dyn PageSource>,
                fallback_filter: |item| item.is_video,
            })
        }
    }

    fn base_with(initial: Vec<ContentItem>, cursor: Option<&str>) -> BaseFetch {
        BaseFetch {
            profile: Profile {
                username: "atlas".into(),
                user_id: Some("1".into()),
                ..Default::default()
            },
            initial_items: initial,
            next_cursor: cursor.map(str::to_string),
            pagination_handle: Some("1".into()),
        }
    }

    fn orchestrator(client: StubClient) -> ScrapeOrchestrator {
        ScrapeOrchestrator::new(
            Arc::new(client),
            Arc::new(ProxyPool::new(&[], &[])),
            &PlatformConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn zero_max_items_skips_all_pagination() {
        let client = StubClient::new(Ok(base_with(vec![item("a", false)], Some("c"))));
        let fetches = client.timeline_fetches.clone();
        let result = orchestrator(client)
            .scrape_profile(
                "atlas",
                ScrapeOptions {
                    max_items: 0,
                    include_secondary: true,
                },
            )
            .await;

        assert_eq!(result.status, ScrapeStatus::Success);
        assert!(result.items.is_empty());
        assert!(result.profile.is_some());
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_base_fetch_fails_the_call() {
        let client = StubClient::new(Err(ScrapeError::NoProxyAvailable));
        let result = orchestrator(client)
            .scrape_profile("atlas", ScrapeOptions::default())
            .await;
        assert_eq!(result.status, ScrapeStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("no_proxy_available"));
        assert!(result.profile.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn natural_exhaustion_is_success() {
        // Subject has exactly 12 items; 50 requested.
        let initial: Vec<ContentItem> =
            (0..12).map(|n| item(&format!("m{n}"), false)).collect();
        let client = StubClient::new(Ok(base_with(initial, Some("c1")))).with_timeline(vec![Ok(
            Page {
                items: Vec::new(),
                next_cursor: None,
            },
        )]);
        let result = orchestrator(client)
            .scrape_profile(
                "atlas",
                ScrapeOptions {
                    max_items: 50,
                    include_secondary: false,
                },
            )
            .await;

        assert_eq!(result.status, ScrapeStatus::Success);
        assert_eq!(result.items.len(), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn reserved_base_items_do_not_shrink_the_collection() {
        // The first timeline page re-serves two records from the base page;
        // enough fresh records exist to still reach the requested count.
        let initial: Vec<ContentItem> =
            (0..5).map(|n| item(&format!("m{n}"), false)).collect();
        let client = StubClient::new(Ok(base_with(initial, Some("c1")))).with_timeline(vec![Ok(
            Page {
                items: vec![
                    item("m3", false),
                    item("m4", false),
                    item("n1", false),
                    item("n2", false),
                    item("n3", false),
                ],
                next_cursor: None,
            },
        )]);
        let result = orchestrator(client)
            .scrape_profile(
                "atlas",
                ScrapeOptions {
                    max_items: 8,
                    include_secondary: false,
                },
            )
            .await;

        assert_eq!(result.status, ScrapeStatus::Success);
        assert_eq!(result.items.len(), 8);
        let ids: Vec<&str> = result.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["m0", "m1", "m2", "m3", "m4", "n1", "n2", "n3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn base_page_satisfying_target_skips_pagination() {
        let initial: Vec<ContentItem> =
            (0..12).map(|n| item(&format!("m{n}"), false)).collect();
        let client = StubClient::new(Ok(base_with(initial, Some("c1"))));
        let fetches = client.timeline_fetches.clone();
        let result = orchestrator(client)
            .scrape_profile(
                "atlas",
                ScrapeOptions {
                    max_items: 10,
                    include_secondary: false,
                },
            )
            .await;

        assert_eq!(result.status, ScrapeStatus::Success);
        assert_eq!(result.items.len(), 10);
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_pool_mid_pagination_fails_the_call() {
        let client = StubClient::new(Ok(base_with(vec![item("a", false)], Some("c1"))))
            .with_timeline(vec![Err(ScrapeError::NoProxyAvailable)]);
        let result = orchestrator(client)
            .scrape_profile(
                "atlas",
                ScrapeOptions {
                    max_items: 50,
                    include_secondary: false,
                },
            )
            .await;
        assert_eq!(result.status, ScrapeStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("no_proxy_available"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeline_drift_degrades_to_partial() {
        let parse = || Err(ScrapeError::Parse("drift".to_string()));
        let client = StubClient::new(Ok(base_with(vec![item("a", false)], Some("c1"))))
            .with_timeline(vec![parse(), parse(), parse()]);
        let result = orchestrator(client)
            .scrape_profile(
                "atlas",
                ScrapeOptions {
                    max_items: 50,
                    include_secondary: false,
                },
            )
            .await;
        assert_eq!(result.status, ScrapeStatus::Partial);
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.error.as_deref(), Some("parse_error"));
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_records_stay_with_the_secondary_source() {
        let client = StubClient::new(Ok(base_with(
            vec![item("post1", false), item("reel1", true)],
            None,
        )))
        .with_secondary(vec![Ok(Page {
            items: vec![item("reel1", true), item("reel2", true)],
            next_cursor: None,
        })]);
        let result = orchestrator(client)
            .scrape_profile(
                "atlas",
                ScrapeOptions {
                    max_items: 10,
                    include_secondary: true,
                },
            )
            .await;

        assert_eq!(result.status, ScrapeStatus::Success);
        let item_ids: Vec<&str> = result.items.iter().map(|i| i.id.as_str()).collect();
        let secondary_ids: Vec<&str> =
            result.secondary_items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(item_ids, vec!["post1"]);
        assert_eq!(secondary_ids, vec!["reel1", "reel2"]);
    }
}
