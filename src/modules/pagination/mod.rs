//! Cursor-driven multi-page collection with human-like pacing and a
//! structural fallback path.
//!
//! Pages come from a [`PageSource`]; the engine owns pacing, termination,
//! and the switch to a sibling source when the primary one drifts
//! structurally. Upstream format drift never becomes a hard failure here,
//! only a shorter collection.

use std::collections::HashSet;

use async_trait::async_trait;
use rand::Rng;
use tokio::time::{sleep, Duration, Instant};

use crate::error::ScrapeError;
use crate::types::ContentItem;

/// One page of a cursor-based connection.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<ContentItem>,
    /// Opaque server-issued cursor; absent means the connection is
    /// exhausted.
    pub next_cursor: Option<String>,
}

/// A cursor-paginated upstream data source. Implementations route fetches
/// through the request executor.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(
        &self,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<Page, ScrapeError>;

    /// Short name for logs.
    fn label(&self) -> &'static str;
}

/// Sibling source consulted after the primary drifts, with a client-side
/// filter selecting the records the primary would have returned.
pub struct FallbackRoute<'a> {
    pub source: &'a dyn PageSource,
    pub filter: fn(&ContentItem) -> bool,
}

/// Why a collection stopped.
#[derive(Debug)]
pub enum StopReason {
    TargetReached,
    /// Cursor exhausted naturally; not a failure.
    Exhausted,
    /// Structural drift terminated the source (and its fallback, if any).
    Drifted,
    DeadlineExceeded,
    /// A non-parse error survived executor recovery.
    Errored(ScrapeError),
}

#[derive(Debug)]
pub struct Collected {
    pub items: Vec<ContentItem>,
    pub reason: StopReason,
}

/// Consecutive parse failures on one source before it is declared drifted.
const DRIFT_THRESHOLD: u32 = 3;

/// Consecutive cursor-bearing empty pages tolerated before treating the
/// connection as exhausted (guards against upstream cursor loops).
const EMPTY_PAGE_LIMIT: u32 = 2;

pub struct PaginationEngine {
    page_size: usize,
    delay_min: Duration,
    delay_max: Duration,
}

impl PaginationEngine {
    pub fn new(page_size: usize, delay_min: Duration, delay_max: Duration) -> Self {
        Self {
            page_size: page_size.max(1),
            delay_min,
            delay_max: delay_max.max(delay_min),
        }
    }

    /// Collect up to `target` items starting at `initial_cursor`, stopping
    /// at `deadline`. Ids in `seed_items` are treated as already collected:
    /// pages repeating them yield no progress, so a re-served record never
    /// consumes target budget. The same set guards the fallback switch
    /// against double-counting.
    pub async fn collect(
        &self,
        source: &dyn PageSource,
        fallback: Option<FallbackRoute<'_>>,
        target: usize,
        initial_cursor: Option<String>,
        seed_items: &[ContentItem],
        deadline: Instant,
    ) -> Collected {
        let mut items: Vec<ContentItem> = Vec::new();
        let mut seen: HashSet<String> =
            seed_items.iter().map(|item| item.id.clone()).collect();
        if target == 0 {
            return Collected {
                items,
                reason: StopReason::TargetReached,
            };
        }

        let mut active: &dyn PageSource = source;
        let mut filter: Option<fn(&ContentItem) -> bool> = None;
        let mut fallback = fallback;

        let mut cursor = initial_cursor;
        let mut parse_failures = 0u32;
        let mut empty_pages = 0u32;
        let mut first_fetch = true;

        loop {
            if !first_fetch {
                self.pace().await;
            }
            first_fetch = false;

            if Instant::now() >= deadline {
                log::warn!("collection deadline reached on {}", active.label());
                return Collected {
                    items,
                    reason: StopReason::DeadlineExceeded,
                };
            }

            let page = match active.fetch_page(cursor.as_deref(), self.page_size).await {
                Ok(page) => page,
                Err(ScrapeError::Parse(detail)) => {
                    parse_failures += 1;
                    log::warn!(
                        "parse failure {}/{} on {}: {}",
                        parse_failures,
                        DRIFT_THRESHOLD,
                        active.label(),
                        detail
                    );
                    if parse_failures < DRIFT_THRESHOLD {
                        continue;
                    }
                    match fallback.take() {
                        Some(route) => {
                            log::warn!(
                                "{} drifted, switching to {} with client-side filter",
                                active.label(),
                                route.source.label()
                            );
                            active = route.source;
                            filter = Some(route.filter);
                            cursor = None;
                            parse_failures = 0;
                            empty_pages = 0;
                            continue;
                        }
                        None => {
                            return Collected {
                                items,
                                reason: StopReason::Drifted,
                            };
                        }
                    }
                }
                Err(error) => {
                    return Collected {
                        items,
                        reason: StopReason::Errored(error),
                    };
                }
            };
            parse_failures = 0;

            if page.items.is_empty() {
                empty_pages += 1;
            } else {
                empty_pages = 0;
            }

            for item in page.items {
                if let Some(filter) = filter {
                    if !filter(&item) {
                        continue;
                    }
                }
                if !seen.insert(item.id.clone()) {
                    continue;
                }
                items.push(item);
                if items.len() >= target {
                    return Collected {
                        items,
                        reason: StopReason::TargetReached,
                    };
                }
            }

            match page.next_cursor {
                Some(next) if empty_pages < EMPTY_PAGE_LIMIT => cursor = Some(next),
                _ => {
                    return Collected {
                        items,
                        reason: StopReason::Exhausted,
                    };
                }
            }
        }
    }

    /// Randomized inter-page delay within the configured window.
    async fn pace(&self) {
        let window = self.delay_max.saturating_sub(self.delay_min);
        let delay = if window.is_zero() {
            self.delay_min
        } else {
            self.delay_min + window.mul_f64(rand::thread_rng().gen_range(0.0..=1.0))
        };
        sleep(delay).await;
    }
}
