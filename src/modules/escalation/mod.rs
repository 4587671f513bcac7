//! Proxy tier escalation policies.
//!
//! The pool tracks failures; these policies decide which tier the next
//! request uses and what a block means. Two behaviors exist in production:
//! a one-way ladder (Instagram) and a pinned hardened tier with session
//! rotation (TikTok).

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::modules::proxy::{ProxyIdentity, ProxyPool, ProxyTier};

/// What the executor should do after reporting a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockedDirective {
    /// Re-select an identity (possibly on a new tier) and re-attempt once.
    RetryNewIdentity,
    /// Discard the cached session, re-acquire, and re-attempt once on a
    /// different identity of the same tier.
    RotateSessionAndRetry,
}

/// Per-platform escalation decisions, consuming failure signals from the
/// executor via the pool's counters.
pub trait EscalationPolicy: Send + Sync {
    /// Tier the next request should use.
    fn tier(&self) -> ProxyTier;

    /// Called after a `Blocked` outcome was reported for `identity`.
    /// May mutate pool state (cooldowns) and the policy's own tier.
    fn on_blocked(&self, pool: &ProxyPool, identity: &ProxyIdentity) -> BlockedDirective;

    /// Whether blocks are answered by rotating the session. Rotation moves
    /// the re-attempt out of the executor: the authed caller rebuilds the
    /// request from a freshly acquired session first.
    fn rotates_session(&self) -> bool {
        false
    }
}

/// One-way ladder: start cheap, escalate to residential after an identity
/// accumulates `threshold` consecutive blocks, and keep the escalated tier.
///
/// De-escalation is deliberately not automatic. The failing cheap identity
/// becomes selectable again once its cooldown elapses, but traffic returns
/// to the cheap tier only through an explicit `reset()`.
pub struct TierLadder {
    threshold: u32,
    cooldown: Duration,
    escalated: AtomicBool,
}

impl TierLadder {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            escalated: AtomicBool::new(false),
        }
    }

    /// Deliberate operational action returning traffic to the cheap tier.
    pub fn reset(&self) {
        self.escalated.store(false, Ordering::Relaxed);
    }

    pub fn is_escalated(&self) -> bool {
        self.escalated.load(Ordering::Relaxed)
    }
}

impl EscalationPolicy for TierLadder {
    fn tier(&self) -> ProxyTier {
        if self.is_escalated() {
            ProxyTier::Residential
        } else {
            ProxyTier::Datacenter
        }
    }

    fn on_blocked(&self, pool: &ProxyPool, identity: &ProxyIdentity) -> BlockedDirective {
        if identity.tier == ProxyTier::Datacenter
            && pool.consecutive_failures(identity) >= self.threshold
        {
            pool.place_on_cooldown(identity, self.cooldown);
            if !self.escalated.swap(true, Ordering::Relaxed) {
                log::warn!(
                    "escalating to residential tier after {} consecutive blocks on identity {}",
                    self.threshold,
                    identity.id
                );
            }
        }
        BlockedDirective::RetryNewIdentity
    }
}

/// Pinned hardened tier: every request uses residential egress; a block
/// rotates the session instead of changing tier.
pub struct PinnedTier;

impl EscalationPolicy for PinnedTier {
    fn tier(&self) -> ProxyTier {
        ProxyTier::Residential
    }

    fn on_blocked(&self, _pool: &ProxyPool, identity: &ProxyIdentity) -> BlockedDirective {
        log::info!(
            "block on residential identity {}, rotating session",
            identity.id
        );
        BlockedDirective::RotateSessionAndRetry
    }

    fn rotates_session(&self) -> bool {
        true
    }
}
