//! Per-platform token bucket gating outbound request rate.
//!
//! Tokens replenish continuously at `refill_per_hour / 3600` per second,
//! capped at capacity. `acquire` never rejects; it only delays. Every
//! outbound call passes through this gate.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

/// Mutable bucket state. Guarded by the limiter's mutex; the lock is held
/// only around refill-and-withdraw, never across a sleep.
#[derive(Debug)]
struct RateBudget {
    capacity: f64,
    refill_per_sec: f64,
    current: f64,
    last_refill: Instant,
}

impl RateBudget {
    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.current = (self.current + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Withdraw one token, or report how long until one is available.
    fn try_withdraw(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        if self.current >= 1.0 {
            self.current -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - self.current;
            Err(Duration::from_secs_f64(deficit / self.refill_per_sec))
        }
    }
}

/// Token-bucket rate limiter. One instance per platform.
#[derive(Debug)]
pub struct RateLimiter {
    budget: Mutex<RateBudget>,
}

impl RateLimiter {
    /// `capacity` tokens, replenished at `refill_per_hour` tokens per hour.
    /// The bucket starts full.
    pub fn new(capacity: f64, refill_per_hour: f64) -> Self {
        let capacity = capacity.max(1.0);
        let refill_per_sec = (refill_per_hour / 3600.0).max(f64::MIN_POSITIVE);
        Self {
            budget: Mutex::new(RateBudget {
                capacity,
                refill_per_sec,
                current: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Block until a request token is available, then withdraw it.
    ///
    /// Classic check-wait-recheck: the wait is computed from a snapshot and
    /// re-verified after waking, so concurrent wakeups cannot overdraw the
    /// bucket. Tokens are debited only on the successful check, which makes
    /// cancellation at the sleep safe — a cancelled waiter leaves the budget
    /// untouched.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut budget = self.budget.lock().await;
                match budget.try_withdraw(Instant::now()) {
                    Ok(()) => return,
                    Err(wait) => wait,
                }
            };
            log::debug!("rate limiter saturated, sleeping {:?}", wait);
            sleep(wait).await;
        }
    }

    /// Tokens currently available (observability only).
    pub async fn available(&self) -> f64 {
        let mut budget = self.budget.lock().await;
        budget.refill(Instant::now());
        budget.current
    }
}
