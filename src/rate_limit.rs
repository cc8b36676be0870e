//! Per-IP request admission: a token-bucket limiter with background eviction.
//!
//! Each distinct client IP gets a bucket refilling at 1 token per second with
//! a burst of 1. A sweep task wakes every minute and evicts visitors idle for
//! more than three minutes, bounding memory for an unbounded set of IPs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

const REFILL_PER_SEC: f64 = 1.0;
const BURST: f64 = 1.0;
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
pub const IDLE_EVICTION: Duration = Duration::from_secs(180);

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(now: Instant) -> Self {
        Self {
            tokens: BURST,
            last_refill: now,
        }
    }

    fn allow(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * REFILL_PER_SEC).min(BURST);
        self.last_refill = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[derive(Debug)]
struct Visitor {
    bucket: TokenBucket,
    last_seen: Instant,
}

/// Owns the visitor map. Shared by request handlers and the sweep task; the
/// mutex guards both the lookup-or-insert and the iterate-and-delete paths.
#[derive(Debug, Default)]
pub struct VisitorRegistry {
    visitors: Mutex<HashMap<String, Visitor>>,
}

impl VisitorRegistry {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Admit or reject a request from `ip`, creating the visitor on first
    /// sight and refreshing its `last_seen`.
    pub fn admit(&self, ip: &str) -> bool {
        self.admit_at(ip, Instant::now())
    }

    fn admit_at(&self, ip: &str, now: Instant) -> bool {
        let mut visitors = self.visitors.lock().unwrap_or_else(|e| e.into_inner());
        let visitor = visitors
            .entry(ip.to_string())
            .or_insert_with(|| Visitor {
                bucket: TokenBucket::new(now),
                last_seen: now,
            });
        visitor.last_seen = now;
        visitor.bucket.allow(now)
    }

    fn evict_idle(&self, now: Instant) {
        let mut visitors = self.visitors.lock().unwrap_or_else(|e| e.into_inner());
        let before = visitors.len();
        visitors.retain(|_, visitor| now.saturating_duration_since(visitor.last_seen) <= IDLE_EVICTION);
        let evicted = before - visitors.len();
        if evicted > 0 {
            debug!(evicted, "Evicted idle visitors");
        }
    }

    /// Spawn the eviction sweep. Runs for the process lifetime; it holds no
    /// resources needing cleanup beyond process termination.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                registry.evict_idle(Instant::now());
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_of_one_per_second() {
        let registry = VisitorRegistry::new();
        let now = Instant::now();
        assert!(registry.admit_at("1.2.3.4", now));
        for _ in 0..4 {
            assert!(!registry.admit_at("1.2.3.4", now));
        }
    }

    #[test]
    fn bucket_refills_after_a_second() {
        let registry = VisitorRegistry::new();
        let now = Instant::now();
        assert!(registry.admit_at("1.2.3.4", now));
        assert!(!registry.admit_at("1.2.3.4", now));
        assert!(registry.admit_at("1.2.3.4", now + Duration::from_secs(1)));
    }

    #[test]
    fn distinct_ips_do_not_share_buckets() {
        let registry = VisitorRegistry::new();
        let now = Instant::now();
        assert!(registry.admit_at("1.2.3.4", now));
        assert!(registry.admit_at("5.6.7.8", now));
    }

    #[test]
    fn idle_visitors_are_evicted_and_reset() {
        let registry = VisitorRegistry::new();
        let now = Instant::now();
        assert!(registry.admit_at("1.2.3.4", now));
        assert!(!registry.admit_at("1.2.3.4", now));

        registry.evict_idle(now + IDLE_EVICTION + Duration::from_secs(1));

        // A fresh visitor entry starts with a full burst again.
        assert!(registry.admit_at("1.2.3.4", now + IDLE_EVICTION + Duration::from_secs(1)));
    }

    #[test]
    fn active_visitors_survive_the_sweep() {
        let registry = VisitorRegistry::new();
        let now = Instant::now();
        assert!(registry.admit_at("1.2.3.4", now));

        registry.evict_idle(now + Duration::from_millis(100));
        // Bucket state is preserved: a fresh entry would admit immediately,
        // a kept one has only refilled a tenth of a token.
        assert!(!registry.admit_at("1.2.3.4", now + Duration::from_millis(100)));
    }
}
