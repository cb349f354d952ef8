//! In-process store adapters for single-instance deployments.
//!
//! Both adapters lean on DashMap's per-shard locking: the nonce
//! compare-and-insert and the bucket debit are single atomic map
//! operations, never a read followed by a write.

use crate::ports::stores::{NonceStore, RateDecision, RateStore, StoreError};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::time::{Duration, Instant};
use tracing::debug;

/// Nonce store backed by a concurrent map.
#[derive(Default)]
pub struct InMemoryNonceStore {
    entries: DashMap<(String, Vec<u8>), u64>,
}

impl InMemoryNonceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl NonceStore for InMemoryNonceStore {
    fn insert_if_absent(
        &self,
        api_key_id: &str,
        nonce: &[u8],
        seen_at: u64,
    ) -> Result<bool, StoreError> {
        // Entry holds the shard lock across the check and the insert, so
        // concurrent submissions of the same nonce admit exactly one.
        match self.entries.entry((api_key_id.to_string(), nonce.to_vec())) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(seen_at);
                Ok(true)
            }
        }
    }

    fn evict_expired(&self, cutoff: u64) {
        let before = self.entries.len();
        self.entries.retain(|_, first_seen| *first_seen > cutoff);
        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            debug!(evicted, cutoff, "Evicted expired nonce records");
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Token bucket for one identity.
struct IdentityBucket {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    /// Last access time (for cleanup)
    last_access: Instant,
}

impl IdentityBucket {
    fn new(quota: Quota) -> Self {
        Self {
            limiter: RateLimiter::direct(quota),
            last_access: Instant::now(),
        }
    }
}

/// Rate store backed by per-identity governor buckets.
pub struct GovernorRateStore {
    buckets: DashMap<String, IdentityBucket>,
    quota: Quota,
}

impl GovernorRateStore {
    /// Create a store enforcing `requests_per_minute` with `burst_size`
    /// headroom per identity.
    pub fn new(requests_per_minute: u32, burst_size: u32) -> Self {
        let per_minute =
            NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::new(60).unwrap());
        let burst = NonZeroU32::new(burst_size).unwrap_or(NonZeroU32::new(10).unwrap());
        Self {
            buckets: DashMap::new(),
            quota: Quota::per_minute(per_minute).allow_burst(burst),
        }
    }
}

impl RateStore for GovernorRateStore {
    fn try_consume(&self, identity: &str) -> Result<RateDecision, StoreError> {
        let mut bucket = self
            .buckets
            .entry(identity.to_string())
            .or_insert_with(|| {
                debug!(identity, "Creating new rate bucket");
                IdentityBucket::new(self.quota)
            });
        bucket.last_access = Instant::now();

        match bucket.limiter.check() {
            Ok(_) => Ok(RateDecision::Allowed),
            Err(not_until) => {
                let retry_after = not_until.wait_time_from(governor::clock::Clock::now(
                    &governor::clock::DefaultClock::default(),
                ));
                Ok(RateDecision::Limited { retry_after })
            }
        }
    }

    fn cleanup(&self, max_age: Duration) {
        let now = Instant::now();
        self.buckets.retain(|identity, bucket| {
            let age = now.duration_since(bucket.last_access);
            if age > max_age {
                debug!(identity, age_secs = age.as_secs(), "Removing stale rate bucket");
                false
            } else {
                true
            }
        });
    }

    fn tracked(&self) -> usize {
        self.buckets.len()
    }
}
