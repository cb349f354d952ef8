//! # Shared-State Ports
//!
//! The pipeline is stateless per call except for two resources: the nonce
//! store and the rate counters. Both hide behind small traits so a
//! single-process in-memory map and a distributed cache-backed store are
//! interchangeable without touching pipeline logic.
//!
//! Implementations must be thread-safe (`Send + Sync`) and must make the
//! check-then-insert / debit operations atomic with respect to concurrent
//! calls for the same key.

use std::time::Duration;

/// A bounded store lookup that did not answer in time.
///
/// The pipeline treats this as fail-closed rejection, never as a pass.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backing store exceeded its deadline
    #[error("store operation timed out")]
    Timeout,
}

/// Replay-guard nonce store: `(api_key_id, nonce) -> first_seen`.
pub trait NonceStore: Send + Sync {
    /// Atomically record the pair unless it already exists.
    ///
    /// Returns `Ok(true)` if this call inserted the pair (first sighting),
    /// `Ok(false)` if it was already present (replay). Two concurrent calls
    /// with the same pair must never both return `Ok(true)`.
    fn insert_if_absent(
        &self,
        api_key_id: &str,
        nonce: &[u8],
        seen_at: u64,
    ) -> Result<bool, StoreError>;

    /// Drop entries first seen at or before `cutoff`. Never blocks the
    /// verification path.
    fn evict_expired(&self, cutoff: u64);

    /// Number of live entries (diagnostics and tests).
    fn len(&self) -> usize;

    /// True if no entries are recorded.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of a rate debit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateDecision {
    /// Budget available; one unit consumed
    Allowed,
    /// Budget exhausted
    Limited {
        /// Time until the bucket refills enough for one request
        retry_after: Duration,
    },
}

/// Per-identity call budget. One unit is consumed per inbound attempt,
/// whatever later stages decide.
pub trait RateStore: Send + Sync {
    /// Atomically debit one unit for `identity`.
    fn try_consume(&self, identity: &str) -> Result<RateDecision, StoreError>;

    /// Drop buckets idle longer than `max_age`. Never blocks the
    /// verification path.
    fn cleanup(&self, max_age: Duration);

    /// Number of tracked identities (diagnostics and tests).
    fn tracked(&self) -> usize;
}
