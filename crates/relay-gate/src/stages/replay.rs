//! Stage 5: replay guard.
//!
//! Two checks, both required: the timestamp must fall inside
//! `[now - window, now + max_skew]`, and the `(api_key_id, nonce)` pair
//! must be unseen. Recording the pair happens inside the store's atomic
//! compare-and-insert, so concurrent submissions of the same nonce admit
//! at most one. A store timeout rejects fail-closed.

use crate::domain::envelope::SecureEnvelope;
use crate::domain::error::{RejectReason, StageId};
use crate::ports::stores::{NonceStore, StoreError};
use crate::stages::{StageOutcome, VerifyContext, VerifyStage};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Freshness window + nonce uniqueness.
pub struct ReplayStage {
    store: Arc<dyn NonceStore>,
    window_secs: u64,
    max_skew_secs: u64,
}

impl ReplayStage {
    /// Build against a nonce store and configured windows.
    pub fn new(store: Arc<dyn NonceStore>, window: Duration, max_skew: Duration) -> Self {
        Self {
            store,
            window_secs: window.as_secs(),
            max_skew_secs: max_skew.as_secs(),
        }
    }
}

impl VerifyStage for ReplayStage {
    fn id(&self) -> StageId {
        StageId::Replay
    }

    fn verify(&self, envelope: &SecureEnvelope, ctx: &mut VerifyContext) -> StageOutcome {
        let oldest = ctx.now.saturating_sub(self.window_secs);
        let newest = ctx.now.saturating_add(self.max_skew_secs);
        if envelope.timestamp < oldest || envelope.timestamp > newest {
            warn!(
                timestamp = envelope.timestamp,
                now = ctx.now,
                "Timestamp outside acceptance window"
            );
            return StageOutcome::Reject(RejectReason::StaleOrFutureTimestamp);
        }

        match self
            .store
            .insert_if_absent(&envelope.api_key_id, &envelope.nonce, ctx.now)
        {
            Ok(true) => StageOutcome::Pass,
            Ok(false) => {
                warn!(api_key_id = %envelope.api_key_id, "Nonce already seen; replay rejected");
                StageOutcome::Reject(RejectReason::ReplayedNonce)
            }
            Err(StoreError::Timeout) => {
                warn!("Nonce store timed out; failing closed");
                StageOutcome::Reject(RejectReason::StoreTimeout)
            }
        }
    }
}
