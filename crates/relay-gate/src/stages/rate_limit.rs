//! Stage 6: per-identity call budget.
//!
//! The debit itself happens once at pipeline entry, before any stage runs,
//! so a caller failing an earlier layer still consumes budget and cannot
//! probe indefinitely. This stage surfaces that debit's outcome at its
//! ordered position, with a retry-after hint from the bucket's refill
//! schedule.

use crate::domain::envelope::SecureEnvelope;
use crate::domain::error::{RejectReason, StageId};
use crate::ports::stores::{RateDecision, StoreError};
use crate::stages::{StageOutcome, VerifyContext, VerifyStage};
use tracing::warn;

/// Surfaces the entry debit recorded in the context.
#[derive(Default)]
pub struct RateLimitStage;

impl RateLimitStage {
    /// Create the stage.
    pub fn new() -> Self {
        Self
    }
}

impl VerifyStage for RateLimitStage {
    fn id(&self) -> StageId {
        StageId::RateLimit
    }

    fn verify(&self, envelope: &SecureEnvelope, ctx: &mut VerifyContext) -> StageOutcome {
        match &ctx.rate_debit {
            Ok(RateDecision::Allowed) => StageOutcome::Pass,
            Ok(RateDecision::Limited { retry_after }) => {
                let retry_after_ms = retry_after.as_millis() as u64;
                warn!(
                    identity = %envelope.rate_identity(),
                    retry_after_ms,
                    "Rate limit exceeded"
                );
                StageOutcome::Reject(RejectReason::RateLimited { retry_after_ms })
            }
            Err(StoreError::Timeout) => {
                warn!("Rate store timed out; failing closed");
                StageOutcome::Reject(RejectReason::StoreTimeout)
            }
        }
    }
}
