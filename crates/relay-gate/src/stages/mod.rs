//! # Verification Stages
//!
//! Each evidence layer is a stage object implementing [`VerifyStage`]. The
//! pipeline runs them as an explicit ordered list so the order is auditable
//! in one place and each stage stays independently unit-testable.

pub mod api_key;
pub mod decrypt;
pub mod ip_gate;
pub mod jwt;
pub mod rate_limit;
pub mod replay;
pub mod signature;

use crate::domain::envelope::SecureEnvelope;
use crate::domain::error::{RejectReason, StageId};
use crate::ports::stores::{RateDecision, StoreError};
use crate::stages::jwt::TokenClaims;

pub use api_key::ApiKeyStage;
pub use decrypt::DecryptStage;
pub use ip_gate::IpGateStage;
pub use jwt::JwtStage;
pub use rate_limit::RateLimitStage;
pub use replay::ReplayStage;
pub use signature::SignatureStage;

/// Outcome of one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// Evidence layer holds; continue
    Pass,
    /// Evidence layer fails; the pipeline short-circuits
    Reject(RejectReason),
}

/// Per-call scratch state threaded through the stages.
pub struct VerifyContext {
    /// Verification time, unix seconds
    pub now: u64,
    /// Rate debit taken at pipeline entry, surfaced by the rate stage
    pub rate_debit: Result<RateDecision, StoreError>,
    /// Claims extracted by the JWT stage
    pub claims: Option<TokenClaims>,
    /// Plaintext produced by the decrypt stage
    pub payload: Option<Vec<u8>>,
}

impl VerifyContext {
    /// Create a context for one verification call.
    pub fn new(now: u64, rate_debit: Result<RateDecision, StoreError>) -> Self {
        Self {
            now,
            rate_debit,
            claims: None,
            payload: None,
        }
    }
}

/// One evidence layer of the pipeline.
///
/// Implementations must be thread-safe (`Send + Sync`) and side-effect
/// free except for the replay guard's nonce recording.
pub trait VerifyStage: Send + Sync {
    /// Stable identifier for decisions and logs.
    fn id(&self) -> StageId;

    /// Check this stage's evidence layer.
    fn verify(&self, envelope: &SecureEnvelope, ctx: &mut VerifyContext) -> StageOutcome;
}
