//! Stage 1: source address allowlist.
//!
//! Default-deny over configured CIDR ranges. Runs first because it is the
//! cheapest check and the safest failure to reveal broadly.

use crate::domain::envelope::SecureEnvelope;
use crate::domain::error::{RejectReason, StageId};
use crate::stages::{StageOutcome, VerifyContext, VerifyStage};
use ipnet::IpNet;
use tracing::warn;

/// Allowlist gate over structured CIDR ranges.
pub struct IpGateStage {
    allowlist: Vec<IpNet>,
}

impl IpGateStage {
    /// Build from parsed ranges. Config validation already rejected an
    /// empty list; an empty list here denies everything (fail closed).
    pub fn new(allowlist: Vec<IpNet>) -> Self {
        Self { allowlist }
    }
}

impl VerifyStage for IpGateStage {
    fn id(&self) -> StageId {
        StageId::IpGate
    }

    fn verify(&self, envelope: &SecureEnvelope, _ctx: &mut VerifyContext) -> StageOutcome {
        if self.allowlist.iter().any(|net| net.contains(&envelope.source_ip)) {
            StageOutcome::Pass
        } else {
            warn!(source_ip = %envelope.source_ip, "Source address not in allowlist");
            StageOutcome::Reject(RejectReason::IpNotAllowed)
        }
    }
}
