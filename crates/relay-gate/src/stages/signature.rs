//! Stage 4: canonical HMAC signature.
//!
//! Recomputes HMAC-SHA-256 over the envelope's canonical byte string and
//! compares constant-time. Every rotation key is tried; any mismatch is a
//! hard rejection with no partial trust.

use crate::domain::envelope::SecureEnvelope;
use crate::domain::error::{RejectReason, StageId};
use crate::domain::keys::KeyRing;
use crate::stages::{StageOutcome, VerifyContext, VerifyStage};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::warn;

/// Canonical signature check against the key ring.
pub struct SignatureStage {
    keys: Arc<RwLock<KeyRing>>,
}

impl SignatureStage {
    /// Build against the shared key ring.
    pub fn new(keys: Arc<RwLock<KeyRing>>) -> Self {
        Self { keys }
    }
}

impl VerifyStage for SignatureStage {
    fn id(&self) -> StageId {
        StageId::Signature
    }

    fn verify(&self, envelope: &SecureEnvelope, _ctx: &mut VerifyContext) -> StageOutcome {
        let canonical = envelope.canonical_bytes();
        let ring = self.keys.read();

        let matched = ring
            .signing_keys
            .iter()
            .any(|key| relay_crypto::verify(key, &canonical, &envelope.signature).is_ok());

        if matched {
            StageOutcome::Pass
        } else {
            warn!(api_key_id = %envelope.api_key_id, "Canonical signature mismatch");
            StageOutcome::Reject(RejectReason::SignatureMismatch)
        }
    }
}
