//! Stage 7: authenticated payload decryption.
//!
//! AES-256-GCM with associated data binding the ciphertext to the envelope
//! identity. Runs last: it is the most expensive stage and the one whose
//! failure reveals the most to a probing attacker. Fails closed; no partial
//! plaintext ever leaves this stage.

use crate::domain::envelope::SecureEnvelope;
use crate::domain::error::{RejectReason, StageId};
use crate::domain::keys::KeyRing;
use crate::stages::{StageOutcome, VerifyContext, VerifyStage};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, warn};

/// Payload decryption against the key ring.
pub struct DecryptStage {
    keys: Arc<RwLock<KeyRing>>,
}

impl DecryptStage {
    /// Build against the shared key ring.
    pub fn new(keys: Arc<RwLock<KeyRing>>) -> Self {
        Self { keys }
    }
}

impl VerifyStage for DecryptStage {
    fn id(&self) -> StageId {
        StageId::Decrypt
    }

    fn verify(&self, envelope: &SecureEnvelope, ctx: &mut VerifyContext) -> StageOutcome {
        let aad = SecureEnvelope::aad_bytes(
            &envelope.api_key_id,
            envelope.timestamp,
            &envelope.nonce,
        );
        let ring = self.keys.read();

        for key in &ring.encryption_keys {
            if let Ok(plaintext) = relay_crypto::open(
                key,
                &envelope.iv,
                &envelope.ciphertext,
                &envelope.auth_tag,
                &aad,
            ) {
                debug!(bytes = plaintext.len(), "Payload decrypted");
                ctx.payload = Some(plaintext);
                return StageOutcome::Pass;
            }
        }

        warn!(api_key_id = %envelope.api_key_id, "Payload decryption failed");
        StageOutcome::Reject(RejectReason::DecryptionFailed)
    }
}
