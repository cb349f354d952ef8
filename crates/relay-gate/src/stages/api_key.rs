//! Stage 2: long-lived API credential.
//!
//! Unknown key id and wrong secret produce the identical rejection so a
//! probing caller cannot enumerate key ids. Secret comparison is
//! constant-time with no early exit across rotation candidates.

use crate::domain::envelope::SecureEnvelope;
use crate::domain::error::{RejectReason, StageId};
use crate::domain::keys::KeyRing;
use crate::stages::{StageOutcome, VerifyContext, VerifyStage};
use parking_lot::RwLock;
use relay_crypto::ct_eq;
use std::sync::Arc;
use tracing::{debug, warn};

/// Fixed dummy compared against when the key id is unknown, so the
/// unknown-id path does comparable work to the wrong-secret path.
const DUMMY_SECRET: &[u8] = b"relay-gate-dummy-credential-pad";

/// Credential table check against the key ring.
pub struct ApiKeyStage {
    keys: Arc<RwLock<KeyRing>>,
}

impl ApiKeyStage {
    /// Build against the shared key ring.
    pub fn new(keys: Arc<RwLock<KeyRing>>) -> Self {
        Self { keys }
    }
}

impl VerifyStage for ApiKeyStage {
    fn id(&self) -> StageId {
        StageId::ApiKey
    }

    fn verify(&self, envelope: &SecureEnvelope, _ctx: &mut VerifyContext) -> StageOutcome {
        let ring = self.keys.read();
        let presented = envelope.api_key_secret.as_bytes();

        match ring.api_secrets.get(&envelope.api_key_id) {
            Some(secrets) => {
                // No early exit: every rotation candidate is compared.
                let mut matched = false;
                for secret in secrets {
                    matched |= ct_eq(secret, presented);
                }
                if matched {
                    debug!(api_key_id = %envelope.api_key_id, "API credential accepted");
                    StageOutcome::Pass
                } else {
                    warn!(api_key_id = %envelope.api_key_id, "API secret mismatch");
                    StageOutcome::Reject(RejectReason::InvalidCredential)
                }
            }
            None => {
                let _ = ct_eq(DUMMY_SECRET, presented);
                warn!("Unknown API key id presented");
                StageOutcome::Reject(RejectReason::InvalidCredential)
            }
        }
    }
}
