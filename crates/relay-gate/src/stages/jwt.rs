//! Stage 3: short-lived signed identity token.
//!
//! The token algorithm is pinned: the header is decoded first and any
//! declared algorithm other than the configured one is rejected before the
//! signature path runs, which kills algorithm-confusion tokens (including
//! `alg: none` variants). Expiry and not-before are checked with a small
//! leeway; issuer and audience are required claims.

use crate::domain::envelope::SecureEnvelope;
use crate::domain::error::{RejectReason, StageId};
use crate::domain::keys::KeyRing;
use crate::stages::{StageOutcome, VerifyContext, VerifyStage};
use jsonwebtoken::{decode, decode_header, errors::ErrorKind, Algorithm, Validation};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// The one algorithm this gate accepts.
pub const PINNED_ALGORITHM: Algorithm = Algorithm::HS256;

/// Claims carried by an accepted token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Token subject (the calling service identity), if present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
    /// Expiry, unix seconds
    pub exp: u64,
    /// Not-before, unix seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<u64>,
}

/// Token expectations fixed at startup.
pub struct JwtStage {
    keys: Arc<RwLock<KeyRing>>,
    issuer: String,
    audience: String,
    leeway_secs: u64,
}

impl JwtStage {
    /// Build against the shared key ring and configured expectations.
    pub fn new(
        keys: Arc<RwLock<KeyRing>>,
        issuer: String,
        audience: String,
        leeway_secs: u64,
    ) -> Self {
        Self {
            keys,
            issuer,
            audience,
            leeway_secs,
        }
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(PINNED_ALGORITHM);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation.leeway = self.leeway_secs;
        validation.validate_nbf = true;
        validation
    }
}

fn reject_kind(kind: &ErrorKind) -> &'static str {
    match kind {
        ErrorKind::ExpiredSignature => "expired",
        ErrorKind::ImmatureSignature => "not yet valid",
        ErrorKind::InvalidIssuer => "wrong issuer",
        ErrorKind::InvalidAudience => "wrong audience",
        ErrorKind::InvalidSignature => "bad signature",
        ErrorKind::MissingRequiredClaim(_) => "missing required claim",
        _ => "verification failed",
    }
}

impl VerifyStage for JwtStage {
    fn id(&self) -> StageId {
        StageId::Jwt
    }

    fn verify(&self, envelope: &SecureEnvelope, ctx: &mut VerifyContext) -> StageOutcome {
        // Pre-check the declared algorithm before any signature work.
        let header = match decode_header(&envelope.jwt) {
            Ok(h) => h,
            Err(_) => {
                warn!("Token header did not decode");
                return StageOutcome::Reject(RejectReason::InvalidToken(
                    "malformed header".into(),
                ));
            }
        };
        if header.alg != PINNED_ALGORITHM {
            warn!(declared = ?header.alg, "Token declares a non-pinned algorithm");
            return StageOutcome::Reject(RejectReason::InvalidToken(
                "algorithm not allowed".into(),
            ));
        }

        let validation = self.validation();
        let ring = self.keys.read();

        let mut last_kind = ErrorKind::InvalidToken;
        for key in &ring.jwt_keys {
            match decode::<TokenClaims>(&envelope.jwt, key, &validation) {
                Ok(data) => {
                    debug!(sub = ?data.claims.sub, "Identity token accepted");
                    ctx.claims = Some(data.claims);
                    return StageOutcome::Pass;
                }
                Err(e) => last_kind = e.into_kind(),
            }
        }

        warn!(reason = reject_kind(&last_kind), "Identity token rejected");
        StageOutcome::Reject(RejectReason::InvalidToken(reject_kind(&last_kind).into()))
    }
}
