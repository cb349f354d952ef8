//! Gate error taxonomy and decision types.
//!
//! Every stage returns a typed `RejectReason` internally; the caller-facing
//! message and HTTP status are deliberately coarser than the internal
//! variant so a probing client learns as little as possible.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies which pipeline stage produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageId {
    /// Source address allowlist check
    IpGate,
    /// Long-lived API credential check
    ApiKey,
    /// Short-lived signed identity token check
    Jwt,
    /// Canonical HMAC signature check
    Signature,
    /// Timestamp freshness + nonce uniqueness
    Replay,
    /// Per-identity call budget
    RateLimit,
    /// Authenticated payload decryption
    Decrypt,
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageId::IpGate => "ip_gate",
            StageId::ApiKey => "api_key",
            StageId::Jwt => "jwt",
            StageId::Signature => "signature",
            StageId::Replay => "replay",
            StageId::RateLimit => "rate_limit",
            StageId::Decrypt => "decrypt",
        };
        f.write_str(name)
    }
}

/// Why the gate rejected a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    /// Source address is not inside any allowlisted range
    #[error("source address not in allowlist")]
    IpNotAllowed,

    /// Unknown key id or wrong secret; the two are indistinguishable
    #[error("invalid credential")]
    InvalidCredential,

    /// Token expired, bad signature, wrong algorithm, or missing claims
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// Presented HMAC does not match the recomputed canonical signature
    #[error("signature mismatch")]
    SignatureMismatch,

    /// Timestamp outside `[now - window, now + max_skew]`
    #[error("timestamp outside acceptance window")]
    StaleOrFutureTimestamp,

    /// The `(api_key_id, nonce)` pair was already seen inside the window
    #[error("nonce already seen")]
    ReplayedNonce,

    /// Per-identity call budget exhausted
    #[error("rate limit exceeded")]
    RateLimited {
        /// How long until the bucket refills enough for one request
        retry_after_ms: u64,
    },

    /// Auth tag mismatch, wrong key, or mismatched associated data
    #[error("decryption failed")]
    DecryptionFailed,

    /// Envelope failed shape validation before any stage ran
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// A backing store did not answer in time; fail closed
    #[error("backing store timed out")]
    StoreTimeout,
}

impl RejectReason {
    /// HTTP status for the caller-facing response.
    pub fn http_status(&self) -> u16 {
        match self {
            RejectReason::IpNotAllowed => 403,
            RejectReason::InvalidCredential
            | RejectReason::InvalidToken(_)
            | RejectReason::SignatureMismatch
            | RejectReason::StaleOrFutureTimestamp
            | RejectReason::DecryptionFailed => 401,
            RejectReason::ReplayedNonce => 409,
            RejectReason::RateLimited { .. } => 429,
            RejectReason::MalformedEnvelope(_) => 400,
            RejectReason::StoreTimeout => 503,
        }
    }

    /// Coarse message safe to return to the caller.
    ///
    /// Rate-limit and auth failures stay distinguishable for legitimate
    /// client debugging; everything secret-adjacent collapses to
    /// "verification failed".
    pub fn public_message(&self) -> &'static str {
        match self {
            RejectReason::IpNotAllowed => "forbidden",
            RejectReason::InvalidCredential
            | RejectReason::InvalidToken(_)
            | RejectReason::SignatureMismatch
            | RejectReason::StaleOrFutureTimestamp
            | RejectReason::DecryptionFailed => "verification failed",
            RejectReason::ReplayedNonce => "duplicate request",
            RejectReason::RateLimited { .. } => "rate limit exceeded",
            RejectReason::MalformedEnvelope(_) => "malformed envelope",
            RejectReason::StoreTimeout => "temporarily unavailable",
        }
    }
}

/// Final pipeline decision. Never partially accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationResult {
    /// Every stage passed; `payload` is the decrypted request body
    Accepted {
        /// Decrypted plaintext payload
        payload: Vec<u8>,
    },
    /// The first failing stage and its typed reason
    Rejected {
        /// Stage that short-circuited the pipeline
        stage: StageId,
        /// Typed rejection reason (internal granularity)
        reason: RejectReason,
    },
}

impl VerificationResult {
    /// True if the request was accepted.
    pub fn is_accepted(&self) -> bool {
        matches!(self, VerificationResult::Accepted { .. })
    }
}
