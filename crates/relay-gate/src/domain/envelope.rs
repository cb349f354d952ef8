//! Wire envelope and codec.
//!
//! The envelope carries every evidence layer for one inter-service request.
//! Binary fields travel hex-encoded in a JSON body; `source_ip` comes from
//! the transport, never from the body. Shape validation happens at decode
//! time so no stage ever sees a structurally invalid envelope.

use crate::domain::error::RejectReason;
use relay_crypto::{Iv, IV_LEN, MAC_LEN, TAG_LEN};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Minimum nonce entropy in bytes.
pub const MIN_NONCE_LEN: usize = 16;

/// Canonicalization version tag. Bump only with a coordinated sender change.
pub const CANONICAL_VERSION: &str = "RELAY1";

/// One verified-or-rejected inter-service request.
#[derive(Clone, Debug)]
pub struct SecureEnvelope {
    /// Caller network address (from the transport layer)
    pub source_ip: IpAddr,
    /// Long-lived credential identifier
    pub api_key_id: String,
    /// Long-lived credential secret (opaque)
    pub api_key_secret: String,
    /// Compact signed identity token
    pub jwt: String,
    /// Sender-asserted issuance time, unix seconds
    pub timestamp: u64,
    /// Sender-generated unique token, at least 16 bytes
    pub nonce: Vec<u8>,
    /// HMAC-SHA-256 over the canonical string
    pub signature: [u8; MAC_LEN],
    /// AES-GCM initialization vector
    pub iv: Iv,
    /// Detached GCM auth tag
    pub auth_tag: [u8; TAG_LEN],
    /// Encrypted request body
    pub ciphertext: Vec<u8>,
}

/// Envelope decode/validation failures.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// Body is not valid JSON or is missing fields
    #[error("invalid JSON body: {0}")]
    Json(String),

    /// A hex field did not decode
    #[error("field '{0}' is not valid hex")]
    Hex(&'static str),

    /// A fixed-length field has the wrong length
    #[error("field '{field}' has length {actual}, expected {expected}")]
    Length {
        /// Field name
        field: &'static str,
        /// Expected byte length
        expected: usize,
        /// Actual byte length
        actual: usize,
    },

    /// Nonce shorter than the entropy floor
    #[error("nonce has {0} bytes, minimum is {MIN_NONCE_LEN}")]
    NonceTooShort(usize),

    /// A required string field is empty
    #[error("field '{0}' is empty")]
    Empty(&'static str),
}

impl From<EnvelopeError> for RejectReason {
    fn from(e: EnvelopeError) -> Self {
        RejectReason::MalformedEnvelope(e.to_string())
    }
}

/// JSON wire form. Binary fields are lowercase hex.
#[derive(Serialize, Deserialize)]
struct WireEnvelope {
    api_key_id: String,
    api_key_secret: String,
    jwt: String,
    timestamp: u64,
    nonce: String,
    signature: String,
    iv: String,
    auth_tag: String,
    ciphertext: String,
}

fn decode_hex(field: &'static str, value: &str) -> Result<Vec<u8>, EnvelopeError> {
    hex::decode(value).map_err(|_| EnvelopeError::Hex(field))
}

fn decode_fixed<const N: usize>(
    field: &'static str,
    value: &str,
) -> Result<[u8; N], EnvelopeError> {
    let bytes = decode_hex(field, value)?;
    bytes.as_slice().try_into().map_err(|_| EnvelopeError::Length {
        field,
        expected: N,
        actual: bytes.len(),
    })
}

impl SecureEnvelope {
    /// Parse and shape-validate a JSON body received from the transport.
    ///
    /// # Errors
    ///
    /// Returns `EnvelopeError` for invalid JSON, bad hex, wrong field
    /// lengths, an under-length nonce, or empty credential fields.
    pub fn decode(body: &[u8], source_ip: IpAddr) -> Result<Self, EnvelopeError> {
        let wire: WireEnvelope =
            serde_json::from_slice(body).map_err(|e| EnvelopeError::Json(e.to_string()))?;

        if wire.api_key_id.is_empty() {
            return Err(EnvelopeError::Empty("api_key_id"));
        }
        if wire.api_key_secret.is_empty() {
            return Err(EnvelopeError::Empty("api_key_secret"));
        }
        if wire.jwt.is_empty() {
            return Err(EnvelopeError::Empty("jwt"));
        }

        let nonce = decode_hex("nonce", &wire.nonce)?;
        if nonce.len() < MIN_NONCE_LEN {
            return Err(EnvelopeError::NonceTooShort(nonce.len()));
        }

        let signature: [u8; MAC_LEN] = decode_fixed("signature", &wire.signature)?;
        let auth_tag: [u8; TAG_LEN] = decode_fixed("auth_tag", &wire.auth_tag)?;

        let iv_bytes = decode_hex("iv", &wire.iv)?;
        let iv = Iv::from_bytes(&iv_bytes).map_err(|_| EnvelopeError::Length {
            field: "iv",
            expected: IV_LEN,
            actual: iv_bytes.len(),
        })?;

        let ciphertext = decode_hex("ciphertext", &wire.ciphertext)?;

        Ok(Self {
            source_ip,
            api_key_id: wire.api_key_id,
            api_key_secret: wire.api_key_secret,
            jwt: wire.jwt,
            timestamp: wire.timestamp,
            nonce,
            signature,
            iv,
            auth_tag,
            ciphertext,
        })
    }

    /// Serialize to the JSON wire form (sender side).
    pub fn encode(&self) -> Vec<u8> {
        let wire = WireEnvelope {
            api_key_id: self.api_key_id.clone(),
            api_key_secret: self.api_key_secret.clone(),
            jwt: self.jwt.clone(),
            timestamp: self.timestamp,
            nonce: hex::encode(&self.nonce),
            signature: hex::encode(self.signature),
            iv: hex::encode(self.iv.as_bytes()),
            auth_tag: hex::encode(self.auth_tag),
            ciphertext: hex::encode(&self.ciphertext),
        };
        // WireEnvelope contains only strings and an integer.
        serde_json::to_vec(&wire).unwrap_or_default()
    }

    /// Canonical byte string signed by the sender and recomputed by the
    /// gate. Field order and encoding are fixed; the signature field itself
    /// is excluded.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            CANONICAL_VERSION,
            self.api_key_id,
            self.timestamp,
            hex::encode(&self.nonce),
            hex::encode(self.iv.as_bytes()),
            hex::encode(&self.ciphertext),
        )
        .into_bytes()
    }

    /// Associated data binding the ciphertext to the envelope identity.
    ///
    /// Must be computable before encryption runs, so it excludes the IV
    /// (drawn inside the sealing call) and the ciphertext. GCM already
    /// authenticates the IV.
    pub fn aad_bytes(api_key_id: &str, timestamp: u64, nonce: &[u8]) -> Vec<u8> {
        format!(
            "{}\n{}\n{}\n{}",
            CANONICAL_VERSION,
            api_key_id,
            timestamp,
            hex::encode(nonce),
        )
        .into_bytes()
    }

    /// Identity key for rate limiting: credential id + source address.
    pub fn rate_identity(&self) -> String {
        format!("{}@{}", self.api_key_id, self.source_ip)
    }
}
