//! Sender-side envelope construction.
//!
//! Mirrors the gate exactly: same associated data, same canonical string,
//! same field encoding. Used by the initiator service and by the
//! integration tests; a builder that drifts from the gate is a build
//! failure waiting in the test suite.

use crate::domain::envelope::{SecureEnvelope, MIN_NONCE_LEN};
use rand::RngCore;
use relay_crypto::{seal, sign, CryptoError, EncryptionKey, SigningKey};
use std::net::IpAddr;

/// Builds signed, encrypted envelopes for submission to the gate.
pub struct EnvelopeBuilder {
    api_key_id: String,
    api_key_secret: String,
    jwt: String,
    signing_key: SigningKey,
    encryption_key: EncryptionKey,
    source_ip: IpAddr,
    timestamp: Option<u64>,
    nonce: Option<Vec<u8>>,
}

impl EnvelopeBuilder {
    /// Start a builder with the sender's credentials and keys.
    pub fn new(
        api_key_id: impl Into<String>,
        api_key_secret: impl Into<String>,
        jwt: impl Into<String>,
        signing_key: SigningKey,
        encryption_key: EncryptionKey,
        source_ip: IpAddr,
    ) -> Self {
        Self {
            api_key_id: api_key_id.into(),
            api_key_secret: api_key_secret.into(),
            jwt: jwt.into(),
            signing_key,
            encryption_key,
            source_ip,
            timestamp: None,
            nonce: None,
        }
    }

    /// Override the issuance timestamp (defaults to now).
    pub fn timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Override the nonce (defaults to 16 random bytes).
    pub fn nonce(mut self, nonce: Vec<u8>) -> Self {
        self.nonce = Some(nonce);
        self
    }

    /// Encrypt `payload` and assemble a fully signed envelope.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError` if sealing fails.
    pub fn build(self, payload: &[u8]) -> Result<SecureEnvelope, CryptoError> {
        let timestamp = self.timestamp.unwrap_or_else(unix_now);
        let nonce = self.nonce.unwrap_or_else(random_nonce);

        let aad = SecureEnvelope::aad_bytes(&self.api_key_id, timestamp, &nonce);
        let sealed = seal(&self.encryption_key, payload, &aad)?;

        let mut envelope = SecureEnvelope {
            source_ip: self.source_ip,
            api_key_id: self.api_key_id,
            api_key_secret: self.api_key_secret,
            jwt: self.jwt,
            timestamp,
            nonce,
            signature: [0u8; 32],
            iv: sealed.iv,
            auth_tag: sealed.auth_tag,
            ciphertext: sealed.ciphertext,
        };
        envelope.signature = sign(&self.signing_key, &envelope.canonical_bytes());
        Ok(envelope)
    }
}

fn random_nonce() -> Vec<u8> {
    let mut nonce = vec![0u8; MIN_NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
