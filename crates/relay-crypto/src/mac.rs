//! # Canonical Envelope Signatures
//!
//! HMAC-SHA-256 over the canonical byte string the gate derives from an
//! envelope. Signing is deterministic: sender and receiver must feed this
//! module exactly the same canonical bytes or verification fails.

use crate::ct::ct_eq;
use crate::CryptoError;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroize;

type HmacSha256 = Hmac<Sha256>;

/// HMAC output length in bytes.
pub const MAC_LEN: usize = 32;

/// Shared signing key for envelope HMACs.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SigningKey(Vec<u8>);

impl SigningKey {
    /// Create from raw key bytes.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyLength` for keys shorter than 16
    /// bytes. HMAC accepts any length, but short shared secrets are a
    /// deployment mistake, not a feature.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < 16 {
            return Err(CryptoError::InvalidKeyLength {
                expected: 16,
                actual: bytes.len(),
            });
        }
        Ok(Self(bytes.to_vec()))
    }

    /// Generate a random 32-byte key.
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
        Self(bytes)
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Compute the HMAC-SHA-256 tag over canonical bytes.
pub fn sign(key: &SigningKey, canonical: &[u8]) -> [u8; MAC_LEN] {
    // new_from_slice only fails for invalid lengths; HMAC accepts any.
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(canonical);
    mac.finalize().into_bytes().into()
}

/// Verify a presented tag against the recomputed one, constant-time.
///
/// # Errors
///
/// Returns `CryptoError::MacVerificationFailed` on any mismatch.
pub fn verify(key: &SigningKey, canonical: &[u8], presented: &[u8]) -> Result<(), CryptoError> {
    let expected = sign(key, canonical);
    if ct_eq(&expected, presented) {
        Ok(())
    } else {
        Err(CryptoError::MacVerificationFailed)
    }
}
