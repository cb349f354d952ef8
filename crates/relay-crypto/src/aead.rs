//! # Authenticated Payload Sealing
//!
//! AES-256-GCM with a 96-bit IV and detached 128-bit auth tag.
//!
//! ## Security Properties
//!
//! - Decryption fails closed: a tag mismatch yields an error and no
//!   partial plaintext, ever.
//! - IV reuse under one key breaks GCM, so the sealing API draws a fresh
//!   random IV internally on every call; callers cannot supply one.
//! - Associated data binds the ciphertext to the signed envelope identity.

use crate::CryptoError;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use zeroize::Zeroize;

/// IV length in bytes (96-bit, per GCM).
pub const IV_LEN: usize = 12;

/// Auth tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Payload encryption key (256-bit).
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    /// Create from raw key bytes.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyLength` unless exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: 32,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    /// Generate a random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
        Self(bytes)
    }

    fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Initialization vector carried on the wire alongside the ciphertext.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Iv([u8; IV_LEN]);

impl Iv {
    /// Create from wire bytes.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidIvLength` unless exactly 12 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; IV_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidIvLength {
                expected: IV_LEN,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    /// Get inner bytes.
    pub fn as_bytes(&self) -> &[u8; IV_LEN] {
        &self.0
    }

    fn generate() -> Self {
        let mut bytes = [0u8; IV_LEN];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
        Self(bytes)
    }
}

/// Result of sealing a plaintext: the three wire components.
#[derive(Clone, Debug)]
pub struct SealedPayload {
    /// Fresh IV used for this message
    pub iv: Iv,
    /// Ciphertext without the tag
    pub ciphertext: Vec<u8>,
    /// Detached GCM auth tag
    pub auth_tag: [u8; TAG_LEN],
}

/// Encrypt a plaintext under a fresh random IV.
///
/// # Errors
///
/// Returns `CryptoError::EncryptionFailed` if the cipher rejects the input.
pub fn seal(
    key: &EncryptionKey,
    plaintext: &[u8],
    aad: &[u8],
) -> Result<SealedPayload, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let iv = Iv::generate();

    let mut combined = cipher
        .encrypt(
            Nonce::from_slice(iv.as_bytes()),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    // aes-gcm appends the tag to the ciphertext; split it for the wire.
    let tag_start = combined.len() - TAG_LEN;
    let mut auth_tag = [0u8; TAG_LEN];
    auth_tag.copy_from_slice(&combined[tag_start..]);
    combined.truncate(tag_start);

    Ok(SealedPayload {
        iv,
        ciphertext: combined,
        auth_tag,
    })
}

/// Decrypt and authenticate a sealed payload.
///
/// # Errors
///
/// Returns `CryptoError::DecryptionFailed` on tag mismatch, wrong key, or
/// mismatched associated data. The error is deliberately uniform: callers
/// cannot distinguish which of the three failed.
pub fn open(
    key: &EncryptionKey,
    iv: &Iv,
    ciphertext: &[u8],
    auth_tag: &[u8; TAG_LEN],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    let mut combined = Vec::with_capacity(ciphertext.len() + TAG_LEN);
    combined.extend_from_slice(ciphertext);
    combined.extend_from_slice(auth_tag);

    cipher
        .decrypt(
            Nonce::from_slice(iv.as_bytes()),
            Payload {
                msg: &combined,
                aad,
            },
        )
        .map_err(|_| CryptoError::DecryptionFailed)
}
