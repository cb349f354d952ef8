//! # Relay Crypto - Primitives for the Secure-Relay Gate
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `aead` | AES-256-GCM | Payload confidentiality + tamper detection |
//! | `mac` | HMAC-SHA-256 | Envelope authorship over the canonical string |
//! | `ct` | subtle | Constant-time equality for every secret compare |
//!
//! ## Security Properties
//!
//! - **AES-256-GCM**: 96-bit IV, authenticated; decryption fails closed
//! - **HMAC-SHA-256**: deterministic over the canonical envelope bytes
//! - **Constant-time compare**: no early-exit on secret material, anywhere

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aead;
pub mod ct;
pub mod errors;
pub mod mac;

// Re-exports
pub use aead::{open, seal, EncryptionKey, Iv, SealedPayload, IV_LEN, TAG_LEN};
pub use ct::ct_eq;
pub use errors::CryptoError;
pub use mac::{sign, verify, SigningKey, MAC_LEN};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
