//! Typed key material derived from configuration.
//!
//! The ring holds every currently valid key per category. Stages try each
//! entry so rotation (old + new valid at once) needs no special casing.
//! Swapping the ring is the only runtime mutation the gate supports.

use crate::domain::config::{ConfigError, GateConfig};
use jsonwebtoken::DecodingKey;
use relay_crypto::{EncryptionKey, SigningKey};
use std::collections::HashMap;

/// All currently valid key material.
pub struct KeyRing {
    /// `api_key_id -> valid secrets` (bytes, compared constant-time)
    pub api_secrets: HashMap<String, Vec<Vec<u8>>>,
    /// JWT verification keys, newest first
    pub jwt_keys: Vec<DecodingKey>,
    /// Envelope HMAC keys, newest first
    pub signing_keys: Vec<SigningKey>,
    /// Payload decryption keys, newest first
    pub encryption_keys: Vec<EncryptionKey>,
}

impl KeyRing {
    /// Build the ring from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any key fails to decode; call
    /// [`GateConfig::validate`] first to get precise diagnostics.
    pub fn from_config(config: &GateConfig) -> Result<Self, ConfigError> {
        let mut api_secrets: HashMap<String, Vec<Vec<u8>>> = HashMap::new();
        for cred in &config.credentials {
            api_secrets
                .entry(cred.key_id.clone())
                .or_default()
                .extend(cred.secrets.iter().map(|s| s.as_bytes().to_vec()));
        }

        let jwt_keys = config
            .jwt
            .keys
            .iter()
            .map(|k| DecodingKey::from_secret(k.as_bytes()))
            .collect();

        let signing_keys = config
            .signing_keys
            .iter()
            .map(|k| {
                let bytes = hex::decode(k).map_err(|_| ConfigError::InvalidKey {
                    kind: "signing",
                    detail: "not valid hex".into(),
                })?;
                SigningKey::from_bytes(&bytes).map_err(|e| ConfigError::InvalidKey {
                    kind: "signing",
                    detail: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let encryption_keys = config
            .encryption_keys
            .iter()
            .map(|k| {
                let bytes = hex::decode(k).map_err(|_| ConfigError::InvalidKey {
                    kind: "encryption",
                    detail: "not valid hex".into(),
                })?;
                EncryptionKey::from_bytes(&bytes).map_err(|e| ConfigError::InvalidKey {
                    kind: "encryption",
                    detail: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            api_secrets,
            jwt_keys,
            signing_keys,
            encryption_keys,
        })
    }
}
