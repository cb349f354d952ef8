//! Gate configuration with validation.
//!
//! Secrets and windows are supplied via environment or a deserialized
//! config document, never hard-coded. Every key category accepts multiple
//! concurrently valid entries so rotation needs no downtime. Validation
//! errors are fatal at startup: an unconfigured gate must not pass traffic.

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

/// Main gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Allowed caller CIDR ranges. Empty is a fatal config error, not
    /// "allow all" — the gate fails closed.
    pub allowlist: Vec<String>,
    /// Proxy ranges whose forwarded headers are trusted. Empty means
    /// forwarded headers are ignored and the socket peer is the caller.
    pub trusted_proxies: Vec<String>,
    /// Long-lived API credentials
    pub credentials: Vec<ApiKeyCredential>,
    /// Identity token expectations
    pub jwt: JwtConfig,
    /// HMAC signing keys, hex-encoded, newest first
    pub signing_keys: Vec<String>,
    /// AES-256-GCM payload keys, hex-encoded 32 bytes, newest first
    pub encryption_keys: Vec<String>,
    /// Replay guard windows
    pub replay: ReplayConfig,
    /// Per-identity call budget
    pub rate_limit: RateLimitConfig,
    /// Request size limits
    pub limits: LimitsConfig,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            allowlist: Vec::new(),
            trusted_proxies: Vec::new(),
            credentials: Vec::new(),
            jwt: JwtConfig::default(),
            signing_keys: Vec::new(),
            encryption_keys: Vec::new(),
            replay: ReplayConfig::default(),
            rate_limit: RateLimitConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}

/// One credential id with its currently valid secrets (≥ 1; more during
/// rotation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyCredential {
    /// Key identifier presented by the caller
    pub key_id: String,
    /// Valid secrets for this id
    pub secrets: Vec<String>,
}

/// Identity token expectations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    /// Required `iss` claim
    pub issuer: String,
    /// Required `aud` claim
    pub audience: String,
    /// Verification secrets, newest first
    pub keys: Vec<String>,
    /// Clock-skew allowance for `exp`/`nbf`, seconds
    pub leeway_secs: u64,
}

/// Replay guard windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// How far in the past a timestamp may lie
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    /// How far in the future (clock skew) a timestamp may lie
    #[serde(with = "humantime_serde")]
    pub max_skew: Duration,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(300),
            max_skew: Duration::from_secs(30),
        }
    }
}

/// Per-identity call budget (token bucket).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Sustained requests per minute per `(api_key_id, source_ip)`
    pub requests_per_minute: u32,
    /// Burst allowance on top of the sustained rate
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            burst_size: 10,
        }
    }
}

/// Request size limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Max request body size in bytes
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 256 * 1024,
        }
    }
}

/// Configuration errors. All fatal at startup.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Empty allowlist would mean default-deny for everything forever
    #[error("allowlist is empty; configure at least one CIDR range")]
    EmptyAllowlist,
    /// A CIDR string did not parse
    #[error("invalid CIDR range '{0}'")]
    InvalidCidr(String),
    /// No API credentials configured
    #[error("no API credentials configured")]
    NoCredentials,
    /// A credential has no secrets, or an empty one
    #[error("credential '{0}' has no usable secret")]
    EmptySecret(String),
    /// Missing or incomplete JWT expectations
    #[error("invalid JWT configuration: {0}")]
    InvalidJwt(String),
    /// A signing or encryption key failed to decode
    #[error("invalid {kind} key: {detail}")]
    InvalidKey {
        /// Key category ("signing" or "encryption")
        kind: &'static str,
        /// What went wrong
        detail: String,
    },
    /// Zero or nonsensical rate limit
    #[error("invalid rate limit: {0}")]
    InvalidRateLimit(String),
    /// Zero replay window
    #[error("invalid replay window: {0}")]
    InvalidWindow(String),
    /// A required environment variable is absent
    #[error("missing environment variable {0}")]
    MissingEnv(&'static str),
    /// An environment variable did not parse
    #[error("invalid environment variable {var}: {detail}")]
    InvalidEnv {
        /// Variable name
        var: &'static str,
        /// What went wrong
        detail: String,
    },
}

impl GateConfig {
    /// Validate the configuration. Any error here is fatal at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parsed_allowlist()?;
        self.parsed_trusted_proxies()?;

        if self.credentials.is_empty() {
            return Err(ConfigError::NoCredentials);
        }
        for cred in &self.credentials {
            if cred.key_id.is_empty() {
                return Err(ConfigError::EmptySecret("<empty id>".into()));
            }
            if cred.secrets.is_empty() || cred.secrets.iter().any(String::is_empty) {
                return Err(ConfigError::EmptySecret(cred.key_id.clone()));
            }
        }

        if self.jwt.issuer.is_empty() {
            return Err(ConfigError::InvalidJwt("issuer is empty".into()));
        }
        if self.jwt.audience.is_empty() {
            return Err(ConfigError::InvalidJwt("audience is empty".into()));
        }
        if self.jwt.keys.is_empty() || self.jwt.keys.iter().any(String::is_empty) {
            return Err(ConfigError::InvalidJwt("no verification keys".into()));
        }

        if self.signing_keys.is_empty() {
            return Err(ConfigError::InvalidKey {
                kind: "signing",
                detail: "none configured".into(),
            });
        }
        for key in &self.signing_keys {
            let bytes = hex::decode(key).map_err(|_| ConfigError::InvalidKey {
                kind: "signing",
                detail: "not valid hex".into(),
            })?;
            if bytes.len() < 16 {
                return Err(ConfigError::InvalidKey {
                    kind: "signing",
                    detail: format!("{} bytes, minimum 16", bytes.len()),
                });
            }
        }

        if self.encryption_keys.is_empty() {
            return Err(ConfigError::InvalidKey {
                kind: "encryption",
                detail: "none configured".into(),
            });
        }
        for key in &self.encryption_keys {
            let bytes = hex::decode(key).map_err(|_| ConfigError::InvalidKey {
                kind: "encryption",
                detail: "not valid hex".into(),
            })?;
            if bytes.len() != 32 {
                return Err(ConfigError::InvalidKey {
                    kind: "encryption",
                    detail: format!("{} bytes, expected 32", bytes.len()),
                });
            }
        }

        if self.replay.window.as_secs() == 0 {
            return Err(ConfigError::InvalidWindow("window cannot be 0".into()));
        }

        if self.rate_limit.requests_per_minute == 0 {
            return Err(ConfigError::InvalidRateLimit(
                "requests_per_minute cannot be 0".into(),
            ));
        }
        if self.rate_limit.burst_size == 0 {
            return Err(ConfigError::InvalidRateLimit(
                "burst_size cannot be 0".into(),
            ));
        }

        Ok(())
    }

    /// Parse the allowlist into structured ranges. Fails closed on an
    /// empty list or any unparseable entry.
    pub fn parsed_allowlist(&self) -> Result<Vec<IpNet>, ConfigError> {
        if self.allowlist.is_empty() {
            return Err(ConfigError::EmptyAllowlist);
        }
        self.allowlist
            .iter()
            .map(|s| {
                s.parse::<IpNet>()
                    .map_err(|_| ConfigError::InvalidCidr(s.clone()))
            })
            .collect()
    }

    /// Parse the trusted proxy ranges. An empty list is valid and means
    /// forwarded headers are never honored.
    pub fn parsed_trusted_proxies(&self) -> Result<Vec<IpNet>, ConfigError> {
        self.trusted_proxies
            .iter()
            .map(|s| {
                s.parse::<IpNet>()
                    .map_err(|_| ConfigError::InvalidCidr(s.clone()))
            })
            .collect()
    }

    /// Load configuration from `RELAY_*` environment variables.
    ///
    /// `RELAY_API_KEYS` holds `id:secret` pairs separated by commas;
    /// repeating an id adds a rotation secret for it.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for missing or unparseable variables. Callers
    /// still run [`GateConfig::validate`] afterwards.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self {
            allowlist: required_list("RELAY_ALLOWED_CIDRS")?,
            credentials: parse_credentials(&required_var("RELAY_API_KEYS")?)?,
            jwt: JwtConfig {
                issuer: required_var("RELAY_JWT_ISSUER")?,
                audience: required_var("RELAY_JWT_AUDIENCE")?,
                keys: required_list("RELAY_JWT_KEYS")?,
                leeway_secs: optional_parsed("RELAY_JWT_LEEWAY_SECS", 5)?,
            },
            signing_keys: required_list("RELAY_SIGNING_KEYS")?,
            encryption_keys: required_list("RELAY_ENCRYPTION_KEYS")?,
            ..Self::default()
        };

        config.trusted_proxies = optional_list("RELAY_TRUSTED_PROXIES");
        config.replay.window =
            Duration::from_secs(optional_parsed("RELAY_REPLAY_WINDOW_SECS", 300)?);
        config.replay.max_skew = Duration::from_secs(optional_parsed("RELAY_MAX_SKEW_SECS", 30)?);
        config.rate_limit.requests_per_minute = optional_parsed("RELAY_RATE_PER_MINUTE", 60)?;
        config.rate_limit.burst_size = optional_parsed("RELAY_RATE_BURST", 10)?;
        config.limits.max_body_bytes = optional_parsed("RELAY_MAX_BODY_BYTES", 256 * 1024)?;

        Ok(config)
    }
}

fn required_var(var: &'static str) -> Result<String, ConfigError> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingEnv(var)),
    }
}

fn required_list(var: &'static str) -> Result<Vec<String>, ConfigError> {
    Ok(required_var(var)?
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

fn optional_list(var: &'static str) -> Vec<String> {
    env::var(var)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn optional_parsed<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(v) => v.trim().parse().map_err(|_| ConfigError::InvalidEnv {
            var,
            detail: format!("cannot parse '{}'", v),
        }),
        Err(_) => Ok(default),
    }
}

fn parse_credentials(raw: &str) -> Result<Vec<ApiKeyCredential>, ConfigError> {
    // BTreeMap keeps credential order deterministic across restarts.
    let mut table: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for pair in raw.split(',').filter(|s| !s.trim().is_empty()) {
        let (id, secret) = pair
            .trim()
            .split_once(':')
            .ok_or(ConfigError::InvalidEnv {
                var: "RELAY_API_KEYS",
                detail: format!("entry '{}' is not id:secret", pair.trim()),
            })?;
        table
            .entry(id.to_string())
            .or_default()
            .push(secret.to_string());
    }
    Ok(table
        .into_iter()
        .map(|(key_id, secrets)| ApiKeyCredential { key_id, secrets })
        .collect())
}

/// Humantime serde module for Duration fields ("300s", "500ms", "5m").
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|_| "invalid minutes")
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
