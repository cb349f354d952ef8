#![warn(clippy::all)]
#![deny(unsafe_code)]

//! Secure Relay gate - layered verification for inter-service requests.
//!
//! Every inbound request passes seven independent checks in a fixed order
//! before its payload is decrypted and handed to the application. The
//! first failing check ends processing; nothing downstream runs.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      SECURE RELAY GATE                       │
//! ├──────────────────────────────────────────────────────────────┤
//! │   POST /v1/events (adapters::http)                           │
//! │          │                                                   │
//! │          ▼ decode + shape validation (domain::envelope)      │
//! │  ┌───────────────────────────────────────────────────────┐   │
//! │  │                 Pipeline (ordered stages)             │   │
//! │  │  IpGate → ApiKey → Jwt → Signature → Replay           │   │
//! │  │        → RateLimit → Decrypt                          │   │
//! │  └──────────┬────────────────────────────────┬───────────┘   │
//! │             │                                │               │
//! │      NonceStore (replay)             RateStore (budget)      │
//! │      KeyRing (rotating secrets, parking_lot::RwLock)         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use relay_gate::{adapters::http, pipeline::Pipeline, domain::config::GateConfig};
//! use std::sync::Arc;
//!
//! let config = GateConfig::from_env()?;
//! let pipeline = Arc::new(Pipeline::new(&config)?);
//! let app = http::router(
//!     pipeline,
//!     config.limits.max_body_bytes,
//!     config.parsed_trusted_proxies()?,
//! );
//! ```
//!
//! # Security posture
//!
//! - Fail closed: store timeouts and empty allowlists reject
//! - Constant-time credential and MAC comparison (shared `relay-crypto`)
//! - Pinned JWT algorithm; header-asserted algorithms are ignored
//! - Forwarded-address headers honored only from configured trusted proxies
//! - Coarse external errors; full detail only in structured logs

pub mod adapters;
pub mod domain;
pub mod pipeline;
pub mod ports;
pub mod sender;
pub mod stages;
pub mod telemetry;

pub use domain::config::GateConfig;
pub use domain::envelope::SecureEnvelope;
pub use domain::error::{RejectReason, StageId, VerificationResult};
pub use pipeline::Pipeline;
pub use sender::EnvelopeBuilder;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
