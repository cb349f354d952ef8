//! Structured logging setup.
//!
//! `RUST_LOG` controls verbosity; the default keeps the gate's own spans
//! at `info` and everything else at `warn`. Plaintext payloads and key
//! material are never logged anywhere in the crate, so log output is safe
//! to ship as-is.

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. Call once at process start; later calls
/// are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,relay_gate=info"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
