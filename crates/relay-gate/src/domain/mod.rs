//! Domain layer: pure types and validation, no I/O.

pub mod config;
pub mod envelope;
pub mod error;
pub mod keys;
