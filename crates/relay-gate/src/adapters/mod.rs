//! Adapters layer: concrete stores and the HTTP surface.

pub mod http;
pub mod memory;
