//! Ports layer: trait seams between the pipeline and its shared state.

pub mod stores;
