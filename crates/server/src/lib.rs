//! HTTP boundary for the image enhancement gateway.

pub mod api;
pub mod metrics;
pub mod state;
