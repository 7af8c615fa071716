//! Multiplexer statistics

pub mod metrics;

pub use metrics::{MuxCounters, MuxStats};
