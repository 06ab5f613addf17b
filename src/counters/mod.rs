//! Hardware counters
//!
//! This module provides:
//! - Wraparound-safe accumulators for bounded-width counters
//! - Statistics sources (`/proc/net/dev`, flat key/value files)
//! - The read-only interface statistics object

mod accumulator;
mod netdev;
mod stats;

pub use accumulator::*;
pub use netdev::*;
pub use stats::*;
