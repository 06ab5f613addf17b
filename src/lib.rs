//! Device-side TR-069 agent core
//!
//! The agent exposes a tree of configurable objects over a line-oriented
//! command socket. It provides:
//!
//! - Transactional parameter writes staged per command block
//! - A Broadcom `wl` driver translating committed settings into ordered
//!   hardware operations
//! - Wraparound-safe interface counters
//! - Hooks for firmware downloads and management-session wakeups

pub mod config;
pub mod counters;
pub mod device;
pub mod error;
pub mod hooks;
pub mod platform;
pub mod protocol;
pub mod surface;
pub mod tree;
pub mod wifi;

pub use error::{Error, Result};
