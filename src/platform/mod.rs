//! Platform-specific locations

pub mod dirs;

pub use dirs::*;
