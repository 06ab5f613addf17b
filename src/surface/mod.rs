//! Control surface abstraction
//!
//! `ControlSurface` is the seam between translators and the hardware
//! command interface. `ProcessSurface` runs the vendor utility;
//! `RecordingSurface` records every operation and serves canned output.

mod process;
mod recording;

pub use process::*;
pub use recording::*;

use crate::error::Result;

/// Executes one imperative operation against the hardware
#[cfg_attr(test, mockall::automock)]
pub trait ControlSurface: Send + Sync {
    /// Run an operation; nonzero exit status is a failure
    fn run(&self, args: &[String]) -> Result<()>;

    /// Run a query and return its standard output
    fn output(&self, args: &[String]) -> Result<String>;
}

/// Build an argument vector from string slices
pub fn argv(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}
