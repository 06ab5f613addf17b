//! Recording control surface for tests and dry runs

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::ControlSurface;
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct Recording {
    calls: Vec<Vec<String>>,
    outputs: HashMap<String, String>,
    failures: HashSet<String>,
}

/// Records every operation in order and answers queries from canned output
///
/// Clones share the same recording, so a test can keep one handle and give
/// another to the object under test. Outputs and failures are keyed by the
/// whole argument vector joined with spaces (`"country list"`).
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    inner: Arc<Mutex<Recording>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Recording> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Canned output for a query
    pub fn respond(&self, op: &str, output: &str) {
        self.lock().outputs.insert(op.to_string(), output.to_string());
    }

    /// Make an operation fail with a control surface error
    pub fn fail(&self, op: &str) {
        self.lock().failures.insert(op.to_string());
    }

    /// Every operation so far, each joined with spaces
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.iter().map(|c| c.join(" ")).collect()
    }

    pub fn clear(&self) {
        self.lock().calls.clear();
    }

    fn record(&self, args: &[String]) -> Result<String> {
        let op = args.join(" ");
        let mut recording = self.lock();
        recording.calls.push(args.to_vec());
        if recording.failures.contains(&op) {
            return Err(Error::control_surface(&op, "exit status 1"));
        }
        Ok(recording.outputs.get(&op).cloned().unwrap_or_default())
    }
}

impl ControlSurface for RecordingSurface {
    fn run(&self, args: &[String]) -> Result<()> {
        self.record(args).map(|_| ())
    }

    fn output(&self, args: &[String]) -> Result<String> {
        self.record(args)
    }
}
