//! Per-session read cache
//!
//! Hardware-backed reads go through a `SessionCache` so one management
//! session sees one sample of each value. The owner flushes it at session
//! boundaries; the command socket flushes after every block.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use crate::error::Result;

/// Typed memo of hardware reads, valid until the next flush
#[derive(Default)]
pub struct SessionCache {
    entries: HashMap<String, Box<dyn Any + Send>>,
    generation: u64,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `key`, computing and storing it on a miss.
    /// Failed computations are not cached.
    pub fn get_or_try_insert_with<T, F>(&mut self, key: &str, f: F) -> Result<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> Result<T>,
    {
        if let Some(value) = self.entries.get(key).and_then(|v| v.downcast_ref::<T>()) {
            return Ok(value.clone());
        }
        let value = f()?;
        self.entries.insert(key.to_string(), Box::new(value.clone()));
        Ok(value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Drop every cached value
    pub fn flush(&mut self) {
        if !self.entries.is_empty() {
            tracing::trace!(entries = self.entries.len(), "Flushing session cache");
        }
        self.entries.clear();
        self.generation += 1;
    }

    /// Number of flushes so far
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCache")
            .field("keys", &self.entries.keys().collect::<Vec<_>>())
            .field("generation", &self.generation)
            .finish()
    }
}
