//! Transactions spanning several objects

use super::arena::{NodeId, Tree};
use super::cache::SessionCache;
use crate::error::Result;

/// Exclusive handle on the tree for one batch of writes
///
/// The first write to an object starts its transaction. The set ends in
/// exactly one of `commit` or `abandon`; dropping it unfinished abandons
/// every object it touched.
pub struct TransactionSet<'t> {
    tree: &'t mut Tree,
    touched: Vec<NodeId>,
    finished: bool,
}

impl<'t> TransactionSet<'t> {
    pub fn new(tree: &'t mut Tree) -> Self {
        Self {
            tree,
            touched: Vec::new(),
            finished: false,
        }
    }

    /// Tree access for reads and structural edits between writes
    pub fn tree(&mut self) -> &mut Tree {
        &mut *self.tree
    }

    /// Objects written so far, in first-touch order
    pub fn touched(&self) -> &[NodeId] {
        &self.touched
    }

    /// Stage one write, starting the owning object's transaction if needed
    pub fn set(&mut self, path: &str, value: &str, cache: &mut SessionCache) -> Result<NodeId> {
        self.tree.populate_path(path, cache)?;
        let (node, name) = self.tree.resolve_param(path)?;
        if !self.touched.contains(&node) {
            self.tree.start_transaction(node)?;
            self.touched.push(node);
        }
        self.tree.write_param(node, &name, value, cache)?;
        Ok(node)
    }

    /// Close every touched transaction, then run the translators.
    ///
    /// Translators keep running after a failure; the first error is returned
    /// and nothing is rolled back.
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        let mut first_error = None;
        let mut targets: Vec<NodeId> = Vec::new();

        for &node in &self.touched {
            if !self.tree.contains(node) {
                continue;
            }
            if let Err(e) = self.tree.finish_transaction(node) {
                first_error.get_or_insert(e);
            }
            if let Some(target) = self.tree.commit_target(node) {
                if !targets.contains(&target) {
                    targets.push(target);
                }
            }
        }

        for target in targets {
            if let Err(e) = self.tree.apply(target) {
                tracing::warn!(error = %e, "Commit failed to apply configuration");
                first_error.get_or_insert(e);
            }
        }

        tracing::debug!(objects = self.touched.len(), "Committed transaction set");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Restore every touched object to its pre-transaction state
    pub fn abandon(mut self) {
        self.finished = true;
        self.abandon_all();
    }

    fn abandon_all(&mut self) {
        for node in self.touched.drain(..).rev() {
            if !self.tree.contains(node) {
                continue;
            }
            if let Err(e) = self.tree.abandon_transaction(node) {
                tracing::warn!(error = %e, "Failed to abandon transaction");
            }
        }
        tracing::debug!("Abandoned transaction set");
    }
}

impl Drop for TransactionSet<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.abandon_all();
        }
    }
}
