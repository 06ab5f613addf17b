//! Configurable objects and their transaction state

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::arena::CommitContext;
use super::cache::SessionCache;
use super::schema::ObjectSchema;
use super::value::ParamValue;
use crate::error::{Error, Result};

/// Where an object's commit is translated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitScope {
    /// The object applies its own configuration
    Own,
    /// The owning node re-applies (key tables of a radio)
    Parent,
}

/// A node of the parameter tree
///
/// Reads take `&mut self` so hardware-backed objects can refresh counters,
/// and both reads and writes get the session cache for hardware queries.
pub trait ConfigurableObject: Any + Send {
    fn schema(&self) -> &ObjectSchema;

    /// Read one parameter
    fn get_param(&mut self, name: &str, cache: &mut SessionCache) -> Result<ParamValue>;

    /// Validate and stage a write in the open transaction
    fn set_param(&mut self, name: &str, value: &str, cache: &mut SessionCache) -> Result<()>;

    fn start_transaction(&mut self) -> Result<()>;

    /// Drop the saved snapshot, keeping the working copy
    fn finish_transaction(&mut self) -> Result<()>;

    fn abandon_transaction(&mut self) -> Result<()>;

    fn in_transaction(&self) -> bool;

    /// Push the committed configuration to the control surface
    fn apply(&mut self, _cx: &CommitContext<'_>) -> Result<()> {
        Ok(())
    }

    fn commit_scope(&self) -> CommitScope {
        CommitScope::Own
    }

    /// Current entries of a populated list, indexed from 1 in order.
    /// `None` leaves the list as it is.
    fn populate_list(
        &mut self,
        _list: &str,
        _cache: &mut SessionCache,
    ) -> Result<Option<Vec<Box<dyn ConfigurableObject>>>> {
        Ok(None)
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Working configuration plus the snapshot saved by an open transaction
///
/// `old_config` is `Some` exactly while a transaction is open.
#[derive(Debug, Clone)]
pub struct Snapshot<C> {
    config: C,
    old_config: Option<C>,
}

impl<C: Clone> Snapshot<C> {
    pub fn new(config: C) -> Self {
        Self {
            config,
            old_config: None,
        }
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.old_config.is_some()
    }

    pub fn start(&mut self) -> Result<()> {
        if self.old_config.is_some() {
            return Err(Error::InvalidState("transaction already open".to_string()));
        }
        self.old_config = Some(self.config.clone());
        Ok(())
    }

    /// Mutable working copy; writes are only accepted inside a transaction
    pub fn stage(&mut self) -> Result<&mut C> {
        if self.old_config.is_none() {
            return Err(Error::InvalidState("no open transaction".to_string()));
        }
        Ok(&mut self.config)
    }

    pub fn commit(&mut self) -> Result<()> {
        self.old_config
            .take()
            .map(|_| ())
            .ok_or_else(|| Error::InvalidState("no open transaction".to_string()))
    }

    pub fn abandon(&mut self) -> Result<()> {
        let old = self
            .old_config
            .take()
            .ok_or_else(|| Error::InvalidState("no open transaction".to_string()))?;
        self.config = old;
        Ok(())
    }
}

/// Plain software object whose parameters live in its snapshot
///
/// Used for objects with no control surface behind them (device info,
/// user-managed lists).
#[derive(Debug, Clone)]
pub struct ParamObject {
    schema: Arc<ObjectSchema>,
    state: Snapshot<BTreeMap<String, ParamValue>>,
}

impl ParamObject {
    pub fn new(schema: Arc<ObjectSchema>) -> Self {
        let values = schema
            .params
            .iter()
            .map(|p| (p.name.clone(), p.ty.default_value()))
            .collect();
        Self {
            schema,
            state: Snapshot::new(values),
        }
    }

    /// Seed a value without a transaction (construction time only)
    pub fn with_value(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.state.config.insert(name.to_string(), value.into());
        self
    }

    pub fn value(&self, name: &str) -> Option<&ParamValue> {
        self.state.config().get(name)
    }
}

impl ConfigurableObject for ParamObject {
    fn schema(&self) -> &ObjectSchema {
        &self.schema
    }

    fn get_param(&mut self, name: &str, _cache: &mut SessionCache) -> Result<ParamValue> {
        self.state
            .config()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    fn set_param(&mut self, name: &str, value: &str, _cache: &mut SessionCache) -> Result<()> {
        let parsed = self.schema.parse_write(name, value)?;
        self.state.stage()?.insert(name.to_string(), parsed);
        Ok(())
    }

    fn start_transaction(&mut self) -> Result<()> {
        self.state.start()
    }

    fn finish_transaction(&mut self) -> Result<()> {
        self.state.commit()
    }

    fn abandon_transaction(&mut self) -> Result<()> {
        self.state.abandon()
    }

    fn in_transaction(&self) -> bool {
        self.state.is_open()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{ParamSpec, ParamType};

    fn object() -> ParamObject {
        let schema = ObjectSchema::new("Entry")
            .with_param(ParamSpec::read_write("Value", ParamType::Int))
            .with_param(ParamSpec::read_only("Name", ParamType::String));
        ParamObject::new(Arc::new(schema)).with_value("Name", "eth0")
    }

    #[test]
    fn test_snapshot_lifecycle() {
        let mut snap = Snapshot::new(1u32);
        assert!(snap.stage().is_err());

        snap.start().unwrap();
        assert!(matches!(snap.start(), Err(Error::InvalidState(_))));
        *snap.stage().unwrap() = 2;
        snap.abandon().unwrap();
        assert_eq!(*snap.config(), 1);
        assert!(!snap.is_open());
        assert!(snap.abandon().is_err());

        snap.start().unwrap();
        *snap.stage().unwrap() = 3;
        *snap.stage().unwrap() = 4;
        snap.commit().unwrap();
        assert_eq!(*snap.config(), 4);
        assert!(!snap.is_open());
    }

    #[test]
    fn test_failed_write_leaves_snapshot_alone() {
        let mut obj = object();
        let mut cache = SessionCache::new();
        obj.start_transaction().unwrap();
        obj.set_param("Value", "5", &mut cache).unwrap();

        assert!(obj.set_param("Value", "five", &mut cache).is_err());
        assert!(matches!(
            obj.set_param("Name", "eth1", &mut cache),
            Err(Error::ReadOnly(_))
        ));
        assert_eq!(obj.value("Value"), Some(&ParamValue::Int(5)));

        obj.abandon_transaction().unwrap();
        assert_eq!(obj.value("Value"), Some(&ParamValue::Int(0)));
        assert_eq!(obj.get_param("Name", &mut cache).unwrap(), ParamValue::from("eth0"));
    }

    #[test]
    fn test_write_outside_transaction_rejected() {
        let mut obj = object();
        let mut cache = SessionCache::new();
        assert!(matches!(
            obj.set_param("Value", "5", &mut cache),
            Err(Error::InvalidState(_))
        ));
    }
}
