//! Object schemas and the schema registry
//!
//! A schema declares what an object exports: parameters with their types and
//! access, single child objects, and indexed child lists. The registry maps
//! schema names to factories so `add` can create new list entries.

use std::collections::HashMap;
use std::fmt;

use super::object::ConfigurableObject;
use super::value::{ParamType, ParamValue};
use crate::error::{Error, Result};

/// Parameter access mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

/// Extra check run on a parsed value before it is staged
pub type Validator = fn(&ParamValue) -> std::result::Result<(), String>;

/// Declaration of one parameter
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub ty: ParamType,
    pub access: Access,
    pub validator: Option<Validator>,
}

impl ParamSpec {
    pub fn read_only(name: &str, ty: ParamType) -> Self {
        Self {
            name: name.to_string(),
            ty,
            access: Access::ReadOnly,
            validator: None,
        }
    }

    pub fn read_write(name: &str, ty: ParamType) -> Self {
        Self {
            name: name.to_string(),
            ty,
            access: Access::ReadWrite,
            validator: None,
        }
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn is_writable(&self) -> bool {
        self.access == Access::ReadWrite
    }

    /// Check access, parse the raw string and run the validator
    pub fn parse(&self, raw: &str) -> Result<ParamValue> {
        if !self.is_writable() {
            return Err(Error::ReadOnly(self.name.clone()));
        }
        let value = self.ty.parse(&self.name, raw)?;
        if let Some(validator) = self.validator {
            validator(&value).map_err(|reason| Error::validation(&self.name, raw, reason))?;
        }
        Ok(value)
    }
}

/// Declaration of an indexed child collection
#[derive(Debug, Clone)]
pub struct ListSpec {
    pub name: String,
    /// Schema name of every entry
    pub element: String,
    /// Fixed lists reject `add` and `del`
    pub fixed: bool,
    /// Entries are rebuilt by the owning object on read, once per session
    pub populated: bool,
}

/// Everything one kind of object exports
#[derive(Debug, Clone, Default)]
pub struct ObjectSchema {
    pub name: String,
    pub params: Vec<ParamSpec>,
    pub objects: Vec<String>,
    pub lists: Vec<ListSpec>,
}

impl ObjectSchema {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    pub fn with_object(mut self, name: &str) -> Self {
        self.objects.push(name.to_string());
        self
    }

    pub fn with_list(mut self, name: &str, element: &str) -> Self {
        self.lists.push(ListSpec {
            name: name.to_string(),
            element: element.to_string(),
            fixed: false,
            populated: false,
        });
        self
    }

    pub fn with_fixed_list(mut self, name: &str, element: &str) -> Self {
        self.lists.push(ListSpec {
            name: name.to_string(),
            element: element.to_string(),
            fixed: true,
            populated: false,
        });
        self
    }

    /// List whose entries the owning object reports from its control surface
    pub fn with_populated_list(mut self, name: &str, element: &str) -> Self {
        self.lists.push(ListSpec {
            name: name.to_string(),
            element: element.to_string(),
            fixed: true,
            populated: true,
        });
        self
    }

    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn list(&self, name: &str) -> Option<&ListSpec> {
        self.lists.iter().find(|l| l.name == name)
    }

    pub fn has_object(&self, name: &str) -> bool {
        self.objects.iter().any(|o| o == name)
    }

    /// Look up a writable parameter and parse a value for it
    pub fn parse_write(&self, name: &str, raw: &str) -> Result<ParamValue> {
        self.param(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?
            .parse(raw)
    }

    /// Structural checks that do not need the live tree
    pub fn check(&self) -> Result<()> {
        let mut seen: Vec<&str> = Vec::new();
        let names = self
            .params
            .iter()
            .map(|p| p.name.as_str())
            .chain(self.objects.iter().map(String::as_str))
            .chain(self.lists.iter().map(|l| l.name.as_str()));
        for name in names {
            if name.is_empty() || name.contains('.') {
                return Err(Error::schema(&self.name, format!("invalid export name {:?}", name)));
            }
            if seen.contains(&name) {
                return Err(Error::schema(&self.name, format!("{} declared twice", name)));
            }
            seen.push(name);
        }
        Ok(())
    }
}

/// Creates a fresh object for a schema name
pub type Factory = Box<dyn Fn() -> Box<dyn ConfigurableObject> + Send + Sync>;

/// Registry of factories for list element schemas
#[derive(Default)]
pub struct SchemaRegistry {
    factories: HashMap<String, Factory>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the factory used when `add` targets a list of `schema`
    pub fn register<F>(&mut self, schema: &str, factory: F)
    where
        F: Fn() -> Box<dyn ConfigurableObject> + Send + Sync + 'static,
    {
        self.factories.insert(schema.to_string(), Box::new(factory));
    }

    pub fn contains(&self, schema: &str) -> bool {
        self.factories.contains_key(schema)
    }

    pub fn create(&self, schema: &str) -> Option<Box<dyn ConfigurableObject>> {
        self.factories.get(schema).map(|f| f())
    }
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("schemas", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
