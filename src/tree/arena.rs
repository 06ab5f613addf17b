//! Arena-backed parameter tree
//!
//! Objects live in a flat arena and refer to each other through `NodeId`
//! handles. Slots of deleted nodes are never reused, so a handle held by a
//! transaction set can go stale but can never point at a different object.

use std::collections::BTreeMap;
use std::fmt;

use super::cache::SessionCache;
use super::object::{CommitScope, ConfigurableObject};
use super::schema::{ObjectSchema, SchemaRegistry};
use super::value::ParamValue;
use crate::error::{Error, Result};

/// Stable handle to a node of the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// What a dotted path names
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Object(NodeId),
    /// A list-valued field of the object
    List(NodeId, String),
    /// A parameter of the object
    Param(NodeId, String),
}

/// One row of a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Export {
    /// Object or list path, with trailing dot
    Object(String),
    Param(String, ParamValue),
}

impl Export {
    pub fn name(&self) -> &str {
        match self {
            Export::Object(name) | Export::Param(name, _) => name,
        }
    }

    /// Token list written on the command socket
    pub fn into_row(self) -> Vec<String> {
        match self {
            Export::Object(name) => vec![name],
            Export::Param(name, value) => vec![name, value.to_string()],
        }
    }
}

struct Node {
    parent: Option<NodeId>,
    /// `None` only while the object is detached for `apply`
    object: Option<Box<dyn ConfigurableObject>>,
    objects: BTreeMap<String, NodeId>,
    lists: BTreeMap<String, ListEntries>,
}

#[derive(Debug, Default)]
struct ListEntries {
    entries: BTreeMap<u32, NodeId>,
    /// Highest index ever issued
    last_index: u32,
}

/// The process-wide tree of configurable objects
pub struct Tree {
    nodes: Vec<Option<Node>>,
    root: NodeId,
    registry: SchemaRegistry,
}

impl Tree {
    pub fn new(root: Box<dyn ConfigurableObject>) -> Self {
        Self::with_registry(root, SchemaRegistry::new())
    }

    pub fn with_registry(root: Box<dyn ConfigurableObject>, registry: SchemaRegistry) -> Self {
        let node = Node {
            parent: None,
            object: Some(root),
            objects: BTreeMap::new(),
            lists: BTreeMap::new(),
        };
        Self {
            nodes: vec![Some(node)],
            root: NodeId(0),
            registry,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SchemaRegistry {
        &mut self.registry
    }

    pub fn contains(&self, id: NodeId) -> bool {
        matches!(self.nodes.get(id.0), Some(Some(_)))
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0)?.as_ref()?.parent
    }

    pub fn object(&self, id: NodeId) -> Option<&dyn ConfigurableObject> {
        self.nodes.get(id.0)?.as_ref()?.object.as_deref()
    }

    pub fn object_mut(&mut self, id: NodeId) -> Option<&mut dyn ConfigurableObject> {
        match self.nodes.get_mut(id.0) {
            Some(Some(node)) => match node.object.as_mut() {
                Some(object) => Some(object.as_mut()),
                None => None,
            },
            _ => None,
        }
    }

    /// Borrow a node's object as its concrete type
    pub fn downcast_ref<T: ConfigurableObject>(&self, id: NodeId) -> Option<&T> {
        self.object(id)?.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: ConfigurableObject>(&mut self, id: NodeId) -> Option<&mut T> {
        self.object_mut(id)?.as_any_mut().downcast_mut::<T>()
    }

    fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::InvalidState("stale node handle".to_string()))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::InvalidState("stale node handle".to_string()))
    }

    fn live(&self, id: NodeId) -> Result<&dyn ConfigurableObject> {
        self.node(id)?
            .object
            .as_deref()
            .ok_or_else(|| Error::InvalidState("object is busy".to_string()))
    }

    fn live_mut(&mut self, id: NodeId) -> Result<&mut dyn ConfigurableObject> {
        match self.node_mut(id)?.object.as_mut() {
            Some(object) => Ok(object.as_mut()),
            None => Err(Error::InvalidState("object is busy".to_string())),
        }
    }

    fn schema_of(&self, id: NodeId) -> Result<&ObjectSchema> {
        Ok(self.live(id)?.schema())
    }

    fn insert(&mut self, parent: NodeId, object: Box<dyn ConfigurableObject>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(Node {
            parent: Some(parent),
            object: Some(object),
            objects: BTreeMap::new(),
            lists: BTreeMap::new(),
        }));
        id
    }

    /// Attach a declared single child object
    pub fn attach_object(
        &mut self,
        parent: NodeId,
        name: &str,
        object: Box<dyn ConfigurableObject>,
    ) -> Result<NodeId> {
        let schema = self.schema_of(parent)?;
        if !schema.has_object(name) {
            return Err(Error::schema(
                &schema.name,
                format!("no child object {} declared", name),
            ));
        }
        if self.node(parent)?.objects.contains_key(name) {
            return Err(Error::schema(name, "already attached"));
        }
        let id = self.insert(parent, object);
        self.node_mut(parent)?.objects.insert(name.to_string(), id);
        Ok(id)
    }

    /// Attach an entry to a declared list, fixed or not. Returns the index.
    pub fn attach_entry(
        &mut self,
        parent: NodeId,
        list: &str,
        index: Option<u32>,
        object: Box<dyn ConfigurableObject>,
    ) -> Result<u32> {
        let schema = self.schema_of(parent)?;
        if schema.list(list).is_none() {
            return Err(Error::schema(
                &schema.name,
                format!("no list {} declared", list),
            ));
        }
        self.insert_entry(parent, list, index, object)
    }

    /// Node of one list entry
    pub fn entry(&self, parent: NodeId, list: &str, index: u32) -> Option<NodeId> {
        self.node(parent)
            .ok()?
            .lists
            .get(list)?
            .entries
            .get(&index)
            .copied()
    }

    fn insert_entry(
        &mut self,
        parent: NodeId,
        list: &str,
        index: Option<u32>,
        object: Box<dyn ConfigurableObject>,
    ) -> Result<u32> {
        let entries = self
            .node_mut(parent)?
            .lists
            .entry(list.to_string())
            .or_default();
        let index = match index {
            Some(i) if entries.entries.contains_key(&i) => {
                return Err(Error::InvalidState(format!("{}.{} already exists", list, i)));
            }
            Some(i) => i,
            None => entries
                .last_index
                .checked_add(1)
                .ok_or_else(|| Error::InvalidState(format!("{} is full", list)))?,
        };
        entries.last_index = entries.last_index.max(index);

        let id = self.insert(parent, object);
        if let Some(entries) = self.node_mut(parent)?.lists.get_mut(list) {
            entries.entries.insert(index, id);
        }
        Ok(index)
    }

    /// Find the node a dotted path refers to
    pub fn resolve(&self, path: &str) -> Result<Resolved> {
        let not_found = || Error::NotFound(path.to_string());
        let trimmed = path.strip_suffix('.').unwrap_or(path);
        let mut current = Resolved::Object(self.root);
        if trimmed.is_empty() {
            return Ok(current);
        }

        for segment in trimmed.split('.') {
            current = match current {
                Resolved::Object(id) => {
                    let node = self.node(id)?;
                    let schema = self.schema_of(id)?;
                    if let Some(&child) = node.objects.get(segment) {
                        Resolved::Object(child)
                    } else if schema.list(segment).is_some() {
                        Resolved::List(id, segment.to_string())
                    } else if schema.param(segment).is_some() {
                        Resolved::Param(id, segment.to_string())
                    } else {
                        return Err(not_found());
                    }
                }
                Resolved::List(id, list) => {
                    let index: u32 = segment.parse().map_err(|_| not_found())?;
                    let child = self
                        .node(id)?
                        .lists
                        .get(&list)
                        .and_then(|l| l.entries.get(&index))
                        .copied()
                        .ok_or_else(not_found)?;
                    Resolved::Object(child)
                }
                Resolved::Param(..) => return Err(not_found()),
            };
        }

        if path.ends_with('.') && matches!(current, Resolved::Param(..)) {
            return Err(not_found());
        }
        Ok(current)
    }

    pub fn resolve_param(&self, path: &str) -> Result<(NodeId, String)> {
        match self.resolve(path)? {
            Resolved::Param(id, name) => Ok((id, name)),
            _ => Err(Error::Dispatch(format!("{} is not a parameter", path))),
        }
    }

    fn resolve_list(&self, path: &str) -> Result<(NodeId, String)> {
        match self.resolve(path)? {
            Resolved::List(id, name) => Ok((id, name)),
            _ => Err(Error::Dispatch(format!("{} is not a list", path))),
        }
    }

    /// Rebuild a populated list from its owner, at most once per session
    fn populate(&mut self, id: NodeId, list: &str, cache: &mut SessionCache) -> Result<()> {
        if !self.schema_of(id)?.list(list).is_some_and(|l| l.populated) {
            return Ok(());
        }
        let marker = format!("populated:{}:{}", id.0, list);
        if cache.contains(&marker) {
            return Ok(());
        }
        let Some(objects) = self.live_mut(id)?.populate_list(list, cache)? else {
            return Ok(());
        };

        let old = self.node_mut(id)?.lists.remove(list).unwrap_or_default();
        for child in old.entries.into_values() {
            self.free(child);
        }
        let count = objects.len();
        for (index, object) in (1u32..).zip(objects) {
            self.insert_entry(id, list, Some(index), object)?;
        }
        cache.get_or_try_insert_with(&marker, || Ok(()))?;
        tracing::trace!(list, entries = count, "Populated list");
        Ok(())
    }

    /// Rebuild every populated list `path` passes through
    pub fn populate_path(&mut self, path: &str, cache: &mut SessionCache) -> Result<()> {
        let trimmed = path.strip_suffix('.').unwrap_or(path);
        if trimmed.is_empty() {
            return Ok(());
        }
        let mut prefix = String::new();
        for segment in trimmed.split('.') {
            prefix.push_str(segment);
            if let Ok(Resolved::List(id, list)) = self.resolve(&prefix) {
                self.populate(id, &list, cache)?;
            }
            prefix.push('.');
        }
        Ok(())
    }

    /// Read one parameter by path
    pub fn get_export(&mut self, path: &str, cache: &mut SessionCache) -> Result<ParamValue> {
        self.populate_path(path, cache)?;
        let (id, name) = self.resolve_param(path)?;
        self.live_mut(id)?.get_param(&name, cache)
    }

    /// Stage a write by path into the owning object's open transaction
    pub fn set_export_param(
        &mut self,
        path: &str,
        value: &str,
        cache: &mut SessionCache,
    ) -> Result<NodeId> {
        self.populate_path(path, cache)?;
        let (id, name) = self.resolve_param(path)?;
        self.write_param(id, &name, value, cache)?;
        Ok(id)
    }

    pub fn write_param(
        &mut self,
        id: NodeId,
        name: &str,
        value: &str,
        cache: &mut SessionCache,
    ) -> Result<()> {
        self.live_mut(id)?.set_param(name, value, cache)
    }

    pub fn start_transaction(&mut self, id: NodeId) -> Result<()> {
        self.live_mut(id)?.start_transaction()
    }

    pub fn finish_transaction(&mut self, id: NodeId) -> Result<()> {
        self.live_mut(id)?.finish_transaction()
    }

    pub fn abandon_transaction(&mut self, id: NodeId) -> Result<()> {
        self.live_mut(id)?.abandon_transaction()
    }

    /// Close one object's transaction and run its translator
    pub fn commit_transaction(&mut self, id: NodeId) -> Result<()> {
        self.finish_transaction(id)?;
        self.apply(id)
    }

    /// Node whose translator must run after `id` commits
    pub fn commit_target(&self, id: NodeId) -> Option<NodeId> {
        match self.object(id)?.commit_scope() {
            CommitScope::Own => Some(id),
            CommitScope::Parent => self.parent(id),
        }
    }

    /// Run an object's translator with read access to the rest of the tree
    pub fn apply(&mut self, id: NodeId) -> Result<()> {
        let mut object = self
            .node_mut(id)?
            .object
            .take()
            .ok_or_else(|| Error::InvalidState("object is busy".to_string()))?;
        let result = object.apply(&CommitContext {
            tree: &*self,
            node: id,
        });
        if let Ok(node) = self.node_mut(id) {
            node.object = Some(object);
        }
        result
    }

    /// List one level (or everything, when `recursive`) under `path`
    pub fn list_exports(
        &mut self,
        path: &str,
        recursive: bool,
        cache: &mut SessionCache,
    ) -> Result<Vec<Export>> {
        let mut out = Vec::new();
        self.populate_path(path, cache)?;
        match self.resolve(path)? {
            Resolved::Object(id) => {
                self.collect_object(id, &object_prefix(path), recursive, cache, &mut out)?
            }
            Resolved::List(id, list) => {
                self.collect_list(id, &list, &object_prefix(path), recursive, cache, &mut out)?
            }
            Resolved::Param(id, name) => {
                let value = self.live_mut(id)?.get_param(&name, cache)?;
                out.push(Export::Param(path.to_string(), value));
            }
        }
        Ok(out)
    }

    fn collect_object(
        &mut self,
        id: NodeId,
        prefix: &str,
        recursive: bool,
        cache: &mut SessionCache,
        out: &mut Vec<Export>,
    ) -> Result<()> {
        let schema = self.schema_of(id)?;
        let mut params: Vec<String> = schema.params.iter().map(|p| p.name.clone()).collect();
        let mut lists: Vec<String> = schema.lists.iter().map(|l| l.name.clone()).collect();
        params.sort();
        lists.sort();
        let objects: Vec<(String, NodeId)> = self
            .node(id)?
            .objects
            .iter()
            .map(|(name, child)| (name.clone(), *child))
            .collect();

        for name in params {
            let value = self.live_mut(id)?.get_param(&name, cache)?;
            out.push(Export::Param(format!("{}{}", prefix, name), value));
        }
        for (name, child) in objects {
            let child_prefix = format!("{}{}.", prefix, name);
            out.push(Export::Object(child_prefix.clone()));
            if recursive {
                self.collect_object(child, &child_prefix, true, cache, out)?;
            }
        }
        for list in lists {
            let list_prefix = format!("{}{}.", prefix, list);
            out.push(Export::Object(list_prefix.clone()));
            if recursive {
                self.collect_list(id, &list, &list_prefix, true, cache, out)?;
            }
        }
        Ok(())
    }

    fn collect_list(
        &mut self,
        id: NodeId,
        list: &str,
        prefix: &str,
        recursive: bool,
        cache: &mut SessionCache,
        out: &mut Vec<Export>,
    ) -> Result<()> {
        self.populate(id, list, cache)?;
        for (index, child) in self.list_entries(id, list)? {
            let child_prefix = format!("{}{}.", prefix, index);
            out.push(Export::Object(child_prefix.clone()));
            if recursive {
                self.collect_object(child, &child_prefix, true, cache, out)?;
            }
        }
        Ok(())
    }

    fn list_entries(&self, id: NodeId, list: &str) -> Result<Vec<(u32, NodeId)>> {
        Ok(self
            .node(id)?
            .lists
            .get(list)
            .map(|l| l.entries.iter().map(|(i, c)| (*i, *c)).collect())
            .unwrap_or_default())
    }

    /// Names one level below `resolved`, relative, objects with a trailing dot
    fn child_names(&self, resolved: &Resolved) -> Result<Vec<String>> {
        match resolved {
            Resolved::Object(id) => {
                let schema = self.schema_of(*id)?;
                let mut names: Vec<String> = schema.params.iter().map(|p| p.name.clone()).collect();
                names.extend(self.node(*id)?.objects.keys().map(|name| format!("{}.", name)));
                names.extend(schema.lists.iter().map(|l| format!("{}.", l.name)));
                names.sort();
                Ok(names)
            }
            Resolved::List(id, list) => Ok(self
                .list_entries(*id, list)?
                .into_iter()
                .map(|(index, _)| format!("{}.", index))
                .collect()),
            Resolved::Param(..) => Ok(Vec::new()),
        }
    }

    /// Full names extending `prefix` by one level, matched case-insensitively
    pub fn completions(&self, prefix: &str) -> Vec<String> {
        let (before, last) = match prefix.rfind('.') {
            Some(i) => (&prefix[..i], &prefix[i + 1..]),
            None => ("", prefix),
        };
        let names = match self.resolve(before).and_then(|r| self.child_names(&r)) {
            Ok(names) => names,
            Err(_) => return Vec::new(),
        };
        let needle = last.to_lowercase();
        names
            .into_iter()
            .filter(|name| name.to_lowercase().starts_with(&needle))
            .map(|name| {
                if before.is_empty() {
                    name
                } else {
                    format!("{}.{}", before, name)
                }
            })
            .collect()
    }

    /// Insert a new entry into a list using the registered factory
    pub fn add_export_object(&mut self, path: &str, index: Option<u32>) -> Result<u32> {
        let (id, list) = self.resolve_list(path)?;
        let spec = self
            .schema_of(id)?
            .list(&list)
            .cloned()
            .ok_or_else(|| Error::NotFound(path.to_string()))?;
        if spec.fixed {
            return Err(Error::InvalidState(format!("{} cannot be added to", spec.name)));
        }
        let object = self
            .registry
            .create(&spec.element)
            .ok_or_else(|| Error::InvalidState(format!("no factory for {}", spec.element)))?;
        self.insert_entry(id, &list, index, object)
    }

    /// Remove one list entry and its whole subtree
    pub fn delete_export_object(&mut self, path: &str, index: u32) -> Result<()> {
        let (id, list) = self.resolve_list(path)?;
        if self.schema_of(id)?.list(&list).map_or(true, |l| l.fixed) {
            return Err(Error::InvalidState(format!("{} cannot be deleted from", list)));
        }
        let child = self
            .node_mut(id)?
            .lists
            .get_mut(&list)
            .and_then(|l| l.entries.remove(&index))
            .ok_or_else(|| {
                Error::NotFound(format!("{}.{}", path.trim_end_matches('.'), index))
            })?;
        self.free(child);
        Ok(())
    }

    fn free(&mut self, id: NodeId) {
        let node = match self.nodes.get_mut(id.0).and_then(Option::take) {
            Some(node) => node,
            None => return,
        };
        let children = node
            .objects
            .values()
            .copied()
            .chain(node.lists.values().flat_map(|l| l.entries.values().copied()));
        for child in children.collect::<Vec<_>>() {
            self.free(child);
        }
    }

    /// Check the subtree at `path` against its schemas
    pub fn validate_exports(&self, path: &str) -> Result<()> {
        match self.resolve(path)? {
            Resolved::Object(id) => self.validate_node(id, &object_prefix(path)),
            Resolved::List(id, list) => self.validate_list(id, &list, &object_prefix(path)),
            Resolved::Param(..) => Ok(()),
        }
    }

    fn validate_node(&self, id: NodeId, path: &str) -> Result<()> {
        let node = self.node(id)?;
        let schema = self.schema_of(id)?;
        let here = if path.is_empty() { schema.name.as_str() } else { path };

        schema.check().map_err(|e| match e {
            Error::Schema { reason, .. } => Error::schema(here, reason),
            other => other,
        })?;
        for name in &schema.objects {
            let child = node
                .objects
                .get(name)
                .ok_or_else(|| Error::schema(here, format!("missing child object {}", name)))?;
            self.validate_node(*child, &format!("{}{}.", path, name))?;
        }
        for name in node.objects.keys() {
            if !schema.has_object(name) {
                return Err(Error::schema(here, format!("undeclared child object {}", name)));
            }
        }
        for name in node.lists.keys() {
            if schema.list(name).is_none() {
                return Err(Error::schema(here, format!("undeclared list {}", name)));
            }
        }
        for list in &schema.lists {
            self.validate_list(id, &list.name, &format!("{}{}.", path, list.name))?;
        }
        Ok(())
    }

    fn validate_list(&self, id: NodeId, list: &str, path: &str) -> Result<()> {
        let element = self
            .schema_of(id)?
            .list(list)
            .map(|l| l.element.clone())
            .ok_or_else(|| Error::schema(path, "undeclared list"))?;
        for (index, child) in self.list_entries(id, list)? {
            let entry_path = format!("{}{}.", path, index);
            let found = &self.schema_of(child)?.name;
            if *found != element {
                return Err(Error::schema(
                    &entry_path,
                    format!("entry is {}, expected {}", found, element),
                ));
            }
            self.validate_node(child, &entry_path)?;
        }
        Ok(())
    }

    /// JSON rendering of the whole tree; unreadable parameters become null
    pub fn dump(&mut self, cache: &mut SessionCache) -> Result<serde_json::Value> {
        self.dump_node(self.root, cache)
    }

    fn dump_node(&mut self, id: NodeId, cache: &mut SessionCache) -> Result<serde_json::Value> {
        let mut map = serde_json::Map::new();
        let schema = self.schema_of(id)?;
        let params: Vec<String> = schema.params.iter().map(|p| p.name.clone()).collect();
        let lists: Vec<String> = schema.lists.iter().map(|l| l.name.clone()).collect();
        let objects: Vec<(String, NodeId)> = self
            .node(id)?
            .objects
            .iter()
            .map(|(name, child)| (name.clone(), *child))
            .collect();

        for name in params {
            let value = match self.live_mut(id)?.get_param(&name, cache) {
                Ok(value) => serde_json::Value::from(&value),
                Err(e) => {
                    tracing::warn!(param = %name, error = %e, "Failed to read parameter");
                    serde_json::Value::Null
                }
            };
            map.insert(name, value);
        }
        for (name, child) in objects {
            map.insert(name, self.dump_node(child, cache)?);
        }
        for list in lists {
            let mut entries = serde_json::Map::new();
            self.populate(id, &list, cache)?;
            for (index, child) in self.list_entries(id, &list)? {
                entries.insert(index.to_string(), self.dump_node(child, cache)?);
            }
            map.insert(list, serde_json::Value::Object(entries));
        }
        Ok(serde_json::Value::Object(map))
    }
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("nodes", &self.nodes.iter().filter(|n| n.is_some()).count())
            .field("registry", &self.registry)
            .finish()
    }
}

fn object_prefix(path: &str) -> String {
    let trimmed = path.trim_end_matches('.');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}.", trimmed)
    }
}

/// Read access to the tree for an object running its translator
pub struct CommitContext<'a> {
    tree: &'a Tree,
    node: NodeId,
}

impl<'a> CommitContext<'a> {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn child(&self, name: &str) -> Option<&'a dyn ConfigurableObject> {
        let id = *self.tree.node(self.node).ok()?.objects.get(name)?;
        self.tree.object(id)
    }

    /// Entries of one of the object's lists that are of type `T`
    pub fn entries<T: ConfigurableObject>(&self, list: &str) -> Vec<(u32, &'a T)> {
        let tree = self.tree;
        tree.list_entries(self.node, list)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(index, id)| Some((index, tree.downcast_ref::<T>(id)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{ParamObject, ParamSpec, ParamType};
    use std::sync::Arc;

    fn entry_schema() -> Arc<ObjectSchema> {
        Arc::new(ObjectSchema::new("Sub").with_param(ParamSpec::read_write("Value", ParamType::Int)))
    }

    fn tree() -> Tree {
        let root = ObjectSchema::new("Root")
            .with_param(ParamSpec::read_write("Test", ParamType::String))
            .with_object("Info")
            .with_list("Sub", "Sub");
        let info = ObjectSchema::new("Info")
            .with_param(ParamSpec::read_only("Model", ParamType::String));

        let mut tree = Tree::new(Box::new(ParamObject::new(Arc::new(root))));
        let root_id = tree.root();
        tree.attach_object(
            root_id,
            "Info",
            Box::new(ParamObject::new(Arc::new(info)).with_value("Model", "gfrg200")),
        )
        .unwrap();
        let schema = entry_schema();
        tree.registry_mut()
            .register("Sub", move || Box::new(ParamObject::new(schema.clone())));
        tree
    }

    #[test]
    fn test_resolve() {
        let mut tree = tree();
        let idx = tree.add_export_object("Sub", None).unwrap();
        assert_eq!(idx, 1);

        assert!(matches!(tree.resolve("").unwrap(), Resolved::Object(_)));
        assert!(matches!(tree.resolve("Info.").unwrap(), Resolved::Object(_)));
        assert!(matches!(tree.resolve("Sub").unwrap(), Resolved::List(_, _)));
        assert!(matches!(tree.resolve("Sub.1.Value").unwrap(), Resolved::Param(_, _)));
        assert!(matches!(tree.resolve("Sub.2"), Err(Error::NotFound(_))));
        assert!(matches!(tree.resolve("Test."), Err(Error::NotFound(_))));
        assert!(matches!(tree.resolve("Test.x"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_list_and_rlist() {
        let mut tree = tree();
        let mut cache = SessionCache::new();
        tree.add_export_object("Sub", None).unwrap();

        let names: Vec<String> = tree
            .list_exports("", false, &mut cache)
            .unwrap()
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(names, vec!["Test", "Info.", "Sub."]);

        let rows: Vec<Vec<String>> = tree
            .list_exports("", true, &mut cache)
            .unwrap()
            .into_iter()
            .map(Export::into_row)
            .collect();
        assert_eq!(
            rows,
            vec![
                vec!["Test".to_string(), String::new()],
                vec!["Info.".to_string()],
                vec!["Info.Model".to_string(), "gfrg200".to_string()],
                vec!["Sub.".to_string()],
                vec!["Sub.1.".to_string()],
                vec!["Sub.1.Value".to_string(), "0".to_string()],
            ]
        );
    }

    #[test]
    fn test_add_and_delete() {
        let mut tree = tree();
        assert_eq!(tree.add_export_object("Sub", None).unwrap(), 1);
        assert_eq!(tree.add_export_object("Sub", Some(5)).unwrap(), 5);
        assert_eq!(tree.add_export_object("Sub", None).unwrap(), 6);
        assert!(tree.add_export_object("Sub", Some(5)).is_err());

        let (node, _) = tree.resolve_param("Sub.5.Value").unwrap();
        tree.delete_export_object("Sub.", 5).unwrap();
        assert!(!tree.contains(node));
        assert!(tree.resolve("Sub.5").is_err());
        assert!(matches!(tree.delete_export_object("Sub", 5), Err(Error::NotFound(_))));

        // Indexes are not reissued after a delete
        assert_eq!(tree.add_export_object("Sub", None).unwrap(), 7);
    }

    #[test]
    fn test_add_after_highest_index_is_refused() {
        let mut tree = tree();
        assert_eq!(tree.add_export_object("Sub", Some(u32::MAX)).unwrap(), u32::MAX);
        assert!(matches!(
            tree.add_export_object("Sub", None),
            Err(Error::InvalidState(_))
        ));
        // Explicit free indexes still work
        assert_eq!(tree.add_export_object("Sub", Some(3)).unwrap(), 3);
    }

    #[test]
    fn test_completions() {
        let mut tree = tree();
        tree.add_export_object("Sub", None).unwrap();

        assert_eq!(tree.completions("in"), vec!["Info."]);
        assert_eq!(tree.completions("Info.m"), vec!["Info.Model"]);
        assert_eq!(tree.completions("Sub."), vec!["Sub.1."]);
        assert_eq!(tree.completions("s"), vec!["Sub."]);
        assert!(tree.completions("Nope.x").is_empty());
    }

    #[test]
    fn test_validate() {
        let mut tree = tree();
        tree.add_export_object("Sub", None).unwrap();
        tree.validate_exports("").unwrap();

        // An entry of the wrong schema is reported with its path
        let root = tree.root();
        let wrong = ObjectSchema::new("Other");
        tree.attach_entry(root, "Sub", Some(9), Box::new(ParamObject::new(Arc::new(wrong))))
            .unwrap();
        let err = tree.validate_exports("").unwrap_err();
        assert!(err.to_string().starts_with("Sub.9."));
    }

    #[test]
    fn test_missing_child_object_fails_validation() {
        let schema = ObjectSchema::new("Root").with_object("Info");
        let tree = Tree::new(Box::new(ParamObject::new(Arc::new(schema))));
        assert!(matches!(tree.validate_exports(""), Err(Error::Schema { .. })));
    }

    /// Root whose `Seen` list mirrors a shared list of names
    struct Scanner {
        schema: ObjectSchema,
        names: Arc<std::sync::Mutex<Vec<String>>>,
        state: crate::tree::Snapshot<()>,
    }

    impl ConfigurableObject for Scanner {
        fn schema(&self) -> &ObjectSchema {
            &self.schema
        }

        fn get_param(&mut self, name: &str, _cache: &mut SessionCache) -> Result<ParamValue> {
            Err(Error::NotFound(name.to_string()))
        }

        fn set_param(&mut self, name: &str, _value: &str, _cache: &mut SessionCache) -> Result<()> {
            Err(Error::NotFound(name.to_string()))
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

        fn populate_list(
            &mut self,
            list: &str,
            _cache: &mut SessionCache,
        ) -> Result<Option<Vec<Box<dyn ConfigurableObject>>>> {
            if list != "Seen" {
                return Ok(None);
            }
            let schema = Arc::new(
                ObjectSchema::new("Station")
                    .with_param(ParamSpec::read_only("Name", ParamType::String)),
            );
            let names = self.names.lock().unwrap();
            Ok(Some(
                names
                    .iter()
                    .map(|name| {
                        Box::new(ParamObject::new(schema.clone()).with_value("Name", name.as_str()))
                            as Box<dyn ConfigurableObject>
                    })
                    .collect(),
            ))
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }

    #[test]
    fn test_populated_list_follows_owner_per_session() {
        let names = Arc::new(std::sync::Mutex::new(vec!["a".to_string(), "b".to_string()]));
        let mut tree = Tree::new(Box::new(Scanner {
            schema: ObjectSchema::new("Root").with_populated_list("Seen", "Station"),
            names: names.clone(),
            state: crate::tree::Snapshot::new(()),
        }));
        let mut cache = SessionCache::new();

        let rows: Vec<String> = tree
            .list_exports("Seen.", false, &mut cache)
            .unwrap()
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(rows, vec!["Seen.1.", "Seen.2."]);
        assert_eq!(
            tree.get_export("Seen.2.Name", &mut cache).unwrap(),
            ParamValue::from("b")
        );

        *names.lock().unwrap() = vec!["c".to_string()];
        assert_eq!(
            tree.get_export("Seen.2.Name", &mut cache).unwrap(),
            ParamValue::from("b")
        );

        cache.flush();
        assert_eq!(
            tree.get_export("Seen.1.Name", &mut cache).unwrap(),
            ParamValue::from("c")
        );
        assert!(matches!(
            tree.get_export("Seen.2.Name", &mut cache),
            Err(Error::NotFound(_))
        ));
        assert!(tree.add_export_object("Seen", None).is_err());
        tree.validate_exports("").unwrap();
    }

    #[test]
    fn test_dump() {
        let mut tree = tree();
        let mut cache = SessionCache::new();
        tree.add_export_object("Sub", None).unwrap();
        let json = tree.dump(&mut cache).unwrap();
        assert_eq!(json["Info"]["Model"], "gfrg200");
        assert_eq!(json["Sub"]["1"]["Value"], 0);
    }
}
