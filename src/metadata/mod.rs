//! MetaData graph nodes
//!
//! A [`MetaData`] is one typed element of the live model (object, field,
//! attribute, validator, view, loader). Parents own their children through
//! `Arc`; the parent back-pointer and the `super_data` overload reference are
//! `Weak` so trees drop cleanly when their loader is destroyed.
//!
//! Nodes are mutated only through [`MetaDataContext`], which runs the
//! registry and constraint checks before anything is attached.

pub mod context;

pub use context::MetaDataContext;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock, Weak};

use serde_json::Value;

use crate::registry::TYPE_ATTR;
use crate::sync;
use crate::type_id::MetaDataTypeId;

/// Separator between package and short name, e.g. `acme::User`
pub const PKG_SEPARATOR: &str = "::";

/// Type family of loader roots; excluded from rendered paths
pub const TYPE_LOADER: &str = "loader";

/// Memoised derived value stored on a node
#[derive(Debug, Clone)]
pub enum CachedValue {
    Node(Arc<MetaData>),
    Nodes(Vec<Arc<MetaData>>),
    Text(String),
}

/// One node of the metadata graph
#[derive(Debug)]
pub struct MetaData {
    type_id: MetaDataTypeId,
    name: String,
    package: String,
    short_name: String,
    value: RwLock<Option<Value>>,
    children: RwLock<Vec<Arc<MetaData>>>,
    parent: RwLock<Weak<MetaData>>,
    super_data: RwLock<Option<Weak<MetaData>>>,
    cache: Mutex<HashMap<String, CachedValue>>,
}

impl MetaData {
    pub fn new(type_id: MetaDataTypeId, name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::detached(type_id, name.into(), None))
    }

    /// Node carrying a parsed value; validated when attached
    pub fn with_value(type_id: MetaDataTypeId, name: impl Into<String>, value: Value) -> Arc<Self> {
        Arc::new(Self::detached(type_id, name.into(), Some(value)))
    }

    /// Attribute node, e.g. `MetaData::attribute("string", "pattern", json!("^[a-z]+$"))`
    pub fn attribute(sub_type: &str, name: impl Into<String>, value: Value) -> Arc<Self> {
        Self::with_value(MetaDataTypeId::new(TYPE_ATTR, sub_type), name, value)
    }

    fn detached(type_id: MetaDataTypeId, name: String, value: Option<Value>) -> Self {
        let (package, short_name) = match name.rfind(PKG_SEPARATOR) {
            Some(i) => (
                name[..i].to_string(),
                name[i + PKG_SEPARATOR.len()..].to_string(),
            ),
            None => (String::new(), name.clone()),
        };
        Self {
            type_id,
            name,
            package,
            short_name,
            value: RwLock::new(value),
            children: RwLock::new(Vec::new()),
            parent: RwLock::new(Weak::new()),
            super_data: RwLock::new(None),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn type_id(&self) -> &MetaDataTypeId {
        &self.type_id
    }

    pub fn type_name(&self) -> &str {
        self.type_id.type_name()
    }

    pub fn sub_type(&self) -> &str {
        self.type_id.sub_type()
    }

    pub fn is_type(&self, type_name: &str) -> bool {
        self.type_id.is_type(type_name)
    }

    /// Fully qualified name, including the package
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    pub fn parent(&self) -> Option<Arc<MetaData>> {
        sync::read(&self.parent).upgrade()
    }

    pub(crate) fn set_parent(&self, parent: &Arc<MetaData>) {
        *sync::write(&self.parent) = Arc::downgrade(parent);
    }

    pub(crate) fn clear_parent(&self) {
        *sync::write(&self.parent) = Weak::new();
    }

    /// The node this one overloads, if any and still alive
    pub fn super_data(&self) -> Option<Arc<MetaData>> {
        sync::read(&self.super_data).as_ref().and_then(Weak::upgrade)
    }

    pub fn has_super_data(&self) -> bool {
        self.super_data().is_some()
    }

    pub(crate) fn set_super_data(&self, origin: &Arc<MetaData>) {
        *sync::write(&self.super_data) = Some(Arc::downgrade(origin));
    }

    pub fn value(&self) -> Option<Value> {
        sync::read(&self.value).clone()
    }

    /// Value as text; strings are returned without quotes
    pub fn value_as_string(&self) -> Option<String> {
        self.value().map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        })
    }

    pub(crate) fn store_value(&self, value: Value) {
        *sync::write(&self.value) = Some(value);
    }

    /// Own children in insertion order
    pub fn children(&self) -> Vec<Arc<MetaData>> {
        sync::read(&self.children).clone()
    }

    /// Own children followed by inherited ones from the super chain that
    /// this node does not override by `(type, name)`
    pub fn all_children(&self) -> Vec<Arc<MetaData>> {
        let mut result = self.children();
        if let Some(origin) = self.super_data() {
            for inherited in origin.all_children() {
                let overridden = result
                    .iter()
                    .any(|c| c.type_name() == inherited.type_name() && c.name() == inherited.name());
                if !overridden {
                    result.push(inherited);
                }
            }
        }
        result
    }

    /// Children of one type family, own first then inherited
    pub fn children_of_type(&self, type_name: &str, include_super: bool) -> Vec<Arc<MetaData>> {
        let candidates = if include_super {
            self.all_children()
        } else {
            self.children()
        };
        candidates.into_iter().filter(|c| c.is_type(type_name)).collect()
    }

    /// Child by type family and name, falling back to the super chain
    pub fn child_of_type(&self, type_name: &str, name: &str) -> Option<Arc<MetaData>> {
        let own = sync::read(&self.children)
            .iter()
            .find(|c| c.is_type(type_name) && c.name() == name)
            .cloned();
        own.or_else(|| self.super_data().and_then(|s| s.child_of_type(type_name, name)))
    }

    pub fn has_child(&self, type_name: &str, name: &str) -> bool {
        self.child_of_type(type_name, name).is_some()
    }

    /// Attribute child by name, including inherited attributes
    pub fn attr(&self, name: &str) -> Option<Arc<MetaData>> {
        self.child_of_type(TYPE_ATTR, name)
    }

    pub fn attr_value(&self, name: &str) -> Option<Value> {
        self.attr(name).and_then(|a| a.value())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    pub(crate) fn push_child(&self, child: Arc<MetaData>) {
        sync::write(&self.children).push(child);
        self.flush_caches();
    }

    /// Remove an own child by type family and name
    pub fn remove_child(&self, type_name: &str, name: &str) -> Option<Arc<MetaData>> {
        let removed = {
            let mut children = sync::write(&self.children);
            let index = children
                .iter()
                .position(|c| c.is_type(type_name) && c.name() == name)?;
            children.remove(index)
        };
        removed.clear_parent();
        self.flush_caches();
        Some(removed)
    }

    /// Detach every own child
    pub fn clear_children(&self) {
        let removed = std::mem::take(&mut *sync::write(&self.children));
        for child in &removed {
            child.clear_parent();
        }
        self.flush_caches();
    }

    /// Derived copy whose `super_data` is this node.
    ///
    /// The copy starts with no own children; everything the origin holds is
    /// still visible through [`MetaData::all_children`].
    pub fn overload(self: &Arc<Self>) -> Arc<MetaData> {
        self.derive(self.name.clone())
    }

    /// Like [`MetaData::overload`] but under a new name, as an object that
    /// extends another
    pub fn derive(self: &Arc<Self>, name: impl Into<String>) -> Arc<MetaData> {
        let copy = Arc::new(Self::detached(self.type_id.clone(), name.into(), self.value()));
        copy.set_super_data(self);
        copy
    }

    /// Hierarchical path such as `acme::User.username.pattern`; the loader
    /// root is left out
    pub fn path(&self) -> String {
        let mut segments = vec![self.name.clone()];
        let mut current = self.parent();
        while let Some(node) = current {
            if !node.is_type(TYPE_LOADER) {
                segments.push(node.name.clone());
            }
            current = node.parent();
        }
        segments.reverse();
        segments.join(".")
    }

    /// Path a child called `name` would have under this node
    pub fn child_path(&self, name: &str) -> String {
        if self.is_type(TYPE_LOADER) {
            name.to_string()
        } else {
            format!("{}.{}", self.path(), name)
        }
    }

    /// Cached lookup; `compute` runs under the node's cache lock so
    /// concurrent callers fill each key once
    pub fn cached<F>(&self, key: &str, compute: F) -> Option<CachedValue>
    where
        F: FnOnce() -> Option<CachedValue>,
    {
        let mut cache = sync::lock(&self.cache);
        if let Some(hit) = cache.get(key) {
            return Some(hit.clone());
        }
        let value = compute()?;
        cache.insert(key.to_string(), value.clone());
        Some(value)
    }

    pub fn cache_value(&self, key: &str) -> Option<CachedValue> {
        sync::lock(&self.cache).get(key).cloned()
    }

    pub fn set_cache_value(&self, key: impl Into<String>, value: CachedValue) {
        sync::lock(&self.cache).insert(key.into(), value);
    }

    /// Drop memoised values on this node
    pub fn flush_caches(&self) {
        sync::lock(&self.cache).clear();
    }

    /// Number of nodes in this subtree, this one included
    pub fn node_count(&self) -> usize {
        1 + self
            .children()
            .iter()
            .map(|c| c.node_count())
            .sum::<usize>()
    }
}

impl fmt::Display for MetaData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MetaData[{}:{}]{{{}}}",
            self.type_name(),
            self.sub_type(),
            self.name
        )?;
        if let Some(parent) = self.parent() {
            write!(f, "@{}", parent.name())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(t: &str, s: &str, name: &str) -> Arc<MetaData> {
        MetaData::new(MetaDataTypeId::new(t, s), name)
    }

    fn attach(parent: &Arc<MetaData>, child: &Arc<MetaData>) {
        child.set_parent(parent);
        parent.push_child(Arc::clone(child));
    }

    #[test]
    fn test_package_split() {
        let user = node("object", "pojo", "acme::model::User");
        assert_eq!(user.package(), "acme::model");
        assert_eq!(user.short_name(), "User");

        let plain = node("object", "pojo", "User");
        assert_eq!(plain.package(), "");
        assert_eq!(plain.short_name(), "User");
    }

    #[test]
    fn test_path_skips_loader_root() {
        let root = node("loader", "manual", "test");
        let user = node("object", "pojo", "acme::User");
        let field = node("field", "string", "username");
        attach(&root, &user);
        attach(&user, &field);

        assert_eq!(field.path(), "acme::User.username");
        assert_eq!(root.path(), "test");
        assert_eq!(field.to_string(), "MetaData[field:string]{username}@acme::User");
    }

    #[test]
    fn test_child_path_matches_attached_path() {
        let root = node("loader", "manual", "test");
        let user = node("object", "pojo", "acme::User");
        assert_eq!(root.child_path("acme::User"), "acme::User");

        attach(&root, &user);
        assert_eq!(user.child_path("email"), "acme::User.email");
        let email = node("field", "string", "email");
        attach(&user, &email);
        assert_eq!(email.path(), user.child_path("email"));
    }

    #[test]
    fn test_overload_sees_origin_children() {
        let origin = node("field", "string", "email");
        attach(&origin, &MetaData::attribute("int", "maxLength", json!(50)));

        let derived = origin.overload();
        assert!(derived.children().is_empty());
        assert_eq!(derived.attr_value("maxLength"), Some(json!(50)));

        attach(&derived, &MetaData::attribute("int", "maxLength", json!(80)));
        assert_eq!(derived.attr_value("maxLength"), Some(json!(80)));
        assert_eq!(derived.all_children().len(), 1);
    }

    #[test]
    fn test_derive_renames_and_chains() {
        let person = node("object", "pojo", "acme::Person");
        attach(&person, &node("field", "string", "name"));

        let employee = person.derive("acme::Employee");
        assert_eq!(employee.short_name(), "Employee");
        assert!(Arc::ptr_eq(&employee.super_data().unwrap(), &person));
        assert!(employee.child_of_type("field", "name").is_some());
        assert!(employee.children_of_type("field", false).is_empty());
    }

    #[test]
    fn test_cache_is_flushed_on_mutation() {
        let parent = node("object", "pojo", "User");
        let hit = parent.cached("count", || Some(CachedValue::Text("0".into())));
        assert!(matches!(hit, Some(CachedValue::Text(ref t)) if t == "0"));
        assert!(parent.cache_value("count").is_some());

        attach(&parent, &node("field", "int", "id"));
        assert!(parent.cache_value("count").is_none());
    }

    #[test]
    fn test_clear_children_detaches() {
        let parent = node("object", "pojo", "User");
        let child = node("field", "int", "id");
        attach(&parent, &child);
        parent.clear_children();
        assert!(parent.children().is_empty());
        assert!(child.parent().is_none());
        assert!(parent.remove_child("field", "id").is_none());
    }
}
