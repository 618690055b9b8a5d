//! Type definitions
//!
//! A [`TypeDefinition`] is the rule-set registered for one `(type, subType)`:
//! attribute requirements, structural child patterns and the parents the type
//! accepts. [`EffectiveDefinition`] is the same rule-set flattened along the
//! inheritance chain.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::type_id::{Matcher, MetaDataTypeId, TypePattern};

/// Type name used for attribute nodes
pub const TYPE_ATTR: &str = "attr";

/// Shape an attribute value must have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    #[default]
    Single,
    Array,
    Set,
    Map,
}

impl Cardinality {
    /// Whether `value` has this shape; `null` always passes
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (Cardinality::Single, v) => !v.is_array() && !v.is_object(),
            (Cardinality::Array, v) => v.is_array(),
            (Cardinality::Set, Value::Array(items)) => items
                .iter()
                .enumerate()
                .all(|(i, item)| !items[..i].contains(item)),
            (Cardinality::Set, _) => false,
            (Cardinality::Map, v) => v.is_object(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Cardinality::Single => "single",
            Cardinality::Array => "array",
            Cardinality::Set => "set",
            Cardinality::Map => "map",
        }
    }
}

/// A named attribute a type declares
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRequirement {
    pub name: String,
    /// Subtype of the `attr` node carrying the value
    pub sub_type: String,
    pub required: bool,
    pub cardinality: Cardinality,
}

impl AttributeRequirement {
    pub fn new(name: impl Into<String>, sub_type: &str, required: bool, cardinality: Cardinality) -> Self {
        Self {
            name: name.into(),
            sub_type: sub_type.trim().to_lowercase(),
            required,
            cardinality,
        }
    }

    /// Whether an `attr` child with this id and name satisfies the requirement
    pub fn matches(&self, child: &MetaDataTypeId, name: &str) -> bool {
        child.is_type(TYPE_ATTR) && name == self.name && Matcher::parse_type(&self.sub_type).matches(child.sub_type())
    }

    /// The structural child pattern this attribute implies
    pub fn as_child(&self) -> ChildRequirement {
        ChildRequirement {
            name: Matcher::exact(&self.name),
            type_name: Matcher::exact(TYPE_ATTR),
            sub_type: Matcher::parse_type(&self.sub_type),
            required: self.required,
        }
    }
}

/// Structural child pattern `(name|*, type|*, subType|*)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChildRequirement {
    pub name: Matcher,
    pub type_name: Matcher,
    pub sub_type: Matcher,
    pub required: bool,
}

impl ChildRequirement {
    pub fn optional(type_name: &str, sub_type: &str, name: &str) -> Self {
        Self::new(type_name, sub_type, name, false)
    }

    pub fn required(type_name: &str, sub_type: &str, name: &str) -> Self {
        Self::new(type_name, sub_type, name, true)
    }

    fn new(type_name: &str, sub_type: &str, name: &str, required: bool) -> Self {
        Self {
            name: Matcher::parse(name),
            type_name: Matcher::parse_type(type_name),
            sub_type: Matcher::parse_type(sub_type),
            required,
        }
    }

    /// Merge key: `name:type:subType`
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.name, self.type_name, self.sub_type)
    }

    pub fn matches(&self, child: &MetaDataTypeId, name: &str) -> bool {
        self.type_name.matches(child.type_name())
            && self.sub_type.matches(child.sub_type())
            && self.name.matches(name)
    }

    pub fn is_wildcard(&self) -> bool {
        self.name.is_any() || self.type_name.is_any() || self.sub_type.is_any()
    }

    pub fn pattern(&self) -> TypePattern {
        TypePattern {
            type_name: self.type_name.clone(),
            sub_type: self.sub_type.clone(),
            name: self.name.clone(),
        }
    }

    /// e.g. `optional attribute 'pattern' of type string`
    pub fn description(&self) -> String {
        let mut desc = String::from(if self.required { "required" } else { "optional" });
        desc.push_str(match self.type_name.value() {
            Some(TYPE_ATTR) => " attribute",
            Some("field") => " field",
            _ => " child",
        });
        if let Matcher::Exact(name) = &self.name {
            desc.push_str(&format!(" '{}'", name));
        }
        match (&self.type_name, &self.sub_type) {
            (Matcher::Any, Matcher::Any) => {}
            (Matcher::Any, Matcher::Exact(sub)) => desc.push_str(&format!(" of subtype {}", sub)),
            (t, s) if matches!(t.value(), Some(TYPE_ATTR) | Some("field")) => {
                if let Matcher::Exact(sub) = s {
                    desc.push_str(&format!(" of type {}", sub));
                }
            }
            (t, s) => desc.push_str(&format!(" of type {}.{}", t, s)),
        }
        desc
    }
}

/// Declaration on a child type naming the parents it can live under
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParentAcceptance {
    pub parent: TypePattern,
    /// Name the child must carry for the acceptance to apply
    pub child_name: Matcher,
}

impl ParentAcceptance {
    pub fn accepts(&self, parent: &MetaDataTypeId, child_name: &str) -> bool {
        self.parent.matches_type(parent) && self.child_name.matches(child_name)
    }
}

/// Registered rule-set for one `(type, subType)`
#[derive(Debug, Clone, Serialize)]
pub struct TypeDefinition {
    id: MetaDataTypeId,
    description: String,
    parent: Option<MetaDataTypeId>,
    attributes: Vec<AttributeRequirement>,
    children: Vec<ChildRequirement>,
    accepts_parents: Vec<ParentAcceptance>,
    /// Number of merges applied since the first registration
    revision: u32,
}

impl TypeDefinition {
    pub fn id(&self) -> &MetaDataTypeId {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parent(&self) -> Option<&MetaDataTypeId> {
        self.parent.as_ref()
    }

    pub fn attributes(&self) -> &[AttributeRequirement] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeRequirement> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn children(&self) -> &[ChildRequirement] {
        &self.children
    }

    pub fn accepts_parents(&self) -> &[ParentAcceptance] {
        &self.accepts_parents
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    /// Merge a later registration of the same id into this one.
    ///
    /// Requirements are unioned by key. A duplicate key only updates
    /// requiredness and cardinality (latest wins); nothing is removed.
    /// A later parent only fills an absent one; a conflicting parent is
    /// ignored and returned to the caller.
    pub(crate) fn merge(&mut self, other: TypeDefinition) -> Option<MetaDataTypeId> {
        let mut ignored_parent = None;

        if !other.description.is_empty() {
            self.description = other.description;
        }

        match (&self.parent, other.parent) {
            (None, Some(parent)) => self.parent = Some(parent),
            (Some(existing), Some(parent)) if *existing != parent => ignored_parent = Some(parent),
            _ => {}
        }

        for attr in other.attributes {
            upsert_attribute(&mut self.attributes, attr, false);
        }
        for child in other.children {
            upsert_child(&mut self.children, child);
        }
        for acceptance in other.accepts_parents {
            if !self.accepts_parents.contains(&acceptance) {
                self.accepts_parents.push(acceptance);
            }
        }

        self.revision += 1;
        ignored_parent
    }
}

fn upsert_attribute(attributes: &mut Vec<AttributeRequirement>, attr: AttributeRequirement, replace: bool) {
    match attributes.iter_mut().find(|a| a.name == attr.name) {
        Some(existing) if replace => *existing = attr,
        Some(existing) => {
            existing.required = attr.required;
            existing.cardinality = attr.cardinality;
        }
        None => attributes.push(attr),
    }
}

fn upsert_child(children: &mut Vec<ChildRequirement>, child: ChildRequirement) {
    let key = child.key();
    match children.iter_mut().find(|c| c.key() == key) {
        Some(existing) => existing.required = child.required,
        None => children.push(child),
    }
}

/// Fluent builder handed to `register_type`
#[derive(Debug, Clone)]
pub struct TypeDefinitionBuilder {
    id: MetaDataTypeId,
    description: String,
    parent: Option<MetaDataTypeId>,
    attributes: Vec<AttributeRequirement>,
    children: Vec<ChildRequirement>,
    accepts_parents: Vec<ParentAcceptance>,
}

impl TypeDefinitionBuilder {
    pub fn new(id: MetaDataTypeId) -> Self {
        Self {
            id,
            description: String::new(),
            parent: None,
            attributes: Vec::new(),
            children: Vec::new(),
            accepts_parents: Vec::new(),
        }
    }

    pub fn id(&self) -> &MetaDataTypeId {
        &self.id
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn inherits_from(mut self, type_name: &str, sub_type: &str) -> Self {
        self.parent = Some(MetaDataTypeId::new(type_name, sub_type));
        self
    }

    /// Inherit from the `base` subtype of the same family
    pub fn inherits_from_base(mut self) -> Self {
        self.parent = Some(self.id.base());
        self
    }

    pub fn attribute(mut self, name: &str, sub_type: &str, required: bool, cardinality: Cardinality) -> Self {
        upsert_attribute(
            &mut self.attributes,
            AttributeRequirement::new(name, sub_type, required, cardinality),
            true,
        );
        self
    }

    pub fn optional_attribute(self, name: &str, sub_type: &str) -> Self {
        self.attribute(name, sub_type, false, Cardinality::Single)
    }

    pub fn required_attribute(self, name: &str, sub_type: &str) -> Self {
        self.attribute(name, sub_type, true, Cardinality::Single)
    }

    pub fn child(mut self, requirement: ChildRequirement) -> Self {
        upsert_child(&mut self.children, requirement);
        self
    }

    pub fn optional_child(self, type_name: &str, sub_type: &str, name: &str) -> Self {
        self.child(ChildRequirement::optional(type_name, sub_type, name))
    }

    pub fn required_child(self, type_name: &str, sub_type: &str, name: &str) -> Self {
        self.child(ChildRequirement::required(type_name, sub_type, name))
    }

    /// Shorthand for `optional_child("attr", sub_type, "*")`
    pub fn accepts_attributes(self, sub_type: &str) -> Self {
        self.optional_child(TYPE_ATTR, sub_type, "*")
    }

    pub fn accepts_parent(self, type_name: &str, sub_type: &str) -> Self {
        self.accepts_named_parent(type_name, sub_type, "*")
    }

    pub fn accepts_named_parent(mut self, type_name: &str, sub_type: &str, child_name: &str) -> Self {
        let acceptance = ParentAcceptance {
            parent: TypePattern::of(type_name, sub_type, "*"),
            child_name: Matcher::parse(child_name),
        };
        if !self.accepts_parents.contains(&acceptance) {
            self.accepts_parents.push(acceptance);
        }
        self
    }

    pub fn build(self) -> TypeDefinition {
        TypeDefinition {
            id: self.id,
            description: self.description,
            parent: self.parent,
            attributes: self.attributes,
            children: self.children,
            accepts_parents: self.accepts_parents,
            revision: 0,
        }
    }
}

/// Requirements of a type flattened along its inheritance chain
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveDefinition {
    id: MetaDataTypeId,
    /// The type itself first, then each ancestor
    lineage: Vec<MetaDataTypeId>,
    description: String,
    attributes: Vec<AttributeRequirement>,
    children: Vec<ChildRequirement>,
    accepts_parents: Vec<ParentAcceptance>,
}

impl EffectiveDefinition {
    /// Flatten `chain` (most-derived first); later entries are ancestors
    pub(crate) fn flatten(chain: &[&TypeDefinition]) -> Option<Self> {
        let most_derived = chain.first()?;
        let mut effective = Self {
            id: most_derived.id.clone(),
            lineage: chain.iter().map(|d| d.id.clone()).collect(),
            description: most_derived.description.clone(),
            attributes: Vec::new(),
            children: Vec::new(),
            accepts_parents: Vec::new(),
        };

        // root ancestor first so that derived declarations override in place
        for def in chain.iter().rev() {
            for attr in &def.attributes {
                upsert_attribute(&mut effective.attributes, attr.clone(), true);
            }
            for child in &def.children {
                upsert_child(&mut effective.children, child.clone());
            }
            for acceptance in &def.accepts_parents {
                if !effective.accepts_parents.contains(acceptance) {
                    effective.accepts_parents.push(acceptance.clone());
                }
            }
        }
        Some(effective)
    }

    pub fn id(&self) -> &MetaDataTypeId {
        &self.id
    }

    pub fn lineage(&self) -> &[MetaDataTypeId] {
        &self.lineage
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Whether `ancestor` is this type or one of its ancestors
    pub fn inherits(&self, ancestor: &MetaDataTypeId) -> bool {
        self.lineage.contains(ancestor)
    }

    pub fn attributes(&self) -> &[AttributeRequirement] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeRequirement> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn children(&self) -> &[ChildRequirement] {
        &self.children
    }

    pub fn accepts_parents(&self) -> &[ParentAcceptance] {
        &self.accepts_parents
    }

    /// The requirement allowing a child, most specific first: attributes,
    /// then named child patterns, then wildcard patterns.
    pub fn child_requirement_for(&self, child: &MetaDataTypeId, name: &str) -> Option<ChildRequirement> {
        if let Some(attr) = self.attributes.iter().find(|a| a.matches(child, name)) {
            return Some(attr.as_child());
        }
        self.children
            .iter()
            .filter(|c| !c.name.is_any())
            .chain(self.children.iter().filter(|c| c.name.is_any()))
            .find(|c| c.matches(child, name))
            .cloned()
    }

    pub fn accepts_child(&self, child: &MetaDataTypeId, name: &str) -> bool {
        self.child_requirement_for(child, name).is_some()
    }

    /// Whether this (child) type declares it can live under `parent`
    pub fn accepts_parent(&self, parent: &MetaDataTypeId, child_name: &str) -> bool {
        self.accepts_parents.iter().any(|a| a.accepts(parent, child_name))
    }

    /// Required attributes and named required children not satisfied by
    /// `present` (type id and name of each existing child)
    pub fn missing_required(&self, present: &[(MetaDataTypeId, String)]) -> Vec<String> {
        let mut missing = Vec::new();
        for attr in self.attributes.iter().filter(|a| a.required) {
            if !present.iter().any(|(id, name)| attr.matches(id, name)) {
                missing.push(attr.as_child().description());
            }
        }
        // a wildcard name can never be "missing"
        for child in self.children.iter().filter(|c| c.required && !c.name.is_any()) {
            if !present.iter().any(|(id, name)| child.matches(id, name)) {
                missing.push(child.description());
            }
        }
        missing
    }

    /// e.g. `Supports: optional attribute 'pattern' of type string, ...`
    pub fn supported_children_description(&self) -> String {
        if self.attributes.is_empty() && self.children.is_empty() {
            return "No children supported".to_string();
        }
        let parts: Vec<String> = self
            .attributes
            .iter()
            .map(|a| a.as_child().description())
            .chain(self.children.iter().map(|c| c.description()))
            .collect();
        format!("Supports: {}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(t: &str, s: &str) -> MetaDataTypeId {
        MetaDataTypeId::new(t, s)
    }

    #[test]
    fn test_cardinality_shapes() {
        assert!(Cardinality::Single.accepts(&json!("x")));
        assert!(!Cardinality::Single.accepts(&json!(["x"])));
        assert!(Cardinality::Array.accepts(&json!(["a", "a"])));
        assert!(!Cardinality::Set.accepts(&json!(["a", "a"])));
        assert!(Cardinality::Set.accepts(&json!(["a", "b"])));
        assert!(Cardinality::Map.accepts(&json!({"k": 1})));
        assert!(Cardinality::Map.accepts(&Value::Null));
    }

    #[test]
    fn test_child_requirement_description() {
        let req = ChildRequirement::optional("attr", "string", "pattern");
        assert_eq!(req.description(), "optional attribute 'pattern' of type string");
        let any = ChildRequirement::required("validator", "*", "*");
        assert_eq!(any.description(), "required child of type validator.*");
    }

    #[test]
    fn test_merge_keeps_entries_and_updates_requiredness() {
        let mut base = TypeDefinitionBuilder::new(id("field", "base"))
            .optional_attribute("dbColumn", "string")
            .optional_child("validator", "*", "*")
            .build();
        let extension = TypeDefinitionBuilder::new(id("field", "base"))
            .attribute("dbColumn", "string", true, Cardinality::Array)
            .optional_attribute("isSearchable", "boolean")
            .build();

        base.merge(extension);

        assert_eq!(base.attributes().len(), 2);
        let col = base.attribute("dbColumn").unwrap();
        assert!(col.required);
        assert_eq!(col.cardinality, Cardinality::Array);
        assert_eq!(base.children().len(), 1);
        assert_eq!(base.revision(), 1);
    }

    #[test]
    fn test_merge_only_fills_absent_parent() {
        let mut string = TypeDefinitionBuilder::new(id("field", "string")).build();
        let filled = string.merge(TypeDefinitionBuilder::new(id("field", "string")).inherits_from_base().build());
        assert_eq!(filled, None);
        assert_eq!(string.parent(), Some(&id("field", "base")));

        let conflicting = TypeDefinitionBuilder::new(id("field", "string"))
            .inherits_from("field", "text")
            .build();
        assert_eq!(string.merge(conflicting), Some(id("field", "text")));
        assert_eq!(string.parent(), Some(&id("field", "base")));
    }

    #[test]
    fn test_flatten_most_derived_wins() {
        let parent = TypeDefinitionBuilder::new(id("field", "base"))
            .required_attribute("label", "string")
            .optional_child("validator", "*", "*")
            .build();
        let child = TypeDefinitionBuilder::new(id("field", "string"))
            .inherits_from_base()
            .optional_attribute("label", "string")
            .optional_attribute("maxLength", "int")
            .build();

        let effective = EffectiveDefinition::flatten(&[&child, &parent]).unwrap();
        assert_eq!(effective.lineage(), &[id("field", "string"), id("field", "base")]);
        assert!(!effective.attribute("label").unwrap().required);
        assert!(effective.accepts_child(&id("validator", "required"), "required"));
        assert!(effective.accepts_child(&id("attr", "int"), "maxLength"));
        assert!(!effective.accepts_child(&id("attr", "int"), "minLength"));
    }

    #[test]
    fn test_missing_required_ignores_wildcards() {
        let def = TypeDefinitionBuilder::new(id("object", "base"))
            .required_attribute("table", "string")
            .required_child("key", "primary", "pk")
            .required_child("field", "*", "*")
            .build();
        let effective = EffectiveDefinition::flatten(&[&def]).unwrap();
        let missing = effective.missing_required(&[(id("attr", "string"), "table".to_string())]);
        assert_eq!(missing, vec!["required child 'pk' of type key.primary".to_string()]);
    }
}
