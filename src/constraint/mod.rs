//! Constraint Registry
//!
//! Two constraint families are evaluated against graph mutations:
//!
//! - **Placement** constraints decide whether a child may be attached under a
//!   parent. An *allow* constraint widens what the parent's structural child
//!   requirements accept; a *forbid* constraint vetoes a placement outright.
//! - **Validation** constraints decide whether a node's value (or name) is
//!   acceptable.
//!
//! Constraints are side-effect free. Evaluation runs in registration order
//! so the reported violation is reproducible.

pub mod builtin;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, RwLock};

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{MetaDataError, Result};
use crate::metadata::{MetaData, PKG_SEPARATOR};
use crate::registry::EffectiveDefinition;
use crate::sync;
use crate::type_id::TypePattern;

/// Constraint id reported when no structural rule or allow constraint
/// accepts a placement
pub const STRUCTURAL_PLACEMENT_ID: &str = "placement.structural";

const IDENTIFIER_PATTERN: &str = "^[a-zA-Z][a-zA-Z0-9_]*$";

type NodePredicate = Arc<dyn Fn(&MetaData) -> bool + Send + Sync>;
type ValuePredicate = Arc<dyn Fn(&MetaData, &Value) -> bool + Send + Sync>;

/// Selects the nodes a constraint applies to
#[derive(Clone)]
pub enum NodeMatcher {
    Pattern(TypePattern),
    Custom(NodePredicate),
}

impl NodeMatcher {
    pub fn pattern(pattern: &str) -> Result<Self> {
        Ok(NodeMatcher::Pattern(TypePattern::parse(pattern)?))
    }

    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&MetaData) -> bool + Send + Sync + 'static,
    {
        NodeMatcher::Custom(Arc::new(predicate))
    }

    pub fn matches(&self, node: &MetaData) -> bool {
        match self {
            NodeMatcher::Pattern(p) => p.matches(node.type_id(), node.name()),
            NodeMatcher::Custom(f) => f(node),
        }
    }
}

impl fmt::Debug for NodeMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for NodeMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeMatcher::Pattern(p) => write!(f, "{}", p),
            NodeMatcher::Custom(_) => f.write_str("<custom>"),
        }
    }
}

/// What a validation constraint inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationTarget {
    Value,
    Name,
}

/// Value check of a validation constraint
#[derive(Clone)]
pub enum ValueCheck {
    Enumeration { values: BTreeSet<String>, ignore_case: bool },
    Regex(Regex),
    Length { min: Option<usize>, max: Option<usize> },
    /// Identifier, optionally package-qualified with `::`
    Identifier { regex: Regex, allow_package: bool },
    /// Text must itself compile as a regular expression
    CompilesAsRegex,
    Custom(ValuePredicate),
}

impl ValueCheck {
    fn accepts(&self, node: &MetaData, value: &Value) -> bool {
        if let ValueCheck::Custom(f) = self {
            return f(node, value);
        }
        value_texts(value).iter().all(|text| self.accepts_text(text))
    }

    fn accepts_text(&self, text: &str) -> bool {
        match self {
            ValueCheck::Enumeration { values, ignore_case: false } => values.contains(text),
            ValueCheck::Enumeration { values, ignore_case: true } => {
                values.iter().any(|v| v.eq_ignore_ascii_case(text))
            }
            ValueCheck::Regex(regex) => regex.is_match(text),
            ValueCheck::Length { min, max } => {
                let len = text.chars().count();
                min.map_or(true, |m| len >= m) && max.map_or(true, |m| len <= m)
            }
            ValueCheck::Identifier { regex, allow_package } => {
                if *allow_package && text.contains(PKG_SEPARATOR) {
                    text.split(PKG_SEPARATOR).all(|part| regex.is_match(part))
                } else {
                    regex.is_match(text)
                }
            }
            ValueCheck::CompilesAsRegex => text.is_empty() || Regex::new(text).is_ok(),
            ValueCheck::Custom(_) => true,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ValueCheck::Enumeration { .. } => "enumeration",
            ValueCheck::Regex(_) => "regex",
            ValueCheck::Length { .. } => "length",
            ValueCheck::Identifier { .. } => "identifier",
            ValueCheck::CompilesAsRegex => "regex-syntax",
            ValueCheck::Custom(_) => "custom",
        }
    }
}

impl fmt::Debug for ValueCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueCheck::Enumeration { values, .. } => write!(f, "Enumeration({:?})", values),
            ValueCheck::Regex(regex) => write!(f, "Regex({})", regex.as_str()),
            ValueCheck::Length { min, max } => write!(f, "Length({:?}..={:?})", min, max),
            other => f.write_str(other.kind()),
        }
    }
}

/// Text forms checked for a value; arrays check every element, null none
fn value_texts(value: &Value) -> Vec<String> {
    match value {
        Value::Null => Vec::new(),
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items.iter().flat_map(value_texts).collect(),
        Value::Object(map) => map.values().flat_map(value_texts).collect(),
        other => vec![other.to_string()],
    }
}

/// Placement or validation rule
#[derive(Debug, Clone)]
pub enum ConstraintKind {
    Placement {
        parent: NodeMatcher,
        child: NodeMatcher,
        allowed: bool,
    },
    Validation {
        applies_to: NodeMatcher,
        target: ValidationTarget,
        check: ValueCheck,
    },
}

/// A registered constraint with a stable id
#[derive(Debug, Clone)]
pub struct Constraint {
    id: String,
    description: String,
    kind: ConstraintKind,
}

impl Constraint {
    pub fn new(id: impl Into<String>, description: impl Into<String>, kind: ConstraintKind) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            kind,
        }
    }

    /// Allow children matching `child` under parents matching `parent`,
    /// e.g. `placement("field.required.placement", "...", "field.*", "attr.boolean[required]")`
    pub fn placement(id: &str, description: &str, parent: &str, child: &str) -> Result<Self> {
        Ok(Self::new(
            id,
            description,
            ConstraintKind::Placement {
                parent: NodeMatcher::pattern(parent)?,
                child: NodeMatcher::pattern(child)?,
                allowed: true,
            },
        ))
    }

    /// Forbid children matching `child` under parents matching `parent`
    pub fn forbid(id: &str, description: &str, parent: &str, child: &str) -> Result<Self> {
        Ok(Self::new(
            id,
            description,
            ConstraintKind::Placement {
                parent: NodeMatcher::pattern(parent)?,
                child: NodeMatcher::pattern(child)?,
                allowed: false,
            },
        ))
    }

    /// Value validation with an arbitrary predicate
    pub fn validation<F>(id: &str, description: &str, applies_to: NodeMatcher, validator: F) -> Self
    where
        F: Fn(&MetaData, &Value) -> bool + Send + Sync + 'static,
    {
        Self::value_check(id, description, applies_to, ValueCheck::Custom(Arc::new(validator)))
    }

    /// Value must be one of `values`
    pub fn enumeration(id: &str, description: &str, applies_to: &str, values: &[&str]) -> Result<Self> {
        Ok(Self::value_check(
            id,
            description,
            NodeMatcher::pattern(applies_to)?,
            ValueCheck::Enumeration {
                values: values.iter().map(|v| v.to_string()).collect(),
                ignore_case: false,
            },
        ))
    }

    /// Value must match `regex`
    pub fn regex(id: &str, description: &str, applies_to: &str, regex: &str) -> Result<Self> {
        Ok(Self::value_check(
            id,
            description,
            NodeMatcher::pattern(applies_to)?,
            ValueCheck::Regex(Regex::new(regex)?),
        ))
    }

    /// Value length in characters must be within bounds
    pub fn length(
        id: &str,
        description: &str,
        applies_to: &str,
        min: Option<usize>,
        max: Option<usize>,
    ) -> Result<Self> {
        Ok(Self::value_check(
            id,
            description,
            NodeMatcher::pattern(applies_to)?,
            ValueCheck::Length { min, max },
        ))
    }

    /// Node names must be identifiers; `allow_package` accepts `a::b::C`
    pub fn identifier(id: &str, description: &str, applies_to: &str, allow_package: bool) -> Result<Self> {
        Ok(Self::new(
            id,
            description,
            ConstraintKind::Validation {
                applies_to: NodeMatcher::pattern(applies_to)?,
                target: ValidationTarget::Name,
                check: ValueCheck::Identifier {
                    regex: Regex::new(IDENTIFIER_PATTERN)?,
                    allow_package,
                },
            },
        ))
    }

    fn child_matcher(&self) -> String {
        match &self.kind {
            ConstraintKind::Placement { child, .. } => child.to_string(),
            ConstraintKind::Validation { applies_to, .. } => applies_to.to_string(),
        }
    }

    /// Value validation with any [`ValueCheck`]
    pub fn value_check(id: &str, description: &str, applies_to: NodeMatcher, check: ValueCheck) -> Self {
        Self::new(
            id,
            description,
            ConstraintKind::Validation {
                applies_to,
                target: ValidationTarget::Value,
                check,
            },
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn kind(&self) -> &ConstraintKind {
        &self.kind
    }

    pub fn is_placement(&self) -> bool {
        matches!(self.kind, ConstraintKind::Placement { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self.kind, ConstraintKind::Validation { .. })
    }

    /// Serializable summary for listings
    pub fn descriptor(&self) -> ConstraintDescriptor {
        let (kind, parent, target) = match &self.kind {
            ConstraintKind::Placement { parent, child, allowed } => (
                if *allowed { "placement" } else { "forbid" }.to_string(),
                Some(parent.to_string()),
                child.to_string(),
            ),
            ConstraintKind::Validation { applies_to, target, check } => (
                format!("validation:{}:{}", check.kind(), target_name(*target)),
                None,
                applies_to.to_string(),
            ),
        };
        ConstraintDescriptor {
            id: self.id.clone(),
            kind,
            description: self.description.clone(),
            parent,
            target,
        }
    }
}

fn target_name(target: ValidationTarget) -> &'static str {
    match target {
        ValidationTarget::Value => "value",
        ValidationTarget::Name => "name",
    }
}

/// Listing form of a constraint
#[derive(Debug, Clone, Serialize)]
pub struct ConstraintDescriptor {
    pub id: String,
    pub kind: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub target: String,
}

/// Constraint counts per family
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConstraintSummary {
    pub placement: usize,
    pub forbid: usize,
    pub validation: usize,
}

impl ConstraintSummary {
    pub fn total(&self) -> usize {
        self.placement + self.forbid + self.validation
    }
}

/// Catalogue of placement and validation constraints
#[derive(Debug, Default)]
pub struct ConstraintRegistry {
    constraints: RwLock<Vec<Arc<Constraint>>>,
}

impl ConstraintRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a constraint; ids are unique
    pub fn add(&self, constraint: Constraint) -> Result<()> {
        let mut constraints = sync::write(&self.constraints);
        if constraints.iter().any(|c| c.id == constraint.id) {
            return Err(MetaDataError::DuplicateConstraint(constraint.id));
        }
        debug!("Added constraint: {} ({})", constraint.id, constraint.description);
        constraints.push(Arc::new(constraint));
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<Constraint>> {
        sync::read(&self.constraints).iter().find(|c| c.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        sync::read(&self.constraints).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All constraints in registration order
    pub fn all(&self) -> Vec<Arc<Constraint>> {
        sync::read(&self.constraints).clone()
    }

    pub fn placement_constraints(&self) -> Vec<Arc<Constraint>> {
        self.all().into_iter().filter(|c| c.is_placement()).collect()
    }

    pub fn validation_constraints(&self) -> Vec<Arc<Constraint>> {
        self.all().into_iter().filter(|c| c.is_validation()).collect()
    }

    pub fn summary(&self) -> ConstraintSummary {
        let mut summary = ConstraintSummary::default();
        for constraint in sync::read(&self.constraints).iter() {
            match constraint.kind {
                ConstraintKind::Placement { allowed: true, .. } => summary.placement += 1,
                ConstraintKind::Placement { allowed: false, .. } => summary.forbid += 1,
                ConstraintKind::Validation { .. } => summary.validation += 1,
            }
        }
        summary
    }

    /// Decide whether `child` may be attached under `parent`.
    ///
    /// Order: any applicable forbid constraint rejects; otherwise a matching
    /// structural requirement (parent's effective children or the child's
    /// accepted parents) or an applicable allow constraint accepts. The
    /// child's parent pointer is expected to already reference `parent` so
    /// the reported path is the child's.
    pub fn check_placement(
        &self,
        parent: &MetaData,
        child: &MetaData,
        parent_effective: &EffectiveDefinition,
        child_effective: Option<&EffectiveDefinition>,
    ) -> Result<()> {
        let constraints = self.placement_constraints();
        let placement_rules = constraints.iter().filter_map(|c| match &c.kind {
            ConstraintKind::Placement { parent: p, child: ch, allowed } => Some((c, p, ch, *allowed)),
            ConstraintKind::Validation { .. } => None,
        });

        let mut first_rejecting: Option<&Arc<Constraint>> = None;
        let mut allowed_by_constraint = false;

        for (constraint, parent_matcher, child_matcher, allowed) in placement_rules {
            if !parent_matcher.matches(parent) {
                continue;
            }
            let child_matches = child_matcher.matches(child);
            match (allowed, child_matches) {
                (false, true) => {
                    return Err(MetaDataError::violation(
                        &constraint.id,
                        format!(
                            "{}: {} is not allowed under {}",
                            constraint.description,
                            child.type_id(),
                            parent.type_id()
                        ),
                        child.path(),
                        child.type_id().to_string(),
                    ));
                }
                (true, true) => allowed_by_constraint = true,
                (true, false) if first_rejecting.is_none() => first_rejecting = Some(constraint),
                _ => {}
            }
        }

        let structurally_accepted = parent_effective.accepts_child(child.type_id(), child.name())
            || child_effective
                .map(|e| e.accepts_parent(parent.type_id(), child.name()))
                .unwrap_or(false);

        if structurally_accepted || allowed_by_constraint {
            return Ok(());
        }

        let (constraint_id, description) = match first_rejecting {
            Some(c) => (
                c.id.clone(),
                format!(
                    "{}: {} '{}' does not match {}",
                    c.description,
                    child.type_id(),
                    child.name(),
                    c.child_matcher()
                ),
            ),
            None => (
                STRUCTURAL_PLACEMENT_ID.to_string(),
                format!(
                    "{} '{}' is not a supported child of {}. {}",
                    child.type_id(),
                    child.name(),
                    parent.type_id(),
                    parent_effective.supported_children_description()
                ),
            ),
        };
        Err(MetaDataError::violation(
            constraint_id,
            description,
            child.path(),
            child.type_id().to_string(),
        ))
    }

    /// Run every applicable value constraint against `value`
    pub fn validate_value(&self, node: &MetaData, value: &Value) -> Result<()> {
        self.run_validations(node, ValidationTarget::Value, value)
    }

    /// Run every applicable name constraint against the node's name
    pub fn validate_name(&self, node: &MetaData) -> Result<()> {
        let name = Value::String(node.name().to_string());
        self.run_validations(node, ValidationTarget::Name, &name)
    }

    fn run_validations(&self, node: &MetaData, wanted: ValidationTarget, value: &Value) -> Result<()> {
        for constraint in self.validation_constraints() {
            if let ConstraintKind::Validation { applies_to, target, check } = &constraint.kind {
                if *target != wanted || !applies_to.matches(node) {
                    continue;
                }
                if !check.accepts(node, value) {
                    return Err(MetaDataError::violation(
                        &constraint.id,
                        format!("{} (value: {})", constraint.description, value),
                        node.path(),
                        node.type_id().to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_id::MetaDataTypeId;
    use serde_json::json;

    fn node(t: &str, s: &str, name: &str) -> Arc<MetaData> {
        MetaData::new(MetaDataTypeId::new(t, s), name)
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let registry = ConstraintRegistry::new();
        registry
            .add(Constraint::placement("a", "first", "field.*", "attr.*").unwrap())
            .unwrap();
        let err = registry
            .add(Constraint::forbid("a", "second", "attr.*", "attr.*").unwrap())
            .unwrap_err();
        assert!(matches!(err, MetaDataError::DuplicateConstraint(ref id) if id == "a"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_regex_validation_reports_id() {
        let registry = ConstraintRegistry::new();
        registry
            .add(Constraint::regex("css", "CSS class", "attr.string[cssClass]", "^[a-zA-Z][a-zA-Z0-9_-]{0,49}$").unwrap())
            .unwrap();

        let attr = node("attr", "string", "cssClass");
        assert!(registry.validate_value(&attr, &json!("btn-primary")).is_ok());
        let err = registry.validate_value(&attr, &json!("1bad")).unwrap_err();
        assert_eq!(err.constraint_id(), Some("css"));

        // other attribute names are not affected
        let other = node("attr", "string", "label");
        assert!(registry.validate_value(&other, &json!("1bad")).is_ok());
    }

    #[test]
    fn test_first_failure_in_registration_order() {
        let registry = ConstraintRegistry::new();
        registry
            .add(Constraint::length("len", "too long", "attr.string", None, Some(3)).unwrap())
            .unwrap();
        registry
            .add(Constraint::enumeration("enum", "not listed", "attr.string", &["a", "b"]).unwrap())
            .unwrap();

        let attr = node("attr", "string", "x");
        let err = registry.validate_value(&attr, &json!("toolong")).unwrap_err();
        assert_eq!(err.constraint_id(), Some("len"));
        let err = registry.validate_value(&attr, &json!("c")).unwrap_err();
        assert_eq!(err.constraint_id(), Some("enum"));
        assert!(registry.validate_value(&attr, &json!(["a", "b"])).is_ok());
        assert!(registry.validate_value(&attr, &Value::Null).is_ok());
    }

    #[test]
    fn test_identifier_names() {
        let registry = ConstraintRegistry::new();
        registry
            .add(Constraint::identifier("field.naming.pattern", "identifier", "field.*", true).unwrap())
            .unwrap();

        assert!(registry.validate_name(&node("field", "string", "user_name")).is_ok());
        assert!(registry.validate_name(&node("field", "string", "acme::name")).is_ok());
        assert!(registry.validate_name(&node("field", "string", "acme::9name")).is_err());
        assert!(registry.validate_name(&node("field", "string", "has space")).is_err());
    }

    #[test]
    fn test_custom_validation() {
        let registry = ConstraintRegistry::new();
        registry
            .add(Constraint::validation(
                "positive",
                "must be positive",
                NodeMatcher::pattern("attr.int").unwrap(),
                |_, v| v.as_i64().map_or(false, |n| n > 0),
            ))
            .unwrap();
        let attr = node("attr", "int", "size");
        assert!(registry.validate_value(&attr, &json!(3)).is_ok());
        assert!(registry.validate_value(&attr, &json!(-3)).is_err());
    }

    #[test]
    fn test_summary_counts_kinds() {
        let registry = ConstraintRegistry::new();
        registry.add(Constraint::placement("p", "", "*", "*").unwrap()).unwrap();
        registry.add(Constraint::forbid("f", "", "*", "*").unwrap()).unwrap();
        registry.add(Constraint::regex("r", "", "*", ".*").unwrap()).unwrap();
        let summary = registry.summary();
        assert_eq!((summary.placement, summary.forbid, summary.validation), (1, 1, 1));
        assert_eq!(summary.total(), 3);
        assert_eq!(registry.get("f").unwrap().descriptor().kind, "forbid");
    }
}
