//! Graph construction against the type and constraint registries

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::constraint::ConstraintRegistry;
use crate::error::{MetaDataError, Result};
use crate::metadata::MetaData;
use crate::registry::{MetaDataRegistry, TYPE_ATTR};

/// Builds and mutates node trees, enforcing structure and constraints
#[derive(Debug, Clone)]
pub struct MetaDataContext {
    registry: Arc<MetaDataRegistry>,
    constraints: Arc<ConstraintRegistry>,
}

impl MetaDataContext {
    pub fn new(registry: Arc<MetaDataRegistry>, constraints: Arc<ConstraintRegistry>) -> Self {
        Self { registry, constraints }
    }

    pub fn registry(&self) -> &Arc<MetaDataRegistry> {
        &self.registry
    }

    pub fn constraints(&self) -> &Arc<ConstraintRegistry> {
        &self.constraints
    }

    /// Attach `child` under `parent`.
    ///
    /// Rejects same-type nesting and duplicate `(type, name)` siblings, then
    /// runs placement against the parent's effective definition. A value
    /// already carried by the child is validated before it is attached.
    pub fn add_child(&self, parent: &Arc<MetaData>, child: Arc<MetaData>) -> Result<Arc<MetaData>> {
        let child_path = parent.child_path(child.name());

        if parent.type_name() == child.type_name() {
            return Err(MetaDataError::violation(
                "metadata.same-type",
                format!(
                    "Cannot add {} under another {} node",
                    child.type_id(),
                    parent.type_name()
                ),
                child_path,
                child.type_id().to_string(),
            ));
        }

        if let Some(existing) = parent
            .children()
            .into_iter()
            .find(|c| c.type_name() == child.type_name() && c.name() == child.name())
        {
            return Err(MetaDataError::DuplicateChild {
                path: child_path,
                existing: existing.to_string(),
            });
        }

        let parent_effective = self.registry.resolve_effective(parent.type_id())?;
        let child_effective = self.registry.resolve_effective(child.type_id())?;

        child.set_parent(parent);
        let checked = self
            .constraints
            .check_placement(parent, &child, &parent_effective, Some(&child_effective))
            .and_then(|_| match child.value() {
                Some(value) => self.check_value(&child, &value),
                None => Ok(()),
            });
        if let Err(e) = checked {
            child.clear_parent();
            return Err(e);
        }

        parent.push_child(Arc::clone(&child));
        debug!("Added {} to {}", child, parent.path());
        Ok(child)
    }

    /// Set a node's value after cardinality and validation checks
    pub fn set_value(&self, node: &MetaData, value: Value) -> Result<()> {
        self.check_value(node, &value)?;
        node.store_value(value);
        node.parent().iter().for_each(|p| p.flush_caches());
        Ok(())
    }

    fn check_value(&self, node: &MetaData, value: &Value) -> Result<()> {
        if node.is_type(TYPE_ATTR) {
            if let Some(parent) = node.parent() {
                let effective = self.registry.resolve_effective(parent.type_id())?;
                if let Some(requirement) = effective.attribute(node.name()) {
                    if !requirement.cardinality.accepts(value) {
                        return Err(MetaDataError::violation(
                            format!(
                                "{}.{}.{}",
                                parent.type_id(),
                                node.name(),
                                requirement.cardinality.as_str()
                            ),
                            format!(
                                "Attribute '{}' expects a {} value",
                                node.name(),
                                requirement.cardinality.as_str()
                            ),
                            node.path(),
                            node.type_id().to_string(),
                        ));
                    }
                }
            }
        }
        self.constraints.validate_value(node, value)
    }

    /// Derived copy of `node` overloading it; placement is not re-run
    pub fn overload(&self, node: &Arc<MetaData>) -> Arc<MetaData> {
        node.overload()
    }

    /// Whole-graph pass: required attributes and children, names and
    /// values. Returns the first violation in depth-first order.
    pub fn validate(&self, root: &Arc<MetaData>) -> Result<()> {
        self.validate_node(root)?;
        for child in root.children() {
            self.validate(&child)?;
        }
        Ok(())
    }

    fn validate_node(&self, node: &MetaData) -> Result<()> {
        let effective = self.registry.resolve_effective(node.type_id())?;
        let present: Vec<_> = node
            .all_children()
            .iter()
            .map(|c| (c.type_id().clone(), c.name().to_string()))
            .collect();

        let missing = effective.missing_required(&present);
        if !missing.is_empty() {
            return Err(MetaDataError::violation(
                format!("{}.required", node.type_id()),
                format!("Missing {}", missing.join(", ")),
                node.path(),
                node.type_id().to_string(),
            ));
        }

        self.constraints.validate_name(node)?;
        if let Some(value) = node.value() {
            self.check_value(node, &value)?;
        }
        Ok(())
    }
}
