//! MetaData Type Registry
//!
//! Single source of truth mapping [`MetaDataTypeId`] to [`TypeDefinition`].
//! Registering an id twice merges the second declaration into the first, so
//! providers can extend types registered by others (a database provider adds
//! `dbColumn` to `field.base` after the core types exist).
//!
//! Inheritance is resolved lazily at query time: a type may be registered
//! before its parent, and [`MetaDataRegistry::resolve_effective`] gives the
//! same answer either way once both are present.

pub mod definition;
pub mod provider;
pub mod providers;
pub mod report;

pub use definition::{
    AttributeRequirement, Cardinality, ChildRequirement, EffectiveDefinition, ParentAcceptance,
    TypeDefinition, TypeDefinitionBuilder, TYPE_ATTR,
};
pub use provider::{Bootstrap, TypeProvider};
pub use report::{RegistryHealthReport, RegistryStats};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use tracing::{debug, warn};

use crate::error::{MetaDataError, Result};
use crate::sync;
use crate::type_id::{MetaDataTypeId, TypePattern};

const MAX_SUGGESTIONS: usize = 3;

/// Registry of type definitions
#[derive(Debug, Default)]
pub struct MetaDataRegistry {
    definitions: RwLock<HashMap<MetaDataTypeId, TypeDefinition>>,
    /// Memoised effective definitions, dropped on every registration
    effective: RwLock<HashMap<MetaDataTypeId, Arc<EffectiveDefinition>>>,
    /// Bumped on every registration so stale resolutions are not memoised
    generation: AtomicU64,
}

impl MetaDataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or extend) a type.
    ///
    /// If `type_id` already exists the new declaration is merged into it:
    /// requirements are unioned, and on a duplicate key the most recent
    /// registration wins for requiredness and cardinality.
    pub fn register_type<F>(&self, type_id: MetaDataTypeId, build: F)
    where
        F: FnOnce(TypeDefinitionBuilder) -> TypeDefinitionBuilder,
    {
        let definition = build(TypeDefinitionBuilder::new(type_id.clone())).build();

        {
            let mut definitions = sync::write(&self.definitions);
            match definitions.get_mut(&type_id) {
                Some(existing) => {
                    if let Some(ignored) = existing.merge(definition) {
                        warn!(
                            "Ignoring parent {} for {}: already inherits from {}",
                            ignored,
                            type_id,
                            existing.parent().map(|p| p.to_string()).unwrap_or_default()
                        );
                    }
                    debug!("Extended type: {} (revision {})", type_id, existing.revision());
                }
                None => {
                    debug!(
                        "Registered type: {} (parent: {})",
                        type_id,
                        definition.parent().map(|p| p.to_string()).unwrap_or_else(|| "none".to_string())
                    );
                    definitions.insert(type_id, definition);
                }
            }
            self.generation.fetch_add(1, Ordering::SeqCst);
        }

        sync::write(&self.effective).clear();
    }

    /// Extend a type that must already be registered
    pub fn extend_type<F>(&self, type_id: &MetaDataTypeId, build: F) -> Result<()>
    where
        F: FnOnce(TypeDefinitionBuilder) -> TypeDefinitionBuilder,
    {
        if !self.is_registered(type_id) {
            return Err(self.not_found(type_id));
        }
        self.register_type(type_id.clone(), build);
        Ok(())
    }

    /// Exact lookup
    pub fn find_type(&self, type_name: &str, sub_type: &str) -> Result<TypeDefinition> {
        self.get(&MetaDataTypeId::new(type_name, sub_type))
    }

    pub fn get(&self, type_id: &MetaDataTypeId) -> Result<TypeDefinition> {
        sync::read(&self.definitions)
            .get(type_id)
            .cloned()
            .ok_or_else(|| self.not_found(type_id))
    }

    /// Requirements of `type_id` merged with all its ancestors
    pub fn resolve_effective(&self, type_id: &MetaDataTypeId) -> Result<Arc<EffectiveDefinition>> {
        if let Some(cached) = sync::read(&self.effective).get(type_id) {
            return Ok(Arc::clone(cached));
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let effective = {
            let definitions = sync::read(&self.definitions);
            let chain = Self::inheritance_chain(&definitions, type_id)
                .map_err(|missing| self.not_found_in(&definitions, &missing))??;
            EffectiveDefinition::flatten(&chain).map(Arc::new)
        }
        .ok_or_else(|| self.not_found(type_id))?;

        let mut cache = sync::write(&self.effective);
        if self.generation.load(Ordering::SeqCst) == generation {
            cache.insert(type_id.clone(), Arc::clone(&effective));
        }
        Ok(effective)
    }

    /// Walk the parent chain, most-derived first.
    ///
    /// The outer error carries the id that is missing from the table, the
    /// inner result a cycle.
    fn inheritance_chain<'a>(
        definitions: &'a HashMap<MetaDataTypeId, TypeDefinition>,
        type_id: &MetaDataTypeId,
    ) -> std::result::Result<Result<Vec<&'a TypeDefinition>>, MetaDataTypeId> {
        let mut chain: Vec<&TypeDefinition> = Vec::new();
        let mut seen: HashSet<&MetaDataTypeId> = HashSet::new();
        let mut current = type_id.clone();

        loop {
            let definition = definitions.get(&current).ok_or_else(|| current.clone())?;
            if !seen.insert(definition.id()) {
                let mut rendered: Vec<String> = chain.iter().map(|d| d.id().to_string()).collect();
                rendered.push(definition.id().to_string());
                return Ok(Err(MetaDataError::CyclicInheritance {
                    type_id: definition.id().to_string(),
                    chain: rendered.join(" -> "),
                }));
            }
            chain.push(definition);
            match definition.parent() {
                Some(parent) => current = parent.clone(),
                None => return Ok(Ok(chain)),
            }
        }
    }

    /// Wildcard test, e.g. `matches("field.*", field.string)`
    pub fn matches(&self, pattern: &str, type_id: &MetaDataTypeId) -> Result<bool> {
        Ok(TypePattern::parse(pattern)?.matches_type(type_id))
    }

    /// Structural acceptance of a child under a parent, in both directions:
    /// the parent's child patterns or the child's accepted parents.
    pub fn accepts_child(
        &self,
        parent: &MetaDataTypeId,
        child: &MetaDataTypeId,
        child_name: &str,
    ) -> Result<bool> {
        if self.resolve_effective(parent)?.accepts_child(child, child_name) {
            return Ok(true);
        }
        match self.resolve_effective(child) {
            Ok(effective) => Ok(effective.accepts_parent(parent, child_name)),
            Err(MetaDataError::TypeNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn is_registered(&self, type_id: &MetaDataTypeId) -> bool {
        sync::read(&self.definitions).contains_key(type_id)
    }

    /// Whether any subtype of `type_name` is registered
    pub fn has_type(&self, type_name: &str) -> bool {
        sync::read(&self.definitions).keys().any(|id| id.is_type(type_name))
    }

    /// All registered ids, sorted
    pub fn registered_types(&self) -> Vec<MetaDataTypeId> {
        let mut ids: Vec<_> = sync::read(&self.definitions).keys().cloned().collect();
        ids.sort();
        ids
    }

    /// All definitions, sorted by id
    pub fn definitions(&self) -> Vec<TypeDefinition> {
        let mut defs: Vec<_> = sync::read(&self.definitions).values().cloned().collect();
        defs.sort_by(|a, b| a.id().cmp(b.id()));
        defs
    }

    pub fn len(&self) -> usize {
        sync::read(&self.definitions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered subtypes of one type family
    pub fn sub_types_of(&self, type_name: &str) -> Vec<MetaDataTypeId> {
        self.registered_types()
            .into_iter()
            .filter(|id| id.is_type(type_name))
            .collect()
    }

    /// Human-readable list of what a type accepts as children
    pub fn supported_children_description(&self, type_id: &MetaDataTypeId) -> Result<String> {
        let effective = self.resolve_effective(type_id)?;
        let supported = effective.supported_children_description();
        if effective.description().is_empty() {
            Ok(supported)
        } else {
            Ok(format!("{}. {}", effective.description(), supported))
        }
    }

    /// Counts per type family
    pub fn stats(&self) -> RegistryStats {
        let definitions = sync::read(&self.definitions);
        let mut types_by_family: BTreeMap<String, usize> = BTreeMap::new();
        for id in definitions.keys() {
            *types_by_family.entry(id.type_name().to_string()).or_default() += 1;
        }
        RegistryStats {
            total_types: definitions.len(),
            types_by_family,
            types_with_parent: definitions.values().filter(|d| d.parent().is_some()).count(),
            memoised_effective: sync::read(&self.effective).len(),
        }
    }

    /// Consistency check: unresolved parents, cycles, families without a
    /// `base` subtype and missing expected core types.
    pub fn health_report(&self, core_types: &[MetaDataTypeId]) -> RegistryHealthReport {
        let mut report = RegistryHealthReport::default();
        let definitions = self.definitions();

        let mut families: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for def in &definitions {
            families
                .entry(def.id().type_name().to_string())
                .or_default()
                .push(def.id().sub_type().to_string());
        }
        for (family, subtypes) in &families {
            if !subtypes.iter().any(|s| s == "base") {
                report.families_missing_base.push(family.clone());
                report
                    .warnings
                    .push(format!("Type family '{}' missing recommended base subtype", family));
                report
                    .recommendations
                    .push(format!("Consider adding {}.base for inheritance support", family));
            }
        }

        for def in &definitions {
            if let Some(parent) = def.parent() {
                if !self.is_registered(parent) {
                    report.unresolved_parents.push(def.id().clone());
                    report
                        .errors
                        .push(format!("Type {} cannot find parent {}", def.id(), parent));
                    continue;
                }
            }
            if let Err(err @ MetaDataError::CyclicInheritance { .. }) = self.resolve_effective(def.id()) {
                report.cyclic_types.push(def.id().clone());
                report.errors.push(err.to_string());
            }
        }

        let missing_core: Vec<String> = core_types
            .iter()
            .filter(|id| !self.is_registered(id))
            .map(|id| id.to_string())
            .collect();
        if !missing_core.is_empty() {
            report
                .errors
                .push(format!("Missing core base types: [{}]", missing_core.join(", ")));
        }

        report.total_types = definitions.len();
        report.type_families = families.len();
        report
    }

    /// Export the inheritance graph to GraphViz DOT format
    pub fn to_dot(&self) -> String {
        let mut output = String::new();
        output.push_str("digraph TypeRegistry {\n");
        output.push_str("  rankdir=BT;\n");
        output.push_str("  node [shape=box, style=\"filled,rounded\", fontname=\"Helvetica\", fontsize=10];\n");
        output.push('\n');

        let color_map = [
            ("object", "#00BCD4"),
            ("field", "#FF9800"),
            ("attr", "#9E9E9E"),
            ("validator", "#F44336"),
            ("key", "#795548"),
            ("view", "#4CAF50"),
            ("loader", "#9C27B0"),
        ];

        let definitions = self.definitions();
        for def in &definitions {
            let color = color_map
                .iter()
                .find(|(family, _)| def.id().is_type(family))
                .map(|(_, color)| *color)
                .unwrap_or("#607D8B");
            output.push_str(&format!(
                "  \"{}\" [label=\"{}\", fillcolor=\"{}\"];\n",
                def.id(),
                def.id(),
                color
            ));
        }

        output.push('\n');
        for def in &definitions {
            if let Some(parent) = def.parent() {
                output.push_str(&format!("  \"{}\" -> \"{}\";\n", def.id(), parent));
            }
        }

        output.push_str("}\n");
        output
    }

    fn not_found(&self, type_id: &MetaDataTypeId) -> MetaDataError {
        self.not_found_in(&sync::read(&self.definitions), type_id)
    }

    fn not_found_in(
        &self,
        definitions: &HashMap<MetaDataTypeId, TypeDefinition>,
        type_id: &MetaDataTypeId,
    ) -> MetaDataError {
        let matcher = SkimMatcherV2::default();
        let query = type_id.qualified_name();
        let mut scored: Vec<(i64, String)> = definitions
            .keys()
            .filter_map(|id| {
                let candidate = id.qualified_name();
                matcher
                    .fuzzy_match(&candidate, &query)
                    .or_else(|| id.is_type(type_id.type_name()).then_some(0))
                    .map(|score| (score, candidate))
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        MetaDataError::TypeNotFound {
            type_id: query,
            suggestions: scored
                .into_iter()
                .take(MAX_SUGGESTIONS)
                .map(|(_, name)| name)
                .collect(),
        }
    }
}
