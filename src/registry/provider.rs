//! Type providers and the bootstrap sequence
//!
//! Providers are plain values handed to [`Bootstrap`], which runs each of
//! them once: dependencies first, then by priority (lower first), then in
//! the order they were added.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use tracing::{debug, info, warn};

use crate::config::RegistrySettings;
use crate::constraint::ConstraintRegistry;
use crate::error::{MetaDataError, Result};
use crate::registry::providers::{
    core_type_ids, CoreConstraintsProvider, CoreTypesProvider, DatabaseTypesProvider,
};
use crate::registry::MetaDataRegistry;
use crate::services::MetaDataServices;

/// Default priority for providers that do not declare one
pub const DEFAULT_PRIORITY: i32 = 100;

/// A module contributing type definitions and constraints
pub trait TypeProvider: Send + Sync {
    /// Stable id other providers name in their dependencies
    fn id(&self) -> &str;

    /// Lower runs first among providers whose dependencies are satisfied
    fn priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }

    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    fn description(&self) -> String {
        String::new()
    }

    fn register_types(&self, registry: &MetaDataRegistry) -> Result<()>;

    fn register_constraints(&self, _constraints: &ConstraintRegistry) -> Result<()> {
        Ok(())
    }
}

/// Ordered, run-once provider registration
#[derive(Default)]
pub struct Bootstrap {
    providers: Vec<Box<dyn TypeProvider>>,
    disabled: HashSet<String>,
}

impl Bootstrap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Core, database and constraint providers
    pub fn with_default_providers() -> Self {
        Self::new()
            .provider(CoreTypesProvider)
            .provider(DatabaseTypesProvider)
            .provider(CoreConstraintsProvider)
    }

    /// Default providers minus the ones disabled in settings
    pub fn from_settings(settings: &RegistrySettings) -> Self {
        settings
            .disabled_providers
            .iter()
            .fold(Self::with_default_providers(), |bootstrap, id| bootstrap.disable(id))
    }

    pub fn provider<P>(mut self, provider: P) -> Self
    where
        P: TypeProvider + 'static,
    {
        self.providers.push(Box::new(provider));
        self
    }

    /// Skip a provider by id
    pub fn disable(mut self, id: &str) -> Self {
        self.disabled.insert(id.to_string());
        self
    }

    /// Providers in the order they will run
    pub fn execution_order(&self) -> Result<Vec<&dyn TypeProvider>> {
        let active: Vec<&dyn TypeProvider> = self
            .providers
            .iter()
            .map(|p| p.as_ref())
            .filter(|p| !self.disabled.contains(p.id()))
            .collect();

        let mut graph: DiGraph<usize, ()> = DiGraph::new();
        let mut index_of: HashMap<&str, NodeIndex> = HashMap::new();
        for (position, provider) in active.iter().enumerate() {
            if index_of.insert(provider.id(), graph.add_node(position)).is_some() {
                return Err(MetaDataError::DuplicateProvider(provider.id().to_string()));
            }
        }

        for provider in &active {
            let node = index_of[provider.id()];
            for dependency in provider.dependencies() {
                match index_of.get(dependency.as_str()) {
                    Some(&dep) => {
                        graph.add_edge(dep, node, ());
                    }
                    None => warn!(
                        "Provider {} depends on unavailable provider {}",
                        provider.id(),
                        dependency
                    ),
                }
            }
        }

        for component in kosaraju_scc(&graph) {
            let cyclic = component.len() > 1 || graph.contains_edge(component[0], component[0]);
            if cyclic {
                let mut ids: Vec<&str> = component.iter().map(|n| active[graph[*n]].id()).collect();
                ids.sort();
                return Err(MetaDataError::ProviderCycle(ids.join(", ")));
            }
        }

        let mut in_degree: Vec<usize> = graph
            .node_indices()
            .map(|n| graph.neighbors_directed(n, Direction::Incoming).count())
            .collect();
        let mut ready: BinaryHeap<Reverse<(i32, usize)>> = graph
            .node_indices()
            .filter(|n| in_degree[n.index()] == 0)
            .map(|n| Reverse((active[graph[n]].priority(), graph[n])))
            .collect();

        let mut order = Vec::with_capacity(active.len());
        while let Some(Reverse((_, position))) = ready.pop() {
            order.push(active[position]);
            let node = NodeIndex::new(position);
            for next in graph.neighbors_directed(node, Direction::Outgoing) {
                in_degree[next.index()] -= 1;
                if in_degree[next.index()] == 0 {
                    ready.push(Reverse((active[graph[next]].priority(), graph[next])));
                }
            }
        }
        Ok(order)
    }

    /// Run every provider against fresh services
    pub fn run(&self) -> Result<MetaDataServices> {
        let services = MetaDataServices::empty();
        self.run_into(&services)?;
        Ok(services)
    }

    /// Run every provider against existing services; returns the ids run
    pub fn run_into(&self, services: &MetaDataServices) -> Result<Vec<String>> {
        let order = self.execution_order()?;
        info!("Bootstrapping {} type providers", order.len());

        for provider in &order {
            debug!("Registering types from provider: {}", provider.id());
            provider.register_types(&services.registry)?;
        }
        for provider in &order {
            provider.register_constraints(&services.constraints)?;
        }

        let report = services.registry.health_report(&core_type_ids());
        for problem in report.errors.iter().chain(report.warnings.iter()) {
            warn!("Registry health: {}", problem);
        }
        info!(
            "Bootstrap complete: {} types, {} constraints",
            services.registry.len(),
            services.constraints.len()
        );

        Ok(order.iter().map(|p| p.id().to_string()).collect())
    }
}
