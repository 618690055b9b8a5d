//! Shared services handed to loaders and providers

use std::sync::Arc;

use crate::config::MetaObjectsConfig;
use crate::constraint::ConstraintRegistry;
use crate::error::Result;
use crate::loader::{LoaderDirectory, PendingInits};
use crate::metadata::MetaDataContext;
use crate::registry::{Bootstrap, MetaDataRegistry};

/// Type registry, constraint registry, pending initializations and the
/// loader directory. Cloning shares the same instances.
#[derive(Debug, Clone, Default)]
pub struct MetaDataServices {
    pub registry: Arc<MetaDataRegistry>,
    pub constraints: Arc<ConstraintRegistry>,
    pub pending: Arc<PendingInits>,
    pub loaders: Arc<LoaderDirectory>,
}

impl MetaDataServices {
    /// Services with nothing registered
    pub fn empty() -> Self {
        Self::default()
    }

    /// Services bootstrapped with the default providers, honouring the
    /// disabled providers in `config`
    pub fn from_config(config: &MetaObjectsConfig) -> Result<Self> {
        Bootstrap::from_settings(&config.registry).run()
    }

    /// Graph-construction context over these registries
    pub fn context(&self) -> MetaDataContext {
        MetaDataContext::new(Arc::clone(&self.registry), Arc::clone(&self.constraints))
    }
}
