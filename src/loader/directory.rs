//! Directory of registered loaders for cross-loader lookup

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use crate::error::{MetaDataError, Result};
use crate::loader::MetaDataLoader;
use crate::metadata::MetaData;
use crate::sync;

/// Registered loaders by name
#[derive(Debug, Default)]
pub struct LoaderDirectory {
    loaders: RwLock<BTreeMap<String, Arc<MetaDataLoader>>>,
}

impl LoaderDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a loader; registering the same loader twice is a no-op
    pub fn register(&self, loader: Arc<MetaDataLoader>) -> Result<()> {
        let mut loaders = sync::write(&self.loaders);
        if let Some(existing) = loaders.get(loader.name()) {
            if Arc::ptr_eq(existing, &loader) {
                return Ok(());
            }
            return Err(MetaDataError::DuplicateLoader(loader.name().to_string()));
        }
        info!("Registered loader: {}", loader.name());
        loaders.insert(loader.name().to_string(), loader);
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<MetaDataLoader>> {
        let removed = sync::write(&self.loaders).remove(name);
        if removed.is_some() {
            debug!("Unregistered loader: {}", name);
        }
        removed
    }

    /// Remove `loader` only if it is the instance published under its name
    pub fn unregister_loader(&self, loader: &MetaDataLoader) -> bool {
        let mut loaders = sync::write(&self.loaders);
        match loaders.get(loader.name()) {
            Some(existing) if std::ptr::eq(Arc::as_ptr(existing), loader) => {
                loaders.remove(loader.name());
                debug!("Unregistered loader: {}", loader.name());
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<MetaDataLoader>> {
        sync::read(&self.loaders).get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        sync::read(&self.loaders).contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        sync::read(&self.loaders).keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        sync::read(&self.loaders).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First object named `name` across usable loaders, in name order
    pub fn find_meta_object(&self, name: &str) -> Result<Arc<MetaData>> {
        let loaders: Vec<_> = sync::read(&self.loaders).values().cloned().collect();
        loaders
            .iter()
            .filter(|l| l.state().is_usable())
            .find_map(|l| l.meta_data_by_name(crate::loader::TYPE_OBJECT, name).ok())
            .ok_or_else(|| MetaDataError::NotFound {
                name: name.to_string(),
                scope: format!("{} registered loaders", loaders.len()),
            })
    }
}
