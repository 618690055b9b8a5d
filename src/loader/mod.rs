//! MetaDataLoader lifecycle
//!
//! A loader owns one metadata graph: a root node of type `loader.<subtype>`
//! filled by its [`MetaDataSource`]s during initialization.
//!
//! `init()` is single-flight per loader key (`kind:subtype:name`): racing
//! callers converge on one background initialization and wait for it with a
//! timeout. Failures are recorded on the [`LoadingState`] and put the loader
//! back to `Uninitialized` so it can be retried.

pub mod directory;
pub mod options;
pub mod pending;
pub mod state;

pub use directory::LoaderDirectory;
pub use options::{LoaderOptions, DEFAULT_INIT_TIMEOUT};
pub use pending::{InitOutcome, PendingInit, PendingInits};
pub use state::{LoadingSnapshot, LoadingState, Phase};

use std::fmt;
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{MetaDataError, Result};
use crate::metadata::{CachedValue, MetaData, MetaDataContext, TYPE_LOADER};
use crate::services::MetaDataServices;
use crate::sync;
use crate::type_id::MetaDataTypeId;

/// Type family of object nodes
pub const TYPE_OBJECT: &str = "object";

const DEFAULT_KIND: &str = "MetaDataLoader";

/// Producer of metadata nodes, run while the loader initializes.
///
/// Parsers implement this and attach what they read with
/// [`MetaDataContext::add_child`].
pub trait MetaDataSource: Send + Sync {
    fn describe(&self) -> String {
        "metadata source".to_string()
    }

    fn load(&self, context: &MetaDataContext, root: &Arc<MetaData>) -> Result<()>;
}

impl<F> MetaDataSource for F
where
    F: Fn(&MetaDataContext, &Arc<MetaData>) -> Result<()> + Send + Sync,
{
    fn load(&self, context: &MetaDataContext, root: &Arc<MetaData>) -> Result<()> {
        self(context, root)
    }
}

/// Status view for monitoring and the inspect binary
#[derive(Debug, Clone, Serialize)]
pub struct LoaderStatus {
    pub name: String,
    pub key: String,
    pub registered: bool,
    pub node_count: usize,
    pub state: LoadingSnapshot,
}

/// Builder for [`MetaDataLoader`]
pub struct LoaderBuilder {
    kind: String,
    sub_type: String,
    name: String,
    options: LoaderOptions,
    sources: Vec<Arc<dyn MetaDataSource>>,
}

impl LoaderBuilder {
    /// Implementation name used in the loader key
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn source<S>(mut self, source: S) -> Self
    where
        S: MetaDataSource + 'static,
    {
        self.sources.push(Arc::new(source));
        self
    }

    pub fn build(self, services: &MetaDataServices) -> Arc<MetaDataLoader> {
        let type_id = MetaDataTypeId::new(TYPE_LOADER, &self.sub_type);
        Arc::new(MetaDataLoader {
            state: LoadingState::new(&self.name),
            root: RwLock::new(MetaData::new(type_id.clone(), &self.name)),
            context: services.context(),
            services: services.clone(),
            kind: self.kind,
            type_id,
            name: self.name,
            options: self.options,
            sources: RwLock::new(self.sources),
        })
    }
}

/// Owner of one metadata graph and its lifecycle
pub struct MetaDataLoader {
    kind: String,
    type_id: MetaDataTypeId,
    name: String,
    options: LoaderOptions,
    services: MetaDataServices,
    context: MetaDataContext,
    state: LoadingState,
    root: RwLock<Arc<MetaData>>,
    sources: RwLock<Vec<Arc<dyn MetaDataSource>>>,
}

impl MetaDataLoader {
    pub fn builder(sub_type: &str, name: impl Into<String>) -> LoaderBuilder {
        LoaderBuilder {
            kind: DEFAULT_KIND.to_string(),
            sub_type: sub_type.to_string(),
            name: name.into(),
            options: LoaderOptions::default(),
            sources: Vec::new(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn sub_type(&self) -> &str {
        self.type_id.sub_type()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `kind:subtype:name`, the unit of single-flight initialization
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.kind, self.type_id.sub_type(), self.name)
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    pub fn state(&self) -> &LoadingState {
        &self.state
    }

    pub fn context(&self) -> &MetaDataContext {
        &self.context
    }

    /// Root node of the graph
    pub fn root(&self) -> Arc<MetaData> {
        Arc::clone(&sync::read(&self.root))
    }

    /// Add a source; only before the first initialization
    pub fn add_source<S>(&self, source: S) -> Result<()>
    where
        S: MetaDataSource + 'static,
    {
        self.state.require_phase(Phase::Uninitialized)?;
        sync::write(&self.sources).push(Arc::new(source));
        Ok(())
    }

    /// Initialize with the configured timeout
    pub fn init(self: &Arc<Self>) -> Result<()> {
        self.init_with_timeout(self.options.init_timeout)
    }

    /// Initialize, waiting at most `timeout` for the shared initialization.
    ///
    /// A loader that is already usable returns immediately. On timeout the
    /// pending entry is dropped so a later call starts afresh; the background
    /// initialization is left to finish on its own.
    pub fn init_with_timeout(self: &Arc<Self>, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        match self.state.phase() {
            phase if phase.is_usable() => return Ok(()),
            Phase::Destroyed => {
                return Err(MetaDataError::IllegalState(format!(
                    "Loader [{}] has been destroyed",
                    self.name
                )))
            }
            _ => {}
        }

        let key = self.key();
        let pending = Arc::clone(&self.services.pending);
        let (task, leader) = pending.join_or_start(&key);

        if leader {
            let loader = Arc::clone(self);
            let background = Arc::clone(&task);
            let spawned = thread::Builder::new()
                .name(format!("metadata-init-{}", self.name))
                .spawn(move || {
                    let outcome = loader.perform_initialization().map_err(Arc::new);
                    loader.services.pending.finish(&background, InitOutcome::Completed(outcome));
                });
            if let Err(e) = spawned {
                pending.finish(&task, InitOutcome::Completed(Err(Arc::new(MetaDataError::Io(e)))));
            }
        }

        match task.wait(timeout) {
            Some(InitOutcome::Completed(Ok(()))) if leader || self.state.is_usable() => Ok(()),
            Some(InitOutcome::Completed(Ok(()))) => {
                // the shared run initialized another loader with the same key
                debug!("Pending initialization of {} belonged to another loader", key);
                self.init_with_timeout(timeout.saturating_sub(started.elapsed()))
            }
            Some(InitOutcome::Completed(Err(e))) => Err(self.shared_error(&e)),
            Some(InitOutcome::Cancelled) => Err(MetaDataError::IllegalState(format!(
                "Initialization of [{}] was cancelled",
                key
            ))),
            None => {
                pending.abandon(&task);
                warn!("Loader initialization timeout after {}ms: {}", timeout.as_millis(), key);
                self.state.record_error(Arc::new(MetaDataError::LoadingTimeout {
                    loader_key: key.clone(),
                    timeout,
                }));
                Err(MetaDataError::LoadingTimeout {
                    loader_key: key,
                    timeout,
                })
            }
        }
    }

    /// Retry initialization up to `max_attempts` times in total, resetting
    /// the loader and sleeping `delay` between attempts. Lifecycle errors are
    /// not retried.
    pub fn init_with_retry(self: &Arc<Self>, max_attempts: u32, delay: Duration) -> Result<()> {
        let attempts = max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            if self.state.is_usable() {
                return Ok(());
            }
            if attempt > 1 {
                thread::sleep(delay);
            }
            self.reset_for_retry()?;

            match self.init() {
                Ok(()) => {
                    if attempt > 1 {
                        info!("Loader [{}] initialized on attempt {}", self.name, attempt);
                    }
                    return Ok(());
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!(
                        "Loader [{}] initialization attempt {}/{} failed: {}",
                        self.name, attempt, attempts, e
                    );
                    last_error = Some(Arc::new(e));
                }
            }
        }

        Err(MetaDataError::Loading {
            loader: self.name.clone(),
            phase: self.state.error_phase().unwrap_or(Phase::Initializing),
            elapsed: self.state.elapsed(),
            message: format!("Initialization failed after {} attempts", attempts),
            cause: last_error,
        })
    }

    /// Back to `Uninitialized` with no error and an empty graph
    fn reset_for_retry(&self) -> Result<()> {
        match self.state.phase() {
            Phase::Destroyed => Err(MetaDataError::IllegalState(format!(
                "Loader [{}] has been destroyed",
                self.name
            ))),
            Phase::Initializing | Phase::Registering => Ok(()),
            _ => {
                self.state.force_transition(Phase::Uninitialized);
                self.state.clear_error();
                self.reset_root();
                Ok(())
            }
        }
    }

    /// Replace the graph with an empty root
    fn reset_root(&self) {
        *sync::write(&self.root) = MetaData::new(self.type_id.clone(), &self.name);
    }

    /// Body of the shared initialization
    fn perform_initialization(self: &Arc<Self>) -> Result<()> {
        if !self.state.try_transition(Phase::Uninitialized, Phase::Initializing) {
            let phase = self.state.phase();
            if phase.is_usable() {
                return Ok(());
            }
            // an abandoned (timed out) initialization is still running
            if phase.is_transient() {
                return Err(MetaDataError::Loading {
                    loader: self.name.clone(),
                    phase,
                    elapsed: self.state.elapsed(),
                    message: "Initialization already in progress".to_string(),
                    cause: None,
                });
            }
            return Err(MetaDataError::IllegalState(format!(
                "Cannot initialize loader [{}] in phase {}",
                self.name, phase
            )));
        }

        let started = Instant::now();
        info!("Initializing loader: {}", self.key());

        if let Err(cause) = self.load_sources() {
            let err = Arc::new(MetaDataError::Loading {
                loader: self.name.clone(),
                phase: Phase::Initializing,
                elapsed: started.elapsed(),
                message: format!("Initialization failed: {}", cause),
                cause: Some(Arc::new(cause)),
            });
            error!("{}", err);
            self.reset_root();
            self.state.set_error(Arc::clone(&err), Phase::Uninitialized);
            return Err(self.shared_error(&err));
        }

        self.state.transition(Phase::Initializing, Phase::Initialized)?;
        info!(
            "Loader [{}] initialized in {}ms ({} nodes)",
            self.name,
            started.elapsed().as_millis(),
            self.root().node_count()
        );

        if self.options.should_register {
            self.register()?;
        }
        Ok(())
    }

    fn load_sources(&self) -> Result<()> {
        let root = self.root();
        let sources: Vec<_> = sync::read(&self.sources).clone();
        for source in &sources {
            if self.options.verbose {
                info!("Loader [{}] loading {}", self.name, source.describe());
            }
            source.load(&self.context, &root)?;
        }

        match self.context.validate(&root) {
            Ok(()) => Ok(()),
            Err(e) if self.options.strict => Err(e),
            Err(e) => {
                warn!("Loader [{}] loaded with validation errors: {}", self.name, e);
                Ok(())
            }
        }
    }

    /// Publish into the loader directory: `Initialized -> Registering -> Registered`
    pub fn register(self: &Arc<Self>) -> Result<()> {
        if self.state.phase() == Phase::Registered {
            return Ok(());
        }
        self.state.transition(Phase::Initialized, Phase::Registering)?;

        let started = Instant::now();
        if let Err(cause) = self.services.loaders.register(Arc::clone(self)) {
            let err = Arc::new(MetaDataError::Loading {
                loader: self.name.clone(),
                phase: Phase::Registering,
                elapsed: started.elapsed(),
                message: format!("Registration failed: {}", cause),
                cause: Some(Arc::new(cause)),
            });
            self.state.set_error(Arc::clone(&err), Phase::Initialized);
            return Err(self.shared_error(&err));
        }

        self.state.transition(Phase::Registering, Phase::Registered)
    }

    /// Detach the graph, unregister and move to `Destroyed` for good
    pub fn destroy(&self) -> Result<()> {
        if self.state.swap(Phase::Destroyed) == Phase::Destroyed {
            return Err(MetaDataError::IllegalState(format!(
                "Loader [{}] already destroyed",
                self.name
            )));
        }
        self.root().clear_children();
        self.services.loaders.unregister_loader(self);
        info!("Destroyed loader: {}", self.name);
        Ok(())
    }

    /// Best-effort cleanup; never fails
    pub fn shutdown(&self) {
        let key = self.key();
        if self.services.pending.cancel(&key) {
            info!("Cancelled pending initialization: {}", key);
        }
        if !self.state.is_destroyed() {
            if let Err(e) = self.destroy() {
                error!("Error destroying loader [{}] during shutdown: {}", self.name, e);
            }
        }
        self.root().flush_caches();
    }

    /// Object nodes at the top of the graph
    pub fn meta_objects(&self) -> Result<Vec<Arc<MetaData>>> {
        self.meta_data_of_type(TYPE_OBJECT)
    }

    pub fn meta_data_of_type(&self, type_name: &str) -> Result<Vec<Arc<MetaData>>> {
        self.state.require_usable()?;
        Ok(self.root().children_of_type(type_name, false))
    }

    /// Top-level node by type and name, memoised on the root
    pub fn meta_data_by_name(&self, type_name: &str, name: &str) -> Result<Arc<MetaData>> {
        self.state.require_usable()?;
        let root = self.root();
        let key = format!("QuickCache-{}-{}", type_name, name);
        match root.cached(&key, || root.child_of_type(type_name, name).map(CachedValue::Node)) {
            Some(CachedValue::Node(node)) => Ok(node),
            _ => Err(MetaDataError::NotFound {
                name: name.to_string(),
                scope: format!("{} [{}]", type_name, self.name),
            }),
        }
    }

    /// Objects overloading the object named `name`, directly or transitively
    pub fn meta_data_by_super(&self, name: &str) -> Result<Vec<Arc<MetaData>>> {
        let origin = self.meta_data_by_name(TYPE_OBJECT, name)?;
        let root = self.root();
        let key = format!("SuperCache-{}", name);
        let derived = root.cached(&key, || {
            let found = root
                .children_of_type(TYPE_OBJECT, false)
                .into_iter()
                .filter(|candidate| {
                    let mut current = candidate.super_data();
                    while let Some(node) = current {
                        if Arc::ptr_eq(&node, &origin) {
                            return true;
                        }
                        current = node.super_data();
                    }
                    false
                })
                .collect();
            Some(CachedValue::Nodes(found))
        });
        match derived {
            Some(CachedValue::Nodes(nodes)) => Ok(nodes),
            _ => Ok(Vec::new()),
        }
    }

    /// Attach a top-level node to an initialized loader
    pub fn add_child(&self, child: Arc<MetaData>) -> Result<Arc<MetaData>> {
        self.state.require_usable()?;
        self.context.add_child(&self.root(), child)
    }

    /// Whole-graph validation pass
    pub fn validate(&self) -> Result<()> {
        self.state.require_usable()?;
        self.context.validate(&self.root())
    }

    pub fn status(&self) -> LoaderStatus {
        LoaderStatus {
            name: self.name.clone(),
            key: self.key(),
            registered: self.services.loaders.get(&self.name).is_some_and(|l| {
                std::ptr::eq(Arc::as_ptr(&l), self)
            }),
            node_count: self.root().node_count(),
            state: self.state.snapshot(),
        }
    }

    /// Owned copy of an error shared between waiters
    fn shared_error(&self, shared: &Arc<MetaDataError>) -> MetaDataError {
        match shared.as_ref() {
            MetaDataError::Loading {
                loader,
                phase,
                elapsed,
                message,
                cause,
            } => MetaDataError::Loading {
                loader: loader.clone(),
                phase: *phase,
                elapsed: *elapsed,
                message: message.clone(),
                cause: cause.clone(),
            },
            MetaDataError::IllegalState(message) => MetaDataError::IllegalState(message.clone()),
            other => MetaDataError::Loading {
                loader: self.name.clone(),
                phase: self.state.error_phase().unwrap_or(Phase::Initializing),
                elapsed: self.state.elapsed(),
                message: other.to_string(),
                cause: Some(Arc::clone(shared)),
            },
        }
    }
}

impl fmt::Debug for MetaDataLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaDataLoader")
            .field("key", &self.key())
            .field("phase", &self.state.phase())
            .field("sources", &sync::read(&self.sources).len())
            .finish()
    }
}

impl fmt::Display for MetaDataLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}:{}]{{{}}}", self.kind, TYPE_LOADER, self.sub_type(), self.name)
    }
}
