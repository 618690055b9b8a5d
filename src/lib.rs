//! MetaObjects runtime metadata core
//!
//! A runtime registry of metadata *types* (`field.string`, `object.pojo`,
//! ...), a constraint engine deciding where nodes may live and which values
//! they may carry, and the loaders that build and own metadata graphs.
//!
//! ## Features
//!
//! - **Type Registry**: definitions merged from several providers, with
//!   single inheritance flattened on demand
//! - **Constraints**: placement (allow and forbid) and validation rules
//!   checked as the graph is built
//! - **Loader Lifecycle**: single-flight initialization with timeouts,
//!   retry, registration and destruction
//!
//! ## Architecture
//!
//! ```text
//! Bootstrap ──► TypeProvider (core-types, core-constraints, ...)
//!    │
//!    ▼
//! MetaDataServices { registry, constraints, pending, loaders }
//!    │
//!    ▼
//! MetaDataLoader ──► MetaDataSource ──► MetaDataContext::add_child
//!    │                                        │
//!    ▼                                        ▼
//! LoaderDirectory                      MetaData graph
//! ```

pub mod config;
pub mod constraint;
pub mod error;
pub mod loader;
pub mod metadata;
pub mod registry;
pub mod services;
pub(crate) mod sync;
pub mod type_id;

pub use config::MetaObjectsConfig;
pub use constraint::{Constraint, ConstraintRegistry, NodeMatcher, ValueCheck};
pub use error::{MetaDataError, Result};
pub use loader::{LoaderDirectory, LoaderOptions, MetaDataLoader, MetaDataSource, Phase};
pub use metadata::{MetaData, MetaDataContext};
pub use registry::{Bootstrap, EffectiveDefinition, MetaDataRegistry, TypeDefinition, TypeProvider};
pub use services::MetaDataServices;
pub use type_id::{Matcher, MetaDataTypeId, TypePattern};
