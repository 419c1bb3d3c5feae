//! # shardmesh-persist
//!
//! Versioned configuration persistence on top of a [`RepositoryClient`].
//!
//! - [`VersionedConfigStore`]: append-only versions plus an active-version
//!   pointer per logical key
//! - [`RuleConfigurationSwapper`] / [`SwapperRegistry`]: decomposition of a
//!   rule configuration into [`RepositoryTuple`]s
//! - [`MetaDataPersistService`]: one service per concern (database rules,
//!   global rules, properties, storage units, databases, compute nodes)
//!
//! [`RepositoryClient`]: shardmesh_repository::RepositoryClient

mod error;
pub mod node_path;
mod service;
mod store;
mod swapper;
mod tuple;
mod version;

pub use error::PersistError;
pub use node_path::RuleItemPath;
pub use service::{
    ComputeNodePersistService, DatabasePersistService, DatabaseRulePersistService,
    GlobalRulePersistService, MAX_WORKER_ID, MetaDataPersistService, PropertiesPersistService,
    StorageUnitPersistService,
};
pub use store::VersionedConfigStore;
pub use swapper::{JsonRuleConfigurationSwapper, RuleConfigurationSwapper, SwapperRegistry};
pub use tuple::RepositoryTuple;
pub use version::{DEFAULT_VERSION, MetaDataVersion};

/// Result type for persistence operations.
pub type Result<T> = std::result::Result<T, PersistError>;
