//! # shardmesh-mode
//!
//! Keeps a node's in-memory metadata consistent with the shared repository.
//!
//! - [`MetaDataSnapshot`] / [`MetaDataHandle`]: immutable snapshot behind an
//!   atomic pointer
//! - [`RuleReconciler`]: partial update or family rebuild, publish, dispose
//! - [`RuleItemCoordinator`]: single rule item changes
//! - [`GlobalConfigurationManager`]: global rules and properties
//! - [`StorageUnitManager`]: storage unit lifecycle
//! - [`ContextManager`]: bootstrap, watch loop and administrative API
//!
//! ```ignore
//! let manager = ContextManager::builder(load_config(None)?)
//!     .swapper(swapper)
//!     .factory(factory)
//!     .build()
//!     .await?;
//! manager.start().await?;
//! let snapshot = manager.snapshot();
//! ```

pub mod config;
mod context;
mod coordinator;
mod error;
mod factory;
mod global;
mod instance;
pub mod observability;
mod reconciler;
mod snapshot;
mod storage_unit;

pub use config::{ModeConfig, load_config};
pub use context::{ContextManager, ContextManagerBuilder};
pub use coordinator::{
    RuleItemConfigurationChangedProcessor, RuleItemCoordinator, RuleItemProcessorRegistry,
};
pub use error::ModeError;
pub use factory::{
    GlobalRuleBuildContext, RuleBuildContext, RuleFactory, RuleFactoryRegistry,
    build_database_rules, build_global_rules,
};
pub use global::{GlobalConfigurationManager, PropertiesChangedListener};
pub use instance::InstanceContext;
pub use reconciler::{DatabaseGuard, DatabaseLocks, ReconcileOutcome, RuleReconciler};
pub use snapshot::{Database, MetaDataHandle, MetaDataSnapshot, RuleMetaData};
pub use storage_unit::StorageUnitManager;

/// Result type for mode operations.
pub type Result<T> = std::result::Result<T, ModeError>;
