//! # shardmesh-core
//!
//! Domain types shared by every shardmesh crate.
//!
//! The crate is deliberately free of I/O. It defines:
//! - [`RuleConfiguration`] and [`Rule`], the two halves of a feature (the
//!   serializable value object and the live instance built from it)
//! - optional rule capabilities: [`PartialUpdateRule`] and [`DisposableRule`]
//! - [`ConfigurationProperties`] with typed getters and change diffing
//! - [`DataSourcePoolProperties`] describing a storage unit
//! - compute node metadata ([`ComputeNodeInstance`], [`InstanceState`],
//!   [`ClusterState`])
//! - [`DataChangedEvent`], the raw notification emitted by a repository

mod datasource;
mod error;
mod event;
mod instance;
mod props;
mod rule;

pub use datasource::DataSourcePoolProperties;
pub use error::CoreError;
pub use event::{ChangeType, DataChangedEvent};
pub use instance::{
    ClusterState, ComputeNodeInstance, InstanceAttributes, InstanceState, InstanceType,
    ListenerAssistedType,
};
pub use props::{ConfigurationProperties, PropertyKey};
pub use rule::{
    DisposableRule, PartialUpdateRule, Rule, RuleChangedItemType, RuleConfiguration, RuleScope,
};

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use shardmesh_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        ChangeType, ComputeNodeInstance, ConfigurationProperties, CoreError, DataChangedEvent,
        DisposableRule, PartialUpdateRule, Rule, RuleConfiguration, RuleScope,
    };
}
