//! # shardmesh-sharding
//!
//! The sharding feature: its rule configuration, the decomposition of that
//! configuration into repository items, one processor per item type, and the
//! factory building a [`ShardingRule`] over a database's storage units.
//!
//! ```ignore
//! let manager = shardmesh_sharding::install(ContextManager::builder(config))
//!     .build()
//!     .await?;
//! ```

mod config;
mod error;
pub mod expr;
mod processor;
mod rule;
mod swapper;

use std::sync::Arc;

use shardmesh_mode::ContextManagerBuilder;

pub use config::{
    AlgorithmConfiguration, KeyGenerateStrategyConfiguration, RULE_TYPE,
    ShardingAuditStrategyConfiguration, ShardingAutoTableRuleConfiguration,
    ShardingRuleConfiguration, ShardingStrategyConfiguration,
    ShardingTableReferenceRuleConfiguration, ShardingTableRuleConfiguration,
};
pub use error::ShardingError;
pub use processor::{NamedItem, NamedItemProcessor, UniqueItem, UniqueItemProcessor, processors};
pub use rule::{DataNode, ShardingRule, ShardingRuleFactory, TableRule};
pub use swapper::{ShardingRuleConfigurationSwapper, item};

/// Register the sharding swapper, factory and item processors.
pub fn install(builder: ContextManagerBuilder) -> ContextManagerBuilder {
    processors().into_iter().fold(
        builder
            .swapper(Arc::new(ShardingRuleConfigurationSwapper::new()))
            .factory(Arc::new(ShardingRuleFactory::new())),
        ContextManagerBuilder::processor,
    )
}
