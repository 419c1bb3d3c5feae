//! Rule configuration and rule instance traits.
//!
//! A feature contributes two things: a [`RuleConfiguration`] (an opaque,
//! cloneable value object persisted in the repository) and one or more
//! [`Rule`] instances built from it. Rules may optionally support in-place
//! updates ([`PartialUpdateRule`]) or own resources that must be released
//! when the rule is superseded ([`DisposableRule`]).

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Scope a rule configuration belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleScope {
    /// Owned by a single logical database.
    Database,
    /// Cluster-wide.
    Global,
}

impl fmt::Display for RuleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database => write!(f, "database"),
            Self::Global => write!(f, "global"),
        }
    }
}

/// One feature's full configuration.
///
/// Two configurations are of the same family when their concrete types are
/// equal; see [`RuleConfiguration::config_type_id`].
pub trait RuleConfiguration: Any + Send + Sync + fmt::Debug {
    /// Rule type name, used as the persisted path segment and registry key.
    fn rule_type(&self) -> &str;

    /// Scope of this configuration.
    fn scope(&self) -> RuleScope {
        RuleScope::Database
    }

    /// Whether the configuration carries no items at all.
    fn is_empty(&self) -> bool;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Deep copy of the configuration.
    fn clone_config(&self) -> Box<dyn RuleConfiguration>;

    /// Concrete type of the configuration.
    fn config_type_id(&self) -> TypeId {
        Any::type_id(self.as_any())
    }
}

impl<'a> dyn RuleConfiguration + 'a {
    /// Returns true when both configurations belong to the same family.
    pub fn is_same_type(&self, other: &dyn RuleConfiguration) -> bool {
        self.config_type_id() == other.config_type_id()
    }

    pub fn downcast_ref<T: RuleConfiguration>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: RuleConfiguration>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}

/// A live rule instance built from a [`RuleConfiguration`].
pub trait Rule: Send + Sync + fmt::Debug {
    /// The configuration currently in effect for this rule.
    fn configuration(&self) -> Arc<dyn RuleConfiguration>;

    /// In-place update capability, if supported.
    fn as_partial_update(&self) -> Option<&dyn PartialUpdateRule> {
        None
    }

    /// Resource release capability, if supported.
    fn as_disposable(&self) -> Option<&dyn DisposableRule> {
        None
    }
}

impl<'a> dyn Rule + 'a {
    /// Whether this rule was built from a configuration of the same family as `config`.
    pub fn is_built_from(&self, config: &dyn RuleConfiguration) -> bool {
        self.configuration().is_same_type(config)
    }

    pub fn rule_type(&self) -> String {
        self.configuration().rule_type().to_string()
    }
}

/// Rules that can absorb some configuration changes without a rebuild.
pub trait PartialUpdateRule: Send + Sync {
    /// Returns true when `config` can be applied in place.
    fn partial_update(&self, config: &dyn RuleConfiguration) -> bool;

    /// Applies `config` in place. Only called after `partial_update` returned true.
    fn update_configuration(&self, config: Arc<dyn RuleConfiguration>);
}

/// Rules that own resources (connections, threads, handles) that must be
/// released once the rule is no longer published.
pub trait DisposableRule: Send + Sync {
    fn dispose(&self) -> Result<(), CoreError>;
}

/// Composite key selecting the processor for a rule sub-item path.
///
/// `item_type == None` addresses the whole rule configuration root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleChangedItemType {
    pub rule_type: String,
    pub item_type: Option<String>,
}

impl RuleChangedItemType {
    pub fn new(rule_type: impl Into<String>, item_type: Option<&str>) -> Self {
        Self {
            rule_type: rule_type.into(),
            item_type: item_type.map(str::to_string),
        }
    }

    /// Key addressing the whole configuration root of `rule_type`.
    pub fn root(rule_type: impl Into<String>) -> Self {
        Self {
            rule_type: rule_type.into(),
            item_type: None,
        }
    }
}

impl fmt::Display for RuleChangedItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.item_type {
            Some(item_type) => write!(f, "{}.{}", self.rule_type, item_type),
            None => write!(f, "{}", self.rule_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default)]
    struct FooConfig {
        items: Vec<String>,
    }

    impl RuleConfiguration for FooConfig {
        fn rule_type(&self) -> &str {
            "foo"
        }

        fn is_empty(&self) -> bool {
            self.items.is_empty()
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }

        fn clone_config(&self) -> Box<dyn RuleConfiguration> {
            Box::new(self.clone())
        }
    }

    #[derive(Debug, Clone, Default)]
    struct BarConfig;

    impl RuleConfiguration for BarConfig {
        fn rule_type(&self) -> &str {
            "bar"
        }

        fn scope(&self) -> RuleScope {
            RuleScope::Global
        }

        fn is_empty(&self) -> bool {
            false
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }

        fn clone_config(&self) -> Box<dyn RuleConfiguration> {
            Box::new(self.clone())
        }
    }

    #[test]
    fn test_same_type_by_concrete_type() {
        let a: Box<dyn RuleConfiguration> = Box::new(FooConfig::default());
        let b: Box<dyn RuleConfiguration> = Box::new(FooConfig {
            items: vec!["x".into()],
        });
        let c: Box<dyn RuleConfiguration> = Box::new(BarConfig);

        assert!(a.is_same_type(b.as_ref()));
        assert!(!a.is_same_type(c.as_ref()));
        assert_eq!(c.scope(), RuleScope::Global);
    }

    #[test]
    fn test_clone_config_is_independent() {
        let original = FooConfig {
            items: vec!["a".into()],
        };
        let mut copy = original.clone_config();
        copy.downcast_mut::<FooConfig>()
            .unwrap()
            .items
            .push("b".into());

        assert_eq!(original.items.len(), 1);
        assert_eq!(copy.downcast_ref::<FooConfig>().unwrap().items.len(), 2);
        assert!(copy.downcast_ref::<BarConfig>().is_none());
    }

    #[test]
    fn test_changed_item_type_display() {
        assert_eq!(
            RuleChangedItemType::new("sharding", Some("auditors")).to_string(),
            "sharding.auditors"
        );
        assert_eq!(RuleChangedItemType::root("single").to_string(), "single");
    }
}
