use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

fn default_max_pool_size() -> u32 {
    50
}

fn default_min_pool_size() -> u32 {
    1
}

/// Connection pool properties of one storage unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSourcePoolProperties {
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: u32,
    #[serde(default = "default_min_pool_size")]
    pub min_pool_size: u32,
    /// Driver specific settings passed through untouched.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub custom: IndexMap<String, String>,
}

impl DataSourcePoolProperties {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: String::new(),
            password: String::new(),
            max_pool_size: default_max_pool_size(),
            min_pool_size: default_min_pool_size(),
            custom: IndexMap::new(),
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }
}
