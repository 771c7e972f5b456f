//! Facet types for tabula's configuration and declaration files.
//!
//! Two documents are read with `facet-styx`:
//!
//! - `.config/tabula.styx`: which shards exist and how to reach them.
//! - a declaration file: the tables each shard should contain.
//!
//! ```styx
//! default_shard main
//! shards {
//!     main {url "postgres://localhost/app"}
//!     sales {url "postgres://localhost/sales", namespace sales, pool_size 2}
//! }
//! planner {split_foreign_keys true}
//! ```

use facet::Facet;
use indexmap::IndexMap;

mod declaration;
mod load;

pub use declaration::*;
pub use load::*;

/// Configuration loaded from `tabula.styx`.
#[derive(Debug, Clone, Facet)]
pub struct Config {
    /// Name of the shard used when a table does not name one.
    /// Defaults to the first configured shard.
    #[facet(default)]
    pub default_shard: Option<String>,

    /// Shards keyed by name, in configuration order.
    #[facet(default)]
    pub shards: IndexMap<String, ShardConfig>,

    /// Operation planner settings.
    #[facet(default)]
    pub planner: Option<PlannerConfig>,
}

/// Connection settings for one shard.
#[derive(Debug, Clone, Facet)]
pub struct ShardConfig {
    /// libpq-style connection URL.
    pub url: String,

    /// Schema namespace holding the shard's tables. Defaults to `public`.
    #[facet(default)]
    pub namespace: Option<String>,

    /// Maximum pooled connections. Defaults to 4.
    #[facet(default)]
    pub pool_size: Option<usize>,
}

impl ShardConfig {
    pub fn namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or("public")
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size.unwrap_or(4)
    }
}

/// Operation planner settings.
#[derive(Debug, Clone, Default, Facet)]
pub struct PlannerConfig {
    /// Create new tables without their foreign keys and add those in a
    /// later step. When off, mutually referencing new tables are an error.
    #[facet(default)]
    pub split_foreign_keys: Option<bool>,
}

impl Config {
    /// The effective default shard name.
    pub fn default_shard_name(&self) -> Option<&str> {
        match &self.default_shard {
            Some(name) => Some(name.as_str()),
            None => self.shards.keys().next().map(|k| k.as_str()),
        }
    }

    pub fn split_foreign_keys(&self) -> bool {
        self.planner
            .as_ref()
            .and_then(|p| p.split_foreign_keys)
            .unwrap_or(true)
    }

    /// Check cross-field invariants the types can't express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shards.is_empty() {
            return Err(ConfigError::Invalid("no shards configured".to_string()));
        }
        if let Some(name) = &self.default_shard
            && !self.shards.contains_key(name)
        {
            return Err(ConfigError::Invalid(format!(
                "default_shard '{}' is not a configured shard",
                name
            )));
        }
        for (name, shard) in &self.shards {
            if shard.url.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("shard '{}' has an empty url", name)));
            }
            if shard.pool_size == Some(0) {
                return Err(ConfigError::Invalid(format!(
                    "shard '{}' has pool_size 0",
                    name
                )));
            }
        }
        Ok(())
    }
}
