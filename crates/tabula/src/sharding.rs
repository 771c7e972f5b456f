//! Named shards and the catalogs behind them.

use crate::catalog::{Catalog, PgCatalog};
use crate::{ConnectionMediator, Error, Result, TracedPool};
use indexmap::IndexMap;
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;
use tabula_config::Config;
use tracing::warn;

/// Name of a connection target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Shard(String);

impl Shard {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Shard {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Shard {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Registry of shards. Exactly one of them is the default.
pub struct Sharding {
    default: Shard,
    catalogs: IndexMap<Shard, Arc<dyn Catalog>>,
}

impl Sharding {
    /// A registry with a single shard named `default`.
    pub fn single(catalog: Arc<dyn Catalog>) -> Self {
        Self::new("default", catalog)
    }

    /// A registry whose default shard is `default`.
    pub fn new(default: impl Into<String>, catalog: Arc<dyn Catalog>) -> Self {
        let default = Shard::new(default);
        let mut catalogs = IndexMap::new();
        catalogs.insert(default.clone(), catalog);
        Self { default, catalogs }
    }

    /// Register another shard.
    pub fn with_shard(mut self, name: impl Into<String>, catalog: Arc<dyn Catalog>) -> Self {
        self.catalogs.insert(Shard::new(name), catalog);
        self
    }

    /// Build PostgreSQL pools for every configured shard.
    ///
    /// Pools connect lazily, so this does not touch the network.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let mut catalogs: IndexMap<Shard, Arc<dyn Catalog>> = IndexMap::new();
        for (name, shard) in &config.shards {
            let mut pg = deadpool_postgres::Config::new();
            pg.url = Some(shard.url.clone());
            pg.pool = Some(deadpool_postgres::PoolConfig::new(shard.pool_size()));
            let pool = pg
                .create_pool(
                    Some(deadpool_postgres::Runtime::Tokio1),
                    tokio_postgres::NoTls,
                )
                .map_err(|e| Error::Connect {
                    shard: name.clone(),
                    reason: e.to_string(),
                })?;
            catalogs.insert(
                Shard::new(name.as_str()),
                Arc::new(PgCatalog::new(TracedPool::new(pool, shard.namespace()))),
            );
        }

        let default = config
            .default_shard_name()
            .map(Shard::new)
            .ok_or_else(|| Error::UnknownShard(String::new()))?;
        Ok(Self { default, catalogs })
    }

    pub fn default_shard(&self) -> &Shard {
        &self.default
    }

    /// Every shard, in registration order.
    pub fn shards(&self) -> impl Iterator<Item = &Shard> {
        self.catalogs.keys()
    }

    pub fn get(&self, name: &str) -> Option<&Shard> {
        self.catalogs.get_key_value(name).map(|(shard, _)| shard)
    }

    /// The shard a declaration lands on. Unnamed and unknown shards fall
    /// back to the default; unknown ones are logged.
    pub fn resolve(&self, name: Option<&str>) -> &Shard {
        match name {
            None => &self.default,
            Some(name) => self.get(name).unwrap_or_else(|| {
                warn!(
                    shard = name,
                    default = %self.default,
                    "unknown shard, using the default shard"
                );
                &self.default
            }),
        }
    }

    pub fn catalog(&self, shard: &Shard) -> Result<&Arc<dyn Catalog>> {
        self.catalogs
            .get(shard)
            .ok_or_else(|| Error::UnknownShard(shard.to_string()))
    }

    /// Fresh mediators for every shard, with empty caches.
    pub fn session(&self) -> Session {
        Session {
            mediators: self
                .catalogs
                .iter()
                .map(|(shard, catalog)| {
                    (
                        shard.clone(),
                        ConnectionMediator::new(shard.clone(), Arc::clone(catalog)),
                    )
                })
                .collect(),
        }
    }
}

/// One reconciliation run's view of the shards.
pub struct Session {
    mediators: IndexMap<Shard, ConnectionMediator>,
}

impl Session {
    pub fn mediator(&self, shard: &Shard) -> Result<&ConnectionMediator> {
        self.mediators
            .get(shard)
            .ok_or_else(|| Error::UnknownShard(shard.to_string()))
    }

    pub fn mediators(&self) -> impl Iterator<Item = &ConnectionMediator> {
        self.mediators.values()
    }

    pub fn flush_all(&self) {
        for mediator in self.mediators.values() {
            mediator.flush_cache();
        }
    }
}
