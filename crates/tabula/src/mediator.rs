//! Cached access to one shard's catalog.

use crate::Shard;
use crate::catalog::{
    Catalog, CatalogError, RawColumn, RawConstraint, RawIndex, RawTable, RawTrigger,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CacheKey {
    Tables,
    Columns(String),
    Indexes(String),
    Constraints(String),
    Triggers(String),
}

#[derive(Debug, Clone)]
enum CacheEntry {
    Tables(Vec<RawTable>),
    Columns(Vec<RawColumn>),
    Indexes(Vec<RawIndex>),
    Constraints(Vec<RawConstraint>),
    Triggers(Vec<RawTrigger>),
}

/// The single point through which metadata is read and DDL is executed on
/// one shard.
///
/// Metadata reads are cached per `(kind, table)` so repeated introspection
/// within a run costs one catalog query each. Anything executed through
/// [`ConnectionMediator::execute`] invalidates the whole cache; a change made
/// behind the mediator's back is only seen after [`flush_cache`].
///
/// [`flush_cache`]: ConnectionMediator::flush_cache
pub struct ConnectionMediator {
    shard: Shard,
    catalog: Arc<dyn Catalog>,
    cache: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl ConnectionMediator {
    pub fn new(shard: Shard, catalog: Arc<dyn Catalog>) -> Self {
        Self {
            shard,
            catalog,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn shard(&self) -> &Shard {
        &self.shard
    }

    /// Tables in the shard's namespace, ordered by name.
    pub async fn read_tables(&self) -> Result<Vec<RawTable>, CatalogError> {
        if let Some(CacheEntry::Tables(rows)) = self.lookup(&CacheKey::Tables) {
            return Ok(rows);
        }
        let rows = self.catalog.tables().await?;
        self.store(CacheKey::Tables, CacheEntry::Tables(rows.clone()));
        Ok(rows)
    }

    pub async fn read_table_names(&self) -> Result<Vec<String>, CatalogError> {
        Ok(self
            .read_tables()
            .await?
            .into_iter()
            .map(|t| t.name)
            .collect())
    }

    /// Options of a single table, `None` if it does not exist.
    pub async fn read_table_options(&self, table: &str) -> Result<Option<RawTable>, CatalogError> {
        Ok(self
            .read_tables()
            .await?
            .into_iter()
            .find(|t| t.name == table))
    }

    pub async fn read_columns(&self, table: &str) -> Result<Vec<RawColumn>, CatalogError> {
        let key = CacheKey::Columns(table.to_string());
        if let Some(CacheEntry::Columns(rows)) = self.lookup(&key) {
            return Ok(rows);
        }
        let rows = self.catalog.columns(table).await?;
        self.store(key, CacheEntry::Columns(rows.clone()));
        Ok(rows)
    }

    pub async fn read_indexes(&self, table: &str) -> Result<Vec<RawIndex>, CatalogError> {
        let key = CacheKey::Indexes(table.to_string());
        if let Some(CacheEntry::Indexes(rows)) = self.lookup(&key) {
            return Ok(rows);
        }
        let rows = self.catalog.indexes(table).await?;
        self.store(key, CacheEntry::Indexes(rows.clone()));
        Ok(rows)
    }

    pub async fn read_constraints(&self, table: &str) -> Result<Vec<RawConstraint>, CatalogError> {
        let key = CacheKey::Constraints(table.to_string());
        if let Some(CacheEntry::Constraints(rows)) = self.lookup(&key) {
            return Ok(rows);
        }
        let rows = self.catalog.constraints(table).await?;
        self.store(key, CacheEntry::Constraints(rows.clone()));
        Ok(rows)
    }

    pub async fn read_triggers(&self, table: &str) -> Result<Vec<RawTrigger>, CatalogError> {
        let key = CacheKey::Triggers(table.to_string());
        if let Some(CacheEntry::Triggers(rows)) = self.lookup(&key) {
            return Ok(rows);
        }
        let rows = self.catalog.triggers(table).await?;
        self.store(key, CacheEntry::Triggers(rows.clone()));
        Ok(rows)
    }

    /// Execute DDL. The cache is flushed whether or not it succeeds.
    pub async fn execute(&self, sql: &str) -> Result<(), CatalogError> {
        let result = self.catalog.execute(sql).await;
        self.flush_cache();
        result
    }

    /// Drop every cached read. Safe to call any number of times.
    pub fn flush_cache(&self) {
        let mut cache = self.lock();
        if !cache.is_empty() {
            trace!(shard = %self.shard, entries = cache.len(), "flushing metadata cache");
            cache.clear();
        }
    }

    /// Number of cached reads.
    pub fn cached_entries(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.lock().get(key).cloned();
        match &entry {
            Some(_) => trace!(shard = %self.shard, ?key, "metadata cache hit"),
            None => trace!(shard = %self.shard, ?key, "metadata cache miss"),
        }
        entry
    }

    fn store(&self, key: CacheKey, entry: CacheEntry) {
        self.lock().insert(key, entry);
    }
}
