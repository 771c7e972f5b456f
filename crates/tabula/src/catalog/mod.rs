//! Physical access to a shard's system catalog.
//!
//! A [`Catalog`] answers raw metadata queries and executes DDL. It knows
//! nothing about the element model; [`SchemaReader`](crate::SchemaReader)
//! turns its rows into tables and columns, and
//! [`ConnectionMediator`](crate::ConnectionMediator) caches them.

use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

mod memory;
mod postgres;

pub use memory::MemoryCatalog;
pub use postgres::PgCatalog;

/// Boxed future returned by [`Catalog`] methods.
pub type CatalogFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CatalogError>> + Send + 'a>>;

/// Errors from the physical connection.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("{0}")]
    Other(String),
}

/// A table as listed by the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub name: String,
    pub unlogged: bool,
    pub comment: Option<String>,
}

/// A column row, shaped like `information_schema.columns`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawColumn {
    pub name: String,
    pub ordinal: i32,
    /// Underlying type name, e.g. `int4`, `varchar`, `timestamptz`.
    pub udt_name: String,
    /// SQL type name, e.g. `character varying`.
    pub data_type: String,
    pub char_length: Option<i32>,
    pub numeric_precision: Option<i32>,
    pub numeric_scale: Option<i32>,
    pub nullable: bool,
    /// Default expression as the server prints it, e.g. `'x'::text`.
    pub default: Option<String>,
    pub identity: bool,
    pub comment: Option<String>,
}

/// A secondary index that does not back a constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct RawIndex {
    pub name: String,
    pub columns: Vec<String>,
    /// Parallel to `columns`.
    pub descending: Vec<bool>,
    pub unique: bool,
    pub method: String,
}

/// A primary key, unique or foreign key constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct RawConstraint {
    pub name: String,
    /// `p`, `u` or `f`, as in `pg_constraint.contype`.
    pub kind: String,
    pub columns: Vec<String>,
    pub ref_table: Option<String>,
    pub ref_columns: Vec<String>,
    /// `pg_constraint.confdeltype` code.
    pub on_delete: Option<String>,
    /// `pg_constraint.confupdtype` code.
    pub on_update: Option<String>,
}

/// A user trigger on a table.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTrigger {
    pub name: String,
    pub comment: Option<String>,
}

/// Metadata queries and DDL execution against one shard.
///
/// All reads are scoped to the shard's namespace. Tables come back ordered
/// by name, columns by ordinal position, everything else by name.
pub trait Catalog: Send + Sync {
    fn tables(&self) -> CatalogFuture<'_, Vec<RawTable>>;

    fn columns<'a>(&'a self, table: &'a str) -> CatalogFuture<'a, Vec<RawColumn>>;

    fn indexes<'a>(&'a self, table: &'a str) -> CatalogFuture<'a, Vec<RawIndex>>;

    fn constraints<'a>(&'a self, table: &'a str) -> CatalogFuture<'a, Vec<RawConstraint>>;

    fn triggers<'a>(&'a self, table: &'a str) -> CatalogFuture<'a, Vec<RawTrigger>>;

    /// Execute DDL, possibly several statements separated by `;`.
    fn execute<'a>(&'a self, sql: &'a str) -> CatalogFuture<'a, ()>;
}
