//! Declarative schema reconciliation for PostgreSQL.
//!
//! tabula takes a declared schema (tables, columns, indexes and constraints,
//! each table assigned to a shard), reads what every shard actually contains,
//! and converges the two:
//!
//! 1. [`Sharding`] enumerates shards and opens a per-run [`Session`] of
//!    caching [`ConnectionMediator`]s.
//! 2. A [`DeclarationSource`] produces the declared [`Schema`] per shard;
//!    [`SchemaReader`] produces the actual one.
//! 3. [`SchemaDiff`] compares them element by element.
//! 4. [`Planner`] orders the diff into [`Operation`]s.
//! 5. [`Applier`] renders each operation to DDL and executes it.
//!
//! [`Reconciler`] runs the whole loop. Running it twice with unchanged
//! declarations must produce an empty diff the second time:
//!
//! ```ignore
//! let config = tabula_config::load()?.0;
//! let sharding = Sharding::from_config(&config)?;
//! let declarations = FileDeclarations::load("schema/tables.styx".into())?;
//! let reconciler = Reconciler::new(sharding, declarations);
//!
//! let report = reconciler.reconcile().await?;
//! report.into_result()?;
//! assert!(reconciler.diff().await?.get().is_none());
//! ```

mod applier;
pub mod catalog;
pub mod ddl;
mod diff;
mod engine;
mod error;
mod mediator;
mod planner;
mod reader;
mod resolver;
mod sharding;
mod traced;

pub use applier::{ApplyReport, Applier, ShardOutcome};
pub use catalog::{Catalog, CatalogError, MemoryCatalog, PgCatalog};
pub use diff::{Element, ElementId, Modification, SchemaDiff, ShardDiff};
pub use engine::Reconciler;
pub use error::Error;
pub use mediator::ConnectionMediator;
pub use planner::{Operation, OperationKind, Plan, PlanError, Planner, Rank, simulate};
pub use reader::SchemaReader;
pub use resolver::{DeclarationError, DeclarationSource, FileDeclarations};
pub use sharding::{Session, Shard, Sharding};
pub use traced::{TracedObject, TracedPool};

pub use tabula_model::*;

/// Result type for tabula operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
