use crate::{CatalogError, DeclarationError, PlanError, Shard};
use tabula_config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Reading the live schema failed. Fatal for that shard only.
    #[error("introspection of shard '{shard}' failed: {source}")]
    Introspection {
        shard: Shard,
        #[source]
        source: CatalogError,
    },

    /// The diff cannot be ordered into an executable plan.
    #[error("planning for shard '{shard}' failed: {source}")]
    Planning {
        shard: Shard,
        #[source]
        source: PlanError,
    },

    /// A DDL statement failed. Later operations on the shard were skipped.
    #[error("{operation} on shard '{shard}' failed: {source}")]
    Apply {
        shard: Shard,
        operation: String,
        #[source]
        source: CatalogError,
    },

    #[error("unknown shard '{0}'")]
    UnknownShard(String),

    #[error("invalid declaration: {0}")]
    Declaration(#[from] DeclarationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot set up shard '{shard}': {reason}")]
    Connect { shard: String, reason: String },
}

impl Error {
    /// The shard an error is attached to, if any.
    pub fn shard(&self) -> Option<&Shard> {
        match self {
            Error::Introspection { shard, .. }
            | Error::Planning { shard, .. }
            | Error::Apply { shard, .. } => Some(shard),
            _ => None,
        }
    }

    /// Whether this is a dependency cycle the caller could break by
    /// splitting foreign keys into a later pass.
    pub fn is_cycle(&self) -> bool {
        matches!(
            self,
            Error::Planning {
                source: PlanError::CycleDetected { .. },
                ..
            }
        )
    }
}
