//! Executing planned operations.

use crate::{
    CatalogError, ConnectionMediator, Error, Operation, Plan, Result, Session, Shard, ddl,
};
use indexmap::IndexMap;
use std::time::Instant;
use tracing::{info, warn};

/// What happened on one shard.
#[derive(Debug, Default)]
pub struct ShardOutcome {
    /// Operations that completed.
    pub applied: usize,
    /// Operations never attempted because an earlier one failed.
    pub skipped: usize,
    /// The first failure, if any.
    pub error: Option<Error>,
}

impl ShardOutcome {
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }

    /// An outcome for a shard that failed before anything was attempted.
    pub fn failure(error: Error) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }
}

/// Per-shard results of a run. A failure on one shard never stops the
/// others.
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub outcomes: IndexMap<Shard, ShardOutcome>,
}

impl ApplyReport {
    pub fn is_success(&self) -> bool {
        !self.outcomes.values().any(ShardOutcome::failed)
    }

    pub fn applied(&self) -> usize {
        self.outcomes.values().map(|o| o.applied).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Shard, &Error)> {
        self.outcomes
            .iter()
            .filter_map(|(shard, o)| o.error.as_ref().map(|e| (shard, e)))
    }

    /// The first error, in shard order.
    pub fn into_result(self) -> Result<()> {
        match self.outcomes.into_values().find_map(|o| o.error) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Renders operations to DDL and executes them through each shard's
/// mediator.
///
/// Within a shard, operations run in plan order and the first failure stops
/// the shard: a later operation may depend on the failed one. Nothing is
/// rolled back; operations that already ran stay applied.
#[derive(Debug, Clone, Default)]
pub struct Applier;

impl Applier {
    pub fn new() -> Self {
        Self
    }

    /// Apply every shard of `plan`, one after another.
    pub async fn apply(&self, plan: &Plan, session: &Session) -> ApplyReport {
        let mut report = ApplyReport::default();
        for (shard, operations) in &plan.shards {
            let outcome = self.apply_shard(session, shard, operations).await;
            report.outcomes.insert(shard.clone(), outcome);
        }
        report
    }

    pub async fn apply_shard(
        &self,
        session: &Session,
        shard: &Shard,
        operations: &[Operation],
    ) -> ShardOutcome {
        let mediator = match session.mediator(shard) {
            Ok(mediator) => mediator,
            Err(e) => return ShardOutcome::failure(e),
        };

        let start = Instant::now();
        let mut outcome = ShardOutcome::default();

        for (i, op) in operations.iter().enumerate() {
            match execute(mediator, op).await {
                Ok(()) => {
                    info!(shard = %shard, "{}", op);
                    outcome.applied += 1;
                }
                Err(source) => {
                    outcome.skipped = operations.len() - i - 1;
                    warn!(
                        shard = %shard,
                        operation = %op,
                        error = %source,
                        skipped = outcome.skipped,
                        "operation failed, stopping shard"
                    );
                    outcome.error = Some(Error::Apply {
                        shard: shard.clone(),
                        operation: op.to_string(),
                        source,
                    });
                    break;
                }
            }
        }

        mediator.flush_cache();
        info!(
            shard = %shard,
            applied = outcome.applied,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "applied operations"
        );
        outcome
    }
}

async fn execute(mediator: &ConnectionMediator, op: &Operation) -> Result<(), CatalogError> {
    for statement in ddl::render(op) {
        mediator.execute(&statement).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryCatalog, OperationKind, Sharding};
    use std::sync::Arc;
    use tabula_model::{Column, ColumnKind, Table};

    fn create(shard: &str, table: &str) -> Operation {
        Operation {
            shard: Shard::new(shard),
            kind: OperationKind::CreateTable {
                table: Table::new(table).with_column(Column::new("id", ColumnKind::integer())),
            },
        }
    }

    #[tokio::test]
    async fn test_stops_at_first_failure_per_shard() {
        let main = Arc::new(MemoryCatalog::new());
        let sales = Arc::new(MemoryCatalog::new());
        main.fail_on("\"b\"");
        let sharding = Sharding::new("main", main.clone()).with_shard("sales", sales.clone());

        let mut plan = Plan::default();
        plan.shards.insert(
            Shard::new("main"),
            vec![create("main", "a"), create("main", "b"), create("main", "c")],
        );
        plan.shards
            .insert(Shard::new("sales"), vec![create("sales", "d")]);

        let session = sharding.session();
        let report = Applier::new().apply(&plan, &session).await;

        let main_outcome = &report.outcomes[&Shard::new("main")];
        assert_eq!(main_outcome.applied, 1);
        assert_eq!(main_outcome.skipped, 1);
        assert!(matches!(
            &main_outcome.error,
            Some(Error::Apply { operation, .. }) if operation == "create table b"
        ));

        let sales_outcome = &report.outcomes[&Shard::new("sales")];
        assert_eq!(sales_outcome.applied, 1);
        assert!(!sales_outcome.failed());

        assert!(!report.is_success());
        assert_eq!(report.applied(), 2);
        assert_eq!(report.failures().count(), 1);
        assert_eq!(main.executed().len(), 1);
        assert!(report.into_result().is_err());
    }

    #[tokio::test]
    async fn test_empty_plan_succeeds() {
        let sharding = Sharding::single(Arc::new(MemoryCatalog::new()));
        let report = Applier::new()
            .apply(&Plan::default(), &sharding.session())
            .await;
        assert!(report.is_success());
        assert!(report.into_result().is_ok());
    }
}
