//! The reconciliation loop.

use crate::{
    Applier, ApplyReport, DeclarationSource, Error, Operation, Plan, Planner, Result,
    SchemaDiff, SchemaReader, Session, Shard, ShardDiff, ShardOutcome, Sharding,
};
use indexmap::IndexMap;
use std::time::Instant;
use tabula_model::{Normalizers, Schema};
use tracing::{info, warn};

/// Converges every shard to its declared schema.
///
/// Each call opens a fresh [`Session`], so nothing read in one call is
/// reused by the next.
pub struct Reconciler<D> {
    sharding: Sharding,
    declarations: D,
    normalizers: Normalizers,
    planner: Planner,
    applier: Applier,
}

impl<D: DeclarationSource> Reconciler<D> {
    pub fn new(sharding: Sharding, declarations: D) -> Self {
        Self {
            sharding,
            declarations,
            normalizers: Normalizers::default(),
            planner: Planner::default(),
            applier: Applier::default(),
        }
    }

    /// Use these rules for both declared and actual defaults.
    pub fn with_normalizers(mut self, normalizers: Normalizers) -> Self {
        self.normalizers = normalizers;
        self
    }

    pub fn with_planner(mut self, planner: Planner) -> Self {
        self.planner = planner;
        self
    }

    pub fn sharding(&self) -> &Sharding {
        &self.sharding
    }

    fn reader(&self) -> SchemaReader {
        SchemaReader::new(self.normalizers.clone())
    }

    /// Declared schemas, normalized, one per shard.
    pub fn declared(&self) -> Result<IndexMap<Shard, Schema>> {
        let mut declared = self.declarations.declared(&self.sharding)?;
        for schema in declared.values_mut() {
            self.normalizers.normalize_schema(schema);
        }
        Ok(declared)
    }

    /// What would change, without changing anything.
    ///
    /// Covers every shard or none: the first shard that cannot be read
    /// fails the call with [`Error::Introspection`] naming it. Use
    /// [`Reconciler::reconcile`] to get per-shard outcomes.
    pub async fn diff(&self) -> Result<SchemaDiff> {
        let declared = self.declared()?;
        let session = self.sharding.session();
        let reader = self.reader();

        let mut diffs = Vec::new();
        for (shard, schema) in &declared {
            let actual = reader.read(&session, shard).await?;
            diffs.push((shard.clone(), ShardDiff::compute(schema, &actual)));
        }
        Ok(SchemaDiff::from_shards(diffs))
    }

    /// The operations a reconcile would run, without running them.
    ///
    /// Like [`Reconciler::diff`], fails on the first shard that cannot be
    /// read or planned.
    pub async fn plan(&self) -> Result<Plan> {
        let declared = self.declared()?;
        let session = self.sharding.session();

        let mut plan = Plan::default();
        for (shard, schema) in &declared {
            let operations = self.plan_shard(&session, shard, schema).await?;
            if !operations.is_empty() {
                plan.shards.insert(shard.clone(), operations);
            }
        }
        Ok(plan)
    }

    async fn plan_shard(
        &self,
        session: &Session,
        shard: &Shard,
        declared: &Schema,
    ) -> Result<Vec<Operation>> {
        let actual = self.reader().read(session, shard).await?;
        let diff = ShardDiff::compute(declared, &actual);
        if diff.is_empty() {
            return Ok(Vec::new());
        }
        self.planner
            .plan(shard, &diff, &actual)
            .map_err(|source| Error::Planning {
                shard: shard.clone(),
                source,
            })
    }

    /// Read, diff, plan and apply every shard.
    ///
    /// Declaration errors fail the whole run before anything is touched.
    /// After that each shard stands alone: an introspection, planning or
    /// execution failure is recorded in that shard's outcome and the next
    /// shard proceeds.
    pub async fn reconcile(&self) -> Result<ApplyReport> {
        let start = Instant::now();
        let declared = self.declared()?;
        let session = self.sharding.session();

        let mut report = ApplyReport::default();
        for (shard, schema) in &declared {
            let outcome = match self.plan_shard(&session, shard, schema).await {
                Ok(operations) if operations.is_empty() => {
                    info!(shard = %shard, "up to date");
                    ShardOutcome::default()
                }
                Ok(operations) => {
                    self.applier
                        .apply_shard(&session, shard, &operations)
                        .await
                }
                Err(e) => {
                    warn!(shard = %shard, error = %e, "skipping shard");
                    ShardOutcome::failure(e)
                }
            };
            report.outcomes.insert(shard.clone(), outcome);
        }
        session.flush_all();

        info!(
            shards = report.outcomes.len(),
            applied = report.applied(),
            failed = report.failures().count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "reconciled"
        );
        Ok(report)
    }

    /// The `CREATE TABLE` statement for a table as it currently exists.
    pub async fn create_table_sql(&self, shard: &Shard, table: &str) -> Result<Option<String>> {
        let session = self.sharding.session();
        self.reader().create_table_sql(&session, shard, table).await
    }
}
