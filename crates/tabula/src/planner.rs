//! Operation planner - orders a shard diff into executable steps.
//!
//! The planner makes sure a plan will succeed by:
//! 1. Expanding the diff into elementary operations
//! 2. Sorting them into fixed ranks (drops before creates, foreign keys
//!    outermost)
//! 3. Simulating every operation against a virtual copy of the live schema
//!    and reordering within a rank until each precondition holds
//!
//! ## Example Problem
//!
//! ```text
//! -- This fails:
//! ALTER TABLE "customer" DROP COLUMN "email";      -- index still uses it!
//! DROP INDEX "customer_email_idx";
//!
//! -- This works:
//! DROP INDEX "customer_email_idx";
//! ALTER TABLE "customer" DROP COLUMN "email";
//! ```
//!
//! Within one rank, operations that cannot be ordered at all (two new tables
//! whose inline foreign keys point at each other) are reported as a
//! [`PlanError::CycleDetected`]. Splitting foreign keys into their own pass,
//! which is the default, makes those plans possible.

use crate::{Element, ElementId, Modification, Shard, ShardDiff};
use indexmap::IndexMap;
use std::fmt;
use tabula_model::{Column, Constraint, ConstraintKind, Index, Persistence, Schema, Table};

/// Execution rank. Operations run in ascending rank order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Rank {
    DropForeignKey,
    DropConstraint,
    DropIndex,
    DropColumn,
    DropTable,
    CreateTable,
    ModifyTable,
    AddColumn,
    ModifyColumn,
    AddIndex,
    AddConstraint,
    AddForeignKey,
}

/// What an operation does.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationKind {
    /// Create a table with its columns and inline primary key and unique
    /// constraints. Secondary indexes always follow as [`OperationKind::AddIndex`];
    /// foreign keys are inline only when not split.
    CreateTable { table: Table },
    DropTable { table: Table },
    ModifyTable {
        table: String,
        from: Persistence,
        to: Persistence,
    },
    AddColumn { table: String, column: Column },
    ModifyColumn {
        table: String,
        old: Column,
        new: Column,
    },
    DropColumn { table: String, column: Column },
    AddIndex { table: String, index: Index },
    DropIndex { table: String, index: Index },
    AddConstraint {
        table: String,
        constraint: Constraint,
    },
    DropConstraint {
        table: String,
        constraint: Constraint,
    },
}

/// An operation bound to the shard it runs on.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub shard: Shard,
    pub kind: OperationKind,
}

impl Operation {
    pub fn rank(&self) -> Rank {
        match &self.kind {
            OperationKind::DropConstraint { constraint, .. } if constraint.is_foreign_key() => {
                Rank::DropForeignKey
            }
            OperationKind::DropConstraint { .. } => Rank::DropConstraint,
            OperationKind::DropIndex { .. } => Rank::DropIndex,
            OperationKind::DropColumn { .. } => Rank::DropColumn,
            OperationKind::DropTable { .. } => Rank::DropTable,
            OperationKind::CreateTable { .. } => Rank::CreateTable,
            OperationKind::ModifyTable { .. } => Rank::ModifyTable,
            OperationKind::AddColumn { .. } => Rank::AddColumn,
            OperationKind::ModifyColumn { .. } => Rank::ModifyColumn,
            OperationKind::AddIndex { .. } => Rank::AddIndex,
            OperationKind::AddConstraint { constraint, .. } if constraint.is_foreign_key() => {
                Rank::AddForeignKey
            }
            OperationKind::AddConstraint { .. } => Rank::AddConstraint,
        }
    }

    /// Identity of the element the operation targets.
    pub fn identity(&self) -> ElementId {
        match &self.kind {
            OperationKind::CreateTable { table } | OperationKind::DropTable { table } => {
                ElementId::Table(table.name.clone())
            }
            OperationKind::ModifyTable { table, .. } => ElementId::Table(table.clone()),
            OperationKind::AddColumn { table, column }
            | OperationKind::DropColumn { table, column }
            | OperationKind::ModifyColumn {
                table, new: column, ..
            } => ElementId::Column(table.clone(), column.name.clone()),
            OperationKind::AddIndex { table, index } | OperationKind::DropIndex { table, index } => {
                ElementId::Index(table.clone(), index.name.clone())
            }
            OperationKind::AddConstraint { table, constraint }
            | OperationKind::DropConstraint { table, constraint } => {
                ElementId::Constraint(table.clone(), constraint.name.clone())
            }
        }
    }

    /// Name of the table the operation touches.
    pub fn table(&self) -> &str {
        match &self.kind {
            OperationKind::CreateTable { table } | OperationKind::DropTable { table } => {
                &table.name
            }
            OperationKind::ModifyTable { table, .. }
            | OperationKind::AddColumn { table, .. }
            | OperationKind::ModifyColumn { table, .. }
            | OperationKind::DropColumn { table, .. }
            | OperationKind::AddIndex { table, .. }
            | OperationKind::DropIndex { table, .. }
            | OperationKind::AddConstraint { table, .. }
            | OperationKind::DropConstraint { table, .. } => table,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            OperationKind::CreateTable { table } => write!(f, "create table {}", table.name),
            OperationKind::DropTable { table } => write!(f, "drop table {}", table.name),
            OperationKind::ModifyTable { table, to, .. } => {
                write!(f, "set table {} {}", table, to.as_str())
            }
            OperationKind::AddColumn { table, column } => {
                write!(f, "add column {}.{}", table, column.name)
            }
            OperationKind::ModifyColumn { table, new, .. } => {
                write!(f, "modify column {}.{}", table, new.name)
            }
            OperationKind::DropColumn { table, column } => {
                write!(f, "drop column {}.{}", table, column.name)
            }
            OperationKind::AddIndex { table, index } => {
                write!(f, "add index {}.{}", table, index.name)
            }
            OperationKind::DropIndex { table, index } => {
                write!(f, "drop index {}.{}", table, index.name)
            }
            OperationKind::AddConstraint { table, constraint } => {
                write!(f, "add constraint {}.{}", table, constraint.name)
            }
            OperationKind::DropConstraint { table, constraint } => {
                write!(f, "drop constraint {}.{}", table, constraint.name)
            }
        }
    }
}

/// Error when a diff cannot be turned into an executable plan.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanError {
    /// An operation requires a table that doesn't exist.
    TableNotFound { operation: String, table: String },
    /// An operation requires a table to NOT exist, but it does.
    TableAlreadyExists { operation: String, table: String },
    /// An operation requires a column that doesn't exist.
    ColumnNotFound {
        operation: String,
        table: String,
        column: String,
    },
    /// An operation requires a column to NOT exist, but it does.
    ColumnAlreadyExists {
        operation: String,
        table: String,
        column: String,
    },
    /// An index or constraint that should exist doesn't.
    ElementNotFound {
        operation: String,
        table: String,
        name: String,
    },
    /// An index or constraint name is already taken.
    ElementAlreadyExists {
        operation: String,
        table: String,
        name: String,
    },
    /// A foreign key references a table that doesn't exist.
    ForeignKeyTargetNotFound {
        operation: String,
        source_table: String,
        target_table: String,
    },
    /// Something still depends on the element being dropped.
    StillReferenced {
        operation: String,
        /// The referencing table.
        table: String,
        /// The referencing element.
        by: String,
    },
    /// Operations form a dependency cycle that cannot be resolved.
    CycleDetected { operations: Vec<String> },
}

impl PlanError {
    /// The table whose presence (or absence) would unblock the operation.
    fn blocking_table(&self) -> Option<&str> {
        match self {
            PlanError::ForeignKeyTargetNotFound { target_table, .. } => Some(target_table),
            PlanError::TableNotFound { table, .. } | PlanError::StillReferenced { table, .. } => {
                Some(table)
            }
            _ => None,
        }
    }
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanError::TableNotFound { operation, table } => {
                write!(f, "{}: table '{}' does not exist", operation, table)
            }
            PlanError::TableAlreadyExists { operation, table } => {
                write!(f, "{}: table '{}' already exists", operation, table)
            }
            PlanError::ColumnNotFound {
                operation,
                table,
                column,
            } => {
                write!(f, "{}: column '{}.{}' does not exist", operation, table, column)
            }
            PlanError::ColumnAlreadyExists {
                operation,
                table,
                column,
            } => {
                write!(f, "{}: column '{}.{}' already exists", operation, table, column)
            }
            PlanError::ElementNotFound {
                operation,
                table,
                name,
            } => {
                write!(f, "{}: '{}.{}' does not exist", operation, table, name)
            }
            PlanError::ElementAlreadyExists {
                operation,
                table,
                name,
            } => {
                write!(f, "{}: '{}.{}' already exists", operation, table, name)
            }
            PlanError::ForeignKeyTargetNotFound {
                operation,
                source_table,
                target_table,
            } => {
                write!(
                    f,
                    "{}: foreign key from '{}' references non-existent table '{}'",
                    operation, source_table, target_table
                )
            }
            PlanError::StillReferenced {
                operation,
                table,
                by,
            } => {
                write!(f, "{}: still referenced by '{}.{}'", operation, table, by)
            }
            PlanError::CycleDetected { operations } => {
                write!(
                    f,
                    "dependency cycle detected, cannot order: {}",
                    operations.join(" -> ")
                )
            }
        }
    }
}

impl std::error::Error for PlanError {}

/// Virtual copy of a shard's schema for simulating operations.
#[derive(Debug, Clone)]
struct VirtualSchema {
    schema: Schema,
}

impl VirtualSchema {
    fn new(schema: Schema) -> Self {
        Self { schema }
    }

    fn table(&self, operation: &str, name: &str) -> Result<&Table, PlanError> {
        self.schema
            .get_table(name)
            .ok_or_else(|| PlanError::TableNotFound {
                operation: operation.to_string(),
                table: name.to_string(),
            })
    }

    fn table_mut(&mut self, operation: &str, name: &str) -> Result<&mut Table, PlanError> {
        self.schema
            .get_table_mut(name)
            .ok_or_else(|| PlanError::TableNotFound {
                operation: operation.to_string(),
                table: name.to_string(),
            })
    }

    fn require_columns<'a>(
        operation: &str,
        table: &Table,
        columns: impl IntoIterator<Item = &'a String>,
    ) -> Result<(), PlanError> {
        for column in columns {
            if !table.columns.contains_key(column) {
                return Err(PlanError::ColumnNotFound {
                    operation: operation.to_string(),
                    table: table.name.clone(),
                    column: column.clone(),
                });
            }
        }
        Ok(())
    }

    /// The target of a foreign key must exist with the referenced columns.
    /// `pending` is the table being created, which may reference itself.
    fn check_foreign_key(
        &self,
        operation: &str,
        source: &str,
        fk: &Constraint,
        pending: Option<&Table>,
    ) -> Result<(), PlanError> {
        let Some(target_name) = fk.referenced_table() else {
            return Ok(());
        };
        let target = match pending {
            Some(table) if table.name == target_name => table,
            _ => self.schema.get_table(target_name).ok_or_else(|| {
                PlanError::ForeignKeyTargetNotFound {
                    operation: operation.to_string(),
                    source_table: source.to_string(),
                    target_table: target_name.to_string(),
                }
            })?,
        };
        Self::require_columns(operation, target, fk.referenced_columns())
    }

    /// Name taken by an index or constraint in `table`.
    fn name_taken(table: &Table, name: &str) -> bool {
        table.indexes.contains_key(name) || table.constraints.contains_key(name)
    }

    /// Apply an operation, validating preconditions first. Nothing changes
    /// on error.
    fn apply(&mut self, op: &Operation) -> Result<(), PlanError> {
        let desc = op.to_string();

        match &op.kind {
            OperationKind::CreateTable { table } => {
                if self.schema.get_table(&table.name).is_some() {
                    return Err(PlanError::TableAlreadyExists {
                        operation: desc,
                        table: table.name.clone(),
                    });
                }
                for constraint in table.constraints.values() {
                    Self::require_columns(&desc, table, &constraint.columns)?;
                    self.check_foreign_key(&desc, &table.name, constraint, Some(table))?;
                }
                self.schema.add_table(table.clone());
            }

            OperationKind::DropTable { table } => {
                self.table(&desc, &table.name)?;
                if let Some((referencing, fk)) = self
                    .schema
                    .references_to(&table.name)
                    .find(|(t, _)| t.name != table.name)
                {
                    return Err(PlanError::StillReferenced {
                        operation: desc,
                        table: referencing.name.clone(),
                        by: fk.name.clone(),
                    });
                }
                self.schema.tables.shift_remove(&table.name);
            }

            OperationKind::ModifyTable { table, to, .. } => {
                self.table_mut(&desc, table)?.persistence = *to;
            }

            OperationKind::AddColumn { table, column } => {
                let target = self.table_mut(&desc, table)?;
                if target.columns.contains_key(&column.name) {
                    return Err(PlanError::ColumnAlreadyExists {
                        operation: desc,
                        table: table.clone(),
                        column: column.name.clone(),
                    });
                }
                target.columns.insert(column.name.clone(), column.clone());
            }

            OperationKind::ModifyColumn { table, new, .. } => {
                let target = self.table_mut(&desc, table)?;
                match target.columns.get_mut(&new.name) {
                    Some(existing) => *existing = new.clone(),
                    None => {
                        return Err(PlanError::ColumnNotFound {
                            operation: desc,
                            table: table.clone(),
                            column: new.name.clone(),
                        });
                    }
                }
            }

            OperationKind::DropColumn { table, column } => {
                let target = self.table(&desc, table)?;
                Self::require_columns(&desc, target, [&column.name])?;

                let still_used = target
                    .indexes
                    .values()
                    .find(|i| i.covers(&column.name))
                    .map(|i| (table.clone(), i.name.clone()))
                    .or_else(|| {
                        target
                            .constraints
                            .values()
                            .find(|c| c.covers(&column.name))
                            .map(|c| (table.clone(), c.name.clone()))
                    })
                    .or_else(|| {
                        self.schema
                            .references_to(table)
                            .find(|(_, fk)| fk.referenced_columns().contains(&column.name))
                            .map(|(t, fk)| (t.name.clone(), fk.name.clone()))
                    });
                if let Some((referencing, by)) = still_used {
                    return Err(PlanError::StillReferenced {
                        operation: desc,
                        table: referencing,
                        by,
                    });
                }
                self.table_mut(&desc, table)?
                    .columns
                    .shift_remove(&column.name);
            }

            OperationKind::AddIndex { table, index } => {
                let target = self.table(&desc, table)?;
                if Self::name_taken(target, &index.name) {
                    return Err(PlanError::ElementAlreadyExists {
                        operation: desc,
                        table: table.clone(),
                        name: index.name.clone(),
                    });
                }
                Self::require_columns(&desc, target, index.columns.iter().map(|c| &c.name))?;
                self.table_mut(&desc, table)?
                    .indexes
                    .insert(index.name.clone(), index.clone());
            }

            OperationKind::DropIndex { table, index } => {
                let target = self.table_mut(&desc, table)?;
                if target.indexes.shift_remove(&index.name).is_none() {
                    return Err(PlanError::ElementNotFound {
                        operation: desc,
                        table: table.clone(),
                        name: index.name.clone(),
                    });
                }
            }

            OperationKind::AddConstraint { table, constraint } => {
                let target = self.table(&desc, table)?;
                if Self::name_taken(target, &constraint.name) {
                    return Err(PlanError::ElementAlreadyExists {
                        operation: desc,
                        table: table.clone(),
                        name: constraint.name.clone(),
                    });
                }
                if matches!(constraint.kind, ConstraintKind::PrimaryKey)
                    && let Some(existing) = target.primary_key()
                {
                    return Err(PlanError::ElementAlreadyExists {
                        operation: desc,
                        table: table.clone(),
                        name: existing.name.clone(),
                    });
                }
                Self::require_columns(&desc, target, &constraint.columns)?;
                self.check_foreign_key(&desc, table, constraint, None)?;
                self.table_mut(&desc, table)?
                    .constraints
                    .insert(constraint.name.clone(), constraint.clone());
            }

            OperationKind::DropConstraint { table, constraint } => {
                let target = self.table(&desc, table)?;
                if !target.constraints.contains_key(&constraint.name) {
                    return Err(PlanError::ElementNotFound {
                        operation: desc,
                        table: table.clone(),
                        name: constraint.name.clone(),
                    });
                }
                // A key can't go while a foreign key relies on it.
                if !constraint.is_foreign_key() {
                    let mut key = constraint.columns.clone();
                    key.sort();
                    let dependent = self.schema.references_to(table).find(|(_, fk)| {
                        let mut referenced = fk.referenced_columns().to_vec();
                        referenced.sort();
                        referenced == key
                    });
                    if let Some((referencing, fk)) = dependent {
                        return Err(PlanError::StillReferenced {
                            operation: desc,
                            table: referencing.name.clone(),
                            by: fk.name.clone(),
                        });
                    }
                }
                self.table_mut(&desc, table)?
                    .constraints
                    .shift_remove(&constraint.name);
            }
        }

        Ok(())
    }
}

/// Orders shard diffs into operations.
#[derive(Debug, Clone)]
pub struct Planner {
    split_foreign_keys: bool,
}

impl Default for Planner {
    fn default() -> Self {
        Self {
            split_foreign_keys: true,
        }
    }
}

impl Planner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create foreign keys of new tables in a separate, final pass (the
    /// default). When off, they are part of `CREATE TABLE` and mutually
    /// referencing new tables are a cycle.
    pub fn split_foreign_keys(mut self, split: bool) -> Self {
        self.split_foreign_keys = split;
        self
    }

    pub fn from_config(config: &tabula_config::Config) -> Self {
        Self::new().split_foreign_keys(config.split_foreign_keys())
    }

    /// Produce the ordered operations for one shard.
    ///
    /// `actual` is the live schema the diff was computed against; every
    /// operation is simulated on a copy of it.
    pub fn plan(
        &self,
        shard: &Shard,
        diff: &ShardDiff,
        actual: &Schema,
    ) -> Result<Vec<Operation>, PlanError> {
        let mut operations: Vec<Operation> = self
            .expand(diff)
            .into_iter()
            .map(|kind| Operation {
                shard: shard.clone(),
                kind,
            })
            .collect();
        operations.sort_by_key(|op| (op.rank(), op.identity()));

        let ordered = schedule(actual, operations)?;
        tracing::debug!(shard = %shard, operations = ordered.len(), "planned");
        Ok(ordered)
    }

    fn expand(&self, diff: &ShardDiff) -> Vec<OperationKind> {
        let mut kinds = Vec::new();

        for (id, element) in &diff.to_remove {
            kinds.push(remove_in(id.table(), element));
        }

        for (id, element) in &diff.to_create {
            match element {
                Element::Table(table) => kinds.extend(self.create_table(table)),
                other => kinds.push(create_in(id.table(), other)),
            }
        }

        for (id, Modification { old, new }) in &diff.to_modify {
            match (old, new) {
                (Element::Table(old), Element::Table(new)) => {
                    kinds.push(OperationKind::ModifyTable {
                        table: id.table().to_string(),
                        from: old.persistence,
                        to: new.persistence,
                    });
                }
                (Element::Column(old), Element::Column(new)) => {
                    kinds.push(OperationKind::ModifyColumn {
                        table: id.table().to_string(),
                        old: old.clone(),
                        new: new.clone(),
                    });
                }
                // Indexes and constraints are replaced, never altered.
                (old, new) => {
                    kinds.push(remove_in(id.table(), old));
                    kinds.push(create_in(id.table(), new));
                }
            }
        }

        kinds
    }

    fn create_table(&self, table: &Table) -> Vec<OperationKind> {
        let mut created = table.clone();
        created.indexes.clear();
        if self.split_foreign_keys {
            created.constraints.retain(|_, c| !c.is_foreign_key());
        }

        let mut kinds = vec![OperationKind::CreateTable { table: created }];
        kinds.extend(table.indexes.values().map(|index| OperationKind::AddIndex {
            table: table.name.clone(),
            index: index.clone(),
        }));
        if self.split_foreign_keys {
            kinds.extend(
                table
                    .foreign_keys()
                    .map(|fk| OperationKind::AddConstraint {
                        table: table.name.clone(),
                        constraint: fk.clone(),
                    }),
            );
        }
        kinds
    }
}

fn remove_in(table: &str, element: &Element) -> OperationKind {
    match element {
        Element::Table(t) => OperationKind::DropTable { table: t.clone() },
        Element::Column(column) => OperationKind::DropColumn {
            table: table.to_string(),
            column: column.clone(),
        },
        Element::Index(index) => OperationKind::DropIndex {
            table: table.to_string(),
            index: index.clone(),
        },
        Element::Constraint(constraint) => OperationKind::DropConstraint {
            table: table.to_string(),
            constraint: constraint.clone(),
        },
    }
}

fn create_in(table: &str, element: &Element) -> OperationKind {
    match element {
        Element::Table(t) => OperationKind::CreateTable { table: t.clone() },
        Element::Column(column) => OperationKind::AddColumn {
            table: table.to_string(),
            column: column.clone(),
        },
        Element::Index(index) => OperationKind::AddIndex {
            table: table.to_string(),
            index: index.clone(),
        },
        Element::Constraint(constraint) => OperationKind::AddConstraint {
            table: table.to_string(),
            constraint: constraint.clone(),
        },
    }
}

/// Reorder operations within each rank until every one applies cleanly.
fn schedule(actual: &Schema, operations: Vec<Operation>) -> Result<Vec<Operation>, PlanError> {
    let mut schema = VirtualSchema::new(actual.clone());
    let mut ordered = Vec::with_capacity(operations.len());

    let mut remaining = operations.into_iter().peekable();
    while let Some(first) = remaining.next() {
        let rank = first.rank();
        let mut pending = vec![first];
        while let Some(op) = remaining.next_if(|op| op.rank() == rank) {
            pending.push(op);
        }

        // Keep passing over the rank until nothing is left or nothing moves.
        loop {
            let mut blocked = Vec::new();
            let mut errors = Vec::new();
            let mut made_progress = false;
            for op in pending {
                match schema.apply(&op) {
                    Ok(()) => {
                        ordered.push(op);
                        made_progress = true;
                    }
                    Err(e) => {
                        errors.push(e);
                        blocked.push(op);
                    }
                }
            }

            if blocked.is_empty() {
                break;
            }
            if !made_progress {
                return Err(stuck(&blocked, errors));
            }
            pending = blocked;
        }
    }

    Ok(ordered)
}

/// Explain why no blocked operation can run.
fn stuck(blocked: &[Operation], errors: Vec<PlanError>) -> PlanError {
    let tables: Vec<&str> = blocked.iter().map(|op| op.table()).collect();
    let is_cycle = blocked.len() > 1
        && errors.iter().zip(blocked).all(|(error, op)| {
            error
                .blocking_table()
                .is_some_and(|t| t != op.table() && tables.contains(&t))
        });

    if is_cycle {
        return PlanError::CycleDetected {
            operations: blocked.iter().map(|op| op.to_string()).collect(),
        };
    }
    errors
        .into_iter()
        .next()
        .unwrap_or_else(|| PlanError::CycleDetected {
            operations: blocked.iter().map(|op| op.to_string()).collect(),
        })
}

/// Ordered operations for every shard.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub shards: IndexMap<Shard, Vec<Operation>>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.shards.values().all(Vec::is_empty)
    }

    /// Total number of operations.
    pub fn len(&self) -> usize {
        self.shards.values().map(Vec::len).sum()
    }

    pub fn operations(&self, shard: &Shard) -> &[Operation] {
        self.shards.get(shard).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (shard, operations) in &self.shards {
            writeln!(f, "{}:", shard)?;
            for op in operations {
                writeln!(f, "  {}", op)?;
            }
        }
        Ok(())
    }
}

/// Apply `operations` to a copy of `actual` and return the result.
///
/// This is what the database looks like after a successful apply, which
/// makes it useful for dry runs and for checking that a plan converges.
pub fn simulate(actual: &Schema, operations: &[Operation]) -> Result<Schema, PlanError> {
    let mut schema = VirtualSchema::new(actual.clone());
    for op in operations {
        schema.apply(op)?;
    }
    Ok(schema.schema)
}
