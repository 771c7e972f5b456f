//! An in-process catalog for tests and dry runs.

use super::{
    Catalog, CatalogError, CatalogFuture, RawColumn, RawConstraint, RawIndex, RawTable,
    RawTrigger,
};
use crate::ddl;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tabula_model::{
    Column, ColumnKind, Constraint, ConstraintKind, FkAction, Index, IntegerSize, Persistence,
    Schema, SortOrder, Table,
};
use tabula_sql::{Lit, on_update_trigger_name};

/// A [`Catalog`] that serves rows from memory.
///
/// Rows are rendered from a [`Schema`] the way PostgreSQL reports them
/// (`'x'::character varying`, padded numeric defaults, single-letter
/// foreign key action codes), so the reader's parsing is exercised without
/// a server. DDL passed to `execute` is only recorded; to move the catalog
/// forward, call [`MemoryCatalog::set_schema`] with the expected result.
#[derive(Default)]
pub struct MemoryCatalog {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    tables: Vec<MemoryTable>,
    executed: Vec<String>,
    fail_on: Option<String>,
    unreachable: bool,
    reads: usize,
}

#[derive(Debug, Clone)]
struct MemoryTable {
    raw: RawTable,
    columns: Vec<RawColumn>,
    indexes: Vec<RawIndex>,
    constraints: Vec<RawConstraint>,
    triggers: Vec<RawTrigger>,
}

impl MemoryCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog holding `schema`.
    pub fn from_schema(schema: &Schema) -> Self {
        let catalog = Self::new();
        catalog.set_schema(schema);
        catalog
    }

    /// Replace every table with the rows for `schema`.
    pub fn set_schema(&self, schema: &Schema) {
        let mut tables: Vec<MemoryTable> = schema.iter_tables().map(render_table).collect();
        tables.sort_by(|a, b| a.raw.name.cmp(&b.raw.name));
        self.lock().tables = tables;
    }

    /// Add a table from raw rows, e.g. to hold a column type the model has
    /// no variant for.
    pub fn insert_raw_table(&self, table: RawTable, columns: Vec<RawColumn>) {
        let mut state = self.lock();
        state.tables.retain(|t| t.raw.name != table.name);
        state.tables.push(MemoryTable {
            raw: table,
            columns,
            indexes: Vec::new(),
            constraints: Vec::new(),
            triggers: Vec::new(),
        });
        state.tables.sort_by(|a, b| a.raw.name.cmp(&b.raw.name));
    }

    /// Make every statement containing `pattern` fail.
    pub fn fail_on(&self, pattern: impl Into<String>) {
        self.lock().fail_on = Some(pattern.into());
    }

    /// Make every read fail, as if the server could not be reached.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    /// Statements passed to `execute` that succeeded, in order.
    pub fn executed(&self) -> Vec<String> {
        self.lock().executed.clone()
    }

    /// Number of metadata reads served so far.
    pub fn read_count(&self) -> usize {
        self.lock().reads
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read<T>(&self, select: impl FnOnce(&MemoryState) -> T) -> Result<T, CatalogError> {
        let mut state = self.lock();
        if state.unreachable {
            return Err(CatalogError::Other("shard unreachable".to_string()));
        }
        state.reads += 1;
        Ok(select(&state))
    }
}

impl MemoryState {
    fn table(&self, name: &str) -> Option<&MemoryTable> {
        self.tables.iter().find(|t| t.raw.name == name)
    }
}

impl Catalog for MemoryCatalog {
    fn tables(&self) -> CatalogFuture<'_, Vec<RawTable>> {
        let result = self.read(|state| state.tables.iter().map(|t| t.raw.clone()).collect());
        Box::pin(async move { result })
    }

    fn columns<'a>(&'a self, table: &'a str) -> CatalogFuture<'a, Vec<RawColumn>> {
        let result = self.read(|state| {
            state
                .table(table)
                .map(|t| t.columns.clone())
                .unwrap_or_default()
        });
        Box::pin(async move { result })
    }

    fn indexes<'a>(&'a self, table: &'a str) -> CatalogFuture<'a, Vec<RawIndex>> {
        let result = self.read(|state| {
            state
                .table(table)
                .map(|t| t.indexes.clone())
                .unwrap_or_default()
        });
        Box::pin(async move { result })
    }

    fn constraints<'a>(&'a self, table: &'a str) -> CatalogFuture<'a, Vec<RawConstraint>> {
        let result = self.read(|state| {
            state
                .table(table)
                .map(|t| t.constraints.clone())
                .unwrap_or_default()
        });
        Box::pin(async move { result })
    }

    fn triggers<'a>(&'a self, table: &'a str) -> CatalogFuture<'a, Vec<RawTrigger>> {
        let result = self.read(|state| {
            state
                .table(table)
                .map(|t| t.triggers.clone())
                .unwrap_or_default()
        });
        Box::pin(async move { result })
    }

    fn execute<'a>(&'a self, sql: &'a str) -> CatalogFuture<'a, ()> {
        let result = {
            let mut state = self.lock();
            let rejected = state
                .fail_on
                .as_deref()
                .is_some_and(|pattern| sql.contains(pattern));
            if rejected {
                Err(CatalogError::Other(format!("statement rejected: {}", sql)))
            } else {
                state.executed.push(sql.to_string());
                Ok(())
            }
        };
        Box::pin(async move { result })
    }
}

fn render_table(table: &Table) -> MemoryTable {
    let mut indexes: Vec<RawIndex> = table.indexes.values().map(render_index).collect();
    indexes.sort_by(|a, b| a.name.cmp(&b.name));

    let mut constraints: Vec<RawConstraint> =
        table.constraints.values().map(render_constraint).collect();
    constraints.sort_by(|a, b| a.name.cmp(&b.name));

    let mut triggers: Vec<RawTrigger> = table
        .columns
        .values()
        .filter_map(|column| {
            column.on_update().map(|expr| RawTrigger {
                name: on_update_trigger_name(&table.name, &column.name),
                comment: Some(ddl::on_update_comment(&column.name, expr)),
            })
        })
        .collect();
    triggers.sort_by(|a, b| a.name.cmp(&b.name));

    MemoryTable {
        raw: RawTable {
            name: table.name.clone(),
            unlogged: table.persistence == Persistence::Unlogged,
            comment: table.comment.clone(),
        },
        columns: table
            .columns
            .values()
            .zip(1..)
            .map(|(column, ordinal)| render_column(ordinal, column))
            .collect(),
        indexes,
        constraints,
        triggers,
    }
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn render_column(ordinal: i32, column: &Column) -> RawColumn {
    let (udt_name, data_type, char_length, numeric_precision, numeric_scale) = match &column.kind
    {
        ColumnKind::Integer { size, .. } => match size {
            IntegerSize::SmallInt => ("int2", "smallint", None, Some(16), Some(0)),
            IntegerSize::Integer => ("int4", "integer", None, Some(32), Some(0)),
            IntegerSize::BigInt => ("int8", "bigint", None, Some(64), Some(0)),
        },
        ColumnKind::Decimal {
            precision, scale, ..
        } => (
            "numeric",
            "numeric",
            None,
            Some(to_i32(*precision)),
            Some(to_i32(*scale)),
        ),
        ColumnKind::Float { double: false, .. } => ("float4", "real", None, Some(24), None),
        ColumnKind::Float { double: true, .. } => {
            ("float8", "double precision", None, Some(53), None)
        }
        ColumnKind::Boolean { .. } => ("bool", "boolean", None, None, None),
        ColumnKind::Varchar { length, .. } => (
            "varchar",
            "character varying",
            Some(to_i32(*length)),
            None,
            None,
        ),
        ColumnKind::Text { .. } => ("text", "text", None, None, None),
        ColumnKind::Blob => ("bytea", "bytea", None, None, None),
        ColumnKind::Timestamp {
            time_zone: false, ..
        } => ("timestamp", "timestamp without time zone", None, None, None),
        ColumnKind::Timestamp {
            time_zone: true, ..
        } => ("timestamptz", "timestamp with time zone", None, None, None),
        ColumnKind::Date { .. } => ("date", "date", None, None, None),
        ColumnKind::Json => ("jsonb", "jsonb", None, None, None),
        ColumnKind::Uuid { .. } => ("uuid", "uuid", None, None, None),
        ColumnKind::Unknown { native_type, .. } => {
            (native_type.as_str(), native_type.as_str(), None, None, None)
        }
    };

    RawColumn {
        name: column.name.clone(),
        ordinal,
        udt_name: udt_name.to_string(),
        data_type: data_type.to_string(),
        char_length,
        numeric_precision,
        numeric_scale,
        nullable: column.nullable,
        default: render_default(column, data_type),
        identity: column.is_identity(),
        comment: column.comment.clone(),
    }
}

/// The default expression as `information_schema.columns.column_default`
/// would print it.
fn render_default(column: &Column, data_type: &str) -> Option<String> {
    let value = column.default()?;
    let negative = value.starts_with('-');
    Some(match &column.kind {
        ColumnKind::Integer { .. } | ColumnKind::Float { .. } if negative => {
            format!("{}::{}", Lit(value), data_type)
        }
        ColumnKind::Decimal { scale, .. } => {
            let padded = pad_scale(value, *scale);
            if negative {
                format!("{}::numeric", Lit(&padded))
            } else {
                padded
            }
        }
        ColumnKind::Varchar { .. } | ColumnKind::Text { .. } => {
            format!("{}::{}", Lit(value), data_type)
        }
        ColumnKind::Timestamp { .. } | ColumnKind::Date { .. } | ColumnKind::Uuid { .. }
            if !ddl::is_sql_expression(value) =>
        {
            format!("{}::{}", Lit(value), data_type)
        }
        _ => value.to_string(),
    })
}

/// `5` at scale 2 is printed as `5.00`.
fn pad_scale(value: &str, scale: u32) -> String {
    if scale == 0 {
        return value.to_string();
    }
    let scale = scale as usize;
    match value.split_once('.') {
        Some((whole, fraction)) if fraction.len() < scale => {
            format!("{}.{:0<width$}", whole, fraction, width = scale)
        }
        Some(_) => value.to_string(),
        None => format!("{}.{}", value, "0".repeat(scale)),
    }
}

fn render_index(index: &Index) -> RawIndex {
    RawIndex {
        name: index.name.clone(),
        columns: index.columns.iter().map(|c| c.name.clone()).collect(),
        descending: index
            .columns
            .iter()
            .map(|c| c.order == SortOrder::Desc)
            .collect(),
        unique: index.unique,
        method: index.method.as_str().to_string(),
    }
}

fn action_code(action: FkAction) -> &'static str {
    match action {
        FkAction::NoAction => "a",
        FkAction::Restrict => "r",
        FkAction::Cascade => "c",
        FkAction::SetNull => "n",
        FkAction::SetDefault => "d",
    }
}

fn render_constraint(constraint: &Constraint) -> RawConstraint {
    let (kind, ref_table, ref_columns, on_delete, on_update) = match &constraint.kind {
        ConstraintKind::PrimaryKey => ("p", None, Vec::new(), None, None),
        ConstraintKind::Unique => ("u", None, Vec::new(), None, None),
        ConstraintKind::ForeignKey {
            ref_table,
            ref_columns,
            on_delete,
            on_update,
        } => (
            "f",
            Some(ref_table.clone()),
            ref_columns.clone(),
            Some(action_code(*on_delete).to_string()),
            Some(action_code(*on_update).to_string()),
        ),
    };
    RawConstraint {
        name: constraint.name.clone(),
        kind: kind.to_string(),
        columns: constraint.columns.clone(),
        ref_table,
        ref_columns,
        on_delete,
        on_update,
    }
}
