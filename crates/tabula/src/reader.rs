//! Turning catalog rows back into the element model.

use crate::catalog::{CatalogError, RawColumn, RawConstraint, RawIndex, RawTable};
use crate::{ConnectionMediator, Error, Result, Session, Shard, ddl};
use tabula_model::{
    Column, ColumnKind, Constraint, ConstraintKind, FkAction, Index, IndexColumn, IndexMethod,
    IntegerSize, Normalizers, Persistence, Schema, SortOrder, Table,
};
use tabula_sql::normalize_sql_expr;
use tracing::{debug, warn};

/// Reads the actual schema of a shard.
///
/// Every default and on-update expression is normalized with the same
/// [`Normalizers`] the declared side goes through, so that `now()` read back
/// from the server compares equal to a declared `CURRENT_TIMESTAMP`.
#[derive(Debug, Clone, Default)]
pub struct SchemaReader {
    normalizers: Normalizers,
}

impl SchemaReader {
    pub fn new(normalizers: Normalizers) -> Self {
        Self { normalizers }
    }

    /// Read every table of `shard`.
    pub async fn read(&self, session: &Session, shard: &Shard) -> Result<Schema> {
        let mediator = session.mediator(shard)?;
        self.read_from(mediator)
            .await
            .map_err(|source| Error::Introspection {
                shard: shard.clone(),
                source,
            })
    }

    pub async fn read_from(&self, mediator: &ConnectionMediator) -> Result<Schema, CatalogError> {
        let mut schema = Schema::new();
        for raw in mediator.read_tables().await? {
            schema.add_table(self.read_table(mediator, raw).await?);
        }
        debug!(
            shard = %mediator.shard(),
            tables = schema.tables.len(),
            "read actual schema"
        );
        Ok(schema)
    }

    async fn read_table(
        &self,
        mediator: &ConnectionMediator,
        raw: RawTable,
    ) -> Result<Table, CatalogError> {
        let mut table = Table::new(&raw.name);
        table.comment = raw.comment;
        if raw.unlogged {
            table.persistence = Persistence::Unlogged;
        }

        for raw_column in mediator.read_columns(&raw.name).await? {
            let column = column_from_raw(&raw.name, raw_column);
            table.columns.insert(column.name.clone(), column);
        }

        for trigger in mediator.read_triggers(&raw.name).await? {
            let Some((column, expr)) = trigger
                .comment
                .as_deref()
                .and_then(ddl::parse_on_update_comment)
            else {
                continue;
            };
            match table.columns.get_mut(&column) {
                Some(c) if matches!(c.kind, ColumnKind::Timestamp { .. }) => {
                    c.kind = c.kind.clone().with_on_update(expr);
                }
                _ => warn!(
                    table = %raw.name,
                    trigger = %trigger.name,
                    column = %column,
                    "on-update trigger for a column that is not a timestamp, ignoring"
                ),
            }
        }

        for column in table.columns.values_mut() {
            self.normalizers.normalize_column(column);
        }

        for raw_index in mediator.read_indexes(&raw.name).await? {
            let index = index_from_raw(&raw.name, raw_index);
            table.indexes.insert(index.name.clone(), index);
        }

        for raw_constraint in mediator.read_constraints(&raw.name).await? {
            if let Some(constraint) = constraint_from_raw(&raw.name, raw_constraint) {
                table.constraints.insert(constraint.name.clone(), constraint);
            }
        }

        Ok(table)
    }

    /// The `CREATE TABLE` statement that would rebuild `table` as it
    /// currently exists, followed by its indexes. `None` if there is no such
    /// table.
    pub async fn create_table_sql(
        &self,
        session: &Session,
        shard: &Shard,
        table: &str,
    ) -> Result<Option<String>> {
        let mediator = session.mediator(shard)?;
        let introspection = |source| Error::Introspection {
            shard: shard.clone(),
            source,
        };

        let Some(raw) = mediator
            .read_table_options(table)
            .await
            .map_err(introspection)?
        else {
            return Ok(None);
        };
        let table = self
            .read_table(mediator, raw)
            .await
            .map_err(introspection)?;

        let mut statements = vec![ddl::create_table(&table)];
        let mut indexes: Vec<&Index> = table.indexes.values().collect();
        indexes.sort_by(|a, b| a.name.cmp(&b.name));
        statements.extend(indexes.into_iter().map(|i| ddl::create_index(&table.name, i)));
        Ok(Some(statements.join(";\n")))
    }
}

fn column_from_raw(table: &str, raw: RawColumn) -> Column {
    let default = raw.default.as_deref().and_then(parse_default);
    let sequence = raw
        .default
        .as_deref()
        .is_some_and(|d| d.trim_start().starts_with("nextval("));

    let kind = match raw.udt_name.as_str() {
        "int2" | "int4" | "int8" => {
            let size = match raw.udt_name.as_str() {
                "int2" => IntegerSize::SmallInt,
                "int4" => IntegerSize::Integer,
                _ => IntegerSize::BigInt,
            };
            // serial columns read as identity; their nextval() default is
            // part of the identity, not a default of its own.
            let identity = raw.identity || sequence;
            ColumnKind::Integer {
                size,
                identity,
                default: if identity { None } else { default },
            }
        }
        "numeric" => match (raw.numeric_precision, raw.numeric_scale) {
            (Some(precision), Some(scale)) => ColumnKind::Decimal {
                precision: unsigned(precision),
                scale: unsigned(scale),
                default,
            },
            _ => unknown(table, &raw, default),
        },
        "float4" => ColumnKind::Float {
            double: false,
            default,
        },
        "float8" => ColumnKind::Float {
            double: true,
            default,
        },
        "bool" => ColumnKind::Boolean { default },
        "varchar" => match raw.char_length {
            Some(length) => ColumnKind::Varchar {
                length: unsigned(length),
                default,
            },
            None => unknown(table, &raw, default),
        },
        "text" => ColumnKind::Text { default },
        "bytea" => ColumnKind::Blob,
        "timestamp" | "timestamptz" => ColumnKind::Timestamp {
            time_zone: raw.udt_name == "timestamptz",
            default,
            on_update: None,
        },
        "date" => ColumnKind::Date { default },
        "json" | "jsonb" => ColumnKind::Json,
        "uuid" => ColumnKind::Uuid { default },
        _ => unknown(table, &raw, default),
    };

    Column {
        name: raw.name,
        kind,
        nullable: raw.nullable,
        comment: raw.comment,
    }
}

fn unknown(table: &str, raw: &RawColumn, default: Option<String>) -> ColumnKind {
    warn!(
        table,
        column = %raw.name,
        native_type = %raw.data_type,
        "unsupported column type, it will always be reported as modified"
    );
    ColumnKind::Unknown {
        native_type: raw.data_type.clone(),
        default,
    }
}

fn unsigned(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

/// Recover the literal behind a default expression as the server prints it.
///
/// `'abc'::character varying` becomes `abc`, `'-1'::integer` becomes `-1`,
/// `(42)` becomes `42`. Anything that is not a plain literal is kept as an
/// expression with its whitespace normalized. `NULL` means no default.
fn parse_default(printed: &str) -> Option<String> {
    let expr = strip_parens(printed.trim());
    if expr.eq_ignore_ascii_case("null") || expr.to_ascii_uppercase().starts_with("NULL::") {
        return None;
    }

    if let Some(rest) = expr.strip_prefix('\'')
        && let Some((literal, tail)) = split_quoted(rest)
        && (tail.is_empty() || tail.starts_with("::"))
    {
        return Some(literal);
    }

    if let Some((value, _cast)) = expr.split_once("::") {
        let value = strip_parens(value.trim());
        if is_number(value) {
            return Some(value.to_string());
        }
    }

    Some(normalize_sql_expr(expr))
}

/// Remove parentheses that wrap the whole expression.
fn strip_parens(mut expr: &str) -> &str {
    while let Some(inner) = expr.strip_prefix('(').and_then(|e| e.strip_suffix(')')) {
        if !balanced(inner) {
            break;
        }
        expr = inner.trim();
    }
    expr
}

fn balanced(expr: &str) -> bool {
    let mut depth = 0i32;
    let mut quoted = false;
    for ch in expr.chars() {
        match ch {
            '\'' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// Split `abc''d'::text` (the part after an opening quote) into the
/// unescaped literal and what follows the closing quote.
fn split_quoted(rest: &str) -> Option<(String, &str)> {
    let mut literal = String::new();
    let mut chars = rest.char_indices().peekable();
    while let Some((i, ch)) = chars.next() {
        if ch == '\'' {
            if chars.next_if(|(_, c)| *c == '\'').is_some() {
                literal.push('\'');
                continue;
            }
            return Some((literal, &rest[i + 1..]));
        }
        literal.push(ch);
    }
    None
}

fn is_number(value: &str) -> bool {
    let digits = value.strip_prefix('-').unwrap_or(value);
    !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.chars().filter(|c| *c == '.').count() <= 1
}

fn index_from_raw(table: &str, raw: RawIndex) -> Index {
    let method = IndexMethod::parse(&raw.method).unwrap_or_else(|| {
        warn!(table, index = %raw.name, method = %raw.method, "unknown index method");
        IndexMethod::Other(raw.method.clone())
    });
    let columns = raw
        .columns
        .into_iter()
        .enumerate()
        .map(|(i, name)| IndexColumn {
            name,
            order: if raw.descending.get(i).copied().unwrap_or(false) {
                SortOrder::Desc
            } else {
                SortOrder::Asc
            },
        })
        .collect();
    Index {
        name: raw.name,
        columns,
        unique: raw.unique,
        method,
    }
}

fn constraint_from_raw(table: &str, raw: RawConstraint) -> Option<Constraint> {
    let kind = match raw.kind.as_str() {
        "p" => ConstraintKind::PrimaryKey,
        "u" => ConstraintKind::Unique,
        "f" => {
            let action = |code: &Option<String>| {
                code.as_deref()
                    .and_then(FkAction::parse)
                    .unwrap_or(FkAction::NoAction)
            };
            ConstraintKind::ForeignKey {
                ref_table: raw.ref_table.clone().unwrap_or_default(),
                ref_columns: raw.ref_columns.clone(),
                on_delete: action(&raw.on_delete),
                on_update: action(&raw.on_update),
            }
        }
        other => {
            debug!(table, constraint = %raw.name, kind = other, "skipping constraint");
            return None;
        }
    };
    Some(Constraint {
        name: raw.name,
        columns: raw.columns,
        kind,
    })
}
