//! Declared schemas, grouped by shard.

use crate::{Shard, Sharding, ddl};
use camino::Utf8Path;
use indexmap::IndexMap;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;
use tabula_config::{ColumnDecl, ConstraintDecl, DeclarationFile, IndexDecl, TableDecl};
use tabula_model::{
    Column, ColumnKind, ColumnType, Constraint, ConstraintKind, FkAction, Index, IndexColumn,
    IndexMethod, IntegerSize, Schema, Table, date_literal, normalize_boolean, timestamp_literal,
};
use thiserror::Error;

/// A declaration that cannot be turned into a schema.
#[derive(Debug, Error)]
pub enum DeclarationError {
    #[error("{table}.{column}: unknown column type '{column_type}'")]
    UnknownType {
        table: String,
        column: String,
        column_type: String,
    },

    #[error("{table}.{column}: {reason}")]
    InvalidColumn {
        table: String,
        column: String,
        reason: String,
    },

    #[error("{table}.{name}: {reason}")]
    InvalidIndex {
        table: String,
        name: String,
        reason: String,
    },

    #[error("{table}.{name}: {reason}")]
    InvalidConstraint {
        table: String,
        name: String,
        reason: String,
    },

    #[error("table '{table}' declares more than one primary key")]
    MultiplePrimaryKeys { table: String },

    #[error("failed to load declarations: {0}")]
    Load(#[from] tabula_config::ConfigError),
}

/// Where declared schemas come from.
///
/// Implementations return one schema per registered shard, empty for shards
/// that declare nothing, so that tables on those shards are removed.
pub trait DeclarationSource: Send + Sync {
    fn declared(&self, sharding: &Sharding) -> Result<IndexMap<Shard, Schema>, DeclarationError>;
}

/// A schema declared in code: everything goes to the default shard.
impl DeclarationSource for Schema {
    fn declared(&self, sharding: &Sharding) -> Result<IndexMap<Shard, Schema>, DeclarationError> {
        let mut schemas = empty_schemas(sharding);
        schemas.insert(sharding.default_shard().clone(), self.clone());
        validate_references(&schemas)?;
        Ok(schemas)
    }
}

/// Tables from a styx declaration file, each optionally naming its shard.
#[derive(Debug, Clone)]
pub struct FileDeclarations {
    tables: Vec<(Option<String>, Table)>,
}

impl FileDeclarations {
    /// Read and resolve a declaration file.
    pub fn load(path: &Utf8Path) -> Result<Self, DeclarationError> {
        let file = tabula_config::load_declarations(path)?;
        Self::from_file(&file)
    }

    /// Resolve a declaration document given as a string.
    pub fn parse(source: &str) -> Result<Self, DeclarationError> {
        let file = tabula_config::parse_declarations(source)?;
        Self::from_file(&file)
    }

    pub fn from_file(file: &DeclarationFile) -> Result<Self, DeclarationError> {
        let tables = file
            .tables
            .iter()
            .map(|(name, decl)| Ok((decl.shard.clone(), resolve_table(name, decl)?)))
            .collect::<Result<Vec<_>, DeclarationError>>()?;
        Ok(Self { tables })
    }

    /// Declared tables with the shard they asked for.
    pub fn tables(&self) -> impl Iterator<Item = (Option<&str>, &Table)> {
        self.tables.iter().map(|(shard, t)| (shard.as_deref(), t))
    }
}

impl DeclarationSource for FileDeclarations {
    fn declared(&self, sharding: &Sharding) -> Result<IndexMap<Shard, Schema>, DeclarationError> {
        let mut schemas = empty_schemas(sharding);
        for (shard, table) in &self.tables {
            let shard = sharding.resolve(shard.as_deref());
            if let Some(schema) = schemas.get_mut(shard) {
                schema.add_table(table.clone());
            }
        }
        validate_references(&schemas)?;
        Ok(schemas)
    }
}

fn empty_schemas(sharding: &Sharding) -> IndexMap<Shard, Schema> {
    sharding
        .shards()
        .map(|shard| (shard.clone(), Schema::new()))
        .collect()
}

/// Foreign keys must stay within their shard.
fn validate_references(schemas: &IndexMap<Shard, Schema>) -> Result<(), DeclarationError> {
    for (shard, schema) in schemas {
        for table in schema.iter_tables() {
            for fk in table.foreign_keys() {
                let invalid = |reason: String| DeclarationError::InvalidConstraint {
                    table: table.name.clone(),
                    name: fk.name.clone(),
                    reason,
                };
                let target_name = fk.referenced_table().unwrap_or_default();
                let Some(target) = schema.get_table(target_name) else {
                    return Err(invalid(format!(
                        "references table '{}', which is not declared on shard '{}'",
                        target_name, shard
                    )));
                };
                if let Some(missing) = fk
                    .referenced_columns()
                    .iter()
                    .find(|c| !target.columns.contains_key(*c))
                {
                    return Err(invalid(format!(
                        "references unknown column '{}.{}'",
                        target_name, missing
                    )));
                }
            }
        }
    }
    Ok(())
}

fn resolve_table(name: &str, decl: &TableDecl) -> Result<Table, DeclarationError> {
    let mut table = Table::new(name);
    if decl.unlogged.unwrap_or(false) {
        table = table.unlogged();
    }
    table.comment = decl.comment.clone();

    for (column_name, column) in &decl.columns {
        table = table.with_column(resolve_column(name, column_name, column)?);
    }
    for (index_name, index) in &decl.indexes {
        let index = resolve_index(&table, index_name, index)?;
        table = table.with_index(index);
    }
    for (constraint_name, constraint) in &decl.constraints {
        let constraint = resolve_constraint(&table, constraint_name, constraint)?;
        if matches!(constraint.kind, ConstraintKind::PrimaryKey) {
            if table.primary_key().is_some() {
                return Err(DeclarationError::MultiplePrimaryKeys {
                    table: name.to_string(),
                });
            }
            // Primary key columns are NOT NULL whether declared so or not.
            for column in &constraint.columns {
                if let Some(c) = table.columns.get_mut(column) {
                    c.nullable = false;
                }
            }
        }
        table = table.with_constraint(constraint);
    }

    Ok(table)
}

fn resolve_column(table: &str, name: &str, decl: &ColumnDecl) -> Result<Column, DeclarationError> {
    let invalid = |reason: &str| DeclarationError::InvalidColumn {
        table: table.to_string(),
        column: name.to_string(),
        reason: reason.to_string(),
    };

    let mut kind = match decl.column_type.to_ascii_lowercase().as_str() {
        "smallint" | "int2" => integer(IntegerSize::SmallInt),
        "int" | "integer" | "int4" => integer(IntegerSize::Integer),
        "bigint" | "int8" => integer(IntegerSize::BigInt),
        "decimal" | "numeric" => {
            ColumnKind::decimal(decl.precision.unwrap_or(10), decl.scale.unwrap_or(0))
        }
        "real" | "float" | "float4" => ColumnKind::real(),
        "double" | "float8" => ColumnKind::double(),
        "boolean" | "bool" => ColumnKind::boolean(),
        "varchar" => ColumnKind::varchar(decl.length.unwrap_or(255)),
        "text" => ColumnKind::text(),
        "blob" | "bytea" => ColumnKind::Blob,
        "timestamp" => ColumnKind::timestamp(),
        "timestamptz" => ColumnKind::timestamptz(),
        "date" => ColumnKind::date(),
        "json" | "jsonb" => ColumnKind::Json,
        "uuid" => ColumnKind::uuid(),
        _ => {
            return Err(DeclarationError::UnknownType {
                table: table.to_string(),
                column: name.to_string(),
                column_type: decl.column_type.clone(),
            });
        }
    };
    let column_type = kind.column_type();

    if decl.length.is_some() && column_type != ColumnType::Varchar {
        return Err(invalid("length is only valid on varchar columns"));
    }
    if (decl.precision.is_some() || decl.scale.is_some()) && column_type != ColumnType::Decimal {
        return Err(invalid("precision and scale are only valid on decimal columns"));
    }
    if let ColumnKind::Decimal {
        precision, scale, ..
    } = &kind
        && (*precision == 0 || scale > precision)
    {
        return Err(invalid("scale must not exceed a non-zero precision"));
    }
    if let ColumnKind::Varchar { length: 0, .. } = &kind {
        return Err(invalid("varchar length must be positive"));
    }

    let identity = decl.identity.unwrap_or(false);
    if identity {
        if column_type != ColumnType::Integer {
            return Err(invalid("identity is only valid on integer columns"));
        }
        if decl.default.is_some() {
            return Err(invalid("an identity column cannot have a default"));
        }
        kind = kind.with_identity();
    }

    if let Some(default) = &decl.default {
        check_default(&kind, default).map_err(|reason| invalid(&reason))?;
        kind = kind.with_default(default.clone());
    }

    if let Some(expr) = &decl.on_update {
        if column_type != ColumnType::Timestamp {
            return Err(invalid("on_update is only valid on timestamp columns"));
        }
        let upper = expr.trim().to_ascii_uppercase();
        if upper != "CURRENT_TIMESTAMP" && !(upper.ends_with(')') && upper.contains('(')) {
            return Err(invalid(
                "on_update must be CURRENT_TIMESTAMP or a function call",
            ));
        }
        kind = kind.with_on_update(expr.trim());
    }

    let mut column = Column::new(name, kind);
    column.nullable = decl.nullable.unwrap_or(true) && !identity;
    column.comment = decl.comment.clone();
    Ok(column)
}

fn integer(size: IntegerSize) -> ColumnKind {
    ColumnKind::Integer {
        size,
        identity: false,
        default: None,
    }
}

/// Reject defaults the column type could never hold, and literals whose
/// stored spelling can't be predicted.
fn check_default(kind: &ColumnKind, default: &str) -> Result<(), String> {
    let trimmed = default.trim();
    let column_type = kind.column_type();
    match kind {
        ColumnKind::Blob | ColumnKind::Json => {
            Err(format!("{} columns cannot have a default", column_type))
        }
        ColumnKind::Integer { .. } if trimmed.parse::<i64>().is_err() => {
            Err(format!("'{}' is not an integer", default))
        }
        ColumnKind::Decimal {
            precision, scale, ..
        } => {
            let value = Decimal::from_str(trimmed)
                .or_else(|_| Decimal::from_scientific(trimmed))
                .map_err(|_| format!("'{}' is not a number", default))?
                .round_dp_with_strategy(*scale, RoundingStrategy::MidpointAwayFromZero);
            let whole = value.trunc().abs().normalize().to_string();
            let digits = if whole == "0" { 0 } else { whole.len() as u32 };
            if digits > precision - scale {
                return Err(format!(
                    "'{}' does not fit numeric({},{})",
                    default, precision, scale
                ));
            }
            Ok(())
        }
        ColumnKind::Float { .. }
            if Decimal::from_str(trimmed).is_err() && Decimal::from_scientific(trimmed).is_err() =>
        {
            Err(format!("'{}' is not a number", default))
        }
        ColumnKind::Boolean { .. }
            if !matches!(normalize_boolean(trimmed).as_str(), "true" | "false") =>
        {
            Err(format!("'{}' is not a boolean", default))
        }
        _ if ddl::is_sql_expression(trimmed) => Ok(()),
        // The server prints these in its session time zone.
        ColumnKind::Timestamp {
            time_zone: true, ..
        } => Err("timestamptz defaults must be an expression such as CURRENT_TIMESTAMP".to_string()),
        ColumnKind::Timestamp { .. } if timestamp_literal(trimmed).is_none() => {
            Err(format!("'{}' is not a timestamp", default))
        }
        ColumnKind::Date { .. } if date_literal(trimmed).is_none() => {
            Err(format!("'{}' is not a date", default))
        }
        _ => Ok(()),
    }
}

fn resolve_index(table: &Table, name: &str, decl: &IndexDecl) -> Result<Index, DeclarationError> {
    let invalid = |reason: String| DeclarationError::InvalidIndex {
        table: table.name.clone(),
        name: name.to_string(),
        reason,
    };

    if decl.columns.is_empty() {
        return Err(invalid("an index needs at least one column".to_string()));
    }
    let columns: Vec<IndexColumn> = decl.columns.iter().map(|c| IndexColumn::parse(c)).collect();
    if let Some(missing) = columns.iter().find(|c| !table.columns.contains_key(&c.name)) {
        return Err(invalid(format!("unknown column '{}'", missing.name)));
    }

    let method = match &decl.method {
        Some(method) => IndexMethod::parse(method)
            .ok_or_else(|| invalid(format!("unknown index method '{}'", method)))?,
        None => IndexMethod::BTree,
    };

    Ok(Index {
        name: name.to_string(),
        columns,
        unique: decl.unique.unwrap_or(false),
        method,
    })
}

fn resolve_constraint(
    table: &Table,
    name: &str,
    decl: &ConstraintDecl,
) -> Result<Constraint, DeclarationError> {
    let invalid = |reason: String| DeclarationError::InvalidConstraint {
        table: table.name.clone(),
        name: name.to_string(),
        reason,
    };

    if decl.columns.is_empty() {
        return Err(invalid("a constraint needs at least one column".to_string()));
    }
    if let Some(missing) = decl.columns.iter().find(|c| !table.columns.contains_key(*c)) {
        return Err(invalid(format!("unknown column '{}'", missing)));
    }

    let kind = match decl.constraint_type.to_ascii_lowercase().as_str() {
        "primary" | "primary_key" => ConstraintKind::PrimaryKey,
        "unique" => ConstraintKind::Unique,
        "foreign" | "foreign_key" => {
            let ref_table = decl
                .references
                .clone()
                .ok_or_else(|| invalid("a foreign key needs `references`".to_string()))?;
            let ref_columns = decl
                .ref_columns
                .clone()
                .ok_or_else(|| invalid("a foreign key needs `ref_columns`".to_string()))?;
            if ref_columns.len() != decl.columns.len() {
                return Err(invalid(format!(
                    "{} columns reference {} columns",
                    decl.columns.len(),
                    ref_columns.len()
                )));
            }
            let action = |value: &Option<String>| match value {
                Some(v) => FkAction::parse(v)
                    .ok_or_else(|| invalid(format!("unknown referential action '{}'", v))),
                None => Ok(FkAction::NoAction),
            };
            ConstraintKind::ForeignKey {
                ref_table,
                ref_columns,
                on_delete: action(&decl.on_delete)?,
                on_update: action(&decl.on_update)?,
            }
        }
        other => return Err(invalid(format!("unknown constraint type '{}'", other))),
    };

    if !matches!(kind, ConstraintKind::ForeignKey { .. })
        && (decl.references.is_some() || decl.ref_columns.is_some())
    {
        return Err(invalid(
            "only foreign keys can reference another table".to_string(),
        ));
    }

    Ok(Constraint {
        name: name.to_string(),
        columns: decl.columns.clone(),
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryCatalog;
    use std::sync::Arc;

    const DECLARATIONS: &str = r#"
tables {
    customer {
        comment "Registered customers"
        columns {
            id {type integer, identity true}
            email {type varchar, length 100, nullable false}
            balance {type decimal, precision 12, scale 4, default "0"}
            updated_at {type timestamp, default CURRENT_TIMESTAMP, on_update CURRENT_TIMESTAMP}
        }
        indexes {
            customer_email_idx {columns (email), unique true}
        }
        constraints {
            customer_pkey {type primary, columns (id)}
        }
    }
    invoice {
        shard sales
        columns {
            id {type bigint}
            total {type decimal}
        }
        constraints {
            invoice_pkey {type primary, columns (id)}
        }
    }
}
"#;

    fn sharding() -> Sharding {
        Sharding::new("main", Arc::new(MemoryCatalog::new()))
            .with_shard("sales", Arc::new(MemoryCatalog::new()))
            .with_shard("archive", Arc::new(MemoryCatalog::new()))
    }

    #[test]
    fn test_declarations_are_grouped_by_shard() {
        let declarations = FileDeclarations::parse(DECLARATIONS).unwrap();
        let schemas = declarations.declared(&sharding()).unwrap();

        assert_eq!(schemas.len(), 3);
        let main = &schemas[&Shard::new("main")];
        let sales = &schemas[&Shard::new("sales")];
        assert!(main.get_table("customer").is_some());
        assert!(sales.get_table("invoice").is_some());
        assert!(schemas[&Shard::new("archive")].is_empty());

        let customer = main.get_table("customer").unwrap();
        let id = customer.column("id").unwrap();
        assert!(id.is_identity());
        assert!(!id.nullable);
        assert_eq!(
            customer.column("email").unwrap().kind,
            ColumnKind::varchar(100)
        );
        assert_eq!(
            customer.column("updated_at").unwrap().on_update(),
            Some("CURRENT_TIMESTAMP")
        );

        let invoice = sales.get_table("invoice").unwrap();
        assert_eq!(invoice.column("total").unwrap().kind, ColumnKind::decimal(10, 0));
        assert!(!invoice.column("id").unwrap().nullable);
    }

    fn column(decl: ColumnDecl) -> Result<Column, DeclarationError> {
        resolve_column("t", "c", &decl)
    }

    fn decl(column_type: &str) -> ColumnDecl {
        ColumnDecl {
            column_type: column_type.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_invalid_columns() {
        assert!(matches!(
            column(decl("money")),
            Err(DeclarationError::UnknownType { .. })
        ));
        assert!(column(ColumnDecl {
            length: Some(10),
            ..decl("text")
        })
        .is_err());
        assert!(column(ColumnDecl {
            precision: Some(4),
            scale: Some(6),
            ..decl("decimal")
        })
        .is_err());
        assert!(column(ColumnDecl {
            identity: Some(true),
            ..decl("varchar")
        })
        .is_err());
        assert!(column(ColumnDecl {
            identity: Some(true),
            default: Some("1".into()),
            ..decl("integer")
        })
        .is_err());
        assert!(column(ColumnDecl {
            on_update: Some("CURRENT_TIMESTAMP".into()),
            ..decl("date")
        })
        .is_err());
        assert!(column(ColumnDecl {
            default: Some("{}".into()),
            ..decl("json")
        })
        .is_err());
        assert!(column(ColumnDecl {
            default: Some("maybe".into()),
            ..decl("boolean")
        })
        .is_err());
        assert!(column(ColumnDecl {
            default: Some("1.5".into()),
            ..decl("integer")
        })
        .is_err());
    }

    #[test]
    fn test_defaults_must_have_a_known_stored_form() {
        let with_default = |column_type: &str, default: &str| {
            column(ColumnDecl {
                default: Some(default.into()),
                ..decl(column_type)
            })
        };
        assert!(with_default("timestamp", "2020-01-01").is_ok());
        assert!(with_default("timestamp", "now()").is_ok());
        assert!(with_default("timestamp", "next tuesday").is_err());
        assert!(with_default("date", "2020-01-01").is_ok());
        assert!(with_default("date", "01/02/2020").is_err());
        assert!(with_default("timestamptz", "CURRENT_TIMESTAMP").is_ok());
        assert!(with_default("timestamptz", "2020-01-01 00:00:00+00").is_err());

        let money = |default: &str| {
            column(ColumnDecl {
                precision: Some(5),
                scale: Some(2),
                default: Some(default.into()),
                ..decl("decimal")
            })
        };
        assert!(money("999.994").is_ok());
        // Rounds up past the precision.
        assert!(money("999.995").is_err());
        assert!(money("-999.99").is_ok());
        assert!(money("1000").is_err());
        assert!(money("ten").is_err());
    }

    #[test]
    fn test_invalid_constraints() {
        let err = FileDeclarations::parse(
            r#"
tables {
    order {
        columns {customer_id {type integer}}
        constraints {
            order_customer_fk {type foreign, columns (customer_id), references customer, ref_columns (id)}
        }
    }
}
"#,
        )
        .unwrap()
        .declared(&sharding())
        .unwrap_err();
        assert!(
            matches!(err, DeclarationError::InvalidConstraint { ref name, .. } if name == "order_customer_fk"),
            "{}",
            err
        );

        let err = FileDeclarations::parse(
            r#"
tables {
    t {
        columns {a {type integer}}
        constraints {
            t_pkey {type primary, columns (a)}
            t_pkey2 {type primary, columns (a)}
        }
    }
}
"#,
        )
        .unwrap_err();
        assert!(matches!(err, DeclarationError::MultiplePrimaryKeys { .. }));

        let err = FileDeclarations::parse(
            r#"
tables {
    t {
        columns {a {type integer}}
        indexes {t_b_idx {columns (b)}}
    }
}
"#,
        )
        .unwrap_err();
        assert!(matches!(err, DeclarationError::InvalidIndex { .. }));
    }

    #[test]
    fn test_schema_declares_on_default_shard() {
        let schema = Schema::new().with_table(Table::new("t"));
        let schemas = schema.declared(&sharding()).unwrap();
        assert!(schemas[&Shard::new("main")].get_table("t").is_some());
        assert!(schemas[&Shard::new("sales")].is_empty());
    }
}
