//! DDL rendering for planned operations.
//!
//! Every operation renders to one or more statements, executed in order.
//! Identifiers are always quoted; literals always go through [`Lit`].

use crate::{Operation, OperationKind};
use tabula_model::{Column, ColumnType, Constraint, ConstraintKind, Index, Persistence, Table};
use tabula_sql::{Lit, on_update_function_name, on_update_trigger_name, quote_ident, quote_idents};

/// Marker on the first line of an on-update trigger comment.
const ON_UPDATE_TAG: &str = "tabula:on_update";

/// Statements that carry out `op`.
pub fn render(op: &Operation) -> Vec<String> {
    match &op.kind {
        OperationKind::CreateTable { table } => {
            let mut statements = vec![create_table(table)];
            statements.extend(comment_statements(table));
            for column in table.columns.values() {
                if let Some(expr) = column.on_update() {
                    statements.extend(create_on_update(&table.name, &column.name, expr));
                }
            }
            statements
        }
        OperationKind::DropTable { table } => {
            let mut statements = vec![format!("DROP TABLE {}", quote_ident(&table.name))];
            // The trigger goes with the table; its function does not.
            for column in table.columns.values() {
                if column.on_update().is_some() {
                    statements.push(format!(
                        "DROP FUNCTION IF EXISTS {}()",
                        quote_ident(&on_update_function_name(&table.name, &column.name))
                    ));
                }
            }
            statements
        }
        OperationKind::ModifyTable { table, to, .. } => {
            let keyword = match to {
                Persistence::Logged => "LOGGED",
                Persistence::Unlogged => "UNLOGGED",
            };
            vec![format!("ALTER TABLE {} SET {}", quote_ident(table), keyword)]
        }
        OperationKind::AddColumn { table, column } => {
            let mut statements = vec![format!(
                "ALTER TABLE {} ADD COLUMN {}",
                quote_ident(table),
                column_definition(column)
            )];
            if let Some(comment) = &column.comment {
                statements.push(column_comment(table, &column.name, comment));
            }
            if let Some(expr) = column.on_update() {
                statements.extend(create_on_update(table, &column.name, expr));
            }
            statements
        }
        OperationKind::ModifyColumn { table, old, new } => modify_column(table, old, new),
        OperationKind::DropColumn { table, column } => {
            let mut statements = Vec::new();
            if column.on_update().is_some() {
                statements.extend(drop_on_update(table, &column.name));
            }
            statements.push(format!(
                "ALTER TABLE {} DROP COLUMN {}",
                quote_ident(table),
                quote_ident(&column.name)
            ));
            statements
        }
        OperationKind::AddIndex { table, index } => vec![create_index(table, index)],
        OperationKind::DropIndex { index, .. } => {
            vec![format!("DROP INDEX {}", quote_ident(&index.name))]
        }
        OperationKind::AddConstraint { table, constraint } => vec![format!(
            "ALTER TABLE {} ADD {}",
            quote_ident(table),
            constraint_definition(constraint)
        )],
        OperationKind::DropConstraint { table, constraint } => vec![format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            quote_ident(table),
            quote_ident(&constraint.name)
        )],
    }
}

/// `CREATE TABLE` with every column and every constraint of `table` inline.
/// Indexes are not included.
pub fn create_table(table: &Table) -> String {
    let keyword = match table.persistence {
        Persistence::Logged => "TABLE",
        Persistence::Unlogged => "UNLOGGED TABLE",
    };
    let mut lines: Vec<String> = table.columns.values().map(column_definition).collect();
    lines.extend(table.constraints.values().map(constraint_definition));

    let mut sql = format!("CREATE {} {} (\n", keyword, quote_ident(&table.name));
    sql.push_str(
        &lines
            .iter()
            .map(|line| format!("    {}", line))
            .collect::<Vec<_>>()
            .join(",\n"),
    );
    sql.push_str("\n)");
    sql
}

/// `"name" type [NOT NULL] [DEFAULT x] [GENERATED BY DEFAULT AS IDENTITY]`
pub fn column_definition(column: &Column) -> String {
    let mut sql = format!("{} {}", quote_ident(&column.name), column.kind);
    if !column.nullable {
        sql.push_str(" NOT NULL");
    }
    if let Some(default) = default_literal(column) {
        sql.push_str(" DEFAULT ");
        sql.push_str(&default);
    }
    if column.is_identity() {
        sql.push_str(" GENERATED BY DEFAULT AS IDENTITY");
    }
    sql
}

/// The default as a SQL expression: numbers and booleans bare, strings
/// quoted, temporal keywords and function calls bare.
pub fn default_literal(column: &Column) -> Option<String> {
    let value = column.default()?;
    Some(match column.column_type() {
        ColumnType::Integer | ColumnType::Decimal | ColumnType::Float | ColumnType::Boolean => {
            value.to_string()
        }
        ColumnType::Timestamp | ColumnType::Date | ColumnType::Uuid | ColumnType::Unknown
            if is_sql_expression(value) =>
        {
            value.to_string()
        }
        _ => Lit(value).to_string(),
    })
}

/// Whether a default is an expression rather than a literal value.
pub fn is_sql_expression(value: &str) -> bool {
    let upper = value.to_ascii_uppercase();
    matches!(
        upper.as_str(),
        "CURRENT_TIMESTAMP" | "CURRENT_DATE" | "CURRENT_TIME" | "LOCALTIMESTAMP" | "LOCALTIME"
    ) || (!value.starts_with('\'') && value.ends_with(')') && value.contains('('))
}

/// `CONSTRAINT "name" PRIMARY KEY ("a", "b")` and friends.
pub fn constraint_definition(constraint: &Constraint) -> String {
    let name = quote_ident(&constraint.name);
    let columns = quote_idents(&constraint.columns);
    match &constraint.kind {
        ConstraintKind::PrimaryKey => format!("CONSTRAINT {} PRIMARY KEY ({})", name, columns),
        ConstraintKind::Unique => format!("CONSTRAINT {} UNIQUE ({})", name, columns),
        ConstraintKind::ForeignKey {
            ref_table,
            ref_columns,
            on_delete,
            on_update,
        } => format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
            name,
            columns,
            quote_ident(ref_table),
            quote_idents(ref_columns),
            on_delete.to_sql(),
            on_update.to_sql()
        ),
    }
}

pub fn create_index(table: &str, index: &Index) -> String {
    let unique = if index.unique { "UNIQUE " } else { "" };
    let columns: Vec<String> = index
        .columns
        .iter()
        .map(|c| c.to_sql(quote_ident))
        .collect();
    format!(
        "CREATE {}INDEX {} ON {} USING {} ({})",
        unique,
        quote_ident(&index.name),
        quote_ident(table),
        index.method.as_str(),
        columns.join(", ")
    )
}

fn comment_statements(table: &Table) -> Vec<String> {
    let mut statements = Vec::new();
    if let Some(comment) = &table.comment {
        statements.push(format!(
            "COMMENT ON TABLE {} IS {}",
            quote_ident(&table.name),
            Lit(comment)
        ));
    }
    for column in table.columns.values() {
        if let Some(comment) = &column.comment {
            statements.push(column_comment(&table.name, &column.name, comment));
        }
    }
    statements
}

fn column_comment(table: &str, column: &str, comment: &str) -> String {
    format!(
        "COMMENT ON COLUMN {}.{} IS {}",
        quote_ident(table),
        quote_ident(column),
        Lit(comment)
    )
}

fn modify_column(table: &str, old: &Column, new: &Column) -> Vec<String> {
    let alter = format!(
        "ALTER TABLE {} ALTER COLUMN {}",
        quote_ident(table),
        quote_ident(&new.name)
    );
    let old_type = old.kind.to_string();
    let new_type = new.kind.to_string();
    let type_changed = old_type != new_type;
    let default_changed = type_changed || old.default() != new.default();
    let on_update_changed = old.on_update() != new.on_update();

    let mut statements = Vec::new();
    if old.on_update().is_some() && on_update_changed {
        statements.extend(drop_on_update(table, &old.name));
    }
    // The old default may not cast to the new type.
    if old.default().is_some() && default_changed {
        statements.push(format!("{} DROP DEFAULT", alter));
    }
    // A serial column reads as identity but its sequence hangs off a
    // nextval() default, which DROP IDENTITY leaves in place.
    if old.is_identity() && !new.is_identity() {
        statements.push(format!("{} DROP IDENTITY IF EXISTS", alter));
        statements.push(format!("{} DROP DEFAULT", alter));
    }
    if type_changed {
        // Between varchar lengths an implicit conversion errors on data that
        // doesn't fit, where an explicit cast would truncate it.
        let both_varchar = old.column_type() == ColumnType::Varchar
            && new.column_type() == ColumnType::Varchar;
        if both_varchar {
            statements.push(format!("{} TYPE {}", alter, new_type));
        } else {
            statements.push(format!(
                "{} TYPE {} USING {}::{}",
                alter,
                new_type,
                quote_ident(&new.name),
                new_type
            ));
        }
    }
    if old.nullable != new.nullable {
        let action = if new.nullable { "DROP" } else { "SET" };
        statements.push(format!("{} {} NOT NULL", alter, action));
    }
    if default_changed && let Some(default) = default_literal(new) {
        statements.push(format!("{} SET DEFAULT {}", alter, default));
    }
    if new.is_identity() && !old.is_identity() {
        statements.push(format!("{} ADD GENERATED BY DEFAULT AS IDENTITY", alter));
    }
    if on_update_changed && let Some(expr) = new.on_update() {
        statements.extend(create_on_update(table, &new.name, expr));
    }
    if old.comment != new.comment {
        let comment = match &new.comment {
            Some(comment) => Lit(comment).to_string(),
            None => "NULL".to_string(),
        };
        statements.push(format!(
            "COMMENT ON COLUMN {}.{} IS {}",
            quote_ident(table),
            quote_ident(&new.name),
            comment
        ));
    }
    statements
}

/// Function, trigger and marker comment that keep `column` set to `expr`
/// on every update that does not change it explicitly.
pub fn create_on_update(table: &str, column: &str, expr: &str) -> Vec<String> {
    let function = quote_ident(&on_update_function_name(table, column));
    let trigger = quote_ident(&on_update_trigger_name(table, column));
    let column_ident = quote_ident(column);
    vec![
        format!(
            "CREATE OR REPLACE FUNCTION {function}() RETURNS trigger LANGUAGE plpgsql AS $$\n\
             BEGIN\n\
             \x20   IF NEW.{column_ident} IS NOT DISTINCT FROM OLD.{column_ident} THEN\n\
             \x20       NEW.{column_ident} := {expr};\n\
             \x20   END IF;\n\
             \x20   RETURN NEW;\n\
             END\n\
             $$"
        ),
        format!(
            "CREATE TRIGGER {} BEFORE UPDATE ON {} FOR EACH ROW EXECUTE FUNCTION {}()",
            trigger,
            quote_ident(table),
            function
        ),
        format!(
            "COMMENT ON TRIGGER {} ON {} IS {}",
            trigger,
            quote_ident(table),
            Lit(&on_update_comment(column, expr))
        ),
    ]
}

pub fn drop_on_update(table: &str, column: &str) -> Vec<String> {
    vec![
        format!(
            "DROP TRIGGER IF EXISTS {} ON {}",
            quote_ident(&on_update_trigger_name(table, column)),
            quote_ident(table)
        ),
        format!(
            "DROP FUNCTION IF EXISTS {}()",
            quote_ident(&on_update_function_name(table, column))
        ),
    ]
}

/// Comment stored on an on-update trigger, from which the reader recovers
/// the column and expression.
pub fn on_update_comment(column: &str, expr: &str) -> String {
    format!("{}\n{}\n{}", ON_UPDATE_TAG, column, expr)
}

/// Inverse of [`on_update_comment`]: `(column, expression)`.
pub fn parse_on_update_comment(comment: &str) -> Option<(String, String)> {
    let mut parts = comment.splitn(3, '\n');
    if parts.next()? != ON_UPDATE_TAG {
        return None;
    }
    let column = parts.next()?;
    let expr = parts.next()?;
    Some((column.to_string(), expr.to_string()))
}
