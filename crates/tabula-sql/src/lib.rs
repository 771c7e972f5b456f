//! SQL quoting helpers and deterministic names for generated objects.
//!
//! Every identifier tabula sends to PostgreSQL goes through [`quote_ident`]
//! and every string literal through [`Lit`], so reserved words (`user`,
//! `order`, `group`) never need special casing.

use std::fmt::{self, Write};

/// Maximum identifier length PostgreSQL keeps before truncating.
pub const PG_IDENT_MAX: usize = 63;

/// A string literal as PostgreSQL reads it back: single-quoted, with
/// embedded quotes doubled. Backslashes pass through untouched, which holds
/// while `standard_conforming_strings` is on (the server default).
///
/// ```
/// use tabula_sql::Lit;
/// assert_eq!(Lit("it's").to_string(), "'it''s'");
/// assert_eq!(Lit("").to_string(), "''");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Lit<'a>(pub &'a str);

impl fmt::Display for Lit<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Quoted {
            value: self.0,
            quote: '\'',
        }
        .fmt(f)
    }
}

/// Quote a PostgreSQL identifier.
///
/// Always quotes, so case and reserved words survive, and doubles any
/// embedded `"`.
pub fn quote_ident(name: &str) -> String {
    Quoted {
        value: name,
        quote: '"',
    }
    .to_string()
}

struct Quoted<'a> {
    value: &'a str,
    quote: char,
}

impl fmt::Display for Quoted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_char(self.quote)?;
        for (i, part) in self.value.split(self.quote).enumerate() {
            if i > 0 {
                f.write_char(self.quote)?;
                f.write_char(self.quote)?;
            }
            f.write_str(part)?;
        }
        f.write_char(self.quote)
    }
}

/// Quote and join a list of column names: `"a", "b"`.
///
/// ```
/// assert_eq!(tabula_sql::quote_idents(&["id", "email"]), "\"id\", \"email\"");
/// ```
pub fn quote_idents(names: &[impl AsRef<str>]) -> String {
    names
        .iter()
        .map(|n| quote_ident(n.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Name of the trigger that maintains an on-update column.
///
/// Trigger names are scoped to their table, but the name still carries
/// table and column for readability.
///
/// ```
/// assert_eq!(
///     tabula_sql::on_update_trigger_name("customer", "updated_at"),
///     "trg_onupd_customer_updated_at"
/// );
/// ```
pub fn on_update_trigger_name(table: &str, column: &str) -> String {
    bounded_name("trg_onupd", table, column)
}

/// Name of the plpgsql function backing an on-update trigger.
///
/// Functions live in the namespace, not the table, so the name must be
/// unique per table and column.
pub fn on_update_function_name(table: &str, column: &str) -> String {
    bounded_name("fn_onupd", table, column)
}

/// `{prefix}_{table}_{column}`, or a hashed form when that would not fit
/// in [`PG_IDENT_MAX`].
fn bounded_name(prefix: &str, table: &str, column: &str) -> String {
    let plain = format!("{}_{}_{}", prefix, table, column);
    if plain.len() <= PG_IDENT_MAX {
        return plain;
    }

    let mut hasher = blake3::Hasher::new();
    hasher.update(table.as_bytes());
    hasher.update(&[0]);
    hasher.update(column.as_bytes());
    let hex = hasher.finalize().to_hex().to_string();
    let suffix = &hex[..16];

    let overhead = prefix.len() + 2; // "_" after prefix and before suffix
    let max_table_len = PG_IDENT_MAX.saturating_sub(overhead + suffix.len());

    // Table names are expected to be ASCII snake_case; still, avoid splitting UTF-8.
    let mut len = max_table_len.min(table.len());
    while len > 0 && !table.is_char_boundary(len) {
        len -= 1;
    }

    format!("{}_{}_{}", prefix, &table[..len], suffix)
}

/// Collapse runs of whitespace outside quoted sections into a single space.
///
/// Used to compare expressions PostgreSQL hands back with the ones that
/// were declared.
///
/// ```
/// assert_eq!(tabula_sql::normalize_sql_expr("lower(  name )\n"), "lower( name )");
/// assert_eq!(tabula_sql::normalize_sql_expr("'a  b'"), "'a  b'");
/// ```
pub fn normalize_sql_expr(expr: &str) -> String {
    let mut out = String::with_capacity(expr.len());
    let mut pending_space = false;

    let mut in_single_quote = false;
    let mut in_double_quote = false;

    let mut chars = expr.chars().peekable();
    while let Some(ch) = chars.next() {
        if in_single_quote {
            out.push(ch);
            if ch == '\'' {
                // SQL escapes single quotes by doubling them: ''
                if let Some(next) = chars.next_if_eq(&'\'') {
                    out.push(next);
                } else {
                    in_single_quote = false;
                }
            }
            continue;
        }

        if in_double_quote {
            out.push(ch);
            if ch == '"' {
                if let Some(next) = chars.next_if_eq(&'"') {
                    out.push(next);
                } else {
                    in_double_quote = false;
                }
            }
            continue;
        }

        match ch {
            '\'' | '"' => {
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                if ch == '\'' {
                    in_single_quote = true;
                } else {
                    in_double_quote = true;
                }
                out.push(ch);
            }
            c if c.is_whitespace() => {
                pending_space = true;
            }
            c => {
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                out.push(c);
            }
        }
    }

    out
}
