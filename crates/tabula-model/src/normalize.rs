//! Default-value normalization.
//!
//! Declarations and the database spell the same default differently:
//! `0.0000` vs `0`, `now()` vs `CURRENT_TIMESTAMP`, `t` vs `true`,
//! `2020-01-01` vs `2020-01-01 00:00:00`. Both
//! sides run their defaults through the same [`Normalizers`] before the
//! differ sees them, so only real changes show up as modifications.

use crate::{Column, ColumnKind, ColumnType, Schema};
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashMap;
use std::str::FromStr;

/// A per-variant normalization rule.
pub type NormalizeFn = fn(&str) -> String;

/// Registry of normalization rules keyed by column variant.
///
/// Variants without a rule keep their literal verbatim.
///
/// ```
/// use tabula_model::{ColumnType, Normalizers};
///
/// let n = Normalizers::default();
/// assert_eq!(n.normalize(ColumnType::Decimal, "0.0000"), "0");
///
/// // Replace a rule.
/// let n = Normalizers::default().with_rule(ColumnType::Text, |s| s.trim().to_string());
/// assert_eq!(n.normalize(ColumnType::Text, "  hi "), "hi");
/// ```
#[derive(Debug, Clone)]
pub struct Normalizers {
    rules: HashMap<ColumnType, NormalizeFn>,
}

impl Default for Normalizers {
    fn default() -> Self {
        let mut rules: HashMap<ColumnType, NormalizeFn> = HashMap::new();
        rules.insert(ColumnType::Integer, normalize_integer);
        rules.insert(ColumnType::Decimal, normalize_decimal);
        rules.insert(ColumnType::Float, normalize_decimal);
        rules.insert(ColumnType::Boolean, normalize_boolean);
        rules.insert(ColumnType::Timestamp, normalize_timestamp);
        rules.insert(ColumnType::Date, normalize_date);
        rules.insert(ColumnType::Uuid, normalize_uuid);
        Self { rules }
    }
}

impl Normalizers {
    /// A registry with no rules at all.
    pub fn verbatim() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Install or replace the rule for one variant.
    pub fn with_rule(mut self, column_type: ColumnType, rule: NormalizeFn) -> Self {
        self.rules.insert(column_type, rule);
        self
    }

    /// Remove the rule for one variant, keeping its literals verbatim.
    pub fn without_rule(mut self, column_type: ColumnType) -> Self {
        self.rules.remove(&column_type);
        self
    }

    pub fn normalize(&self, column_type: ColumnType, literal: &str) -> String {
        match self.rules.get(&column_type) {
            Some(rule) => rule(literal),
            None => literal.to_string(),
        }
    }

    /// Normalize a column's default and on-update expression in place.
    ///
    /// Decimal defaults are first rounded to the column's scale, the way
    /// the server stores them.
    pub fn normalize_column(&self, column: &mut Column) {
        let column_type = column.column_type();
        if self.rules.contains_key(&ColumnType::Decimal)
            && let ColumnKind::Decimal {
                scale,
                default: Some(default),
                ..
            } = &mut column.kind
            && let Some(value) = parse_decimal(default)
        {
            *default = value
                .round_dp_with_strategy(*scale, RoundingStrategy::MidpointAwayFromZero)
                .to_string();
        }
        if let Some(Some(default)) = column.kind.default_slot_mut() {
            *default = self.normalize(column_type, default);
        }
        if let ColumnKind::Timestamp {
            on_update: Some(expr),
            ..
        } = &mut column.kind
        {
            *expr = self.normalize(column_type, expr);
        }
    }

    /// Normalize every column of every table.
    pub fn normalize_schema(&self, schema: &mut Schema) {
        for table in schema.tables.values_mut() {
            for column in table.columns.values_mut() {
                self.normalize_column(column);
            }
        }
    }
}

/// `+007` and `7` are the same integer.
pub fn normalize_integer(literal: &str) -> String {
    let trimmed = literal.trim();
    match trimmed.parse::<i64>() {
        Ok(n) => n.to_string(),
        Err(_) => trimmed.to_string(),
    }
}

fn parse_decimal(literal: &str) -> Option<Decimal> {
    let trimmed = literal.trim();
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .ok()
}

/// Exact decimal comparison: trailing zeros and signed zero are dropped.
pub fn normalize_decimal(literal: &str) -> String {
    match parse_decimal(literal) {
        Some(d) => d.normalize().to_string(),
        None => literal.trim().to_string(),
    }
}

pub fn normalize_boolean(literal: &str) -> String {
    let trimmed = literal.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" | "on" => "true".to_string(),
        "false" | "f" | "0" | "no" | "n" | "off" => "false".to_string(),
        _ => trimmed.to_string(),
    }
}

/// Spellings of "the current time" collapse to the SQL keyword.
fn current_time_keyword(literal: &str) -> Option<&'static str> {
    match literal.to_ascii_uppercase().as_str() {
        "NOW()" | "CURRENT_TIMESTAMP" | "CURRENT_TIMESTAMP()" | "TRANSACTION_TIMESTAMP()" => {
            Some("CURRENT_TIMESTAMP")
        }
        "CURRENT_DATE" | "CURRENT_DATE()" => Some("CURRENT_DATE"),
        _ => None,
    }
}

const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

fn parse_datetime(literal: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(literal, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(literal, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// A timestamp literal without time zone as PostgreSQL prints it:
/// seconds always present, microseconds only when non-zero.
///
/// ```
/// use tabula_model::timestamp_literal;
///
/// assert_eq!(timestamp_literal("2020-01-01").as_deref(), Some("2020-01-01 00:00:00"));
/// assert_eq!(timestamp_literal("2020-01-01T08:30:00.250").as_deref(), Some("2020-01-01 08:30:00.25"));
/// assert_eq!(timestamp_literal("2020-01-01 08:30:00+02"), None);
/// ```
pub fn timestamp_literal(literal: &str) -> Option<String> {
    let datetime = parse_datetime(literal.trim())?;
    let mut text = datetime.format("%Y-%m-%d %H:%M:%S").to_string();
    let micros = datetime.nanosecond() / 1_000;
    if micros > 0 {
        let fraction = format!("{:06}", micros);
        text.push('.');
        text.push_str(fraction.trim_end_matches('0'));
    }
    Some(text)
}

/// A date literal as PostgreSQL prints it. A time part is cut off.
pub fn date_literal(literal: &str) -> Option<String> {
    let trimmed = literal.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_datetime(trimmed).map(|datetime| datetime.date()))
        .map(|date| date.format("%Y-%m-%d").to_string())
}

pub fn normalize_timestamp(literal: &str) -> String {
    let trimmed = literal.trim();
    if let Some(keyword) = current_time_keyword(trimmed) {
        return keyword.to_string();
    }
    timestamp_literal(trimmed).unwrap_or_else(|| trimmed.to_string())
}

pub fn normalize_date(literal: &str) -> String {
    let trimmed = literal.trim();
    if let Some(keyword) = current_time_keyword(trimmed) {
        return keyword.to_string();
    }
    date_literal(trimmed).unwrap_or_else(|| trimmed.to_string())
}

pub fn normalize_uuid(literal: &str) -> String {
    literal.trim().to_ascii_lowercase()
}
