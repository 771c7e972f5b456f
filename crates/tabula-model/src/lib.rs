//! Schema element model for tabula.
//!
//! Tables, columns, indexes and constraints as plain values. Both sides of a
//! reconciliation (the declared schema and the one read back from a live
//! database) are expressed with these types; neither side is ever merged into
//! the other.
//!
//! Every element can describe itself through `diff_sensitive_attributes()`:
//! the subset of its fields that must match for two instances with the same
//! name to be considered structurally identical. Cosmetic fields (comments)
//! are never part of that set.

use indexmap::IndexMap;
use std::fmt;

mod normalize;
pub use normalize::*;

#[cfg(test)]
mod tests;

/// Attribute name to value, as compared by the differ.
///
/// `IndexMap` equality ignores insertion order, so two attribute sets are
/// equal exactly when they hold the same keys with the same values.
pub type Attributes = IndexMap<&'static str, AttrValue>;

/// A single diff-sensitive attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttrValue {
    /// Not configured.
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    /// Ordered list; order is significant.
    List(Vec<String>),
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<u32> for AttrValue {
    fn from(value: u32) -> Self {
        AttrValue::Int(i64::from(value))
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

impl From<Option<&str>> for AttrValue {
    fn from(value: Option<&str>) -> Self {
        match value {
            Some(v) => AttrValue::Text(v.to_string()),
            None => AttrValue::Null,
        }
    }
}

impl From<Vec<String>> for AttrValue {
    fn from(value: Vec<String>) -> Self {
        AttrValue::List(value)
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Null => write!(f, "null"),
            AttrValue::Bool(b) => write!(f, "{}", b),
            AttrValue::Int(i) => write!(f, "{}", i),
            AttrValue::Text(s) => write!(f, "{:?}", s),
            AttrValue::List(items) => write!(f, "({})", items.join(", ")),
        }
    }
}

/// A complete schema for one shard.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    /// Tables keyed by name.
    pub tables: IndexMap<String, Table>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table, replacing any table with the same name.
    pub fn add_table(&mut self, table: Table) {
        self.tables.insert(table.name.clone(), table);
    }

    /// Builder form of [`Schema::add_table`].
    pub fn with_table(mut self, table: Table) -> Self {
        self.add_table(table);
        self
    }

    /// Get a table by name.
    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Get a mutable table by name.
    pub fn get_table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.get_mut(name)
    }

    /// Iterate over all tables.
    pub fn iter_tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    /// Returns true if the schema has no tables.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Foreign keys anywhere in the schema that point at `table`.
    pub fn references_to<'a>(
        &'a self,
        table: &'a str,
    ) -> impl Iterator<Item = (&'a Table, &'a Constraint)> + 'a {
        self.tables.values().flat_map(move |t| {
            t.constraints
                .values()
                .filter(move |c| c.referenced_table() == Some(table))
                .map(move |c| (t, c))
        })
    }
}

/// Whether writes to a table go through the write-ahead log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Persistence {
    #[default]
    Logged,
    Unlogged,
}

impl Persistence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Persistence::Logged => "logged",
            Persistence::Unlogged => "unlogged",
        }
    }
}

/// A database table.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Table name, unique within its shard.
    pub name: String,
    /// Logged or unlogged storage.
    pub persistence: Persistence,
    /// Table comment. Cosmetic.
    pub comment: Option<String>,
    /// Columns keyed by name, in declaration (or ordinal) order.
    pub columns: IndexMap<String, Column>,
    /// Indexes keyed by name.
    pub indexes: IndexMap<String, Index>,
    /// Constraints keyed by name.
    pub constraints: IndexMap<String, Constraint>,
}

impl Table {
    /// Create an empty logged table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            persistence: Persistence::Logged,
            comment: None,
            columns: IndexMap::new(),
            indexes: IndexMap::new(),
            constraints: IndexMap::new(),
        }
    }

    pub fn unlogged(mut self) -> Self {
        self.persistence = Persistence::Unlogged;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.insert(column.name.clone(), column);
        self
    }

    pub fn with_index(mut self, index: Index) -> Self {
        self.indexes.insert(index.name.clone(), index);
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.insert(constraint.name.clone(), constraint);
        self
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// The primary key constraint, if any.
    pub fn primary_key(&self) -> Option<&Constraint> {
        self.constraints
            .values()
            .find(|c| matches!(c.kind, ConstraintKind::PrimaryKey))
    }

    /// Foreign key constraints of this table.
    pub fn foreign_keys(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.values().filter(|c| c.is_foreign_key())
    }

    /// Table-level attributes that must match. Comments are excluded.
    pub fn diff_sensitive_attributes(&self) -> Attributes {
        let mut attrs = Attributes::new();
        attrs.insert("persistence", self.persistence.as_str().into());
        attrs
    }
}

/// The variant tag of a column, without its attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ColumnType {
    Integer,
    Decimal,
    Float,
    Boolean,
    Varchar,
    Text,
    Blob,
    Timestamp,
    Date,
    Json,
    Uuid,
    /// A native type nothing else maps to.
    Unknown,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Decimal => "decimal",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
            ColumnType::Varchar => "varchar",
            ColumnType::Text => "text",
            ColumnType::Blob => "blob",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Date => "date",
            ColumnType::Json => "json",
            ColumnType::Uuid => "uuid",
            ColumnType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage width of an integer column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntegerSize {
    /// 2 bytes
    SmallInt,
    /// 4 bytes
    Integer,
    /// 8 bytes
    BigInt,
}

impl IntegerSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegerSize::SmallInt => "smallint",
            IntegerSize::Integer => "integer",
            IntegerSize::BigInt => "bigint",
        }
    }
}

/// A column type with its type-specific attributes.
///
/// Defaults are stored as normalized literals (see [`Normalizers`]).
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnKind {
    Integer {
        size: IntegerSize,
        /// `GENERATED BY DEFAULT AS IDENTITY`
        identity: bool,
        default: Option<String>,
    },
    Decimal {
        precision: u32,
        scale: u32,
        default: Option<String>,
    },
    Float {
        /// `double precision` rather than `real`
        double: bool,
        default: Option<String>,
    },
    Boolean {
        default: Option<String>,
    },
    Varchar {
        length: u32,
        default: Option<String>,
    },
    Text {
        default: Option<String>,
    },
    Blob,
    Timestamp {
        time_zone: bool,
        default: Option<String>,
        /// Expression assigned on every update of the row.
        on_update: Option<String>,
    },
    Date {
        default: Option<String>,
    },
    Json,
    Uuid {
        default: Option<String>,
    },
    /// Fallback for native types without a variant. Never compares equal.
    Unknown {
        native_type: String,
        default: Option<String>,
    },
}

impl ColumnKind {
    pub fn smallint() -> Self {
        ColumnKind::Integer {
            size: IntegerSize::SmallInt,
            identity: false,
            default: None,
        }
    }

    pub fn integer() -> Self {
        ColumnKind::Integer {
            size: IntegerSize::Integer,
            identity: false,
            default: None,
        }
    }

    pub fn bigint() -> Self {
        ColumnKind::Integer {
            size: IntegerSize::BigInt,
            identity: false,
            default: None,
        }
    }

    pub fn decimal(precision: u32, scale: u32) -> Self {
        ColumnKind::Decimal {
            precision,
            scale,
            default: None,
        }
    }

    pub fn real() -> Self {
        ColumnKind::Float {
            double: false,
            default: None,
        }
    }

    pub fn double() -> Self {
        ColumnKind::Float {
            double: true,
            default: None,
        }
    }

    pub fn boolean() -> Self {
        ColumnKind::Boolean { default: None }
    }

    pub fn varchar(length: u32) -> Self {
        ColumnKind::Varchar {
            length,
            default: None,
        }
    }

    pub fn text() -> Self {
        ColumnKind::Text { default: None }
    }

    pub fn timestamp() -> Self {
        ColumnKind::Timestamp {
            time_zone: false,
            default: None,
            on_update: None,
        }
    }

    pub fn timestamptz() -> Self {
        ColumnKind::Timestamp {
            time_zone: true,
            default: None,
            on_update: None,
        }
    }

    pub fn date() -> Self {
        ColumnKind::Date { default: None }
    }

    pub fn uuid() -> Self {
        ColumnKind::Uuid { default: None }
    }

    /// Set the default literal. Ignored by variants without defaults
    /// (`Blob`, `Json`).
    pub fn with_default(mut self, literal: impl Into<String>) -> Self {
        if let Some(slot) = self.default_slot_mut() {
            *slot = Some(literal.into());
        }
        self
    }

    /// Set the on-update expression. Only timestamps carry one.
    pub fn with_on_update(mut self, expr: impl Into<String>) -> Self {
        if let ColumnKind::Timestamp { on_update, .. } = &mut self {
            *on_update = Some(expr.into());
        }
        self
    }

    /// Mark an integer column as an identity column.
    pub fn with_identity(mut self) -> Self {
        if let ColumnKind::Integer { identity, .. } = &mut self {
            *identity = true;
        }
        self
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnKind::Integer { .. } => ColumnType::Integer,
            ColumnKind::Decimal { .. } => ColumnType::Decimal,
            ColumnKind::Float { .. } => ColumnType::Float,
            ColumnKind::Boolean { .. } => ColumnType::Boolean,
            ColumnKind::Varchar { .. } => ColumnType::Varchar,
            ColumnKind::Text { .. } => ColumnType::Text,
            ColumnKind::Blob => ColumnType::Blob,
            ColumnKind::Timestamp { .. } => ColumnType::Timestamp,
            ColumnKind::Date { .. } => ColumnType::Date,
            ColumnKind::Json => ColumnType::Json,
            ColumnKind::Uuid { .. } => ColumnType::Uuid,
            ColumnKind::Unknown { .. } => ColumnType::Unknown,
        }
    }

    /// Default literal, `None` when not configured.
    pub fn default(&self) -> Option<&str> {
        match self {
            ColumnKind::Integer { default, .. }
            | ColumnKind::Decimal { default, .. }
            | ColumnKind::Float { default, .. }
            | ColumnKind::Boolean { default }
            | ColumnKind::Varchar { default, .. }
            | ColumnKind::Text { default }
            | ColumnKind::Timestamp { default, .. }
            | ColumnKind::Date { default }
            | ColumnKind::Uuid { default }
            | ColumnKind::Unknown { default, .. } => default.as_deref(),
            ColumnKind::Blob | ColumnKind::Json => None,
        }
    }

    /// The default slot, for variants that have one.
    pub fn default_slot_mut(&mut self) -> Option<&mut Option<String>> {
        match self {
            ColumnKind::Integer { default, .. }
            | ColumnKind::Decimal { default, .. }
            | ColumnKind::Float { default, .. }
            | ColumnKind::Boolean { default }
            | ColumnKind::Varchar { default, .. }
            | ColumnKind::Text { default }
            | ColumnKind::Timestamp { default, .. }
            | ColumnKind::Date { default }
            | ColumnKind::Uuid { default }
            | ColumnKind::Unknown { default, .. } => Some(default),
            ColumnKind::Blob | ColumnKind::Json => None,
        }
    }

    /// On-update expression, `None` unless a timestamp declares one.
    pub fn on_update(&self) -> Option<&str> {
        match self {
            ColumnKind::Timestamp { on_update, .. } => on_update.as_deref(),
            _ => None,
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, ColumnKind::Integer { identity: true, .. })
    }
}

/// Renders the PostgreSQL type name.
impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKind::Integer { size, .. } => f.write_str(size.as_str()),
            ColumnKind::Decimal {
                precision, scale, ..
            } => write!(f, "numeric({},{})", precision, scale),
            ColumnKind::Float { double: true, .. } => f.write_str("double precision"),
            ColumnKind::Float { double: false, .. } => f.write_str("real"),
            ColumnKind::Boolean { .. } => f.write_str("boolean"),
            ColumnKind::Varchar { length, .. } => write!(f, "varchar({})", length),
            ColumnKind::Text { .. } => f.write_str("text"),
            ColumnKind::Blob => f.write_str("bytea"),
            ColumnKind::Timestamp {
                time_zone: true, ..
            } => f.write_str("timestamptz"),
            ColumnKind::Timestamp { .. } => f.write_str("timestamp"),
            ColumnKind::Date { .. } => f.write_str("date"),
            ColumnKind::Json => f.write_str("jsonb"),
            ColumnKind::Uuid { .. } => f.write_str("uuid"),
            ColumnKind::Unknown { native_type, .. } => f.write_str(native_type),
        }
    }
}

/// A database column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column name, unique within its table.
    pub name: String,
    /// Type and type-specific attributes.
    pub kind: ColumnKind,
    /// Whether the column allows NULL.
    pub nullable: bool,
    /// Column comment. Cosmetic.
    pub comment: Option<String>,
}

impl Column {
    /// Create a nullable column.
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: true,
            comment: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn column_type(&self) -> ColumnType {
        self.kind.column_type()
    }

    /// Default literal, `None` when not configured.
    pub fn default(&self) -> Option<&str> {
        self.kind.default()
    }

    /// On-update expression, `None` when not configured.
    pub fn on_update(&self) -> Option<&str> {
        self.kind.on_update()
    }

    pub fn is_identity(&self) -> bool {
        self.kind.is_identity()
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self.kind, ColumnKind::Unknown { .. })
    }

    /// Attributes that must match for two columns to be identical.
    ///
    /// Always contains `type`, `nullable` and `default`; the rest depends on
    /// the variant. The comment is never included.
    pub fn diff_sensitive_attributes(&self) -> Attributes {
        let mut attrs = Attributes::new();
        attrs.insert("type", self.column_type().as_str().into());
        attrs.insert("nullable", self.nullable.into());
        attrs.insert("default", self.default().into());

        match &self.kind {
            ColumnKind::Integer { size, identity, .. } => {
                attrs.insert("size", size.as_str().into());
                attrs.insert("identity", (*identity).into());
            }
            ColumnKind::Decimal {
                precision, scale, ..
            } => {
                attrs.insert("precision", (*precision).into());
                attrs.insert("scale", (*scale).into());
            }
            ColumnKind::Float { double, .. } => {
                attrs.insert("double", (*double).into());
            }
            ColumnKind::Varchar { length, .. } => {
                attrs.insert("length", (*length).into());
            }
            ColumnKind::Timestamp {
                time_zone,
                on_update,
                ..
            } => {
                attrs.insert("timeZone", (*time_zone).into());
                attrs.insert("onUpdate", on_update.as_deref().into());
            }
            ColumnKind::Unknown { native_type, .. } => {
                attrs.insert("nativeType", native_type.as_str().into());
            }
            ColumnKind::Boolean { .. }
            | ColumnKind::Text { .. }
            | ColumnKind::Blob
            | ColumnKind::Date { .. }
            | ColumnKind::Json
            | ColumnKind::Uuid { .. } => {}
        }

        attrs
    }
}

/// Sort order for index columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortOrder {
    /// Ascending order (default)
    #[default]
    Asc,
    /// Descending order
    Desc,
}

impl SortOrder {
    /// Returns the SQL keyword for this sort order, or empty string for ASC (default).
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "",
            SortOrder::Desc => " DESC",
        }
    }
}

/// A column in an index with its sort order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexColumn {
    /// Column name
    pub name: String,
    /// Sort order (ASC or DESC)
    pub order: SortOrder,
}

impl IndexColumn {
    /// Create a new index column with ascending order.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: SortOrder::Asc,
        }
    }

    /// Create a new index column with descending order.
    pub fn desc(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: SortOrder::Desc,
        }
    }

    /// Returns the SQL fragment for this column (name + order).
    pub fn to_sql(&self, quote_ident: impl Fn(&str) -> String) -> String {
        format!("{}{}", quote_ident(&self.name), self.order.to_sql())
    }

    /// Parse a column specification like `"col_name"` or `"col_name DESC"`.
    pub fn parse(spec: &str) -> Self {
        let spec = spec.trim();
        let upper = spec.to_ascii_uppercase();

        if upper.ends_with(" DESC") {
            Self::desc(spec[..spec.len() - 5].trim_end())
        } else if upper.ends_with(" ASC") {
            Self::new(spec[..spec.len() - 4].trim_end())
        } else {
            Self::new(spec)
        }
    }
}

impl fmt::Display for IndexColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.order.to_sql())
    }
}

/// Index access method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum IndexMethod {
    #[default]
    BTree,
    Hash,
    Gin,
    Gist,
    SpGist,
    Brin,
    /// An access method from an extension. Only ever read, never declared.
    Other(String),
}

impl IndexMethod {
    pub fn as_str(&self) -> &str {
        match self {
            IndexMethod::BTree => "btree",
            IndexMethod::Hash => "hash",
            IndexMethod::Gin => "gin",
            IndexMethod::Gist => "gist",
            IndexMethod::SpGist => "spgist",
            IndexMethod::Brin => "brin",
            IndexMethod::Other(name) => name,
        }
    }

    /// Parse a built-in access method name.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "btree" => Some(IndexMethod::BTree),
            "hash" => Some(IndexMethod::Hash),
            "gin" => Some(IndexMethod::Gin),
            "gist" => Some(IndexMethod::Gist),
            "spgist" => Some(IndexMethod::SpGist),
            "brin" => Some(IndexMethod::Brin),
            _ => None,
        }
    }
}

/// A secondary index that is not backing a constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    /// Index name
    pub name: String,
    /// Indexed columns, in order. Reordering is a modification.
    pub columns: Vec<IndexColumn>,
    /// Whether this is a UNIQUE index
    pub unique: bool,
    /// Access method
    pub method: IndexMethod,
}

impl Index {
    /// Create a non-unique btree index over the given column specs.
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| IndexColumn::parse(c)).collect(),
            unique: false,
            method: IndexMethod::BTree,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn using(mut self, method: IndexMethod) -> Self {
        self.method = method;
        self
    }

    /// Whether the index covers `column`.
    pub fn covers(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.name == column)
    }

    pub fn diff_sensitive_attributes(&self) -> Attributes {
        let mut attrs = Attributes::new();
        attrs.insert(
            "columns",
            self.columns
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .into(),
        );
        attrs.insert("unique", self.unique.into());
        attrs.insert("method", self.method.as_str().into());
        attrs
    }
}

/// Referential action of a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FkAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl FkAction {
    /// The SQL spelling, e.g. `SET NULL`.
    pub fn to_sql(&self) -> &'static str {
        match self {
            FkAction::NoAction => "NO ACTION",
            FkAction::Restrict => "RESTRICT",
            FkAction::Cascade => "CASCADE",
            FkAction::SetNull => "SET NULL",
            FkAction::SetDefault => "SET DEFAULT",
        }
    }

    /// Parse either the SQL spelling (any case, `_` or space separated) or
    /// the single-letter code used by `pg_constraint`.
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_ascii_uppercase().replace(['_', '-'], " ");
        match normalized.as_str() {
            "NO ACTION" | "A" => Some(FkAction::NoAction),
            "RESTRICT" | "R" => Some(FkAction::Restrict),
            "CASCADE" | "C" => Some(FkAction::Cascade),
            "SET NULL" | "N" => Some(FkAction::SetNull),
            "SET DEFAULT" | "D" => Some(FkAction::SetDefault),
            _ => None,
        }
    }
}

/// What a constraint enforces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintKind {
    PrimaryKey,
    Unique,
    ForeignKey {
        ref_table: String,
        ref_columns: Vec<String>,
        on_delete: FkAction,
        on_update: FkAction,
    },
}

impl ConstraintKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstraintKind::PrimaryKey => "primary",
            ConstraintKind::Unique => "unique",
            ConstraintKind::ForeignKey { .. } => "foreign",
        }
    }
}

/// A table constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    /// Constraint name
    pub name: String,
    /// Constrained columns, in order.
    pub columns: Vec<String>,
    pub kind: ConstraintKind,
}

impl Constraint {
    pub fn primary_key(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            kind: ConstraintKind::PrimaryKey,
        }
    }

    pub fn unique(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            kind: ConstraintKind::Unique,
        }
    }

    /// A foreign key with `NO ACTION` on both delete and update.
    pub fn foreign_key(
        name: impl Into<String>,
        columns: &[&str],
        ref_table: impl Into<String>,
        ref_columns: &[&str],
    ) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            kind: ConstraintKind::ForeignKey {
                ref_table: ref_table.into(),
                ref_columns: ref_columns.iter().map(|c| c.to_string()).collect(),
                on_delete: FkAction::NoAction,
                on_update: FkAction::NoAction,
            },
        }
    }

    /// Set the on-delete action. No-op for non foreign keys.
    pub fn on_delete(mut self, action: FkAction) -> Self {
        if let ConstraintKind::ForeignKey { on_delete, .. } = &mut self.kind {
            *on_delete = action;
        }
        self
    }

    /// Set the on-update action. No-op for non foreign keys.
    pub fn on_update(mut self, action: FkAction) -> Self {
        if let ConstraintKind::ForeignKey { on_update, .. } = &mut self.kind {
            *on_update = action;
        }
        self
    }

    pub fn is_foreign_key(&self) -> bool {
        matches!(self.kind, ConstraintKind::ForeignKey { .. })
    }

    /// Table a foreign key points at.
    pub fn referenced_table(&self) -> Option<&str> {
        match &self.kind {
            ConstraintKind::ForeignKey { ref_table, .. } => Some(ref_table),
            _ => None,
        }
    }

    /// Columns a foreign key points at.
    pub fn referenced_columns(&self) -> &[String] {
        match &self.kind {
            ConstraintKind::ForeignKey { ref_columns, .. } => ref_columns,
            _ => &[],
        }
    }

    pub fn covers(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn diff_sensitive_attributes(&self) -> Attributes {
        let mut attrs = Attributes::new();
        attrs.insert("type", self.kind.as_str().into());
        attrs.insert("columns", self.columns.clone().into());
        if let ConstraintKind::ForeignKey {
            ref_table,
            ref_columns,
            on_delete,
            on_update,
        } = &self.kind
        {
            attrs.insert("refTable", ref_table.as_str().into());
            attrs.insert("refColumns", ref_columns.clone().into());
            attrs.insert("onDelete", on_delete.to_sql().into());
            attrs.insert("onUpdate", on_update.to_sql().into());
        }
        attrs
    }
}
