//! Schema diffing - compare the declared schema against the live one.
//!
//! Elements are matched by identity only: a table by name, a column, index
//! or constraint by `(table, name)`. Matched pairs are compared through
//! `diff_sensitive_attributes()`; renames are never detected.
//!
//! ```text
//! customer:
//!   + column customer.phone
//!   ~ column customer.email (length: 255 -> 100)
//!   - index customer.customer_name_idx
//! ```
//!
//! Removing a column or table also removes whatever still points at it: a
//! constraint or index covering a removed column, a foreign key whose
//! target is going away, or a foreign key out of a removed table. Those
//! dependents are added to `to_remove` here so the planner can drop them
//! first.

use crate::Shard;
use indexmap::IndexMap;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tabula_model::{Attributes, Column, Constraint, Index, Schema, Table};

/// Identity of a schema element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementId {
    Table(String),
    Column(String, String),
    Index(String, String),
    Constraint(String, String),
}

impl ElementId {
    /// The table the element lives in (or is).
    pub fn table(&self) -> &str {
        match self {
            ElementId::Table(t)
            | ElementId::Column(t, _)
            | ElementId::Index(t, _)
            | ElementId::Constraint(t, _) => t,
        }
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementId::Table(t) => write!(f, "table {}", t),
            ElementId::Column(t, c) => write!(f, "column {}.{}", t, c),
            ElementId::Index(t, i) => write!(f, "index {}.{}", t, i),
            ElementId::Constraint(t, c) => write!(f, "constraint {}.{}", t, c),
        }
    }
}

/// A snapshot of one schema element.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Table(Table),
    Column(Column),
    Index(Index),
    Constraint(Constraint),
}

impl Element {
    pub fn diff_sensitive_attributes(&self) -> Attributes {
        match self {
            Element::Table(t) => t.diff_sensitive_attributes(),
            Element::Column(c) => c.diff_sensitive_attributes(),
            Element::Index(i) => i.diff_sensitive_attributes(),
            Element::Constraint(c) => c.diff_sensitive_attributes(),
        }
    }
}

/// Both snapshots of an element that exists on both sides but differs.
#[derive(Debug, Clone, PartialEq)]
pub struct Modification {
    /// As read from the database.
    pub old: Element,
    /// As declared.
    pub new: Element,
}

impl Modification {
    /// Attributes whose values differ, as `(name, old, new)`.
    pub fn changed_attributes(&self) -> Vec<(&'static str, String, String)> {
        let old = self.old.diff_sensitive_attributes();
        let new = self.new.diff_sensitive_attributes();
        let mut changed = Vec::new();
        for (key, new_value) in &new {
            let old_value = old.get(key).map(|v| v.to_string());
            if old_value.as_deref() != Some(new_value.to_string().as_str()) {
                changed.push((
                    *key,
                    old_value.unwrap_or_else(|| "-".to_string()),
                    new_value.to_string(),
                ));
            }
        }
        for (key, old_value) in &old {
            if !new.contains_key(key) {
                changed.push((*key, old_value.to_string(), "-".to_string()));
            }
        }
        changed
    }
}

/// Differences for a single shard.
///
/// The maps are ordered by [`ElementId`], so iterating a diff is
/// deterministic regardless of how either schema was built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShardDiff {
    pub to_create: BTreeMap<ElementId, Element>,
    pub to_modify: BTreeMap<ElementId, Modification>,
    pub to_remove: BTreeMap<ElementId, Element>,
}

impl ShardDiff {
    /// Compare `declared` against `actual`.
    ///
    /// Both sides are expected to be normalized already.
    pub fn compute(declared: &Schema, actual: &Schema) -> Self {
        let mut diff = ShardDiff::default();

        for table in declared.iter_tables() {
            match actual.get_table(&table.name) {
                Some(existing) => diff.compare_tables(table, existing),
                None => {
                    diff.to_create.insert(
                        ElementId::Table(table.name.clone()),
                        Element::Table(table.clone()),
                    );
                }
            }
        }

        for table in actual.iter_tables() {
            if declared.get_table(&table.name).is_none() {
                diff.to_remove.insert(
                    ElementId::Table(table.name.clone()),
                    Element::Table(table.clone()),
                );
            }
        }

        diff.close_removals(actual);
        diff
    }

    /// Returns true if there are no differences.
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_modify.is_empty() && self.to_remove.is_empty()
    }

    /// Count total number of changes.
    pub fn change_count(&self) -> usize {
        self.to_create.len() + self.to_modify.len() + self.to_remove.len()
    }

    /// Whether `id` is in any of the three maps.
    pub fn contains(&self, id: &ElementId) -> bool {
        self.to_create.contains_key(id)
            || self.to_modify.contains_key(id)
            || self.to_remove.contains_key(id)
    }

    fn compare_tables(&mut self, declared: &Table, actual: &Table) {
        let table = &declared.name;

        if declared.diff_sensitive_attributes() != actual.diff_sensitive_attributes() {
            self.to_modify.insert(
                ElementId::Table(table.clone()),
                Modification {
                    old: Element::Table(actual.clone()),
                    new: Element::Table(declared.clone()),
                },
            );
        }

        // A column of unknown type can never be proven equal.
        self.compare_elements(
            &declared.columns,
            &actual.columns,
            |name| ElementId::Column(table.clone(), name.to_string()),
            Element::Column,
            |new, old| {
                new.is_unknown()
                    || old.is_unknown()
                    || new.diff_sensitive_attributes() != old.diff_sensitive_attributes()
            },
        );
        self.compare_elements(
            &declared.indexes,
            &actual.indexes,
            |name| ElementId::Index(table.clone(), name.to_string()),
            Element::Index,
            |new, old| new.diff_sensitive_attributes() != old.diff_sensitive_attributes(),
        );
        self.compare_elements(
            &declared.constraints,
            &actual.constraints,
            |name| ElementId::Constraint(table.clone(), name.to_string()),
            Element::Constraint,
            |new, old| new.diff_sensitive_attributes() != old.diff_sensitive_attributes(),
        );
    }

    fn compare_elements<T: Clone>(
        &mut self,
        declared: &IndexMap<String, T>,
        actual: &IndexMap<String, T>,
        id: impl Fn(&str) -> ElementId,
        wrap: fn(T) -> Element,
        differs: impl Fn(&T, &T) -> bool,
    ) {
        for (name, new) in declared {
            match actual.get(name) {
                None => {
                    self.to_create.insert(id(name), wrap(new.clone()));
                }
                Some(old) if differs(new, old) => {
                    self.to_modify.insert(
                        id(name),
                        Modification {
                            old: wrap(old.clone()),
                            new: wrap(new.clone()),
                        },
                    );
                }
                Some(_) => {}
            }
        }
        for (name, old) in actual {
            if !declared.contains_key(name) {
                self.to_remove.insert(id(name), wrap(old.clone()));
            }
        }
    }

    /// Add dependents of removed columns and tables to `to_remove`.
    fn close_removals(&mut self, actual: &Schema) {
        let mut removed_tables = HashSet::new();
        let mut removed_columns = HashSet::new();
        for id in self.to_remove.keys() {
            match id {
                ElementId::Table(t) => {
                    removed_tables.insert(t.clone());
                }
                ElementId::Column(t, c) => {
                    removed_columns.insert((t.clone(), c.clone()));
                }
                _ => {}
            }
        }
        if removed_tables.is_empty() && removed_columns.is_empty() {
            return;
        }

        let column_removed =
            |table: &str, column: &str| removed_columns.contains(&(table.to_string(), column.to_string()));

        let mut dependents = Vec::new();
        for table in actual.iter_tables() {
            let table_removed = removed_tables.contains(&table.name);

            for constraint in table.constraints.values() {
                let dangling = match constraint.referenced_table() {
                    // A removed table's foreign keys into other tables go
                    // first: the key they rely on may be dropped in the same
                    // diff, and removed tables can then go in any order.
                    Some(target) if table_removed => target != table.name,
                    _ if table_removed => false,
                    Some(target) => {
                        removed_tables.contains(target)
                            || constraint
                                .referenced_columns()
                                .iter()
                                .any(|c| column_removed(target, c))
                            || constraint.columns.iter().any(|c| column_removed(&table.name, c))
                    }
                    None => constraint.columns.iter().any(|c| column_removed(&table.name, c)),
                };
                if dangling {
                    dependents.push((
                        ElementId::Constraint(table.name.clone(), constraint.name.clone()),
                        Element::Constraint(constraint.clone()),
                    ));
                }
            }

            if table_removed {
                continue;
            }
            for index in table.indexes.values() {
                if index.columns.iter().any(|c| column_removed(&table.name, &c.name)) {
                    dependents.push((
                        ElementId::Index(table.name.clone(), index.name.clone()),
                        Element::Index(index.clone()),
                    ));
                }
            }
        }

        for (id, element) in dependents {
            if !self.contains(&id) {
                self.to_remove.insert(id, element);
            }
        }
    }
}

impl fmt::Display for ShardDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for id in self.to_create.keys() {
            writeln!(f, "+ {}", id)?;
        }
        for (id, modification) in &self.to_modify {
            let changes: Vec<String> = modification
                .changed_attributes()
                .into_iter()
                .map(|(key, old, new)| format!("{}: {} -> {}", key, old, new))
                .collect();
            writeln!(f, "~ {} ({})", id, changes.join(", "))?;
        }
        for id in self.to_remove.keys() {
            writeln!(f, "- {}", id)?;
        }
        Ok(())
    }
}

/// Differences across every shard.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDiff {
    /// Per-shard diffs. Shards without differences are not listed.
    pub shards: IndexMap<Shard, ShardDiff>,
}

impl SchemaDiff {
    /// Collect per-shard diffs, dropping the empty ones.
    pub fn from_shards(diffs: impl IntoIterator<Item = (Shard, ShardDiff)>) -> Self {
        Self {
            shards: diffs.into_iter().filter(|(_, d)| !d.is_empty()).collect(),
        }
    }

    /// The differing shards, or `None` when every shard has converged.
    pub fn get(&self) -> Option<&IndexMap<Shard, ShardDiff>> {
        if self.shards.is_empty() {
            None
        } else {
            Some(&self.shards)
        }
    }

    pub fn shard(&self, shard: &Shard) -> Option<&ShardDiff> {
        self.shards.get(shard)
    }

    /// Returns true if there are no differences.
    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// Count total number of changes.
    pub fn change_count(&self) -> usize {
        self.shards.values().map(ShardDiff::change_count).sum()
    }
}

impl fmt::Display for SchemaDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "No changes detected.");
        }
        writeln!(f, "Changes detected:\n")?;
        for (shard, diff) in &self.shards {
            writeln!(f, "  {}:", shard)?;
            for line in diff.to_string().lines() {
                writeln!(f, "    {}", line)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_model::{ColumnKind, FkAction, IndexMethod};

    fn make_column(name: &str, kind: ColumnKind, nullable: bool) -> Column {
        let column = Column::new(name, kind);
        if nullable { column } else { column.not_null() }
    }

    fn customer() -> Table {
        Table::new("customer")
            .with_column(make_column("id", ColumnKind::integer().with_identity(), false))
            .with_column(make_column("email", ColumnKind::varchar(255), false))
            .with_column(make_column("name", ColumnKind::varchar(64), true))
            .with_index(Index::new("customer_name_idx", &["name"]))
            .with_constraint(Constraint::primary_key("customer_pkey", &["id"]))
            .with_constraint(Constraint::unique("customer_email_key", &["email"]))
    }

    fn order() -> Table {
        Table::new("order")
            .with_column(make_column("id", ColumnKind::bigint(), false))
            .with_column(make_column("customer_id", ColumnKind::integer(), false))
            .with_constraint(Constraint::primary_key("order_pkey", &["id"]))
            .with_constraint(
                Constraint::foreign_key("order_customer_fk", &["customer_id"], "customer", &["id"])
                    .on_delete(FkAction::Cascade),
            )
    }

    #[test]
    fn test_identical_schemas_produce_empty_diff() {
        let schema = Schema::new().with_table(customer()).with_table(order());
        let diff = ShardDiff::compute(&schema, &schema);
        assert!(diff.is_empty(), "{}", diff);
    }

    #[test]
    fn test_comment_only_change_is_ignored() {
        let declared = Schema::new().with_table(customer().with_comment("people"));
        let actual = Schema::new().with_table(customer());
        assert!(ShardDiff::compute(&declared, &actual).is_empty());
    }

    #[test]
    fn test_new_table_is_created_whole() {
        let declared = Schema::new().with_table(customer());
        let diff = ShardDiff::compute(&declared, &Schema::new());
        assert_eq!(diff.change_count(), 1);
        assert!(matches!(
            diff.to_create.get(&ElementId::Table("customer".into())),
            Some(Element::Table(t)) if t.columns.len() == 3
        ));
    }

    #[test]
    fn test_varchar_length_change_is_one_modification() {
        let mut narrowed = customer();
        narrowed.columns["email"] = make_column("email", ColumnKind::varchar(100), false);
        let diff = ShardDiff::compute(
            &Schema::new().with_table(narrowed),
            &Schema::new().with_table(customer()),
        );
        assert_eq!(diff.change_count(), 1);
        let modification = &diff.to_modify[&ElementId::Column("customer".into(), "email".into())];
        assert_eq!(
            modification.changed_attributes(),
            vec![("length", "255".to_string(), "100".to_string())]
        );
    }

    #[test]
    fn test_unknown_column_is_always_modified() {
        let column = make_column(
            "search",
            ColumnKind::Unknown {
                native_type: "tsvector".into(),
                default: None,
            },
            true,
        );
        let table = Table::new("doc").with_column(column);
        let schema = Schema::new().with_table(table);
        let diff = ShardDiff::compute(&schema, &schema);
        assert!(diff
            .to_modify
            .contains_key(&ElementId::Column("doc".into(), "search".into())));
    }

    #[test]
    fn test_index_column_order_is_significant() {
        let declared = Schema::new().with_table(
            Table::new("t").with_index(Index::new("t_ab", &["a", "b"])),
        );
        let actual = Schema::new().with_table(
            Table::new("t").with_index(Index::new("t_ab", &["b", "a"])),
        );
        let diff = ShardDiff::compute(&declared, &actual);
        assert!(diff.to_modify.contains_key(&ElementId::Index("t".into(), "t_ab".into())));

        let declared = Schema::new().with_table(
            Table::new("t").with_index(Index::new("t_ab", &["a", "b"]).using(IndexMethod::Hash)),
        );
        let actual = Schema::new().with_table(
            Table::new("t").with_index(Index::new("t_ab", &["a", "b"])),
        );
        assert_eq!(ShardDiff::compute(&declared, &actual).change_count(), 1);
    }

    #[test]
    fn test_removed_column_closes_over_covering_elements() {
        let mut declared = customer();
        declared.columns.shift_remove("email");
        declared.constraints.shift_remove("customer_email_key");
        let diff = ShardDiff::compute(
            &Schema::new().with_table(declared),
            &Schema::new().with_table(customer()),
        );
        assert!(diff
            .to_remove
            .contains_key(&ElementId::Column("customer".into(), "email".into())));
        assert!(diff
            .to_remove
            .contains_key(&ElementId::Constraint("customer".into(), "customer_email_key".into())));

        let mut declared = customer();
        declared.columns.shift_remove("name");
        let diff = ShardDiff::compute(
            &Schema::new().with_table(declared),
            &Schema::new().with_table(customer()),
        );
        // Left behind by the declaration, but it covers a removed column.
        assert!(diff
            .to_remove
            .contains_key(&ElementId::Index("customer".into(), "customer_name_idx".into())));
    }

    #[test]
    fn test_removed_table_closes_over_referencing_foreign_keys() {
        // The foreign key is still declared, but its target is not.
        let declared = Schema::new().with_table(order());
        let actual = Schema::new().with_table(customer()).with_table(order());

        let diff = ShardDiff::compute(&declared, &actual);
        assert!(diff.to_remove.contains_key(&ElementId::Table("customer".into())));
        assert!(diff
            .to_remove
            .contains_key(&ElementId::Constraint("order".into(), "order_customer_fk".into())));
    }

    #[test]
    fn test_foreign_keys_between_removed_tables_are_removed_first() {
        let actual = Schema::new().with_table(customer()).with_table(order());
        let diff = ShardDiff::compute(&Schema::new(), &actual);
        assert_eq!(diff.to_remove.len(), 3);
        assert!(diff
            .to_remove
            .contains_key(&ElementId::Constraint("order".into(), "order_customer_fk".into())));
    }

    #[test]
    fn test_removed_table_releases_keys_it_references() {
        let declared = Schema::new().with_table(customer());
        let actual = Schema::new().with_table(customer()).with_table(order());

        let diff = ShardDiff::compute(&declared, &actual);
        assert_eq!(diff.to_remove.len(), 2);
        assert!(diff
            .to_remove
            .contains_key(&ElementId::Constraint("order".into(), "order_customer_fk".into())));
    }

    #[test]
    fn test_display() {
        let mut narrowed = customer();
        narrowed.columns["email"] = make_column("email", ColumnKind::varchar(100), false);
        narrowed.indexes.shift_remove("customer_name_idx");
        let diff = ShardDiff::compute(
            &Schema::new().with_table(narrowed).with_table(order()),
            &Schema::new().with_table(customer()),
        );
        insta::assert_snapshot!(diff.to_string(), @r"
        + table order
        ~ column customer.email (length: 255 -> 100)
        - index customer.customer_name_idx
        ");
    }
}
