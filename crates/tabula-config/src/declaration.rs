//! Declaration file types.
//!
//! ```styx
//! tables {
//!     customer {
//!         comment "Registered customers"
//!         columns {
//!             id {type integer, nullable false, identity true}
//!             email {type varchar, length 255, nullable false}
//!             updated_at {type timestamp, default CURRENT_TIMESTAMP, on_update CURRENT_TIMESTAMP}
//!         }
//!         indexes {
//!             customer_email_idx {columns (email), unique true}
//!         }
//!         constraints {
//!             customer_pkey {type primary, columns (id)}
//!         }
//!     }
//! }
//! ```

use facet::Facet;
use indexmap::IndexMap;

/// A declaration document: every table, for every shard.
#[derive(Debug, Clone, Default, Facet)]
pub struct DeclarationFile {
    /// Tables keyed by name.
    #[facet(default)]
    pub tables: IndexMap<String, TableDecl>,
}

/// A declared table.
#[derive(Debug, Clone, Default, Facet)]
pub struct TableDecl {
    /// Shard holding the table. The default shard when absent.
    #[facet(default)]
    pub shard: Option<String>,

    /// Create the table `UNLOGGED`.
    #[facet(default)]
    pub unlogged: Option<bool>,

    #[facet(default)]
    pub comment: Option<String>,

    #[facet(default)]
    pub columns: IndexMap<String, ColumnDecl>,

    #[facet(default)]
    pub indexes: IndexMap<String, IndexDecl>,

    #[facet(default)]
    pub constraints: IndexMap<String, ConstraintDecl>,
}

/// A declared column.
#[derive(Debug, Clone, Default, Facet)]
pub struct ColumnDecl {
    /// Column type: `smallint`, `integer`, `bigint`, `decimal`, `real`,
    /// `double`, `boolean`, `varchar`, `text`, `blob`, `timestamp`,
    /// `timestamptz`, `date`, `json`, `uuid`.
    #[facet(rename = "type")]
    pub column_type: String,

    /// Defaults to true.
    #[facet(default)]
    pub nullable: Option<bool>,

    /// Default literal, written the way it would appear in SQL without quotes.
    #[facet(default)]
    pub default: Option<String>,

    /// Timestamps only: expression assigned on every row update.
    #[facet(default)]
    pub on_update: Option<String>,

    /// Varchar length. Defaults to 255.
    #[facet(default)]
    pub length: Option<u32>,

    /// Decimal precision. Defaults to 10.
    #[facet(default)]
    pub precision: Option<u32>,

    /// Decimal scale. Defaults to 0.
    #[facet(default)]
    pub scale: Option<u32>,

    /// Integers only: `GENERATED BY DEFAULT AS IDENTITY`.
    #[facet(default)]
    pub identity: Option<bool>,

    #[facet(default)]
    pub comment: Option<String>,
}

/// A declared secondary index.
#[derive(Debug, Clone, Default, Facet)]
pub struct IndexDecl {
    /// Column specs in order, each optionally suffixed with `DESC`.
    pub columns: Vec<String>,

    #[facet(default)]
    pub unique: Option<bool>,

    /// Access method: `btree` (default), `hash`, `gin`, `gist`, `brin`.
    #[facet(default)]
    pub method: Option<String>,
}

/// A declared constraint.
#[derive(Debug, Clone, Default, Facet)]
pub struct ConstraintDecl {
    /// `primary`, `unique` or `foreign`.
    #[facet(rename = "type")]
    pub constraint_type: String,

    pub columns: Vec<String>,

    /// Foreign keys only: referenced table.
    #[facet(default)]
    pub references: Option<String>,

    /// Foreign keys only: referenced columns, same arity as `columns`.
    #[facet(default)]
    pub ref_columns: Option<Vec<String>>,

    /// Foreign keys only, e.g. `cascade` or `set_null`.
    #[facet(default)]
    pub on_delete: Option<String>,

    #[facet(default)]
    pub on_update: Option<String>,
}
