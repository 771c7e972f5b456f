//! Catalog queries against a live PostgreSQL server.

use super::{
    Catalog, CatalogError, CatalogFuture, RawColumn, RawConstraint, RawIndex, RawTable,
    RawTrigger,
};
use crate::TracedPool;

const TABLES_SQL: &str = r#"
SELECT c.relname::text AS name,
       c.relpersistence = 'u' AS unlogged,
       obj_description(c.oid, 'pg_class') AS comment
FROM pg_class c
JOIN pg_namespace n ON n.oid = c.relnamespace
WHERE n.nspname = $1
  AND c.relkind IN ('r', 'p')
ORDER BY c.relname
"#;

const COLUMNS_SQL: &str = r#"
SELECT column_name::text AS name,
       ordinal_position::int4 AS ordinal,
       udt_name::text AS udt_name,
       data_type::text AS data_type,
       character_maximum_length::int4 AS char_length,
       numeric_precision::int4 AS numeric_precision,
       numeric_scale::int4 AS numeric_scale,
       is_nullable = 'YES' AS nullable,
       column_default::text AS default_expr,
       is_identity = 'YES' AS identity,
       col_description(format('%I.%I', table_schema, table_name)::regclass::oid,
                       ordinal_position::int4) AS comment
FROM information_schema.columns
WHERE table_schema = $1
  AND table_name = $2
ORDER BY ordinal_position
"#;

// Indexes that back a primary key or unique constraint are reported with
// the constraint, not here.
const INDEXES_SQL: &str = r#"
SELECT i.relname::text AS name,
       ix.indisunique AS is_unique,
       am.amname::text AS method,
       ARRAY(
           SELECT a.attname::text
           FROM unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
           JOIN pg_attribute a ON a.attrelid = ix.indrelid AND a.attnum = k.attnum
           ORDER BY k.ord
       ) AS columns,
       ARRAY(
           SELECT (o.opt & 1) = 1
           FROM unnest(ix.indoption::int2[]) WITH ORDINALITY AS o(opt, ord)
           ORDER BY o.ord
       ) AS descending
FROM pg_index ix
JOIN pg_class t ON t.oid = ix.indrelid
JOIN pg_class i ON i.oid = ix.indexrelid
JOIN pg_namespace n ON n.oid = t.relnamespace
JOIN pg_am am ON am.oid = i.relam
WHERE n.nspname = $1
  AND t.relname = $2
  AND NOT EXISTS (
      SELECT 1 FROM pg_constraint c
      WHERE c.conindid = ix.indexrelid AND c.conrelid = ix.indrelid
  )
ORDER BY i.relname
"#;

const CONSTRAINTS_SQL: &str = r#"
SELECT c.conname::text AS name,
       c.contype::text AS kind,
       ARRAY(
           SELECT a.attname::text
           FROM unnest(c.conkey) WITH ORDINALITY AS k(attnum, ord)
           JOIN pg_attribute a ON a.attrelid = c.conrelid AND a.attnum = k.attnum
           ORDER BY k.ord
       ) AS columns,
       rt.relname::text AS ref_table,
       ARRAY(
           SELECT a.attname::text
           FROM unnest(c.confkey) WITH ORDINALITY AS k(attnum, ord)
           JOIN pg_attribute a ON a.attrelid = c.confrelid AND a.attnum = k.attnum
           ORDER BY k.ord
       ) AS ref_columns,
       CASE WHEN c.contype = 'f' THEN c.confdeltype::text END AS on_delete,
       CASE WHEN c.contype = 'f' THEN c.confupdtype::text END AS on_update
FROM pg_constraint c
JOIN pg_class t ON t.oid = c.conrelid
JOIN pg_namespace n ON n.oid = t.relnamespace
LEFT JOIN pg_class rt ON rt.oid = c.confrelid
WHERE n.nspname = $1
  AND t.relname = $2
  AND c.contype IN ('p', 'u', 'f')
ORDER BY c.conname
"#;

const TRIGGERS_SQL: &str = r#"
SELECT tg.tgname::text AS name,
       obj_description(tg.oid, 'pg_trigger') AS comment
FROM pg_trigger tg
JOIN pg_class c ON c.oid = tg.tgrelid
JOIN pg_namespace n ON n.oid = c.relnamespace
WHERE n.nspname = $1
  AND c.relname = $2
  AND NOT tg.tgisinternal
ORDER BY tg.tgname
"#;

/// A [`Catalog`] backed by a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PgCatalog {
    pool: TracedPool,
}

impl PgCatalog {
    /// Read and write tables inside the pool's namespace (e.g. `public`).
    pub fn new(pool: TracedPool) -> Self {
        Self { pool }
    }

    fn namespace(&self) -> &str {
        self.pool.namespace()
    }
}

impl Catalog for PgCatalog {
    fn tables(&self) -> CatalogFuture<'_, Vec<RawTable>> {
        Box::pin(async move {
            let conn = self.pool.get().await?;
            let rows = conn.query(TABLES_SQL, &[&self.namespace()]).await?;
            Ok(rows
                .iter()
                .map(|row| RawTable {
                    name: row.get("name"),
                    unlogged: row.get("unlogged"),
                    comment: row.get("comment"),
                })
                .collect())
        })
    }

    fn columns<'a>(&'a self, table: &'a str) -> CatalogFuture<'a, Vec<RawColumn>> {
        Box::pin(async move {
            let conn = self.pool.get().await?;
            let rows = conn.query(COLUMNS_SQL, &[&self.namespace(), &table]).await?;
            Ok(rows
                .iter()
                .map(|row| RawColumn {
                    name: row.get("name"),
                    ordinal: row.get("ordinal"),
                    udt_name: row.get("udt_name"),
                    data_type: row.get("data_type"),
                    char_length: row.get("char_length"),
                    numeric_precision: row.get("numeric_precision"),
                    numeric_scale: row.get("numeric_scale"),
                    nullable: row.get("nullable"),
                    default: row.get("default_expr"),
                    identity: row.get("identity"),
                    comment: row.get("comment"),
                })
                .collect())
        })
    }

    fn indexes<'a>(&'a self, table: &'a str) -> CatalogFuture<'a, Vec<RawIndex>> {
        Box::pin(async move {
            let conn = self.pool.get().await?;
            let rows = conn.query(INDEXES_SQL, &[&self.namespace(), &table]).await?;
            Ok(rows
                .iter()
                .map(|row| RawIndex {
                    name: row.get("name"),
                    columns: row.get("columns"),
                    descending: row.get("descending"),
                    unique: row.get("is_unique"),
                    method: row.get("method"),
                })
                .collect())
        })
    }

    fn constraints<'a>(&'a self, table: &'a str) -> CatalogFuture<'a, Vec<RawConstraint>> {
        Box::pin(async move {
            let conn = self.pool.get().await?;
            let rows = conn
                .query(CONSTRAINTS_SQL, &[&self.namespace(), &table])
                .await?;
            Ok(rows
                .iter()
                .map(|row| RawConstraint {
                    name: row.get("name"),
                    kind: row.get("kind"),
                    columns: row.get("columns"),
                    ref_table: row.get("ref_table"),
                    ref_columns: row.get("ref_columns"),
                    on_delete: row.get("on_delete"),
                    on_update: row.get("on_update"),
                })
                .collect())
        })
    }

    fn triggers<'a>(&'a self, table: &'a str) -> CatalogFuture<'a, Vec<RawTrigger>> {
        Box::pin(async move {
            let conn = self.pool.get().await?;
            let rows = conn.query(TRIGGERS_SQL, &[&self.namespace(), &table]).await?;
            Ok(rows
                .iter()
                .map(|row| RawTrigger {
                    name: row.get("name"),
                    comment: row.get("comment"),
                })
                .collect())
        })
    }

    fn execute<'a>(&'a self, sql: &'a str) -> CatalogFuture<'a, ()> {
        Box::pin(async move {
            let conn = self.pool.get().await?;
            conn.execute_ddl(sql).await?;
            Ok(())
        })
    }
}
