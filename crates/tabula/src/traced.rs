//! Connection pool for one shard, with every catalog read and DDL batch
//! wrapped in a tracing span tagged with the shard's namespace.

use tabula_sql::quote_ident;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Error, Row};
use tracing::Instrument;

/// A deadpool-postgres pool bound to the namespace its catalog lives in.
#[derive(Clone)]
pub struct TracedPool {
    pool: deadpool_postgres::Pool,
    namespace: String,
}

impl TracedPool {
    pub fn new(pool: deadpool_postgres::Pool, namespace: impl Into<String>) -> Self {
        Self {
            pool,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Check out a connection.
    pub async fn get(&self) -> Result<TracedObject<'_>, deadpool_postgres::PoolError> {
        let conn = self.pool.get().await?;
        Ok(TracedObject {
            conn,
            namespace: &self.namespace,
        })
    }
}

/// A checked-out connection; returns to the pool on drop.
pub struct TracedObject<'a> {
    conn: deadpool_postgres::Object,
    namespace: &'a str,
}

impl TracedObject<'_> {
    /// Run a catalog query and record how many rows came back.
    pub async fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>, Error> {
        let span = tracing::debug_span!(
            "catalog.query",
            namespace = %self.namespace,
            sql = %sql,
            rows = tracing::field::Empty,
        );
        let rows = self.conn.query(sql, params).instrument(span.clone()).await?;
        span.record("rows", rows.len());
        Ok(rows)
    }

    /// Run rendered DDL with unqualified names resolving to the namespace.
    ///
    /// One operation may carry several statements (a trigger function and
    /// its trigger), so this goes through the simple query protocol.
    pub async fn execute_ddl(&self, sql: &str) -> Result<(), Error> {
        let span = tracing::debug_span!("catalog.ddl", namespace = %self.namespace, sql = %sql);
        let batch = format!("SET search_path TO {};\n{}", quote_ident(self.namespace), sql);
        self.conn.batch_execute(&batch).instrument(span).await
    }
}
