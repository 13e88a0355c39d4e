//! PostgreSQL implementation of [`DataAccess`].
//!
//! Catalog lookups go through `information_schema`. Value-set queries
//! compare `column::text` against a `text[]` parameter so ids of any type
//! bind the same way.

mod convert;
mod tls;

pub use convert::{convert_row, quote_ident};
pub use tls::{connector, SslMode};

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use tokio_postgres::Config as PgConfig;
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::core::{
    ColumnMetadata, DataAccess, ForeignKey, ReferencingColumn, RowSet, SqlValue, TableSchema,
    ValueProbe,
};
use crate::error::{CompareError, Result, Side};

use convert::{first_column_values, text_params};

/// One side of a comparison backed by a deadpool-postgres pool.
pub struct PgDatabase {
    pool: Pool,
    side: Side,
}

impl PgDatabase {
    /// Build the pool and verify connectivity.
    pub async fn connect(config: &DatabaseConfig, side: Side) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let context = format!("creating {} pool for {}", side, config.label());

        let pool = match connector(config)? {
            Some(tls) => {
                let mgr = Manager::from_config(pg_config, tls, mgr_config);
                Pool::builder(mgr)
                    .max_size(config.max_connections)
                    .build()
                    .map_err(|e| CompareError::pool(e, context.clone()))?
            }
            None => {
                let mgr = Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config);
                Pool::builder(mgr)
                    .max_size(config.max_connections)
                    .build()
                    .map_err(|e| CompareError::pool(e, context.clone()))?
            }
        };

        let db = Self { pool, side };
        db.ping().await?;
        info!("Connected to {} ({})", side, config.label());
        Ok(db)
    }

    async fn client(&self, operation: &str) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| {
                CompareError::pool(e, format!("{} connection for {}", self.side, operation))
            })
    }

    fn fetch_err(&self, what: &str, e: tokio_postgres::Error) -> CompareError {
        CompareError::fetch(self.side, format!("{}: {}", what, e))
    }

    async fn load_columns(&self, schema: &str, table: &str) -> Result<Vec<ColumnMetadata>> {
        let client = self.client("load_columns").await?;
        let query = r#"
            SELECT
                c.column_name::text,
                c.data_type::text,
                c.is_nullable = 'YES',
                pk.column_name IS NOT NULL
            FROM information_schema.columns c
            LEFT JOIN (
                SELECT ku.column_name
                FROM information_schema.table_constraints tc
                JOIN information_schema.key_column_usage ku
                    ON tc.constraint_name = ku.constraint_name
                    AND tc.table_schema = ku.table_schema
                WHERE tc.constraint_type = 'PRIMARY KEY'
                    AND tc.table_schema = $1
                    AND tc.table_name = $2
            ) pk ON c.column_name = pk.column_name
            WHERE c.table_schema = $1 AND c.table_name = $2
            ORDER BY c.ordinal_position
        "#;

        let rows = client
            .query(query, &[&schema, &table])
            .await
            .map_err(|e| CompareError::Schema(format!("columns of {}.{}: {}", schema, table, e)))?;

        Ok(rows
            .iter()
            .map(|row| ColumnMetadata {
                name: row.get(0),
                data_type: row.get(1),
                is_nullable: row.get(2),
                is_primary_key: row.get(3),
            })
            .collect())
    }

    async fn load_foreign_keys(&self, schema: &str, table: &str) -> Result<Vec<ForeignKey>> {
        let client = self.client("load_foreign_keys").await?;
        let query = r#"
            SELECT
                kcu.column_name::text,
                ccu.table_schema::text,
                ccu.table_name::text,
                ccu.column_name::text,
                tc.constraint_name::text
            FROM information_schema.table_constraints AS tc
            JOIN information_schema.key_column_usage AS kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            JOIN information_schema.constraint_column_usage AS ccu
                ON ccu.constraint_name = tc.constraint_name
                AND ccu.table_schema = tc.table_schema
            WHERE tc.constraint_type = 'FOREIGN KEY'
                AND tc.table_schema = $1
                AND tc.table_name = $2
            ORDER BY tc.constraint_name, kcu.ordinal_position
        "#;

        let rows = client.query(query, &[&schema, &table]).await.map_err(|e| {
            CompareError::Schema(format!("foreign keys of {}.{}: {}", schema, table, e))
        })?;

        Ok(rows
            .iter()
            .map(|row| {
                ForeignKey::new(
                    row.get::<_, String>(0),
                    row.get::<_, String>(1),
                    row.get::<_, String>(2),
                    row.get::<_, String>(3),
                    row.get::<_, String>(4),
                )
            })
            .collect())
    }
}

fn referencing_columns(rows: &[tokio_postgres::Row]) -> Vec<ReferencingColumn> {
    rows.iter()
        .map(|row| {
            ReferencingColumn::new(
                row.get::<_, String>(0),
                row.get::<_, String>(1),
                row.get::<_, String>(2),
                row.get::<_, String>(3),
            )
        })
        .collect()
}

#[async_trait]
impl DataAccess for PgDatabase {
    async fn table_exists(&self, schema: &str, table: &str) -> Result<bool> {
        let client = self.client("table_exists").await?;
        let row = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
                 WHERE table_schema = $1 AND table_name = $2)",
                &[&schema, &table],
            )
            .await?;
        Ok(row.get(0))
    }

    async fn get_schema(&self, schema: &str, table: &str) -> Result<TableSchema> {
        let (columns, foreign_keys) = tokio::try_join!(
            self.load_columns(schema, table),
            self.load_foreign_keys(schema, table),
        )?;
        if columns.is_empty() {
            return Err(CompareError::Schema(format!(
                "no columns found for {}.{} in {}",
                schema, table, self.side
            )));
        }
        debug!(
            "{}.{}: {} columns, {} foreign keys",
            schema,
            table,
            columns.len(),
            foreign_keys.len()
        );
        Ok(TableSchema {
            schema: schema.to_string(),
            table: table.to_string(),
            columns,
            foreign_keys,
        })
    }

    async fn get_all_rows(&self, schema: &str, table: &str) -> Result<RowSet> {
        let client = self.client("get_all_rows").await?;
        let query = format!("SELECT * FROM {}.{}", quote_ident(schema), quote_ident(table));
        let rows = client
            .query(query.as_str(), &[])
            .await
            .map_err(|e| self.fetch_err(&format!("rows of {}.{}", schema, table), e))?;
        Ok(rows.iter().map(convert_row).collect())
    }

    async fn get_rows_by_column_values(
        &self,
        schema: &str,
        table: &str,
        column: &str,
        values: &[SqlValue],
    ) -> Result<RowSet> {
        let params = text_params(values);
        if params.is_empty() {
            return Ok(Vec::new());
        }
        let client = self.client("get_rows_by_column_values").await?;
        let query = format!(
            "SELECT * FROM {}.{} WHERE {}::text = ANY($1)",
            quote_ident(schema),
            quote_ident(table),
            quote_ident(column)
        );
        let rows = client
            .query(query.as_str(), &[&params])
            .await
            .map_err(|e| self.fetch_err(&format!("rows of {}.{}", schema, table), e))?;
        Ok(rows.iter().map(convert_row).collect())
    }

    async fn get_referencing_constraints(
        &self,
        schema: &str,
        table: &str,
        column: &str,
    ) -> Result<Vec<ReferencingColumn>> {
        let client = self.client("get_referencing_constraints").await?;
        let query = r#"
            SELECT
                kcu.table_schema::text,
                kcu.table_name::text,
                kcu.column_name::text,
                tc.constraint_name::text
            FROM information_schema.key_column_usage kcu
            JOIN information_schema.table_constraints tc
                ON kcu.constraint_name = tc.constraint_name
                AND kcu.table_schema = tc.table_schema
            JOIN information_schema.referential_constraints rc
                ON tc.constraint_name = rc.constraint_name
                AND tc.table_schema = rc.constraint_schema
            JOIN information_schema.key_column_usage rcu
                ON rc.unique_constraint_name = rcu.constraint_name
                AND rc.unique_constraint_schema = rcu.table_schema
            WHERE tc.constraint_type = 'FOREIGN KEY'
                AND rcu.table_schema = $1
                AND rcu.table_name = $2
                AND rcu.column_name = $3
            ORDER BY kcu.table_schema, kcu.table_name, kcu.column_name
        "#;
        let rows = client.query(query, &[&schema, &table, &column]).await?;
        Ok(referencing_columns(&rows))
    }

    async fn get_constraints_targeting_table(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<ReferencingColumn>> {
        let client = self.client("get_constraints_targeting_table").await?;
        let query = r#"
            SELECT DISTINCT
                tc.table_schema::text,
                tc.table_name::text,
                kcu.column_name::text,
                tc.constraint_name::text
            FROM information_schema.table_constraints AS tc
            JOIN information_schema.key_column_usage AS kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
            JOIN information_schema.constraint_column_usage AS ccu
                ON ccu.constraint_name = tc.constraint_name
                AND ccu.table_schema = tc.table_schema
            WHERE tc.constraint_type = 'FOREIGN KEY'
                AND ccu.table_schema = $1
                AND ccu.table_name = $2
            ORDER BY 1, 2, 3
        "#;
        let rows = client.query(query, &[&schema, &table]).await?;
        Ok(referencing_columns(&rows))
    }

    async fn find_columns_named(
        &self,
        schema: &str,
        column: &str,
        exclude_table: &str,
    ) -> Result<Vec<ReferencingColumn>> {
        let client = self.client("find_columns_named").await?;
        let query = r#"
            SELECT DISTINCT c.table_schema::text, c.table_name::text, c.column_name::text
            FROM information_schema.columns c
            WHERE c.table_schema = $1
                AND c.column_name = $2
                AND c.table_name != $3
            ORDER BY 1, 2
        "#;
        let rows = client
            .query(query, &[&schema, &column, &exclude_table])
            .await?;
        Ok(rows
            .iter()
            .map(|row| {
                ReferencingColumn::inferred(
                    row.get::<_, String>(0),
                    row.get::<_, String>(1),
                    row.get::<_, String>(2),
                )
            })
            .collect())
    }

    async fn get_distinct_column_values(
        &self,
        schema: &str,
        table: &str,
        column: &str,
    ) -> Result<Vec<SqlValue>> {
        let client = self.client("get_distinct_column_values").await?;
        let col = quote_ident(column);
        let query = format!(
            "SELECT DISTINCT {col} FROM {}.{} WHERE {col} IS NOT NULL ORDER BY {col}",
            quote_ident(schema),
            quote_ident(table),
        );
        let rows = client
            .query(query.as_str(), &[])
            .await
            .map_err(|e| self.fetch_err(&format!("values of {}.{}.{}", schema, table, column), e))?;
        Ok(first_column_values(&rows))
    }

    async fn probe_value(
        &self,
        schema: &str,
        table: &str,
        column: &str,
        value: &str,
        limit: usize,
    ) -> Result<ValueProbe> {
        let client = self.client("probe_value").await?;
        let col = quote_ident(column);
        let target = format!("{}.{}", quote_ident(schema), quote_ident(table));

        let count_query = format!("SELECT COUNT(*) FROM {target} WHERE {col}::text = $1");
        let count: i64 = client
            .query_one(count_query.as_str(), &[&value])
            .await
            .map_err(|e| self.fetch_err(&format!("probe of {}.{}", table, column), e))?
            .get(0);

        let sample_query = format!("SELECT {col} FROM {target} WHERE {col}::text = $1 LIMIT $2");
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let samples = client
            .query(sample_query.as_str(), &[&value, &limit])
            .await
            .map_err(|e| self.fetch_err(&format!("samples of {}.{}", table, column), e))?;

        Ok(ValueProbe {
            count: u64::try_from(count).unwrap_or_default(),
            samples: first_column_values(&samples),
        })
    }

    async fn ping(&self) -> Result<()> {
        let client = self.client("ping").await?;
        if let Err(e) = client.simple_query("SELECT 1").await {
            warn!("{} ping failed: {}", self.side, e);
            return Err(e.into());
        }
        Ok(())
    }

    fn db_type(&self) -> &str {
        "postgres"
    }
}
