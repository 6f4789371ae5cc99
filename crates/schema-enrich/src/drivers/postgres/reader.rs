//! PostgreSQL catalog reader.
//!
//! Implements [`SchemaSource`] over `pg_catalog`, pooled with deadpool-postgres.
//! Ad-hoc statements go through the simple-query protocol so every cell
//! arrives as text regardless of its type.

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use indexmap::IndexMap;
use tokio_postgres::{Config as PgConfig, SimpleQueryMessage};
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::core::traits::{ColumnMeta, ForeignKeyMeta, IndexMeta, QueryResult, SchemaSource};
use crate::drivers::common::TlsBuilder;
use crate::error::{CrawlError, Result};

/// PostgreSQL catalog reader.
pub struct PostgresSource {
    pool: Pool,
    schema: String,
}

impl PostgresSource {
    /// Connect using the crawler configuration.
    pub async fn connect(config: &DatabaseConfig, max_conns: u32) -> Result<Self> {
        let port = config.effective_port(5432);
        let tls = TlsBuilder::parse(&config.ssl_mode)?;

        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.ssl_mode(tls.ssl_mode().driver_mode());

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let mgr = match tls.build()? {
            Some(connector) => Manager::from_config(pg_config, connector, mgr_config),
            None => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config)
            }
        };
        let pool = Pool::builder(mgr)
            .max_size(max_conns.max(1) as usize)
            .build()
            .map_err(|e| CrawlError::db(e, "creating PostgreSQL pool"))?;

        let client = pool
            .get()
            .await
            .map_err(|e| CrawlError::db(e, "testing PostgreSQL connection"))?;
        client.simple_query("SELECT 1").await?;

        let schema = config
            .schema
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "public".to_string());

        info!(
            "Connected to PostgreSQL: {}:{}/{} (schema {})",
            config.host, port, config.database, schema
        );

        Ok(Self { pool, schema })
    }

    async fn client(&self, context: &str) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| CrawlError::db(e, format!("getting connection for {}", context)))
    }
}

#[async_trait]
impl SchemaSource for PostgresSource {
    fn db_type(&self) -> &str {
        "postgresql"
    }

    fn default_schema(&self) -> &str {
        &self.schema
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let client = self.client("list_tables").await?;
        let query = r#"
            SELECT c.relname::text
            FROM pg_catalog.pg_class c
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = $1 AND c.relkind IN ('r', 'p')
            ORDER BY c.relname
        "#;
        let rows = client.query(query, &[&self.schema]).await?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    async fn has_table(&self, table: &str) -> Result<bool> {
        let client = self.client("has_table").await?;
        let query = r#"
            SELECT 1
            FROM pg_catalog.pg_class c
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = $1 AND c.relname = $2 AND c.relkind IN ('r', 'p')
        "#;
        let row = client.query_opt(query, &[&self.schema, &table]).await?;
        Ok(row.is_some())
    }

    async fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        let client = self.client("primary_key").await?;
        let query = r#"
            SELECT a.attname::text
            FROM pg_catalog.pg_index ix
            JOIN pg_catalog.pg_class t ON t.oid = ix.indrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
            CROSS JOIN LATERAL unnest(ix.indkey) WITH ORDINALITY AS k(attnum, ord)
            JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
            WHERE n.nspname = $1 AND t.relname = $2 AND ix.indisprimary
            ORDER BY k.ord
        "#;
        let rows = client.query(query, &[&self.schema, &table]).await?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    async fn unique_constraints(&self, table: &str) -> Result<Vec<Vec<String>>> {
        let client = self.client("unique_constraints").await?;
        let query = r#"
            SELECT
                c.conname::text,
                array_agg(a.attname::text ORDER BY array_position(c.conkey, a.attnum)) AS columns
            FROM pg_catalog.pg_constraint c
            JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(c.conkey)
            WHERE n.nspname = $1 AND t.relname = $2 AND c.contype = 'u'
            GROUP BY c.conname
            ORDER BY c.conname
        "#;
        let rows = client.query(query, &[&self.schema, &table]).await?;
        Ok(rows.iter().map(|r| r.get::<_, Vec<String>>(1)).collect())
    }

    async fn indexes(&self, table: &str) -> Result<Vec<IndexMeta>> {
        let client = self.client("indexes").await?;
        let query = r#"
            SELECT
                i.relname::text AS index_name,
                ix.indisunique,
                array_agg(a.attname::text ORDER BY array_position(ix.indkey, a.attnum)) AS columns
            FROM pg_catalog.pg_index ix
            JOIN pg_catalog.pg_class i ON i.oid = ix.indexrelid
            JOIN pg_catalog.pg_class t ON t.oid = ix.indrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey)
            WHERE n.nspname = $1
              AND t.relname = $2
              AND NOT ix.indisprimary
            GROUP BY i.relname, ix.indisunique
            ORDER BY i.relname
        "#;
        let rows = client.query(query, &[&self.schema, &table]).await?;

        let indexes: Vec<IndexMeta> = rows
            .iter()
            .map(|row| IndexMeta {
                name: row.get(0),
                is_unique: row.get(1),
                columns: row.get(2),
            })
            .collect();

        debug!("Loaded {} indexes for {}.{}", indexes.len(), self.schema, table);
        Ok(indexes)
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyMeta>> {
        let client = self.client("foreign_keys").await?;
        // unnest both key arrays together so composite keys pair up by position
        let query = r#"
            SELECT
                c.conname::text AS fk_name,
                a.attname::text AS column_name,
                rn.nspname::text AS ref_schema,
                rt.relname::text AS ref_table,
                ra.attname::text AS ref_column
            FROM pg_catalog.pg_constraint c
            JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_catalog.pg_class rt ON rt.oid = c.confrelid
            JOIN pg_catalog.pg_namespace rn ON rn.oid = rt.relnamespace
            CROSS JOIN LATERAL unnest(c.conkey, c.confkey) WITH ORDINALITY AS k(attnum, refnum, ord)
            JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
            JOIN pg_catalog.pg_attribute ra ON ra.attrelid = rt.oid AND ra.attnum = k.refnum
            WHERE n.nspname = $1
              AND t.relname = $2
              AND c.contype = 'f'
            ORDER BY c.conname, k.ord
        "#;
        let rows = client.query(query, &[&self.schema, &table]).await?;

        let mut fk_map: IndexMap<String, ForeignKeyMeta> = IndexMap::new();
        for row in rows {
            let name: String = row.get(0);
            let ref_schema: String = row.get(2);
            let fk = fk_map.entry(name.clone()).or_insert_with(|| ForeignKeyMeta {
                name,
                columns: Vec::new(),
                ref_schema: (ref_schema != self.schema).then_some(ref_schema),
                ref_table: row.get(3),
                ref_columns: Vec::new(),
            });
            fk.columns.push(row.get(1));
            fk.ref_columns.push(row.get(4));
        }

        debug!(
            "Loaded {} foreign keys for {}.{}",
            fk_map.len(),
            self.schema,
            table
        );
        Ok(fk_map.into_values().collect())
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnMeta>> {
        let client = self.client("columns").await?;
        let query = r#"
            SELECT
                a.attname::text,
                pg_catalog.format_type(a.atttypid, a.atttypmod),
                NOT a.attnotnull,
                pg_catalog.pg_get_expr(d.adbin, d.adrelid),
                (a.attidentity IN ('a', 'd')
                    OR COALESCE(pg_catalog.pg_get_expr(d.adbin, d.adrelid), '') LIKE 'nextval(%'),
                pg_catalog.col_description(a.attrelid, a.attnum)
            FROM pg_catalog.pg_attribute a
            JOIN pg_catalog.pg_class t ON t.oid = a.attrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
            LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
            WHERE n.nspname = $1
              AND t.relname = $2
              AND a.attnum > 0
              AND NOT a.attisdropped
            ORDER BY a.attnum
        "#;
        let rows = client.query(query, &[&self.schema, &table]).await?;

        Ok(rows
            .iter()
            .map(|row| ColumnMeta {
                name: row.get(0),
                raw_type: row.get(1),
                nullable: row.get(2),
                default: row.get(3),
                autoincrement: row.get(4),
                comment: row.get(5),
            })
            .collect())
    }

    async fn table_comment(&self, table: &str) -> Result<Option<String>> {
        let client = self.client("table_comment").await?;
        let query = r#"
            SELECT pg_catalog.obj_description(c.oid, 'pg_class')
            FROM pg_catalog.pg_class c
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = $1 AND c.relname = $2
        "#;
        let row = client.query_opt(query, &[&self.schema, &table]).await?;
        Ok(row.and_then(|r| r.get::<_, Option<String>>(0)))
    }

    async fn query(&self, sql: &str) -> Result<QueryResult> {
        let client = self.client("query").await?;
        let messages = client
            .simple_query(sql)
            .await
            .map_err(|e| CrawlError::db(e, format!("running query: {}", sql)))?;

        let mut result = QueryResult::default();
        for message in messages {
            if let SimpleQueryMessage::Row(row) = message {
                if result.columns.is_empty() {
                    result.columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                }
                result.rows.push(
                    (0..row.len())
                        .map(|i| row.get(i).map(str::to_string))
                        .collect(),
                );
            }
        }
        Ok(result)
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        let client = self.client("execute").await?;
        client
            .batch_execute(sql)
            .await
            .map_err(|e| CrawlError::db(e, format!("executing: {}", sql)))
    }

    async fn close(&self) {
        self.pool.close();
    }
}
