//! SQLite catalog reader.
//!
//! Implements [`SchemaSource`] over `sqlite_master` and the `pragma_*` table
//! functions using an SQLx pool.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column as _, Row, ValueRef};
use tracing::{debug, info};

use crate::core::traits::{ColumnMeta, ForeignKeyMeta, IndexMeta, QueryResult, SchemaSource};
use crate::error::{CrawlError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// SQLite catalog reader.
pub struct SqliteSource {
    pool: SqlitePool,
}

impl SqliteSource {
    /// Open a database by sqlx URL (`sqlite://path` or `sqlite::memory:`).
    ///
    /// In-memory databases live as long as their connection, so the pool
    /// keeps its connections forever.
    pub async fn connect(url: &str, max_conns: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| CrawlError::db(e, format!("parsing SQLite URL {}", url)))?
            .create_if_missing(true);

        // every in-memory connection is a separate database
        let max_conns = if url.contains(":memory:") {
            1
        } else {
            max_conns.max(1)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_conns)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| CrawlError::db(e, "creating SQLite pool"))?;

        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| CrawlError::db(e, "testing SQLite connection"))?;

        info!("Connected to SQLite: {}", url);
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Render one cell as text; `None` for SQL NULL.
    fn cell_to_string(row: &SqliteRow, idx: usize) -> Option<String> {
        let is_null = row.try_get_raw(idx).map(|r| r.is_null()).unwrap_or(true);
        if is_null {
            return None;
        }

        // storage classes: INTEGER, REAL, TEXT, BLOB
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return Some(v.to_string());
        }
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return Some(v.to_string());
        }
        if let Ok(v) = row.try_get::<String, _>(idx) {
            return Some(v);
        }
        row.try_get_unchecked::<Vec<u8>, _>(idx)
            .ok()
            .map(|b| String::from_utf8_lossy(&b).into_owned())
    }

    async fn fetch(&self, sql: &str, table: &str, context: &str) -> Result<Vec<SqliteRow>> {
        sqlx::query(sql)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CrawlError::db(e, format!("{} for {}", context, table)))
    }
}

#[async_trait]
impl SchemaSource for SqliteSource {
    fn db_type(&self) -> &str {
        "sqlite"
    }

    fn default_schema(&self) -> &str {
        "main"
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let rows: Vec<SqliteRow> = sqlx::query(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CrawlError::db(e, "listing SQLite tables"))?;

        Ok(rows.iter().map(|r| r.get("name")).collect())
    }

    async fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        let rows = self
            .fetch(
                "SELECT name FROM pragma_table_info(?) WHERE pk > 0 ORDER BY pk",
                table,
                "loading SQLite primary key",
            )
            .await?;
        Ok(rows.iter().map(|r| r.get("name")).collect())
    }

    async fn unique_constraints(&self, table: &str) -> Result<Vec<Vec<String>>> {
        // origin 'u' marks indexes created by a UNIQUE constraint
        let indexes = self
            .fetch(
                "SELECT name FROM pragma_index_list(?) WHERE origin = 'u' ORDER BY seq DESC",
                table,
                "loading SQLite unique constraints",
            )
            .await?;

        let mut constraints = Vec::with_capacity(indexes.len());
        for index in indexes {
            let name: String = index.get("name");
            let cols = self
                .fetch(
                    "SELECT name FROM pragma_index_info(?) ORDER BY seqno",
                    &name,
                    "loading SQLite index columns",
                )
                .await?;
            constraints.push(cols.iter().map(|r| r.get("name")).collect());
        }
        Ok(constraints)
    }

    async fn indexes(&self, table: &str) -> Result<Vec<IndexMeta>> {
        let rows = self
            .fetch(
                "SELECT name, \"unique\" AS is_unique FROM pragma_index_list(?) \
                 WHERE origin != 'pk' ORDER BY seq DESC",
                table,
                "loading SQLite indexes",
            )
            .await?;

        let mut indexes = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.get("name");
            let cols = self
                .fetch(
                    "SELECT name FROM pragma_index_info(?) ORDER BY seqno",
                    &name,
                    "loading SQLite index columns",
                )
                .await?;
            indexes.push(IndexMeta {
                name,
                columns: cols.iter().map(|r| r.get("name")).collect(),
                is_unique: row.get::<i64, _>("is_unique") == 1,
            });
        }

        debug!("Loaded {} indexes for {}", indexes.len(), table);
        Ok(indexes)
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyMeta>> {
        let rows = self
            .fetch(
                "SELECT id, \"table\" AS ref_table, \"from\" AS from_col, \"to\" AS to_col \
                 FROM pragma_foreign_key_list(?) ORDER BY id, seq",
                table,
                "loading SQLite foreign keys",
            )
            .await?;

        let mut fks: Vec<ForeignKeyMeta> = Vec::new();
        let mut current_id: Option<i64> = None;
        for row in rows {
            let id: i64 = row.get("id");
            let ref_table: String = row.get("ref_table");
            let from_col: String = row.get("from_col");
            // `to` is NULL when the reference targets the parent's primary key
            let to_col: Option<String> = row.get("to_col");

            if current_id != Some(id) {
                current_id = Some(id);
                fks.push(ForeignKeyMeta {
                    name: format!("fk_{}_{}", table, id),
                    columns: Vec::new(),
                    ref_schema: None,
                    ref_table,
                    ref_columns: Vec::new(),
                });
            }
            if let Some(fk) = fks.last_mut() {
                fk.columns.push(from_col);
                fk.ref_columns.push(to_col.unwrap_or_default());
            }
        }

        // resolve implicit primary-key references
        for fk in fks.iter_mut() {
            if fk.ref_columns.iter().any(|c| c.is_empty()) {
                let pk = self.primary_key(&fk.ref_table).await?;
                for (i, col) in fk.ref_columns.iter_mut().enumerate() {
                    if col.is_empty() {
                        if let Some(p) = pk.get(i) {
                            *col = p.clone();
                        }
                    }
                }
            }
        }

        debug!("Loaded {} foreign keys for {}", fks.len(), table);
        Ok(fks)
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnMeta>> {
        let rows = self
            .fetch(
                "SELECT name, type, \"notnull\" AS not_null, dflt_value, pk \
                 FROM pragma_table_info(?) ORDER BY cid",
                table,
                "loading SQLite columns",
            )
            .await?;

        let pk_count = rows.iter().filter(|r| r.get::<i64, _>("pk") > 0).count();

        Ok(rows
            .iter()
            .map(|row| {
                let raw_type: String = row.get("type");
                let is_pk = row.get::<i64, _>("pk") > 0;
                ColumnMeta {
                    name: row.get("name"),
                    // a lone INTEGER primary key aliases the rowid
                    autoincrement: is_pk
                        && pk_count == 1
                        && raw_type.eq_ignore_ascii_case("INTEGER"),
                    raw_type,
                    nullable: row.get::<i64, _>("not_null") == 0 && !is_pk,
                    default: row.get("dflt_value"),
                    comment: None,
                }
            })
            .collect())
    }

    async fn table_comment(&self, _table: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn query(&self, sql: &str) -> Result<QueryResult> {
        let rows: Vec<SqliteRow> = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CrawlError::db(e, format!("running query: {}", sql)))?;

        let columns = rows
            .first()
            .map(|r| r.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let rows = rows
            .iter()
            .map(|row| {
                (0..row.columns().len())
                    .map(|i| Self::cell_to_string(row, i))
                    .collect()
            })
            .collect();

        Ok(QueryResult { columns, rows })
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        sqlx::raw_sql(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| CrawlError::db(e, format!("executing: {}", sql)))?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
