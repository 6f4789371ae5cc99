//! MySQL/MariaDB catalog reader.
//!
//! Implements [`SchemaSource`] over INFORMATION_SCHEMA using an SQLx pool.

use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow, MySqlSslMode};
use sqlx::{Column as _, Row, ValueRef};
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::core::traits::{ColumnMeta, ForeignKeyMeta, IndexMeta, QueryResult, SchemaSource};
use crate::error::{CrawlError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// MySQL/MariaDB catalog reader.
pub struct MysqlSource {
    pool: MySqlPool,
    database: String,
}

impl MysqlSource {
    /// Connect using the crawler configuration.
    pub async fn connect(config: &DatabaseConfig, max_conns: u32) -> Result<Self> {
        let port = config.effective_port(3306);
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(port)
            .database(&config.database)
            .username(&config.user)
            .password(&config.password)
            .ssl_mode(MySqlSslMode::Preferred);

        let pool = MySqlPoolOptions::new()
            .max_connections(max_conns.max(1))
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| CrawlError::db(e, "creating MySQL pool"))?;

        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| CrawlError::db(e, "testing MySQL connection"))?;

        info!(
            "Connected to MySQL: {}:{}/{}",
            config.host, port, config.database
        );

        Ok(Self {
            pool,
            database: config.database.clone(),
        })
    }

    /// Render one cell as text; `None` for SQL NULL.
    ///
    /// Statements are ad hoc, so the decoder probes the common Rust types in
    /// turn instead of dispatching on a known column type.
    fn cell_to_string(row: &MySqlRow, idx: usize) -> Option<String> {
        let is_null = row.try_get_raw(idx).map(|r| r.is_null()).unwrap_or(true);
        if is_null {
            return None;
        }

        if let Ok(v) = row.try_get::<String, _>(idx) {
            return Some(v);
        }
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return Some(v.to_string());
        }
        if let Ok(v) = row.try_get::<u64, _>(idx) {
            return Some(v.to_string());
        }
        if let Ok(v) = row.try_get::<rust_decimal::Decimal, _>(idx) {
            return Some(v.to_string());
        }
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return Some(v.to_string());
        }
        if let Ok(v) = row.try_get::<f32, _>(idx) {
            return Some(v.to_string());
        }
        if let Ok(v) = row.try_get::<chrono::NaiveDateTime, _>(idx) {
            return Some(v.to_string());
        }
        if let Ok(v) = row.try_get::<chrono::NaiveDate, _>(idx) {
            return Some(v.to_string());
        }
        if let Ok(v) = row.try_get::<chrono::NaiveTime, _>(idx) {
            return Some(v.to_string());
        }
        if let Ok(v) = row.try_get::<bool, _>(idx) {
            return Some(v.to_string());
        }
        row.try_get_unchecked::<Vec<u8>, _>(idx)
            .ok()
            .map(|b| String::from_utf8_lossy(&b).into_owned())
    }

    /// Split a GROUP_CONCAT column list.
    fn split_columns(columns: &str) -> Vec<String> {
        columns
            .split(',')
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect()
    }
}

#[async_trait]
impl SchemaSource for MysqlSource {
    fn db_type(&self) -> &str {
        "mysql"
    }

    fn default_schema(&self) -> &str {
        &self.database
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        // CAST to CHAR: information_schema may return VARBINARY under some collations
        let query = r#"
            SELECT CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CrawlError::db(e, "listing MySQL tables"))?;

        Ok(rows.iter().map(|r| r.get("TABLE_NAME")).collect())
    }

    async fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        let query = r#"
            SELECT CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME
            FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY'
            ORDER BY ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CrawlError::db(e, "loading MySQL primary key"))?;

        Ok(rows.iter().map(|r| r.get("COLUMN_NAME")).collect())
    }

    async fn unique_constraints(&self, table: &str) -> Result<Vec<Vec<String>>> {
        let query = r#"
            SELECT
                CAST(tc.CONSTRAINT_NAME AS CHAR(255)) AS CONSTRAINT_NAME,
                GROUP_CONCAT(CAST(kcu.COLUMN_NAME AS CHAR(255)) ORDER BY kcu.ORDINAL_POSITION) AS columns
            FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
            JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
                ON tc.CONSTRAINT_SCHEMA = kcu.CONSTRAINT_SCHEMA
                AND tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME
                AND tc.TABLE_NAME = kcu.TABLE_NAME
            WHERE tc.TABLE_SCHEMA = ? AND tc.TABLE_NAME = ?
              AND tc.CONSTRAINT_TYPE = 'UNIQUE'
            GROUP BY tc.CONSTRAINT_NAME
            ORDER BY tc.CONSTRAINT_NAME
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CrawlError::db(e, "loading MySQL unique constraints"))?;

        Ok(rows
            .iter()
            .map(|r| Self::split_columns(&r.get::<String, _>("columns")))
            .collect())
    }

    async fn indexes(&self, table: &str) -> Result<Vec<IndexMeta>> {
        let query = r#"
            SELECT
                CAST(INDEX_NAME AS CHAR(255)) AS INDEX_NAME,
                GROUP_CONCAT(CAST(COLUMN_NAME AS CHAR(255)) ORDER BY SEQ_IN_INDEX) AS columns,
                IF(NON_UNIQUE = 0, 1, 0) AS is_unique
            FROM INFORMATION_SCHEMA.STATISTICS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
              AND INDEX_NAME != 'PRIMARY'
            GROUP BY INDEX_NAME, NON_UNIQUE
            ORDER BY INDEX_NAME
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CrawlError::db(e, "loading MySQL indexes"))?;

        let indexes: Vec<IndexMeta> = rows
            .iter()
            .map(|row| IndexMeta {
                name: row.get("INDEX_NAME"),
                columns: Self::split_columns(&row.get::<String, _>("columns")),
                is_unique: row.get::<i32, _>("is_unique") == 1,
            })
            .collect();

        debug!("Loaded {} indexes for {}", indexes.len(), table);
        Ok(indexes)
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyMeta>> {
        let query = r#"
            SELECT
                CAST(rc.CONSTRAINT_NAME AS CHAR(255)) AS CONSTRAINT_NAME,
                CAST(kcu.COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(kcu.REFERENCED_TABLE_SCHEMA AS CHAR(255)) AS REFERENCED_TABLE_SCHEMA,
                CAST(kcu.REFERENCED_TABLE_NAME AS CHAR(255)) AS REFERENCED_TABLE_NAME,
                CAST(kcu.REFERENCED_COLUMN_NAME AS CHAR(255)) AS REFERENCED_COLUMN_NAME
            FROM INFORMATION_SCHEMA.REFERENTIAL_CONSTRAINTS rc
            JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
                ON rc.CONSTRAINT_SCHEMA = kcu.CONSTRAINT_SCHEMA
                AND rc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME
                AND rc.TABLE_NAME = kcu.TABLE_NAME
            WHERE rc.CONSTRAINT_SCHEMA = ? AND rc.TABLE_NAME = ?
            ORDER BY rc.CONSTRAINT_NAME, kcu.ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CrawlError::db(e, "loading MySQL foreign keys"))?;

        // Group by constraint name, keeping catalog order
        let mut fk_map: IndexMap<String, ForeignKeyMeta> = IndexMap::new();
        for row in rows {
            let name: String = row.get("CONSTRAINT_NAME");
            let ref_schema: String = row.get("REFERENCED_TABLE_SCHEMA");
            let fk = fk_map.entry(name.clone()).or_insert_with(|| ForeignKeyMeta {
                name,
                columns: Vec::new(),
                ref_schema: (ref_schema != self.database).then_some(ref_schema),
                ref_table: row.get("REFERENCED_TABLE_NAME"),
                ref_columns: Vec::new(),
            });
            fk.columns.push(row.get("COLUMN_NAME"));
            fk.ref_columns.push(row.get("REFERENCED_COLUMN_NAME"));
        }

        debug!("Loaded {} foreign keys for {}", fk_map.len(), table);
        Ok(fk_map.into_values().collect())
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnMeta>> {
        let query = r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(COLUMN_TYPE AS CHAR(4000)) AS COLUMN_TYPE,
                IF(IS_NULLABLE = 'YES', 1, 0) AS is_nullable,
                CAST(COLUMN_DEFAULT AS CHAR(4000)) AS COLUMN_DEFAULT,
                IF(EXTRA LIKE '%auto_increment%', 1, 0) AS is_identity,
                CAST(COLUMN_COMMENT AS CHAR(4000)) AS COLUMN_COMMENT
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CrawlError::db(e, "loading MySQL columns"))?;

        Ok(rows
            .iter()
            .map(|row| ColumnMeta {
                name: row.get("COLUMN_NAME"),
                raw_type: row.get("COLUMN_TYPE"),
                nullable: row.get::<i32, _>("is_nullable") == 1,
                default: row.get("COLUMN_DEFAULT"),
                autoincrement: row.get::<i32, _>("is_identity") == 1,
                comment: row
                    .get::<Option<String>, _>("COLUMN_COMMENT")
                    .filter(|c| !c.is_empty()),
            })
            .collect())
    }

    async fn table_comment(&self, table: &str) -> Result<Option<String>> {
        let query = r#"
            SELECT CAST(TABLE_COMMENT AS CHAR(4000)) AS TABLE_COMMENT
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
        "#;

        let row: Option<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .bind(table)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CrawlError::db(e, "loading MySQL table comment"))?;

        Ok(row
            .and_then(|r| r.get::<Option<String>, _>("TABLE_COMMENT"))
            .filter(|c| !c.is_empty()))
    }

    async fn query(&self, sql: &str) -> Result<QueryResult> {
        let rows: Vec<MySqlRow> = sqlx::query(sql)
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
        sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| CrawlError::db(e, format!("executing: {}", sql)))?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
