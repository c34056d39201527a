//! MySQL target implementation.
//!
//! Uses mysql_async for connection pooling, batched multi-row INSERT for
//! bulk writes and `INSERT ... ON DUPLICATE KEY UPDATE` for upserts.

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts};
use tracing::{debug, info};

use crate::config::TargetConfig;
use crate::error::{MigrateError, Result};
use crate::ident::{qualify, quote};
use crate::traits::{TargetStore, TargetTableState};
use crate::typemap::TargetColumn;
use crate::value::SqlValue;

/// MySQL hard limit on prepared-statement placeholders.
const MYSQL_MAX_PLACEHOLDERS: usize = 65_535;

/// MySQL-backed target store.
pub struct MysqlTarget {
    pool: Pool,
}

impl MysqlTarget {
    /// Create a new target from configuration and verify connectivity.
    pub async fn new(config: &TargetConfig) -> Result<Self> {
        let pool_opts = PoolOpts::new().with_constraints(
            PoolConstraints::new(1, config.max_connections.max(1))
                .expect("pool constraints: min <= max"),
        );

        let opts: Opts = OptsBuilder::default()
            .ip_or_hostname(&config.host)
            .tcp_port(config.port)
            .user(Some(&config.user))
            .pass(Some(&config.password))
            // Full Unicode support for anything Access throws at us
            .init(vec!["SET NAMES utf8mb4"])
            .pool_opts(pool_opts)
            .into();

        let pool = Pool::new(opts);

        // Test connection
        let mut conn = pool.get_conn().await?;
        conn.query_drop("SELECT 1").await?;
        drop(conn);

        info!("Connected to MySQL target: {}:{}", config.host, config.port);

        Ok(Self { pool })
    }

    /// Generate the CREATE TABLE statement for mapped columns.
    fn generate_ddl(database: &str, table: &str, columns: &[TargetColumn]) -> String {
        let mut col_defs: Vec<String> = columns
            .iter()
            .map(|c| {
                let mut def = format!("{} {}", quote(&c.name), c.sql_type);
                if !c.is_nullable {
                    def.push_str(" NOT NULL");
                }
                if c.auto_increment {
                    def.push_str(" AUTO_INCREMENT");
                }
                def
            })
            .collect();

        let key_cols: Vec<String> = columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| quote(&c.name))
            .collect();
        if !key_cols.is_empty() {
            col_defs.push(format!("PRIMARY KEY ({})", key_cols.join(", ")));
        }

        format!(
            "CREATE TABLE {} (\n    {}\n) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci",
            qualify(database, table),
            col_defs.join(",\n    ")
        )
    }

    /// Multi-row INSERT, split so no statement exceeds the placeholder cap.
    async fn write_rows(
        &self,
        database: &str,
        table: &str,
        columns: &[String],
        key_columns: Option<&[String]>,
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let num_cols = columns.len();
        if num_cols == 0 {
            return Ok(0);
        }
        let max_rows_per_stmt = (MYSQL_MAX_PLACEHOLDERS / num_cols).max(1);

        let qualified = qualify(database, table);
        let col_list = columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", ");

        // ON DUPLICATE KEY UPDATE clause for upserts: replace every non-key
        // column of the conflicting row.
        let update_clause = key_columns.map(|keys| {
            let assignments: Vec<String> = columns
                .iter()
                .filter(|c| !keys.contains(c))
                .map(|c| format!("{} = VALUES({})", quote(c), quote(c)))
                .collect();
            if assignments.is_empty() {
                // Key-only table: nothing to update, ignore the duplicate.
                format!("{} = {}", quote(&keys[0]), quote(&keys[0]))
            } else {
                assignments.join(", ")
            }
        });

        let mut conn = self.pool.get_conn().await?;
        let mut written = 0u64;

        for chunk in rows.chunks(max_rows_per_stmt) {
            let placeholders_per_row = format!("({})", vec!["?"; num_cols].join(", "));
            let all_placeholders = vec![placeholders_per_row; chunk.len()].join(", ");

            let sql = match &update_clause {
                Some(update) => format!(
                    "INSERT INTO {} ({}) VALUES {} ON DUPLICATE KEY UPDATE {}",
                    qualified, col_list, all_placeholders, update
                ),
                None => format!(
                    "INSERT INTO {} ({}) VALUES {}",
                    qualified, col_list, all_placeholders
                ),
            };

            let params: Vec<mysql_async::Value> = chunk
                .iter()
                .flat_map(|row| row.iter().map(sql_value_to_mysql))
                .collect();

            conn.exec_drop(&sql, params).await.map_err(|e| {
                MigrateError::transfer(&qualified, format!("INSERT batch: {}", e))
            })?;
            written += chunk.len() as u64;
        }

        debug!("MySQL: wrote {} rows to {}", written, qualified);
        Ok(written)
    }

    /// Close the connection pool.
    pub async fn close(&self) {
        self.pool.clone().disconnect().await.ok();
    }
}

#[async_trait]
impl TargetStore for MysqlTarget {
    async fn ensure_database(&self, database: &str) -> Result<()> {
        let mut conn = self.pool.get_conn().await?;
        let sql = format!(
            "CREATE DATABASE IF NOT EXISTS {} CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci",
            quote(database)
        );
        conn.query_drop(&sql).await?;
        debug!("Ensured database '{}'", database);
        Ok(())
    }

    async fn table_state(&self, database: &str, table: &str) -> Result<TargetTableState> {
        let mut conn = self.pool.get_conn().await?;

        let columns: Vec<String> = conn
            .exec(
                r#"
                SELECT COLUMN_NAME FROM information_schema.COLUMNS
                WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
                ORDER BY ORDINAL_POSITION
                "#,
                (database, table),
            )
            .await?;

        if columns.is_empty() {
            return Ok(TargetTableState::default());
        }

        // Exact count; information_schema.TABLE_ROWS is an estimate and the
        // skip/update decision needs the real number.
        let sql = format!("SELECT COUNT(*) FROM {}", qualify(database, table));
        let count: Option<u64> = conn.query_first(&sql).await?;

        Ok(TargetTableState {
            exists: true,
            columns,
            row_count: count.unwrap_or(0),
        })
    }

    async fn create_table(
        &self,
        database: &str,
        table: &str,
        columns: &[TargetColumn],
    ) -> Result<()> {
        let mut conn = self.pool.get_conn().await?;
        let ddl = Self::generate_ddl(database, table, columns);
        conn.query_drop(&ddl).await?;
        debug!("Created table {}.{}", database, table);
        Ok(())
    }

    async fn insert_chunk(
        &self,
        database: &str,
        table: &str,
        columns: &[String],
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<u64> {
        self.write_rows(database, table, columns, None, rows).await
    }

    async fn upsert_chunk(
        &self,
        database: &str,
        table: &str,
        columns: &[String],
        key_columns: &[String],
        rows: Vec<Vec<SqlValue>>,
    ) -> Result<u64> {
        if key_columns.is_empty() {
            return Err(MigrateError::transfer(
                table,
                "upsert requires a key column",
            ));
        }
        self.write_rows(database, table, columns, Some(key_columns), rows)
            .await
    }
}

/// Convert a tagged value to mysql_async::Value.
fn sql_value_to_mysql(value: &SqlValue) -> mysql_async::Value {
    match value {
        SqlValue::Null => mysql_async::Value::NULL,
        SqlValue::Bool(b) => mysql_async::Value::from(*b),
        SqlValue::Int(i) => mysql_async::Value::from(*i),
        SqlValue::Float(f) => mysql_async::Value::from(*f),
        SqlValue::Decimal(d) => mysql_async::Value::from(d.to_string()),
        SqlValue::Text(s) => mysql_async::Value::from(s.as_str()),
        SqlValue::DateTime(dt) => mysql_async::Value::from(*dt),
        SqlValue::Bytes(b) => mysql_async::Value::from(b.as_slice()),
    }
}
