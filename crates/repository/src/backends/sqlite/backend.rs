//! SQLite store implementation.

use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::ErrorCode;
use serde::{Deserialize, Serialize};

use crate::core::{
    BufferedRows, ErrorDecipher, Executor, PreparedStatement, Querier, RowCursor, Scope,
    SingleRow, Value,
};
use crate::error::{DriverError, DriverResult};

use super::convert::{exec_on, query_on, query_row_on};

/// SQLite database reachable through a connection pool.
pub struct SqliteDatabase {
    pool: Pool<SqliteConnectionManager>,
    config: SqliteConfig,
    is_memory: bool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDatabase")
            .field("config", &self.config)
            .field("is_memory", &self.is_memory)
            .field("connections", &self.pool.state().connections)
            .finish()
    }
}

/// Configuration for the SQLite store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of idle connections.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,

    /// Enable WAL mode for better concurrency.
    #[serde(default = "default_true")]
    pub enable_wal: bool,

    /// Enable foreign key constraints.
    #[serde(default = "default_true")]
    pub enable_foreign_keys: bool,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connection_timeout_ms() -> u64 {
    30000
}

fn default_busy_timeout_ms() -> u32 {
    5000
}

fn default_true() -> bool {
    true
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connection_timeout_ms: default_connection_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            enable_wal: true,
            enable_foreign_keys: true,
        }
    }
}

impl SqliteDatabase {
    /// Creates a private in-memory database.
    ///
    /// Every pooled connection sees the same data; the database lives as long
    /// as the pool.
    pub fn in_memory() -> DriverResult<Self> {
        let uri = format!("file:helios-{}?mode=memory&cache=shared", uuid::Uuid::new_v4());
        Self::build(SqliteConnectionManager::file(uri), SqliteConfig::default(), true)
    }

    /// Opens or creates a file-based database.
    pub fn open<P: AsRef<Path>>(path: P) -> DriverResult<Self> {
        Self::with_config(path, SqliteConfig::default())
    }

    /// Opens a file-based database with custom configuration.
    pub fn with_config<P: AsRef<Path>>(path: P, config: SqliteConfig) -> DriverResult<Self> {
        Self::build(SqliteConnectionManager::file(path.as_ref()), config, false)
    }

    fn build(
        manager: SqliteConnectionManager,
        config: SqliteConfig,
        is_memory: bool,
    ) -> DriverResult<Self> {
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms as u64);
        let foreign_keys = config.enable_foreign_keys;
        let wal = config.enable_wal && !is_memory;

        let manager = manager.with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            conn.pragma_update(None, "foreign_keys", foreign_keys)?;
            if wal {
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                    row.get::<_, String>(0)
                })?;
            }
            Ok(())
        });

        // An in-memory database is dropped with its last connection.
        let min_idle = if is_memory {
            config.min_connections.max(1)
        } else {
            config.min_connections
        };
        let mut builder = Pool::builder()
            .max_size(config.max_connections)
            .min_idle(Some(min_idle))
            .connection_timeout(Duration::from_millis(config.connection_timeout_ms));
        if is_memory {
            builder = builder.idle_timeout(None).max_lifetime(None);
        }

        let pool = builder.build(manager)?;

        tracing::debug!(
            memory = is_memory,
            max_connections = config.max_connections,
            "opened sqlite database"
        );

        Ok(Self {
            pool,
            config,
            is_memory,
        })
    }

    /// Get a connection from the pool.
    pub(crate) fn get_connection(&self) -> DriverResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Get a connection, waiting no longer than `limit` when one is given.
    pub(crate) fn get_connection_within(
        &self,
        limit: Option<Duration>,
    ) -> DriverResult<PooledConnection<SqliteConnectionManager>> {
        match limit {
            Some(limit) => {
                let wait = limit.min(Duration::from_millis(self.config.connection_timeout_ms));
                Ok(self.pool.get_timeout(wait)?)
            }
            None => self.get_connection(),
        }
    }

    /// Runs a batch of `;`-separated statements, typically schema DDL.
    pub fn execute_batch(&self, sql: &str) -> DriverResult<()> {
        let conn = self.get_connection()?;
        conn.execute_batch(sql)?;
        Ok(())
    }

    /// Checks a connection can be acquired and used.
    pub fn health_check(&self) -> DriverResult<()> {
        let conn = self.get_connection()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    /// Returns whether this is an in-memory database.
    pub fn is_memory(&self) -> bool {
        self.is_memory
    }

    /// Returns the store configuration.
    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }
}

#[async_trait]
impl Querier for SqliteDatabase {
    async fn query_row(&self, scope: &Scope, sql: &str, params: &[Value]) -> SingleRow {
        let result = scope.check().and_then(|()| {
            let conn = self.get_connection()?;
            query_row_on(&conn, sql, params)
        });
        SingleRow::from(result)
    }

    async fn query(
        &self,
        scope: &Scope,
        sql: &str,
        params: &[Value],
    ) -> DriverResult<Box<dyn RowCursor>> {
        scope.check()?;
        let conn = self.get_connection()?;
        let rows = query_on(&conn, sql, params)?;
        Ok(Box::new(BufferedRows::new(rows)))
    }

    async fn exec(&self, scope: &Scope, sql: &str, params: &[Value]) -> DriverResult<u64> {
        scope.check()?;
        let conn = self.get_connection()?;
        exec_on(&conn, sql, params)
    }
}

/// Statement text checked once and reused.
///
/// No connection is taken here. SQLite compiles the text through its
/// per-connection statement cache on whichever connection runs it, which is the
/// transaction's connection when the scope carries one. Syntax errors therefore
/// surface on first execution.
#[derive(Debug)]
pub struct SqlitePrepared {
    sql: String,
    closed: AtomicBool,
}

impl PreparedStatement for SqlitePrepared {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn close(&self) -> DriverResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Executor for SqliteDatabase {
    fn base_querier(&self) -> &dyn Querier {
        self
    }

    async fn prepare(&self, scope: &Scope, sql: &str) -> DriverResult<Arc<dyn PreparedStatement>> {
        scope.check()?;
        if sql.trim().is_empty() {
            return Err(DriverError::EmptyStatement);
        }
        Ok(Arc::new(SqlitePrepared {
            sql: sql.to_string(),
            closed: AtomicBool::new(false),
        }))
    }
}

fn constraint_code(err: &DriverError) -> Option<std::os::raw::c_int> {
    match err {
        DriverError::Sqlite(rusqlite::Error::SqliteFailure(e, _))
            if e.code == ErrorCode::ConstraintViolation =>
        {
            Some(e.extended_code)
        }
        _ => None,
    }
}

impl ErrorDecipher for SqliteDatabase {
    fn is_unique_violation(&self, err: &DriverError) -> bool {
        matches!(
            constraint_code(err),
            Some(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE)
                | Some(rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        )
    }

    fn is_foreign_key_violation(&self, err: &DriverError) -> bool {
        constraint_code(err) == Some(rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY)
    }
}
