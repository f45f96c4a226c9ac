//! Transaction support for the SQLite store.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::core::{
    BufferedRows, Querier, RowCursor, Scope, SingleRow, Transaction, TransactionOptions,
    TransactionProvider, Value,
};
use crate::error::{DriverError, DriverResult};

use super::SqliteDatabase;
use super::convert::{exec_on, query_on, query_row_on};

/// A SQLite transaction holding one pooled connection until it finishes.
///
/// Write transactions start with `BEGIN IMMEDIATE` so the write lock is taken
/// up front. Read-only transactions start deferred with `query_only` set.
///
/// When the caller's scope has a deadline, the connection's busy timeout is
/// lowered to the time left so that lock waits in `BEGIN`, statements and
/// `COMMIT` give up at the deadline. The pool's busy timeout is restored when
/// the transaction ends.
pub struct SqliteTransaction {
    id: String,
    /// The connection used for this transaction.
    conn: Mutex<PooledConnection<SqliteConnectionManager>>,
    /// Whether the transaction is still active.
    active: AtomicBool,
    read_only: bool,
    /// Busy timeout to restore when the deadline lowered it.
    restore_busy: Option<Duration>,
}

impl std::fmt::Debug for SqliteTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteTransaction")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .field("read_only", &self.read_only)
            .finish()
    }
}

impl SqliteTransaction {
    fn begin(
        conn: PooledConnection<SqliteConnectionManager>,
        options: &TransactionOptions,
        wait: Option<(Duration, Duration)>,
    ) -> DriverResult<Self> {
        let restore_busy = match wait {
            Some((remaining, pool_busy)) if remaining < pool_busy => {
                conn.busy_timeout(remaining)?;
                Some(pool_busy)
            }
            _ => None,
        };

        let tx = Self {
            id: uuid::Uuid::new_v4().to_string(),
            conn: Mutex::new(conn),
            active: AtomicBool::new(false),
            read_only: options.read_only,
            restore_busy,
        };

        {
            let conn = tx.conn.lock();
            let started = if tx.read_only {
                conn.pragma_update(None, "query_only", true)
                    .and_then(|()| conn.execute_batch("BEGIN DEFERRED"))
            } else {
                conn.execute_batch("BEGIN IMMEDIATE")
            };
            if let Err(e) = started {
                tx.reset(&conn);
                return Err(e.into());
            }
        }

        tx.active.store(true, Ordering::SeqCst);
        Ok(tx)
    }

    fn with_conn<R>(&self, f: impl FnOnce(&Connection) -> DriverResult<R>) -> DriverResult<R> {
        if !self.is_active() {
            return Err(DriverError::TransactionClosed);
        }
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Ends the transaction with `COMMIT` or `ROLLBACK`.
    ///
    /// The connection goes back to the pool in autocommit mode whatever the outcome.
    fn finish(&self, statement: &str) -> DriverResult<()> {
        if !self.active.swap(false, Ordering::SeqCst) {
            return Err(DriverError::TransactionClosed);
        }

        let conn = self.conn.lock();
        let res = conn.execute_batch(statement);
        if res.is_err() && !conn.is_autocommit() {
            let _ = conn.execute_batch("ROLLBACK");
        }
        self.reset(&conn);
        res.map_err(Into::into)
    }

    fn reset(&self, conn: &Connection) {
        if let Some(busy) = self.restore_busy {
            if let Err(e) = conn.busy_timeout(busy) {
                tracing::warn!(tx = %self.id, error = %e, "failed to restore busy timeout");
            }
        }
        if self.read_only {
            if let Err(e) = conn.pragma_update(None, "query_only", false) {
                tracing::warn!(tx = %self.id, error = %e, "failed to reset query_only");
            }
        }
    }
}

#[async_trait]
impl Querier for SqliteTransaction {
    async fn query_row(&self, scope: &Scope, sql: &str, params: &[Value]) -> SingleRow {
        let result = scope
            .check()
            .and_then(|()| self.with_conn(|conn| query_row_on(conn, sql, params)));
        SingleRow::from(result)
    }

    async fn query(
        &self,
        scope: &Scope,
        sql: &str,
        params: &[Value],
    ) -> DriverResult<Box<dyn RowCursor>> {
        scope.check()?;
        let rows = self.with_conn(|conn| query_on(conn, sql, params))?;
        Ok(Box::new(BufferedRows::new(rows)))
    }

    async fn exec(&self, scope: &Scope, sql: &str, params: &[Value]) -> DriverResult<u64> {
        scope.check()?;
        self.with_conn(|conn| exec_on(conn, sql, params))
    }
}

#[async_trait]
impl Transaction for SqliteTransaction {
    fn id(&self) -> &str {
        &self.id
    }

    async fn commit(&self) -> DriverResult<()> {
        self.finish("COMMIT")
    }

    async fn rollback(&self) -> DriverResult<()> {
        self.finish("ROLLBACK")
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        // If transaction wasn't explicitly committed or rolled back, roll it back
        if self.active.swap(false, Ordering::SeqCst) {
            let conn = self.conn.lock();
            let _ = conn.execute_batch("ROLLBACK");
            self.reset(&conn);
        }
    }
}

#[async_trait]
impl TransactionProvider for SqliteDatabase {
    async fn begin(
        &self,
        scope: &Scope,
        options: &TransactionOptions,
    ) -> DriverResult<Arc<dyn Transaction>> {
        scope.check()?;
        let remaining = scope.remaining();
        let conn = self.get_connection_within(remaining)?;
        let pool_busy = Duration::from_millis(self.config().busy_timeout_ms as u64);
        let wait = remaining.map(|remaining| (remaining, pool_busy));
        let tx = SqliteTransaction::begin(conn, options, wait)?;
        tracing::trace!(tx = %tx.id, read_only = tx.read_only, "sqlite transaction opened");
        Ok(Arc::new(tx))
    }
}
