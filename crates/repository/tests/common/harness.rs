//! Database helpers and an instrumented transaction provider.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use helios_repository::backends::sqlite::{SqliteConfig, SqliteDatabase};
use helios_repository::core::{
    Querier, RowCursor, Scope, SingleRow, Transaction, TransactionOptions, TransactionProvider,
    Value,
};
use helios_repository::error::DriverResult;
use tempfile::TempDir;

use super::fixtures::{WIDGET_SCHEMA, Widget, WidgetRepository};

/// Opens a file database inside `dir` with the widget schema applied.
///
/// File databases are used so that a writing transaction and plain reads can
/// run side by side on separate pooled connections.
pub fn create_database(dir: &TempDir) -> Arc<SqliteDatabase> {
    let config = SqliteConfig {
        max_connections: 4,
        ..Default::default()
    };
    create_database_with(dir, config)
}

pub fn create_database_with(dir: &TempDir, config: SqliteConfig) -> Arc<SqliteDatabase> {
    let db = SqliteDatabase::with_config(dir.path().join("widgets.db"), config)
        .expect("Failed to open SQLite database");
    db.execute_batch(WIDGET_SCHEMA)
        .expect("Failed to initialize schema");
    Arc::new(db)
}

pub fn create_repository(db: &Arc<SqliteDatabase>) -> WidgetRepository {
    WidgetRepository::new(db.clone()).expect("Failed to build widget repository")
}

/// Counts the rows in the widgets table outside of any transaction.
pub async fn count_widgets(db: &SqliteDatabase) -> i64 {
    db.query_row(&Scope::new(), "SELECT COUNT(*) FROM widgets", &[])
        .await
        .into_row()
        .expect("count query failed")
        .get(0)
        .expect("count column missing")
}

pub async fn count_widgets_with_code(db: &SqliteDatabase, code: &str) -> i64 {
    db.query_row(
        &Scope::new(),
        "SELECT COUNT(*) FROM widgets WHERE code = ?1",
        &[code.into()],
    )
    .await
    .into_row()
    .expect("count query failed")
    .get(0)
    .expect("count column missing")
}

/// Creates widgets with the given codes, named after their code.
pub async fn seed(repo: &WidgetRepository, codes: &[&str]) -> Vec<Widget> {
    let scope = Scope::new();
    let mut created = Vec::with_capacity(codes.len());
    for code in codes {
        let widget = repo
            .base()
            .create(&scope, Widget::new(code, &format!("Widget {code}")))
            .await
            .expect("Failed to seed widget");
        created.push(widget);
    }
    created
}

/// Number of begin, commit and rollback calls seen by a [`CountingProvider`].
#[derive(Debug, Default)]
pub struct TxCounts {
    begins: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

impl TxCounts {
    pub fn begins(&self) -> usize {
        self.begins.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }
}

/// Wraps a real provider and records every transaction lifecycle call.
pub struct CountingProvider {
    inner: Arc<dyn TransactionProvider>,
    counts: Arc<TxCounts>,
}

impl CountingProvider {
    pub fn new(inner: Arc<dyn TransactionProvider>) -> Self {
        Self {
            inner,
            counts: Arc::new(TxCounts::default()),
        }
    }

    pub fn counts(&self) -> Arc<TxCounts> {
        self.counts.clone()
    }
}

#[async_trait]
impl TransactionProvider for CountingProvider {
    async fn begin(
        &self,
        scope: &Scope,
        options: &TransactionOptions,
    ) -> DriverResult<Arc<dyn Transaction>> {
        let inner = self.inner.begin(scope, options).await?;
        self.counts.begins.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(CountingTransaction {
            inner,
            counts: self.counts.clone(),
        }))
    }
}

#[derive(Debug)]
struct CountingTransaction {
    inner: Arc<dyn Transaction>,
    counts: Arc<TxCounts>,
}

#[async_trait]
impl Querier for CountingTransaction {
    async fn query_row(&self, scope: &Scope, sql: &str, params: &[Value]) -> SingleRow {
        self.inner.query_row(scope, sql, params).await
    }

    async fn query(
        &self,
        scope: &Scope,
        sql: &str,
        params: &[Value],
    ) -> DriverResult<Box<dyn RowCursor>> {
        self.inner.query(scope, sql, params).await
    }

    async fn exec(&self, scope: &Scope, sql: &str, params: &[Value]) -> DriverResult<u64> {
        self.inner.exec(scope, sql, params).await
    }
}

#[async_trait]
impl Transaction for CountingTransaction {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn commit(&self) -> DriverResult<()> {
        self.counts.commits.fetch_add(1, Ordering::SeqCst);
        self.inner.commit().await
    }

    async fn rollback(&self) -> DriverResult<()> {
        self.counts.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.inner.rollback().await
    }

    fn is_active(&self) -> bool {
        self.inner.is_active()
    }
}
