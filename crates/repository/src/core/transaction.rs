//! Ambient transactions.
//!
//! [`TxManager::within_transaction`] runs a unit of work inside a transaction
//! attached to a derived [`Scope`]. Repositories called with that scope route
//! their statements through the transaction. A unit of work that itself asks
//! for a transaction joins the one already open, so any nesting depth results
//! in exactly one begin and exactly one commit or rollback.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::{DriverError, RepositoryResult, TransactionError};

use super::scope::Scope;
use super::store::{Transaction, TransactionProvider};

/// Transaction isolation levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationLevel {
    /// Whatever the store uses by default.
    #[default]
    Default,
    /// Read committed - sees only committed data.
    ReadCommitted,
    /// Repeatable read - consistent reads within transaction.
    RepeatableRead,
    /// Serializable - full isolation (may reduce concurrency).
    Serializable,
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IsolationLevel::Default => write!(f, "default"),
            IsolationLevel::ReadCommitted => write!(f, "read-committed"),
            IsolationLevel::RepeatableRead => write!(f, "repeatable-read"),
            IsolationLevel::Serializable => write!(f, "serializable"),
        }
    }
}

/// Options for starting a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOptions {
    /// The isolation level for the transaction.
    #[serde(default)]
    pub isolation_level: IsolationLevel,
    /// Timeout in milliseconds (0 = no timeout).
    #[serde(default)]
    pub timeout_ms: u64,
    /// Whether this is a read-only transaction.
    #[serde(default)]
    pub read_only: bool,
}

impl TransactionOptions {
    /// Creates new options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the isolation level.
    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = level;
        self
    }

    /// Sets the timeout.
    pub fn timeout_ms(mut self, timeout: u64) -> Self {
        self.timeout_ms = timeout;
        self
    }

    /// Marks this as a read-only transaction.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

/// Runs units of work inside an ambient transaction.
pub trait TransactionManager: Send + Sync {
    /// Runs `unit_of_work` in a transaction.
    ///
    /// If `scope` already carries a transaction the unit of work joins it and
    /// this call neither commits nor rolls back. Otherwise a transaction is
    /// begun with `options` (store defaults when `None`), committed when the
    /// unit of work succeeds and rolled back when it fails or panics.
    fn within_transaction<F, Fut, R>(
        &self,
        scope: &Scope,
        options: Option<TransactionOptions>,
        unit_of_work: F,
    ) -> impl Future<Output = RepositoryResult<R>> + Send
    where
        F: FnOnce(Scope) -> Fut + Send,
        Fut: Future<Output = RepositoryResult<R>> + Send,
        R: Send;
}

/// [`TransactionManager`] backed by a [`TransactionProvider`].
#[derive(Clone)]
pub struct TxManager {
    provider: Arc<dyn TransactionProvider>,
}

impl std::fmt::Debug for TxManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxManager").finish_non_exhaustive()
    }
}

impl TxManager {
    pub fn new(provider: Arc<dyn TransactionProvider>) -> Self {
        Self { provider }
    }

    async fn begin(
        &self,
        scope: &Scope,
        options: &TransactionOptions,
        deadline: Option<Instant>,
    ) -> RepositoryResult<Arc<dyn Transaction>> {
        scope
            .check()
            .map_err(|source| TransactionError::Begin { source })?;

        let tx = bounded(deadline, "begin", self.provider.begin(scope, options))
            .await?
            .map_err(|source| TransactionError::Begin { source })?;

        tracing::debug!(
            tx = tx.id(),
            isolation = %options.isolation_level,
            read_only = options.read_only,
            "began transaction"
        );
        Ok(tx)
    }

    async fn rollback(tx: &dyn Transaction) {
        match tx.rollback().await {
            Ok(()) => tracing::debug!(tx = tx.id(), "rolled back transaction"),
            Err(e) => tracing::warn!(tx = tx.id(), error = %e, "rollback failed"),
        }
    }
}

impl TransactionManager for TxManager {
    fn within_transaction<F, Fut, R>(
        &self,
        scope: &Scope,
        options: Option<TransactionOptions>,
        unit_of_work: F,
    ) -> impl Future<Output = RepositoryResult<R>> + Send
    where
        F: FnOnce(Scope) -> Fut + Send,
        Fut: Future<Output = RepositoryResult<R>> + Send,
        R: Send,
    {
        let scope = scope.clone();
        async move {
            if let Some(tx) = scope.transaction() {
                if !tx.is_active() {
                    return Err(TransactionError::InvalidTransaction.into());
                }
                tracing::trace!(tx = tx.id(), "joining ambient transaction");
                return unit_of_work(scope.clone()).await;
            }

            let options = options.unwrap_or_default();
            let mut tx_scope = scope.clone();
            let deadline = options.timeout().map(|t| Instant::now() + t);
            if let Some(deadline) = deadline {
                tx_scope = tx_scope.with_deadline(deadline);
            }
            let deadline = tx_scope.deadline();

            let tx = self.begin(&tx_scope, &options, deadline).await?;
            let tx_scope = tx_scope.with_transaction(Arc::clone(&tx));

            let outcome = AssertUnwindSafe(async move { unit_of_work(tx_scope).await })
                .catch_unwind()
                .await;

            match outcome {
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::warn!(tx = tx.id(), panic = %message, "unit of work panicked");
                    Self::rollback(tx.as_ref()).await;
                    Err(TransactionError::Panicked { message }.into())
                }
                Ok(Err(err)) => {
                    tracing::debug!(tx = tx.id(), error = %err, "unit of work failed");
                    Self::rollback(tx.as_ref()).await;
                    Err(err)
                }
                Ok(Ok(value)) => {
                    match bounded(deadline, "commit", tx.commit()).await {
                        Ok(Ok(())) => {}
                        Ok(Err(source)) => {
                            return Err(TransactionError::Commit { source }.into());
                        }
                        Err(timeout) => {
                            Self::rollback(tx.as_ref()).await;
                            return Err(timeout.into());
                        }
                    }
                    tracing::debug!(tx = tx.id(), "committed transaction");
                    Ok(value)
                }
            }
        }
    }
}

/// Awaits `fut`, giving up at `deadline`.
async fn bounded<T>(
    deadline: Option<Instant>,
    stage: &'static str,
    fut: impl Future<Output = Result<T, DriverError>>,
) -> Result<Result<T, DriverError>, TransactionError> {
    let Some(deadline) = deadline else {
        return Ok(fut.await);
    };
    let remaining = deadline.saturating_duration_since(Instant::now());
    tokio::time::timeout_at(deadline, fut)
        .await
        .map_err(|_| TransactionError::Timeout {
            stage,
            timeout_ms: remaining.as_millis() as u64,
        })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
