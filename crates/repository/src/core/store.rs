//! Contracts a relational store implements for the repository engine.
//!
//! The engine needs very little from a store: a way to run statements
//! ([`Querier`]), a way to open transactions ([`TransactionProvider`]), a way
//! to prepare statements once ([`Executor`]) and a way to recognise constraint
//! failures ([`ErrorDecipher`]).

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DriverResult;

use super::scope::Scope;
use super::transaction::TransactionOptions;
use super::value::{RowCursor, SingleRow, Value};

/// Runs statements against a connection or a transaction.
///
/// Parameters are bound positionally. Implementations check the scope before
/// touching the store.
#[async_trait]
pub trait Querier: Send + Sync {
    /// Runs a query expected to return at most one row.
    async fn query_row(&self, scope: &Scope, sql: &str, params: &[Value]) -> SingleRow;

    /// Runs a query returning any number of rows.
    async fn query(
        &self,
        scope: &Scope,
        sql: &str,
        params: &[Value],
    ) -> DriverResult<Box<dyn RowCursor>>;

    /// Runs a statement and returns the number of rows affected.
    async fn exec(&self, scope: &Scope, sql: &str, params: &[Value]) -> DriverResult<u64>;
}

/// An open store transaction.
///
/// Statements run through the transaction's [`Querier`] see its uncommitted
/// writes. After `commit` or `rollback` the transaction is inactive and every
/// further call fails with
/// [`DriverError::TransactionClosed`](crate::error::DriverError::TransactionClosed).
#[async_trait]
pub trait Transaction: Querier + Debug {
    /// Identifier used in logs.
    fn id(&self) -> &str;

    /// Commits all changes.
    async fn commit(&self) -> DriverResult<()>;

    /// Discards all changes.
    async fn rollback(&self) -> DriverResult<()>;

    /// Returns whether the transaction is still open.
    fn is_active(&self) -> bool;
}

/// Opens transactions.
#[async_trait]
pub trait TransactionProvider: Send + Sync {
    /// Begins a new transaction with `options`.
    async fn begin(
        &self,
        scope: &Scope,
        options: &TransactionOptions,
    ) -> DriverResult<Arc<dyn Transaction>>;
}

/// A statement validated by the store once and reused by text afterwards.
pub trait PreparedStatement: Send + Sync + Debug {
    /// The statement text.
    fn sql(&self) -> &str;

    /// Releases the statement. Closing twice is not an error.
    fn close(&self) -> DriverResult<()>;

    fn is_closed(&self) -> bool;
}

/// Resolves the querier for a scope and prepares statements.
#[async_trait]
pub trait Executor: Send + Sync {
    /// The querier used outside of any transaction.
    fn base_querier(&self) -> &dyn Querier;

    /// The ambient transaction if the scope carries one, else the base querier.
    fn querier<'a>(&'a self, scope: &'a Scope) -> &'a dyn Querier {
        match scope.transaction() {
            Some(tx) => {
                let tx: &dyn Transaction = tx.as_ref();
                tx
            }
            None => self.base_querier(),
        }
    }

    /// Prepares `sql` for repeated use.
    async fn prepare(&self, scope: &Scope, sql: &str) -> DriverResult<Arc<dyn PreparedStatement>>;
}

/// Recognises constraint failures in raw driver errors.
pub trait ErrorDecipher: Send + Sync {
    /// Returns true when `err` reports a duplicate value in a unique column.
    fn is_unique_violation(&self, err: &crate::error::DriverError) -> bool;

    /// Returns true when `err` reports a dangling foreign key.
    fn is_foreign_key_violation(&self, _err: &crate::error::DriverError) -> bool {
        false
    }
}
