//! Core contracts shared by the engine and the stores.
//!
//! - [`Entity`] - identity, lifecycle hooks and validation of a persisted type
//! - [`Value`], [`Row`], [`SingleRow`], [`RowCursor`] - driver-neutral data
//! - [`Scope`] - the context every call carries: ambient transaction, cancellation
//!   and deadline
//! - [`Querier`], [`Executor`], [`TransactionProvider`], [`ErrorDecipher`] - what a
//!   store implements
//! - [`TransactionManager`], [`TxManager`] - ambient transactions

mod entity;
mod scope;
mod store;
mod transaction;
mod value;

pub use entity::{Entity, EntityId, EntityInfo};
pub use scope::Scope;
pub use store::{
    ErrorDecipher, Executor, PreparedStatement, Querier, Transaction, TransactionProvider,
};
pub use transaction::{IsolationLevel, TransactionManager, TransactionOptions, TxManager};
pub use value::{BufferedRows, CursorGuard, FromValue, Row, RowCursor, SingleRow, Value};
