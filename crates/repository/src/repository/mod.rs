//! The generic repository engine.
//!
//! One [`BaseRepository`] serves any [`Entity`] type. What differs between
//! entities (SQL text, row scanning, hooks, write statements) is supplied as a
//! [`QueryBuilders`] set and a [`Callbacks`] bundle. [`MetricsRepository`]
//! wraps any [`Repository`] and times its calls.

mod base;
mod callbacks;
mod metrics;
mod query_builder;

use std::fmt;

use async_trait::async_trait;

use crate::core::{Entity, Scope};
use crate::error::RepositoryResult;

pub use base::BaseRepository;
pub use callbacks::{
    AfterFindFn, AfterListYieldFn, BeforeWriteFn, Callbacks, CallbacksBuilder, EntityFactoryFn,
    RowDecision, RowExecutor, RowScannerFn, SqlRowExecutor, ValidateEntityFn,
};
pub use metrics::{MetricsRepository, OperationObserver, RepositoryMetrics};
pub use query_builder::{QueryBuilderFn, QueryBuilders, QueryBuildersBuilder};

/// Operations exposed by a [`Repository`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Find,
    List,
    Create,
    Update,
    Delete,
    Close,
}

impl Operation {
    /// The operations backed by SQL.
    pub const CRUD: [Operation; 5] = [
        Operation::Find,
        Operation::List,
        Operation::Create,
        Operation::Update,
        Operation::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Find => "find",
            Operation::List => "list",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Close => "close",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CRUD access to one entity type.
#[async_trait]
pub trait Repository<T: Entity>: Send + Sync {
    /// Loads the entity with `id`.
    async fn find(&self, scope: &Scope, id: &T::Id) -> RepositoryResult<T>;

    /// Loads one page of entities. `limit` must be positive, `offset` non-negative.
    async fn list(&self, scope: &Scope, limit: i64, offset: i64) -> RepositoryResult<Vec<T>>;

    /// Inserts `entity` and returns it as stored.
    async fn create(&self, scope: &Scope, entity: T) -> RepositoryResult<T>;

    /// Updates `entity` and returns it as stored.
    async fn update(&self, scope: &Scope, entity: T) -> RepositoryResult<T>;

    /// Removes the entity with `id`.
    async fn delete(&self, scope: &Scope, id: &T::Id) -> RepositoryResult<()>;

    /// Releases prepared resources. Calling it again is a no-op.
    async fn close(&self) -> RepositoryResult<()>;
}
