//! Per-entity callbacks plugged into [`BaseRepository`](super::BaseRepository).

use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::core::{Entity, Querier, Row, Scope, SingleRow, Value};
use crate::error::{
    BoxError, DriverError, DriverResult, RepositoryError, RepositoryResult, ValidationError,
};

use super::query_builder::QueryBuilderFn;

/// Creates an empty entity to scan a row into.
pub type EntityFactoryFn<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// Copies the columns of a row into an entity.
pub type RowScannerFn<T> = Arc<dyn Fn(&Row, &mut T) -> DriverResult<()> + Send + Sync>;

/// Post-processes an entity returned by find, create or update.
pub type AfterFindFn<T> = Arc<dyn Fn(T) -> Result<T, BoxError> + Send + Sync>;

/// Post-processes a listed entity, possibly dropping it.
pub type AfterListYieldFn<T> = Arc<dyn Fn(T) -> Result<RowDecision<T>, BoxError> + Send + Sync>;

/// Validates an entity before it is written.
pub type ValidateEntityFn<T> = Arc<dyn Fn(&T) -> Result<(), ValidationError> + Send + Sync>;

/// Prepares an entity right before it is written.
pub type BeforeWriteFn<T> = Arc<dyn Fn(&mut T) -> Result<(), BoxError> + Send + Sync>;

/// Outcome of the post-list hook for one row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowDecision<T> {
    /// Keep the (possibly transformed) entity.
    Include(T),
    /// Leave the row out of the result.
    Exclude,
}

/// Writes an entity and returns the stored row.
///
/// Executors receive the querier resolved from the caller's scope, so they run
/// inside the ambient transaction when there is one.
pub trait RowExecutor<T>: Send + Sync {
    fn execute<'a>(
        &'a self,
        scope: &'a Scope,
        querier: &'a dyn Querier,
        entity: &'a T,
    ) -> BoxFuture<'a, SingleRow>;
}

impl<T, F> RowExecutor<T> for F
where
    F: for<'a> Fn(&'a Scope, &'a dyn Querier, &'a T) -> BoxFuture<'a, SingleRow> + Send + Sync,
{
    fn execute<'a>(
        &'a self,
        scope: &'a Scope,
        querier: &'a dyn Querier,
        entity: &'a T,
    ) -> BoxFuture<'a, SingleRow> {
        self(scope, querier, entity)
    }
}

/// A [`RowExecutor`] running one SQL statement with parameters taken from the entity.
///
/// The statement is expected to return the written row (`... RETURNING *`).
pub struct SqlRowExecutor<T> {
    query: QueryBuilderFn,
    bind: Arc<dyn Fn(&T) -> Vec<Value> + Send + Sync>,
}

impl<T> SqlRowExecutor<T> {
    pub fn new<Q, B>(query: Q, bind: B) -> Self
    where
        Q: Fn() -> String + Send + Sync + 'static,
        B: Fn(&T) -> Vec<Value> + Send + Sync + 'static,
    {
        Self {
            query: Arc::new(query),
            bind: Arc::new(bind),
        }
    }

    /// Uses an existing query builder, typically one shared with
    /// [`QueryBuilders`](super::QueryBuilders).
    pub fn from_builder<B>(query: QueryBuilderFn, bind: B) -> Self
    where
        B: Fn(&T) -> Vec<Value> + Send + Sync + 'static,
    {
        Self {
            query,
            bind: Arc::new(bind),
        }
    }
}

impl<T: Send + Sync> RowExecutor<T> for SqlRowExecutor<T> {
    fn execute<'a>(
        &'a self,
        scope: &'a Scope,
        querier: &'a dyn Querier,
        entity: &'a T,
    ) -> BoxFuture<'a, SingleRow> {
        let sql = (self.query)();
        if sql.trim().is_empty() {
            return futures::future::ready(SingleRow::failed(DriverError::EmptyStatement)).boxed();
        }
        let params = (self.bind)(entity);
        async move { querier.query_row(scope, &sql, &params).await }.boxed()
    }
}

/// The callbacks of one entity.
///
/// The factory and the scanner are required. Every other slot is optional and
/// its step is skipped when empty.
pub struct Callbacks<T> {
    pub(super) new_entity: EntityFactoryFn<T>,
    pub(super) scanner: RowScannerFn<T>,
    pub(super) after_find: Option<AfterFindFn<T>>,
    pub(super) after_list_yield: Option<AfterListYieldFn<T>>,
    pub(super) validate_create: Option<ValidateEntityFn<T>>,
    pub(super) validate_update: Option<ValidateEntityFn<T>>,
    pub(super) before_create: Option<BeforeWriteFn<T>>,
    pub(super) before_update: Option<BeforeWriteFn<T>>,
    pub(super) create_executor: Option<Arc<dyn RowExecutor<T>>>,
    pub(super) update_executor: Option<Arc<dyn RowExecutor<T>>>,
}

impl<T> Clone for Callbacks<T> {
    fn clone(&self) -> Self {
        Self {
            new_entity: Arc::clone(&self.new_entity),
            scanner: Arc::clone(&self.scanner),
            after_find: self.after_find.clone(),
            after_list_yield: self.after_list_yield.clone(),
            validate_create: self.validate_create.clone(),
            validate_update: self.validate_update.clone(),
            before_create: self.before_create.clone(),
            before_update: self.before_update.clone(),
            create_executor: self.create_executor.clone(),
            update_executor: self.update_executor.clone(),
        }
    }
}

impl<T> fmt::Debug for Callbacks<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("after_find", &self.after_find.is_some())
            .field("after_list_yield", &self.after_list_yield.is_some())
            .field("validate_create", &self.validate_create.is_some())
            .field("validate_update", &self.validate_update.is_some())
            .field("before_create", &self.before_create.is_some())
            .field("before_update", &self.before_update.is_some())
            .field("create_executor", &self.create_executor.is_some())
            .field("update_executor", &self.update_executor.is_some())
            .finish()
    }
}

impl<T> Callbacks<T> {
    pub fn builder() -> CallbacksBuilder<T> {
        CallbacksBuilder::default()
    }

    /// Creates an empty entity and scans `row` into it.
    pub fn scan(&self, row: &Row) -> DriverResult<T> {
        let mut entity = (self.new_entity)();
        (self.scanner)(row, &mut entity)?;
        Ok(entity)
    }

    pub fn has_create_executor(&self) -> bool {
        self.create_executor.is_some()
    }

    pub fn has_update_executor(&self) -> bool {
        self.update_executor.is_some()
    }
}

/// Assembles a [`Callbacks`] bundle.
pub struct CallbacksBuilder<T> {
    new_entity: Option<EntityFactoryFn<T>>,
    scanner: Option<RowScannerFn<T>>,
    after_find: Option<AfterFindFn<T>>,
    after_list_yield: Option<AfterListYieldFn<T>>,
    validate_create: Option<ValidateEntityFn<T>>,
    validate_update: Option<ValidateEntityFn<T>>,
    before_create: Option<BeforeWriteFn<T>>,
    before_update: Option<BeforeWriteFn<T>>,
    create_executor: Option<Arc<dyn RowExecutor<T>>>,
    update_executor: Option<Arc<dyn RowExecutor<T>>>,
}

impl<T> Default for CallbacksBuilder<T> {
    fn default() -> Self {
        Self {
            new_entity: None,
            scanner: None,
            after_find: None,
            after_list_yield: None,
            validate_create: None,
            validate_update: None,
            before_create: None,
            before_update: None,
            create_executor: None,
            update_executor: None,
        }
    }
}

impl<T: Send + Sync + 'static> CallbacksBuilder<T> {
    pub fn with_entity_factory<F>(mut self, f: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.new_entity = Some(Arc::new(f));
        self
    }

    pub fn with_scanner<F>(mut self, f: F) -> Self
    where
        F: Fn(&Row, &mut T) -> DriverResult<()> + Send + Sync + 'static,
    {
        self.scanner = Some(Arc::new(f));
        self
    }

    pub fn with_after_find<F>(mut self, f: F) -> Self
    where
        F: Fn(T) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.after_find = Some(Arc::new(f));
        self
    }

    pub fn with_after_list_yield<F>(mut self, f: F) -> Self
    where
        F: Fn(T) -> Result<RowDecision<T>, BoxError> + Send + Sync + 'static,
    {
        self.after_list_yield = Some(Arc::new(f));
        self
    }

    pub fn with_validate_create<F>(mut self, f: F) -> Self
    where
        F: Fn(&T) -> Result<(), ValidationError> + Send + Sync + 'static,
    {
        self.validate_create = Some(Arc::new(f));
        self
    }

    pub fn with_validate_update<F>(mut self, f: F) -> Self
    where
        F: Fn(&T) -> Result<(), ValidationError> + Send + Sync + 'static,
    {
        self.validate_update = Some(Arc::new(f));
        self
    }

    pub fn with_before_create<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut T) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.before_create = Some(Arc::new(f));
        self
    }

    pub fn with_before_update<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut T) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.before_update = Some(Arc::new(f));
        self
    }

    pub fn with_create_executor<E>(mut self, executor: E) -> Self
    where
        E: RowExecutor<T> + 'static,
    {
        self.create_executor = Some(Arc::new(executor));
        self
    }

    pub fn with_update_executor<E>(mut self, executor: E) -> Self
    where
        E: RowExecutor<T> + 'static,
    {
        self.update_executor = Some(Arc::new(executor));
        self
    }

    /// Fails when the factory or the scanner is missing.
    pub fn build(self) -> RepositoryResult<Callbacks<T>> {
        let new_entity = self.new_entity.ok_or_else(|| {
            RepositoryError::validation(
                "Callbacks.build",
                ValidationError::missing("entity_factory"),
            )
        })?;
        let scanner = self.scanner.ok_or_else(|| {
            RepositoryError::validation("Callbacks.build", ValidationError::missing("scanner"))
        })?;

        Ok(Callbacks {
            new_entity,
            scanner,
            after_find: self.after_find,
            after_list_yield: self.after_list_yield,
            validate_create: self.validate_create,
            validate_update: self.validate_update,
            before_create: self.before_create,
            before_update: self.before_update,
            create_executor: self.create_executor,
            update_executor: self.update_executor,
        })
    }
}

impl<T: Default + Send + Sync + 'static> CallbacksBuilder<T> {
    /// Uses `T::default()` as the entity factory.
    pub fn with_default_factory(self) -> Self {
        self.with_entity_factory(T::default)
    }
}

impl<T: Entity> CallbacksBuilder<T> {
    /// Wires the entity's own validation and before-write hooks.
    pub fn with_entity_hooks(self) -> Self {
        self.with_validate_create(T::validate_create)
            .with_validate_update(T::validate_change)
            .with_before_create(T::before_create)
            .with_before_update(T::before_change)
    }
}
