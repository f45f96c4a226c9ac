//! [`BaseRepository`], the callback-driven CRUD engine.

use std::fmt::{self, Display};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::core::{
    CursorGuard, Entity, EntityInfo, ErrorDecipher, Executor, PreparedStatement, Scope, Value,
};
use crate::error::{DriverError, RepositoryError, RepositoryResult, ValidationError};

use super::callbacks::{Callbacks, RowDecision, RowExecutor};
use super::query_builder::QueryBuilders;
use super::{Operation, Repository};

const OP_FIND: &str = "BaseRepository.find";
const OP_LIST: &str = "BaseRepository.list";
const OP_LIST_WITH: &str = "BaseRepository.list_with";
const OP_CREATE: &str = "BaseRepository.create";
const OP_UPDATE: &str = "BaseRepository.update";
const OP_DELETE: &str = "BaseRepository.delete";
const OP_CLOSE: &str = "BaseRepository.close";

/// Generic repository engine.
///
/// Statements run through the querier of the caller's [`Scope`], so every
/// operation joins the ambient transaction when there is one. The find and
/// delete statements are prepared on first use and kept until [`close`](Self::close).
///
/// # Example
///
/// ```no_run
/// # #[cfg(feature = "sqlite")]
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// use std::sync::Arc;
///
/// use helios_repository::backends::sqlite::SqliteDatabase;
/// use helios_repository::core::{Entity, EntityInfo, Scope};
/// use helios_repository::repository::{BaseRepository, Callbacks, QueryBuilders};
///
/// #[derive(Debug, Default)]
/// struct Note {
///     id: i64,
///     body: String,
/// }
///
/// impl Entity for Note {
///     type Id = i64;
///     fn id(&self) -> &i64 { &self.id }
///     fn set_id(&mut self, id: i64) { self.id = id; }
///     fn is_exists(&self) -> bool { self.id != 0 }
/// }
///
/// let db = Arc::new(SqliteDatabase::in_memory()?);
/// db.execute_batch("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL)")?;
///
/// let repo = BaseRepository::from_store(
///     db,
///     EntityInfo::new("notes", "Note"),
///     QueryBuilders::builder()
///         .with_find(|| "SELECT id, body FROM notes WHERE id = ?1".to_string())
///         .build(),
///     Callbacks::builder()
///         .with_default_factory()
///         .with_scanner(|row, note: &mut Note| {
///             note.id = row.get(0)?;
///             note.body = row.get(1)?;
///             Ok(())
///         })
///         .build()?,
/// );
///
/// let missing = repo.find(&Scope::new(), &1).await;
/// assert!(missing.unwrap_err().is_not_found());
/// # Ok(())
/// # }
/// ```
pub struct BaseRepository<T: Entity> {
    executor: Arc<dyn Executor>,
    decipher: Arc<dyn ErrorDecipher>,
    info: EntityInfo,
    query_builders: QueryBuilders,
    callbacks: Callbacks<T>,
    find_stmt: OnceCell<Arc<dyn PreparedStatement>>,
    delete_stmt: OnceCell<Arc<dyn PreparedStatement>>,
}

impl<T: Entity> fmt::Debug for BaseRepository<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseRepository")
            .field("info", &self.info)
            .field("query_builders", &self.query_builders)
            .field("callbacks", &self.callbacks)
            .field("find_prepared", &self.find_stmt.initialized())
            .field("delete_prepared", &self.delete_stmt.initialized())
            .finish()
    }
}

impl<T: Entity> BaseRepository<T> {
    pub fn new(
        executor: Arc<dyn Executor>,
        decipher: Arc<dyn ErrorDecipher>,
        info: EntityInfo,
        query_builders: QueryBuilders,
        callbacks: Callbacks<T>,
    ) -> Self {
        Self {
            executor,
            decipher,
            info,
            query_builders,
            callbacks,
            find_stmt: OnceCell::new(),
            delete_stmt: OnceCell::new(),
        }
    }

    /// Creates a repository over a store that is both executor and decipher.
    pub fn from_store<S>(
        store: Arc<S>,
        info: EntityInfo,
        query_builders: QueryBuilders,
        callbacks: Callbacks<T>,
    ) -> Self
    where
        S: Executor + ErrorDecipher + 'static,
    {
        let executor: Arc<dyn Executor> = store.clone();
        let decipher: Arc<dyn ErrorDecipher> = store;
        Self::new(executor, decipher, info, query_builders, callbacks)
    }

    pub fn info(&self) -> &EntityInfo {
        &self.info
    }

    pub fn query_builders(&self) -> &QueryBuilders {
        &self.query_builders
    }

    pub fn callbacks(&self) -> &Callbacks<T> {
        &self.callbacks
    }

    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    pub fn decipher(&self) -> &Arc<dyn ErrorDecipher> {
        &self.decipher
    }

    pub async fn find(&self, scope: &Scope, id: &T::Id) -> RepositoryResult<T> {
        let stmt = self
            .prepared(scope, Operation::Find, &self.find_stmt, OP_FIND)
            .await?;
        let params = [id.clone().into()];
        self.find_one(scope, OP_FIND, stmt.sql(), &params, id).await
    }

    /// Runs a single-row lookup and scans the result.
    ///
    /// Zero rows is reported as `NotFound` keyed by `key`. Entity-specific
    /// finders (by code, by email, ...) are built on this.
    pub async fn find_one(
        &self,
        scope: &Scope,
        op: &'static str,
        sql: &str,
        params: &[Value],
        key: impl Display + Send,
    ) -> RepositoryResult<T> {
        let row = self
            .executor
            .querier(scope)
            .query_row(scope, sql, params)
            .await;

        let entity = match row.into_row().and_then(|r| self.callbacks.scan(&r)) {
            Ok(entity) => entity,
            Err(DriverError::NoRows) => {
                return Err(RepositoryError::not_found(
                    &self.info.entity,
                    key,
                    Some(DriverError::NoRows),
                ));
            }
            Err(e) => return Err(RepositoryError::store(op, "get row", e)),
        };

        self.after_find(op, entity)
    }

    pub async fn list(&self, scope: &Scope, limit: i64, offset: i64) -> RepositoryResult<Vec<T>> {
        validate_page(limit, offset).map_err(|e| RepositoryError::validation(OP_LIST, e))?;

        let sql = self.query_builders.build_sql(Operation::List).ok_or_else(|| {
            RepositoryError::not_implemented(
                OP_LIST,
                format!("no list query for {}", self.info.entity),
            )
        })?;

        self.list_rows(scope, OP_LIST, &sql, &[limit.into(), offset.into()])
            .await
    }

    /// Runs an arbitrary multi-row query through the list pipeline
    /// (scan, then the post-list hook).
    pub async fn list_with(
        &self,
        scope: &Scope,
        sql: &str,
        params: &[Value],
    ) -> RepositoryResult<Vec<T>> {
        self.list_rows(scope, OP_LIST_WITH, sql, params).await
    }

    async fn list_rows(
        &self,
        scope: &Scope,
        op: &'static str,
        sql: &str,
        params: &[Value],
    ) -> RepositoryResult<Vec<T>> {
        let cursor = self
            .executor
            .querier(scope)
            .query(scope, sql, params)
            .await
            .map_err(|e| RepositoryError::store(op, "query", e))?;
        let mut cursor = CursorGuard::new(cursor);

        let mut res = Vec::new();
        loop {
            scope
                .check()
                .map_err(|e| RepositoryError::store(op, "check scope", e))?;

            let Some(row) = cursor
                .next()
                .await
                .map_err(|e| RepositoryError::store(op, "read row", e))?
            else {
                break;
            };

            let entity = self
                .callbacks
                .scan(&row)
                .map_err(|e| RepositoryError::store(op, "scan row", e))?;

            match &self.callbacks.after_list_yield {
                Some(hook) => match hook(entity)
                    .map_err(|e| RepositoryError::store(op, "post scan processing", e))?
                {
                    RowDecision::Include(entity) => res.push(entity),
                    RowDecision::Exclude => {
                        tracing::trace!(entity = %self.info.entity, "row excluded from list")
                    }
                },
                None => res.push(entity),
            }
        }

        Ok(res)
    }

    pub async fn create(&self, scope: &Scope, mut entity: T) -> RepositoryResult<T> {
        let executor = self.callbacks.create_executor.clone().ok_or_else(|| {
            RepositoryError::not_implemented(
                OP_CREATE,
                format!("no create executor for {}", self.info.entity),
            )
        })?;

        if let Some(validate) = &self.callbacks.validate_create {
            validate(&entity).map_err(|e| RepositoryError::validation(OP_CREATE, e))?;
        }
        if let Some(before) = &self.callbacks.before_create {
            before(&mut entity).map_err(|e| RepositoryError::store(OP_CREATE, "before create", e))?;
        }

        self.write(scope, OP_CREATE, executor.as_ref(), &entity, None)
            .await
    }

    pub async fn update(&self, scope: &Scope, mut entity: T) -> RepositoryResult<T> {
        let executor = self.callbacks.update_executor.clone().ok_or_else(|| {
            RepositoryError::not_implemented(
                OP_UPDATE,
                format!("no update executor for {}", self.info.entity),
            )
        })?;

        if let Some(validate) = &self.callbacks.validate_update {
            validate(&entity).map_err(|e| RepositoryError::validation(OP_UPDATE, e))?;
        }
        if let Some(before) = &self.callbacks.before_update {
            before(&mut entity).map_err(|e| RepositoryError::store(OP_UPDATE, "before update", e))?;
        }

        let key = entity.id().to_string();
        self.write(scope, OP_UPDATE, executor.as_ref(), &entity, Some(key))
            .await
    }

    /// Runs a write executor and scans the returned row.
    ///
    /// `key` is the id of the entity being changed; `None` for inserts.
    async fn write(
        &self,
        scope: &Scope,
        op: &'static str,
        executor: &dyn RowExecutor<T>,
        entity: &T,
        key: Option<String>,
    ) -> RepositoryResult<T> {
        let querier = self.executor.querier(scope);
        let row = executor.execute(scope, querier, entity).await;

        let stored = match row.into_row().and_then(|r| self.callbacks.scan(&r)) {
            Ok(stored) => stored,
            Err(e) => return Err(self.classify_write_error(op, e, key)),
        };

        self.after_find(op, stored)
    }

    fn classify_write_error(
        &self,
        op: &'static str,
        err: DriverError,
        key: Option<String>,
    ) -> RepositoryError {
        if matches!(err, DriverError::EmptyStatement) {
            return RepositoryError::not_implemented(
                op,
                format!("empty statement for {}", self.info.entity),
            );
        }
        if self.decipher.is_unique_violation(&err) {
            return RepositoryError::already_exists(&self.info.entity, key, Some(err));
        }
        if self.decipher.is_foreign_key_violation(&err) {
            return RepositoryError::store(op, "foreign key violation", err);
        }
        match (err, key) {
            (DriverError::NoRows, Some(key)) => {
                RepositoryError::not_found(&self.info.entity, key, Some(DriverError::NoRows))
            }
            (err, _) => RepositoryError::store(op, "write entity", err),
        }
    }

    pub async fn delete(&self, scope: &Scope, id: &T::Id) -> RepositoryResult<()> {
        let stmt = self
            .prepared(scope, Operation::Delete, &self.delete_stmt, OP_DELETE)
            .await?;

        let affected = self
            .executor
            .querier(scope)
            .exec(scope, stmt.sql(), &[id.clone().into()])
            .await
            .map_err(|e| {
                if self.decipher.is_foreign_key_violation(&e) {
                    RepositoryError::store(OP_DELETE, "entity is still referenced", e)
                } else {
                    RepositoryError::store(OP_DELETE, "exec", e)
                }
            })?;

        if affected == 0 {
            return Err(RepositoryError::not_found(&self.info.entity, id, None));
        }
        Ok(())
    }

    /// Closes the prepared statements.
    ///
    /// Statements that were never prepared are skipped, so closing twice is
    /// harmless. Every failure is reported in one error.
    pub async fn close(&self) -> RepositoryResult<()> {
        let mut failures: Vec<DriverError> = [self.find_stmt.get(), self.delete_stmt.get()]
            .into_iter()
            .flatten()
            .filter_map(|stmt| stmt.close().err())
            .collect();

        match failures.len() {
            0 => Ok(()),
            1 => Err(RepositoryError::store(OP_CLOSE, "close statements", failures.remove(0))),
            _ => Err(RepositoryError::store(
                OP_CLOSE,
                "close statements",
                DriverError::Multiple(failures),
            )),
        }
    }

    /// Returns the statement for `op`, preparing it on first use.
    ///
    /// A failed preparation leaves the cell empty so the next call retries.
    async fn prepared(
        &self,
        scope: &Scope,
        op: Operation,
        cell: &OnceCell<Arc<dyn PreparedStatement>>,
        op_name: &'static str,
    ) -> RepositoryResult<Arc<dyn PreparedStatement>> {
        let stmt = cell
            .get_or_try_init(|| async {
                let sql = self.query_builders.build_sql(op).ok_or_else(|| {
                    RepositoryError::not_implemented(
                        op_name,
                        format!("no {} query for {}", op, self.info.entity),
                    )
                })?;
                tracing::debug!(entity = %self.info.entity, op = %op, "preparing statement");
                self.executor
                    .prepare(scope, &sql)
                    .await
                    .map_err(|e| RepositoryError::store(op_name, "prepare statement", e))
            })
            .await?;

        if stmt.is_closed() {
            return Err(RepositoryError::store(
                op_name,
                "prepared statement",
                DriverError::StatementClosed,
            ));
        }
        Ok(Arc::clone(stmt))
    }

    fn after_find(&self, op: &'static str, entity: T) -> RepositoryResult<T> {
        match &self.callbacks.after_find {
            Some(hook) => hook(entity).map_err(|e| RepositoryError::store(op, "after find", e)),
            None => Ok(entity),
        }
    }
}

fn validate_page(limit: i64, offset: i64) -> Result<(), ValidationError> {
    if limit <= 0 {
        return Err(ValidationError::invalid_argument("limit", limit));
    }
    if offset < 0 {
        return Err(ValidationError::invalid_argument("offset", offset));
    }
    Ok(())
}

#[async_trait]
impl<T: Entity> Repository<T> for BaseRepository<T> {
    async fn find(&self, scope: &Scope, id: &T::Id) -> RepositoryResult<T> {
        BaseRepository::find(self, scope, id).await
    }

    async fn list(&self, scope: &Scope, limit: i64, offset: i64) -> RepositoryResult<Vec<T>> {
        BaseRepository::list(self, scope, limit, offset).await
    }

    async fn create(&self, scope: &Scope, entity: T) -> RepositoryResult<T> {
        BaseRepository::create(self, scope, entity).await
    }

    async fn update(&self, scope: &Scope, entity: T) -> RepositoryResult<T> {
        BaseRepository::update(self, scope, entity).await
    }

    async fn delete(&self, scope: &Scope, id: &T::Id) -> RepositoryResult<()> {
        BaseRepository::delete(self, scope, id).await
    }

    async fn close(&self) -> RepositoryResult<()> {
        BaseRepository::close(self).await
    }
}
