//! Per-operation SQL builders.

use std::fmt;
use std::sync::Arc;

use super::Operation;

/// Produces the SQL text for one operation.
pub type QueryBuilderFn = Arc<dyn Fn() -> String + Send + Sync>;

/// The SQL builders of one entity, one optional slot per operation.
///
/// A missing builder, or one producing blank SQL, is only reported when the
/// operation is called.
#[derive(Clone, Default)]
pub struct QueryBuilders {
    find: Option<QueryBuilderFn>,
    list: Option<QueryBuilderFn>,
    create: Option<QueryBuilderFn>,
    update: Option<QueryBuilderFn>,
    delete: Option<QueryBuilderFn>,
}

impl QueryBuilders {
    pub fn builder() -> QueryBuildersBuilder {
        QueryBuildersBuilder::default()
    }

    fn slot(&self, op: Operation) -> Option<&QueryBuilderFn> {
        match op {
            Operation::Find => self.find.as_ref(),
            Operation::List => self.list.as_ref(),
            Operation::Create => self.create.as_ref(),
            Operation::Update => self.update.as_ref(),
            Operation::Delete => self.delete.as_ref(),
            Operation::Close => None,
        }
    }

    /// Builds the SQL for `op`. `None` when no builder is set or it yields blank text.
    pub fn build_sql(&self, op: Operation) -> Option<String> {
        let sql = (self.slot(op)?)();
        if sql.trim().is_empty() {
            None
        } else {
            Some(sql)
        }
    }

    /// The builder for `op`, if any.
    pub fn get(&self, op: Operation) -> Option<QueryBuilderFn> {
        self.slot(op).cloned()
    }

    /// Operations that have a builder.
    pub fn configured(&self) -> Vec<Operation> {
        Operation::CRUD
            .into_iter()
            .filter(|op| self.slot(*op).is_some())
            .collect()
    }
}

impl fmt::Debug for QueryBuilders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBuilders")
            .field("configured", &self.configured())
            .finish()
    }
}

/// Assembles a [`QueryBuilders`].
#[derive(Default)]
pub struct QueryBuildersBuilder {
    inner: QueryBuilders,
}

impl QueryBuildersBuilder {
    pub fn with_find<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.inner.find = Some(Arc::new(f));
        self
    }

    pub fn with_list<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.inner.list = Some(Arc::new(f));
        self
    }

    pub fn with_create<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.inner.create = Some(Arc::new(f));
        self
    }

    pub fn with_update<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.inner.update = Some(Arc::new(f));
        self
    }

    pub fn with_delete<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.inner.delete = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> QueryBuilders {
        self.inner
    }
}
