//! Timing decorator for repositories.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use prometheus::{Error, HistogramOpts, HistogramVec, Registry};

use crate::core::{Entity, Scope};
use crate::error::RepositoryResult;

use super::{Operation, Repository};

const DURATION_METRIC: &str = "repository_op_duration_seconds";
const DURATION_BUCKETS: [f64; 12] = [
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.5, 1.0, 2.5, 3.0, 4.0, 5.0,
];

/// Receives one observation per repository call.
pub trait OperationObserver: Send + Sync {
    fn observe(&self, repository: &str, op: Operation, success: bool, elapsed: Duration);
}

/// Prometheus histogram of repository call durations, labelled by
/// `repository`, `method` and `status` (`success` or `fail`).
#[derive(Clone)]
pub struct RepositoryMetrics {
    duration: HistogramVec,
}

impl fmt::Debug for RepositoryMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryMetrics").finish_non_exhaustive()
    }
}

impl RepositoryMetrics {
    /// Creates the histogram and registers it in `registry`.
    pub fn register(registry: &Registry) -> Result<Arc<Self>, Error> {
        let duration = HistogramVec::new(
            HistogramOpts::new(DURATION_METRIC, "Duration of repository operations in seconds")
                .buckets(DURATION_BUCKETS.to_vec()),
            &["repository", "method", "status"],
        )?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Arc::new(Self { duration }))
    }

    /// Number of observations recorded for one label set.
    pub fn sample_count(&self, repository: &str, op: Operation, success: bool) -> u64 {
        self.duration
            .with_label_values(&[repository, op.as_str(), status_label(success)])
            .get_sample_count()
    }
}

impl OperationObserver for RepositoryMetrics {
    fn observe(&self, repository: &str, op: Operation, success: bool, elapsed: Duration) {
        self.duration
            .with_label_values(&[repository, op.as_str(), status_label(success)])
            .observe(elapsed.as_secs_f64());
    }
}

fn status_label(success: bool) -> &'static str {
    if success { "success" } else { "fail" }
}

/// Wraps a [`Repository`] and reports the duration and outcome of every call.
///
/// Results and errors pass through unchanged.
pub struct MetricsRepository<R> {
    inner: R,
    name: String,
    observer: Arc<dyn OperationObserver>,
}

impl<R> fmt::Debug for MetricsRepository<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsRepository")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<R> MetricsRepository<R> {
    /// Wraps `inner`, naming it after its type (`BaseRepository`, `WidgetRepository`, ...).
    pub fn new(inner: R, observer: Arc<dyn OperationObserver>) -> Self {
        Self {
            inner,
            name: short_type_name::<R>(),
            observer,
        }
    }

    /// Overrides the `repository` label.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    async fn timed<O>(
        &self,
        op: Operation,
        fut: impl Future<Output = RepositoryResult<O>>,
    ) -> RepositoryResult<O> {
        let start = Instant::now();
        let res = fut.await;
        self.observer
            .observe(&self.name, op, res.is_ok(), start.elapsed());
        res
    }
}

/// `a::b::Name<c::D>` -> `Name`
fn short_type_name<R>() -> String {
    let full = std::any::type_name::<R>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

#[async_trait]
impl<T, R> Repository<T> for MetricsRepository<R>
where
    T: Entity,
    R: Repository<T>,
{
    async fn find(&self, scope: &Scope, id: &T::Id) -> RepositoryResult<T> {
        self.timed(Operation::Find, self.inner.find(scope, id)).await
    }

    async fn list(&self, scope: &Scope, limit: i64, offset: i64) -> RepositoryResult<Vec<T>> {
        self.timed(Operation::List, self.inner.list(scope, limit, offset))
            .await
    }

    async fn create(&self, scope: &Scope, entity: T) -> RepositoryResult<T> {
        self.timed(Operation::Create, self.inner.create(scope, entity))
            .await
    }

    async fn update(&self, scope: &Scope, entity: T) -> RepositoryResult<T> {
        self.timed(Operation::Update, self.inner.update(scope, entity))
            .await
    }

    async fn delete(&self, scope: &Scope, id: &T::Id) -> RepositoryResult<()> {
        self.timed(Operation::Delete, self.inner.delete(scope, id)).await
    }

    async fn close(&self) -> RepositoryResult<()> {
        self.timed(Operation::Close, self.inner.close()).await
    }
}
