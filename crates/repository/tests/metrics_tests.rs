//! Metrics decorator tests against the SQLite store.

#![cfg(feature = "sqlite")]

mod common;

use std::sync::Arc;

use common::*;
use helios_repository::core::{Scope, TransactionManager, TxManager};
use helios_repository::error::ErrorKind;
use helios_repository::repository::{MetricsRepository, Operation, Repository, RepositoryMetrics};
use prometheus::{Encoder, Registry, TextEncoder};

fn instrumented(
    repo: WidgetRepository,
) -> (MetricsRepository<WidgetRepository>, Arc<RepositoryMetrics>, Registry) {
    let registry = Registry::new();
    let metrics = RepositoryMetrics::register(&registry).expect("Failed to register metrics");
    (MetricsRepository::new(repo, metrics.clone()), metrics, registry)
}

#[tokio::test]
async fn test_calls_are_recorded_by_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let db = create_database(&dir);
    let (repo, metrics, _registry) = instrumented(create_repository(&db));
    let scope = Scope::new();

    assert_eq!(repo.name(), "WidgetRepository");

    let created = repo
        .create(&scope, Widget::new("M-1", "Measured"))
        .await
        .unwrap();
    repo.find(&scope, &created.id).await.unwrap();
    repo.list(&scope, 10, 0).await.unwrap();

    let dup = repo
        .create(&scope, Widget::new("M-1", "Again"))
        .await
        .unwrap_err();
    assert_eq!(dup.kind(), ErrorKind::AlreadyExists);

    let missing = repo
        .delete(&scope, &"missing".to_string())
        .await
        .unwrap_err();
    assert!(missing.is_not_found());

    let name = repo.name();
    assert_eq!(metrics.sample_count(name, Operation::Create, true), 1);
    assert_eq!(metrics.sample_count(name, Operation::Create, false), 1);
    assert_eq!(metrics.sample_count(name, Operation::Find, true), 1);
    assert_eq!(metrics.sample_count(name, Operation::List, true), 1);
    assert_eq!(metrics.sample_count(name, Operation::Delete, false), 1);
    assert_eq!(metrics.sample_count(name, Operation::Delete, true), 0);
}

#[tokio::test]
async fn test_histogram_is_exported() {
    let dir = tempfile::tempdir().unwrap();
    let db = create_database(&dir);
    let (repo, _metrics, registry) = instrumented(create_repository(&db));
    let repo = repo.with_name("widgets");

    repo.list(&Scope::new(), 5, 0).await.unwrap();
    repo.close().await.unwrap();

    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .expect("Failed to encode metrics");
    let text = String::from_utf8(buffer).unwrap();

    let counts: Vec<&str> = text
        .lines()
        .filter(|l| l.starts_with("repository_op_duration_seconds_count"))
        .collect();
    assert_eq!(counts.len(), 2);
    assert!(counts.iter().all(|l| l.contains(r#"repository="widgets""#)));
    assert!(counts.iter().any(|l| l.contains(r#"method="close""#)));
    assert!(counts.iter().all(|l| l.contains(r#"status="success""#)));
}

#[tokio::test]
async fn test_decorated_repository_joins_transactions() {
    let dir = tempfile::tempdir().unwrap();
    let db = create_database(&dir);
    let (repo, metrics, _registry) = instrumented(create_repository(&db));
    let tm = TxManager::new(db.clone());

    let err = tm
        .within_transaction(&Scope::new(), None, |scope| {
            let repo = &repo;
            async move {
                repo.create(&scope, Widget::new("MT-1", "Inside")).await?;
                repo.create(&scope, Widget::new("MT-1", "Clash")).await?;
                Ok(())
            }
        })
        .await
        .unwrap_err();

    assert!(err.is_already_exists());
    assert_eq!(count_widgets(&db).await, 0);
    assert_eq!(
        metrics.sample_count(repo.name(), Operation::Create, true)
            + metrics.sample_count(repo.name(), Operation::Create, false),
        2
    );
}
