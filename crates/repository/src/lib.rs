//! Helios Repository
//!
//! A generic persistence core for relational entities. One engine implements
//! find, list, create, update and delete for any entity type; what differs
//! between entities is injected as SQL builders and callbacks rather than
//! written as a new repository per type. Transactions are ambient: a unit of
//! work run through a [`TransactionManager`](core::TransactionManager) hands a
//! [`Scope`](core::Scope) down the call chain, every repository called with
//! that scope joins the transaction, and nested requests reuse it.
//!
//! # Features
//!
//! - **Generic engine**: [`BaseRepository`](repository::BaseRepository) driven by
//!   [`QueryBuilders`](repository::QueryBuilders) and [`Callbacks`](repository::Callbacks)
//! - **Ambient transactions**: flattening of nested requests, rollback on error or panic
//! - **Error taxonomy**: store failures classified as not-found, already-exists,
//!   validation, not-implemented, store or transaction errors
//! - **Lazy statements**: find and delete statements prepared once on first use
//! - **Metrics**: a decorator timing every call into a prometheus histogram
//!
//! Enable stores with feature flags in `Cargo.toml`:
//!
//! - `sqlite` (default) - SQLite with in-memory and file modes
//!
//! # Architecture
//!
//! - [`error`] - Error types for all operations
//! - [`core`] - Entity contract, scope, store contracts and the transaction manager
//! - [`repository`] - The generic engine, its bundles and the metrics decorator
//! - [`backends`] - Store implementations
//!
//! # Quick Start
//!
//! ```no_run
//! # #[cfg(feature = "sqlite")]
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//!
//! use helios_repository::backends::sqlite::SqliteDatabase;
//! use helios_repository::core::{
//!     Entity, EntityInfo, Scope, TransactionManager, TxManager, Value,
//! };
//! use helios_repository::repository::{
//!     BaseRepository, Callbacks, QueryBuilders, SqlRowExecutor,
//! };
//!
//! #[derive(Debug, Default, Clone)]
//! struct City {
//!     id: i64,
//!     name: String,
//! }
//!
//! impl Entity for City {
//!     type Id = i64;
//!     fn id(&self) -> &i64 { &self.id }
//!     fn set_id(&mut self, id: i64) { self.id = id; }
//!     fn is_exists(&self) -> bool { self.id != 0 }
//! }
//!
//! let db = Arc::new(SqliteDatabase::in_memory()?);
//! db.execute_batch("CREATE TABLE cities (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE)")?;
//!
//! let cities = BaseRepository::from_store(
//!     db.clone(),
//!     EntityInfo::new("cities", "City"),
//!     QueryBuilders::builder()
//!         .with_find(|| "SELECT id, name FROM cities WHERE id = ?1".to_string())
//!         .with_list(|| "SELECT id, name FROM cities ORDER BY id LIMIT ?1 OFFSET ?2".to_string())
//!         .with_delete(|| "DELETE FROM cities WHERE id = ?1".to_string())
//!         .build(),
//!     Callbacks::builder()
//!         .with_default_factory()
//!         .with_scanner(|row, city: &mut City| {
//!             city.id = row.get_named("id")?;
//!             city.name = row.get_named("name")?;
//!             Ok(())
//!         })
//!         .with_create_executor(SqlRowExecutor::new(
//!             || "INSERT INTO cities (name) VALUES (?1) RETURNING id, name".to_string(),
//!             |city: &City| vec![Value::from(city.name.clone())],
//!         ))
//!         .build()?,
//! );
//!
//! let tm = TxManager::new(db);
//! let created = tm
//!     .within_transaction(&Scope::new(), None, |scope| async move {
//!         cities.create(&scope, City { id: 0, name: "Oslo".into() }).await
//!     })
//!     .await?;
//! assert!(created.is_exists());
//! # Ok(())
//! # }
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod core;
pub mod error;
pub mod repository;

// Re-export commonly used types at crate root
pub use error::{
    DriverError, DriverResult, ErrorKind, RepositoryError, RepositoryResult, TransactionError,
    ValidationError,
};

// Re-export core traits
pub use core::{
    Entity, ErrorDecipher, Executor, Querier, Scope, Transaction, TransactionManager,
    TransactionProvider, TxManager,
};
pub use repository::{BaseRepository, MetricsRepository, Repository};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
