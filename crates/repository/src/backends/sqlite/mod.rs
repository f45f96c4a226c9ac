//! SQLite store.
//!
//! [`SqliteDatabase`] implements every store contract the engine needs:
//! [`Querier`](crate::core::Querier), [`Executor`](crate::core::Executor),
//! [`ErrorDecipher`](crate::core::ErrorDecipher) and
//! [`TransactionProvider`](crate::core::TransactionProvider). It supports both
//! in-memory databases (great for testing) and file-based databases.
//!
//! Multi-row results are read fully before the cursor is handed back, so no
//! pooled connection is held between `next` calls.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use helios_repository::backends::sqlite::SqliteDatabase;
//! use helios_repository::core::{Querier, Scope, TransactionManager, TxManager};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Arc::new(SqliteDatabase::open("./data/app.db")?);
//! db.execute_batch("CREATE TABLE IF NOT EXISTS events (id INTEGER PRIMARY KEY, kind TEXT)")?;
//!
//! let tm = TxManager::new(db.clone());
//! let writer = db.clone();
//! tm.within_transaction(&Scope::new(), None, |scope| async move {
//!     let querier = helios_repository::core::Executor::querier(writer.as_ref(), &scope);
//!     querier
//!         .exec(&scope, "INSERT INTO events (kind) VALUES (?1)", &["started".into()])
//!         .await
//!         .map_err(|e| helios_repository::error::RepositoryError::store("example", "insert", e))?;
//!     Ok(())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

mod backend;
mod convert;
mod transaction;

pub use backend::{SqliteConfig, SqliteDatabase, SqlitePrepared};
pub use transaction::SqliteTransaction;
