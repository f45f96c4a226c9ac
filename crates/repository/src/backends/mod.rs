//! Store implementations.
//!
//! Each store is gated behind a feature flag.
//!
//! | Store | Feature | Description |
//! |-------|---------|-------------|
//! | SQLite | `sqlite` (default) | Embedded database, in-memory or file-based |
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "sqlite")]
//! use helios_repository::backends::sqlite::SqliteDatabase;
//!
//! # #[cfg(feature = "sqlite")]
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Create an in-memory database
//! let db = SqliteDatabase::in_memory()?;
//!
//! // Or use a file-based database
//! let db = SqliteDatabase::open("./data/app.db")?;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "sqlite")]
pub mod sqlite;
