//! SQLite file-backed storage for Recall.
//!
//! [`SqliteStorage`] keeps every entry as one row of a single table in a
//! SQLite database file. Deleted rows are tombstoned and stay in the file
//! until [`SqliteStorage::repack`] rewrites it.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use recall_sqlite::{SqliteStorage, SqliteStorageConfig};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Reopen (or create) a cache file
//! let storage = SqliteStorage::new(SqliteStorageConfig::new("/tmp/results.db"))?;
//!
//! // Scratch file removed when the storage is dropped
//! let scratch = SqliteStorage::new(
//!     SqliteStorageConfig::new("/tmp/scratch.db").truncate(true).temporary(true),
//! )?;
//! # Ok(())
//! # }
//! ```

mod storage;

pub use storage::{SqliteStorage, SqliteStorageConfig};

// Re-export core traits for convenience.
pub use recall_core::{RecallError, Storage};
