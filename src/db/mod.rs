//! Database module: persisted row shapes and the SQLite content store.
//!
//! - `model`: snake_case row shapes shared with the hosted table.
//! - `repo`: SQL-only functions and the `SqliteStore` repository.

pub mod model;
pub mod repo;

pub use model::{ContentRow, RowPatch};
pub use repo::{init_pool, run_migrations, Pool, SqliteStore};
