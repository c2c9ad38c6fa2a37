//! Database layer for the Eventful platform.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! and embedded SQL migrations for the three collections the feed reads:
//! `users`, `events`, and `invitations`.
//!
//! Each collection keeps its full record as a JSON document (`doc_json`)
//! next to the columns its secondary indexes are built on, so the storage
//! layer can answer keyed range queries without understanding the payload.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
