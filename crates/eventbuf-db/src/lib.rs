//! Storage backend for the eventbuf durable event buffer.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode and
//! full-sync initialization, and embedded SQL migrations. The `events`
//! table the store operates on is created through versioned migrations
//! managed by this crate.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: no external database process, and readers
//!   do not block the single writer. Several processes may open the same
//!   file; SQLite's file locks arbitrate between them.
//! - **`synchronous = FULL`**: a committed transaction has been fsynced,
//!   so an event acknowledged by `add` survives a crash or power loss.
//! - **`r2d2` connection pool**: bounded connection reuse, with each
//!   connection returned to the pool when its guard drops.
//! - **Embedded migrations**: SQL files are compiled into the binary via
//!   `include_str!` and cannot drift from the code that depends on them.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbConnection, DbPool, DbRuntimeSettings, PoolError, MEMORY_PATH};
