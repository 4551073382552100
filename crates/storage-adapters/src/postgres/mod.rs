//! # PostgreSQL adapters
//!
//! Runtime-checked `sqlx` queries against the schema in `migrations/`.
//! Every statement is scoped by board (`ib_id`) so an identity from one board
//! never matches a row of another.

mod audit;
mod authorizer;
mod store;
mod transaction;

pub use audit::{PgAuditLog, PgAuditSink};
pub use authorizer::PgAuthorizer;
pub use store::PgModerationStore;
pub use transaction::PgStoreTransaction;

pub use sqlx::postgres::PgPool;

use domains::{DomainError, Result};
use sqlx::postgres::PgPoolOptions;

/// Opens the shared connection pool.
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .map_err(db)
}

/// Applies pending schema migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(DomainError::internal)
}

pub(crate) fn db(err: sqlx::Error) -> DomainError {
    DomainError::internal(err)
}
