//! # Members DB
//!
//! Database pool and migrations for the Members API.
//!
//! This crate provides PostgreSQL connection pool initialization using SQLx
//! and embeds the SQL migrations under `migrations/` at the workspace root.
//!
//! # Example
//!
//! ```ignore
//! use members_db::{init_db_pool, run_migrations};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = init_db_pool().await?;
//!     run_migrations(&pool).await?;
//!     Ok(())
//! }
//! ```

use std::env;

use anyhow::Context;
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::postgres::PgPoolOptions;

static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Initializes a PostgreSQL connection pool.
///
/// Reads `DATABASE_URL` and `DATABASE_MAX_CONNECTIONS` (default 10).
/// Fails if `DATABASE_URL` is unset or the database cannot be reached.
pub async fn init_db_pool() -> anyhow::Result<sqlx::PgPool> {
    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let max_connections = env::var("DATABASE_MAX_CONNECTIONS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(10);

    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(&database_url)
        .await
        .context("Failed to connect to database")
}

/// Applies pending migrations, including the permission registry seed rows.
pub async fn run_migrations(pool: &sqlx::PgPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}

// Re-export PgPool for convenience
pub use sqlx::PgPool;
