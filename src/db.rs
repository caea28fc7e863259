//! Connection pool and schema migration management.
//!
//! Migrations are validated and applied before any import runs; we always
//! ensure the database is on the latest schema.

use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Open a connection pool against the given database URL.
pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
}

/// Run database migrations.
///
/// Idempotent - migrations that have already been applied are skipped. The
/// migrator ensures the tracking table exists, verifies checksums, and
/// applies anything pending.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    log::info!("checking database migration state");

    MIGRATOR.run(pool).await?;

    log::info!("database migrations up to date");
    Ok(())
}
