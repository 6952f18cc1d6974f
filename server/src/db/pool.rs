//! PostgreSQL pool and embedded migrations.

use crate::config::Config;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

pub type Pool = PgPool;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connect a pool sized by `config.max_connections`.
pub async fn create_pool(config: &Config) -> Result<Pool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(&config.database_url)
        .await?;
    tracing::debug!(max_connections = config.max_connections, "database pool ready");
    Ok(pool)
}

/// Apply `./migrations` (embedded at compile time).
pub async fn run_migrations(pool: &Pool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
