// File: watchcat-core/src/test_utils/helpers.rs

use sqlx::{Pool, Postgres};
use sqlx::postgres::PgPoolOptions;
use crate::Error;
use crate::db::Database;

/// Create a connection pool to the test DB.
/// Looks for `TEST_DATABASE_URL` in env,
/// else uses `postgres://watchcat@localhost/watchcat_test`.
pub async fn create_test_db_pool() -> Result<Pool<Postgres>, Error> {
    let url = std::env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| "postgres://watchcat@localhost/watchcat_test".to_string());

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await?;

    Ok(pool)
}

/// Wipes out test data so each test can start fresh.
pub async fn clean_database(pool: &Pool<Postgres>) -> Result<(), Error> {
    sqlx::query(r#"
        TRUNCATE TABLE
            guilds,
            guild_admin_roles,
            guild_watches,
            managed_messages,
            adapter_state
        RESTART IDENTITY CASCADE;
    "#)
        .execute(pool)
        .await?;

    Ok(())
}

/// Returns a migrated, empty test DB handle.
pub async fn setup_test_database() -> Result<Database, Error> {
    let pool = create_test_db_pool().await?;
    let db = Database::from_pool(pool);
    db.migrate().await?;
    clean_database(db.pool()).await?;

    Ok(db)
}
