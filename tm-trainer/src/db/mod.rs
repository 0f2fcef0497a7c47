//! Database access for tm-trainer
//!
//! The only table is the append-only `job_references` log.

pub mod job_references;

use sqlx::SqlitePool;
use std::path::Path;
use tm_common::Result;

/// Open the database in the root folder and create tm-trainer tables
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    let pool = tm_common::db::init_database(db_path).await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create tm-trainer tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS job_references (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id TEXT NOT NULL UNIQUE,
            iteration_id TEXT NOT NULL,
            published_name TEXT NOT NULL,
            enhanced INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (job_references)");

    Ok(())
}
