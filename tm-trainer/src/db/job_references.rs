//! Job reference database operations
//!
//! Rows are inserted once and never updated or deleted. The row with the
//! highest `id` is the last committed one and is authoritative.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tm_common::{Error, Result};

use crate::models::{JobReference, NewJobReference};
use crate::utils::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

/// Insert a reference and return it with its assigned row id
///
/// Uses retry_on_lock to ride out SQLite lock contention from concurrent
/// finishing jobs.
pub async fn insert_reference(pool: &SqlitePool, reference: &NewJobReference) -> Result<JobReference> {
    let created_at = Utc::now();
    let created_at_str = created_at.to_rfc3339();

    let id = retry_on_lock("insert_job_reference", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let result = sqlx::query(
            r#"
            INSERT INTO job_references (project_id, iteration_id, published_name, enhanced, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&reference.project_id)
        .bind(&reference.iteration_id)
        .bind(&reference.published_name)
        .bind(reference.enhanced)
        .bind(&created_at_str)
        .execute(pool)
        .await
        .map_err(Error::Database)?;

        Ok::<_, Error>(result.last_insert_rowid())
    })
    .await?;

    Ok(JobReference {
        id,
        project_id: reference.project_id.clone(),
        iteration_id: reference.iteration_id.clone(),
        published_name: reference.published_name.clone(),
        enhanced: reference.enhanced,
        created_at,
    })
}

/// Load the last committed reference
pub async fn load_latest(pool: &SqlitePool) -> Result<Option<JobReference>> {
    let row = sqlx::query(
        r#"
        SELECT id, project_id, iteration_id, published_name, enhanced, created_at
        FROM job_references
        ORDER BY id DESC
        LIMIT 1
        "#,
    )
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let created_at: String = row.get("created_at");
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| Error::Internal(format!("Failed to parse created_at: {}", e)))?
        .with_timezone(&Utc);

    Ok(Some(JobReference {
        id: row.get("id"),
        project_id: row.get("project_id"),
        iteration_id: row.get("iteration_id"),
        published_name: row.get("published_name"),
        enhanced: row.get("enhanced"),
        created_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::init_tables(&pool).await.unwrap();
        pool
    }

    fn new_reference(project_id: &str) -> NewJobReference {
        NewJobReference {
            project_id: project_id.to_string(),
            iteration_id: format!("{}-iter", project_id),
            published_name: "myModel".to_string(),
            enhanced: false,
        }
    }

    #[tokio::test]
    async fn test_empty_table_has_no_latest() {
        let pool = memory_pool().await;
        assert!(load_latest(&pool).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_latest_is_highest_id() {
        let pool = memory_pool().await;
        let first = insert_reference(&pool, &new_reference("p1")).await.unwrap();
        let second = insert_reference(&pool, &new_reference("p2")).await.unwrap();
        assert!(second.id > first.id);

        let latest = load_latest(&pool).await.unwrap().unwrap();
        assert_eq!(latest.project_id, "p2");
        assert_eq!(latest.iteration_id, "p2-iter");
        assert!(!latest.enhanced);
    }

    #[tokio::test]
    async fn test_duplicate_project_rejected() {
        let pool = memory_pool().await;
        insert_reference(&pool, &new_reference("p1")).await.unwrap();
        assert!(insert_reference(&pool, &new_reference("p1")).await.is_err());
    }
}
