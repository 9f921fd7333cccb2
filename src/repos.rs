//! Repository registry backed by SQLite.
//!
//! The surrounding API layer owns repository creation and deletion; the
//! ingestion orchestrator only reads rows and advances their status.

use anyhow::{anyhow, Result};
use sqlx::{Row, SqlitePool};

use crate::models::{RepoStatus, Repository};

#[derive(Clone)]
pub struct RepoStore {
    pool: SqlitePool,
}

impl RepoStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a new repository in PENDING state.
    pub async fn create(&self, name: &str, github_url: &str) -> Result<Repository> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO repositories (name, github_url, status, created_at, updated_at)
            VALUES (?, ?, 'PENDING', ?, ?)
            "#,
        )
        .bind(name)
        .bind(github_url)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.get(id)
            .await?
            .ok_or_else(|| anyhow!("repository {} vanished after insert", id))
    }

    pub async fn get(&self, id: i64) -> Result<Option<Repository>> {
        let row = sqlx::query(
            "SELECT id, name, github_url, status, error_message, created_at, updated_at
             FROM repositories WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_repository).transpose()
    }

    pub async fn find_by_url(&self, github_url: &str) -> Result<Option<Repository>> {
        let row = sqlx::query(
            "SELECT id, name, github_url, status, error_message, created_at, updated_at
             FROM repositories WHERE github_url = ?",
        )
        .bind(github_url)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_repository).transpose()
    }

    /// All repositories, newest first.
    pub async fn list(&self) -> Result<Vec<Repository>> {
        let rows = sqlx::query(
            "SELECT id, name, github_url, status, error_message, created_at, updated_at
             FROM repositories ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_repository).collect()
    }

    /// Advance a repository's status. Passing `None` for `error` clears any
    /// stored error text.
    pub async fn set_status(
        &self,
        id: i64,
        status: RepoStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            "UPDATE repositories SET status = ?, error_message = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(error)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Remove a repository row. Returns whether a row existed.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM repositories WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn row_to_repository(row: sqlx::sqlite::SqliteRow) -> Result<Repository> {
    let status_str: String = row.get("status");
    let status = RepoStatus::parse(&status_str)
        .ok_or_else(|| anyhow!("unknown repository status in database: {}", status_str))?;

    Ok(Repository {
        id: row.get("id"),
        name: row.get("name"),
        github_url: row.get("github_url"),
        status,
        error_message: row.get("error_message"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, migrate};

    async fn test_store() -> (tempfile::TempDir, RepoStore) {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = db::connect_path(&tmp.path().join("test.sqlite"))
            .await
            .unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        (tmp, RepoStore::new(pool))
    }

    #[tokio::test]
    async fn test_create_starts_pending() {
        let (_tmp, store) = test_store().await;
        let repo = store
            .create("demo", "https://github.com/acme/demo")
            .await
            .unwrap();
        assert_eq!(repo.status, RepoStatus::Pending);
        assert!(repo.error_message.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_url_rejected() {
        let (_tmp, store) = test_store().await;
        store
            .create("demo", "https://github.com/acme/demo")
            .await
            .unwrap();
        let dup = store.create("demo2", "https://github.com/acme/demo").await;
        assert!(dup.is_err());
    }

    #[tokio::test]
    async fn test_status_transitions_and_error_clearing() {
        let (_tmp, store) = test_store().await;
        let repo = store
            .create("demo", "https://github.com/acme/demo")
            .await
            .unwrap();

        store
            .set_status(repo.id, RepoStatus::Failed, Some("clone failed"))
            .await
            .unwrap();
        let failed = store.get(repo.id).await.unwrap().unwrap();
        assert_eq!(failed.status, RepoStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("clone failed"));

        store
            .set_status(repo.id, RepoStatus::Ready, None)
            .await
            .unwrap();
        let ready = store.get(repo.id).await.unwrap().unwrap();
        assert_eq!(ready.status, RepoStatus::Ready);
        assert!(ready.error_message.is_none());
    }

    #[tokio::test]
    async fn test_delete_idempotent_lookup() {
        let (_tmp, store) = test_store().await;
        let repo = store
            .create("demo", "https://github.com/acme/demo")
            .await
            .unwrap();
        assert!(store.delete(repo.id).await.unwrap());
        assert!(!store.delete(repo.id).await.unwrap());
        assert!(store.get(repo.id).await.unwrap().is_none());
    }
}
