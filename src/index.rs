//! Repository-partitioned vector index over SQLite.
//!
//! Every record lives in exactly one repository partition, and every read
//! and write carries a mandatory `repository_id` scope, so a query against
//! one repository is structurally incapable of returning another's records.
//! Vectors are stored as little-endian f32 BLOBs and similarity is computed
//! in Rust at query time; at this corpus scale a linear scan per partition
//! beats maintaining an approximate index.

use anyhow::{bail, Result};
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::PipelineError;
use crate::models::{ChunkKind, ScoredChunk, VectorRecord};

/// Records are written in fixed-size batches to bound transaction size.
pub const UPSERT_BATCH_SIZE: usize = 100;

#[derive(Clone)]
pub struct VectorIndex {
    pool: SqlitePool,
    dims: usize,
}

impl VectorIndex {
    /// Open the index, validating that the stored dimensionality matches
    /// what the embedder produces. First open records `dims` in the schema
    /// metadata; later opens with a different value are rejected.
    pub async fn open(pool: SqlitePool, dims: usize) -> Result<Self> {
        if dims == 0 {
            bail!("vector index dimensionality must be > 0");
        }

        let stored: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = 'dims'")
                .fetch_optional(&pool)
                .await?;

        match stored {
            Some(value) => {
                let stored_dims: usize = value
                    .parse()
                    .map_err(|_| anyhow::anyhow!("corrupt index_meta dims value: {}", value))?;
                if stored_dims != dims {
                    bail!(
                        "vector index dimensionality mismatch: index stores {}-dim vectors, embedder produces {}",
                        stored_dims,
                        dims
                    );
                }
            }
            None => {
                sqlx::query("INSERT INTO index_meta (key, value) VALUES ('dims', ?)")
                    .bind(dims.to_string())
                    .execute(&pool)
                    .await?;
            }
        }

        Ok(Self { pool, dims })
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Create the partition for a repository if absent. Idempotent.
    pub async fn ensure_partition(&self, repository_id: i64) -> Result<(), PipelineError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("INSERT OR IGNORE INTO index_partitions (repository_id, created_at) VALUES (?, ?)")
            .bind(repository_id)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| PipelineError::IndexWrite(format!("ensure partition: {}", e)))?;
        Ok(())
    }

    /// Write all records into the repository's partition in sequential
    /// batches of [`UPSERT_BATCH_SIZE`]. A failing batch aborts the
    /// remaining ones; batches already committed are not rolled back.
    pub async fn upsert(
        &self,
        repository_id: i64,
        records: &[VectorRecord],
    ) -> Result<(), PipelineError> {
        for record in records {
            if record.embedding.len() != self.dims {
                return Err(PipelineError::IndexWrite(format!(
                    "record {} has {}-dim embedding, index expects {}",
                    record.id,
                    record.embedding.len(),
                    self.dims
                )));
            }
        }

        let total_batches = records.len().div_ceil(UPSERT_BATCH_SIZE);

        for (batch_no, batch) in records.chunks(UPSERT_BATCH_SIZE).enumerate() {
            self.write_batch(repository_id, batch)
                .await
                .map_err(|e| {
                    PipelineError::IndexWrite(format!(
                        "batch {}/{}: {}",
                        batch_no + 1,
                        total_batches,
                        e
                    ))
                })?;

            tracing::debug!(
                repository_id,
                batch = batch_no + 1,
                total = total_batches,
                "stored vector batch"
            );
        }

        Ok(())
    }

    async fn write_batch(&self, repository_id: i64, batch: &[VectorRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for record in batch {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO vector_records
                    (id, repository_id, embedding, file_path, start_line, end_line,
                     chunk_type, content_length, content_prefix)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.id)
            .bind(repository_id)
            .bind(vec_to_blob(&record.embedding))
            .bind(&record.metadata.file_path)
            .bind(record.metadata.start_line)
            .bind(record.metadata.end_line)
            .bind(record.metadata.kind.as_str())
            .bind(record.metadata.content_length)
            .bind(&record.metadata.content_prefix)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Return up to `top_k` nearest records in the repository's partition,
    /// sorted descending by similarity. An absent partition yields an empty
    /// list, not an error.
    pub async fn query(
        &self,
        repository_id: i64,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let partition_exists: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM index_partitions WHERE repository_id = ?",
        )
        .bind(repository_id)
        .fetch_one(&self.pool)
        .await?;

        if !partition_exists {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT id, embedding, file_path, start_line, end_line,
                   chunk_type, content_length, content_prefix
            FROM vector_records
            WHERE repository_id = ?
            "#,
        )
        .bind(repository_id)
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<(String, ScoredChunk)> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vector = blob_to_vec(&blob);
                // Cosine distance converted to a "higher is better" score,
                // clamped at zero.
                let distance = 1.0 - cosine_similarity(query_vector, &vector);
                let similarity = (1.0 - distance).max(0.0);

                let kind_str: String = row.get("chunk_type");
                let chunk_type = ChunkKind::parse(&kind_str).unwrap_or(ChunkKind::CodeBlock);

                (
                    row.get::<String, _>("id"),
                    ScoredChunk {
                        content: row.get("content_prefix"),
                        file_path: row.get("file_path"),
                        start_line: row.get("start_line"),
                        end_line: row.get("end_line"),
                        chunk_type,
                        content_length: row.get("content_length"),
                        similarity,
                    },
                )
            })
            .collect();

        // Do not trust insertion order: sort explicitly, id as tiebreak.
        scored.sort_by(|a, b| {
            b.1.similarity
                .partial_cmp(&a.1.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(top_k);

        Ok(scored.into_iter().map(|(_, chunk)| chunk).collect())
    }

    /// Remove all records for a repository. Idempotent: deleting an absent
    /// partition is a no-op.
    pub async fn delete_partition(&self, repository_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM vector_records WHERE repository_id = ?")
            .bind(repository_id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM index_partitions WHERE repository_id = ?")
            .bind(repository_id)
            .execute(&self.pool)
            .await?;

        tracing::info!(repository_id, "deleted vector partition");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordMetadata;
    use crate::{db, migrate};

    async fn test_index(dims: usize) -> (tempfile::TempDir, VectorIndex) {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = db::connect_path(&tmp.path().join("index.sqlite"))
            .await
            .unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        let index = VectorIndex::open(pool, dims).await.unwrap();
        (tmp, index)
    }

    fn record(id: &str, repository_id: i64, embedding: Vec<f32>, tag: &str) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            embedding,
            metadata: RecordMetadata {
                repository_id,
                file_path: format!("{}/lib.rs", tag),
                start_line: 1,
                end_line: 10,
                kind: ChunkKind::CodeBlock,
                content_length: 100,
                content_prefix: format!("content of {}", tag),
            },
        }
    }

    #[tokio::test]
    async fn test_partition_isolation() {
        let (_tmp, index) = test_index(3).await;
        index.ensure_partition(1).await.unwrap();
        index.ensure_partition(2).await.unwrap();

        index
            .upsert(1, &[record("a0", 1, vec![1.0, 0.0, 0.0], "repo-a")])
            .await
            .unwrap();
        index
            .upsert(2, &[record("b0", 2, vec![1.0, 0.0, 0.0], "repo-b")])
            .await
            .unwrap();

        // Query repo 1 with repo 2's exact vector: only repo 1 data returns.
        let hits = index.query(1, &[1.0, 0.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file_path, "repo-a/lib.rs");
    }

    #[tokio::test]
    async fn test_similarity_descending() {
        let (_tmp, index) = test_index(3).await;
        index.ensure_partition(1).await.unwrap();
        index
            .upsert(
                1,
                &[
                    record("far", 1, vec![0.0, 1.0, 0.0], "far"),
                    record("near", 1, vec![1.0, 0.1, 0.0], "near"),
                    record("mid", 1, vec![0.7, 0.7, 0.0], "mid"),
                ],
            )
            .await
            .unwrap();

        let hits = index.query(1, &[1.0, 0.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].file_path, "near/lib.rs");
        for pair in hits.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
    }

    #[tokio::test]
    async fn test_query_absent_partition_is_empty() {
        let (_tmp, index) = test_index(3).await;
        let hits = index.query(99, &[1.0, 0.0, 0.0], 5).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_delete_partition_idempotent() {
        let (_tmp, index) = test_index(3).await;
        index.ensure_partition(1).await.unwrap();
        index
            .upsert(1, &[record("a0", 1, vec![1.0, 0.0, 0.0], "repo-a")])
            .await
            .unwrap();

        index.delete_partition(1).await.unwrap();
        index.delete_partition(1).await.unwrap();

        let hits = index.query(1, &[1.0, 0.0, 0.0], 5).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_ensure_partition_idempotent() {
        let (_tmp, index) = test_index(3).await;
        index.ensure_partition(1).await.unwrap();
        index.ensure_partition(1).await.unwrap();
    }

    #[tokio::test]
    async fn test_dims_mismatch_rejected_at_open() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = db::connect_path(&tmp.path().join("index.sqlite"))
            .await
            .unwrap();
        migrate::run_migrations(&pool).await.unwrap();

        VectorIndex::open(pool.clone(), 384).await.unwrap();
        let reopened = VectorIndex::open(pool, 768).await;
        assert!(reopened.is_err());
    }

    #[tokio::test]
    async fn test_upsert_rejects_wrong_dims() {
        let (_tmp, index) = test_index(3).await;
        index.ensure_partition(1).await.unwrap();
        let result = index
            .upsert(1, &[record("bad", 1, vec![1.0, 0.0], "short")])
            .await;
        assert!(matches!(result, Err(PipelineError::IndexWrite(_))));
    }

    #[tokio::test]
    async fn test_upsert_spans_multiple_batches() {
        let (_tmp, index) = test_index(3).await;
        index.ensure_partition(1).await.unwrap();

        let records: Vec<VectorRecord> = (0..250)
            .map(|i| {
                record(
                    &format!("r{}", i),
                    1,
                    vec![1.0, i as f32 / 250.0, 0.0],
                    &format!("file{}", i),
                )
            })
            .collect();
        index.upsert(1, &records).await.unwrap();

        let hits = index.query(1, &[1.0, 0.0, 0.0], 5).await.unwrap();
        assert_eq!(hits.len(), 5);
    }
}
