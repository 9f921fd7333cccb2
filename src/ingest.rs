//! Ingestion orchestration.
//!
//! Drives one repository through the full pipeline — acquire, extract,
//! chunk, embed, store — while advancing its status:
//!
//! ```text
//! PENDING --(run)--> PROCESSING --(success)--> READY
//!                         \--(any failure)--> FAILED
//! ```
//!
//! Every run reaches exactly one terminal state and releases its scratch
//! checkout on all paths. Failures are recorded as truncated error text on
//! the repository row and never propagate past this module.
//!
//! Re-running against an already-ingested repository appends a fresh set of
//! records to its partition without replacing prior ones; callers that want
//! a clean slate delete the partition first. The orchestrator also does not
//! serialize concurrent runs for the same repository — triggering layers
//! are expected to check status before starting another run.

use std::sync::Arc;

use crate::acquire::Acquirer;
use crate::embedding::{embed_chunks, Embedder};
use crate::error::{display_for_repo, PipelineError};
use crate::extract::extract_chunks;
use crate::index::VectorIndex;
use crate::models::{
    truncate_chars, EmbeddedChunk, RecordMetadata, RepoStatus, Repository, VectorRecord,
    CONTENT_PREFIX_MAX,
};
use crate::repos::RepoStore;

/// Terminal result of one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Ready { chunks: usize },
    Failed { error: String },
}

/// Coordinates the ingestion pipeline with explicitly injected services.
#[derive(Clone)]
pub struct Orchestrator {
    repos: RepoStore,
    index: VectorIndex,
    embedder: Arc<dyn Embedder>,
    acquirer: Arc<dyn Acquirer>,
    max_chunk_size: usize,
    embed_batch_size: usize,
}

impl Orchestrator {
    pub fn new(
        repos: RepoStore,
        index: VectorIndex,
        embedder: Arc<dyn Embedder>,
        acquirer: Arc<dyn Acquirer>,
        max_chunk_size: usize,
        embed_batch_size: usize,
    ) -> Self {
        Self {
            repos,
            index,
            embedder,
            acquirer,
            max_chunk_size,
            embed_batch_size,
        }
    }

    /// Submit a run as a background task; the handle is intentionally
    /// dropped. The run still reaches one terminal state on its own.
    pub fn spawn(&self, repository_id: i64) {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            orchestrator.run(repository_id).await;
        });
    }

    /// Execute one full ingestion run for `repository_id`.
    pub async fn run(&self, repository_id: i64) -> IngestOutcome {
        let repo = match self.repos.get(repository_id).await {
            Ok(Some(repo)) => repo,
            Ok(None) => {
                tracing::error!(repository_id, "ingestion requested for unknown repository");
                return IngestOutcome::Failed {
                    error: format!("repository {} not found", repository_id),
                };
            }
            Err(e) => {
                tracing::error!(repository_id, error = %e, "failed to load repository");
                return IngestOutcome::Failed {
                    error: e.to_string(),
                };
            }
        };

        tracing::info!(repository_id, url = %repo.github_url, "starting ingestion");

        if let Err(e) = self
            .repos
            .set_status(repository_id, RepoStatus::Processing, None)
            .await
        {
            tracing::error!(repository_id, error = %e, "failed to mark repository PROCESSING");
            return IngestOutcome::Failed {
                error: e.to_string(),
            };
        }

        let checkout = match self.acquirer.acquire(&repo.github_url).await {
            Ok(checkout) => checkout,
            Err(e) => return self.record_failure(repository_id, &e).await,
        };

        let result = self.process_checkout(&repo, &checkout.path).await;

        // The scratch directory is released whatever happened above.
        self.acquirer.cleanup(&checkout).await;

        match result {
            Ok(chunks) => {
                if let Err(e) = self
                    .repos
                    .set_status(repository_id, RepoStatus::Ready, None)
                    .await
                {
                    tracing::error!(repository_id, error = %e, "failed to mark repository READY");
                    return IngestOutcome::Failed {
                        error: e.to_string(),
                    };
                }
                tracing::info!(repository_id, chunks, "ingestion complete, repository READY");
                IngestOutcome::Ready { chunks }
            }
            Err(e) => self.record_failure(repository_id, &e).await,
        }
    }

    async fn process_checkout(
        &self,
        repo: &Repository,
        checkout_path: &std::path::Path,
    ) -> Result<usize, PipelineError> {
        let chunks = extract_chunks(checkout_path, self.max_chunk_size);
        if chunks.is_empty() {
            return Err(PipelineError::NoSupportedFiles);
        }

        let chunk_count = chunks.len();
        tracing::info!(repository_id = repo.id, chunks = chunk_count, "embedding chunks");

        let embedded = embed_chunks(self.embedder.as_ref(), chunks, self.embed_batch_size).await?;

        self.index.ensure_partition(repo.id).await?;
        let records = to_records(repo.id, embedded);
        self.index.upsert(repo.id, &records).await?;

        Ok(chunk_count)
    }

    async fn record_failure(&self, repository_id: i64, err: &PipelineError) -> IngestOutcome {
        let message = display_for_repo(err);
        tracing::error!(repository_id, error = %message, "ingestion failed");

        if let Err(e) = self
            .repos
            .set_status(repository_id, RepoStatus::Failed, Some(&message))
            .await
        {
            tracing::error!(repository_id, error = %e, "failed to record FAILED status");
        }

        IngestOutcome::Failed { error: message }
    }
}

/// Convert embedded chunks into persistable records for one repository.
fn to_records(repository_id: i64, embedded: Vec<EmbeddedChunk>) -> Vec<VectorRecord> {
    embedded
        .into_iter()
        .enumerate()
        .map(|(i, e)| VectorRecord {
            id: format!(
                "repo_{}_chunk_{}_{}",
                repository_id, e.chunk.chunk_index, i
            ),
            embedding: e.embedding,
            metadata: RecordMetadata {
                repository_id,
                file_path: e.chunk.file_path,
                start_line: e.chunk.start_line,
                end_line: e.chunk.end_line,
                kind: e.chunk.kind,
                content_length: e.content_length,
                content_prefix: truncate_chars(&e.chunk.content, CONTENT_PREFIX_MAX).to_string(),
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkKind, CodeChunk};

    fn embedded(index: i64, content: &str) -> EmbeddedChunk {
        EmbeddedChunk {
            chunk: CodeChunk::new(
                content.to_string(),
                "src/lib.rs".to_string(),
                index,
                1,
                2,
                ChunkKind::CodeBlock,
            ),
            embedding: vec![0.0, 1.0],
            content_length: content.chars().count() as i64,
        }
    }

    #[test]
    fn test_record_ids_unique_across_sequence() {
        let records = to_records(7, vec![embedded(0, "a"), embedded(0, "b"), embedded(1, "c")]);
        assert_eq!(records[0].id, "repo_7_chunk_0_0");
        assert_eq!(records[1].id, "repo_7_chunk_0_1");
        assert_eq!(records[2].id, "repo_7_chunk_1_2");
    }

    #[test]
    fn test_record_content_prefix_truncated() {
        let long = "y".repeat(5000);
        let records = to_records(1, vec![embedded(0, &long)]);
        assert_eq!(records[0].metadata.content_prefix.chars().count(), 1000);
        assert_eq!(records[0].metadata.content_length, 5000);
    }
}
