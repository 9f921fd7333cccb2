//! Query-time retrieval.
//!
//! Embeds a free-text question in the same space as ingested chunks and
//! returns the nearest records from the repository's partition. Index
//! failures degrade to an empty result — "no matches" is a first-class
//! outcome here, while a query that cannot be embedded is a hard error.

use anyhow::Result;

use crate::embedding::{embed_query, Embedder};
use crate::index::VectorIndex;
use crate::models::ScoredChunk;

/// Return the `top_k` chunks most similar to `query`, best first.
///
/// Callers are responsible for ensuring the repository is READY; a
/// repository with no partition (or no vectors) yields an empty list.
pub async fn retrieve(
    embedder: &dyn Embedder,
    index: &VectorIndex,
    repository_id: i64,
    query: &str,
    top_k: usize,
) -> Result<Vec<ScoredChunk>> {
    let query_vector = embed_query(embedder, query).await?;

    match index.query(repository_id, &query_vector, top_k).await {
        Ok(hits) => {
            tracing::info!(repository_id, hits = hits.len(), "retrieval complete");
            Ok(hits)
        }
        Err(e) => {
            tracing::warn!(repository_id, error = %e, "index query failed, returning no matches");
            Ok(Vec::new())
        }
    }
}
