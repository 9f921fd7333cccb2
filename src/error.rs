//! Error taxonomy for the ingestion pipeline.
//!
//! Every failure in an ingestion run maps to one of these variants; the
//! orchestrator converts them into a FAILED status transition with a
//! truncated human-readable message and never lets them propagate further.
//! Index errors on the *query* path are not represented here — retrieval
//! degrades to an empty result instead (see [`crate::retrieve`]).

use thiserror::Error;

/// A hard failure in one step of an ingestion run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The remote could not be cloned: unreachable host, malformed URL, or
    /// a rejected clone.
    #[error("failed to acquire repository source: {0}")]
    Acquisition(String),

    /// The acquired tree produced zero chunks after filtering.
    #[error("no supported code files found in repository")]
    NoSupportedFiles,

    /// Embedding generation failed. Batch-atomic: no partial output exists.
    #[error("embedding generation failed: {0}")]
    Embedding(String),

    /// A vector index write failed. Batches already written are not rolled
    /// back; the partition may hold a partial ingestion.
    #[error("vector index write failed: {0}")]
    IndexWrite(String),
}

/// Maximum length of the error text persisted on a FAILED repository.
pub const ERROR_MESSAGE_MAX: usize = 500;

/// Render an error for storage on the repository row, truncated to
/// [`ERROR_MESSAGE_MAX`] characters.
pub fn display_for_repo(err: &PipelineError) -> String {
    let full = err.to_string();
    crate::models::truncate_chars(&full, ERROR_MESSAGE_MAX).to_string()
}
