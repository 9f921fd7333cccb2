//! Core data models for the ingestion and retrieval pipeline.
//!
//! These types represent the repositories, chunks, and vector records that
//! flow from source acquisition through embedding into the vector index,
//! and back out as scored retrieval results.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a registered repository.
///
/// Transitions: `Pending --(start)--> Processing --(success)--> Ready`,
/// `Processing --(failure)--> Failed`. `Failed` is only reachable from
/// `Processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RepoStatus {
    Pending,
    Processing,
    Ready,
    Failed,
}

impl RepoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepoStatus::Pending => "PENDING",
            RepoStatus::Processing => "PROCESSING",
            RepoStatus::Ready => "READY",
            RepoStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(RepoStatus::Pending),
            "PROCESSING" => Some(RepoStatus::Processing),
            "READY" => Some(RepoStatus::Ready),
            "FAILED" => Some(RepoStatus::Failed),
            _ => None,
        }
    }
}

/// A registered repository and its processing state.
///
/// Identity and creation are owned by the surrounding CRUD layer; the
/// ingestion pipeline only reads and advances `status`/`error_message`.
#[derive(Debug, Clone, Serialize)]
pub struct Repository {
    pub id: i64,
    pub name: String,
    pub github_url: String,
    pub status: RepoStatus,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// How a chunk was produced by the chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    /// The whole file fit under the size threshold.
    FullFile,
    /// A slice of a larger file split on size or declaration boundaries.
    CodeBlock,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::FullFile => "full_file",
            ChunkKind::CodeBlock => "code_block",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "full_file" => Some(ChunkKind::FullFile),
            "code_block" => Some(ChunkKind::CodeBlock),
            _ => None,
        }
    }
}

/// A contiguous line-range slice of one source file.
///
/// `start_line` and `end_line` are 1-based and inclusive. Chunks are never
/// mutated after creation; they are owned by the ingestion run that produced
/// them until handed to the vector index.
#[derive(Debug, Clone)]
pub struct CodeChunk {
    pub content: String,
    pub file_path: String,
    pub chunk_index: i64,
    pub start_line: i64,
    pub end_line: i64,
    pub kind: ChunkKind,
}

impl CodeChunk {
    pub fn new(
        content: String,
        file_path: String,
        chunk_index: i64,
        start_line: i64,
        end_line: i64,
        kind: ChunkKind,
    ) -> Self {
        debug_assert!(start_line >= 1, "line numbers are 1-based");
        debug_assert!(start_line <= end_line, "chunk line range must be ordered");
        Self {
            content,
            file_path,
            chunk_index,
            start_line,
            end_line,
            kind,
        }
    }
}

/// A chunk paired with its embedding vector.
///
/// Transient: exists only in memory between the embedder and the index.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: CodeChunk,
    pub embedding: Vec<f32>,
    pub content_length: i64,
}

/// Metadata stored alongside each vector in the index.
#[derive(Debug, Clone)]
pub struct RecordMetadata {
    pub repository_id: i64,
    pub file_path: String,
    pub start_line: i64,
    pub end_line: i64,
    pub kind: ChunkKind,
    pub content_length: i64,
    /// First [`CONTENT_PREFIX_MAX`] characters of the chunk content.
    pub content_prefix: String,
}

/// A persisted vector plus its metadata, scoped to one repository partition.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub metadata: RecordMetadata,
}

/// Maximum characters of chunk content carried in record metadata.
pub const CONTENT_PREFIX_MAX: usize = 1000;

/// A retrieval hit: stored metadata plus a "higher is better" similarity.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub content: String,
    pub file_path: String,
    pub start_line: i64,
    pub end_line: i64,
    pub chunk_type: ChunkKind,
    pub content_length: i64,
    pub similarity: f32,
}

/// Truncate to at most `max` characters without splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
