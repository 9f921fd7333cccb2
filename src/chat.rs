//! Answer generation over retrieved chunks.
//!
//! Wraps the Gemini `generateContent` REST endpoint. When no API key is
//! configured, or the call fails, the engine degrades to a deterministic
//! response that lists the retrieved code sections, so retrieval results
//! are always surfaced to the user.

use serde::Serialize;
use std::time::Duration;

use crate::models::{truncate_chars, ScoredChunk};

const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// A citation attached to a generated answer.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub file_path: String,
    pub start_line: i64,
    pub end_line: i64,
    pub similarity: f32,
    pub preview: String,
}

/// The generation collaborator's full output.
#[derive(Debug, Clone, Serialize)]
pub struct ChatOutcome {
    pub response: String,
    pub sources: Vec<SourceRef>,
    pub context_chunks_used: usize,
    pub repository_name: String,
    pub model_used: String,
    pub success: bool,
}

pub struct ChatEngine {
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
}

impl ChatEngine {
    pub fn new(model: String, api_key: Option<String>) -> Self {
        if api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY not set, chat will use fallback responses");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();

        Self {
            api_key,
            model,
            client,
        }
    }

    pub fn from_env(model: String) -> Self {
        Self::new(model, std::env::var("GEMINI_API_KEY").ok())
    }

    /// Produce an answer for `query` grounded in `chunks`.
    ///
    /// Never fails: generation errors fall back to a context listing.
    pub async fn generate_response(
        &self,
        query: &str,
        chunks: &[ScoredChunk],
        repository_name: &str,
    ) -> ChatOutcome {
        let Some(api_key) = &self.api_key else {
            return self.fallback_response(query, chunks, repository_name);
        };

        let prompt = self.build_prompt(query, chunks, repository_name);

        match self.call_gemini(api_key, &prompt).await {
            Ok(text) => ChatOutcome {
                response: text,
                sources: build_sources(chunks),
                context_chunks_used: chunks.len(),
                repository_name: repository_name.to_string(),
                model_used: self.model.clone(),
                success: true,
            },
            Err(e) => {
                tracing::error!(error = %e, "generation call failed");
                let msg = e.to_string();
                if msg.contains("429") || msg.to_lowercase().contains("quota") {
                    self.quota_response(chunks, repository_name)
                } else {
                    self.fallback_response(query, chunks, repository_name)
                }
            }
        }
    }

    async fn call_gemini(&self, api_key: &str, prompt: &str) -> anyhow::Result<String> {
        let url = format!(
            "{}/{}:generateContent?key={}",
            GEMINI_ENDPOINT, self.model, api_key
        );
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
        });

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        json.pointer("/candidates/0/content/parts/0/text")
            .and_then(|t| t.as_str())
            .map(|t| t.to_string())
            .ok_or_else(|| anyhow::anyhow!("Gemini response missing candidate text"))
    }

    fn build_prompt(&self, query: &str, chunks: &[ScoredChunk], repository_name: &str) -> String {
        format!(
            "You are an expert code assistant analyzing the {} repository.\n\n\
             User Question: {}\n\n\
             Relevant Code Context:\n{}\n\n\
             Instructions:\n\
             1. Answer the user's question based on the provided code context\n\
             2. Reference specific files and line numbers when relevant\n\
             3. Explain code functionality clearly\n\
             4. If context is insufficient, say so clearly\n\
             5. Be specific and technical but also clear\n\n\
             Your Expert Analysis:",
            repository_name,
            query,
            prepare_context(chunks)
        )
    }

    fn quota_response(&self, chunks: &[ScoredChunk], repository_name: &str) -> ChatOutcome {
        let (min_sim, max_sim) = chunks.iter().fold((f32::MAX, f32::MIN), |(lo, hi), c| {
            (lo.min(c.similarity), hi.max(c.similarity))
        });
        let response = format!(
            "Generation quota exceeded, but {} relevant code sections were found:\n\n{}\n\n\
             The search found relevant code with similarity scores from {:.2} to {:.2}. \
             Please try again in a few minutes when quota resets.",
            chunks.len(),
            prepare_context(chunks),
            min_sim,
            max_sim
        );
        outcome(response, chunks, repository_name, "quota_exceeded")
    }

    fn fallback_response(
        &self,
        query: &str,
        chunks: &[ScoredChunk],
        repository_name: &str,
    ) -> ChatOutcome {
        let response = format!(
            "Found {} relevant code sections for: \"{}\"\n\n{}\n\n\
             Note: AI analysis requires API configuration. \
             The search results above show the most relevant code.",
            chunks.len(),
            query,
            prepare_context(chunks)
        );
        outcome(response, chunks, repository_name, "fallback")
    }
}

fn prepare_context(chunks: &[ScoredChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            format!(
                "\nCode Reference {}:\nFile: {}\nLines: {}-{}\nSimilarity: {:.2}\n{}\n",
                i + 1,
                chunk.file_path,
                chunk.start_line,
                chunk.end_line,
                chunk.similarity,
                chunk.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn build_sources(chunks: &[ScoredChunk]) -> Vec<SourceRef> {
    chunks
        .iter()
        .map(|chunk| SourceRef {
            file_path: chunk.file_path.clone(),
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            similarity: (chunk.similarity * 1000.0).round() / 1000.0,
            preview: format!("{}...", truncate_chars(&chunk.content, 200)),
        })
        .collect()
}

fn outcome(
    response: String,
    chunks: &[ScoredChunk],
    repository_name: &str,
    model_used: &str,
) -> ChatOutcome {
    ChatOutcome {
        response,
        sources: build_sources(chunks),
        context_chunks_used: chunks.len(),
        repository_name: repository_name.to_string(),
        model_used: model_used.to_string(),
        success: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkKind;

    fn chunk(path: &str, similarity: f32) -> ScoredChunk {
        ScoredChunk {
            content: "fn handler() { /* ... */ }".to_string(),
            file_path: path.to_string(),
            start_line: 10,
            end_line: 20,
            chunk_type: ChunkKind::CodeBlock,
            content_length: 26,
            similarity,
        }
    }

    #[tokio::test]
    async fn test_no_api_key_falls_back_with_sources() {
        let engine = ChatEngine::new("gemini-2.0-flash".to_string(), None);
        let chunks = vec![chunk("src/server.rs", 0.91), chunk("src/routes.rs", 0.85)];

        let result = engine
            .generate_response("how are requests routed?", &chunks, "demo")
            .await;

        assert!(result.success);
        assert_eq!(result.model_used, "fallback");
        assert_eq!(result.context_chunks_used, 2);
        assert!(result.response.contains("how are requests routed?"));
        assert!(result.response.contains("src/server.rs"));
        assert_eq!(result.sources.len(), 2);
        assert_eq!(result.sources[0].file_path, "src/server.rs");
        assert!(result.sources[0].preview.ends_with("..."));
    }

    #[test]
    fn test_similarity_rounded_to_three_places() {
        let sources = build_sources(&[chunk("a.rs", 0.123_456)]);
        assert!((sources[0].similarity - 0.123).abs() < 1e-6);
    }

    #[test]
    fn test_context_numbered_per_chunk() {
        let context = prepare_context(&[chunk("a.rs", 0.9), chunk("b.rs", 0.8)]);
        assert!(context.contains("Code Reference 1:"));
        assert!(context.contains("Code Reference 2:"));
        assert!(context.contains("Lines: 10-20"));
    }
}
