//! Boundary-policy source chunker.
//!
//! Splits one file's text into line-addressed [`CodeChunk`]s. Files at or
//! under `max_chunk_size` bytes become a single `full_file` chunk; larger
//! files are scanned line by line and flushed either when the running byte
//! size reaches the threshold or when a declaration keyword opens a new
//! logical block. In the declaration case the boundary line is excluded
//! from the closed chunk and becomes the first line of the next one, so
//! line coverage stays contiguous with no duplication.

use crate::models::{ChunkKind, CodeChunk};

/// Language-agnostic declaration openers that force a chunk boundary.
const FUNCTION_KEYWORDS: [&str; 5] = ["def ", "function ", "class ", "interface ", "public class"];

fn is_function_start(line: &str) -> bool {
    let stripped = line.trim_start();
    FUNCTION_KEYWORDS.iter().any(|kw| stripped.starts_with(kw))
}

/// Split file content into an ordered, gap-free sequence of chunks.
///
/// `start_line`/`end_line` are 1-based inclusive; `chunk_index` counts from
/// zero within this file. Handles any well-formed text without error.
pub fn chunk_file(content: &str, file_path: &str, max_chunk_size: usize) -> Vec<CodeChunk> {
    let lines: Vec<&str> = content.split('\n').collect();

    // Small files are kept whole for better retrieval context.
    if content.len() <= max_chunk_size {
        return vec![CodeChunk::new(
            content.to_string(),
            file_path.to_string(),
            0,
            1,
            lines.len() as i64,
            ChunkKind::FullFile,
        )];
    }

    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_size = 0usize;
    let mut chunk_index = 0i64;
    let mut start_line = 1i64;

    for (i, &line) in lines.iter().enumerate() {
        let line_no = (i + 1) as i64;
        current.push(line);
        current_size += line.len() + 1; // +1 for the newline

        let boundary = is_function_start(line);

        // A single buffered line is never flushed on its own: a declaration
        // opening the buffer starts a chunk rather than closing one.
        if (current_size >= max_chunk_size || boundary) && current.len() > 1 {
            if boundary {
                // The declaration line belongs to the next chunk.
                let body = current[..current.len() - 1].join("\n");
                chunks.push(CodeChunk::new(
                    body,
                    file_path.to_string(),
                    chunk_index,
                    start_line,
                    line_no - 1,
                    ChunkKind::CodeBlock,
                ));
                chunk_index += 1;
                start_line = line_no;
                current.clear();
                current.push(line);
                current_size = line.len() + 1;
            } else {
                chunks.push(CodeChunk::new(
                    current.join("\n"),
                    file_path.to_string(),
                    chunk_index,
                    start_line,
                    line_no,
                    ChunkKind::CodeBlock,
                ));
                chunk_index += 1;
                start_line = line_no + 1;
                current.clear();
                current_size = 0;
            }
        }
    }

    if !current.is_empty() {
        chunks.push(CodeChunk::new(
            current.join("\n"),
            file_path.to_string(),
            chunk_index,
            start_line,
            lines.len() as i64,
            ChunkKind::CodeBlock,
        ));
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_count(content: &str) -> i64 {
        content.split('\n').count() as i64
    }

    /// Ranges must cover 1..=line_count in order with no gaps or overlaps.
    fn assert_contiguous_coverage(content: &str, chunks: &[CodeChunk]) {
        assert!(!chunks.is_empty());
        assert_eq!(chunks[0].start_line, 1);
        for pair in chunks.windows(2) {
            assert_eq!(
                pair[1].start_line,
                pair[0].end_line + 1,
                "gap or overlap between chunks {} and {}",
                pair[0].chunk_index,
                pair[1].chunk_index
            );
        }
        assert_eq!(chunks.last().unwrap().end_line, line_count(content));
    }

    #[test]
    fn test_small_file_single_full_file_chunk() {
        let content = "fn main() {\n    println!(\"hi\");\n}\n";
        let chunks = chunk_file(content, "src/main.rs", 1000);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::FullFile);
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, line_count(content));
        assert_eq!(chunks[0].content, content);
    }

    #[test]
    fn test_exact_threshold_stays_single_chunk() {
        let content = "a".repeat(1000);
        let chunks = chunk_file(&content, "big.txt", 1000);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::FullFile);
    }

    #[test]
    fn test_over_threshold_splits_on_size() {
        // 40 fixed-width lines: the running size crosses the limit well
        // before the end of the file, forcing at least one mid-file flush.
        let content = (0..40)
            .map(|i| format!("let value_{:02} = compute_something(..); ", i))
            .collect::<Vec<_>>()
            .join("\n");
        assert!(content.len() > 1400);

        let chunks = chunk_file(&content, "calc.rs", 1000);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert_eq!(chunk.kind, ChunkKind::CodeBlock);
        }
        assert_contiguous_coverage(&content, &chunks);
    }

    #[test]
    fn test_declaration_boundary_moves_line_to_next_chunk() {
        let mut lines: Vec<String> = (0..30)
            .map(|i| format!("    total += weights[{}] * inputs[{}];", i, i))
            .collect();
        lines.insert(15, "def recompute(self):".to_string());
        let content = lines.join("\n");
        assert!(content.len() > 1000);

        let chunks = chunk_file(&content, "model.py", 1000);
        assert!(chunks.len() >= 2);
        assert_contiguous_coverage(&content, &chunks);

        // The chunk that starts at the declaration line must begin with it.
        let boundary_line_no = 16i64; // inserted at index 15, 1-based
        let opened = chunks
            .iter()
            .find(|c| c.start_line == boundary_line_no)
            .expect("a chunk should start at the declaration line");
        assert!(opened.content.starts_with("def recompute(self):"));

        // And the preceding chunk must end one line earlier, excluding it.
        let closed = chunks
            .iter()
            .find(|c| c.end_line == boundary_line_no - 1)
            .expect("a chunk should close just before the declaration");
        assert!(!closed.content.contains("def recompute"));
    }

    #[test]
    fn test_chunk_indices_sequential() {
        let content = (0..40)
            .map(|i| format!("class Widget{} {{ }} // padding padding padding", i))
            .collect::<Vec<_>>()
            .join("\n");
        let chunks = chunk_file(&content, "widgets.java", 1000);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i as i64);
        }
    }

    #[test]
    fn test_size_flush_keeps_current_line() {
        // No declarations: splits happen purely on size, so each closed
        // chunk ends at the line that tipped the counter.
        let content = (0..12)
            .map(|_| "x".repeat(120))
            .collect::<Vec<_>>()
            .join("\n");
        let chunks = chunk_file(&content, "blob.txt", 500);
        assert!(chunks.len() > 1);
        assert_contiguous_coverage(&content, &chunks);
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.content.len() + 1 >= 500);
        }
    }

    #[test]
    fn test_empty_content_never_errors() {
        let chunks = chunk_file("", "empty.rs", 1000);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::FullFile);
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 1);
    }

    #[test]
    fn test_indented_keyword_still_boundary() {
        let mut lines: Vec<String> = (0..30)
            .map(|i| format!("    console.log('line {} of the preamble');", i))
            .collect();
        lines.push("    function helper() {".to_string());
        lines.push("    }".to_string());
        let content = lines.join("\n");
        assert!(content.len() > 1000);

        let chunks = chunk_file(&content, "app.js", 1000);
        let helper_chunk = chunks
            .iter()
            .find(|c| c.content.trim_start().starts_with("function helper"))
            .expect("helper should open a chunk");
        assert_eq!(helper_chunk.start_line, 31);
    }
}
