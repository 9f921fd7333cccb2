//! Walks an acquired working copy and chunks every supported source file.
//!
//! Infrastructure directories and non-source extensions are skipped, files
//! over 1 MiB are ignored, and content is decoded leniently so a stray
//! binary-ish file cannot fail the whole walk.

use std::path::Path;
use walkdir::WalkDir;

use crate::chunker::chunk_file;
use crate::models::CodeChunk;

/// File extensions treated as source code.
const SUPPORTED_EXTENSIONS: [&str; 31] = [
    "py", "js", "ts", "jsx", "tsx", "java", "cpp", "c", "cs", "go", "rs", "php", "rb", "swift",
    "kt", "scala", "html", "css", "scss", "sass", "vue", "svelte", "dart", "r", "m", "mm", "h",
    "hpp", "cc", "cxx", "sql",
];

/// Version-control metadata, dependency trees, build output, caches.
const IGNORE_DIRS: [&str; 18] = [
    ".git",
    "node_modules",
    "__pycache__",
    ".venv",
    "venv",
    "build",
    "dist",
    ".next",
    ".nuxt",
    "coverage",
    ".pytest_cache",
    "vendor",
    "target",
    "bin",
    "obj",
    ".gradle",
    ".idea",
    ".vscode",
];

const MAX_FILE_SIZE: u64 = 1024 * 1024;

fn is_ignored_dir(name: &str) -> bool {
    IGNORE_DIRS.contains(&name)
}

fn is_supported_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Extract and chunk all supported files under `root`.
///
/// Chunks are concatenated across files in deterministic (sorted) walk
/// order; `chunk_index` restarts at zero per file. An unreadable file is
/// skipped with a warning rather than failing the walk.
pub fn extract_chunks(root: &Path, max_chunk_size: usize) -> Vec<CodeChunk> {
    let mut chunks = Vec::new();
    let mut files_seen = 0usize;

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.file_type().is_dir() {
                entry
                    .file_name()
                    .to_str()
                    .map(|name| !is_ignored_dir(name))
                    .unwrap_or(true)
            } else {
                true
            }
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if !is_supported_file(path) {
            continue;
        }

        match entry.metadata() {
            Ok(meta) if meta.len() > MAX_FILE_SIZE => continue,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping file without metadata");
                continue;
            }
        }

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable file");
                continue;
            }
        };

        // Lenient decode: undecodable bytes become replacement characters.
        let content = String::from_utf8_lossy(&bytes);
        if content.trim().is_empty() {
            continue;
        }

        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        chunks.extend(chunk_file(&content, &rel_str, max_chunk_size));
        files_seen += 1;

        if files_seen % 50 == 0 {
            tracing::info!(files = files_seen, chunks = chunks.len(), "extraction progress");
        }
    }

    tracing::info!(files = files_seen, chunks = chunks.len(), "extraction complete");
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_extracts_supported_files_only() {
        let tmp = tempfile::TempDir::new().unwrap();
        write(tmp.path(), "src/main.rs", "fn main() {}");
        write(tmp.path(), "app.py", "print('hi')");
        write(tmp.path(), "README.md", "# readme");
        write(tmp.path(), "logo.png", "not really an image");

        let chunks = extract_chunks(tmp.path(), 1000);
        let paths: Vec<&str> = chunks.iter().map(|c| c.file_path.as_str()).collect();
        assert!(paths.contains(&"src/main.rs"));
        assert!(paths.contains(&"app.py"));
        assert!(!paths.iter().any(|p| p.ends_with(".md")));
        assert!(!paths.iter().any(|p| p.ends_with(".png")));
    }

    #[test]
    fn test_skips_infrastructure_directories() {
        let tmp = tempfile::TempDir::new().unwrap();
        write(tmp.path(), "lib/core.js", "module.exports = 1;");
        write(tmp.path(), "node_modules/dep/index.js", "module.exports = 2;");
        write(tmp.path(), ".git/hooks/pre-commit.py", "print('hook')");
        write(tmp.path(), "target/debug/gen.rs", "fn gen() {}");

        let chunks = extract_chunks(tmp.path(), 1000);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].file_path, "lib/core.js");
    }

    #[test]
    fn test_skips_oversized_and_blank_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        write(tmp.path(), "big.rs", &"x".repeat(2 * 1024 * 1024));
        write(tmp.path(), "blank.rs", "   \n\t\n  ");
        write(tmp.path(), "ok.rs", "fn ok() {}");

        let chunks = extract_chunks(tmp.path(), 1000);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].file_path, "ok.rs");
    }

    #[test]
    fn test_tolerates_invalid_utf8() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("weird.c");
        fs::write(&path, [b'i', b'n', b't', 0xff, 0xfe, b';']).unwrap();

        let chunks = extract_chunks(tmp.path(), 1000);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].content.starts_with("int"));
    }

    #[test]
    fn test_deterministic_order() {
        let tmp = tempfile::TempDir::new().unwrap();
        write(tmp.path(), "b.rs", "fn b() {}");
        write(tmp.path(), "a.rs", "fn a() {}");
        write(tmp.path(), "c.rs", "fn c() {}");

        let first = extract_chunks(tmp.path(), 1000);
        let second = extract_chunks(tmp.path(), 1000);
        let order: Vec<&str> = first.iter().map(|c| c.file_path.as_str()).collect();
        assert_eq!(order, vec!["a.rs", "b.rs", "c.rs"]);
        assert_eq!(
            order,
            second
                .iter()
                .map(|c| c.file_path.as_str())
                .collect::<Vec<_>>()
        );
    }
}
