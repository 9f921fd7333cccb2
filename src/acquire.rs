//! Source acquisition: shallow clone into a scoped scratch directory.
//!
//! [`GitAcquirer`] materializes a depth-1 working copy of a remote
//! repository under a uniquely named scratch directory and hands the caller
//! a [`SourceCheckout`] it must release via [`Acquirer::cleanup`] once the
//! run finishes, successful or not. A failed clone removes any partially
//! created directory before the error propagates.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use uuid::Uuid;

use crate::error::PipelineError;

/// A materialized working copy with a bounded lifetime.
#[derive(Debug)]
pub struct SourceCheckout {
    pub path: PathBuf,
}

/// Fetches a repository's file tree into local scratch space.
#[async_trait]
pub trait Acquirer: Send + Sync {
    async fn acquire(&self, github_url: &str) -> Result<SourceCheckout, PipelineError>;

    /// Release the checkout's scratch directory. Best-effort: failures are
    /// logged and never escalated.
    async fn cleanup(&self, checkout: &SourceCheckout);
}

/// Acquirer that shells out to the `git` CLI for a shallow clone.
pub struct GitAcquirer {
    scratch_dir: PathBuf,
}

impl GitAcquirer {
    pub fn new(scratch_dir: PathBuf) -> Self {
        Self { scratch_dir }
    }

    fn checkout_dir(&self, github_url: &str) -> PathBuf {
        // Hash keeps the name readable per-repo; the UUID keeps concurrent
        // runs for the same URL from colliding.
        let dir_name = format!(
            "codequery-{}-{}",
            short_hash(github_url),
            Uuid::new_v4().simple()
        );
        self.scratch_dir.join(dir_name)
    }
}

#[async_trait]
impl Acquirer for GitAcquirer {
    async fn acquire(&self, github_url: &str) -> Result<SourceCheckout, PipelineError> {
        let dest = self.checkout_dir(github_url);

        std::fs::create_dir_all(&dest)
            .map_err(|e| PipelineError::Acquisition(format!("create scratch dir: {}", e)))?;

        tracing::info!(url = %github_url, dest = %dest.display(), "cloning repository");

        let output = Command::new("git")
            .args(["clone", "--depth", "1", "--single-branch"])
            .arg(github_url)
            .arg(&dest)
            .output()
            .await;

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                remove_scratch(&dest).await;
                return Err(PipelineError::Acquisition(format!(
                    "failed to execute 'git clone' (is git installed?): {}",
                    e
                )));
            }
        };

        if !output.status.success() {
            remove_scratch(&dest).await;
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Acquisition(format!(
                "git clone failed: {}",
                stderr.trim()
            )));
        }

        Ok(SourceCheckout { path: dest })
    }

    async fn cleanup(&self, checkout: &SourceCheckout) {
        remove_scratch(&checkout.path).await;
    }
}

async fn remove_scratch(path: &Path) {
    if !path.exists() {
        return;
    }
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => tracing::info!(path = %path.display(), "removed scratch directory"),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove scratch directory");
        }
    }
}

fn short_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())[..12].to_string()
}
