//! Version control access used by the learning agent.

mod git;

pub use git::GitCli;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::VcsError;

/// One commit from a repository's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub hash: String,
    pub author: String,
    /// Author date, ISO 8601.
    pub date: String,
    pub message: String,
}

/// Read-only access to a repository's history.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// The `limit` most recent commits on the current branch, newest first.
    async fn recent_commits(&self, repo: &Path, limit: usize) -> Result<Vec<Commit>, VcsError>;

    /// The patch introduced by `hash`.
    async fn commit_diff(&self, repo: &Path, hash: &str) -> Result<String, VcsError>;
}
