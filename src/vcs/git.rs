//! `git` CLI runner.

use std::path::Path;
use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{Commit, VersionControl};
use crate::error::VcsError;

/// Field separator for `git log --format`.
const FIELD_SEP: char = '\u{1f}';

/// Diffs larger than this are truncated before they reach the generator.
const MAX_DIFF_BYTES: usize = 64 * 1024;

/// [`VersionControl`] backed by the `git` binary on `PATH`.
#[derive(Debug, Clone, Default)]
pub struct GitCli;

impl GitCli {
    pub fn new() -> Self {
        Self
    }
}

/// Run `git <args>` in `repo` and return trimmed stdout.
async fn run_git(repo: &Path, args: &[&str]) -> Result<String, VcsError> {
    if !repo.is_dir() {
        return Err(VcsError::RepositoryNotFound(repo.to_path_buf()));
    }

    let output: Output = Command::new("git")
        .current_dir(repo)
        .args(args)
        .output()
        .await?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.contains("not a git repository") {
            return Err(VcsError::RepositoryNotFound(repo.to_path_buf()));
        }
        Err(VcsError::CommandFailed {
            command: args.first().unwrap_or(&"").to_string(),
            stderr,
        })
    }
}

fn parse_log_line(line: &str) -> Result<Commit, VcsError> {
    let mut fields = line.splitn(4, FIELD_SEP);
    match (fields.next(), fields.next(), fields.next(), fields.next()) {
        (Some(hash), Some(author), Some(date), Some(message)) if !hash.is_empty() => Ok(Commit {
            hash: hash.to_string(),
            author: author.to_string(),
            date: date.to_string(),
            message: message.to_string(),
        }),
        _ => Err(VcsError::Parse(line.to_string())),
    }
}

fn truncate_diff(mut diff: String) -> String {
    if diff.len() > MAX_DIFF_BYTES {
        let mut cut = MAX_DIFF_BYTES;
        while !diff.is_char_boundary(cut) {
            cut -= 1;
        }
        diff.truncate(cut);
        diff.push_str("\n[diff truncated]");
    }
    diff
}

#[async_trait]
impl VersionControl for GitCli {
    async fn recent_commits(&self, repo: &Path, limit: usize) -> Result<Vec<Commit>, VcsError> {
        let count = format!("--max-count={limit}");
        let format = "--format=%H%x1f%an%x1f%aI%x1f%s";
        let stdout = run_git(repo, &["log", &count, format]).await?;
        let commits = stdout
            .lines()
            .filter(|l| !l.is_empty())
            .map(parse_log_line)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(repo = %repo.display(), count = commits.len(), "Listed commits");
        Ok(commits)
    }

    async fn commit_diff(&self, repo: &Path, hash: &str) -> Result<String, VcsError> {
        if hash.starts_with('-') {
            return Err(VcsError::Parse(format!("invalid commit hash: {hash}")));
        }
        let diff = run_git(repo, &["show", "--format=", "--patch", "--no-color", hash]).await?;
        Ok(truncate_diff(diff))
    }
}
