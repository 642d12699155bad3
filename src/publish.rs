//! Commit output files back to a repository.
//!
//! Each file is committed on its own: an existing file is updated in place
//! (`Update <name>`), a missing one is created (`Add <name>`). A failure on
//! one file does not stop the others; the caller gets a summary and decides
//! whether the run failed.

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::PathsConfig;
use crate::github::{CodeHost, FileCommit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishAction {
    Created,
    Updated,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishSummary {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl PublishSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

fn file_name(repo_path: &str) -> &str {
    repo_path.rsplit('/').next().unwrap_or(repo_path)
}

/// Normalize a configured relative path to a repository path.
pub fn repo_path(relative: &str) -> String {
    relative
        .replace('\\', "/")
        .trim_start_matches("./")
        .trim_start_matches('/')
        .to_string()
}

/// Commit one local file to `repo` at `repo_path` on `branch`.
pub fn commit_file(
    host: &dyn CodeHost,
    repo: &str,
    branch: &str,
    local: &Path,
    repo_path: &str,
) -> Result<PublishAction> {
    let content =
        std::fs::read(local).with_context(|| format!("Failed to read {}", local.display()))?;

    let existing = match host.file_sha(repo, repo_path, branch) {
        Ok(sha) => sha,
        Err(e) => {
            tracing::warn!(path = repo_path, error = %e, "could not read existing file; creating");
            None
        }
    };

    let (action, message) = match existing {
        Some(_) => (PublishAction::Updated, format!("Update {}", file_name(repo_path))),
        None => (PublishAction::Created, format!("Add {}", file_name(repo_path))),
    };
    host.put_file(
        repo,
        &FileCommit {
            path: repo_path,
            branch,
            message,
            content: &content,
            sha: existing,
        },
    )?;
    tracing::info!(path = repo_path, branch, ?action, "committed file");
    Ok(action)
}

/// Commit every file in `relative_paths` (resolved against `paths.root`).
pub fn publish_files(
    host: &dyn CodeHost,
    repo: &str,
    branch: &str,
    paths: &PathsConfig,
    relative_paths: &[&str],
) -> PublishSummary {
    let mut summary = PublishSummary::default();
    for relative in relative_paths {
        let target = repo_path(relative);
        match commit_file(host, repo, branch, &paths.local(relative), &target) {
            Ok(PublishAction::Created) => summary.created.push(target),
            Ok(PublishAction::Updated) => summary.updated.push(target),
            Err(e) => {
                tracing::error!(path = %target, error = %format!("{:#}", e), "failed to commit file");
                summary.failed.push((target, format!("{:#}", e)));
            }
        }
    }
    summary
}
