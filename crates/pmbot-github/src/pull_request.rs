use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::RepoRef;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestFile {
    pub filename: String,
    pub status: String,
    pub additions: u64,
    pub deletions: u64,
    pub patch: Option<String>,
}

/// Everything the review summarizer needs about one merged pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestDescriptor {
    pub repo: RepoRef,
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub author: String,
    pub html_url: Option<String>,
    pub merged_at: DateTime<Utc>,
    pub additions: u64,
    pub deletions: u64,
    pub changed_files: u64,
    pub commits: u64,
    pub files: Vec<PullRequestFile>,
}

impl PullRequestDescriptor {
    /// Stable identifier such as `owner/repo#42`.
    pub fn id(&self) -> String {
        format!("{}#{}", self.repo, self.number)
    }

    pub fn changed_lines(&self) -> u64 {
        self.additions.saturating_add(self.deletions)
    }
}
