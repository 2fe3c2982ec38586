//! Source-host side of the bot: GitHub REST access, merged pull-request
//! polling with a persisted cursor, and the diff shaping used before a pull
//! request is sent for review.

use std::fmt;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

pub mod diff_analysis;
mod github_api_client;
mod poll_cursor_store;
mod poller;
mod pull_request;

pub use diff_analysis::{
    categorize_changes, prepare_review_diff, should_skip_file, ChangeCategory, Complexity,
    DiffLimits, ReviewDiff,
};
pub use github_api_client::{
    GithubApiClient, GithubPullDetail, GithubPullFile, GithubPullSummary, GithubUser,
    DEFAULT_PAGE_SIZE,
};
pub use poll_cursor_store::{PollCursor, PollCursorStore};
pub use poller::{PollCycleReport, RepoPollOutcome, SourceHostPoller};
pub use pull_request::{PullRequestDescriptor, PullRequestFile};

pub const POLL_CURSORS_FILE: &str = "poll-cursors.json";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let (owner, name) = trimmed.split_once('/').unwrap_or_default();
        let owner = owner.trim();
        let name = name.trim();
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            bail!("invalid repository '{raw}': expected owner/repo");
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}
