//! Merged pull-request poller.
//!
//! Each cycle walks the closed pull requests of every watched repository,
//! newest update first, until it reaches entries the repository's cursor
//! already covers. Newly merged pull requests are handed to the review queue in
//! merge-time order and only then is the cursor advanced and flushed.
//!
//! Delivery is at-least-once. A crash between the hand-off and the cursor flush
//! repeats that batch on restart, and a failed hand-off leaves the cursor where
//! it was. Once the cursor has advanced, a review that later fails in the
//! summarizer is not attempted again.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::{mpsc, Mutex};

use crate::github_api_client::{GithubApiClient, GithubPullSummary};
use crate::poll_cursor_store::{PollCursor, PollCursorStore};
use crate::pull_request::{PullRequestDescriptor, PullRequestFile};
use crate::RepoRef;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollCycleReport {
    pub repositories: usize,
    pub discovered: usize,
    pub handed_off: usize,
    pub skipped_busy: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoPollOutcome {
    Completed { handed_off: usize },
    SkippedBusy,
}

pub struct SourceHostPoller {
    client: GithubApiClient,
    repos: Vec<RepoRef>,
    seed_lookback: ChronoDuration,
    cursors: Mutex<PollCursorStore>,
    repo_locks: HashMap<String, Arc<Mutex<()>>>,
}

impl SourceHostPoller {
    pub fn new(
        client: GithubApiClient,
        repos: Vec<RepoRef>,
        cursors: PollCursorStore,
        seed_lookback_hours: u32,
    ) -> Self {
        let repo_locks = repos
            .iter()
            .map(|repo| (repo.to_string(), Arc::new(Mutex::new(()))))
            .collect();
        Self {
            client,
            repos,
            seed_lookback: ChronoDuration::hours(i64::from(seed_lookback_hours)),
            cursors: Mutex::new(cursors),
            repo_locks,
        }
    }

    pub fn repos(&self) -> &[RepoRef] {
        &self.repos
    }

    pub async fn cursor(&self, repo: &RepoRef) -> Option<PollCursor> {
        self.cursors.lock().await.get(&repo.to_string()).cloned()
    }

    /// Polls every watched repository. A failing repository is logged and does
    /// not stop the others.
    pub async fn poll_once(&self, sink: &mpsc::Sender<PullRequestDescriptor>) -> PollCycleReport {
        let mut report = PollCycleReport {
            repositories: self.repos.len(),
            ..PollCycleReport::default()
        };
        for repo in &self.repos {
            match self.poll_repository(repo, sink, &mut report).await {
                Ok(RepoPollOutcome::Completed { handed_off }) => {
                    if handed_off > 0 {
                        tracing::info!(repo = %repo, handed_off, "merged pull requests queued for review");
                    }
                }
                Ok(RepoPollOutcome::SkippedBusy) => {
                    report.skipped_busy = report.skipped_busy.saturating_add(1);
                    tracing::warn!(repo = %repo, "previous poll still running; skipping repository this cycle");
                }
                Err(error) => {
                    report.failed = report.failed.saturating_add(1);
                    tracing::warn!(repo = %repo, error = %format!("{error:#}"), "repository poll failed; cursor left unchanged");
                }
            }
        }
        report
    }

    pub async fn poll_repository(
        &self,
        repo: &RepoRef,
        sink: &mpsc::Sender<PullRequestDescriptor>,
        report: &mut PollCycleReport,
    ) -> Result<RepoPollOutcome> {
        let repo_key = repo.to_string();
        let lock = self
            .repo_locks
            .get(&repo_key)
            .cloned()
            .ok_or_else(|| anyhow!("repository {repo_key} is not watched"))?;
        let Ok(_in_progress) = lock.try_lock_owned() else {
            return Ok(RepoPollOutcome::SkippedBusy);
        };

        let cursor = self.cursors.lock().await.get(&repo_key).cloned();
        let fresh = self
            .collect_new_merges(repo, cursor.as_ref(), Utc::now())
            .await?;
        report.discovered = report.discovered.saturating_add(fresh.len());
        if fresh.is_empty() {
            return Ok(RepoPollOutcome::Completed { handed_off: 0 });
        }

        let mut descriptors = Vec::with_capacity(fresh.len());
        for summary in fresh {
            descriptors.push(self.describe(repo, summary).await?);
        }

        let mut merged = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            merged.push((descriptor.number, descriptor.merged_at));
            sink.send(descriptor)
                .await
                .map_err(|_| anyhow!("review queue closed before hand-off completed"))?;
        }
        report.handed_off = report.handed_off.saturating_add(merged.len());

        let mut cursors = self.cursors.lock().await;
        if cursors.advance(&repo_key, &merged) {
            cursors
                .save()
                .with_context(|| format!("failed to persist cursor for {repo_key}"))?;
        }
        Ok(RepoPollOutcome::Completed {
            handed_off: merged.len(),
        })
    }

    async fn collect_new_merges(
        &self,
        repo: &RepoRef,
        cursor: Option<&PollCursor>,
        now: DateTime<Utc>,
    ) -> Result<Vec<GithubPullSummary>> {
        let floor = cursor
            .map(|cursor| cursor.last_merged_at)
            .unwrap_or(now - self.seed_lookback);
        let page_size = self.client.page_size();
        let mut page = 1_u32;
        let mut seen = HashSet::new();
        let mut fresh = Vec::new();
        loop {
            let chunk = self.client.list_closed_pulls_page(repo, page).await?;
            let chunk_len = chunk.len();
            let mut reached_covered = false;
            for pull in chunk {
                // merged_at <= updated_at, so anything updated before the floor is covered.
                if pull.updated_at < floor {
                    reached_covered = true;
                    continue;
                }
                let Some(merged_at) = pull.merged_at else {
                    continue;
                };
                let eligible = match cursor {
                    Some(cursor) => !cursor.covers(pull.number, merged_at),
                    None => merged_at >= floor,
                };
                if eligible && seen.insert(pull.number) {
                    fresh.push(pull);
                }
            }
            if reached_covered || chunk_len < page_size {
                break;
            }
            page = page.saturating_add(1);
        }
        fresh.sort_by_key(|pull| (pull.merged_at, pull.number));
        Ok(fresh)
    }

    async fn describe(&self, repo: &RepoRef, summary: GithubPullSummary) -> Result<PullRequestDescriptor> {
        let merged_at = summary
            .merged_at
            .ok_or_else(|| anyhow!("pull request #{} has no merge time", summary.number))?;
        let detail = self.client.get_pull(repo, summary.number).await?;
        let files = self
            .client
            .list_pull_files(repo, summary.number)
            .await?
            .into_iter()
            .map(|file| PullRequestFile {
                filename: file.filename,
                status: file.status,
                additions: file.additions,
                deletions: file.deletions,
                patch: file.patch,
            })
            .collect::<Vec<_>>();
        Ok(PullRequestDescriptor {
            repo: repo.clone(),
            number: summary.number,
            title: summary.title,
            body: summary.body.filter(|body| !body.trim().is_empty()),
            author: summary.user.login,
            html_url: summary.html_url,
            merged_at,
            additions: detail.additions,
            deletions: detail.deletions,
            changed_files: detail.changed_files.max(files.len() as u64),
            commits: detail.commits,
            files,
        })
    }
}
