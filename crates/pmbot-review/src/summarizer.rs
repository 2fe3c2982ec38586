use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use pmbot_ai::{ChatRequest, LlmClient};
use pmbot_core::BotError;
use pmbot_github::{
    categorize_changes, prepare_review_diff, ChangeCategory, Complexity, DiffLimits,
    PullRequestDescriptor,
};

use crate::prompts::{build_review_request, build_security_request};
use crate::recipient::Recipient;
use crate::review_parser::{parse_review, parse_security_scan, ParsedReview, SecurityScan};

#[derive(Debug, Clone)]
pub struct ReviewSummarizerConfig {
    pub model: String,
    pub limits: DiffLimits,
    pub security_scan: bool,
    pub model_timeout_ms: u64,
}

/// One finished review, consumed once by delivery and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewResult {
    pub pull_request_id: String,
    pub title: String,
    pub author: String,
    pub html_url: Option<String>,
    pub additions: u64,
    pub deletions: u64,
    pub commits: u64,
    pub review: ParsedReview,
    pub security: Option<SecurityScan>,
    pub file_list: Vec<String>,
    pub skipped_files: Vec<String>,
    pub omitted_files: usize,
    pub complexity: Complexity,
    pub categories: BTreeMap<ChangeCategory, Vec<String>>,
    pub truncated: bool,
    pub recipient: Recipient,
}

pub struct ReviewSummarizer {
    client: Arc<dyn LlmClient>,
    config: ReviewSummarizerConfig,
}

impl ReviewSummarizer {
    pub fn new(client: Arc<dyn LlmClient>, config: ReviewSummarizerConfig) -> Self {
        Self { client, config }
    }

    /// Reviews one pull request. A model failure fails only this review; a
    /// failed security pass is logged and the review is still returned.
    pub async fn summarize(
        &self,
        pull_request: &PullRequestDescriptor,
        recipient: Recipient,
    ) -> Result<ReviewResult, BotError> {
        let diff = prepare_review_diff(&pull_request.files, self.config.limits);
        if diff.truncated {
            tracing::info!(
                pull_request = %pull_request.id(),
                omitted_files = diff.omitted_files,
                "diff truncated to fit the review budget"
            );
        }

        let review_text = self
            .complete(build_review_request(&self.config.model, pull_request, &diff))
            .await?;
        let review = parse_review(&review_text);
        if !review.is_structured() {
            tracing::debug!(pull_request = %pull_request.id(), "model review was freeform");
        }

        let security = if self.config.security_scan {
            match self
                .complete(build_security_request(&self.config.model, pull_request, &diff))
                .await
            {
                Ok(text) => Some(parse_security_scan(&text)),
                Err(error) => {
                    tracing::warn!(
                        pull_request = %pull_request.id(),
                        error = %error,
                        "security scan failed; delivering review without it"
                    );
                    None
                }
            }
        } else {
            None
        };

        let file_list = pull_request
            .files
            .iter()
            .map(|file| file.filename.clone())
            .collect::<Vec<_>>();
        let categories = categorize_changes(
            pull_request
                .files
                .iter()
                .filter(|file| !diff.skipped_files.contains(&file.filename))
                .map(|file| file.filename.as_str()),
        );
        Ok(ReviewResult {
            pull_request_id: pull_request.id(),
            title: pull_request.title.clone(),
            author: pull_request.author.clone(),
            html_url: pull_request.html_url.clone(),
            additions: pull_request.additions,
            deletions: pull_request.deletions,
            commits: pull_request.commits,
            review,
            security,
            file_list,
            skipped_files: diff.skipped_files,
            omitted_files: diff.omitted_files,
            complexity: Complexity::estimate(
                pull_request.changed_files,
                pull_request.changed_lines(),
            ),
            categories,
            truncated: diff.truncated,
            recipient,
        })
    }

    async fn complete(&self, request: ChatRequest) -> Result<String, BotError> {
        let timeout_ms = self.config.model_timeout_ms.max(1);
        let response = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.client.complete(request),
        )
        .await
        .map_err(|_| BotError::unavailable("model", format!("timed out after {timeout_ms} ms")))?
        .map_err(|error| BotError::unavailable("model", error.to_string()))?;
        let text = response.text().trim().to_string();
        if text.is_empty() {
            return Err(BotError::unavailable("model", "empty response"));
        }
        Ok(text)
    }
}
