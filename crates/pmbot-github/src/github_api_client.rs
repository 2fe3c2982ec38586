use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use pmbot_core::{truncate_chars, RetryPolicy};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::RepoRef;

pub const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct GithubUser {
    pub login: String,
}

/// Row from the pull-request list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubPullSummary {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub user: GithubUser,
    #[serde(default)]
    pub html_url: Option<String>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubPullDetail {
    pub number: u64,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
    #[serde(default)]
    pub changed_files: u64,
    #[serde(default)]
    pub commits: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubPullFile {
    pub filename: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
    #[serde(default)]
    pub patch: Option<String>,
}

#[derive(Clone)]
pub struct GithubApiClient {
    http: reqwest::Client,
    api_base: String,
    page_size: usize,
    retry: RetryPolicy,
}

impl GithubApiClient {
    pub fn new(
        api_base: String,
        token: Option<String>,
        request_timeout_ms: u64,
        retry_max_attempts: usize,
        retry_base_delay_ms: u64,
    ) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("pmbot-pr-poller"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            reqwest::header::HeaderValue::from_static("2022-11-28"),
        );
        if let Some(token) = token.as_deref().map(str::trim).filter(|token| !token.is_empty()) {
            let auth_header = format!("Bearer {token}");
            headers.insert(
                reqwest::header::AUTHORIZATION,
                reqwest::header::HeaderValue::from_str(&auth_header)
                    .context("invalid github authorization header")?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create github api client")?;
        Ok(Self {
            http: client,
            api_base: api_base.trim_end_matches('/').to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            retry: RetryPolicy::new(retry_max_attempts, retry_base_delay_ms),
        })
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, DEFAULT_PAGE_SIZE);
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// One page of closed pull requests, most recently updated first.
    pub async fn list_closed_pulls_page(
        &self,
        repo: &RepoRef,
        page: u32,
    ) -> Result<Vec<GithubPullSummary>> {
        let url = format!("{}/repos/{}/{}/pulls", self.api_base, repo.owner, repo.name);
        let page_value = page.to_string();
        let per_page = self.page_size.to_string();
        self.request_json("list closed pull requests", || {
            self.http.get(&url).query(&[
                ("state", "closed"),
                ("sort", "updated"),
                ("direction", "desc"),
                ("per_page", per_page.as_str()),
                ("page", page_value.as_str()),
            ])
        })
        .await
    }

    pub async fn get_pull(&self, repo: &RepoRef, number: u64) -> Result<GithubPullDetail> {
        let url = format!(
            "{}/repos/{}/{}/pulls/{}",
            self.api_base, repo.owner, repo.name, number
        );
        self.request_json("get pull request", || self.http.get(&url))
            .await
    }

    pub async fn list_pull_files(&self, repo: &RepoRef, number: u64) -> Result<Vec<GithubPullFile>> {
        let url = format!(
            "{}/repos/{}/{}/pulls/{}/files",
            self.api_base, repo.owner, repo.name, number
        );
        let mut page = 1_u32;
        let mut rows = Vec::new();
        loop {
            let page_value = page.to_string();
            let per_page = self.page_size.to_string();
            let chunk: Vec<GithubPullFile> = self
                .request_json("list pull request files", || {
                    self.http.get(&url).query(&[
                        ("per_page", per_page.as_str()),
                        ("page", page_value.as_str()),
                    ])
                })
                .await?;
            let chunk_len = chunk.len();
            rows.extend(chunk);
            if chunk_len < self.page_size {
                break;
            }
            page = page.saturating_add(1);
        }
        Ok(rows)
    }

    async fn request_json<T, F>(&self, operation: &str, mut request_builder: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let started = Instant::now();
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = request_builder()
                .header("x-pmbot-retry-attempt", attempt.saturating_sub(1).to_string())
                .send()
                .await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let parsed = response
                            .json::<T>()
                            .await
                            .with_context(|| format!("failed to decode github {operation}"))?;
                        return Ok(parsed);
                    }

                    let retry_in = self.retry.delay_after_status(
                        attempt,
                        status.as_u16(),
                        response.headers(),
                        started.elapsed(),
                    );
                    let body = response.text().await.unwrap_or_default();
                    if let Some(delay) = retry_in {
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    bail!(
                        "github api {operation} failed with status {}: {}",
                        status.as_u16(),
                        truncate_chars(&body, 800)
                    );
                }
                Err(error) => {
                    if let Some(delay) = self.retry.delay_after_error(attempt, &error, started.elapsed()) {
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(error)
                        .with_context(|| format!("github api {operation} request failed"));
                }
            }
        }
    }
}
