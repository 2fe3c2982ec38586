use std::time::{Duration, Instant};

use async_trait::async_trait;
use pmbot_core::retry::is_retryable_status;
use pmbot_core::{truncate_chars, BotError, RetryPolicy};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::models::{
    Commit, Fetched, LinkOutcome, MemberStats, Project, Task, WireCommit, WireMemberStats,
    WireProject, WireTask,
};
use crate::ProjectBackend;

const BACKEND_SERVICE: &str = "project backend";

#[derive(Debug, Clone)]
pub struct BackendClientConfig {
    pub api_base: String,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

/// HTTP client for the project-management web application.
#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    api_base: String,
    retry: RetryPolicy,
}

impl BackendClient {
    pub fn new(config: BackendClientConfig) -> Result<Self, BotError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("pmbot-backend-gateway"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()
            .map_err(|error| BotError::invalid(format!("failed to build backend client: {error}")))?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            retry: RetryPolicy::new(config.retry_max_attempts, config.retry_base_delay_ms),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/discord/{path}", self.api_base)
    }

    async fn request_json<T, F>(&self, operation: &str, mut request_builder: F) -> Result<T, BotError>
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
                        let raw = response.text().await.map_err(|error| {
                            BotError::transient(operation, format!("failed to read body: {error}"))
                        })?;
                        return serde_json::from_str::<T>(&raw).map_err(|error| {
                            BotError::integrity(
                                BACKEND_SERVICE,
                                format!("failed to decode {operation}: {error}"),
                            )
                        });
                    }

                    let retry_in = self.retry.delay_after_status(
                        attempt,
                        status.as_u16(),
                        response.headers(),
                        started.elapsed(),
                    );
                    let body = response.text().await.unwrap_or_default();
                    if let Some(delay) = retry_in {
                        tracing::debug!(
                            operation,
                            status = status.as_u16(),
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "retrying backend request"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    let message = format!(
                        "{operation} failed with status {}: {}",
                        status.as_u16(),
                        truncate_chars(&body, 800)
                    );
                    if is_retryable_status(status.as_u16()) {
                        return Err(BotError::unavailable(BACKEND_SERVICE, message));
                    }
                    return Err(BotError::invalid(message));
                }
                Err(error) => {
                    if let Some(delay) = self.retry.delay_after_error(attempt, &error, started.elapsed()) {
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(BotError::transient(operation, error.to_string()));
                }
            }
        }
    }

    async fn post_rows(&self, operation: &str, path: &str, payload: Value) -> Result<Vec<Value>, BotError> {
        let url = self.endpoint(path);
        let body: Value = self
            .request_json(operation, || self.http.post(&url).json(&payload))
            .await?;
        extract_rows(operation, body, None)
    }
}

#[async_trait]
impl ProjectBackend for BackendClient {
    async fn list_projects(&self) -> Result<Fetched<Project>, BotError> {
        let url = self.endpoint("projects");
        let body: Value = self
            .request_json("list projects", || self.http.get(&url))
            .await?;
        let rows = extract_rows("list projects", body, Some("projects"))?;
        Ok(decode_rows::<WireProject, _>("list projects", rows, WireProject::normalize))
    }

    async fn recent_tasks(&self, hours: u32) -> Result<Fetched<Task>, BotError> {
        let hours = validate_hours(hours)?;
        let rows = self
            .post_rows("recent tasks", "tasks/recent", json!({ "hours": hours }))
            .await?;
        Ok(decode_rows::<WireTask, _>("recent tasks", rows, WireTask::normalize))
    }

    async fn member_stats(&self, project_id: &str, hours: u32) -> Result<Fetched<MemberStats>, BotError> {
        let project_id = validate_non_empty("project id", project_id)?;
        let hours = validate_hours(hours)?;
        let rows = self
            .post_rows(
                "member stats",
                "stats",
                json!({ "projectId": project_id, "hours": hours }),
            )
            .await?;
        Ok(decode_rows::<WireMemberStats, _>(
            "member stats",
            rows,
            WireMemberStats::normalize,
        ))
    }

    async fn incomplete_tasks(&self, project_id: &str) -> Result<Fetched<Task>, BotError> {
        let project_id = validate_non_empty("project id", project_id)?;
        let rows = self
            .post_rows(
                "incomplete tasks",
                "incomplete",
                json!({ "projectId": project_id }),
            )
            .await?;
        Ok(decode_rows::<WireTask, _>("incomplete tasks", rows, WireTask::normalize))
    }

    async fn recent_commits(&self, project_id: &str, hours: u32) -> Result<Fetched<Commit>, BotError> {
        let project_id = validate_non_empty("project id", project_id)?;
        let hours = validate_hours(hours)?;
        let rows = self
            .post_rows(
                "recent commits",
                "commits",
                json!({ "projectId": project_id, "hours": hours }),
            )
            .await?;
        Ok(decode_rows::<WireCommit, _>("recent commits", rows, WireCommit::normalize))
    }

    async fn link_account(&self, discord_id: &str, email: &str) -> Result<LinkOutcome, BotError> {
        let discord_id = validate_non_empty("discord id", discord_id)?;
        let email = validate_email(email)?;
        let url = self.endpoint("link");
        let payload = json!({ "discordId": discord_id, "email": email });
        let body: Value = self
            .request_json("link account", || self.http.post(&url).json(&payload))
            .await?;
        Ok(LinkOutcome {
            success: body
                .get("success")
                .and_then(Value::as_bool)
                .unwrap_or(true),
            message: body
                .get("message")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned),
        })
    }
}

pub fn validate_hours(hours: u32) -> Result<u32, BotError> {
    if hours == 0 {
        return Err(BotError::invalid("hours window must be a positive integer"));
    }
    Ok(hours)
}

fn validate_non_empty<'a>(field: &str, value: &'a str) -> Result<&'a str, BotError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(BotError::invalid(format!("{field} cannot be empty")));
    }
    Ok(trimmed)
}

fn validate_email(email: &str) -> Result<&str, BotError> {
    let email = validate_non_empty("email", email)?;
    let valid = email
        .split_once('@')
        .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
        .unwrap_or(false);
    if !valid {
        return Err(BotError::invalid(format!("'{email}' is not an email address")));
    }
    Ok(email)
}

fn extract_rows(operation: &str, body: Value, wrapper_key: Option<&str>) -> Result<Vec<Value>, BotError> {
    match body {
        Value::Array(rows) => Ok(rows),
        Value::Object(mut object) => {
            if let Some(Value::Array(rows)) = wrapper_key.and_then(|key| object.remove(key)) {
                return Ok(rows);
            }
            Err(BotError::integrity(
                BACKEND_SERVICE,
                format!("{operation} returned an object where a list was expected"),
            ))
        }
        other => Err(BotError::integrity(
            BACKEND_SERVICE,
            format!(
                "{operation} returned unexpected payload: {}",
                truncate_chars(&other.to_string(), 200)
            ),
        )),
    }
}

fn decode_rows<W, T>(operation: &str, rows: Vec<Value>, normalize: fn(W) -> Option<T>) -> Fetched<T>
where
    W: DeserializeOwned,
{
    let mut decoded = Vec::with_capacity(rows.len());
    let mut skipped = 0_usize;
    for row in rows {
        match serde_json::from_value::<W>(row).ok().and_then(normalize) {
            Some(value) => decoded.push(value),
            None => skipped = skipped.saturating_add(1),
        }
    }
    if skipped > 0 {
        tracing::warn!(operation, skipped, "backend rows skipped during decode");
    }
    Fetched {
        rows: decoded,
        skipped,
    }
}
