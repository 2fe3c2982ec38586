use std::cmp::Ordering;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use pmbot_core::{chunk_text, truncate_chars, RetryPolicy};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

/// Hard per-message limit of the Discord API.
pub const DISCORD_MESSAGE_LIMIT: usize = 2_000;
pub const DEFAULT_FETCH_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiscordUser {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub bot: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordMessage {
    pub id: String,
    pub channel_id: String,
    pub author: DiscordUser,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub mentions: Vec<DiscordUser>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl DiscordMessage {
    pub fn mentions_user(&self, user_id: &str) -> bool {
        self.mentions.iter().any(|user| user.id == user_id)
            || self.content.contains(&format!("<@{user_id}>"))
            || self.content.contains(&format!("<@!{user_id}>"))
    }
}

#[derive(Debug, Deserialize)]
struct DiscordChannel {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PostedMessage {
    id: String,
}

/// Orders snowflake ids numerically, falling back to lexical order for
/// anything that does not parse.
pub fn compare_message_ids(left: &str, right: &str) -> Ordering {
    match (left.parse::<u128>(), right.parse::<u128>()) {
        (Ok(left), Ok(right)) => left.cmp(&right),
        _ => left.cmp(right),
    }
}

pub fn is_newer_message(candidate: &str, previous: Option<&str>) -> bool {
    let Some(previous) = previous else {
        return !candidate.trim().is_empty();
    };
    compare_message_ids(candidate.trim(), previous.trim()).is_gt()
}

#[derive(Clone)]
pub struct DiscordApiClient {
    http: reqwest::Client,
    api_base: String,
    fetch_limit: usize,
    retry: RetryPolicy,
}

impl DiscordApiClient {
    pub fn new(
        api_base: String,
        bot_token: String,
        request_timeout_ms: u64,
        retry_max_attempts: usize,
        retry_base_delay_ms: u64,
    ) -> Result<Self> {
        let token = bot_token.trim();
        if token.is_empty() {
            bail!("discord bot token is empty");
        }
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("DiscordBot (pmbot, 0.1)"),
        );
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&format!("Bot {token}"))
                .context("invalid discord authorization header")?,
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create discord api client")?;
        Ok(Self {
            http: client,
            api_base: api_base.trim_end_matches('/').to_string(),
            fetch_limit: DEFAULT_FETCH_LIMIT,
            retry: RetryPolicy::new(retry_max_attempts, retry_base_delay_ms),
        })
    }

    pub async fn current_user(&self) -> Result<DiscordUser> {
        let url = format!("{}/users/@me", self.api_base);
        self.request_json("get current user", || self.http.get(&url))
            .await
    }

    /// Messages in `channel_id` newer than `after`, oldest first.
    pub async fn channel_messages(
        &self,
        channel_id: &str,
        after: Option<&str>,
    ) -> Result<Vec<DiscordMessage>> {
        let url = format!("{}/channels/{}/messages", self.api_base, channel_id);
        let limit = self.fetch_limit.to_string();
        let mut messages: Vec<DiscordMessage> = self
            .request_json("list channel messages", || {
                let mut request = self.http.get(&url).query(&[("limit", limit.as_str())]);
                if let Some(after) = after {
                    request = request.query(&[("after", after)]);
                }
                request
            })
            .await?;
        messages.sort_by(|left, right| compare_message_ids(&left.id, &right.id));
        Ok(messages)
    }

    /// Posts `content`, split into as many messages as the size limit needs.
    /// Returns the ids of the posted messages.
    pub async fn post_message(&self, channel_id: &str, content: &str) -> Result<Vec<String>> {
        let url = format!("{}/channels/{}/messages", self.api_base, channel_id);
        let mut posted = Vec::new();
        for chunk in chunk_text(content, DISCORD_MESSAGE_LIMIT) {
            let payload = json!({ "content": chunk });
            let message: PostedMessage = self
                .request_json("create message", || self.http.post(&url).json(&payload))
                .await?;
            posted.push(message.id);
        }
        Ok(posted)
    }

    /// Opens (or reuses) the DM channel with `user_id`.
    pub async fn open_dm_channel(&self, user_id: &str) -> Result<String> {
        let url = format!("{}/users/@me/channels", self.api_base);
        let payload = json!({ "recipient_id": user_id });
        let channel: DiscordChannel = self
            .request_json("open dm channel", || self.http.post(&url).json(&payload))
            .await?;
        Ok(channel.id)
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
            match request_builder().send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<T>()
                            .await
                            .with_context(|| format!("failed to decode discord {operation}"));
                    }

                    let retry_in = self.retry.delay_after_status(
                        attempt,
                        status.as_u16(),
                        response.headers(),
                        started.elapsed(),
                    );
                    let body = response.text().await.unwrap_or_default();
                    if let Some(delay) = retry_in {
                        tracing::debug!(operation, attempt, status = status.as_u16(), "retrying discord request");
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    bail!(
                        "discord api {operation} failed with status {}: {}",
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
                        .with_context(|| format!("discord api {operation} request failed"));
                }
            }
        }
    }
}
