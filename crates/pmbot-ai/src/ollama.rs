use std::time::Instant;

use async_trait::async_trait;
use pmbot_core::RetryPolicy;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::time::sleep;

use crate::{ChatRequest, ChatResponse, ChatUsage, LlmClient, Message, MessageRole, PmAiError};

const RETRY_BASE_DELAY_MS: u64 = 200;

#[derive(Debug, Clone)]
/// Connection settings for a local Ollama server.
pub struct OllamaConfig {
    pub api_base: String,
    pub request_timeout_ms: u64,
    pub max_retries: usize,
    pub retry_budget_ms: u64,
}

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    config: OllamaConfig,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct OllamaChatMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: Option<OllamaChatMessage>,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Result<Self, PmAiError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_millis(
                config.request_timeout_ms.max(1),
            ))
            .build()?;
        let retry = RetryPolicy::new(config.max_retries.saturating_add(1), RETRY_BASE_DELAY_MS)
            .with_budget_ms(config.retry_budget_ms);
        Ok(Self {
            client,
            config,
            retry,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_base.trim_end_matches('/'))
    }

    /// Lists installed models; used as a startup reachability probe.
    pub async fn list_models(&self) -> Result<Vec<String>, PmAiError> {
        #[derive(Deserialize)]
        struct TagList {
            #[serde(default)]
            models: Vec<TagEntry>,
        }
        #[derive(Deserialize)]
        struct TagEntry {
            name: String,
        }

        let response = self.client.get(self.endpoint("/api/tags")).send().await?;
        let status = response.status();
        let raw = response.text().await?;
        if !status.is_success() {
            return Err(PmAiError::HttpStatus {
                status: status.as_u16(),
                body: raw,
            });
        }
        let tags: TagList = serde_json::from_str(&raw)?;
        Ok(tags.models.into_iter().map(|entry| entry.name).collect())
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, PmAiError> {
        let body = build_chat_request_body(&request);
        let url = self.endpoint("/api/chat");
        let started = Instant::now();
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = self
                .client
                .post(&url)
                .header("x-pmbot-retry-attempt", attempt.saturating_sub(1).to_string())
                .json(&body)
                .send()
                .await;

            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let raw = response.text().await?;
                        return parse_chat_response(&raw);
                    }

                    let retry_in = self.retry.delay_after_status(
                        attempt,
                        status.as_u16(),
                        response.headers(),
                        started.elapsed(),
                    );
                    let raw = response.text().await?;
                    if let Some(delay) = retry_in {
                        tracing::debug!(
                            status = status.as_u16(),
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "retrying ollama chat request"
                        );
                        sleep(delay).await;
                        continue;
                    }
                    return Err(PmAiError::HttpStatus {
                        status: status.as_u16(),
                        body: raw,
                    });
                }
                Err(error) => {
                    if let Some(delay) = self.retry.delay_after_error(attempt, &error, started.elapsed()) {
                        sleep(delay).await;
                        continue;
                    }
                    if error.is_timeout() {
                        return Err(PmAiError::Timeout(self.config.request_timeout_ms));
                    }
                    return Err(PmAiError::Http(error));
                }
            }
        }
    }
}

fn build_chat_request_body(request: &ChatRequest) -> Value {
    let messages = request
        .messages
        .iter()
        .map(|message| {
            json!({
                "role": message.role.as_str(),
                "content": message.content,
            })
        })
        .collect::<Vec<_>>();

    let mut options = Map::new();
    if let Some(temperature) = request.temperature {
        options.insert("temperature".to_string(), json!(temperature));
    }
    if let Some(max_tokens) = request.max_tokens {
        options.insert("num_predict".to_string(), json!(max_tokens));
    }

    json!({
        "model": request.model,
        "messages": messages,
        "stream": false,
        "options": Value::Object(options),
    })
}

fn parse_chat_response(raw: &str) -> Result<ChatResponse, PmAiError> {
    let parsed: OllamaChatResponse = serde_json::from_str(raw)?;
    let message = parsed
        .message
        .ok_or_else(|| PmAiError::InvalidResponse("response contained no message".to_string()))?;
    let usage = ChatUsage {
        input_tokens: parsed.prompt_eval_count,
        output_tokens: parsed.eval_count,
        total_tokens: parsed.prompt_eval_count.saturating_add(parsed.eval_count),
    };
    Ok(ChatResponse {
        message: Message {
            role: MessageRole::Assistant,
            content: message.content,
        },
        finish_reason: parsed.done_reason,
        usage,
    })
}
