//! Language-model client surface for the bot.
//!
//! Exposes the `LlmClient` contract used by the review summarizer and the
//! conversation manager, plus an Ollama `/api/chat` implementation.
mod ollama;
mod types;

pub use ollama::{OllamaClient, OllamaConfig};
pub use types::{ChatRequest, ChatResponse, ChatUsage, LlmClient, Message, MessageRole, PmAiError};
