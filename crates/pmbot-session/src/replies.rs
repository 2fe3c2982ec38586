use chrono::{TimeZone, Utc};
use pmbot_ai::{ChatRequest, Message};
use pmbot_backend::Project;
use pmbot_core::BotError;

use crate::context_format::{format_turn_data, TurnData};
use crate::session::{ConversationSession, TurnRole};

pub const CHAT_TEMPERATURE: f32 = 0.7;
const CHAT_MAX_TOKENS: u32 = 500;
const MAX_CLARIFICATION_PROJECTS: usize = 10;

const SYSTEM_PROMPT: &str = "You are PM Bot, a project management assistant on Discord.
Answer questions about projects, tasks, team members and deadlines with concise, actionable insights.
Keep answers under 400 words, use bullet points for lists and at most two emojis.
Base every answer on the provided data. If data is missing, say \"I don't have that information yet\" instead of guessing.
End with a short follow-up question when it helps the conversation.";

/// System instruction, bounded history, then the new message with the fetched
/// data appended.
pub fn build_chat_request(
    model: &str,
    session: &ConversationSession,
    user_text: &str,
    data: &TurnData,
) -> ChatRequest {
    let mut messages = Vec::with_capacity(session.turns.len() + 2);
    messages.push(Message::system(SYSTEM_PROMPT));
    for turn in &session.turns {
        messages.push(match turn.role {
            TurnRole::User => Message::user(turn.text.clone()),
            TurnRole::Assistant => Message::assistant(turn.text.clone()),
        });
    }
    messages.push(Message::user(format!(
        "{user_text}\n\n--- Available Data ---\n{}",
        format_turn_data(data)
    )));
    ChatRequest {
        model: model.to_string(),
        messages,
        max_tokens: Some(CHAT_MAX_TOKENS),
        temperature: Some(CHAT_TEMPERATURE),
    }
}

pub fn degraded_reply(data: &TurnData) -> String {
    if data.is_empty() {
        return "⚠️ AI is unavailable right now and I found no matching data for that question. Try again in a few minutes.".to_string();
    }
    format!(
        "⚠️ AI is unavailable right now, here is the raw data:\n```\n{}\n```",
        format_turn_data(data)
    )
}

pub fn backend_failure_reply(error: &BotError) -> String {
    format!(
        "⚠️ I couldn't reach the project data service ({error}). Please try again shortly."
    )
}

pub fn clarification_reply(projects: &[Project]) -> String {
    if projects.is_empty() {
        return "Which project or teammate do you mean? Name a project or @mention someone."
            .to_string();
    }
    let names = projects
        .iter()
        .take(MAX_CLARIFICATION_PROJECTS)
        .map(|project| format!("- {}", project.name))
        .collect::<Vec<_>>()
        .join("\n");
    format!("Which project do you mean? Known projects:\n{names}")
}

/// Renders the session's turns and topic verbatim.
pub fn render_context(session: &ConversationSession, max_turns: usize) -> String {
    let mut lines = Vec::new();
    match &session.current_topic {
        Some(topic) => lines.push(format!("Current topic: {topic}")),
        None => lines.push("Current topic: none".to_string()),
    }
    if session.turns.is_empty() {
        lines.push("No conversation history. Start a conversation!".to_string());
        return lines.join("\n");
    }
    lines.push(format!("History ({}/{} turns):", session.turns.len(), max_turns));
    for turn in &session.turns {
        let timestamp = i64::try_from(turn.timestamp_unix_ms)
            .ok()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "unknown time".to_string());
        lines.push(format!("[{timestamp}] {}: {}", turn.role.as_str(), turn.text));
    }
    lines.join("\n")
}
