use std::collections::VecDeque;
use std::fmt;

use pmbot_core::window_elapsed;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
    pub timestamp_unix_ms: u64,
}

/// What a conversation is currently about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Topic {
    Project { id: String, name: String },
    Member { label: String, discord_id: Option<String> },
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Project { name, .. } => write!(f, "{name} (project)"),
            Self::Member { label, .. } => write!(f, "{label} (member)"),
        }
    }
}

/// Per-participant conversation state with FIFO-bounded history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSession {
    pub participant_id: String,
    #[serde(default)]
    pub turns: VecDeque<Turn>,
    #[serde(default)]
    pub current_topic: Option<Topic>,
    pub last_activity_unix_ms: u64,
}

impl ConversationSession {
    pub fn new(participant_id: impl Into<String>, now_unix_ms: u64) -> Self {
        Self {
            participant_id: participant_id.into(),
            turns: VecDeque::new(),
            current_topic: None,
            last_activity_unix_ms: now_unix_ms,
        }
    }

    /// Appends a turn and evicts the oldest ones beyond `max_turns`.
    pub fn push_turn(&mut self, role: TurnRole, text: impl Into<String>, now_unix_ms: u64, max_turns: usize) {
        self.turns.push_back(Turn {
            role,
            text: text.into(),
            timestamp_unix_ms: now_unix_ms,
        });
        let bound = max_turns.max(1);
        while self.turns.len() > bound {
            self.turns.pop_front();
        }
        self.last_activity_unix_ms = now_unix_ms;
    }

    pub fn reset(&mut self, now_unix_ms: u64) {
        self.turns.clear();
        self.current_topic = None;
        self.last_activity_unix_ms = now_unix_ms;
    }

    pub fn is_expired(&self, now_unix_ms: u64, idle_timeout_ms: u64) -> bool {
        window_elapsed(self.last_activity_unix_ms, idle_timeout_ms, now_unix_ms)
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty() && self.current_topic.is_none()
    }
}
