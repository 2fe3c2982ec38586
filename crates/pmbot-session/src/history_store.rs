use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use pmbot_core::{read_text_if_exists, write_text_atomic};
use serde::{Deserialize, Serialize};

use crate::session::ConversationSession;

const CONVERSATION_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConversationState {
    schema_version: u32,
    #[serde(default)]
    sessions: BTreeMap<String, ConversationSession>,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self {
            schema_version: CONVERSATION_SCHEMA_VERSION,
            sessions: BTreeMap::new(),
        }
    }
}

/// `conversations.json`: persisted sessions keyed by participant id.
pub struct ConversationHistoryStore {
    path: PathBuf,
    state: ConversationState,
}

impl ConversationHistoryStore {
    pub fn load(path: PathBuf) -> Result<Self> {
        let state = match read_text_if_exists(&path)? {
            None => ConversationState::default(),
            Some(raw) => match serde_json::from_str::<ConversationState>(&raw) {
                Ok(state) if state.schema_version == CONVERSATION_SCHEMA_VERSION => state,
                Ok(state) => {
                    tracing::error!(
                        path = %path.display(),
                        found = state.schema_version,
                        expected = CONVERSATION_SCHEMA_VERSION,
                        "unsupported conversation history schema; starting empty"
                    );
                    ConversationState::default()
                }
                Err(error) => {
                    tracing::error!(
                        path = %path.display(),
                        error = %error,
                        "conversation history is corrupt; starting empty"
                    );
                    ConversationState::default()
                }
            },
        };
        Ok(Self { path, state })
    }

    pub fn sessions(&self) -> impl Iterator<Item = &ConversationSession> {
        self.state.sessions.values()
    }

    pub fn get(&self, participant_id: &str) -> Option<&ConversationSession> {
        self.state.sessions.get(participant_id)
    }

    /// Stores a snapshot of `session`. Empty sessions are dropped from disk.
    pub fn put(&mut self, session: &ConversationSession) -> Result<()> {
        if session.is_empty() {
            return self.remove(&session.participant_id);
        }
        self.state
            .sessions
            .insert(session.participant_id.clone(), session.clone());
        self.save()
    }

    pub fn remove(&mut self, participant_id: &str) -> Result<()> {
        if self.state.sessions.remove(participant_id).is_none() {
            return Ok(());
        }
        self.save()
    }

    fn save(&self) -> Result<()> {
        let mut payload = serde_json::to_string_pretty(&self.state)
            .context("failed to serialize conversation history")?;
        payload.push('\n');
        write_text_atomic(&self.path, &payload).with_context(|| {
            format!("failed to write conversation history {}", self.path.display())
        })
    }
}
