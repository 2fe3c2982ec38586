//! Persisted inbound position per Discord channel plus the DM channels the bot
//! has opened, so a restart neither replays nor loses chat messages.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use pmbot_core::{read_text_if_exists, write_text_atomic};
use serde::{Deserialize, Serialize};

use crate::discord_api_client::is_newer_message;

pub const DISCORD_INBOUND_FILE: &str = "discord-inbound.json";
const INBOUND_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct InboundState {
    schema_version: u32,
    #[serde(default)]
    last_message_ids: BTreeMap<String, String>,
    /// Discord user id -> DM channel id.
    #[serde(default)]
    dm_channels: BTreeMap<String, String>,
}

impl Default for InboundState {
    fn default() -> Self {
        Self {
            schema_version: INBOUND_SCHEMA_VERSION,
            last_message_ids: BTreeMap::new(),
            dm_channels: BTreeMap::new(),
        }
    }
}

pub struct DiscordInboundStore {
    path: PathBuf,
    state: InboundState,
}

impl DiscordInboundStore {
    pub fn load(path: PathBuf) -> Result<Self> {
        let state = match read_text_if_exists(&path)? {
            None => InboundState::default(),
            Some(raw) => match serde_json::from_str::<InboundState>(&raw) {
                Ok(state) if state.schema_version == INBOUND_SCHEMA_VERSION => state,
                Ok(state) => {
                    tracing::error!(
                        path = %path.display(),
                        found = state.schema_version,
                        expected = INBOUND_SCHEMA_VERSION,
                        "unsupported discord inbound schema; starting fresh"
                    );
                    InboundState::default()
                }
                Err(error) => {
                    tracing::error!(
                        path = %path.display(),
                        error = %error,
                        "discord inbound state is corrupt; starting fresh"
                    );
                    InboundState::default()
                }
            },
        };
        Ok(Self { path, state })
    }

    pub fn last_message_id(&self, channel_id: &str) -> Option<&str> {
        self.state.last_message_ids.get(channel_id).map(String::as_str)
    }

    /// Advances the channel position. Older ids never move it back.
    pub fn record_seen(&mut self, channel_id: &str, message_id: &str) -> bool {
        if !is_newer_message(message_id, self.last_message_id(channel_id)) {
            return false;
        }
        self.state
            .last_message_ids
            .insert(channel_id.to_string(), message_id.trim().to_string());
        true
    }

    pub fn dm_channel_for(&self, user_id: &str) -> Option<&str> {
        self.state.dm_channels.get(user_id).map(String::as_str)
    }

    pub fn is_dm_channel(&self, channel_id: &str) -> bool {
        self.state.dm_channels.values().any(|id| id == channel_id)
    }

    pub fn dm_channel_ids(&self) -> Vec<String> {
        self.state.dm_channels.values().cloned().collect()
    }

    pub fn remember_dm_channel(&mut self, user_id: &str, channel_id: &str) -> bool {
        let previous = self
            .state
            .dm_channels
            .insert(user_id.to_string(), channel_id.to_string());
        previous.as_deref() != Some(channel_id)
    }

    pub fn save(&self) -> Result<()> {
        let mut payload = serde_json::to_string_pretty(&self.state)
            .context("failed to serialize discord inbound state")?;
        payload.push('\n');
        write_text_atomic(&self.path, &payload)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}
