//! Persisted per-repository high-water marks for the merged-PR poller.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use pmbot_core::{read_text_if_exists, write_text_atomic};
use serde::{Deserialize, Serialize};

const POLL_CURSOR_SCHEMA_VERSION: u32 = 1;

/// High-water mark for one repository.
///
/// `processed_at_mark` holds the pull-request numbers merged exactly at
/// `last_merged_at` so equal timestamps cannot be delivered twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollCursor {
    pub last_merged_at: DateTime<Utc>,
    #[serde(default)]
    pub processed_at_mark: BTreeSet<u64>,
}

impl PollCursor {
    /// True when a pull request merged at `merged_at` is already covered.
    pub fn covers(&self, number: u64, merged_at: DateTime<Utc>) -> bool {
        merged_at < self.last_merged_at
            || (merged_at == self.last_merged_at && self.processed_at_mark.contains(&number))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PollCursorState {
    schema_version: u32,
    #[serde(default)]
    cursors: BTreeMap<String, PollCursor>,
}

impl Default for PollCursorState {
    fn default() -> Self {
        Self {
            schema_version: POLL_CURSOR_SCHEMA_VERSION,
            cursors: BTreeMap::new(),
        }
    }
}

pub struct PollCursorStore {
    path: PathBuf,
    state: PollCursorState,
}

impl PollCursorStore {
    /// Loads cursors from disk. An unreadable or foreign-schema file is logged
    /// and replaced by an empty state rather than stopping the poller.
    pub fn load(path: PathBuf) -> Result<Self> {
        let state = match read_text_if_exists(&path)? {
            None => PollCursorState::default(),
            Some(raw) => match serde_json::from_str::<PollCursorState>(&raw) {
                Ok(state) if state.schema_version == POLL_CURSOR_SCHEMA_VERSION => state,
                Ok(state) => {
                    tracing::error!(
                        path = %path.display(),
                        found = state.schema_version,
                        expected = POLL_CURSOR_SCHEMA_VERSION,
                        "unsupported poll cursor schema; starting from empty cursors"
                    );
                    PollCursorState::default()
                }
                Err(error) => {
                    tracing::error!(
                        path = %path.display(),
                        error = %error,
                        "poll cursor file is corrupt; starting from empty cursors"
                    );
                    PollCursorState::default()
                }
            },
        };
        Ok(Self { path, state })
    }

    pub fn get(&self, repo: &str) -> Option<&PollCursor> {
        self.state.cursors.get(repo)
    }

    /// Moves the cursor forward to cover `merged`. Older batches never rewind
    /// it. Returns true when the cursor changed.
    pub fn advance(&mut self, repo: &str, merged: &[(u64, DateTime<Utc>)]) -> bool {
        let Some(batch_max) = merged.iter().map(|(_, merged_at)| *merged_at).max() else {
            return false;
        };
        let at_max = merged
            .iter()
            .filter(|(_, merged_at)| *merged_at == batch_max)
            .map(|(number, _)| *number);

        match self.state.cursors.get_mut(repo) {
            Some(cursor) if batch_max < cursor.last_merged_at => false,
            Some(cursor) if batch_max == cursor.last_merged_at => {
                let before = cursor.processed_at_mark.len();
                cursor.processed_at_mark.extend(at_max);
                cursor.processed_at_mark.len() != before
            }
            Some(cursor) => {
                cursor.last_merged_at = batch_max;
                cursor.processed_at_mark = at_max.collect();
                true
            }
            None => {
                self.state.cursors.insert(
                    repo.to_string(),
                    PollCursor {
                        last_merged_at: batch_max,
                        processed_at_mark: at_max.collect(),
                    },
                );
                true
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        let mut payload = serde_json::to_string_pretty(&self.state)
            .context("failed to serialize poll cursors")?;
        payload.push('\n');
        write_text_atomic(&self.path, &payload)
            .with_context(|| format!("failed to write poll cursors {}", self.path.display()))
    }
}
