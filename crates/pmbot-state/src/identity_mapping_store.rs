use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use pmbot_core::write_text_atomic;
use serde::{Deserialize, Serialize};

use crate::{load_versioned, Versioned};

const IDENTITY_MAPPING_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IdentityMappingState {
    schema_version: u32,
    #[serde(default)]
    mappings: BTreeMap<String, String>,
}

impl Default for IdentityMappingState {
    fn default() -> Self {
        Self {
            schema_version: IDENTITY_MAPPING_SCHEMA_VERSION,
            mappings: BTreeMap::new(),
        }
    }
}

impl Versioned for IdentityMappingState {
    fn schema_version(&self) -> u32 {
        self.schema_version
    }
}

/// GitHub login -> Discord user id. Logins are matched case-insensitively.
pub struct IdentityMappingStore {
    path: PathBuf,
    state: IdentityMappingState,
}

fn normalize_login(login: &str) -> String {
    login.trim().trim_start_matches('@').to_ascii_lowercase()
}

impl IdentityMappingStore {
    pub fn load(path: PathBuf) -> Result<Self> {
        let state = load_versioned::<IdentityMappingState>(
            &path,
            "identity mapping",
            IDENTITY_MAPPING_SCHEMA_VERSION,
        )?;
        tracing::debug!(path = %path.display(), mappings = state.mappings.len(), "identity mappings loaded");
        Ok(Self { path, state })
    }

    pub fn lookup(&self, github_login: &str) -> Option<&str> {
        self.state
            .mappings
            .get(&normalize_login(github_login))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.state.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.mappings.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.state
            .mappings
            .iter()
            .map(|(login, discord_id)| (login.as_str(), discord_id.as_str()))
    }

    /// Inserts or replaces a mapping and flushes it. Returns the previous
    /// Discord id. The in-memory table is restored if the flush fails.
    pub fn upsert(&mut self, github_login: &str, discord_user_id: &str) -> Result<Option<String>> {
        let login = normalize_login(github_login);
        let discord_user_id = discord_user_id.trim();
        if login.is_empty() {
            bail!("github username cannot be empty");
        }
        if discord_user_id.is_empty() {
            bail!("discord user id cannot be empty");
        }
        let previous = self
            .state
            .mappings
            .insert(login.clone(), discord_user_id.to_string());
        if let Err(error) = self.save() {
            match &previous {
                Some(previous) => self.state.mappings.insert(login, previous.clone()),
                None => self.state.mappings.remove(&login),
            };
            return Err(error);
        }
        Ok(previous)
    }

    /// Removes a mapping. Returns false when there was nothing to remove.
    pub fn remove(&mut self, github_login: &str) -> Result<bool> {
        let login = normalize_login(github_login);
        let Some(previous) = self.state.mappings.remove(&login) else {
            return Ok(false);
        };
        if let Err(error) = self.save() {
            self.state.mappings.insert(login, previous);
            return Err(error);
        }
        Ok(true)
    }

    fn save(&self) -> Result<()> {
        let mut payload = serde_json::to_string_pretty(&self.state)
            .context("failed to serialize identity mappings")?;
        payload.push('\n');
        write_text_atomic(&self.path, &payload)
            .with_context(|| format!("failed to write identity mappings {}", self.path.display()))
    }
}
