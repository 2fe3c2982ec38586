use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use pmbot_core::write_text_atomic;
use serde::{Deserialize, Serialize};

use crate::{load_versioned, Versioned};

const REPORT_FLAG_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ReportFlagState {
    schema_version: u32,
    #[serde(default)]
    projects: BTreeMap<String, bool>,
}

impl Default for ReportFlagState {
    fn default() -> Self {
        Self {
            schema_version: REPORT_FLAG_SCHEMA_VERSION,
            projects: BTreeMap::new(),
        }
    }
}

impl Versioned for ReportFlagState {
    fn schema_version(&self) -> u32 {
        self.schema_version
    }
}

/// Per-project switch for the scheduled report. Projects without an entry
/// are enabled.
pub struct ReportFlagStore {
    path: PathBuf,
    state: ReportFlagState,
}

impl ReportFlagStore {
    pub fn load(path: PathBuf) -> Result<Self> {
        let state =
            load_versioned::<ReportFlagState>(&path, "report flag", REPORT_FLAG_SCHEMA_VERSION)?;
        Ok(Self { path, state })
    }

    pub fn is_enabled(&self, project_id: &str) -> bool {
        self.state.projects.get(project_id).copied().unwrap_or(true)
    }

    pub fn disabled_projects(&self) -> impl Iterator<Item = &str> {
        self.state
            .projects
            .iter()
            .filter(|(_, enabled)| !**enabled)
            .map(|(project_id, _)| project_id.as_str())
    }

    /// Sets the flag and flushes. Returns false when nothing changed.
    pub fn set_enabled(&mut self, project_id: &str, enabled: bool) -> Result<bool> {
        if self.is_enabled(project_id) == enabled {
            return Ok(false);
        }
        let previous = self.state.projects.insert(project_id.to_string(), enabled);
        if let Err(error) = self.save() {
            match previous {
                Some(previous) => self.state.projects.insert(project_id.to_string(), previous),
                None => self.state.projects.remove(project_id),
            };
            return Err(error);
        }
        Ok(true)
    }

    fn save(&self) -> Result<()> {
        let mut payload = serde_json::to_string_pretty(&self.state)
            .context("failed to serialize report flags")?;
        payload.push('\n');
        write_text_atomic(&self.path, &payload)
            .with_context(|| format!("failed to write report flags {}", self.path.display()))
    }
}
