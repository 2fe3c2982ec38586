//! Entity shapes returned by the project-management API.
//!
//! The backend is loose about field names (`_id` vs `id`, `userName` vs
//! `username`) and about due-date encoding, so every entity is decoded from a
//! permissive wire struct and normalized here.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub status: String,
    pub team_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Assignee {
    pub name: Option<String>,
    pub username: Option<String>,
    pub discord_id: Option<String>,
}

impl Assignee {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.username.as_deref())
            .unwrap_or("Unassigned")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: Option<String>,
    pub title: String,
    pub status: String,
    pub priority: String,
    pub project_id: Option<String>,
    pub project_name: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub assignee: Option<Assignee>,
}

impl Task {
    pub fn is_completed(&self) -> bool {
        self.status.eq_ignore_ascii_case("completed")
    }

    pub fn is_high_priority(&self) -> bool {
        matches!(
            self.priority.to_ascii_uppercase().as_str(),
            "HIGH" | "URGENT"
        )
    }

    pub fn assignee_discord_id(&self) -> Option<&str> {
        self.assignee
            .as_ref()
            .and_then(|assignee| assignee.discord_id.as_deref())
    }

    pub fn assignee_name(&self) -> &str {
        self.assignee
            .as_ref()
            .map(Assignee::display_name)
            .unwrap_or("Unassigned")
    }

    pub fn belongs_to(&self, project: &Project) -> bool {
        if let Some(project_id) = self.project_id.as_deref() {
            return project_id == project.id;
        }
        self.project_name
            .as_deref()
            .map(|name| name.eq_ignore_ascii_case(&project.name))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberStats {
    pub username: String,
    pub discord_id: Option<String>,
    pub completed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    pub author: String,
    pub message: String,
    pub timestamp: Option<String>,
    pub additions: u64,
    pub deletions: u64,
}

impl Commit {
    pub fn short_sha(&self) -> &str {
        let end = self
            .sha
            .char_indices()
            .nth(7)
            .map(|(index, _)| index)
            .unwrap_or(self.sha.len());
        &self.sha[..end]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkOutcome {
    pub success: bool,
    pub message: Option<String>,
}

/// Rows decoded from a list endpoint plus the number of rows that did not
/// decode. A non-zero `skipped` marks the result as partial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched<T> {
    pub rows: Vec<T>,
    pub skipped: usize,
}

impl<T> Fetched<T> {
    pub fn complete(rows: Vec<T>) -> Self {
        Self { rows, skipped: 0 }
    }

    pub fn is_partial(&self) -> bool {
        self.skipped > 0
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireProject {
    #[serde(rename = "_id")]
    underscore_id: Option<Value>,
    id: Option<Value>,
    name: Option<String>,
    status: Option<String>,
    #[serde(rename = "teamCode")]
    team_code: Option<String>,
}

impl WireProject {
    pub(crate) fn normalize(self) -> Option<Project> {
        let id = self
            .underscore_id
            .as_ref()
            .and_then(value_as_id)
            .or_else(|| self.id.as_ref().and_then(value_as_id))?;
        Some(Project {
            id,
            name: self.name.unwrap_or_else(|| "Unknown".to_string()),
            status: self.status.unwrap_or_else(|| "unknown".to_string()),
            team_code: self.team_code.filter(|code| !code.trim().is_empty()),
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireAssignee {
    name: Option<String>,
    username: Option<String>,
    #[serde(rename = "discordId")]
    discord_id: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireTask {
    #[serde(rename = "_id")]
    underscore_id: Option<Value>,
    id: Option<Value>,
    title: Option<String>,
    status: Option<String>,
    priority: Option<String>,
    #[serde(rename = "projectId")]
    project_id: Option<Value>,
    #[serde(rename = "projectName")]
    project_name: Option<String>,
    #[serde(rename = "dueDate")]
    due_date: Option<Value>,
    assignee: Option<WireAssignee>,
}

impl WireTask {
    pub(crate) fn normalize(self) -> Option<Task> {
        Some(Task {
            id: self
                .underscore_id
                .as_ref()
                .and_then(value_as_id)
                .or_else(|| self.id.as_ref().and_then(value_as_id)),
            title: self.title.unwrap_or_else(|| "Untitled".to_string()),
            status: self.status.unwrap_or_else(|| "unknown".to_string()),
            priority: self.priority.unwrap_or_else(|| "medium".to_string()),
            project_id: self.project_id.as_ref().and_then(value_as_id),
            project_name: self.project_name,
            due_date: self.due_date.as_ref().and_then(parse_due_date),
            assignee: self.assignee.map(|assignee| Assignee {
                name: assignee.name,
                username: assignee.username,
                discord_id: assignee.discord_id.as_ref().and_then(value_as_id),
            }),
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireMemberStats {
    #[serde(alias = "userName")]
    username: Option<String>,
    #[serde(rename = "discordId")]
    discord_id: Option<Value>,
    #[serde(default)]
    completed: u64,
}

impl WireMemberStats {
    pub(crate) fn normalize(self) -> Option<MemberStats> {
        Some(MemberStats {
            username: self.username.unwrap_or_else(|| "Unknown".to_string()),
            discord_id: self.discord_id.as_ref().and_then(value_as_id),
            completed: self.completed,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireCommit {
    sha: Option<String>,
    author: Option<String>,
    message: Option<String>,
    timestamp: Option<String>,
    #[serde(default)]
    additions: u64,
    #[serde(default)]
    deletions: u64,
}

impl WireCommit {
    pub(crate) fn normalize(self) -> Option<Commit> {
        Some(Commit {
            sha: self.sha.unwrap_or_else(|| "unknown".to_string()),
            author: self.author.unwrap_or_else(|| "Unknown".to_string()),
            message: self.message.unwrap_or_else(|| "No message".to_string()),
            timestamp: self.timestamp,
            additions: self.additions,
            deletions: self.deletions,
        })
    }
}

fn value_as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Accepts RFC3339 strings, plain `YYYY-MM-DD` dates and Unix milliseconds.
pub fn parse_due_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(number) => {
            let millis = number.as_i64()?;
            Utc.timestamp_millis_opt(millis).single()
        }
        Value::String(text) => {
            let text = text.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
                return Some(parsed.with_timezone(&Utc));
            }
            let date = chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
            Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
        }
        _ => None,
    }
}
