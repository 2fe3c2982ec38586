//! Backend query gateway for the project-management web application.
//!
//! Each `ProjectBackend` method maps to one endpoint, validates its arguments
//! before any request is sent, and reports failures as `BotError` kinds so
//! callers can choose between retrying, reporting and degrading.

use async_trait::async_trait;
use pmbot_core::BotError;

mod backend_client;
pub mod models;
mod query_cache;

pub use backend_client::{validate_hours, BackendClient, BackendClientConfig};
pub use models::{Assignee, Commit, Fetched, LinkOutcome, MemberStats, Project, Task};
pub use query_cache::{CachedBackend, QueryCache};

#[async_trait]
pub trait ProjectBackend: Send + Sync {
    async fn list_projects(&self) -> Result<Fetched<Project>, BotError>;

    async fn recent_tasks(&self, hours: u32) -> Result<Fetched<Task>, BotError>;

    async fn member_stats(&self, project_id: &str, hours: u32) -> Result<Fetched<MemberStats>, BotError>;

    async fn incomplete_tasks(&self, project_id: &str) -> Result<Fetched<Task>, BotError>;

    async fn recent_commits(&self, project_id: &str, hours: u32) -> Result<Fetched<Commit>, BotError>;

    async fn link_account(&self, discord_id: &str, email: &str) -> Result<LinkOutcome, BotError>;
}

/// Finds a project by case-insensitive name.
pub fn find_project_by_name<'a>(projects: &'a [Project], name: &str) -> Option<&'a Project> {
    let wanted = name.trim();
    projects
        .iter()
        .find(|project| project.name.eq_ignore_ascii_case(wanted))
}
