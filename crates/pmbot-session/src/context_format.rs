use pmbot_backend::{Commit, MemberStats, Project, Task};

const MAX_PROJECTS: usize = 5;
const MAX_TASKS: usize = 10;
const MAX_MEMBERS: usize = 5;
const MAX_COMMITS: usize = 5;

/// Backend data fetched for one turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnData {
    pub projects: Vec<Project>,
    pub tasks: Vec<Task>,
    pub member_stats: Vec<MemberStats>,
    pub commits: Vec<Commit>,
    pub partial: bool,
}

impl TurnData {
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
            && self.tasks.is_empty()
            && self.member_stats.is_empty()
            && self.commits.is_empty()
    }
}

/// Compact text block appended to the user's message for the model, and
/// reused verbatim in degraded replies.
pub fn format_turn_data(data: &TurnData) -> String {
    if data.is_empty() {
        return "No data available.".to_string();
    }
    let mut lines = Vec::new();
    if !data.projects.is_empty() {
        lines.push("PROJECTS:".to_string());
        for project in data.projects.iter().take(MAX_PROJECTS) {
            lines.push(format!("  - {} - Status: {}", project.name, project.status));
        }
    }
    if !data.tasks.is_empty() {
        lines.push("TASKS:".to_string());
        for task in data.tasks.iter().take(MAX_TASKS) {
            let due = task
                .due_date
                .map(|due| format!(", due {}", due.format("%Y-%m-%d")))
                .unwrap_or_default();
            lines.push(format!(
                "  - [{}] {} - {} (Assigned: {}{due})",
                task.priority,
                task.title,
                task.status,
                task.assignee_name()
            ));
        }
        if data.tasks.len() > MAX_TASKS {
            lines.push(format!("  - ... and {} more", data.tasks.len() - MAX_TASKS));
        }
    }
    if !data.member_stats.is_empty() {
        lines.push("TEAM ACTIVITY:".to_string());
        for member in data.member_stats.iter().take(MAX_MEMBERS) {
            lines.push(format!(
                "  - {}: {} tasks completed",
                member.username, member.completed
            ));
        }
    }
    if !data.commits.is_empty() {
        lines.push("COMMITS:".to_string());
        for commit in data.commits.iter().take(MAX_COMMITS) {
            let subject = commit.message.lines().next().unwrap_or_default();
            lines.push(format!(
                "  - {} {} ({}, +{}/-{})",
                commit.short_sha(),
                subject,
                commit.author,
                commit.additions,
                commit.deletions
            ));
        }
    }

    let completed = data.tasks.iter().filter(|task| task.is_completed()).count();
    let open = data.tasks.len() - completed;
    let high_priority = data
        .tasks
        .iter()
        .filter(|task| !task.is_completed() && task.is_high_priority())
        .count();
    let completed_by_team = data
        .member_stats
        .iter()
        .map(|member| member.completed)
        .sum::<u64>();
    lines.push("SUMMARY:".to_string());
    lines.push(format!("  - Tasks listed: {}", data.tasks.len()));
    lines.push(format!("  - Open: {open} (high priority: {high_priority})"));
    lines.push(format!("  - Completed: {completed}"));
    if !data.member_stats.is_empty() {
        lines.push(format!("  - Completed by team in window: {completed_by_team}"));
    }
    if data.partial {
        lines.push("  - Note: some records could not be read; data is partial".to_string());
    }
    lines.join("\n")
}
