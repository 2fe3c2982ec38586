//! Project status reports and the other task listings posted to chat.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, TimeZone};
use futures_util::stream::{self, StreamExt};
use pmbot_backend::{Commit, MemberStats, Project, ProjectBackend, Task};
use pmbot_core::{truncate_chars, BotError};

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";
const MAX_PERFORMERS: usize = 5;
const MAX_PENDING_LISTED: usize = 10;
const MAX_COMMITS_LISTED: usize = 3;
const COMMIT_MESSAGE_CHARS: usize = 50;
const REPORT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportData {
    pub completed: Vec<Task>,
    pub pending: Vec<Task>,
    pub member_stats: Vec<MemberStats>,
    pub commits: Vec<Commit>,
    pub partial: bool,
}

impl ReportData {
    pub fn completion_rate(&self) -> f64 {
        let total = self.completed.len() + self.pending.len();
        if total == 0 {
            return 0.0;
        }
        self.completed.len() as f64 / total as f64 * 100.0
    }
}

pub async fn collect_report_data(
    backend: &dyn ProjectBackend,
    project: &Project,
    hours: u32,
) -> Result<ReportData, BotError> {
    let recent = backend.recent_tasks(hours).await?;
    let pending = backend.incomplete_tasks(&project.id).await?;
    let stats = backend.member_stats(&project.id, hours).await?;
    let commits = backend.recent_commits(&project.id, hours).await?;
    let partial =
        recent.is_partial() || pending.is_partial() || stats.is_partial() || commits.is_partial();
    Ok(ReportData {
        completed: recent
            .rows
            .into_iter()
            .filter(|task| task.belongs_to(project) && task.is_completed())
            .collect(),
        pending: pending.rows,
        member_stats: stats.rows,
        commits: commits.rows,
        partial,
    })
}

/// Deadline marker for a pending task, judged against the local calendar day.
pub fn deadline_tag(due_local: NaiveDate, today: NaiveDate) -> Option<&'static str> {
    let days = due_local.signed_duration_since(today).num_days();
    match days {
        d if d < 0 => Some("⏰ OVERDUE"),
        0 => Some("📅 due today"),
        1 => Some("📅 due tomorrow"),
        _ => None,
    }
}

pub fn render_project_report<Tz: TimeZone>(
    project: &Project,
    data: &ReportData,
    hours: u32,
    now: &DateTime<Tz>,
) -> String {
    let today = now.date_naive();
    let timezone = now.timezone();
    let mut lines = vec![
        "╔═══ PROJECT STATUS REPORT ═══╗".to_string(),
        format!("📁 **PROJECT: {}**", project.name),
        RULE.to_string(),
        format!(
            "✅ **COMPLETED TASKS (Last {hours}h):** {}",
            data.completed.len()
        ),
        format!("⏳ **PENDING TASKS:** {}", data.pending.len()),
        format!("📊 **Completion Rate:** {:.1}%", data.completion_rate()),
        RULE.to_string(),
    ];

    if !data.member_stats.is_empty() {
        lines.push("👥 **TEAM PERFORMANCE**".to_string());
        lines.extend(format_performers(&data.member_stats));
        lines.push(RULE.to_string());
    }

    if !data.pending.is_empty() {
        lines.push("🔥 **PENDING TASKS (Needs Attention)**".to_string());
        for task in data.pending.iter().take(MAX_PENDING_LISTED) {
            let due_tag = task.due_date.and_then(|due| {
                deadline_tag(due.with_timezone(&timezone).date_naive(), today)
            });
            lines.push(format_pending_task(task, due_tag));
        }
        if data.pending.len() > MAX_PENDING_LISTED {
            lines.push(format!(
                "_...and {} more tasks_",
                data.pending.len() - MAX_PENDING_LISTED
            ));
        }
        lines.push(RULE.to_string());
    }

    if !data.commits.is_empty() {
        lines.push(format!(
            "💻 **GITHUB ACTIVITY ({} commits)**",
            data.commits.len()
        ));
        lines.extend(format_commits(&data.commits));
        lines.push(RULE.to_string());
    }

    if data.partial {
        lines.push("⚠️ Some records could not be read; figures may be incomplete.".to_string());
    }
    lines.join("\n")
}

fn format_performers(stats: &[MemberStats]) -> Vec<String> {
    let mut ranked = stats.iter().collect::<Vec<_>>();
    ranked.sort_by(|left, right| {
        right
            .completed
            .cmp(&left.completed)
            .then_with(|| left.username.cmp(&right.username))
    });
    ranked
        .into_iter()
        .take(MAX_PERFORMERS)
        .enumerate()
        .map(|(index, stat)| {
            let marker = if index == 0 { "🏆" } else { "✅" };
            format!(
                "{marker} **{}** {} tasks completed",
                stat.username, stat.completed
            )
        })
        .collect()
}

fn format_pending_task(task: &Task, due_tag: Option<&str>) -> String {
    let high = task.is_high_priority();
    let marker = if high { "🔥" } else { "•" };
    let who = match task.assignee_discord_id() {
        Some(discord_id) => format!("<@{discord_id}>"),
        None => task.assignee_name().to_string(),
    };
    let mut line = format!("{marker} **{}**", task.title);
    if high {
        line.push_str(&format!(" [{}]", task.priority.to_ascii_uppercase()));
    }
    line.push_str(&format!(" - {who}"));
    if let Some(tag) = due_tag {
        line.push(' ');
        line.push_str(tag);
    }
    line
}

fn format_commits(commits: &[Commit]) -> Vec<String> {
    let additions: u64 = commits.iter().map(|commit| commit.additions).sum();
    let deletions: u64 = commits.iter().map(|commit| commit.deletions).sum();
    let mut lines = vec![
        format!("**+{additions} lines | -{deletions} lines**"),
        "Recent commits:".to_string(),
    ];
    for commit in commits.iter().take(MAX_COMMITS_LISTED) {
        let message = truncate_chars(
            commit.message.lines().next().unwrap_or_default(),
            COMMIT_MESSAGE_CHARS,
        );
        let mut line = format!("• `{}` @{} \"{message}\"", commit.short_sha(), commit.author);
        if let Some(timestamp) = commit.timestamp.as_deref() {
            line.push_str(&format!(" ({timestamp})"));
        }
        lines.push(line);
    }
    if commits.len() > MAX_COMMITS_LISTED {
        lines.push(format!(
            "_...and {} more commits_",
            commits.len() - MAX_COMMITS_LISTED
        ));
    }
    lines
}

/// Reply for a bare `status` command.
pub fn render_project_list(projects: &[Project], prefix: &str) -> String {
    if projects.is_empty() {
        return "❌ No active projects found.".to_string();
    }
    let mut lines = vec!["📋 **Active Projects**".to_string()];
    for project in projects {
        match project.team_code.as_deref() {
            Some(team) => lines.push(format!("• **{}** (Team: {team})", project.name)),
            None => lines.push(format!("• **{}**", project.name)),
        }
    }
    lines.push(String::new());
    lines.push(format!("Use `{prefix}status <project>` to get details."));
    lines.join("\n")
}

pub fn render_my_tasks(tasks: &[Task], discord_user_id: &str, prefix: &str) -> String {
    let mine = tasks
        .iter()
        .filter(|task| task.assignee_discord_id() == Some(discord_user_id))
        .collect::<Vec<_>>();
    if mine.is_empty() {
        return format!(
            "📝 You have no tasks assigned.\nIf this is incorrect, make sure your Discord account is linked using `{prefix}link <email>`"
        );
    }
    let (completed, pending): (Vec<&Task>, Vec<&Task>) =
        mine.into_iter().partition(|task| task.is_completed());
    let mut lines = vec![format!("📝 **Your Tasks** <@{discord_user_id}>")];
    if !pending.is_empty() {
        lines.push("⏳ **Pending**".to_string());
        lines.extend(
            pending
                .iter()
                .take(10)
                .map(|task| format!("• **{}** - {}", task.title, task.status)),
        );
    }
    if !completed.is_empty() {
        lines.push("✅ **Recently Completed**".to_string());
        lines.extend(completed.iter().take(5).map(|task| format!("• {}", task.title)));
    }
    lines.join("\n")
}

async fn project_report_message<Tz: TimeZone>(
    backend: &dyn ProjectBackend,
    project: Project,
    hours: u32,
    now: &DateTime<Tz>,
) -> String {
    match collect_report_data(backend, &project, hours).await {
        Ok(data) => render_project_report(&project, &data, hours, now),
        Err(error) => {
            tracing::warn!(project = %project.name, error = %error, "project report failed");
            format!(
                "❌ Failed to generate report for project: {}\nError: {error}",
                project.name
            )
        }
    }
}

/// Builds one message per enabled project. Failures for one project become an
/// error message in the batch and never stop the others.
pub async fn build_scheduled_reports<Tz: TimeZone>(
    backend: &dyn ProjectBackend,
    disabled_project_ids: &BTreeSet<String>,
    hours: u32,
    now: &DateTime<Tz>,
) -> Vec<String> {
    let projects = match backend.list_projects().await {
        Ok(fetched) => fetched.rows,
        Err(error) => {
            tracing::error!(error = %error, "report job could not list projects");
            return vec![format!("❌ Failed to fetch projects from API: {error}")];
        }
    };
    if projects.is_empty() {
        return vec!["📊 No active projects found.".to_string()];
    }

    let total = projects.len();
    let enabled = projects
        .into_iter()
        .filter(|project| {
            let disabled = disabled_project_ids.contains(&project.id);
            if disabled {
                tracing::debug!(project = %project.name, "reports disabled; skipping");
            }
            !disabled
        })
        .collect::<Vec<Project>>();
    let messages = stream::iter(enabled)
        .map(|project| project_report_message(backend, project, hours, now))
        .buffered(REPORT_CONCURRENCY)
        .collect::<Vec<_>>()
        .await;
    tracing::info!(
        projects = total,
        messages = messages.len(),
        "scheduled reports built"
    );
    messages
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone, Utc};
    use pmbot_backend::{
        Assignee, Commit, Fetched, LinkOutcome, MemberStats, Project, ProjectBackend, Task,
    };
    use pmbot_core::BotError;

    use super::{
        build_scheduled_reports, deadline_tag, render_my_tasks, render_project_list,
        render_project_report, ReportData,
    };

    struct ThreeProjects;

    #[async_trait]
    impl ProjectBackend for ThreeProjects {
        async fn list_projects(&self) -> Result<Fetched<Project>, BotError> {
            Ok(Fetched::complete(
                ["p1", "p2", "p3"]
                    .into_iter()
                    .map(|id| Project {
                        id: id.to_string(),
                        name: format!("Project {id}"),
                        status: "active".to_string(),
                        team_code: None,
                    })
                    .collect(),
            ))
        }

        async fn recent_tasks(&self, _hours: u32) -> Result<Fetched<Task>, BotError> {
            Ok(Fetched::complete(Vec::new()))
        }

        async fn member_stats(
            &self,
            _project_id: &str,
            _hours: u32,
        ) -> Result<Fetched<MemberStats>, BotError> {
            Ok(Fetched::complete(Vec::new()))
        }

        async fn incomplete_tasks(&self, _project_id: &str) -> Result<Fetched<Task>, BotError> {
            Ok(Fetched::complete(Vec::new()))
        }

        async fn recent_commits(
            &self,
            project_id: &str,
            _hours: u32,
        ) -> Result<Fetched<Commit>, BotError> {
            if project_id == "p3" {
                return Err(BotError::unavailable("backend", "commits unavailable"));
            }
            Ok(Fetched::complete(Vec::new()))
        }

        async fn link_account(
            &self,
            _discord_id: &str,
            _email: &str,
        ) -> Result<LinkOutcome, BotError> {
            Ok(LinkOutcome {
                success: false,
                message: None,
            })
        }
    }

    fn project() -> Project {
        Project {
            id: "p1".to_string(),
            name: "Mobile App".to_string(),
            status: "active".to_string(),
            team_code: Some("MOB".to_string()),
        }
    }

    fn task(title: &str, status: &str, priority: &str, discord_id: Option<&str>) -> Task {
        Task {
            id: None,
            title: title.to_string(),
            status: status.to_string(),
            priority: priority.to_string(),
            project_id: Some("p1".to_string()),
            project_name: None,
            due_date: None,
            assignee: Some(Assignee {
                name: None,
                username: Some("mei".to_string()),
                discord_id: discord_id.map(str::to_string),
            }),
        }
    }

    #[test]
    fn unit_deadline_tags_follow_calendar_days() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 10).expect("date");
        let on = |day| NaiveDate::from_ymd_opt(2026, 3, day).expect("date");
        assert_eq!(deadline_tag(on(9), today), Some("⏰ OVERDUE"));
        assert_eq!(deadline_tag(on(10), today), Some("📅 due today"));
        assert_eq!(deadline_tag(on(11), today), Some("📅 due tomorrow"));
        assert_eq!(deadline_tag(on(12), today), None);
    }

    #[test]
    fn functional_report_lists_rates_performers_tasks_and_commits() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).single().expect("now");
        let mut overdue = task("Fix login crash", "in_progress", "high", Some("42"));
        overdue.due_date = Some(Utc.with_ymd_and_hms(2026, 3, 8, 0, 0, 0).single().expect("due"));
        let mut pending = vec![overdue, task("Write docs", "todo", "normal", None)];
        for index in 0..10 {
            pending.push(task(&format!("Chore {index}"), "todo", "low", None));
        }
        let data = ReportData {
            completed: vec![task("Ship it", "completed", "normal", None); 3],
            pending,
            member_stats: vec![
                MemberStats {
                    username: "mei".to_string(),
                    discord_id: None,
                    completed: 1,
                },
                MemberStats {
                    username: "ravi".to_string(),
                    discord_id: Some("42".to_string()),
                    completed: 3,
                },
            ],
            commits: (0..4)
                .map(|index| Commit {
                    sha: format!("abcdef123456{index}"),
                    author: "ravi".to_string(),
                    message: "x".repeat(80),
                    timestamp: None,
                    additions: 10,
                    deletions: 2,
                })
                .collect(),
            partial: false,
        };

        let report = render_project_report(&project(), &data, 12, &now);
        assert!(report.contains("📁 **PROJECT: Mobile App**"));
        assert!(report.contains("✅ **COMPLETED TASKS (Last 12h):** 3"));
        assert!(report.contains("⏳ **PENDING TASKS:** 12"));
        assert!(report.contains("📊 **Completion Rate:** 20.0%"));
        assert!(report.contains("🏆 **ravi** 3 tasks completed\n✅ **mei** 1 tasks completed"));
        assert!(report.contains("🔥 **Fix login crash** [HIGH] - <@42> ⏰ OVERDUE"));
        assert!(report.contains("• **Write docs** - mei"));
        assert!(report.contains("_...and 2 more tasks_"));
        assert!(report.contains("**+40 lines | -8 lines**"));
        assert!(report.contains("• `abcdef1` @ravi"));
        assert!(report.contains(&format!("\"{}...\"", "x".repeat(47))));
        assert!(report.contains("_...and 1 more commits_"));
        assert!(!report.contains("incomplete"));
    }

    #[test]
    fn unit_project_list_and_my_tasks_replies() {
        let listing = render_project_list(&[project()], "!");
        assert!(listing.contains("• **Mobile App** (Team: MOB)"));
        assert!(listing.contains("`!status <project>`"));
        assert_eq!(render_project_list(&[], "!"), "❌ No active projects found.");

        let tasks = vec![
            task("Fix login crash", "in_progress", "high", Some("42")),
            task("Ship it", "completed", "normal", Some("42")),
            task("Someone else's", "todo", "normal", Some("7")),
        ];
        let mine = render_my_tasks(&tasks, "42", "!");
        assert!(mine.contains("• **Fix login crash** - in_progress"));
        assert!(mine.contains("✅ **Recently Completed**\n• Ship it"));
        assert!(!mine.contains("Someone else's"));
        assert!(render_my_tasks(&tasks, "99", "!").contains("You have no tasks assigned"));
    }

    #[tokio::test]
    async fn regression_scheduled_reports_build_inside_a_spawned_task() {
        let backend: Arc<dyn ProjectBackend> = Arc::new(ThreeProjects);
        let disabled = BTreeSet::from(["p2".to_string()]);
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();

        let messages = tokio::spawn(async move {
            build_scheduled_reports(backend.as_ref(), &disabled, 24, &now).await
        })
        .await
        .expect("report task");

        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("Project p1"));
        assert!(messages[1].starts_with("❌ Failed to generate report for project: Project p3"));
    }
}
