//! Keyword heuristics that decide what a message is asking for and which
//! entity it is about. Only the observable contract matters: a named entity
//! becomes the topic, and a message naming nothing reuses the current one.

use pmbot_backend::Project;

use crate::member_roster::KnownMember;
use crate::session::Topic;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    ProjectStatus,
    PendingTasks,
    TeamActivity,
    Stats,
    MyTasks,
    Overview,
    Unknown,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProjectStatus => "project_status",
            Self::PendingTasks => "pending_tasks",
            Self::TeamActivity => "team_activity",
            Self::Stats => "stats",
            Self::MyTasks => "my_tasks",
            Self::Overview => "overview",
            Self::Unknown => "unknown",
        }
    }
}

const MY_TASK_KEYWORDS: &[&str] = &["my tasks", "my task", "assigned to me", "my work", "my todo"];
const OVERVIEW_KEYWORDS: &[&str] = &[
    "all projects",
    "which projects",
    "what projects",
    "list projects",
    "list the projects",
    "active projects",
];
const PENDING_KEYWORDS: &[&str] = &[
    "pending", "todo", "to do", "incomplete", "deadline", "due", "overdue", "remaining",
    "open task", "tasks",
];
const TEAM_KEYWORDS: &[&str] = &["team", "who", "working on", "assigned", "members", "contributors"];
const STATS_KEYWORDS: &[&str] = &[
    "how many", "statistics", "stats", "summary", "commits", "velocity", "numbers",
];
const STATUS_KEYWORDS: &[&str] = &[
    "status", "progress", "how is", "how's", "going", "doing", "update", "health",
];

pub fn classify_intent(text: &str) -> Intent {
    let lowered = text.to_lowercase();
    let has = |keywords: &[&str]| keywords.iter().any(|keyword| lowered.contains(keyword));
    if has(MY_TASK_KEYWORDS) {
        Intent::MyTasks
    } else if has(OVERVIEW_KEYWORDS) {
        Intent::Overview
    } else if has(PENDING_KEYWORDS) {
        Intent::PendingTasks
    } else if has(TEAM_KEYWORDS) {
        Intent::TeamActivity
    } else if has(STATS_KEYWORDS) {
        Intent::Stats
    } else if has(STATUS_KEYWORDS) {
        Intent::ProjectStatus
    } else {
        Intent::Unknown
    }
}

/// Longest known project name that appears in `text` on word boundaries.
pub fn find_project_mention<'a>(text: &str, projects: &'a [Project]) -> Option<&'a Project> {
    let lowered = text.to_lowercase();
    projects
        .iter()
        .filter(|project| !project.name.trim().is_empty())
        .filter(|project| contains_phrase(&lowered, &project.name.trim().to_lowercase()))
        .max_by_key(|project| project.name.trim().chars().count())
}

/// A Discord mention (`<@123>`, `<@!123>`) or an `@handle` naming a member.
pub fn find_member_mention(text: &str, bot_user_id: Option<&str>) -> Option<Topic> {
    for token in text.split_whitespace() {
        let token = token.trim_end_matches(|ch: char| matches!(ch, '?' | '!' | '.' | ',' | ':' | ';'));
        if let Some(inner) = token
            .strip_prefix("<@")
            .and_then(|rest| rest.strip_suffix('>'))
        {
            let discord_id = inner.trim_start_matches('!');
            if discord_id.is_empty() || !discord_id.chars().all(|ch| ch.is_ascii_digit()) {
                continue;
            }
            if Some(discord_id) == bot_user_id {
                continue;
            }
            return Some(Topic::Member {
                label: format!("<@{discord_id}>"),
                discord_id: Some(discord_id.to_string()),
            });
        }
        if let Some(handle) = token.strip_prefix('@') {
            let valid = !handle.is_empty()
                && handle
                    .chars()
                    .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'));
            if valid && !matches!(handle, "everyone" | "here") {
                return Some(Topic::Member {
                    label: format!("@{handle}"),
                    discord_id: None,
                });
            }
        }
    }
    None
}

/// Longest known member name that appears in `text` on word boundaries.
pub fn find_named_member<'a>(text: &str, members: &'a [KnownMember]) -> Option<&'a KnownMember> {
    let lowered = text.to_lowercase();
    members
        .iter()
        .filter(|member| contains_phrase(&lowered, &member.name.trim().to_lowercase()))
        .max_by_key(|member| member.name.trim().chars().count())
}

fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    let mut search_from = 0;
    while let Some(offset) = haystack[search_from..].find(phrase) {
        let start = search_from + offset;
        let end = start + phrase.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |ch| !ch.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .map_or(true, |ch| !ch.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        search_from = start + phrase.chars().next().map_or(1, char::len_utf8);
    }
    false
}

/// The data a turn needs, after entity and topic resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnPlan {
    ProjectStatus(Topic),
    PendingTasks(Topic),
    TeamActivity(Topic),
    ProjectStats(Topic),
    MemberTasks(Topic),
    MyTasks,
    Overview,
    Clarify,
}

impl TurnPlan {
    pub fn topic(&self) -> Option<&Topic> {
        match self {
            Self::ProjectStatus(topic)
            | Self::PendingTasks(topic)
            | Self::TeamActivity(topic)
            | Self::ProjectStats(topic)
            | Self::MemberTasks(topic) => Some(topic),
            Self::MyTasks | Self::Overview | Self::Clarify => None,
        }
    }
}

/// Resolves a message against the known projects, the known members and the
/// session's topic. A newly named entity wins; otherwise the current topic is
/// reused; with neither, a topic-bound question becomes a clarification.
pub fn plan_turn(
    text: &str,
    current_topic: Option<&Topic>,
    projects: &[Project],
    members: &[KnownMember],
    bot_user_id: Option<&str>,
) -> TurnPlan {
    let intent = classify_intent(text);
    match intent {
        Intent::MyTasks => return TurnPlan::MyTasks,
        Intent::Overview => return TurnPlan::Overview,
        _ => {}
    }

    let named = find_project_mention(text, projects)
        .map(|project| Topic::Project {
            id: project.id.clone(),
            name: project.name.clone(),
        })
        .or_else(|| find_member_mention(text, bot_user_id))
        .or_else(|| {
            find_named_member(text, members).map(|member| Topic::Member {
                label: member.name.clone(),
                discord_id: member.discord_id.clone(),
            })
        });
    let Some(topic) = named.or_else(|| current_topic.cloned()) else {
        return TurnPlan::Clarify;
    };

    if matches!(topic, Topic::Member { .. }) {
        return TurnPlan::MemberTasks(topic);
    }
    match intent {
        Intent::PendingTasks => TurnPlan::PendingTasks(topic),
        Intent::TeamActivity => TurnPlan::TeamActivity(topic),
        Intent::Stats => TurnPlan::ProjectStats(topic),
        Intent::ProjectStatus | Intent::Unknown | Intent::MyTasks | Intent::Overview => {
            TurnPlan::ProjectStatus(topic)
        }
    }
}
