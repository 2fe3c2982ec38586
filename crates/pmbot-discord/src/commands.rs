//! `!` command parsing. Parsing is pure; execution lives in the runtime.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Help,
    Ping,
    Status { project: Option<String> },
    MyTasks,
    Link { email: String },
    Report,
    ReportToggle { project: String, enabled: bool },
    MapAdd { github_login: String, discord_user_id: String },
    MapRemove { github_login: String },
    MapList,
    Reset,
    Context,
    Ask { question: String },
    Invalid { message: String },
}

impl BotCommand {
    /// Commands gated on the admin list when one is configured.
    pub fn requires_admin(&self) -> bool {
        matches!(
            self,
            BotCommand::Report
                | BotCommand::ReportToggle { .. }
                | BotCommand::MapAdd { .. }
                | BotCommand::MapRemove { .. }
                | BotCommand::MapList
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            BotCommand::Help => "help",
            BotCommand::Ping => "ping",
            BotCommand::Status { .. } => "status",
            BotCommand::MyTasks => "mytasks",
            BotCommand::Link { .. } => "link",
            BotCommand::Report => "report",
            BotCommand::ReportToggle { .. } => "report-toggle",
            BotCommand::MapAdd { .. } => "map-add",
            BotCommand::MapRemove { .. } => "map-remove",
            BotCommand::MapList => "map-list",
            BotCommand::Reset => "reset",
            BotCommand::Context => "context",
            BotCommand::Ask { .. } => "ask",
            BotCommand::Invalid { .. } => "invalid",
        }
    }
}

pub fn command_usage(prefix: &str) -> String {
    [
        "🤖 **Project Manager Bot Commands**".to_string(),
        format!("`{prefix}status [project]` show a project report, or list projects"),
        format!("`{prefix}mytasks` tasks assigned to you (requires linking)"),
        format!("`{prefix}link <email>` link your Discord account to the web app"),
        format!("`{prefix}ask <question>` ask about project state (or just mention me)"),
        format!("`{prefix}context` show what I remember of our conversation"),
        format!("`{prefix}reset` forget our conversation"),
        format!("`{prefix}report` send all reports now (admin)"),
        format!("`{prefix}report enable|disable <project>` toggle scheduled reports (admin)"),
        format!("`{prefix}map add <github_user> <@discord_user>` route PR reviews (admin)"),
        format!("`{prefix}map remove <github_user>` / `{prefix}map list` (admin)"),
        format!("`{prefix}ping` check the bot is alive"),
        format!("`{prefix}help` show this message"),
    ]
    .join("\n")
}

/// Parses `content` as a command. Returns `None` when it does not start with
/// `prefix` followed by a command word.
pub fn parse_bot_command(content: &str, prefix: &str) -> Option<BotCommand> {
    let trimmed = content.trim();
    if prefix.is_empty() {
        return None;
    }
    let body = trimmed.strip_prefix(prefix)?;
    let mut parts = body.splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or_default().to_ascii_lowercase();
    if command.is_empty() {
        return None;
    }
    let remainder = parts.next().unwrap_or_default().trim();

    let invalid = |usage: &str| BotCommand::Invalid {
        message: format!("Usage: {prefix}{usage}"),
    };
    let bare = |parsed: BotCommand, usage: &str| {
        if remainder.is_empty() {
            parsed
        } else {
            invalid(usage)
        }
    };

    let parsed = match command.as_str() {
        "help" => bare(BotCommand::Help, "help"),
        "ping" => bare(BotCommand::Ping, "ping"),
        "mytasks" => bare(BotCommand::MyTasks, "mytasks"),
        "reset" => bare(BotCommand::Reset, "reset"),
        "context" => bare(BotCommand::Context, "context"),
        "status" => BotCommand::Status {
            project: (!remainder.is_empty()).then(|| remainder.to_string()),
        },
        "link" => {
            let mut args = remainder.split_whitespace();
            match (args.next(), args.next()) {
                (Some(email), None) if looks_like_email(email) => BotCommand::Link {
                    email: email.to_string(),
                },
                _ => invalid("link <email>"),
            }
        }
        "ask" => {
            if remainder.is_empty() {
                invalid("ask <question>")
            } else {
                BotCommand::Ask {
                    question: remainder.to_string(),
                }
            }
        }
        "report" => parse_report_args(remainder).unwrap_or_else(|| {
            invalid("report [enable|disable <project>]")
        }),
        "map" => parse_map_args(remainder)
            .unwrap_or_else(|| invalid("map add <github_user> <@discord_user> | map remove <github_user> | map list")),
        other => BotCommand::Invalid {
            message: format!("❌ Unknown command `{prefix}{other}`. Use `{prefix}help` to see available commands."),
        },
    };
    Some(parsed)
}

fn parse_report_args(remainder: &str) -> Option<BotCommand> {
    if remainder.is_empty() {
        return Some(BotCommand::Report);
    }
    let mut parts = remainder.splitn(2, char::is_whitespace);
    let action = parts.next()?.to_ascii_lowercase();
    let project = parts.next().unwrap_or_default().trim();
    if project.is_empty() {
        return None;
    }
    let enabled = match action.as_str() {
        "enable" | "on" => true,
        "disable" | "off" => false,
        _ => return None,
    };
    Some(BotCommand::ReportToggle {
        project: project.to_string(),
        enabled,
    })
}

fn parse_map_args(remainder: &str) -> Option<BotCommand> {
    let mut args = remainder.split_whitespace();
    match (args.next(), args.next(), args.next(), args.next()) {
        (Some("list"), None, None, None) => Some(BotCommand::MapList),
        (Some("remove"), Some(login), None, None) => Some(BotCommand::MapRemove {
            github_login: login.to_string(),
        }),
        (Some("add"), Some(login), Some(target), None) => {
            normalize_user_reference(target).map(|discord_user_id| BotCommand::MapAdd {
                github_login: login.to_string(),
                discord_user_id,
            })
        }
        _ => None,
    }
}

/// Accepts a raw snowflake or a `<@id>` / `<@!id>` mention.
pub fn normalize_user_reference(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let id = trimmed
        .strip_prefix("<@")
        .and_then(|rest| rest.strip_suffix('>'))
        .map(|rest| rest.trim_start_matches('!'))
        .unwrap_or(trimmed);
    (!id.is_empty() && id.chars().all(|ch| ch.is_ascii_digit())).then(|| id.to_string())
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}
