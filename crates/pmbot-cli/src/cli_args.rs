use std::path::PathBuf;

use chrono_tz::Tz;
use clap::{ArgAction, Parser};
use pmbot_github::RepoRef;
use pmbot_review::RecipientPolicy;

#[derive(Debug, Parser)]
#[command(
    name = "pmbot",
    about = "Discord project-management bot with scheduled reports, PR reviews and chat",
    version
)]
pub(crate) struct Cli {
    #[arg(
        long = "discord-token",
        env = "PMBOT_DISCORD_TOKEN",
        hide_env_values = true,
        help = "Discord bot token"
    )]
    pub(crate) discord_token: String,

    #[arg(
        long = "discord-api-base",
        env = "PMBOT_DISCORD_API_BASE",
        default_value = "https://discord.com/api/v10",
        help = "Discord REST API base URL"
    )]
    pub(crate) discord_api_base: String,

    #[arg(
        long = "report-channel-id",
        env = "PMBOT_REPORT_CHANNEL_ID",
        help = "Channel that receives scheduled reports"
    )]
    pub(crate) report_channel_id: String,

    #[arg(
        long = "listen-channel-ids",
        env = "PMBOT_LISTEN_CHANNEL_IDS",
        value_delimiter = ',',
        help = "Channels polled for commands and mentions (comma separated)"
    )]
    pub(crate) listen_channel_ids: Vec<String>,

    #[arg(
        long = "admin-user-ids",
        env = "PMBOT_ADMIN_USER_IDS",
        value_delimiter = ',',
        help = "Discord user ids allowed to run admin commands. Empty allows everyone."
    )]
    pub(crate) admin_user_ids: Vec<String>,

    #[arg(
        long = "command-prefix",
        env = "PMBOT_COMMAND_PREFIX",
        default_value = "!",
        help = "Prefix that marks a chat message as a command"
    )]
    pub(crate) command_prefix: String,

    #[arg(
        long = "api-base",
        env = "PMBOT_API_BASE",
        default_value = "http://localhost:3000",
        help = "Base URL of the project-management web application"
    )]
    pub(crate) api_base: String,

    #[arg(
        long = "backend-cache-ttl-ms",
        env = "PMBOT_BACKEND_CACHE_TTL_MS",
        default_value_t = 300_000,
        help = "TTL for cached project and task listings. 0 disables the cache."
    )]
    pub(crate) backend_cache_ttl_ms: u64,

    #[arg(
        long = "ollama-base",
        env = "PMBOT_OLLAMA_BASE",
        default_value = "http://localhost:11434",
        help = "Ollama server base URL"
    )]
    pub(crate) ollama_base: String,

    #[arg(
        long = "ollama-model",
        env = "PMBOT_OLLAMA_MODEL",
        default_value = "llama3.1",
        help = "Model used for chat replies and pull-request reviews"
    )]
    pub(crate) ollama_model: String,

    #[arg(
        long = "ollama-max-retries",
        env = "PMBOT_OLLAMA_MAX_RETRIES",
        default_value_t = 2,
        help = "Retries for retryable model endpoint failures"
    )]
    pub(crate) ollama_max_retries: usize,

    #[arg(
        long = "model-timeout-ms",
        env = "PMBOT_MODEL_TIMEOUT_MS",
        default_value_t = 120_000,
        value_parser = parse_positive_u64,
        help = "Upper bound for one model call"
    )]
    pub(crate) model_timeout_ms: u64,

    #[arg(
        long = "report-hours",
        env = "PMBOT_REPORT_HOURS",
        value_delimiter = ',',
        default_values_t = vec![8, 20],
        value_parser = parse_report_hour,
        help = "Local hours (0-23) at which reports are sent"
    )]
    pub(crate) report_hours: Vec<u32>,

    #[arg(
        long = "report-window-hours",
        env = "PMBOT_REPORT_WINDOW_HOURS",
        default_value_t = 12,
        value_parser = parse_window_hours,
        help = "Look-back window for completed tasks, member stats and commits in reports"
    )]
    pub(crate) report_window_hours: u32,

    #[arg(
        long = "timezone",
        env = "PMBOT_TIMEZONE",
        default_value = "Asia/Kolkata",
        value_parser = parse_timezone,
        help = "IANA timezone the report hours refer to"
    )]
    pub(crate) timezone: Tz,

    #[arg(
        long = "github-token",
        env = "PMBOT_GITHUB_TOKEN",
        hide_env_values = true,
        help = "GitHub token for private repositories and higher rate limits"
    )]
    pub(crate) github_token: Option<String>,

    #[arg(
        long = "github-api-base",
        env = "PMBOT_GITHUB_API_BASE",
        default_value = "https://api.github.com",
        help = "GitHub REST API base URL"
    )]
    pub(crate) github_api_base: String,

    #[arg(
        long = "github-repos",
        env = "PMBOT_GITHUB_REPOS",
        value_delimiter = ',',
        value_parser = parse_repo,
        help = "Repositories (owner/repo) watched for merged pull requests. Empty disables reviews."
    )]
    pub(crate) github_repos: Vec<RepoRef>,

    #[arg(
        long = "pr-poll-interval-ms",
        env = "PMBOT_PR_POLL_INTERVAL_MS",
        default_value_t = 300_000,
        value_parser = parse_positive_u64,
        help = "Interval between merged pull-request polls"
    )]
    pub(crate) pr_poll_interval_ms: u64,

    #[arg(
        long = "pr-seed-lookback-hours",
        env = "PMBOT_PR_SEED_LOOKBACK_HOURS",
        default_value_t = 24,
        value_parser = parse_window_hours,
        help = "How far back a repository without a cursor is scanned on its first poll"
    )]
    pub(crate) pr_seed_lookback_hours: u32,

    #[arg(
        long = "review-recipient",
        env = "PMBOT_REVIEW_RECIPIENT",
        default_value = "author",
        value_parser = parse_recipient_policy,
        help = "Who receives reviews: author, owner or fixed:<discord-user-id>"
    )]
    pub(crate) review_recipient: RecipientPolicy,

    #[arg(
        long = "review-fallback-channel-id",
        env = "PMBOT_REVIEW_FALLBACK_CHANNEL_ID",
        help = "Channel used when a review recipient cannot be resolved or messaged"
    )]
    pub(crate) review_fallback_channel_id: Option<String>,

    #[arg(
        long = "security-scan",
        env = "PMBOT_SECURITY_SCAN",
        default_value_t = true,
        action = ArgAction::Set,
        help = "Run a second, security-focused model pass for each review"
    )]
    pub(crate) security_scan: bool,

    #[arg(
        long = "review-max-files",
        env = "PMBOT_REVIEW_MAX_FILES",
        default_value_t = 20,
        value_parser = parse_positive_usize,
        help = "Files included in the review diff"
    )]
    pub(crate) review_max_files: usize,

    #[arg(
        long = "review-max-changed-lines",
        env = "PMBOT_REVIEW_MAX_CHANGED_LINES",
        default_value_t = 1_000,
        value_parser = parse_positive_usize,
        help = "Changed-line budget of the review diff"
    )]
    pub(crate) review_max_changed_lines: usize,

    #[arg(
        long = "review-max-patch-chars",
        env = "PMBOT_REVIEW_MAX_PATCH_CHARS",
        default_value_t = 5_000,
        value_parser = parse_positive_usize,
        help = "Per-file patch cut-off in characters"
    )]
    pub(crate) review_max_patch_chars: usize,

    #[arg(
        long = "state-dir",
        env = "PMBOT_STATE_DIR",
        default_value = ".pmbot",
        help = "Directory for mappings, cursors, report flags and conversation history"
    )]
    pub(crate) state_dir: PathBuf,

    #[arg(
        long = "inbound-poll-interval-ms",
        env = "PMBOT_INBOUND_POLL_INTERVAL_MS",
        default_value_t = 3_000,
        value_parser = parse_positive_u64,
        help = "Interval between Discord channel polls"
    )]
    pub(crate) inbound_poll_interval_ms: u64,

    #[arg(
        long = "session-max-turns",
        env = "PMBOT_SESSION_MAX_TURNS",
        default_value_t = 10,
        value_parser = parse_positive_usize,
        help = "Turns kept per conversation"
    )]
    pub(crate) session_max_turns: usize,

    #[arg(
        long = "session-idle-timeout-ms",
        env = "PMBOT_SESSION_IDLE_TIMEOUT_MS",
        default_value_t = 1_800_000,
        value_parser = parse_positive_u64,
        help = "Idle time after which a conversation is forgotten"
    )]
    pub(crate) session_idle_timeout_ms: u64,

    #[arg(
        long = "session-sweep-interval-ms",
        env = "PMBOT_SESSION_SWEEP_INTERVAL_MS",
        default_value_t = 60_000,
        value_parser = parse_positive_u64,
        help = "Interval of the idle-conversation sweep"
    )]
    pub(crate) session_sweep_interval_ms: u64,

    #[arg(
        long = "request-timeout-ms",
        env = "PMBOT_REQUEST_TIMEOUT_MS",
        default_value_t = 15_000,
        value_parser = parse_positive_u64,
        help = "HTTP timeout for Discord, GitHub and backend requests"
    )]
    pub(crate) request_timeout_ms: u64,

    #[arg(
        long = "retry-max-attempts",
        env = "PMBOT_RETRY_MAX_ATTEMPTS",
        default_value_t = 3,
        value_parser = parse_positive_usize,
        help = "Attempts per HTTP request on retryable failures"
    )]
    pub(crate) retry_max_attempts: usize,

    #[arg(
        long = "retry-base-delay-ms",
        env = "PMBOT_RETRY_BASE_DELAY_MS",
        default_value_t = 500,
        value_parser = parse_positive_u64,
        help = "Base delay of the exponential retry backoff"
    )]
    pub(crate) retry_base_delay_ms: u64,

    #[arg(
        long = "shutdown-grace-ms",
        env = "PMBOT_SHUTDOWN_GRACE_MS",
        default_value_t = 10_000,
        help = "How long in-flight work may run after a shutdown request"
    )]
    pub(crate) shutdown_grace_ms: u64,

    #[arg(
        long = "announce-startup",
        env = "PMBOT_ANNOUNCE_STARTUP",
        default_value_t = true,
        action = ArgAction::Set,
        help = "Post an online message to the report channel at startup"
    )]
    pub(crate) announce_startup: bool,
}

pub(crate) fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .trim()
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

pub(crate) fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .trim()
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

pub(crate) fn parse_report_hour(value: &str) -> Result<u32, String> {
    let hour = value
        .trim()
        .parse::<u32>()
        .map_err(|error| format!("failed to parse hour: {error}"))?;
    if hour > 23 {
        return Err(format!("hour {hour} is outside 0-23"));
    }
    Ok(hour)
}

pub(crate) fn parse_window_hours(value: &str) -> Result<u32, String> {
    let hours = value
        .trim()
        .parse::<u32>()
        .map_err(|error| format!("failed to parse hours: {error}"))?;
    pmbot_backend::validate_hours(hours).map_err(|error| error.to_string())
}

pub(crate) fn parse_timezone(value: &str) -> Result<Tz, String> {
    value
        .trim()
        .parse::<Tz>()
        .map_err(|_| format!("unknown timezone '{value}'"))
}

pub(crate) fn parse_repo(value: &str) -> Result<RepoRef, String> {
    RepoRef::parse(value).map_err(|error| error.to_string())
}

pub(crate) fn parse_recipient_policy(value: &str) -> Result<RecipientPolicy, String> {
    value.parse::<RecipientPolicy>()
}
