//! Discord side of the bot: REST transport, `!` commands, project reports,
//! the report schedule and the runtime that ties the pollers together.

mod commands;
mod discord_api_client;
mod inbound_state_store;
mod report_builder;
mod runtime;
mod scheduler;

pub use commands::{command_usage, normalize_user_reference, parse_bot_command, BotCommand};
pub use discord_api_client::{
    compare_message_ids, is_newer_message, DiscordApiClient, DiscordMessage, DiscordUser,
    DEFAULT_FETCH_LIMIT, DISCORD_MESSAGE_LIMIT,
};
pub use inbound_state_store::{DiscordInboundStore, DISCORD_INBOUND_FILE};
pub use report_builder::{
    build_scheduled_reports, collect_report_data, deadline_tag, render_my_tasks,
    render_project_list, render_project_report, ReportData,
};
pub use runtime::{
    strip_user_mention, DiscordBotRuntime, DiscordRuntimeConfig, InboundCycleReport,
    ReviewDelivery, ReviewPipeline, RuntimeServices,
};
pub use scheduler::ReportSchedule;
