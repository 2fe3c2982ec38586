//! Bot runtime: the Discord inbound poll, the merged-PR poll with its review
//! worker, the report scheduler and the idle-session sweep.
//!
//! Every loop watches the same shutdown flag. Chat replies are spawned per
//! message so a slow model call never holds up the poll; turns from the same
//! participant still run one at a time behind the session lock.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use pmbot_backend::{find_project_by_name, ProjectBackend};
use pmbot_core::current_unix_timestamp_ms;
use pmbot_github::{PullRequestDescriptor, SourceHostPoller};
use pmbot_review::{render_review, resolve_recipient, Recipient, RecipientPolicy, ReviewSummarizer};
use pmbot_session::SessionManager;
use pmbot_state::{IdentityMappingStore, ReportFlagStore};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;

use crate::commands::{command_usage, parse_bot_command, BotCommand};
use crate::discord_api_client::{DiscordApiClient, DiscordMessage};
use crate::inbound_state_store::DiscordInboundStore;
use crate::report_builder::{
    build_scheduled_reports, collect_report_data, render_my_tasks, render_project_list,
    render_project_report,
};
use crate::scheduler::ReportSchedule;


const REVIEW_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct DiscordRuntimeConfig {
    pub command_prefix: String,
    pub listen_channel_ids: Vec<String>,
    pub report_channel_id: String,
    /// Empty means every user may run admin commands.
    pub admin_user_ids: BTreeSet<String>,
    pub inbound_poll_interval_ms: u64,
    pub pr_poll_interval_ms: u64,
    pub session_sweep_interval_ms: u64,
    pub report_window_hours: u32,
    pub my_tasks_window_hours: u32,
    pub review_recipient: RecipientPolicy,
    pub review_fallback_channel_id: Option<String>,
    pub shutdown_grace_ms: u64,
    pub announce_startup: bool,
}

impl Default for DiscordRuntimeConfig {
    fn default() -> Self {
        Self {
            command_prefix: "!".to_string(),
            listen_channel_ids: Vec::new(),
            report_channel_id: String::new(),
            admin_user_ids: BTreeSet::new(),
            inbound_poll_interval_ms: 3_000,
            pr_poll_interval_ms: 300_000,
            session_sweep_interval_ms: 60_000,
            report_window_hours: 12,
            my_tasks_window_hours: 24 * 7,
            review_recipient: RecipientPolicy::Author,
            review_fallback_channel_id: None,
            shutdown_grace_ms: 10_000,
            announce_startup: true,
        }
    }
}

pub struct ReviewPipeline {
    pub poller: SourceHostPoller,
    pub summarizer: ReviewSummarizer,
}

pub struct RuntimeServices {
    pub discord: DiscordApiClient,
    pub backend: Arc<dyn ProjectBackend>,
    pub sessions: Arc<SessionManager>,
    pub mappings: IdentityMappingStore,
    pub report_flags: ReportFlagStore,
    pub inbound: DiscordInboundStore,
    pub schedule: ReportSchedule,
    pub review: Option<ReviewPipeline>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundCycleReport {
    pub channels: usize,
    pub fetched: usize,
    pub dispatched: usize,
    pub ignored: usize,
    pub failed_channels: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewDelivery {
    DirectMessage { user_id: String },
    Channel { channel_id: String },
    FallbackChannel { channel_id: String },
    Failed,
}

#[derive(Debug, Clone)]
enum InboundAction {
    Command(BotCommand),
    Conversation(String),
}

pub struct DiscordBotRuntime {
    config: DiscordRuntimeConfig,
    bot_user_id: String,
    discord: DiscordApiClient,
    backend: Arc<dyn ProjectBackend>,
    sessions: Arc<SessionManager>,
    mappings: Mutex<IdentityMappingStore>,
    report_flags: Mutex<ReportFlagStore>,
    inbound: Mutex<DiscordInboundStore>,
    schedule: ReportSchedule,
    poller: Option<Arc<SourceHostPoller>>,
    summarizer: Option<Arc<ReviewSummarizer>>,
}

impl DiscordBotRuntime {
    pub fn new(config: DiscordRuntimeConfig, services: RuntimeServices, bot_user_id: String) -> Self {
        let (poller, summarizer) = match services.review {
            Some(pipeline) => (
                Some(Arc::new(pipeline.poller)),
                Some(Arc::new(pipeline.summarizer)),
            ),
            None => (None, None),
        };
        Self {
            config,
            bot_user_id,
            discord: services.discord,
            backend: services.backend,
            sessions: services.sessions,
            mappings: Mutex::new(services.mappings),
            report_flags: Mutex::new(services.report_flags),
            inbound: Mutex::new(services.inbound),
            schedule: services.schedule,
            poller,
            summarizer,
        }
    }

    /// Runs every loop until `shutdown` turns true, then waits up to the grace
    /// period for in-flight work. Reviews already queued are always finished;
    /// each one is bounded by the summarizer's model timeout.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        if self.config.report_channel_id.trim().is_empty() {
            bail!("report channel id is required");
        }
        self.sync_member_roster().await;
        if self.config.announce_startup {
            self.announce_startup().await;
        }

        let mut loops = JoinSet::new();
        loops.spawn(Arc::clone(&self).inbound_loop(shutdown.clone()));
        loops.spawn(Arc::clone(&self).report_loop(shutdown.clone()));
        loops.spawn(Arc::clone(&self).sweep_loop(shutdown.clone()));
        // Never aborted: queued reviews already sit behind an advanced cursor.
        // Ends once the poll loop drops the sender and the queue is empty.
        let review_worker = match (self.poller.clone(), self.summarizer.clone()) {
            (Some(poller), Some(summarizer)) => {
                let (sender, receiver) = mpsc::channel(REVIEW_QUEUE_CAPACITY);
                loops.spawn(Arc::clone(&self).pr_poll_loop(poller, sender, shutdown.clone()));
                Some(tokio::spawn(Arc::clone(&self).review_worker(summarizer, receiver)))
            }
            _ => {
                tracing::info!("no repositories configured; pull-request reviews disabled");
                None
            }
        };
        tracing::info!(
            bot_user_id = %self.bot_user_id,
            schedule = %self.schedule.describe(),
            "bot runtime started"
        );

        wait_for_shutdown(&mut shutdown).await;
        tracing::info!("shutdown requested; draining in-flight work");
        let grace = Duration::from_millis(self.config.shutdown_grace_ms);
        let drained = tokio::time::timeout(grace, async {
            while let Some(joined) = loops.join_next().await {
                if let Err(error) = joined {
                    tracing::error!(error = %error, "runtime loop panicked");
                }
            }
        })
        .await;
        if drained.is_err() {
            tracing::warn!(grace_ms = self.config.shutdown_grace_ms, "grace period elapsed; aborting remaining work");
            loops.abort_all();
            while loops.join_next().await.is_some() {}
        }
        if let Some(worker) = review_worker {
            tracing::info!("waiting for queued reviews to finish");
            if let Err(error) = worker.await {
                tracing::error!(error = %error, "review worker panicked");
            }
        }
        tracing::info!("bot runtime stopped");
        Ok(())
    }

    /// Lets conversations recognise mapped GitHub logins as people.
    async fn sync_member_roster(&self) {
        let mappings = self.mappings.lock().await;
        self.sessions
            .register_members(
                mappings
                    .entries()
                    .map(|(github_login, discord_user_id)| (github_login, Some(discord_user_id))),
            )
            .await;
    }

    async fn announce_startup(&self) {
        let next = self
            .schedule
            .next_after(Utc::now())
            .map(|due| {
                due.with_timezone(&self.schedule.timezone())
                    .format("%Y-%m-%d %H:%M %Z")
                    .to_string()
            })
            .unwrap_or_else(|| "not scheduled".to_string());
        let message = format!(
            "🤖 **Project Manager Bot Online**\n📊 Reports at {}\n⏰ Next report: {next}\n📋 Type `{}help` to see all commands",
            self.schedule.describe(),
            self.config.command_prefix
        );
        if let Err(error) = self
            .discord
            .post_message(&self.config.report_channel_id, &message)
            .await
        {
            tracing::error!(error = %error, "failed to send startup message");
        }
    }

    async fn inbound_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let interval = Duration::from_millis(self.config.inbound_poll_interval_ms.max(1));
        let mut turns = JoinSet::new();
        loop {
            if *shutdown.borrow() {
                break;
            }
            while let Some(joined) = turns.try_join_next() {
                if let Err(error) = joined {
                    tracing::error!(error = %error, "chat turn panicked");
                }
            }
            match self.poll_inbound_once(&mut turns).await {
                Ok(report) if report.dispatched > 0 => {
                    tracing::debug!(
                        channels = report.channels,
                        fetched = report.fetched,
                        dispatched = report.dispatched,
                        ignored = report.ignored,
                        "inbound poll cycle"
                    );
                }
                Ok(_) => {}
                Err(error) => tracing::warn!(error = %error, "inbound poll cycle failed"),
            }
            if sleep_or_shutdown(interval, &mut shutdown).await {
                break;
            }
        }
        while let Some(joined) = turns.join_next().await {
            if let Err(error) = joined {
                tracing::error!(error = %error, "chat turn panicked");
            }
        }
    }

    /// Fetches new messages from every watched channel and spawns a reply task
    /// for each one that needs an answer. A channel seen for the first time is
    /// only primed, so old history is never answered.
    pub async fn poll_inbound_once(
        self: &Arc<Self>,
        turns: &mut JoinSet<()>,
    ) -> Result<InboundCycleReport> {
        let channels = {
            let inbound = self.inbound.lock().await;
            let mut channels = self.config.listen_channel_ids.clone();
            for dm_channel in inbound.dm_channel_ids() {
                if !channels.contains(&dm_channel) {
                    channels.push(dm_channel);
                }
            }
            channels
        };

        let mut report = InboundCycleReport {
            channels: channels.len(),
            ..InboundCycleReport::default()
        };
        for channel_id in channels {
            let (after, is_dm) = {
                let inbound = self.inbound.lock().await;
                (
                    inbound.last_message_id(&channel_id).map(str::to_string),
                    inbound.is_dm_channel(&channel_id),
                )
            };
            let messages = match self
                .discord
                .channel_messages(&channel_id, after.as_deref())
                .await
            {
                Ok(messages) => messages,
                Err(error) => {
                    report.failed_channels += 1;
                    tracing::warn!(channel = %channel_id, error = %error, "failed to poll channel");
                    continue;
                }
            };
            report.fetched += messages.len();
            let priming = after.is_none();

            let mut to_dispatch = Vec::new();
            {
                let mut inbound = self.inbound.lock().await;
                let mut changed = false;
                for message in messages {
                    if !inbound.record_seen(&channel_id, &message.id) {
                        continue;
                    }
                    changed = true;
                    if priming {
                        report.ignored += 1;
                        continue;
                    }
                    match self.classify_message(&message, is_dm) {
                        Some(action) => to_dispatch.push((message, action)),
                        None => report.ignored += 1,
                    }
                }
                if changed {
                    inbound
                        .save()
                        .context("failed to persist discord inbound positions")?;
                }
            }

            for (message, action) in to_dispatch {
                report.dispatched += 1;
                let runtime = Arc::clone(self);
                turns.spawn(async move { runtime.respond(message, action).await });
            }
        }
        Ok(report)
    }

    fn classify_message(&self, message: &DiscordMessage, is_dm: bool) -> Option<InboundAction> {
        if message.author.bot || message.author.id == self.bot_user_id {
            return None;
        }
        if let Some(command) = parse_bot_command(&message.content, &self.config.command_prefix) {
            return Some(InboundAction::Command(command));
        }
        if is_dm || message.mentions_user(&self.bot_user_id) {
            let text = strip_user_mention(&message.content, &self.bot_user_id);
            return Some(InboundAction::Conversation(text));
        }
        None
    }

    async fn respond(&self, message: DiscordMessage, action: InboundAction) {
        let author_id = message.author.id.as_str();
        let reply = match action {
            InboundAction::Command(command) => {
                tracing::info!(
                    command = command.name(),
                    author = %message.author.username,
                    channel = %message.channel_id,
                    "running command"
                );
                self.execute_command(command, author_id).await
            }
            InboundAction::Conversation(text) if text.trim().is_empty() => format!(
                "👋 Ask me about a project, for example \"what's pending on Mobile App?\", or use `{}help`.",
                self.config.command_prefix
            ),
            InboundAction::Conversation(text) => {
                self.sessions.handle_message(author_id, &text).await.text
            }
        };
        if let Err(error) = self.discord.post_message(&message.channel_id, &reply).await {
            tracing::warn!(channel = %message.channel_id, error = %error, "failed to send reply");
        }
    }

    fn is_admin(&self, user_id: &str) -> bool {
        self.config.admin_user_ids.is_empty() || self.config.admin_user_ids.contains(user_id)
    }

    /// Runs one command for `author_id` and returns the reply text.
    pub async fn execute_command(&self, command: BotCommand, author_id: &str) -> String {
        let prefix = self.config.command_prefix.as_str();
        if command.requires_admin() && !self.is_admin(author_id) {
            tracing::warn!(author = %author_id, command = command.name(), "unauthorized admin command");
            return "❌ You don't have permission to run this command.".to_string();
        }

        match command {
            BotCommand::Help => command_usage(prefix),
            BotCommand::Ping => "🏓 Pong!".to_string(),
            BotCommand::Invalid { message } => message,
            BotCommand::Status { project: None } => match self.backend.list_projects().await {
                Ok(projects) => render_project_list(&projects.rows, prefix),
                Err(error) => format!("❌ Failed to fetch project status: {error}"),
            },
            BotCommand::Status {
                project: Some(name),
            } => self.project_status(&name).await,
            BotCommand::MyTasks => match self
                .backend
                .recent_tasks(self.config.my_tasks_window_hours)
                .await
            {
                Ok(tasks) => render_my_tasks(&tasks.rows, author_id, prefix),
                Err(error) => format!("❌ Failed to fetch your tasks: {error}"),
            },
            BotCommand::Link { email } => match self.backend.link_account(author_id, &email).await {
                Ok(outcome) if outcome.success => format!(
                    "✅ Successfully linked your Discord account to {email}!\nYou can now use `{prefix}mytasks` to see your assigned tasks."
                ),
                Ok(outcome) => format!(
                    "❌ Failed to link account: {}\nMake sure the email is registered in the web app.",
                    outcome.message.as_deref().unwrap_or("the backend rejected the request")
                ),
                Err(error) => format!(
                    "❌ Failed to link account: {error}\nMake sure the email is registered in the web app."
                ),
            },
            BotCommand::Report => match self.run_report_job().await {
                Ok(posted) => format!("✅ Reports sent successfully! ({posted} messages)"),
                Err(error) => format!("❌ Failed to generate reports: {error:#}"),
            },
            BotCommand::ReportToggle { project, enabled } => {
                self.toggle_reports(&project, enabled).await
            }
            BotCommand::MapAdd {
                github_login,
                discord_user_id,
            } => {
                let saved = self.mappings.lock().await.upsert(&github_login, &discord_user_id);
                if saved.is_ok() {
                    self.sessions
                        .register_members([(github_login.as_str(), Some(discord_user_id.as_str()))])
                        .await;
                }
                match saved {
                    Ok(Some(previous)) if previous != discord_user_id => format!(
                        "✅ Mapped GitHub user `{github_login}` to <@{discord_user_id}> (was <@{previous}>)."
                    ),
                    Ok(_) => format!("✅ Mapped GitHub user `{github_login}` to <@{discord_user_id}>."),
                    Err(error) => format!("❌ Failed to save mapping: {error}"),
                }
            }
            BotCommand::MapRemove { github_login } => {
                let mut mappings = self.mappings.lock().await;
                match mappings.remove(&github_login) {
                    Ok(true) => format!("✅ Removed mapping for `{github_login}`."),
                    Ok(false) => format!("❌ No mapping for `{github_login}`."),
                    Err(error) => format!("❌ Failed to save mapping: {error}"),
                }
            }
            BotCommand::MapList => {
                let mappings = self.mappings.lock().await;
                if mappings.is_empty() {
                    return "No GitHub to Discord mappings configured.".to_string();
                }
                let mut lines = vec![format!("🔗 **Identity mappings ({})**", mappings.len())];
                lines.extend(
                    mappings
                        .entries()
                        .map(|(login, discord_id)| format!("• `{login}` → <@{discord_id}>")),
                );
                lines.join("\n")
            }
            BotCommand::Reset => self.sessions.reset(author_id).await,
            BotCommand::Context => self.sessions.show_context(author_id).await,
            BotCommand::Ask { question } => {
                self.sessions.handle_message(author_id, &question).await.text
            }
        }
    }

    async fn project_status(&self, name: &str) -> String {
        let projects = match self.backend.list_projects().await {
            Ok(projects) => projects.rows,
            Err(error) => return format!("❌ Failed to fetch project status: {error}"),
        };
        let Some(project) = find_project_by_name(&projects, name) else {
            return format!("❌ Project '{name}' not found.");
        };
        let hours = self.config.report_window_hours;
        match collect_report_data(self.backend.as_ref(), project, hours).await {
            Ok(data) => {
                let now = Utc::now().with_timezone(&self.schedule.timezone());
                render_project_report(project, &data, hours, &now)
            }
            Err(error) => format!("❌ Failed to fetch project status: {error}"),
        }
    }

    async fn toggle_reports(&self, name: &str, enabled: bool) -> String {
        let projects = match self.backend.list_projects().await {
            Ok(projects) => projects.rows,
            Err(error) => return format!("❌ Failed to fetch projects: {error}"),
        };
        let Some(project) = find_project_by_name(&projects, name) else {
            return format!("❌ Project '{name}' not found.");
        };
        let mut flags = self.report_flags.lock().await;
        match flags.set_enabled(&project.id, enabled) {
            Ok(_) => {
                let state = if enabled { "enabled" } else { "disabled" };
                tracing::info!(project = %project.name, enabled, "report flag updated");
                format!("✅ Scheduled reports {state} for **{}**.", project.name)
            }
            Err(error) => format!("❌ Failed to save report settings: {error}"),
        }
    }

    /// Builds every enabled project report and posts it to the report channel.
    /// Returns the number of messages posted.
    pub async fn run_report_job(&self) -> Result<usize> {
        let disabled = {
            let flags = self.report_flags.lock().await;
            flags
                .disabled_projects()
                .map(str::to_string)
                .collect::<BTreeSet<_>>()
        };
        let now = Utc::now().with_timezone(&self.schedule.timezone());
        let messages = build_scheduled_reports(
            self.backend.as_ref(),
            &disabled,
            self.config.report_window_hours,
            &now,
        )
        .await;

        let mut posted = 0_usize;
        let mut last_error = None;
        for message in &messages {
            match self
                .discord
                .post_message(&self.config.report_channel_id, message)
                .await
            {
                Ok(_) => posted += 1,
                Err(error) => {
                    tracing::warn!(error = %error, "failed to post report");
                    last_error = Some(error);
                }
            }
        }
        match last_error {
            Some(error) if posted == 0 => {
                Err(error).context("no report could be delivered to the report channel")
            }
            _ => Ok(posted),
        }
    }

    async fn report_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            let now = Utc::now();
            let Some(due) = self.schedule.next_after(now) else {
                tracing::error!("report schedule yields no further runs; report loop stopping");
                return;
            };
            tracing::info!(next_report = %due, "next scheduled report");
            let wait = (due - now).to_std().unwrap_or_default();
            if sleep_or_shutdown(wait, &mut shutdown).await {
                return;
            }
            match self.run_report_job().await {
                Ok(posted) => tracing::info!(posted, "scheduled reports sent"),
                Err(error) => tracing::error!(error = %format!("{error:#}"), "scheduled report job failed"),
            }
        }
    }

    async fn sweep_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let interval = Duration::from_millis(self.config.session_sweep_interval_ms.max(1));
        loop {
            if sleep_or_shutdown(interval, &mut shutdown).await {
                return;
            }
            let expired = self.sessions.sweep_expired(current_unix_timestamp_ms()).await;
            if expired > 0 {
                tracing::info!(expired, "expired idle conversations");
            }
        }
    }

    async fn pr_poll_loop(
        self: Arc<Self>,
        poller: Arc<SourceHostPoller>,
        sink: mpsc::Sender<PullRequestDescriptor>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let interval = Duration::from_millis(self.config.pr_poll_interval_ms.max(1));
        loop {
            let report = poller.poll_once(&sink).await;
            tracing::info!(
                repositories = report.repositories,
                discovered = report.discovered,
                handed_off = report.handed_off,
                skipped_busy = report.skipped_busy,
                failed = report.failed,
                "pull-request poll cycle"
            );
            if sleep_or_shutdown(interval, &mut shutdown).await {
                return;
            }
        }
    }

    async fn review_worker(
        self: Arc<Self>,
        summarizer: Arc<ReviewSummarizer>,
        mut queue: mpsc::Receiver<PullRequestDescriptor>,
    ) {
        while let Some(pull_request) = queue.recv().await {
            let delivery = self.review_and_deliver(&summarizer, &pull_request).await;
            tracing::info!(pull_request = %pull_request.id(), delivery = ?delivery, "review processed");
        }
    }

    /// Summarizes one merged pull request and delivers it to its recipient.
    /// A failed direct message falls back to the configured channel.
    pub async fn review_and_deliver(
        &self,
        summarizer: &ReviewSummarizer,
        pull_request: &PullRequestDescriptor,
    ) -> ReviewDelivery {
        let recipient = {
            let mappings = self.mappings.lock().await;
            resolve_recipient(
                &self.config.review_recipient,
                pull_request,
                &mappings,
                self.config.review_fallback_channel_id.as_deref(),
            )
        };
        let Some(recipient) = recipient else {
            tracing::warn!(pull_request = %pull_request.id(), "review has no recipient; dropping it");
            return ReviewDelivery::Failed;
        };

        let result = match summarizer.summarize(pull_request, recipient.clone()).await {
            Ok(result) => result,
            Err(error) => {
                tracing::error!(
                    pull_request = %pull_request.id(),
                    error = %error,
                    "review failed; it will not be retried"
                );
                return ReviewDelivery::Failed;
            }
        };
        let rendered = render_review(&result);

        match recipient {
            Recipient::Channel { channel_id } => {
                match self.discord.post_message(&channel_id, &rendered).await {
                    Ok(_) => ReviewDelivery::Channel { channel_id },
                    Err(error) => {
                        tracing::error!(pull_request = %pull_request.id(), error = %error, "failed to post review");
                        ReviewDelivery::Failed
                    }
                }
            }
            Recipient::DirectMessage { user_id } => {
                match self.send_direct_message(&user_id, &rendered).await {
                    Ok(()) => ReviewDelivery::DirectMessage { user_id },
                    Err(error) => {
                        tracing::warn!(
                            pull_request = %pull_request.id(),
                            user = %user_id,
                            error = %format!("{error:#}"),
                            "direct message failed"
                        );
                        self.deliver_to_fallback(pull_request, &rendered).await
                    }
                }
            }
        }
    }

    async fn deliver_to_fallback(
        &self,
        pull_request: &PullRequestDescriptor,
        rendered: &str,
    ) -> ReviewDelivery {
        let Some(channel_id) = self
            .config
            .review_fallback_channel_id
            .clone()
            .filter(|channel_id| !channel_id.trim().is_empty())
        else {
            return ReviewDelivery::Failed;
        };
        match self.discord.post_message(&channel_id, rendered).await {
            Ok(_) => ReviewDelivery::FallbackChannel { channel_id },
            Err(error) => {
                tracing::error!(pull_request = %pull_request.id(), error = %error, "fallback delivery failed");
                ReviewDelivery::Failed
            }
        }
    }

    async fn send_direct_message(&self, user_id: &str, content: &str) -> Result<()> {
        let known = {
            let inbound = self.inbound.lock().await;
            inbound.dm_channel_for(user_id).map(str::to_string)
        };
        let channel_id = match known {
            Some(channel_id) => channel_id,
            None => self.discord.open_dm_channel(user_id).await?,
        };
        let posted = self.discord.post_message(&channel_id, content).await?;

        // Start watching the DM from our own message so the user's answers
        // count as conversation turns.
        let mut inbound = self.inbound.lock().await;
        let mut changed = inbound.remember_dm_channel(user_id, &channel_id);
        if let Some(last_id) = posted.last() {
            changed |= inbound.record_seen(&channel_id, last_id);
        }
        if changed {
            if let Err(error) = inbound.save() {
                tracing::warn!(error = %error, "failed to persist dm channel");
            }
        }
        Ok(())
    }
}

/// Removes `<@id>` and `<@!id>` mentions of `user_id` from `content`.
pub fn strip_user_mention(content: &str, user_id: &str) -> String {
    content
        .replace(&format!("<@!{user_id}>"), "")
        .replace(&format!("<@{user_id}>"), "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Returns true when shutdown was requested before `duration` elapsed.
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = wait_for_shutdown(shutdown) => true,
    }
}
