use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use pmbot_ai::{LlmClient, OllamaClient, OllamaConfig};
use pmbot_backend::{BackendClient, BackendClientConfig, CachedBackend, ProjectBackend};
use pmbot_discord::{
    DiscordApiClient, DiscordBotRuntime, DiscordInboundStore, DiscordRuntimeConfig, ReportSchedule,
    ReviewPipeline, RuntimeServices, DISCORD_INBOUND_FILE,
};
use pmbot_github::{DiffLimits, GithubApiClient, PollCursorStore, SourceHostPoller, POLL_CURSORS_FILE};
use pmbot_review::{ReviewSummarizer, ReviewSummarizerConfig};
use pmbot_session::{
    ConversationHistoryStore, SessionManager, SessionManagerConfig, CONVERSATIONS_FILE,
};
use pmbot_state::{IdentityMappingStore, ReportFlagStore, IDENTITY_MAPPINGS_FILE, REPORT_FLAGS_FILE};
use tokio::sync::watch;

use crate::bootstrap_helpers::model_is_installed;
use crate::cli_args::Cli;

/// Builds every component from `cli` and runs the bot until ctrl-c.
pub(crate) async fn run_bot(cli: Cli) -> Result<()> {
    std::fs::create_dir_all(&cli.state_dir)
        .with_context(|| format!("failed to create {}", cli.state_dir.display()))?;

    let discord = DiscordApiClient::new(
        cli.discord_api_base.clone(),
        cli.discord_token.clone(),
        cli.request_timeout_ms,
        cli.retry_max_attempts,
        cli.retry_base_delay_ms,
    )?;
    let bot_user = discord
        .current_user()
        .await
        .context("failed to resolve bot identity")?;
    tracing::info!(bot_user = %bot_user.username, bot_user_id = %bot_user.id, "connected to discord");

    let backend_client = BackendClient::new(BackendClientConfig {
        api_base: cli.api_base.clone(),
        request_timeout_ms: cli.request_timeout_ms,
        retry_max_attempts: cli.retry_max_attempts,
        retry_base_delay_ms: cli.retry_base_delay_ms,
    })?;
    let backend: Arc<dyn ProjectBackend> = if cli.backend_cache_ttl_ms > 0 {
        CachedBackend::new(backend_client, cli.backend_cache_ttl_ms).into_shared()
    } else {
        Arc::new(backend_client)
    };

    let ollama = OllamaClient::new(OllamaConfig {
        api_base: cli.ollama_base.clone(),
        request_timeout_ms: cli.model_timeout_ms,
        max_retries: cli.ollama_max_retries,
        retry_budget_ms: cli.model_timeout_ms,
    })?;
    match ollama.list_models().await {
        Ok(models) if model_is_installed(&models, &cli.ollama_model) => {
            tracing::info!(model = %cli.ollama_model, "model endpoint ready");
        }
        Ok(models) => tracing::warn!(
            model = %cli.ollama_model,
            installed = %models.join(", "),
            "configured model is not installed; replies will fall back to raw data"
        ),
        Err(error) => tracing::warn!(
            error = %error,
            "model endpoint unreachable; replies will fall back to raw data until it recovers"
        ),
    }
    let llm: Arc<dyn LlmClient> = Arc::new(ollama);

    let history = ConversationHistoryStore::load(cli.state_dir.join(CONVERSATIONS_FILE))?;
    let sessions = Arc::new(SessionManager::new(
        backend.clone(),
        llm.clone(),
        history,
        SessionManagerConfig {
            model: cli.ollama_model.clone(),
            max_turns: cli.session_max_turns,
            idle_timeout_ms: cli.session_idle_timeout_ms,
            model_timeout_ms: cli.model_timeout_ms,
            bot_user_id: Some(bot_user.id.clone()),
            ..SessionManagerConfig::default()
        },
    ));

    let review = if cli.github_repos.is_empty() {
        None
    } else {
        let github = GithubApiClient::new(
            cli.github_api_base.clone(),
            cli.github_token.clone(),
            cli.request_timeout_ms,
            cli.retry_max_attempts,
            cli.retry_base_delay_ms,
        )?;
        let cursors = PollCursorStore::load(cli.state_dir.join(POLL_CURSORS_FILE))?;
        tracing::info!(repositories = cli.github_repos.len(), "watching repositories for merged pull requests");
        Some(ReviewPipeline {
            poller: SourceHostPoller::new(
                github,
                cli.github_repos.clone(),
                cursors,
                cli.pr_seed_lookback_hours,
            ),
            summarizer: ReviewSummarizer::new(
                llm.clone(),
                ReviewSummarizerConfig {
                    model: cli.ollama_model.clone(),
                    limits: DiffLimits {
                        max_files: cli.review_max_files,
                        max_changed_lines: cli.review_max_changed_lines,
                        max_patch_chars: cli.review_max_patch_chars,
                    },
                    security_scan: cli.security_scan,
                    model_timeout_ms: cli.model_timeout_ms,
                },
            ),
        })
    };

    let services = RuntimeServices {
        discord,
        backend,
        sessions,
        mappings: IdentityMappingStore::load(cli.state_dir.join(IDENTITY_MAPPINGS_FILE))?,
        report_flags: ReportFlagStore::load(cli.state_dir.join(REPORT_FLAGS_FILE))?,
        inbound: DiscordInboundStore::load(cli.state_dir.join(DISCORD_INBOUND_FILE))?,
        schedule: ReportSchedule::new(&cli.report_hours, cli.timezone)?,
        review,
    };
    let config = DiscordRuntimeConfig {
        command_prefix: cli.command_prefix.clone(),
        listen_channel_ids: cli.listen_channel_ids.clone(),
        report_channel_id: cli.report_channel_id.clone(),
        admin_user_ids: cli.admin_user_ids.iter().cloned().collect::<BTreeSet<_>>(),
        inbound_poll_interval_ms: cli.inbound_poll_interval_ms,
        pr_poll_interval_ms: cli.pr_poll_interval_ms,
        session_sweep_interval_ms: cli.session_sweep_interval_ms,
        report_window_hours: cli.report_window_hours,
        review_recipient: cli.review_recipient.clone(),
        review_fallback_channel_id: cli.review_fallback_channel_id.clone(),
        shutdown_grace_ms: cli.shutdown_grace_ms,
        announce_startup: cli.announce_startup,
        ..DiscordRuntimeConfig::default()
    };
    let runtime = Arc::new(DiscordBotRuntime::new(config, services, bot_user.id));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("ctrl-c received");
                let _ = shutdown_tx.send(true);
            }
            Err(error) => {
                tracing::error!(error = %error, "failed to listen for ctrl-c; stop the process to exit");
                std::future::pending::<()>().await;
            }
        }
    });
    runtime.run(shutdown_rx).await
}
