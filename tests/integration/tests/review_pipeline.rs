use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use httpmock::prelude::*;
use pmbot_ai::{ChatRequest, ChatResponse, LlmClient, OllamaClient, OllamaConfig, PmAiError};
use pmbot_backend::{Commit, Fetched, LinkOutcome, MemberStats, Project, ProjectBackend, Task};
use pmbot_core::BotError;
use pmbot_discord::{
    DiscordApiClient, DiscordBotRuntime, DiscordInboundStore, DiscordRuntimeConfig, ReportSchedule,
    ReviewDelivery, RuntimeServices,
};
use pmbot_github::{
    DiffLimits, GithubApiClient, PollCursorStore, PullRequestDescriptor, RepoRef, SourceHostPoller,
};
use pmbot_review::{RecipientPolicy, ReviewSummarizer, ReviewSummarizerConfig};
use pmbot_session::{ConversationHistoryStore, SessionManager, SessionManagerConfig};
use pmbot_state::{IdentityMappingStore, ReportFlagStore};
use serde_json::{json, Value};
use tempfile::tempdir;
use tokio::sync::mpsc;

struct EmptyBackend;

#[async_trait]
impl ProjectBackend for EmptyBackend {
    async fn list_projects(&self) -> Result<Fetched<Project>, BotError> {
        Ok(Fetched::complete(Vec::new()))
    }

    async fn recent_tasks(&self, _hours: u32) -> Result<Fetched<Task>, BotError> {
        Ok(Fetched::complete(Vec::new()))
    }

    async fn member_stats(&self, _project_id: &str, _hours: u32) -> Result<Fetched<MemberStats>, BotError> {
        Ok(Fetched::complete(Vec::new()))
    }

    async fn incomplete_tasks(&self, _project_id: &str) -> Result<Fetched<Task>, BotError> {
        Ok(Fetched::complete(Vec::new()))
    }

    async fn recent_commits(&self, _project_id: &str, _hours: u32) -> Result<Fetched<Commit>, BotError> {
        Ok(Fetched::complete(Vec::new()))
    }

    async fn link_account(&self, _discord_id: &str, _email: &str) -> Result<LinkOutcome, BotError> {
        Ok(LinkOutcome {
            success: false,
            message: None,
        })
    }
}

struct SilentClient;

#[async_trait]
impl LlmClient for SilentClient {
    async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse, PmAiError> {
        Err(PmAiError::Timeout(1))
    }
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

fn minutes(offset: i64) -> DateTime<Utc> {
    base_time() + ChronoDuration::minutes(offset)
}

fn pull(number: u64, merged_at: DateTime<Utc>) -> Value {
    json!({
        "number": number,
        "title": format!("Change {number}"),
        "body": "Adds things",
        "user": {"login": "octo-dev"},
        "html_url": format!("https://github.com/acme/app/pull/{number}"),
        "updated_at": merged_at.to_rfc3339(),
        "merged_at": merged_at.to_rfc3339(),
    })
}

fn seed_cursor(path: &Path, last_merged_at: DateTime<Utc>) {
    let mut cursors = serde_json::Map::new();
    cursors.insert(
        "acme/app".to_string(),
        json!({"last_merged_at": last_merged_at.to_rfc3339(), "processed_at_mark": [10]}),
    );
    std::fs::write(
        path,
        json!({"schema_version": 1, "cursors": cursors}).to_string(),
    )
    .expect("seed cursor file");
}

fn mock_github(server: &MockServer) {
    server.mock(|when, then| {
        when.method(GET)
            .path("/repos/acme/app/pulls")
            .query_param("page", "1");
        then.status(200).json_body(json!([
            pull(13, minutes(3)),
            pull(12, minutes(2)),
            pull(11, minutes(1)),
            pull(10, minutes(0)),
        ]));
    });
    for number in [11_u64, 12, 13] {
        server.mock(|when, then| {
            when.method(GET).path(format!("/repos/acme/app/pulls/{number}"));
            then.status(200).json_body(json!({
                "number": number,
                "additions": 20,
                "deletions": 2,
                "changed_files": 1,
                "commits": 1
            }));
        });
        server.mock(|when, then| {
            when.method(GET)
                .path(format!("/repos/acme/app/pulls/{number}/files"));
            then.status(200).json_body(json!([
                {"filename": format!("src/change_{number}.rs"), "status": "modified",
                 "additions": 20, "deletions": 2, "patch": "@@ -1 +1 @@\n-a\n+b"}
            ]));
        });
    }
}

fn mock_model_review<'a>(server: &'a MockServer, number: u64) -> httpmock::Mock<'a> {
    server.mock(|when, then| {
        when.method(POST)
            .path("/api/chat")
            .body_includes(format!("Title: Change {number}"));
        then.status(200).json_body(json!({
            "model": "llama3.1",
            "message": {
                "role": "assistant",
                "content": format!(
                    "## Summary\nChange {number} tidies the parser.\n## File Comments\n- src/change_{number}.rs: fine\n## Security\n- None\n## Overall Assessment\nApprove."
                )
            },
            "done": true,
            "done_reason": "stop"
        }));
    })
}

fn ollama_client(server: &MockServer) -> Arc<dyn LlmClient> {
    Arc::new(
        OllamaClient::new(OllamaConfig {
            api_base: server.base_url(),
            request_timeout_ms: 2_000,
            max_retries: 0,
            retry_budget_ms: 0,
        })
        .expect("ollama client"),
    )
}

fn drain(receiver: &mut mpsc::Receiver<PullRequestDescriptor>) -> Vec<PullRequestDescriptor> {
    let mut items = Vec::new();
    while let Ok(item) = receiver.try_recv() {
        items.push(item);
    }
    items
}

#[tokio::test]
async fn integration_three_merges_are_reviewed_in_order_and_delivered_by_dm() {
    let github = MockServer::start();
    let model = MockServer::start();
    let discord = MockServer::start();
    let temp = tempdir().expect("tempdir");
    let cursor_path = temp.path().join("poll-cursors.json");
    seed_cursor(&cursor_path, base_time());
    mock_github(&github);
    let reviews = [11_u64, 12, 13]
        .map(|number| mock_model_review(&model, number));
    let open_dm = discord.mock(|when, then| {
        when.method(POST)
            .path("/users/@me/channels")
            .json_body(json!({"recipient_id": "42"}));
        then.status(200).json_body(json!({"id": "dm-42", "type": 1}));
    });
    let posts = discord.mock(|when, then| {
        when.method(POST)
            .path("/channels/dm-42/messages")
            .body_includes("Code Review: acme/app#");
        then.status(200)
            .json_body(json!({"id": "5001", "channel_id": "dm-42", "content": "ok"}));
    });

    let repo = RepoRef::parse("acme/app").expect("repo");
    let poller = SourceHostPoller::new(
        GithubApiClient::new(github.base_url(), None, 2_000, 1, 1).expect("github client"),
        vec![repo.clone()],
        PollCursorStore::load(cursor_path.clone()).expect("cursor store"),
        1,
    );
    let (sender, mut receiver) = mpsc::channel(16);
    let cycle = poller.poll_once(&sender).await;
    assert_eq!(cycle.handed_off, 3);
    let queued = drain(&mut receiver);
    assert_eq!(
        queued.iter().map(PullRequestDescriptor::id).collect::<Vec<_>>(),
        vec!["acme/app#11", "acme/app#12", "acme/app#13"]
    );
    let cursor = poller.cursor(&repo).await.expect("cursor");
    assert_eq!(cursor.last_merged_at, minutes(3));

    let mut mappings = IdentityMappingStore::load(temp.path().join("identity-mappings.json"))
        .expect("mappings");
    mappings.upsert("octo-dev", "42").expect("seed mapping");
    let backend: Arc<dyn ProjectBackend> = Arc::new(EmptyBackend);
    let sessions = SessionManager::new(
        backend.clone(),
        Arc::new(SilentClient),
        ConversationHistoryStore::load(temp.path().join("conversations.json")).expect("history"),
        SessionManagerConfig::default(),
    );
    let services = RuntimeServices {
        discord: DiscordApiClient::new(discord.base_url(), "test-token".to_string(), 2_000, 1, 1)
            .expect("discord client"),
        backend,
        sessions: Arc::new(sessions),
        mappings,
        report_flags: ReportFlagStore::load(temp.path().join("report-flags.json"))
            .expect("flags"),
        inbound: DiscordInboundStore::load(temp.path().join("discord-inbound.json"))
            .expect("inbound"),
        schedule: ReportSchedule::new(&[8, 20], chrono_tz::UTC).expect("schedule"),
        review: None,
    };
    let runtime = DiscordBotRuntime::new(
        DiscordRuntimeConfig {
            report_channel_id: "reports".to_string(),
            review_recipient: RecipientPolicy::Author,
            announce_startup: false,
            ..DiscordRuntimeConfig::default()
        },
        services,
        "999".to_string(),
    );
    let summarizer = ReviewSummarizer::new(
        ollama_client(&model),
        ReviewSummarizerConfig {
            model: "llama3.1".to_string(),
            limits: DiffLimits::default(),
            security_scan: false,
            model_timeout_ms: 2_000,
        },
    );

    for pull_request in &queued {
        let delivery = runtime.review_and_deliver(&summarizer, pull_request).await;
        assert_eq!(
            delivery,
            ReviewDelivery::DirectMessage {
                user_id: "42".to_string()
            }
        );
    }

    for review in &reviews {
        review.assert_calls(1);
    }
    open_dm.assert_calls(1);
    posts.assert_calls(3);

    let inbound = DiscordInboundStore::load(temp.path().join("discord-inbound.json"))
        .expect("reload inbound");
    assert_eq!(inbound.dm_channel_for("42"), Some("dm-42"));
    assert_eq!(inbound.last_message_id("dm-42"), Some("5001"));
}

#[tokio::test]
async fn integration_second_poll_after_delivery_finds_nothing_new() {
    let github = MockServer::start();
    let temp = tempdir().expect("tempdir");
    let cursor_path = temp.path().join("poll-cursors.json");
    seed_cursor(&cursor_path, base_time());
    mock_github(&github);

    let repo = RepoRef::parse("acme/app").expect("repo");
    let first = SourceHostPoller::new(
        GithubApiClient::new(github.base_url(), None, 2_000, 1, 1).expect("github client"),
        vec![repo.clone()],
        PollCursorStore::load(cursor_path.clone()).expect("cursor store"),
        1,
    );
    let (sender, mut receiver) = mpsc::channel(16);
    assert_eq!(first.poll_once(&sender).await.handed_off, 3);
    drain(&mut receiver);

    let restarted = SourceHostPoller::new(
        GithubApiClient::new(github.base_url(), None, 2_000, 1, 1).expect("github client"),
        vec![repo],
        PollCursorStore::load(cursor_path).expect("cursor store"),
        1,
    );
    let report = restarted.poll_once(&sender).await;

    assert_eq!(report.handed_off, 0);
    assert!(drain(&mut receiver).is_empty());
}
