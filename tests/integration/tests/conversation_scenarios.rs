use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use httpmock::prelude::*;
use pmbot_ai::{ChatRequest, ChatResponse, ChatUsage, LlmClient, Message, PmAiError};
use pmbot_backend::{BackendClient, BackendClientConfig, ProjectBackend};
use pmbot_session::{
    ConversationHistoryStore, SessionManager, SessionManagerConfig, Topic, TurnOutcome, TurnRole,
};
use serde_json::json;
use tempfile::tempdir;

enum Step {
    Reply(&'static str),
    Stall(Duration),
}

/// Replays canned answers in order and keeps every request it received.
struct ScriptedClient {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedClient {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, PmAiError> {
        self.requests.lock().expect("requests lock").push(request);
        let step = self.steps.lock().expect("steps lock").pop_front();
        let text = match step {
            Some(Step::Reply(text)) => text,
            Some(Step::Stall(delay)) => {
                tokio::time::sleep(delay).await;
                "too late"
            }
            None => return Err(PmAiError::Timeout(1)),
        };
        Ok(ChatResponse {
            message: Message::assistant(text),
            finish_reason: Some("stop".to_string()),
            usage: ChatUsage::default(),
        })
    }
}

fn backend_for(server: &MockServer) -> Arc<dyn ProjectBackend> {
    Arc::new(
        BackendClient::new(BackendClientConfig {
            api_base: server.base_url(),
            request_timeout_ms: 2_000,
            retry_max_attempts: 1,
            retry_base_delay_ms: 1,
        })
        .expect("backend client"),
    )
}

fn manager(
    backend: Arc<dyn ProjectBackend>,
    llm: Arc<ScriptedClient>,
    history_path: &Path,
    model_timeout_ms: u64,
) -> SessionManager {
    SessionManager::new(
        backend,
        llm,
        ConversationHistoryStore::load(history_path.to_path_buf()).expect("history"),
        SessionManagerConfig {
            model_timeout_ms,
            bot_user_id: Some("999".to_string()),
            ..SessionManagerConfig::default()
        },
    )
}

fn mock_projects(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method(GET).path("/api/discord/projects");
        then.status(200).json_body(json!({
            "projects": [
                {"_id": "p1", "name": "Mobile App", "status": "active", "teamCode": "MOB"},
                {"_id": "p2", "name": "Website", "status": "active"}
            ]
        }));
    })
}

fn mock_incomplete<'a>(server: &'a MockServer, project_id: &str, title: &str) -> httpmock::Mock<'a> {
    let title = title.to_string();
    server.mock(move |when, then| {
        when.method(POST)
            .path("/api/discord/incomplete")
            .json_body(json!({ "projectId": project_id }));
        then.status(200).json_body(json!([
            {"_id": "t1", "title": title, "status": "in_progress", "priority": "HIGH",
             "assignee": {"username": "ravi", "discordId": "42"}}
        ]));
    })
}

fn mock_stats<'a>(server: &'a MockServer, project_id: &str) -> httpmock::Mock<'a> {
    server.mock(|when, then| {
        when.method(POST)
            .path("/api/discord/stats")
            .json_body(json!({ "projectId": project_id, "hours": 168 }));
        then.status(200)
            .json_body(json!([{"username": "ravi", "discordId": "42", "completed": 4}]));
    })
}

fn mobile_app() -> Topic {
    Topic::Project {
        id: "p1".to_string(),
        name: "Mobile App".to_string(),
    }
}

#[tokio::test]
async fn integration_named_project_then_elliptical_follow_up_stays_scoped() {
    let server = MockServer::start();
    let projects = mock_projects(&server);
    let mobile_pending = mock_incomplete(&server, "p1", "Fix login crash");
    let website_pending = mock_incomplete(&server, "p2", "Refresh landing page");
    let mobile_stats = mock_stats(&server, "p1");
    let temp = tempdir().expect("tempdir");
    let history_path = temp.path().join("conversations.json");
    let llm = ScriptedClient::new(vec![
        Step::Reply("Mobile App is moving; Fix login crash is the open item."),
        Step::Reply("Only Fix login crash is pending."),
    ]);
    let sessions = manager(backend_for(&server), llm.clone(), &history_path, 5_000);

    let first = sessions
        .handle_message_at("42", "How's Mobile App doing?", 1_000)
        .await;
    assert_eq!(first.outcome, TurnOutcome::Answered);
    assert!(first.text.contains("Mobile App"));
    let session = sessions.snapshot("42").await.expect("session");
    assert_eq!(session.current_topic, Some(mobile_app()));

    let second = sessions
        .handle_message_at("42", "What about the pending tasks?", 2_000)
        .await;
    assert_eq!(second.outcome, TurnOutcome::Answered);
    assert_eq!(second.text, "Only Fix login crash is pending.");

    projects.assert_calls(2);
    mobile_pending.assert_calls(2);
    mobile_stats.assert_calls(1);
    website_pending.assert_calls(0);

    let requests = llm.requests();
    assert_eq!(requests.len(), 2);
    let first_prompt = &requests[0].messages.last().expect("user message").content;
    assert!(first_prompt.starts_with("How's Mobile App doing?"));
    assert!(first_prompt.contains("Fix login crash"));
    assert!(first_prompt.contains("ravi: 4 tasks completed"));
    let follow_up = &requests[1].messages;
    assert!(follow_up
        .iter()
        .any(|message| message.content == "Mobile App is moving; Fix login crash is the open item."));

    let session = sessions.snapshot("42").await.expect("session");
    assert_eq!(session.turns.len(), 4);
}

#[tokio::test]
async fn integration_topic_and_history_survive_restart() {
    let server = MockServer::start();
    mock_projects(&server);
    let mobile_pending = mock_incomplete(&server, "p1", "Fix login crash");
    mock_stats(&server, "p1");
    let temp = tempdir().expect("tempdir");
    let history_path = temp.path().join("conversations.json");

    let before = manager(
        backend_for(&server),
        ScriptedClient::new(vec![Step::Reply("On track.")]),
        &history_path,
        5_000,
    );
    before
        .handle_message_at("42", "How's Mobile App doing?", 1_000)
        .await;
    drop(before);

    let llm = ScriptedClient::new(vec![Step::Reply("One task left.")]);
    let after = manager(backend_for(&server), llm.clone(), &history_path, 5_000);
    let restored = after.snapshot("42").await.expect("restored session");
    assert_eq!(restored.current_topic, Some(mobile_app()));
    assert_eq!(restored.turns.len(), 2);

    let reply = after
        .handle_message_at("42", "any pending items?", 2_000)
        .await;
    assert_eq!(reply.outcome, TurnOutcome::Answered);
    mobile_pending.assert_calls(2);
    assert!(llm.requests()[0]
        .messages
        .iter()
        .any(|message| message.content == "On track."));
}

#[tokio::test]
async fn integration_model_timeout_degrades_to_fetched_data_without_assistant_turn() {
    let server = MockServer::start();
    mock_projects(&server);
    mock_incomplete(&server, "p1", "Fix login crash");
    mock_stats(&server, "p1");
    let temp = tempdir().expect("tempdir");
    let llm = ScriptedClient::new(vec![Step::Stall(Duration::from_secs(5))]);
    let sessions = manager(
        backend_for(&server),
        llm.clone(),
        &temp.path().join("conversations.json"),
        100,
    );

    let reply = sessions
        .handle_message_at("42", "How's Mobile App doing?", 1_000)
        .await;

    assert_eq!(reply.outcome, TurnOutcome::Degraded);
    assert!(!reply.text.trim().is_empty());
    assert!(reply.text.contains("Fix login crash"));
    assert_eq!(llm.requests().len(), 1);
    let session = sessions.snapshot("42").await.expect("session");
    assert_eq!(session.turns.len(), 1);
    assert_eq!(session.turns[0].role, TurnRole::User);
    assert_eq!(session.current_topic, Some(mobile_app()));
}

#[tokio::test]
async fn integration_backend_outage_skips_the_model() {
    let server = MockServer::start();
    let projects = server.mock(|when, then| {
        when.method(GET).path("/api/discord/projects");
        then.status(503).body("maintenance");
    });
    let temp = tempdir().expect("tempdir");
    let llm = ScriptedClient::new(vec![Step::Reply("unused")]);
    let sessions = manager(
        backend_for(&server),
        llm.clone(),
        &temp.path().join("conversations.json"),
        5_000,
    );

    let reply = sessions
        .handle_message_at("42", "How's Mobile App doing?", 1_000)
        .await;

    projects.assert_calls(1);
    assert_eq!(reply.outcome, TurnOutcome::BackendUnavailable);
    assert!(reply.text.contains("project data service"));
    assert!(llm.requests().is_empty());
}
