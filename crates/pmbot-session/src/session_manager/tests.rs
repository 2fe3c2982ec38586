use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use pmbot_ai::{ChatRequest, ChatResponse, ChatUsage, LlmClient, Message, PmAiError};
use pmbot_backend::{
    Assignee, Commit, Fetched, LinkOutcome, MemberStats, Project, ProjectBackend, Task,
};
use pmbot_core::BotError;
use tempfile::{tempdir, TempDir};

use super::{SessionManager, SessionManagerConfig, TurnOutcome};
use crate::history_store::ConversationHistoryStore;
use crate::session::{Topic, TurnRole};

#[derive(Default)]
struct FakeBackend {
    calls: StdMutex<Vec<String>>,
    fail_projects: bool,
}

impl FakeBackend {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().expect("calls lock").push(call);
    }
}

fn task(title: &str, status: &str, discord_id: &str, username: &str) -> Task {
    Task {
        id: Some(title.to_lowercase()),
        title: title.to_string(),
        status: status.to_string(),
        priority: "HIGH".to_string(),
        project_id: Some("p1".to_string()),
        project_name: Some("Mobile App".to_string()),
        due_date: None,
        assignee: Some(Assignee {
            name: None,
            username: Some(username.to_string()),
            discord_id: Some(discord_id.to_string()),
        }),
    }
}

#[async_trait]
impl ProjectBackend for FakeBackend {
    async fn list_projects(&self) -> Result<Fetched<Project>, BotError> {
        self.record("list_projects".to_string());
        if self.fail_projects {
            return Err(BotError::unavailable("backend", "503 maintenance"));
        }
        Ok(Fetched::complete(vec![
            Project {
                id: "p1".to_string(),
                name: "Mobile App".to_string(),
                status: "active".to_string(),
                team_code: None,
            },
            Project {
                id: "p2".to_string(),
                name: "Website".to_string(),
                status: "active".to_string(),
                team_code: None,
            },
        ]))
    }

    async fn recent_tasks(&self, hours: u32) -> Result<Fetched<Task>, BotError> {
        self.record(format!("recent_tasks:{hours}"));
        Ok(Fetched::complete(vec![
            task("Fix login crash", "in_progress", "42", "ravi"),
            task("Ship release notes", "completed", "42", "ravi"),
            task("Design review", "todo", "7", "mei"),
        ]))
    }

    async fn member_stats(&self, project_id: &str, hours: u32) -> Result<Fetched<MemberStats>, BotError> {
        self.record(format!("member_stats:{project_id}:{hours}"));
        Ok(Fetched::complete(vec![MemberStats {
            username: "ravi".to_string(),
            discord_id: Some("42".to_string()),
            completed: 3,
        }]))
    }

    async fn incomplete_tasks(&self, project_id: &str) -> Result<Fetched<Task>, BotError> {
        self.record(format!("incomplete_tasks:{project_id}"));
        Ok(Fetched {
            rows: vec![task("Fix login crash", "in_progress", "42", "ravi")],
            skipped: 1,
        })
    }

    async fn recent_commits(&self, project_id: &str, hours: u32) -> Result<Fetched<Commit>, BotError> {
        self.record(format!("recent_commits:{project_id}:{hours}"));
        Ok(Fetched::complete(Vec::new()))
    }

    async fn link_account(&self, discord_id: &str, email: &str) -> Result<LinkOutcome, BotError> {
        self.record(format!("link_account:{discord_id}:{email}"));
        Ok(LinkOutcome {
            success: true,
            message: None,
        })
    }
}

enum Step {
    Reply(String),
    Fail,
    EchoAfter(Duration),
}

struct ScriptedLlm {
    steps: StdMutex<VecDeque<Step>>,
    requests: StdMutex<Vec<ChatRequest>>,
}

impl ScriptedLlm {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: StdMutex::new(steps.into()),
            requests: StdMutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

fn reply(text: &str) -> Result<ChatResponse, PmAiError> {
    Ok(ChatResponse {
        message: Message::assistant(text),
        finish_reason: Some("stop".to_string()),
        usage: ChatUsage::default(),
    })
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, PmAiError> {
        self.requests.lock().expect("requests lock").push(request.clone());
        let step = self.steps.lock().expect("steps lock").pop_front();
        match step {
            Some(Step::Reply(text)) => reply(&text),
            Some(Step::EchoAfter(delay)) => {
                tokio::time::sleep(delay).await;
                let question = request
                    .messages
                    .last()
                    .map(|message| message.content.lines().next().unwrap_or_default().to_string())
                    .unwrap_or_default();
                reply(&format!("answer to {question}"))
            }
            Some(Step::Fail) | None => Err(PmAiError::Timeout(50)),
        }
    }
}

struct Harness {
    manager: SessionManager,
    backend: Arc<FakeBackend>,
    llm: Arc<ScriptedLlm>,
    temp: TempDir,
}

fn harness_with(backend: FakeBackend, steps: Vec<Step>, config: SessionManagerConfig) -> Harness {
    let temp = tempdir().expect("tempdir");
    let backend = Arc::new(backend);
    let llm = ScriptedLlm::new(steps);
    let history =
        ConversationHistoryStore::load(temp.path().join("conversations.json")).expect("history");
    let manager = SessionManager::new(backend.clone(), llm.clone(), history, config);
    Harness {
        manager,
        backend,
        llm,
        temp,
    }
}

fn harness(steps: Vec<Step>) -> Harness {
    harness_with(FakeBackend::default(), steps, SessionManagerConfig::default())
}

fn mobile_app() -> Topic {
    Topic::Project {
        id: "p1".to_string(),
        name: "Mobile App".to_string(),
    }
}

#[tokio::test]
async fn functional_named_project_sets_topic_and_follow_up_is_scoped() {
    let h = harness(vec![
        Step::Reply("Mobile App is on track.".to_string()),
        Step::Reply("One pending task: Fix login crash.".to_string()),
    ]);

    let first = h.manager.handle_message_at("u1", "How's Mobile App doing?", 1_000).await;
    assert_eq!(first.outcome, TurnOutcome::Answered);
    assert_eq!(first.text, "Mobile App is on track.");
    let session = h.manager.snapshot("u1").await.expect("session");
    assert_eq!(session.current_topic, Some(mobile_app()));

    let second = h
        .manager
        .handle_message_at("u1", "What about the pending tasks?", 2_000)
        .await;
    assert_eq!(second.outcome, TurnOutcome::Answered);

    let calls = h.backend.calls();
    assert!(calls.contains(&"incomplete_tasks:p1".to_string()));
    assert!(calls.iter().all(|call| !call.starts_with("recent_tasks")));
    let requests = h.llm.requests();
    let last = requests[1].messages.last().expect("question");
    assert!(last.content.starts_with("What about the pending tasks?"));
    assert!(last.content.contains("Fix login crash"));
    assert!(last.content.contains("data is partial"));
    assert_eq!(requests[1].messages.len(), 4);

    let session = h.manager.snapshot("u1").await.expect("session");
    assert_eq!(session.turns.len(), 4);
    assert_eq!(session.current_topic, Some(mobile_app()));
}

#[tokio::test]
async fn functional_elliptical_question_without_topic_gets_clarification() {
    let h = harness(Vec::new());

    let reply = h.manager.handle_message_at("u1", "what about them?", 1_000).await;

    assert_eq!(reply.outcome, TurnOutcome::Clarification);
    assert!(reply.text.contains("Which project do you mean?"));
    assert!(reply.text.contains("- Mobile App"));
    assert_eq!(h.backend.calls(), vec!["list_projects".to_string()]);
    assert!(h.llm.requests().is_empty());
    let session = h.manager.snapshot("u1").await.expect("session");
    assert_eq!(session.turns.len(), 1);
    assert!(session.current_topic.is_none());
}

#[tokio::test]
async fn regression_model_failure_returns_raw_data_and_records_user_turn_only() {
    let h = harness(vec![Step::Fail]);

    let reply = h.manager.handle_message_at("u1", "How's Mobile App doing?", 1_000).await;

    assert_eq!(reply.outcome, TurnOutcome::Degraded);
    assert!(reply.text.contains("AI is unavailable"));
    assert!(reply.text.contains("Fix login crash"));
    let session = h.manager.snapshot("u1").await.expect("session");
    assert_eq!(session.turns.len(), 1);
    assert_eq!(session.turns[0].role, TurnRole::User);
    assert_eq!(session.current_topic, Some(mobile_app()));
}

#[tokio::test]
async fn regression_backend_failure_yields_non_empty_apology() {
    let h = harness_with(
        FakeBackend {
            fail_projects: true,
            ..FakeBackend::default()
        },
        Vec::new(),
        SessionManagerConfig::default(),
    );

    let reply = h.manager.handle_message_at("u1", "How's Mobile App doing?", 1_000).await;

    assert_eq!(reply.outcome, TurnOutcome::BackendUnavailable);
    assert!(reply.text.contains("backend unavailable: 503 maintenance"));
    let session = h.manager.snapshot("u1").await.expect("session");
    assert_eq!(session.turns.len(), 1);
}

#[tokio::test]
async fn functional_history_stays_bounded_across_turns() {
    let steps = (0..6).map(|index| Step::Reply(format!("reply {index}"))).collect();
    let h = harness_with(
        FakeBackend::default(),
        steps,
        SessionManagerConfig {
            max_turns: 4,
            ..SessionManagerConfig::default()
        },
    );

    for index in 0..6_u64 {
        h.manager
            .handle_message_at("u1", &format!("Website status {index}"), 1_000 + index)
            .await;
    }

    let session = h.manager.snapshot("u1").await.expect("session");
    let texts = session
        .turns
        .iter()
        .map(|turn| turn.text.as_str())
        .collect::<Vec<_>>();
    assert_eq!(
        texts,
        vec!["Website status 4", "reply 4", "Website status 5", "reply 5"]
    );
    let last_request = h.llm.requests().pop().expect("request");
    assert_eq!(last_request.messages.len(), 1 + 4 + 1);
}

#[tokio::test]
async fn functional_reset_is_idempotent_and_context_reflects_it() {
    let h = harness(vec![Step::Reply("On track.".to_string())]);
    h.manager.handle_message("u1", "How's Mobile App doing?").await;
    let context = h.manager.show_context("u1").await;
    assert!(context.contains("Current topic: Mobile App (project)"));
    assert!(context.contains("user: How's Mobile App doing?"));

    h.manager.reset("u1").await;
    let once = h.manager.snapshot("u1").await.expect("session");
    h.manager.reset("u1").await;
    let twice = h.manager.snapshot("u1").await.expect("session");

    assert!(once.turns.is_empty() && once.current_topic.is_none());
    assert_eq!(once.turns, twice.turns);
    assert_eq!(once.current_topic, twice.current_topic);
    assert!(h
        .manager
        .show_context("u1")
        .await
        .contains("Current topic: none"));
}

#[tokio::test]
async fn functional_idle_session_expires_and_forgets_topic() {
    let h = harness(vec![Step::Reply("On track.".to_string())]);
    let idle = SessionManagerConfig::default().idle_timeout_ms;

    h.manager.handle_message_at("u1", "How's Mobile App doing?", 1_000).await;
    let reply = h
        .manager
        .handle_message_at("u1", "what about them?", 1_000 + idle + 1)
        .await;

    assert_eq!(reply.outcome, TurnOutcome::Clarification);
    let session = h.manager.snapshot("u1").await.expect("session");
    assert_eq!(session.turns.len(), 1);
}

#[tokio::test]
async fn functional_sweep_drops_only_idle_sessions() {
    let h = harness(vec![
        Step::Reply("a".to_string()),
        Step::Reply("b".to_string()),
    ]);
    let idle = SessionManagerConfig::default().idle_timeout_ms;
    h.manager.handle_message_at("old", "Website status", 1_000).await;
    h.manager.handle_message_at("new", "Website status", 1_000 + idle).await;

    let removed = h.manager.sweep_expired(1_000 + idle + 1).await;

    assert_eq!(removed, 1);
    assert!(h.manager.snapshot("old").await.is_none());
    assert!(h.manager.snapshot("new").await.is_some());
}

#[tokio::test]
async fn integration_same_participant_messages_are_serialized() {
    let h = harness(vec![
        Step::EchoAfter(Duration::from_millis(60)),
        Step::EchoAfter(Duration::from_millis(5)),
    ]);
    let manager = Arc::new(h.manager);

    let first = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.handle_message("u1", "Website status first").await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.handle_message("u1", "Website status second").await })
    };
    first.await.expect("first task");
    second.await.expect("second task");

    let session = manager.snapshot("u1").await.expect("session");
    let texts = session
        .turns
        .iter()
        .map(|turn| turn.text.clone())
        .collect::<Vec<_>>();
    assert_eq!(
        texts,
        vec![
            "Website status first".to_string(),
            "answer to Website status first".to_string(),
            "Website status second".to_string(),
            "answer to Website status second".to_string(),
        ]
    );
}

#[tokio::test]
async fn functional_my_tasks_filters_by_participant() {
    let h = harness(vec![Step::Reply("You have one task.".to_string())]);

    h.manager.handle_message_at("42", "show my tasks", 1_000).await;

    let request = h.llm.requests().pop().expect("request");
    let question = &request.messages.last().expect("question").content;
    assert!(question.contains("Fix login crash"));
    assert!(!question.contains("Ship release notes"));
    assert!(!question.contains("Design review"));
    assert!(h.backend.calls().contains(&"recent_tasks:168".to_string()));
}

#[tokio::test]
async fn functional_sessions_survive_manager_restart() {
    let h = harness(vec![Step::Reply("On track.".to_string())]);
    h.manager.handle_message_at("u1", "How's Mobile App doing?", 1_000).await;

    let history =
        ConversationHistoryStore::load(h.temp.path().join("conversations.json")).expect("history");
    let restarted = SessionManager::new(
        h.backend.clone(),
        ScriptedLlm::new(Vec::new()),
        history,
        SessionManagerConfig::default(),
    );

    let session = restarted.snapshot("u1").await.expect("restored");
    assert_eq!(session.turns.len(), 2);
    assert_eq!(session.current_topic, Some(mobile_app()));
}

#[tokio::test]
async fn regression_follow_up_naming_a_person_switches_to_their_tasks() {
    let h = harness(vec![
        Step::Reply("Mobile App is on track.".to_string()),
        Step::Reply("Ravi is on Fix login crash.".to_string()),
    ]);
    h.manager.handle_message_at("u1", "How's Mobile App doing?", 1_000).await;

    let reply = h.manager.handle_message_at("u1", "what about ravi?", 2_000).await;

    assert_eq!(reply.outcome, TurnOutcome::Answered);
    assert!(h.backend.calls().contains(&"recent_tasks:168".to_string()));
    let session = h.manager.snapshot("u1").await.expect("session");
    assert_eq!(
        session.current_topic,
        Some(Topic::Member {
            label: "ravi".to_string(),
            discord_id: Some("42".to_string()),
        })
    );
    let request = h.llm.requests().pop().expect("request");
    let question = &request.messages.last().expect("question").content;
    assert!(question.contains("Fix login crash"));
    assert!(!question.contains("Design review"));
}

#[tokio::test]
async fn functional_registered_members_are_recognised_by_name() {
    let h = harness(vec![Step::Reply("Mei has one task.".to_string())]);
    h.manager.register_members([("mei", Some("7"))]).await;

    h.manager.handle_message_at("u1", "what is mei up to?", 1_000).await;

    let session = h.manager.snapshot("u1").await.expect("session");
    assert_eq!(
        session.current_topic,
        Some(Topic::Member {
            label: "mei".to_string(),
            discord_id: Some("7".to_string()),
        })
    );
    let request = h.llm.requests().pop().expect("request");
    let question = &request.messages.last().expect("question").content;
    assert!(question.contains("Design review"));
    assert!(!question.contains("Fix login crash"));
}

#[tokio::test]
async fn regression_sweep_keeps_a_session_whose_turn_holds_the_handle() {
    let h = harness(vec![Step::Reply("a".to_string())]);
    let idle = SessionManagerConfig::default().idle_timeout_ms;
    h.manager.handle_message_at("u1", "Website status", 1_000).await;

    let in_flight = h.manager.session_handle("u1", 1_000 + idle + 1).await;
    assert_eq!(h.manager.sweep_expired(1_000 + idle + 1).await, 0);
    assert!(h.manager.snapshot("u1").await.is_some());

    drop(in_flight);
    assert_eq!(h.manager.sweep_expired(1_000 + idle + 1).await, 1);
    assert!(h.manager.snapshot("u1").await.is_none());
}
