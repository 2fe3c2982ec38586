//! Conversation session manager.
//!
//! Sessions move `IDLE -> ACTIVE -> EXPIRED -> IDLE`: one is created lazily on
//! a participant's first message, replaced once it has been idle longer than
//! the timeout, and cleared by reset. Each participant's session sits behind
//! its own async mutex that is held for the whole turn, so two messages from
//! the same person are handled one after the other while different people
//! proceed concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use pmbot_ai::LlmClient;
use pmbot_backend::{Fetched, Project, ProjectBackend, Task};
use pmbot_core::{current_unix_timestamp_ms, BotError};
use tokio::sync::Mutex;

use crate::context_format::TurnData;
use crate::history_store::ConversationHistoryStore;
use crate::member_roster::MemberRoster;
use crate::replies::{
    backend_failure_reply, build_chat_request, clarification_reply, degraded_reply,
    render_context,
};
use crate::session::{ConversationSession, Topic, TurnRole};
use crate::topic::{plan_turn, TurnPlan};

pub const DEFAULT_MAX_TURNS: usize = 10;
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 30 * 60 * 1_000;

#[derive(Debug, Clone)]
pub struct SessionManagerConfig {
    pub model: String,
    pub max_turns: usize,
    pub idle_timeout_ms: u64,
    pub task_window_hours: u32,
    pub stats_window_hours: u32,
    pub model_timeout_ms: u64,
    pub bot_user_id: Option<String>,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            model: "llama3.1".to_string(),
            max_turns: DEFAULT_MAX_TURNS,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
            task_window_hours: 24 * 7,
            stats_window_hours: 24 * 7,
            model_timeout_ms: 60_000,
            bot_user_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Answered,
    Degraded,
    Clarification,
    BackendUnavailable,
}

impl TurnOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Answered => "answered",
            Self::Degraded => "degraded",
            Self::Clarification => "clarification",
            Self::BackendUnavailable => "backend_unavailable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReply {
    pub text: String,
    pub outcome: TurnOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProjectQuery {
    Status,
    Pending,
    Team,
    Stats,
}

type SessionHandle = Arc<Mutex<ConversationSession>>;

pub struct SessionManager {
    backend: Arc<dyn ProjectBackend>,
    llm: Arc<dyn LlmClient>,
    config: SessionManagerConfig,
    sessions: Mutex<HashMap<String, SessionHandle>>,
    history: Mutex<ConversationHistoryStore>,
    roster: Mutex<MemberRoster>,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn ProjectBackend>,
        llm: Arc<dyn LlmClient>,
        history: ConversationHistoryStore,
        config: SessionManagerConfig,
    ) -> Self {
        let sessions = history
            .sessions()
            .map(|session| {
                (
                    session.participant_id.clone(),
                    Arc::new(Mutex::new(session.clone())),
                )
            })
            .collect::<HashMap<_, _>>();
        if !sessions.is_empty() {
            tracing::info!(sessions = sessions.len(), "restored conversation sessions");
        }
        Self {
            backend,
            llm,
            config,
            sessions: Mutex::new(sessions),
            history: Mutex::new(history),
            roster: Mutex::new(MemberRoster::default()),
        }
    }

    /// Makes `(name, discord_id)` pairs recognisable as people in questions.
    pub async fn register_members<'a>(
        &self,
        members: impl IntoIterator<Item = (&'a str, Option<&'a str>)>,
    ) {
        let mut roster = self.roster.lock().await;
        for (name, discord_id) in members {
            roster.learn(name, discord_id);
        }
        tracing::debug!(members = roster.len(), "member roster updated");
    }

    pub fn config(&self) -> &SessionManagerConfig {
        &self.config
    }

    pub async fn handle_message(&self, participant_id: &str, text: &str) -> TurnReply {
        self.handle_message_at(participant_id, text, current_unix_timestamp_ms())
            .await
    }

    pub async fn handle_message_at(
        &self,
        participant_id: &str,
        text: &str,
        now_unix_ms: u64,
    ) -> TurnReply {
        let handle = self.session_handle(participant_id, now_unix_ms).await;
        let mut session = handle.lock().await;
        self.expire_if_idle(&mut session, now_unix_ms);

        let text = text.trim();
        if text.is_empty() {
            return TurnReply {
                text: clarification_reply(&[]),
                outcome: TurnOutcome::Clarification,
            };
        }

        let projects = match self.backend.list_projects().await {
            Ok(projects) => projects,
            Err(error) => {
                return self
                    .finish_without_model(&mut session, text, now_unix_ms, backend_failure(&error))
                    .await;
            }
        };

        let members = self.roster.lock().await.members();
        let plan = plan_turn(
            text,
            session.current_topic.as_ref(),
            &projects.rows,
            &members,
            self.config.bot_user_id.as_deref(),
        );
        tracing::debug!(participant = participant_id, plan = ?plan, "conversation turn planned");
        if let Some(topic) = plan.topic() {
            session.current_topic = Some(topic.clone());
        }
        if plan == TurnPlan::Clarify {
            let reply = TurnReply {
                text: clarification_reply(&projects.rows),
                outcome: TurnOutcome::Clarification,
            };
            return self
                .finish_without_model(&mut session, text, now_unix_ms, reply)
                .await;
        }

        let data = match self.fetch_for_plan(&plan, participant_id, &projects).await {
            Ok(data) => data,
            Err(error) => {
                return self
                    .finish_without_model(&mut session, text, now_unix_ms, backend_failure(&error))
                    .await;
            }
        };

        self.roster.lock().await.learn_from_data(&data);

        let request = build_chat_request(&self.config.model, &session, text, &data);
        let timeout_ms = self.config.model_timeout_ms.max(1);
        let completion =
            tokio::time::timeout(Duration::from_millis(timeout_ms), self.llm.complete(request))
                .await;
        let answer = match completion {
            Ok(Ok(response)) if !response.text().trim().is_empty() => {
                Ok(response.text().trim().to_string())
            }
            Ok(Ok(_)) => Err("model returned an empty reply".to_string()),
            Ok(Err(error)) => Err(error.to_string()),
            Err(_) => Err(format!("model call timed out after {timeout_ms} ms")),
        };

        match answer {
            Ok(answer) => {
                let max_turns = self.config.max_turns;
                session.push_turn(TurnRole::User, text, now_unix_ms, max_turns);
                session.push_turn(TurnRole::Assistant, answer.clone(), now_unix_ms, max_turns);
                self.persist(&session).await;
                TurnReply {
                    text: answer,
                    outcome: TurnOutcome::Answered,
                }
            }
            Err(reason) => {
                tracing::warn!(
                    participant = participant_id,
                    reason = %reason,
                    "model unavailable; replying with raw data"
                );
                let reply = TurnReply {
                    text: degraded_reply(&data),
                    outcome: TurnOutcome::Degraded,
                };
                self.finish_without_model(&mut session, text, now_unix_ms, reply)
                    .await
            }
        }
    }

    /// Clears turns and topic. Calling it again changes nothing.
    pub async fn reset(&self, participant_id: &str) -> String {
        let now_unix_ms = current_unix_timestamp_ms();
        let handle = self.session_handle(participant_id, now_unix_ms).await;
        let mut session = handle.lock().await;
        session.reset(now_unix_ms);
        self.persist(&session).await;
        tracing::info!(participant = participant_id, "conversation reset");
        "🔄 Conversation reset. Ask me anything about your projects!".to_string()
    }

    pub async fn show_context(&self, participant_id: &str) -> String {
        let now_unix_ms = current_unix_timestamp_ms();
        let handle = self.session_handle(participant_id, now_unix_ms).await;
        let mut session = handle.lock().await;
        self.expire_if_idle(&mut session, now_unix_ms);
        render_context(&session, self.config.max_turns)
    }

    pub async fn snapshot(&self, participant_id: &str) -> Option<ConversationSession> {
        let handle = self.sessions.lock().await.get(participant_id).cloned()?;
        let session = handle.lock().await;
        Some(session.clone())
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Drops sessions idle past the timeout. A session whose handle is held
    /// outside the map belongs to a turn in flight and is left alone; handles
    /// are only cloned under the map lock, so the count cannot race.
    pub async fn sweep_expired(&self, now_unix_ms: u64) -> usize {
        let mut sessions = self.sessions.lock().await;
        let expired = sessions
            .iter()
            .filter(|(_, handle)| Arc::strong_count(handle) == 1)
            .filter(|(_, handle)| {
                handle
                    .try_lock()
                    .map(|session| session.is_expired(now_unix_ms, self.config.idle_timeout_ms))
                    .unwrap_or(false)
            })
            .map(|(participant_id, _)| participant_id.clone())
            .collect::<Vec<_>>();
        if expired.is_empty() {
            return 0;
        }
        let mut history = self.history.lock().await;
        for participant_id in &expired {
            sessions.remove(participant_id);
            if let Err(error) = history.remove(participant_id) {
                tracing::warn!(
                    participant = participant_id.as_str(),
                    error = %format!("{error:#}"),
                    "failed to drop expired conversation from history"
                );
            }
        }
        tracing::debug!(expired = expired.len(), "expired idle conversations");
        expired.len()
    }

    async fn session_handle(&self, participant_id: &str, now_unix_ms: u64) -> SessionHandle {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(participant_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ConversationSession::new(participant_id, now_unix_ms))))
            .clone()
    }

    fn expire_if_idle(&self, session: &mut ConversationSession, now_unix_ms: u64) {
        if session.is_expired(now_unix_ms, self.config.idle_timeout_ms) {
            tracing::info!(
                participant = session.participant_id.as_str(),
                "conversation expired after idle timeout"
            );
            session.reset(now_unix_ms);
        }
    }

    async fn finish_without_model(
        &self,
        session: &mut ConversationSession,
        text: &str,
        now_unix_ms: u64,
        reply: TurnReply,
    ) -> TurnReply {
        session.push_turn(TurnRole::User, text, now_unix_ms, self.config.max_turns);
        self.persist(session).await;
        reply
    }

    async fn persist(&self, session: &ConversationSession) {
        if let Err(error) = self.history.lock().await.put(session) {
            tracing::warn!(
                participant = session.participant_id.as_str(),
                error = %format!("{error:#}"),
                "failed to persist conversation history"
            );
        }
    }

    async fn fetch_for_plan(
        &self,
        plan: &TurnPlan,
        participant_id: &str,
        projects: &Fetched<Project>,
    ) -> Result<TurnData, BotError> {
        let mut data = TurnData {
            partial: projects.is_partial(),
            ..TurnData::default()
        };
        let (topic, query) = match plan {
            TurnPlan::Clarify => return Ok(data),
            TurnPlan::Overview => {
                data.projects = projects.rows.clone();
                return Ok(data);
            }
            TurnPlan::MyTasks => {
                let tasks = self.backend.recent_tasks(self.config.task_window_hours).await?;
                data.partial |= tasks.is_partial();
                data.tasks = tasks
                    .rows
                    .into_iter()
                    .filter(|task| !task.is_completed())
                    .filter(|task| task.assignee_discord_id() == Some(participant_id))
                    .collect();
                return Ok(data);
            }
            TurnPlan::MemberTasks(topic) => {
                self.fetch_member_tasks(topic, &mut data).await?;
                return Ok(data);
            }
            TurnPlan::ProjectStatus(topic) => (topic, ProjectQuery::Status),
            TurnPlan::PendingTasks(topic) => (topic, ProjectQuery::Pending),
            TurnPlan::TeamActivity(topic) => (topic, ProjectQuery::Team),
            TurnPlan::ProjectStats(topic) => (topic, ProjectQuery::Stats),
        };

        let Topic::Project { id, name } = topic else {
            self.fetch_member_tasks(topic, &mut data).await?;
            return Ok(data);
        };
        let project = projects
            .rows
            .iter()
            .find(|project| &project.id == id)
            .cloned()
            .unwrap_or_else(|| Project {
                id: id.clone(),
                name: name.clone(),
                status: "unknown".to_string(),
                team_code: None,
            });
        let hours = self.config.stats_window_hours;
        match query {
            ProjectQuery::Status => {
                let (tasks, stats) = tokio::join!(
                    self.backend.incomplete_tasks(id),
                    self.backend.member_stats(id, hours)
                );
                let (tasks, stats) = (tasks?, stats?);
                data.partial |= tasks.is_partial() || stats.is_partial();
                data.tasks = tasks.rows;
                data.member_stats = stats.rows;
            }
            ProjectQuery::Pending => {
                let tasks = self.backend.incomplete_tasks(id).await?;
                data.partial |= tasks.is_partial();
                data.tasks = tasks.rows;
            }
            ProjectQuery::Team => {
                let stats = self.backend.member_stats(id, hours).await?;
                data.partial |= stats.is_partial();
                data.member_stats = stats.rows;
            }
            ProjectQuery::Stats => {
                let (stats, commits) = tokio::join!(
                    self.backend.member_stats(id, hours),
                    self.backend.recent_commits(id, hours)
                );
                let (stats, commits) = (stats?, commits?);
                data.partial |= stats.is_partial() || commits.is_partial();
                data.member_stats = stats.rows;
                data.commits = commits.rows;
            }
        }
        data.projects = vec![project];
        Ok(data)
    }

    async fn fetch_member_tasks(&self, topic: &Topic, data: &mut TurnData) -> Result<(), BotError> {
        let Topic::Member { label, discord_id } = topic else {
            return Ok(());
        };
        let tasks = self.backend.recent_tasks(self.config.task_window_hours).await?;
        data.partial |= tasks.is_partial();
        let handle = label.trim_start_matches('@').to_ascii_lowercase();
        data.tasks = tasks
            .rows
            .into_iter()
            .filter(|task| assigned_to(task, discord_id.as_deref(), &handle))
            .collect();
        Ok(())
    }
}

fn assigned_to(task: &Task, discord_id: Option<&str>, handle: &str) -> bool {
    if let Some(discord_id) = discord_id {
        return task.assignee_discord_id() == Some(discord_id);
    }
    task.assignee.as_ref().is_some_and(|assignee| {
        [assignee.username.as_deref(), assignee.name.as_deref()]
            .into_iter()
            .flatten()
            .any(|name| name.eq_ignore_ascii_case(handle))
    })
}

fn backend_failure(error: &BotError) -> TurnReply {
    TurnReply {
        text: backend_failure_reply(error),
        outcome: TurnOutcome::BackendUnavailable,
    }
}

#[cfg(test)]
mod tests;
