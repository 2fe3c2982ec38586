//! Conversation session manager: per-participant history with FIFO eviction,
//! topic carry-over for follow-up questions, backend fetches scoped to the
//! topic, and degraded replies when the model is unavailable.

mod context_format;
mod history_store;
mod member_roster;
mod replies;
mod session;
mod session_manager;
mod topic;

pub use context_format::{format_turn_data, TurnData};
pub use history_store::ConversationHistoryStore;
pub use member_roster::{KnownMember, MemberRoster};
pub use replies::{build_chat_request, degraded_reply, render_context, CHAT_TEMPERATURE};
pub use session::{ConversationSession, Topic, Turn, TurnRole};
pub use session_manager::{
    SessionManager, SessionManagerConfig, TurnOutcome, TurnReply, DEFAULT_IDLE_TIMEOUT_MS,
    DEFAULT_MAX_TURNS,
};
pub use topic::{classify_intent, find_named_member, plan_turn, Intent, TurnPlan};

pub const CONVERSATIONS_FILE: &str = "conversations.json";
