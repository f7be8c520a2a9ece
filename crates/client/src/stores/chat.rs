//! Observable state of one chat widget.

use ticketdesk_shared::{BotConfig, ChatSession, Operator};

use super::messages::MessageLog;

/// Where the widget is in the session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// No identity known yet.
    #[default]
    Uninitialized,
    /// A join or new-session request is in flight.
    Joining,
    /// Session and client ids are both known.
    Active,
    /// The user ended the chat; the transcript stays until a new chat starts.
    Ended,
}

/// Snapshot of everything a UI renders.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatState {
    pub messages: MessageLog,
    pub session_id: Option<String>,
    pub client_id: Option<String>,
    /// Recent sessions for this client, as last listed by the server.
    pub sessions: Vec<ChatSession>,
    pub selected_session: Option<ChatSession>,
    pub config: BotConfig,
    pub operators: Vec<Operator>,
    pub last_active: Option<i64>,
    /// True until the first `session:joined`.
    pub is_loading: bool,
    /// A socket is attached. Not the same as the transport being open.
    pub is_connected: bool,
    pub phase: SessionPhase,
}

impl Default for ChatState {
    fn default() -> Self {
        Self {
            messages: MessageLog::new(),
            session_id: None,
            client_id: None,
            sessions: Vec::new(),
            selected_session: None,
            config: BotConfig::default(),
            operators: Vec::new(),
            last_active: None,
            is_loading: true,
            is_connected: false,
            phase: SessionPhase::Uninitialized,
        }
    }
}

impl ChatState {
    pub fn with_config(config: BotConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Both ids needed to send chat content.
    pub fn identity(&self) -> Option<(&str, &str)> {
        Some((self.session_id.as_deref()?, self.client_id.as_deref()?))
    }
}
