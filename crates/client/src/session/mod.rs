//! Chat session manager.
//!
//! Owns session identity, the message log and the optimistic send / retry
//! bookkeeping. The manager is synchronous: every operation mutates
//! [`ChatState`] in place, writes commands to the attached [`Outbound`], and
//! returns the [`Effect`]s (timers, uploads) the caller must run. Results of
//! those effects come back through [`SessionManager::apply_deferred`] and
//! [`SessionManager::complete_upload`].
//!
//! Local state is only fully overwritten by `session:joined`; every other
//! server event patches it.

mod error;

use std::sync::Arc;
use std::time::Duration;

use ticketdesk_shared::{
    BotConfig, ClientCommand, CustomerProfile, FileInfo, Message, MessageStatus, OutboundMessage,
    ServerEvent, SessionJoined,
};

use crate::storage::{client_id_key, session_id_key, Storage};
use crate::stores::{ChatState, SessionPhase};
use crate::upload::{FileUpload, UploadError, UploadRequest};
use crate::ws::{SocketEvent, WsHandle};

pub use error::ChatError;

/// Delay before the welcome message reappears after starting a new chat.
pub const WELCOME_DELAY: Duration = Duration::from_millis(100);
/// Delay before the agent asks for an email address.
pub const EMAIL_PROMPT_DELAY: Duration = Duration::from_secs(1);
pub const EMAIL_PROMPT: &str = "What is your email address?";

/// Where commands go. Sends are fire-and-forget.
pub trait Outbound: Send + 'static {
    fn send_command(&self, command: &ClientCommand);
}

impl Outbound for WsHandle {
    fn send_command(&self, command: &ClientCommand) {
        WsHandle::send_command(self, command);
    }
}

/// Work scheduled for later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deferred {
    /// Seed the log with the configured welcome message.
    Welcome,
    /// Ask for an email address with an inline form.
    EmailPrompt,
}

/// Identifies an in-flight upload and the session it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTicket {
    pub message_id: String,
    pub epoch: u64,
    pub name: String,
    pub mime: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadJob {
    pub ticket: UploadTicket,
    pub request: UploadRequest,
}

/// Side effects the caller must carry out on the manager's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Call [`SessionManager::apply_deferred`] with `action` after `delay`.
    Schedule {
        delay: Duration,
        epoch: u64,
        action: Deferred,
    },
    /// Run the upload and report back via [`SessionManager::complete_upload`].
    Upload(UploadJob),
}

pub struct SessionManager<S: Outbound> {
    chatbot_id: String,
    storage: Arc<dyn Storage>,
    socket: Option<S>,
    state: ChatState,
    /// Bumped whenever the log is torn down, so stale effects are dropped.
    epoch: u64,
}

impl<S: Outbound> SessionManager<S> {
    pub fn new(chatbot_id: impl Into<String>, storage: Arc<dyn Storage>, config: BotConfig) -> Self {
        Self {
            chatbot_id: chatbot_id.into(),
            storage,
            socket: None,
            state: ChatState::with_config(config),
            epoch: 0,
        }
    }

    pub fn state(&self) -> &ChatState {
        &self.state
    }

    pub fn chatbot_id(&self) -> &str {
        &self.chatbot_id
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn attach_socket(&mut self, socket: S) {
        self.socket = Some(socket);
        self.state.is_connected = true;
    }

    /// Detach the socket and drop any pending effects.
    pub fn detach_socket(&mut self) -> Option<S> {
        self.epoch += 1;
        self.state.is_connected = false;
        self.socket.take()
    }

    /// Restore stored identity and show the welcome message.
    pub fn mount(&mut self) {
        if let Some(session_id) = self.storage.get(&session_id_key(&self.chatbot_id)) {
            self.state.session_id = Some(session_id);
        }
        if let Some(client_id) = self.storage.get(&client_id_key(&self.chatbot_id)) {
            self.state.client_id = Some(client_id);
        }
        tracing::debug!(
            "mounted {} (session: {:?}, client: {:?})",
            self.chatbot_id,
            self.state.session_id,
            self.state.client_id
        );
        if let Some(welcome) = self.welcome_message() {
            self.state.messages.replace_all(vec![welcome]);
        }
    }

    /// React to connection lifecycle. Every open (re)joins with the stored ids.
    pub fn handle_socket_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Open => {
                tracing::info!("Connected to chat server");
                let command = ClientCommand::SessionJoin {
                    client_id: self.storage.get(&client_id_key(&self.chatbot_id)),
                    session_id: self.storage.get(&session_id_key(&self.chatbot_id)),
                };
                self.send(&command);
                if self.state.phase != SessionPhase::Ended {
                    self.state.phase = SessionPhase::Joining;
                }
            }
            SocketEvent::Message(text) => match ServerEvent::from_json(&text) {
                Ok(event) => self.handle_server_event(event),
                Err(e) => tracing::warn!("Ignoring malformed event: {}", e),
            },
            SocketEvent::Close { code, reason, .. } => {
                tracing::info!("Disconnected from chat server ({} {})", code, reason);
            }
            SocketEvent::Error(reason) => tracing::error!("Socket error: {}", reason),
        }
    }

    pub fn handle_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::SessionJoined { data } => self.on_joined(data),
            ServerEvent::SessionList { data } => {
                tracing::debug!("received {} sessions", data.sessions.len());
                self.state.sessions = data.sessions;
            }
            ServerEvent::MessageReceived { data } => self.state.messages.push(data.message),
            ServerEvent::MessageRead { data } => {
                if !self.state.messages.set_status(&data.message_id, data.status) {
                    tracing::debug!("read receipt for unknown message {}", data.message_id);
                }
            }
            ServerEvent::OperatorList { data } => self.state.operators = data.operators,
            ServerEvent::Unknown => tracing::debug!("Unhandled message type"),
        }
    }

    fn on_joined(&mut self, data: SessionJoined) {
        if let Some(session_id) = data.session_id {
            self.storage.set(&session_id_key(&self.chatbot_id), &session_id);
            self.state.session_id = Some(session_id);
        }
        if let Some(client_id) = data.client_id {
            self.storage.set(&client_id_key(&self.chatbot_id), &client_id);
            self.state.client_id = Some(client_id);
        }
        self.state.messages.replace_all(data.messages.unwrap_or_default());
        self.state.selected_session = data.session;
        self.state.config = BotConfig::joined_defaults().merged(data.config.as_ref());
        if let Some(operators) = data.operators {
            self.state.operators = operators;
        }
        if data.last_active.is_some() {
            self.state.last_active = data.last_active;
        }
        self.state.is_loading = false;
        self.state.phase = if self.state.identity().is_some() {
            SessionPhase::Active
        } else {
            SessionPhase::Joining
        };
        tracing::info!("joined session {:?}", self.state.session_id);
    }

    pub fn send_message(&mut self, content: &str) -> Result<Vec<Effect>, ChatError> {
        let (session_id, client_id) = self.require_identity("send message")?;

        let msg = Message::user_text(content, self.optimistic_status());
        let command = ClientCommand::MessageNew {
            session_id,
            client_id,
            message: OutboundMessage::text(&msg.id, content),
        };

        let mut effects = Vec::new();
        if self.wants_email_prompt() {
            effects.push(self.schedule(EMAIL_PROMPT_DELAY, Deferred::EmailPrompt));
        }
        self.state.messages.push(msg);
        self.send(&command);
        Ok(effects)
    }

    /// The nudge goes out after a follow-up message, never the very first one.
    fn wants_email_prompt(&self) -> bool {
        self.state.messages.user_message_count() > 0
            && self
                .state
                .selected_session
                .as_ref()
                .is_some_and(|s| !s.has_email())
            && !self.state.messages.contains_form()
    }

    /// Show an "Uploading" message and hand back the upload to run.
    pub fn send_file(&mut self, file: FileUpload) -> Result<Effect, ChatError> {
        let (session_id, client_id) = self.require_identity("send file")?;
        file.validate()?;

        let msg = Message::user_file(&file.name, &file.mime, self.optimistic_status());
        let ticket = UploadTicket {
            message_id: msg.id.clone(),
            epoch: self.epoch,
            name: file.name.clone(),
            mime: file.mime.clone(),
        };
        self.state.messages.push(msg);

        Ok(Effect::Upload(UploadJob {
            ticket,
            request: UploadRequest {
                file,
                chatbot_id: self.chatbot_id.clone(),
                session_id,
                client_id,
            },
        }))
    }

    /// Rewrite the upload's message with the outcome and announce the file.
    ///
    /// The message may be gone if a rejoin replaced the log mid-upload; the
    /// server is still told about a successful upload.
    pub fn complete_upload(&mut self, ticket: UploadTicket, result: Result<String, UploadError>) {
        if ticket.epoch != self.epoch {
            tracing::debug!("dropping upload result for a previous chat");
            return;
        }
        if self.state.messages.find(&ticket.message_id).is_none() {
            tracing::debug!("upload finished for unknown message {}", ticket.message_id);
        }

        match result {
            Ok(url) => {
                let file = FileInfo {
                    name: Some(ticket.name.clone()),
                    r#type: Some(ticket.mime.clone()),
                    url: Some(url),
                };
                self.state.messages.update(&ticket.message_id, |m| {
                    m.content.clear();
                    m.status = Some(MessageStatus::Sent);
                    m.file = Some(file.clone());
                });
                match self.state.identity() {
                    Some((session_id, client_id)) => {
                        let command = ClientCommand::MessageFile {
                            session_id: session_id.to_string(),
                            client_id: client_id.to_string(),
                            message: OutboundMessage::file(&ticket.message_id, file),
                        };
                        self.send(&command);
                    }
                    None => tracing::warn!("uploaded {} but session identity is gone", ticket.name),
                }
            }
            Err(e) => {
                tracing::error!("Upload of {} failed: {}", ticket.name, e);
                let name = ticket.name;
                self.state.messages.update(&ticket.message_id, |m| {
                    m.status = Some(MessageStatus::Failed);
                    m.content = format!("Failed to upload {name}");
                });
            }
        }
    }

    /// Re-send a user message under its original id.
    pub fn retry_message(&mut self, id: &str) -> Result<(), ChatError> {
        let (session_id, client_id) = self.require_identity("retry message")?;
        let msg = self
            .state
            .messages
            .find(id)
            .ok_or_else(|| ChatError::UnknownMessage(id.to_string()))?;
        if !msg.is_from_user() {
            return Err(ChatError::NotRetryable(id.to_string()));
        }

        let command = match &msg.file {
            Some(file) => ClientCommand::MessageFile {
                session_id,
                client_id,
                message: OutboundMessage::file(id, file.clone()),
            },
            None => ClientCommand::MessageNew {
                session_id,
                client_id,
                message: OutboundMessage::text(id, &msg.content),
            },
        };

        self.state.messages.set_status(id, MessageStatus::Sent);
        if self.socket.is_some() {
            self.send(&command);
        } else {
            self.state.messages.set_status(id, MessageStatus::Failed);
        }
        Ok(())
    }

    /// Drop the current transcript and ask the server for a fresh session.
    pub fn start_new_chat(&mut self) -> Result<Vec<Effect>, ChatError> {
        if self.socket.is_none() {
            return Err(ChatError::NoSocket("start new chat"));
        }
        self.epoch += 1;
        self.state.messages.clear();
        self.state.session_id = None;
        self.state.phase = SessionPhase::Joining;

        let command = ClientCommand::SessionNew {
            client_id: self.state.client_id.clone(),
        };
        self.send(&command);

        if self.state.config.welcome_message.is_some() {
            Ok(vec![self.schedule(WELCOME_DELAY, Deferred::Welcome)])
        } else {
            Ok(Vec::new())
        }
    }

    /// Ask the server to end the session. The transcript stays visible.
    pub fn end_current_chat(&mut self) -> Result<(), ChatError> {
        if self.socket.is_none() {
            return Err(ChatError::NoSocket("end chat"));
        }
        let session_id = self
            .state
            .session_id
            .clone()
            .ok_or(ChatError::IdentityNotReady("end chat"))?;
        let command = ClientCommand::SessionEnd {
            session_id,
            client_id: self.state.client_id.clone(),
        };
        self.send(&command);
        self.state.phase = SessionPhase::Ended;
        Ok(())
    }

    /// Switch to another of this client's sessions.
    pub fn load_session(&mut self, session_id: &str) -> Result<(), ChatError> {
        if self.socket.is_none() {
            return Err(ChatError::NoSocket("load session"));
        }
        let command = ClientCommand::SessionJoin {
            client_id: self.state.client_id.clone(),
            session_id: Some(session_id.to_string()),
        };
        self.send(&command);
        self.state.session_id = Some(session_id.to_string());
        self.state.phase = SessionPhase::Joining;
        Ok(())
    }

    pub fn get_recent_chats(&mut self) -> Result<(), ChatError> {
        if self.socket.is_none() {
            return Err(ChatError::NoSocket("list sessions"));
        }
        let client_id = self
            .state
            .client_id
            .clone()
            .ok_or(ChatError::IdentityNotReady("list sessions"))?;
        self.send(&ClientCommand::SessionList { client_id });
        Ok(())
    }

    /// Send contact details and merge them into the selected session right away.
    pub fn update_profile(&mut self, profile: CustomerProfile) {
        match (&self.socket, self.state.client_id.clone()) {
            (Some(_), Some(client_id)) => {
                let command = ClientCommand::SessionUpdate {
                    client_id,
                    session_id: self.state.session_id.clone(),
                    data: profile.clone(),
                };
                self.send(&command);
            }
            _ => tracing::warn!("No client id yet, profile kept locally"),
        }
        if let Some(session) = self.state.selected_session.as_mut() {
            session.apply_profile(&profile);
        }
    }

    /// Run a scheduled action, unless the chat it belonged to is gone.
    pub fn apply_deferred(&mut self, epoch: u64, action: Deferred) {
        if epoch != self.epoch {
            tracing::debug!("dropping stale {:?}", action);
            return;
        }
        match action {
            Deferred::Welcome => {
                if let Some(welcome) = self.welcome_message() {
                    self.state.messages.replace_all(vec![welcome]);
                }
            }
            Deferred::EmailPrompt => {
                if self.state.messages.contains_form() {
                    return;
                }
                self.state
                    .messages
                    .push(Message::agent_form(EMAIL_PROMPT, &["email"]));
            }
        }
    }

    fn welcome_message(&self) -> Option<Message> {
        self.state
            .config
            .welcome_message
            .as_deref()
            .filter(|w| !w.is_empty())
            .map(Message::agent_text)
    }

    fn schedule(&self, delay: Duration, action: Deferred) -> Effect {
        Effect::Schedule {
            delay,
            epoch: self.epoch,
            action,
        }
    }

    /// Status for a new user message: sent whenever a socket is attached,
    /// even if it is currently reconnecting.
    fn optimistic_status(&self) -> MessageStatus {
        if self.socket.is_some() {
            MessageStatus::Sent
        } else {
            MessageStatus::Failed
        }
    }

    fn require_identity(&self, action: &'static str) -> Result<(String, String), ChatError> {
        match self.state.identity() {
            Some((session_id, client_id)) => Ok((session_id.to_string(), client_id.to_string())),
            None => Err(ChatError::IdentityNotReady(action)),
        }
    }

    fn send(&self, command: &ClientCommand) {
        match &self.socket {
            Some(socket) => socket.send_command(command),
            None => tracing::debug!("no socket, dropping {}", command.kind()),
        }
    }
}
