//! Shared data models for the ticketdesk chat widget.

use serde::{Deserialize, Serialize};

/// Current time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// --- Messaging ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Agent,
    Operator,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
    Form,
}

/// Delivery status. Only meaningful for messages sent by the user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Read,
    Failed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FileInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Client-generated id; the correlation key for read receipts and retries.
    #[serde(default)]
    pub id: String,
    pub from: Sender,
    #[serde(rename = "type", default)]
    pub r#type: MessageType,
    #[serde(default)]
    pub content: String,
    /// Milliseconds since the epoch; 0 when the server leaves it out.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
    /// Field names requested by a `form` message, e.g. `["email"]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
}

impl Message {
    /// Generate a fresh message id (`m_<uuid>`).
    pub fn new_id() -> String {
        format!("m_{}", uuid::Uuid::new_v4())
    }

    /// A text message authored by the local user.
    pub fn user_text(content: impl Into<String>, status: MessageStatus) -> Self {
        Self {
            id: Self::new_id(),
            from: Sender::User,
            r#type: MessageType::Text,
            content: content.into(),
            timestamp: now_ms(),
            status: Some(status),
            file: None,
            meta: None,
            fields: None,
        }
    }

    /// A file message authored by the local user, before its upload completes.
    pub fn user_file(name: &str, mime: &str, status: MessageStatus) -> Self {
        Self {
            id: Self::new_id(),
            from: Sender::User,
            r#type: MessageType::File,
            content: format!("Uploading {name}..."),
            timestamp: now_ms(),
            status: Some(status),
            file: Some(FileInfo {
                name: Some(name.to_string()),
                r#type: Some(mime.to_string()),
                url: None,
            }),
            meta: None,
            fields: None,
        }
    }

    /// A plain text message from the agent (welcome messages and the like).
    pub fn agent_text(content: impl Into<String>) -> Self {
        Self {
            id: Self::new_id(),
            from: Sender::Agent,
            r#type: MessageType::Text,
            content: content.into(),
            timestamp: now_ms(),
            status: None,
            file: None,
            meta: None,
            fields: None,
        }
    }

    /// An inline form from the agent asking the user for `fields`.
    pub fn agent_form(content: impl Into<String>, fields: &[&str]) -> Self {
        Self {
            r#type: MessageType::Form,
            fields: Some(fields.iter().map(|f| f.to_string()).collect()),
            ..Self::agent_text(content)
        }
    }

    pub fn is_from_user(&self) -> bool {
        self.from == Sender::User
    }

    /// Display name of the attached file, if any.
    pub fn file_name(&self) -> Option<&str> {
        self.file.as_ref().and_then(|f| f.name.as_deref())
    }
}

// --- Sessions ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Open,
    Pending,
    Resolved,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChatSession {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub state: SessionState,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl ChatSession {
    /// Whether an email address is on file for this session.
    pub fn has_email(&self) -> bool {
        self.email.as_deref().is_some_and(|e| !e.trim().is_empty())
    }

    /// Merge the non-empty fields of `profile` into this session.
    pub fn apply_profile(&mut self, profile: &CustomerProfile) {
        if let Some(name) = &profile.name {
            self.name = Some(name.clone());
        }
        if let Some(email) = &profile.email {
            self.email = Some(email.clone());
        }
        if let Some(phone) = &profile.phone {
            self.phone = Some(phone.clone());
        }
    }
}

/// Contact details a visitor can leave on their session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CustomerProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl CustomerProfile {
    pub fn email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.phone.is_none()
    }
}

// --- Operators ---

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Operator {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

// --- Widget configuration ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BotShape {
    Square,
    #[default]
    Round,
}

pub const DEFAULT_COLOR: &str = "#3b82f6";
pub const DEFAULT_WELCOME_MESSAGE: &str = "Hi there!";
pub const JOINED_WELCOME_MESSAGE: &str = "Hi! How can I help you today?";

/// Appearance and greeting of a chatbot, as configured server-side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BotConfig {
    pub color: String,
    pub shape: BotShape,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub welcome_message: Option<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            color: DEFAULT_COLOR.to_string(),
            shape: BotShape::Round,
            icon: None,
            welcome_message: Some(DEFAULT_WELCOME_MESSAGE.to_string()),
        }
    }
}

impl BotConfig {
    /// Defaults used as the base for configuration sent with `session:joined`.
    pub fn joined_defaults() -> Self {
        Self {
            welcome_message: Some(JOINED_WELCOME_MESSAGE.to_string()),
            ..Self::default()
        }
    }

    /// Overlay the fields present in `patch`.
    pub fn merged(mut self, patch: Option<&BotConfigPatch>) -> Self {
        let Some(patch) = patch else {
            return self;
        };
        if let Some(color) = &patch.color {
            self.color = color.clone();
        }
        if let Some(shape) = patch.shape {
            self.shape = shape;
        }
        if patch.icon.is_some() {
            self.icon = patch.icon.clone();
        }
        if patch.welcome_message.is_some() {
            self.welcome_message = patch.welcome_message.clone();
        }
        self
    }
}

/// Partial configuration as sent by the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BotConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<BotShape>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub welcome_message: Option<String>,
}
