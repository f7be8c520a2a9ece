//! Chat wire protocol: JSON envelopes exchanged over the room socket.
//!
//! Outbound commands are flat objects tagged by `type`
//! (`{"type":"message:new","session_id":...}`); inbound events carry their
//! payload under `data` (`{"type":"session:joined","data":{...}}`).

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::models::{
    BotConfigPatch, ChatSession, CustomerProfile, FileInfo, Message, MessageStatus, MessageType,
    Operator, Sender,
};

// --- Client -> server ---

/// Message body carried by `message:new` and `message:file`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboundMessage {
    pub id: String,
    pub from: Sender,
    #[serde(rename = "type")]
    pub r#type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileInfo>,
}

impl OutboundMessage {
    /// Text body for `message:new`, keeping the id of the local message.
    pub fn text(id: &str, content: &str) -> Self {
        Self {
            id: id.to_string(),
            from: Sender::User,
            r#type: MessageType::Text,
            content: Some(content.to_string()),
            timestamp: crate::models::now_ms(),
            file: None,
        }
    }

    /// File body for `message:file`, keeping the id of the local message.
    pub fn file(id: &str, file: FileInfo) -> Self {
        Self {
            id: id.to_string(),
            from: Sender::User,
            r#type: MessageType::File,
            content: None,
            timestamp: crate::models::now_ms(),
            file: Some(file),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientCommand {
    /// Join (or resume) a session. Either id may be unknown yet.
    #[serde(rename = "session:join")]
    SessionJoin {
        client_id: Option<String>,
        session_id: Option<String>,
    },
    #[serde(rename = "session:new")]
    SessionNew { client_id: Option<String> },
    #[serde(rename = "session:end")]
    SessionEnd {
        session_id: String,
        client_id: Option<String>,
    },
    #[serde(rename = "session:list")]
    SessionList { client_id: String },
    /// Profile update for the current session.
    #[serde(rename = "session:update")]
    SessionUpdate {
        client_id: String,
        session_id: Option<String>,
        data: CustomerProfile,
    },
    #[serde(rename = "message:new")]
    MessageNew {
        session_id: String,
        client_id: String,
        message: OutboundMessage,
    },
    #[serde(rename = "message:file")]
    MessageFile {
        session_id: String,
        client_id: String,
        message: OutboundMessage,
    },
}

impl ClientCommand {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Wire tag of this command, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientCommand::SessionJoin { .. } => "session:join",
            ClientCommand::SessionNew { .. } => "session:new",
            ClientCommand::SessionEnd { .. } => "session:end",
            ClientCommand::SessionList { .. } => "session:list",
            ClientCommand::SessionUpdate { .. } => "session:update",
            ClientCommand::MessageNew { .. } => "message:new",
            ClientCommand::MessageFile { .. } => "message:file",
        }
    }
}

// --- Server -> client ---

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionJoined {
    /// Absent means "keep the id you already have".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default)]
    pub messages: Option<Vec<Message>>,
    #[serde(default)]
    pub session: Option<ChatSession>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<BotConfigPatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operators: Option<Vec<Operator>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionList {
    #[serde(default)]
    pub sessions: Vec<ChatSession>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageReceived {
    pub message: Message,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageRead {
    pub message_id: String,
    pub status: MessageStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OperatorList {
    #[serde(default)]
    pub operators: Vec<Operator>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "session:joined")]
    SessionJoined { data: SessionJoined },
    #[serde(rename = "session:list")]
    SessionList { data: SessionList },
    // The server spells it this way.
    #[serde(rename = "message:recieved")]
    MessageReceived { data: MessageReceived },
    #[serde(rename = "message:read")]
    MessageRead { data: MessageRead },
    #[serde(rename = "operator:list")]
    OperatorList { data: OperatorList },
    /// Any event type this client does not understand.
    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

// --- Addressing ---

/// Check if a host is a local/development address.
///
/// Local hosts are reached over plain `ws`/`http`; everything else uses TLS.
pub fn is_local_address(host: &str) -> bool {
    if host.starts_with("[::ffff:7f00:1]") {
        return true;
    }
    let host_part = host.split(':').next().unwrap_or(host);
    host_part == "localhost"
        || host_part == "127.0.0.1"
        || host_part == "0.0.0.0"
        || host_part.starts_with("192.168.")
        || host_part.starts_with("10.")
        || is_private_172(host_part)
}

/// `172.16.0.0/12`.
fn is_private_172(host: &str) -> bool {
    let mut octets = host.split('.');
    octets.next() == Some("172")
        && octets
            .next()
            .and_then(|o| o.parse::<u8>().ok())
            .is_some_and(|o| (16..=31).contains(&o))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn commands_serialize_flat_with_type_tag() {
        let cmd = ClientCommand::MessageNew {
            session_id: "s1".into(),
            client_id: "c1".into(),
            message: OutboundMessage::text("m_1", "hi"),
        };
        let value: serde_json::Value = serde_json::from_str(&cmd.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "message:new");
        assert_eq!(value["session_id"], "s1");
        assert_eq!(value["client_id"], "c1");
        assert_eq!(value["message"]["id"], "m_1");
        assert_eq!(value["message"]["content"], "hi");
        assert_eq!(value["message"]["from"], "user");
    }

    #[test]
    fn join_keeps_null_ids() {
        let cmd = ClientCommand::SessionJoin {
            client_id: None,
            session_id: None,
        };
        let value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(
            value,
            json!({"type": "session:join", "client_id": null, "session_id": null})
        );
    }

    #[test]
    fn file_body_omits_content() {
        let body = OutboundMessage::file(
            "m_2",
            FileInfo {
                name: Some("a.png".into()),
                r#type: Some("image/png".into()),
                url: Some("https://cdn/a.png".into()),
            },
        );
        let value = serde_json::to_value(&body).unwrap();
        assert!(value.get("content").is_none());
        assert_eq!(value["file"]["type"], "image/png");
    }

    #[test]
    fn session_joined_parses_with_missing_fields() {
        let event = ServerEvent::from_json(
            r#"{"type":"session:joined","data":{"client_id":"c1","messages":null,"session":null}}"#,
        )
        .unwrap();
        let ServerEvent::SessionJoined { data } = event else {
            panic!("expected session:joined");
        };
        assert_eq!(data.client_id.as_deref(), Some("c1"));
        assert_eq!(data.session_id, None);
        assert_eq!(data.messages, None);
    }

    #[test]
    fn session_joined_tolerates_transcript_without_timestamps() {
        let event = ServerEvent::from_json(
            r#"{"type":"session:joined","data":{"session_id":"s1","client_id":"c1","messages":[{"id":"m_1","from":"user","type":"text","content":"hi"}]}}"#,
        )
        .unwrap();
        let ServerEvent::SessionJoined { data } = event else {
            panic!("expected session:joined");
        };
        let messages = data.messages.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].timestamp, 0);
    }

    #[test]
    fn misspelled_received_tag_is_understood() {
        let event = ServerEvent::from_json(
            r#"{"type":"message:recieved","data":{"message":{"id":"m_9","from":"agent","type":"text","content":"yo","timestamp":1}}}"#,
        )
        .unwrap();
        assert!(matches!(event, ServerEvent::MessageReceived { .. }));
    }

    #[test]
    fn unknown_event_types_fall_through() {
        let event =
            ServerEvent::from_json(r#"{"type":"typing:start","data":{"who":"op"}}"#).unwrap();
        assert_eq!(event, ServerEvent::Unknown);
    }

    #[test]
    fn read_receipt_parses_status() {
        let event = ServerEvent::from_json(
            r#"{"type":"message:read","data":{"message_id":"m_1","status":"read"}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ServerEvent::MessageRead {
                data: MessageRead {
                    message_id: "m_1".into(),
                    status: MessageStatus::Read,
                }
            }
        );
    }

    #[test]
    fn local_addresses() {
        for host in [
            "localhost:8787",
            "localhost",
            "127.0.0.1:1999",
            "0.0.0.0",
            "192.168.1.20:80",
            "10.0.0.5",
            "172.16.0.1",
            "172.31.255.1:443",
            "[::ffff:7f00:1]:1999",
        ] {
            assert!(is_local_address(host), "{host} should be local");
        }
        for host in [
            "example.com",
            "chat.ticketdesk.ai:443",
            "172.15.0.1",
            "172.32.0.1",
            "172.2.0.1",
            "11.0.0.1",
        ] {
            assert!(!is_local_address(host), "{host} should be remote");
        }
    }
}
