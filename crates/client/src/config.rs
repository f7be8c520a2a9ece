//! Widget configuration from environment variables.

use std::time::Duration;

use thiserror::Error;

use crate::ws::{http_origin, AddressError, RoomOptions, SocketOptions};

pub const DEFAULT_HOST: &str = "http://localhost:8787";
pub const DEFAULT_PARTY: &str = "chatroom";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
    #[error(transparent)]
    Address(#[from] AddressError),
}

/// Where session identity is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageKind {
    /// One file per key in the platform config directory.
    #[default]
    File,
    /// Kept in memory, forgotten on exit.
    Memory,
}

#[derive(Debug, Clone)]
pub struct WidgetConfig {
    /// Identifies the chatbot; also the room name.
    pub chatbot_id: String,
    pub host: String,
    pub party: String,
    pub upload_url: String,
    pub storage: StorageKind,
    pub socket: SocketOptions,
    /// Greeting shown before the first join. `None` keeps the default.
    pub welcome_message: Option<String>,
}

impl WidgetConfig {
    pub fn new(chatbot_id: impl Into<String>) -> Self {
        Self {
            chatbot_id: chatbot_id.into(),
            host: DEFAULT_HOST.to_string(),
            party: DEFAULT_PARTY.to_string(),
            upload_url: format!("{}/upload", http_origin(DEFAULT_HOST)),
            storage: StorageKind::default(),
            socket: SocketOptions::default(),
            welcome_message: None,
        }
    }

    /// Parse configuration from environment variables.
    ///
    /// Environment variables:
    /// - `TICKETDESK_CHATBOT_ID`: chatbot to connect to (required)
    /// - `TICKETDESK_HOST`: chat server host (default: "http://localhost:8787")
    /// - `TICKETDESK_PARTY`: party name (default: "chatroom")
    /// - `TICKETDESK_UPLOAD_URL`: upload endpoint (default: "<host origin>/upload")
    /// - `TICKETDESK_STORAGE`: "file" | "memory" (default: "file")
    /// - `TICKETDESK_MAX_RETRIES`: give up after this many reconnects (default: never)
    /// - `TICKETDESK_CONNECT_TIMEOUT_MS`: connection timeout (default: 4000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let chatbot_id =
            var("TICKETDESK_CHATBOT_ID").ok_or(ConfigError::Missing("TICKETDESK_CHATBOT_ID"))?;
        let mut config = Self::new(chatbot_id);

        if let Some(host) = var("TICKETDESK_HOST") {
            config.upload_url = format!("{}/upload", http_origin(&host));
            config.host = host;
        }
        if let Some(party) = var("TICKETDESK_PARTY") {
            config.party = party;
        }
        if let Some(upload_url) = var("TICKETDESK_UPLOAD_URL") {
            config.upload_url = upload_url;
        }
        if let Some(storage) = var("TICKETDESK_STORAGE") {
            config.storage = match storage.to_lowercase().as_str() {
                "file" => StorageKind::File,
                "memory" => StorageKind::Memory,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "TICKETDESK_STORAGE",
                        value: storage,
                    })
                }
            };
        }
        if let Some(retries) = var("TICKETDESK_MAX_RETRIES") {
            let retries = retries.parse::<u32>().map_err(|_| ConfigError::Invalid {
                var: "TICKETDESK_MAX_RETRIES",
                value: retries.clone(),
            })?;
            config.socket = config.socket.with_max_retries(Some(retries));
        }
        if let Some(timeout) = var("TICKETDESK_CONNECT_TIMEOUT_MS") {
            let ms = timeout.parse::<u64>().map_err(|_| ConfigError::Invalid {
                var: "TICKETDESK_CONNECT_TIMEOUT_MS",
                value: timeout.clone(),
            })?;
            config.socket = config
                .socket
                .with_connection_timeout(Duration::from_millis(ms));
        }

        Ok(config)
    }

    /// Room options for this chatbot's socket.
    pub fn room(&self) -> RoomOptions {
        RoomOptions::new(&self.host, &self.chatbot_id).with_party(&self.party)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn requires_chatbot_id() {
        assert_eq!(
            WidgetConfig::from_lookup(lookup(&[])).unwrap_err(),
            ConfigError::Missing("TICKETDESK_CHATBOT_ID")
        );
        assert!(WidgetConfig::from_lookup(lookup(&[("TICKETDESK_CHATBOT_ID", " ")])).is_err());
    }

    #[test]
    fn defaults() {
        let config = WidgetConfig::from_lookup(lookup(&[("TICKETDESK_CHATBOT_ID", "bot")])).unwrap();
        assert_eq!(config.host, "http://localhost:8787");
        assert_eq!(config.party, "chatroom");
        assert_eq!(config.upload_url, "http://localhost:8787/upload");
        assert_eq!(config.storage, StorageKind::File);
        assert_eq!(config.socket.max_retries, None);
        assert_eq!(config.socket.connection_timeout, Duration::from_secs(4));
    }

    #[test]
    fn upload_url_follows_host_unless_set() {
        let config = WidgetConfig::from_lookup(lookup(&[
            ("TICKETDESK_CHATBOT_ID", "bot"),
            ("TICKETDESK_HOST", "chat.example.com"),
        ]))
        .unwrap();
        assert_eq!(config.upload_url, "https://chat.example.com/upload");

        let config = WidgetConfig::from_lookup(lookup(&[
            ("TICKETDESK_CHATBOT_ID", "bot"),
            ("TICKETDESK_HOST", "chat.example.com"),
            ("TICKETDESK_UPLOAD_URL", "https://files.example.com/up"),
        ]))
        .unwrap();
        assert_eq!(config.upload_url, "https://files.example.com/up");
    }

    #[test]
    fn parses_overrides() {
        let config = WidgetConfig::from_lookup(lookup(&[
            ("TICKETDESK_CHATBOT_ID", "bot"),
            ("TICKETDESK_PARTY", "support"),
            ("TICKETDESK_STORAGE", "Memory"),
            ("TICKETDESK_MAX_RETRIES", "5"),
            ("TICKETDESK_CONNECT_TIMEOUT_MS", "1500"),
        ]))
        .unwrap();
        assert_eq!(config.party, "support");
        assert_eq!(config.storage, StorageKind::Memory);
        assert_eq!(config.socket.max_retries, Some(5));
        assert_eq!(config.socket.connection_timeout, Duration::from_millis(1500));
    }

    #[test]
    fn rejects_bad_values() {
        let err = WidgetConfig::from_lookup(lookup(&[
            ("TICKETDESK_CHATBOT_ID", "bot"),
            ("TICKETDESK_MAX_RETRIES", "lots"),
        ]))
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                var: "TICKETDESK_MAX_RETRIES",
                value: "lots".into()
            }
        );
        assert!(WidgetConfig::from_lookup(lookup(&[
            ("TICKETDESK_CHATBOT_ID", "bot"),
            ("TICKETDESK_STORAGE", "redis"),
        ]))
        .is_err());
    }

    #[test]
    fn room_uses_chatbot_as_room() {
        let room = WidgetConfig::new("bot").room();
        assert_eq!(room.room, "bot");
        assert_eq!(room.party.as_deref(), Some("chatroom"));
        assert_eq!(room.host, "http://localhost:8787");
    }
}
