//! Durable key/value storage for session identity.
//!
//! Values are plain strings. On desktop they live one file per key in the
//! platform config directory:
//!   - Linux: `~/.config/ticketdesk/`
//!   - macOS: `~/Library/Application Support/ticketdesk/`
//!   - Windows: `%APPDATA%\ticketdesk\`
//!
//! Failures are logged and read back as "no value"; storage never blocks chat.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    /// Returns `true` if the value was written.
    fn set(&self, key: &str, value: &str) -> bool;
    fn remove(&self, key: &str);
}

/// Key under which a chatbot's session id is kept.
pub fn session_id_key(chatbot_id: &str) -> String {
    format!("ti_{}_session_id", chatbot_id)
}

/// Key under which a chatbot's client id is kept.
pub fn client_id_key(chatbot_id: &str) -> String {
    format!("ti_{}_client_id", chatbot_id)
}

/// One file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Storage in the platform config directory, if there is one.
    pub fn new() -> Option<Self> {
        let dir = dirs::config_dir()?.join("ticketdesk");
        Some(Self { dir })
    }

    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file_path(&self, key: &str) -> Option<PathBuf> {
        if !self.dir.exists() {
            if let Err(e) = std::fs::create_dir_all(&self.dir) {
                tracing::error!("Failed to create {}: {}", self.dir.display(), e);
                return None;
            }
        }
        // Sanitize key to be a valid filename
        let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        Some(self.dir.join(safe_key))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        let path = self.file_path(key)?;
        std::fs::read_to_string(path).ok()
    }

    fn set(&self, key: &str, value: &str) -> bool {
        let Some(path) = self.file_path(key) else {
            return false;
        };
        match std::fs::write(&path, value) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to write {}: {}", path.display(), e);
                false
            }
        }
    }

    fn remove(&self, key: &str) {
        if let Some(path) = self.file_path(key) {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// In-process storage, lost on exit. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> bool {
        match self.values.lock() {
            Ok(mut values) => {
                values.insert(key.to_string(), value.to_string());
                true
            }
            Err(_) => false,
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_pattern() {
        assert_eq!(session_id_key("bot1"), "ti_bot1_session_id");
        assert_eq!(client_id_key("bot1"), "ti_bot1_client_id");
    }

    #[test]
    fn file_storage_roundtrip_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::with_dir(dir.path().join("nested"));

        assert_eq!(storage.get("ti_bot_client_id"), None);
        assert!(storage.set("ti_bot_client_id", "c1"));
        assert_eq!(storage.get("ti_bot_client_id").as_deref(), Some("c1"));

        storage.remove("ti_bot_client_id");
        assert_eq!(storage.get("ti_bot_client_id"), None);
    }

    #[test]
    fn file_storage_sanitizes_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::with_dir(dir.path());

        assert!(storage.set("a/b:c", "v"));
        assert!(dir.path().join("a_b_c").exists());
        assert_eq!(storage.get("a/b:c").as_deref(), Some("v"));
    }

    #[test]
    fn memory_storage_clones_share_values() {
        let storage = MemoryStorage::new();
        let other = storage.clone();
        storage.set("k", "v");
        assert_eq!(other.get("k").as_deref(), Some("v"));
        other.remove("k");
        assert_eq!(storage.get("k"), None);
    }
}
