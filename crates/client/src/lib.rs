//! Ticketdesk chat client core.
//!
//! The non-visual half of the support-chat widget: a self-reconnecting
//! socket, room addressing, and the chat session manager built on top of
//! them. A UI layer drives a [`ChatWidget`] and renders its [`ChatState`].

pub mod config;
pub mod logging;
pub mod session;
pub mod storage;
pub mod stores;
pub mod upload;
pub mod widget;
pub mod ws;

pub use config::{ConfigError, StorageKind, WidgetConfig};
pub use session::{ChatError, SessionManager};
pub use stores::{ChatState, MessageLog, SessionPhase};
pub use upload::{FileUpload, HttpUploader, UploadError, Uploader};
pub use widget::{init, init_with, ChatWidget};
