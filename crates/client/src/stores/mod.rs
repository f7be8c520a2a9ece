//! Client-side state owned by the chat session.

pub mod chat;
pub mod messages;

pub use chat::{ChatState, SessionPhase};
pub use messages::MessageLog;
