//! Shared types for the ticketdesk chat widget and its chat server.

pub mod error;
pub mod models;
pub mod protocol;

pub use error::*;
pub use models::*;
pub use protocol::*;
