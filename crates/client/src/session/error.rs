use thiserror::Error;

use crate::upload::InvalidFile;

/// Why a session command was not carried out. None of these are fatal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("no session details yet, cannot {0}")]
    IdentityNotReady(&'static str),
    #[error("no socket attached, cannot {0}")]
    NoSocket(&'static str),
    #[error("unknown message {0}")]
    UnknownMessage(String),
    #[error("message {0} was not sent by the user")]
    NotRetryable(String),
    #[error(transparent)]
    InvalidFile(#[from] InvalidFile),
}
