//! Error types for PromptFlam.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Missing or malformed request payload.
    #[error("{0}")]
    InvalidInput(String),

    /// Missing upstream credential or unusable configuration.
    #[error("{0}")]
    Config(String),

    /// The upstream answered with a non-success status.
    #[error("{message}")]
    UpstreamRejected { status: u16, message: String },

    /// Read or decode failure that is not a cancellation.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The caller cancelled the request.
    #[error("Request aborted")]
    UserAborted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status code that mirrors the failure class.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::InvalidInput(_) => 400,
            Error::UpstreamRejected { status, .. } => *status,
            Error::Transport(_) => 502,
            Error::UserAborted => 499,
            Error::Config(_) | Error::Io(_) | Error::Json(_) | Error::Internal(_) => 500,
        }
    }

    pub fn is_abort(&self) -> bool {
        matches!(self, Error::UserAborted)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
