use datapillar_client::TransportError;
use http::StatusCode;
use thiserror::Error;

/// Cloned to every waiter of a coalesced request.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("api error {status}: {message}")]
    Api { status: StatusCode, message: String },
    #[error("stream error: {0}")]
    Stream(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// Message shown to the user when this error is surfaced inline.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Transport(err) => err.user_message(),
            ApiError::Api { message, .. } => message.clone(),
            ApiError::Stream(message) | ApiError::InvalidResponse(message) => message.clone(),
        }
    }
}
