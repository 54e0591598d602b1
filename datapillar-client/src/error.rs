use http::HeaderMap;
use http::StatusCode;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("http {status}: {body:?}")]
    Http {
        status: StatusCode,
        url: Option<String>,
        headers: Option<HeaderMap>,
        body: Option<String>,
    },
    #[error("retry limit reached")]
    RetryLimit,
    #[error("timeout")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("request build error: {0}")]
    Build(String),
}

impl TransportError {
    /// Short message suitable for showing inline in a chat bubble.
    pub fn user_message(&self) -> String {
        match self {
            TransportError::Http { status, body, .. } => match body.as_deref() {
                Some(body) if !body.trim().is_empty() => format!("{status}: {}", body.trim()),
                _ => status.to_string(),
            },
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum StreamError {
    #[error("stream failed: {0}")]
    Stream(String),
    #[error("timeout")]
    Timeout,
}
