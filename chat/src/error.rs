use datapillar_api::ApiError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode snapshot: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no interrupt option at index {0}")]
    NoSuchOption(usize),
}

impl ChatError {
    /// Text suitable for a transient notification.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::Api(err) => err.user_message(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not resolve DATAPILLAR_HOME: {0}")]
    Home(#[source] io::Error),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
