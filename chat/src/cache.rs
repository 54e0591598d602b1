use crate::error::ChatError;
use crate::error::Result;
use crate::message::ChatMessage;
use async_trait::async_trait;
use datapillar_api::WorkflowGraph;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use sha2::Digest;
use sha2::Sha256;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tracing::debug;
use tracing::warn;

pub const CACHE_DIR: &str = "cache";

/// Everything needed to redraw a conversation without a network round trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSnapshot {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub workflow: Option<WorkflowGraph>,
    #[serde(default)]
    pub last_prompt: Option<String>,
    #[serde(default)]
    pub is_initialized: bool,
    /// Opaque scroll state of the message list.
    #[serde(default)]
    pub viewport: Option<Value>,
    #[serde(default)]
    pub selected_model_id: Option<String>,
    #[serde(default)]
    pub default_model_id: Option<String>,
}

/// Persistence for [`CacheSnapshot`]s, one per key.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// `Ok(None)` when nothing usable is stored under `key`.
    async fn load(&self, key: &str) -> Result<Option<CacheSnapshot>>;

    async fn save(&self, key: &str, snapshot: &CacheSnapshot) -> Result<()>;

    async fn clear(&self, key: &str) -> Result<()>;
}

/// Stores each snapshot as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store rooted at `<datapillar_home>/cache`.
    pub fn in_home(datapillar_home: &Path) -> Self {
        Self::new(datapillar_home.join(CACHE_DIR))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(key)))
    }
}

/// File stem for `key`: the key made file-safe plus a short digest of the
/// raw key, so distinct keys never share a file.
fn file_stem(key: &str) -> String {
    let sanitized: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let readable = if sanitized.is_empty() {
        "default"
    } else {
        sanitized.as_str()
    };
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    let short = hex.get(..12).unwrap_or(hex.as_str());
    format!("{readable}-{short}")
}

fn write_atomically(write_path: &Path, contents: &str) -> io::Result<()> {
    let parent = write_path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("path {} has no parent directory", write_path.display()),
        )
    })?;
    std::fs::create_dir_all(parent)?;
    let tmp = NamedTempFile::new_in(parent)?;
    std::fs::write(tmp.path(), contents)?;
    tmp.persist(write_path)?;
    Ok(())
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn load(&self, key: &str) -> Result<Option<CacheSnapshot>> {
        let path = self.path_for(key);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(ChatError::Io(err)),
        };
        match serde_json::from_str::<CacheSnapshot>(&raw) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring unreadable chat cache");
                Ok(None)
            }
        }
    }

    async fn save(&self, key: &str, snapshot: &CacheSnapshot) -> Result<()> {
        let path = self.path_for(key);
        let contents = serde_json::to_string_pretty(snapshot)?;
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&target, &contents))
            .await
            .map_err(io::Error::other)??;
        debug!(path = %path.display(), messages = snapshot.messages.len(), "chat cache saved");
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ChatError::Io(err)),
        }
    }
}
