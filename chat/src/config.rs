use crate::activity::MAX_ACTIVITY_ROWS;
use crate::error::ConfigError;
use datapillar_api::Provider;
use datapillar_api::ReconnectConfig;
use datapillar_api::RetryConfig;
use dirs::home_dir;
use serde::Deserialize;
use serde::Serialize;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

pub const DATAPILLAR_HOME_ENV: &str = "DATAPILLAR_HOME";
pub const CONFIG_TOML_FILE: &str = "config.toml";

const DEFAULT_BASE_URL: &str = "http://localhost:7000/api/ai";
const DEFAULT_API_KEY_ENV: &str = "DATAPILLAR_API_KEY";
const DEFAULT_STREAM_IDLE_TIMEOUT_MS: u64 = 300_000;
const DEFAULT_REQUEST_MAX_RETRIES: u64 = 2;
const DEFAULT_STREAM_MAX_RETRIES: u64 = 5;
const DEFAULT_RECONNECT_DELAY_MS: u64 = 1_000;

/// Contents of `$DATAPILLAR_HOME/config.toml`. Every field is optional.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ConfigToml {
    /// Base URL of the AI gateway, up to and including `/api/ai`.
    pub base_url: Option<String>,

    /// Model id sent with every request unless the user picks another.
    pub model: Option<String>,

    /// Sent as `x-tenant-id` on every request.
    pub tenant_id: Option<String>,

    /// Environment variable holding the bearer token.
    pub api_key_env: Option<String>,

    pub max_activity_rows: Option<usize>,

    /// Idle time after which a silent event stream is treated as dropped.
    pub stream_idle_timeout_ms: Option<u64>,

    /// Retries for the start and abort requests.
    pub request_max_retries: Option<u64>,

    /// Reconnects of the event stream before giving up.
    pub stream_max_retries: Option<u64>,

    pub reconnect_delay_ms: Option<u64>,
}

/// Values from the command line that take precedence over `config.toml`.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub datapillar_home: PathBuf,
    pub base_url: String,
    pub model: Option<String>,
    pub tenant_id: Option<String>,
    pub api_key_env: String,
    pub max_activity_rows: usize,
    pub stream_idle_timeout: Duration,
    pub request_max_retries: u64,
    pub stream_max_retries: u64,
    pub reconnect_delay: Duration,
}

impl Config {
    pub fn load_with_overrides(overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        let datapillar_home = find_datapillar_home().map_err(ConfigError::Home)?;
        Self::load_from_home(datapillar_home, overrides)
    }

    /// Reads `config.toml` under `datapillar_home`; a missing file means all
    /// defaults.
    pub fn load_from_home(
        datapillar_home: PathBuf,
        overrides: ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let cfg = load_config_toml(&datapillar_home)?;
        Ok(Self::from_toml(cfg, overrides, datapillar_home))
    }

    pub fn from_toml(
        cfg: ConfigToml,
        overrides: ConfigOverrides,
        datapillar_home: PathBuf,
    ) -> Self {
        Self {
            datapillar_home,
            base_url: overrides
                .base_url
                .or(cfg.base_url)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: overrides.model.or(cfg.model),
            tenant_id: cfg.tenant_id,
            api_key_env: cfg
                .api_key_env
                .unwrap_or_else(|| DEFAULT_API_KEY_ENV.to_string()),
            max_activity_rows: cfg.max_activity_rows.unwrap_or(MAX_ACTIVITY_ROWS),
            stream_idle_timeout: Duration::from_millis(
                cfg.stream_idle_timeout_ms
                    .unwrap_or(DEFAULT_STREAM_IDLE_TIMEOUT_MS),
            ),
            request_max_retries: cfg
                .request_max_retries
                .unwrap_or(DEFAULT_REQUEST_MAX_RETRIES),
            stream_max_retries: cfg
                .stream_max_retries
                .unwrap_or(DEFAULT_STREAM_MAX_RETRIES),
            reconnect_delay: Duration::from_millis(
                cfg.reconnect_delay_ms.unwrap_or(DEFAULT_RECONNECT_DELAY_MS),
            ),
        }
    }

    pub fn provider(&self) -> Provider {
        let mut provider = Provider::new("datapillar", self.base_url.clone());
        provider.retry = RetryConfig {
            max_attempts: self.request_max_retries,
            ..RetryConfig::default()
        };
        provider.reconnect = ReconnectConfig {
            max_retries: self.stream_max_retries,
            delay: self.reconnect_delay,
        };
        provider.stream_idle_timeout = self.stream_idle_timeout;
        provider
    }

    /// Bearer token from the configured environment variable, if set.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

fn load_config_toml(datapillar_home: &Path) -> Result<ConfigToml, ConfigError> {
    let path = datapillar_home.join(CONFIG_TOML_FILE);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(ConfigToml::default()),
        Err(source) => return Err(ConfigError::Read { path, source }),
    };
    toml::from_str(&raw).map_err(|source| ConfigError::Parse { path, source })
}

/// Returns the Datapillar client directory: `$DATAPILLAR_HOME` when set,
/// otherwise `~/.datapillar`.
///
/// - If `DATAPILLAR_HOME` is set, it must be an existing directory and is
///   canonicalized.
/// - Otherwise the default is returned without checking that it exists.
pub fn find_datapillar_home() -> io::Result<PathBuf> {
    let home_env = std::env::var(DATAPILLAR_HOME_ENV)
        .ok()
        .filter(|val| !val.is_empty());
    find_datapillar_home_from_env(home_env.as_deref())
}

fn find_datapillar_home_from_env(home_env: Option<&str>) -> io::Result<PathBuf> {
    match home_env {
        Some(val) => {
            let path = PathBuf::from(val);
            let metadata = std::fs::metadata(&path).map_err(|err| match err.kind() {
                io::ErrorKind::NotFound => io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{DATAPILLAR_HOME_ENV} points to {val:?}, but that path does not exist"),
                ),
                _ => io::Error::new(
                    err.kind(),
                    format!("failed to read {DATAPILLAR_HOME_ENV} {val:?}: {err}"),
                ),
            })?;
            if !metadata.is_dir() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{DATAPILLAR_HOME_ENV} points to {val:?}, but that path is not a directory"),
                ));
            }
            path.canonicalize()
        }
        None => {
            let mut p = home_dir().ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "Could not find home directory")
            })?;
            p.push(".datapillar");
            Ok(p)
        }
    }
}
