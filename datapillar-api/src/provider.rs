use datapillar_client::Request;
use datapillar_client::RetryOn;
use datapillar_client::RetryPolicy;
use http::Method;
use http::header::HeaderMap;
use std::time::Duration;

/// High-level retry configuration for the AI gateway.
///
/// Converted into a `RetryPolicy` that `datapillar-client` uses for every
/// unary call and for each (re)open of the event stream.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u64,
    pub base_delay: Duration,
    pub retry_429: bool,
    pub retry_5xx: bool,
    pub retry_transport: bool,
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: self.base_delay,
            retry_on: RetryOn {
                retry_429: self.retry_429,
                retry_5xx: self.retry_5xx,
                retry_transport: self.retry_transport,
            },
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(200),
            retry_429: true,
            retry_5xx: true,
            retry_transport: true,
        }
    }
}

/// How the event stream behaves after it drops without a terminal event.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Consecutive reconnects without a single received frame before the
    /// stream gives up and reports an error.
    pub max_retries: u64,
    /// Delay before reconnecting unless the server sent a `retry:` field.
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            delay: Duration::from_secs(1),
        }
    }
}

/// HTTP endpoint configuration for one AI gateway deployment.
#[derive(Debug, Clone)]
pub struct Provider {
    pub name: String,
    pub base_url: String,
    pub headers: HeaderMap,
    pub retry: RetryConfig,
    pub reconnect: ReconnectConfig,
    pub stream_idle_timeout: Duration,
}

impl Provider {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            headers: HeaderMap::new(),
            retry: RetryConfig::default(),
            reconnect: ReconnectConfig::default(),
            stream_idle_timeout: Duration::from_secs(300),
        }
    }

    pub fn url_for_path(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            base.to_string()
        } else {
            format!("{base}/{path}")
        }
    }

    pub fn build_request(&self, method: Method, path: &str) -> Request {
        let mut req = Request::new(method, self.url_for_path(path));
        req.headers = self.headers.clone();
        req
    }
}
