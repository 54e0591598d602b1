//! Scripted transport and fixtures shared by the workflow client and chat
//! session tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use datapillar_api::Provider;
use datapillar_api::ReconnectConfig;
use datapillar_api::RetryConfig;
use datapillar_client::HttpTransport;
use datapillar_client::Request;
use datapillar_client::Response;
use datapillar_client::StreamResponse;
use datapillar_client::TransportError;
use futures::StreamExt;
use http::HeaderMap;
use http::StatusCode;
use serde_json::Value;

/// Reply to a unary (`execute`) call.
#[derive(Debug, Clone)]
pub enum Reply {
    Json(Value),
    /// Answer with `Value` once `Duration` has passed.
    JsonAfter(Duration, Value),
    Status(u16, String),
}

/// Body served for one `stream` call.
#[derive(Debug, Clone)]
pub enum ScriptedStream {
    /// Serve the body, then end the connection.
    Body(String),
    /// Serve the body, then keep the connection open forever.
    Hang(String),
    /// Refuse the connection with an HTTP status.
    Status(u16),
}

#[derive(Debug, Default)]
struct ScriptState {
    executed: Vec<Request>,
    streamed: Vec<Request>,
    replies: VecDeque<Reply>,
    streams: VecDeque<ScriptedStream>,
}

/// In-memory `HttpTransport` that records every request and answers from
/// queued replies. Unscripted unary calls answer `200 {}`; unscripted
/// streams stay open without sending anything.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state
            .lock()
            .unwrap_or_else(|err| panic!("mutex poisoned: {err}"))
    }

    pub fn push_reply(&self, reply: Reply) {
        self.lock().replies.push_back(reply);
    }

    pub fn push_stream(&self, stream: ScriptedStream) {
        self.lock().streams.push_back(stream);
    }

    pub fn executed(&self) -> Vec<Request> {
        self.lock().executed.clone()
    }

    pub fn streamed(&self) -> Vec<Request> {
        self.lock().streamed.clone()
    }

    /// JSON bodies of unary requests whose url ends with `suffix`.
    pub fn bodies_for(&self, suffix: &str) -> Vec<Value> {
        self.lock()
            .executed
            .iter()
            .filter(|req| req.url.ends_with(suffix))
            .map(|req| req.body.clone().unwrap_or(Value::Null))
            .collect()
    }
}

fn http_error(status: u16, body: String) -> TransportError {
    TransportError::Http {
        status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        url: None,
        headers: None,
        body: Some(body),
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, req: Request) -> Result<Response, TransportError> {
        let reply = {
            let mut state = self.lock();
            state.executed.push(req);
            state.replies.pop_front()
        };
        let value = match reply.unwrap_or(Reply::Json(Value::Object(Default::default()))) {
            Reply::Json(value) => value,
            Reply::JsonAfter(delay, value) => {
                tokio::time::sleep(delay).await;
                value
            }
            Reply::Status(status, body) => return Err(http_error(status, body)),
        };
        Ok(Response {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from(value.to_string()),
        })
    }

    async fn stream(&self, req: Request) -> Result<StreamResponse, TransportError> {
        let scripted = {
            let mut state = self.lock();
            state.streamed.push(req);
            state.streams.pop_front()
        };
        let bytes = match scripted.unwrap_or(ScriptedStream::Hang(String::new())) {
            ScriptedStream::Body(body) => {
                futures::stream::iter(vec![Ok::<Bytes, TransportError>(Bytes::from(body))])
                    .boxed()
            }
            ScriptedStream::Hang(body) => {
                futures::stream::iter(vec![Ok::<Bytes, TransportError>(Bytes::from(body))])
                    .chain(futures::stream::pending())
                    .boxed()
            }
            ScriptedStream::Status(status) => {
                return Err(http_error(status, String::new()));
            }
        };
        Ok(StreamResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            bytes,
        })
    }
}

/// Frames `events` as an SSE body with sequential `id:` fields starting at
/// `first_id`.
pub fn sse_body(first_id: u64, events: &[Value]) -> String {
    let mut body = String::new();
    for (offset, event) in events.iter().enumerate() {
        body.push_str(&format!("id: {}\ndata: {event}\n\n", first_id + offset as u64));
    }
    body
}

/// Provider tuned for tests: no request retries, immediate reconnects.
pub fn test_provider() -> Provider {
    Provider {
        name: "test".to_string(),
        base_url: "https://gateway.test/api/ai".to_string(),
        headers: HeaderMap::new(),
        retry: RetryConfig {
            max_attempts: 0,
            base_delay: Duration::from_millis(1),
            retry_429: false,
            retry_5xx: false,
            retry_transport: false,
        },
        reconnect: ReconnectConfig {
            max_retries: 0,
            delay: Duration::from_millis(1),
        },
        stream_idle_timeout: Duration::from_secs(5),
    }
}
