use crate::common::SseEvent;
use crate::error::ApiError;
use crate::provider::ReconnectConfig;
use datapillar_client::StreamResponse;
use datapillar_client::TransportError;
use eventsource_stream::Eventsource;
use futures::Stream;
use futures::StreamExt;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio::time::timeout;
use tracing::debug;
use tracing::trace;
use tracing::warn;

/// Position in the event stream carried across reconnects.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResumeState {
    /// Last `id:` seen; sent back as `Last-Event-ID` so the gateway replays
    /// only what this client missed.
    pub last_event_id: Option<String>,
    /// Server-requested reconnect delay from the last `retry:` field.
    pub retry: Option<Duration>,
}

/// Why a single connection stopped being read.
#[derive(Debug, PartialEq, Eq)]
pub enum ConnectionEnd {
    /// A terminal event or a decode failure was delivered, or the consumer
    /// went away. The stream is over.
    Finished,
    /// The connection dropped before a terminal event and may be reopened.
    Disconnected { reason: String, frames: usize },
}

/// Reads one SSE connection, forwarding decoded events until a terminal
/// status, a malformed frame, or a disconnect.
pub async fn process_workflow_sse<S>(
    stream: S,
    tx_event: &mpsc::Sender<SseEvent>,
    idle_timeout: Duration,
    resume: &mut ResumeState,
) -> ConnectionEnd
where
    S: Stream<Item = Result<bytes::Bytes, TransportError>> + Unpin,
{
    let mut stream = stream.eventsource();
    let mut frames = 0usize;

    loop {
        let sse = match timeout(idle_timeout, stream.next()).await {
            Ok(Some(Ok(sse))) => sse,
            Ok(Some(Err(e))) => {
                return ConnectionEnd::Disconnected {
                    reason: e.to_string(),
                    frames,
                };
            }
            Ok(None) => {
                return ConnectionEnd::Disconnected {
                    reason: "stream closed before a terminal event".to_string(),
                    frames,
                };
            }
            Err(_) => {
                return ConnectionEnd::Disconnected {
                    reason: "idle timeout waiting for SSE".to_string(),
                    frames,
                };
            }
        };

        frames += 1;
        if !sse.id.is_empty() {
            resume.last_event_id = Some(sse.id.clone());
        }
        if sse.retry.is_some() {
            resume.retry = sse.retry;
        }

        trace!("SSE event: {}", sse.data);

        if sse.data.trim().is_empty() {
            continue;
        }

        let event: SseEvent = match serde_json::from_str(&sse.data) {
            Ok(event) => event,
            Err(err) => {
                debug!(
                    "Failed to parse workflow SSE event: {err}, data: {}",
                    &sse.data
                );
                let _ = tx_event
                    .send(SseEvent::system_error(format!(
                        "failed to decode stream event: {err}"
                    )))
                    .await;
                return ConnectionEnd::Finished;
            }
        };

        let terminal = event.status.is_terminal();
        if tx_event.send(event).await.is_err() {
            return ConnectionEnd::Finished;
        }
        if terminal {
            return ConnectionEnd::Finished;
        }
    }
}

/// Drives connections until the run finishes, reopening with
/// `Last-Event-ID` after each non-terminal disconnect. Gives up with a
/// synthesized error once `reconnect.max_retries` consecutive connections
/// produced no frames, or when a (re)open fails.
pub(crate) async fn run_workflow_sse<O, Fut>(
    open: O,
    tx_event: mpsc::Sender<SseEvent>,
    idle_timeout: Duration,
    reconnect: ReconnectConfig,
) where
    O: Fn(Option<String>) -> Fut,
    Fut: Future<Output = Result<StreamResponse, ApiError>>,
{
    let mut resume = ResumeState::default();
    let mut failures = 0u64;

    loop {
        let connection = match open(resume.last_event_id.clone()).await {
            Ok(connection) => connection,
            Err(err) => {
                warn!(error = %err, "failed to open workflow event stream");
                let _ = tx_event
                    .send(SseEvent::system_error(err.user_message()))
                    .await;
                return;
            }
        };

        match process_workflow_sse(connection.bytes, &tx_event, idle_timeout, &mut resume).await {
            ConnectionEnd::Finished => return,
            ConnectionEnd::Disconnected { reason, frames } => {
                if frames > 0 {
                    failures = 0;
                }
                failures += 1;
                if failures > reconnect.max_retries {
                    warn!(%reason, failures, "workflow event stream closed");
                    let _ = tx_event
                        .send(SseEvent::system_error(format!(
                            "event stream closed: {reason}"
                        )))
                        .await;
                    return;
                }
                let delay = resume.retry.unwrap_or(reconnect.delay);
                warn!(
                    %reason,
                    attempt = failures,
                    last_event_id = ?resume.last_event_id,
                    ?delay,
                    "workflow event stream dropped; reconnecting"
                );
                sleep(delay).await;
            }
        }
    }
}
