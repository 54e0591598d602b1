use futures::Stream;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use std::pin::Pin;
use std::task::Context;
use std::task::Poll;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// `activity.event` value that pauses a run until the user answers.
pub const INTERRUPT_EVENT: &str = "interrupt";

pub const SYSTEM_AGENT: &str = "system";
pub const SYSTEM_ERROR_EVENT: &str = "error";
pub const SYSTEM_ERROR_EVENT_NAME: &str = "system_error";

/// Run-level status carried by every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    Running,
    Done,
    Error,
    Aborted,
}

impl StreamStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StreamStatus::Done | StreamStatus::Error | StreamStatus::Aborted
        )
    }
}

/// Status of a single agent step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Running,
    Waiting,
    Done,
    Error,
    Aborted,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupt_id: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
}

/// One agent/tool step delta as sent by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_cn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_en: Option<String>,
    pub event: String,
    pub event_name: String,
    pub status: ActivityStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupt: Option<InterruptPayload>,
}

impl ActivityEvent {
    pub fn is_interrupt(&self) -> bool {
        self.event == INTERRUPT_EVENT
    }
}

/// Full workflow graph snapshot. Nodes and edges are rendered by the
/// canvas and are opaque here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowGraph {
    #[serde(default)]
    pub nodes: Vec<Value>,
    #[serde(default)]
    pub edges: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SseEvent {
    #[serde(default)]
    pub ts: i64,
    #[serde(default)]
    pub run_id: String,
    pub status: StreamStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<ActivityEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<WorkflowGraph>,
}

impl SseEvent {
    /// Locally synthesized event used to surface transport and decode
    /// failures as an ordinary error event.
    pub fn system_error(message: impl Into<String>) -> Self {
        Self {
            ts: chrono::Utc::now().timestamp_millis(),
            run_id: String::new(),
            status: StreamStatus::Error,
            activity: Some(ActivityEvent {
                agent_cn: None,
                agent_en: Some(SYSTEM_AGENT.to_string()),
                event: SYSTEM_ERROR_EVENT.to_string(),
                event_name: SYSTEM_ERROR_EVENT_NAME.to_string(),
                status: ActivityStatus::Error,
                summary: Some(message.into()),
                recommendations: None,
                interrupt: None,
            }),
            workflow: None,
        }
    }

    pub fn is_system_error(&self) -> bool {
        self.run_id.is_empty()
            && self
                .activity
                .as_ref()
                .is_some_and(|a| a.event_name == SYSTEM_ERROR_EVENT_NAME)
    }
}

/// Body of `POST workflow/chat`. Exactly one of `user_input` and
/// `resume_value` is meaningful: a fresh prompt or the answer to an
/// interrupt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub user_input: Option<String>,
    pub session_id: String,
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_value: Option<Value>,
}

impl ChatRequest {
    pub fn prompt(
        session_id: impl Into<String>,
        user_input: impl Into<String>,
        model: Option<String>,
    ) -> Self {
        Self {
            user_input: Some(user_input.into()),
            session_id: session_id.into(),
            model,
            resume_value: None,
        }
    }

    pub fn resume(session_id: impl Into<String>, resume_value: Value, model: Option<String>) -> Self {
        Self {
            user_input: None,
            session_id: session_id.into(),
            model,
            resume_value: Some(resume_value),
        }
    }

    pub fn is_resume(&self) -> bool {
        self.resume_value.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbortRequest {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupt_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortResponse {
    #[serde(default)]
    pub message: String,
}

/// Cancellation side of a [`WorkflowStream`]. Cheap to clone; `cancel` is
/// idempotent.
#[derive(Debug, Clone, Default)]
pub struct StreamHandle {
    token: CancellationToken,
}

impl StreamHandle {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Decoded events for one session. Ends after a terminal event, after a
/// synthesized error, or as soon as its handle is cancelled.
pub struct WorkflowStream {
    pub(crate) rx_event: mpsc::Receiver<SseEvent>,
    pub(crate) handle: StreamHandle,
}

impl WorkflowStream {
    /// A stream that yields `events` and then ends, with no producer task.
    pub fn from_events(events: Vec<SseEvent>) -> Self {
        let (tx, rx_event) = mpsc::channel(events.len().max(1));
        for event in events {
            let _ = tx.try_send(event);
        }
        Self {
            rx_event,
            handle: StreamHandle::default(),
        }
    }

    pub fn handle(&self) -> StreamHandle {
        self.handle.clone()
    }
}

impl Stream for WorkflowStream {
    type Item = SseEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.handle.is_closed() {
            return Poll::Ready(None);
        }
        self.rx_event.poll_recv(cx)
    }
}

impl Drop for WorkflowStream {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}
