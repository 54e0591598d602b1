use crate::activity::ActivityRow;
use chrono::DateTime;
use chrono::Utc;
use datapillar_api::InterruptPayload;
use datapillar_api::StreamStatus;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A pending question attached to the assistant message that raised it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterruptState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupt_id: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
}

impl From<InterruptPayload> for InterruptState {
    fn from(payload: InterruptPayload) -> Self {
        Self {
            interrupt_id: payload.interrupt_id,
            options: payload.options,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    /// Assistant content is replaced, never appended, by each event summary.
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub process_rows: Vec<ActivityRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_status: Option<StreamStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupt: Option<InterruptState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Vec<String>>,
}

impl ChatMessage {
    fn new(role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            timestamp: Utc::now(),
            process_rows: Vec::new(),
            stream_status: None,
            interrupt: None,
            recommendations: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into())
    }

    /// Empty assistant message that the next run streams into.
    pub fn assistant_placeholder() -> Self {
        Self {
            stream_status: Some(StreamStatus::Running),
            ..Self::new(Role::Assistant, String::new())
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.stream_status == Some(StreamStatus::Running)
    }
}

/// Partial update for a [`ChatMessage`]. `None` leaves a field untouched;
/// the nested options of clearable fields set or clear the value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagePatch {
    pub content: Option<String>,
    pub process_rows: Option<Vec<ActivityRow>>,
    pub stream_status: Option<Option<StreamStatus>>,
    pub interrupt: Option<Option<InterruptState>>,
    pub recommendations: Option<Option<Vec<String>>>,
}

impl MessagePatch {
    pub fn apply(self, message: &ChatMessage) -> ChatMessage {
        let mut next = message.clone();
        if let Some(content) = self.content {
            next.content = content;
        }
        if let Some(rows) = self.process_rows {
            next.process_rows = rows;
        }
        if let Some(status) = self.stream_status {
            next.stream_status = status;
        }
        if let Some(interrupt) = self.interrupt {
            next.interrupt = interrupt;
        }
        if let Some(recommendations) = self.recommendations {
            next.recommendations = recommendations;
        }
        next
    }
}
