use datapillar_api::SseEvent;
use datapillar_chat::AbortOutcome;
use serde::Deserialize;
use serde::Serialize;
use tracing::error;

use crate::event_processor::EventProcessor;
use crate::event_processor::RunStatus;

/// Top-level JSONL events emitted by `datapillar-chat --json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CliEvent {
    #[serde(rename = "session.started")]
    SessionStarted { session_id: String, restored: bool },
    /// A gateway event, after it has been applied to the conversation.
    #[serde(rename = "run.event")]
    RunEvent { event: SseEvent },
    /// The run paused on an interrupt and waits for an answer.
    #[serde(rename = "run.waiting")]
    RunWaiting { options: Vec<String> },
    #[serde(rename = "run.aborted")]
    RunAborted { message: Option<String> },
    #[serde(rename = "error")]
    Error { message: String },
}

pub(crate) struct EventProcessorWithJsonOutput;

impl EventProcessorWithJsonOutput {
    #[allow(clippy::print_stdout)]
    fn emit(&self, event: &CliEvent) {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(err) => error!("failed to serialize event: {err}"),
        }
    }
}

impl EventProcessor for EventProcessorWithJsonOutput {
    fn print_session_started(&mut self, session_id: &str, _base_url: &str, restored: bool) {
        self.emit(&CliEvent::SessionStarted {
            session_id: session_id.to_string(),
            restored,
        });
    }

    fn process_event(&mut self, event: &SseEvent, status: RunStatus, options: &[String]) {
        self.emit(&CliEvent::RunEvent {
            event: event.clone(),
        });
        if status == RunStatus::WaitingForInput {
            self.emit(&CliEvent::RunWaiting {
                options: options.to_vec(),
            });
        }
    }

    fn print_abort(&mut self, outcome: &AbortOutcome) {
        let message = match outcome {
            AbortOutcome::Aborted { message, .. } => Some(message.clone()),
            AbortOutcome::Idle => None,
        };
        self.emit(&CliEvent::RunAborted { message });
    }

    fn print_error(&mut self, message: &str) {
        self.emit(&CliEvent::Error {
            message: message.to_string(),
        });
    }
}
