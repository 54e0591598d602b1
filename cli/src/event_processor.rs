use datapillar_api::SseEvent;
use datapillar_chat::AbortOutcome;
use datapillar_chat::ActivityRow;

/// Where the session stands after an event has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunStatus {
    Running,
    WaitingForInput,
    Finished,
}

pub(crate) trait EventProcessor {
    fn print_session_started(&mut self, session_id: &str, base_url: &str, restored: bool);

    /// `options` are the choices of a pending interrupt, empty otherwise.
    fn process_event(&mut self, event: &SseEvent, status: RunStatus, options: &[String]);

    /// Called once the run pauses or ends, with its most recent agent step.
    fn print_latest_step(&mut self, _step: &ActivityRow) {}

    fn print_abort(&mut self, outcome: &AbortOutcome);

    fn print_error(&mut self, message: &str);
}
