//! The session controller: owns the message store and the single active
//! event stream, and moves a run between generating, waiting for an answer
//! to an interrupt, and idle.

use crate::activity::ActivityRow;
use crate::activity::latest_activity;
use crate::activity::upsert_agent_activity;
use crate::cache::CacheSnapshot;
use crate::cache::SnapshotStore;
use crate::error::ChatError;
use crate::error::Result;
use crate::message::ChatMessage;
use crate::message::InterruptState;
use crate::message::MessagePatch;
use crate::message::Role;
use crate::store::ChatStore;
use datapillar_api::AbortRequest;
use datapillar_api::AuthProvider;
use datapillar_api::ChatRequest;
use datapillar_api::SseEvent;
use datapillar_api::StreamHandle;
use datapillar_api::StreamStatus;
use datapillar_api::WorkflowClient;
use datapillar_api::WorkflowStream;
use datapillar_async_utils::apply_optimistic;
use datapillar_client::HttpTransport;
use futures::StreamExt;
use serde_json::Value;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum Phase {
    Idle,
    /// A run is streaming into `message_id`.
    Running {
        message_id: String,
        handle: StreamHandle,
    },
    /// The run behind `message_id` is paused on an interrupt. No transport is
    /// open in this phase.
    WaitingForResume {
        message_id: String,
        interrupt_id: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// A fresh prompt started a run streaming into a new assistant message.
    Started { message_id: String },
    /// The text answered a pending interrupt; the paused run continues.
    Resumed { message_id: String },
    /// Nothing was sent: a run is already generating, or the text was blank.
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortOutcome {
    Aborted { message_id: String, message: String },
    /// Neither generating nor waiting; no request was made.
    Idle,
}

pub struct ChatSession<T: HttpTransport, A: AuthProvider> {
    client: WorkflowClient<T, A>,
    store: ChatStore,
    session_id: String,
    phase: Phase,
    stream: Option<WorkflowStream>,
    max_activity_rows: usize,
}

impl<T, A> ChatSession<T, A>
where
    T: HttpTransport + 'static,
    A: AuthProvider + 'static,
{
    pub fn new(client: WorkflowClient<T, A>, max_activity_rows: usize) -> Self {
        Self::with_session_id(client, Uuid::new_v4().to_string(), max_activity_rows)
    }

    pub fn with_session_id(
        client: WorkflowClient<T, A>,
        session_id: impl Into<String>,
        max_activity_rows: usize,
    ) -> Self {
        Self {
            client,
            store: ChatStore::new(),
            session_id: session_id.into(),
            phase: Phase::Idle,
            stream: None,
            max_activity_rows,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    /// For view-owned state such as the model selection and scroll position.
    pub fn store_mut(&mut self) -> &mut ChatStore {
        &mut self.store
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn is_generating(&self) -> bool {
        matches!(self.phase, Phase::Running { .. })
    }

    pub fn is_waiting(&self) -> bool {
        matches!(self.phase, Phase::WaitingForResume { .. })
    }

    /// Message the current run streams into, if a run is generating.
    pub fn active_message_id(&self) -> Option<&str> {
        match &self.phase {
            Phase::Running { message_id, .. } => Some(message_id),
            _ => None,
        }
    }

    /// Options offered by the pending interrupt, if any.
    pub fn pending_options(&self) -> &[String] {
        let Phase::WaitingForResume { message_id, .. } = &self.phase else {
            return &[];
        };
        self.store
            .message(message_id)
            .and_then(|message| message.interrupt.as_ref())
            .map(|interrupt| interrupt.options.as_slice())
            .unwrap_or_default()
    }

    /// Most recent agent step of the latest assistant message.
    pub fn latest_step(&self) -> Option<&ActivityRow> {
        self.store
            .messages()
            .iter()
            .rev()
            .find(|message| message.role == Role::Assistant)
            .and_then(|message| latest_activity(&message.process_rows))
    }

    /// Sends user text: a fresh prompt when idle, the resume value when a run
    /// is waiting on an interrupt, and nothing while a run is generating.
    pub async fn send(&mut self, text: &str) -> SendOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SendOutcome::Ignored;
        }
        match &self.phase {
            Phase::Running { message_id, .. } => {
                debug!(message_id = %message_id, "ignoring input while generating");
                SendOutcome::Ignored
            }
            Phase::WaitingForResume { message_id, .. } => {
                let message_id = message_id.clone();
                self.resume(message_id, text).await
            }
            Phase::Idle => self.start(text).await,
        }
    }

    async fn start(&mut self, text: &str) -> SendOutcome {
        let assistant = ChatMessage::assistant_placeholder();
        let message_id = assistant.id.clone();
        self.store.add_message(ChatMessage::user(text));
        self.store.add_message(assistant);
        self.store.set_last_prompt(text);
        self.store.mark_initialized();

        let request = ChatRequest::prompt(
            self.session_id.clone(),
            text,
            self.store.effective_model_id().map(str::to_string),
        );
        info!(session_id = %self.session_id, message_id = %message_id, "starting workflow run");
        self.open(message_id.clone(), &request).await;
        SendOutcome::Started { message_id }
    }

    async fn resume(&mut self, message_id: String, text: &str) -> SendOutcome {
        self.store.add_message(ChatMessage::user(text));
        self.store.patch_message(
            &message_id,
            MessagePatch {
                stream_status: Some(Some(StreamStatus::Running)),
                interrupt: Some(None),
                ..Default::default()
            },
        );

        let request = ChatRequest::resume(
            self.session_id.clone(),
            Value::String(text.to_string()),
            self.store.effective_model_id().map(str::to_string),
        );
        info!(session_id = %self.session_id, message_id = %message_id, "resuming workflow run");
        self.open(message_id.clone(), &request).await;
        SendOutcome::Resumed { message_id }
    }

    async fn open(&mut self, message_id: String, request: &ChatRequest) {
        let stream = self.client.create_workflow_stream(request).await;
        self.phase = Phase::Running {
            message_id,
            handle: stream.handle(),
        };
        self.stream = Some(stream);
    }

    /// Answers the pending interrupt with the option at `index`.
    pub async fn select_option(&mut self, index: usize) -> Result<SendOutcome> {
        let option = self
            .pending_options()
            .get(index)
            .cloned()
            .ok_or(ChatError::NoSuchOption(index))?;
        Ok(self.send(&option).await)
    }

    /// Waits for the next event of the active run and applies it. Returns
    /// `None` once no run is streaming.
    pub async fn next_event(&mut self) -> Option<SseEvent> {
        let stream = self.stream.as_mut()?;
        match stream.next().await {
            Some(event) => {
                self.apply_event(&event);
                Some(event)
            }
            None => {
                let aborting = stream.handle().is_closed();
                self.stream = None;
                if aborting {
                    // Closed by an abort whose request failed. The run stays
                    // `Running` so the abort can be retried.
                    debug!("event stream closed by abort");
                    return None;
                }
                if let Phase::Running { message_id, .. } = &self.phase {
                    warn!(message_id = %message_id, "event stream ended without a terminal event");
                    self.store.patch_message(
                        message_id,
                        MessagePatch {
                            stream_status: Some(Some(StreamStatus::Error)),
                            ..Default::default()
                        },
                    );
                    self.phase = Phase::Idle;
                }
                None
            }
        }
    }

    /// Reconciles one event into the active assistant message.
    pub fn apply_event(&mut self, event: &SseEvent) {
        let Some(message_id) = self.active_message_id().map(str::to_string) else {
            trace!(run_id = %event.run_id, "dropping event without an active message");
            return;
        };

        if let Some(workflow) = &event.workflow {
            self.store.set_workflow(workflow.clone());
        }

        if let Some(activity) = &event.activity {
            let row = ActivityRow::from_event(activity, event.ts);
            let max_rows = self.max_activity_rows;
            self.store.update_message(&message_id, |message| {
                let mut next = message.clone();
                next.process_rows =
                    upsert_agent_activity(std::mem::take(&mut next.process_rows), row, max_rows);
                if let Some(summary) = &activity.summary {
                    next.content = summary.clone();
                }
                if let Some(recommendations) = &activity.recommendations {
                    next.recommendations = Some(recommendations.clone());
                }
                next
            });

            if activity.is_interrupt() {
                let interrupt = InterruptState::from(activity.interrupt.clone().unwrap_or_default());
                let interrupt_id = interrupt.interrupt_id.clone();
                self.store.patch_message(
                    &message_id,
                    MessagePatch {
                        stream_status: Some(None),
                        interrupt: Some(Some(interrupt)),
                        ..Default::default()
                    },
                );
                self.close_stream();
                debug!(message_id = %message_id, ?interrupt_id, "run waiting for user input");
                self.phase = Phase::WaitingForResume {
                    message_id,
                    interrupt_id,
                };
                return;
            }
        }

        if event.status.is_terminal() {
            self.store.patch_message(
                &message_id,
                MessagePatch {
                    stream_status: Some(Some(event.status)),
                    ..Default::default()
                },
            );
            self.close_stream();
            debug!(message_id = %message_id, status = ?event.status, "run finished");
            self.phase = Phase::Idle;
        } else {
            self.store.patch_message(
                &message_id,
                MessagePatch {
                    stream_status: Some(Some(StreamStatus::Running)),
                    ..Default::default()
                },
            );
        }
    }

    /// Stops the current run. While waiting on an interrupt with a known id
    /// the backend is told which interrupt to drop; while generating the
    /// transport is closed first and the run is aborted as a whole.
    ///
    /// On failure the error is logged and returned, and the conversation is
    /// left as it was so the user can retry. A run that was generating stays
    /// `Running` with its transport closed until an abort succeeds.
    pub async fn abort(&mut self) -> Result<AbortOutcome> {
        let (message_id, interrupt_id) = match &self.phase {
            Phase::Idle => return Ok(AbortOutcome::Idle),
            Phase::Running { message_id, handle } => {
                handle.cancel();
                (message_id.clone(), None)
            }
            Phase::WaitingForResume {
                message_id,
                interrupt_id,
            } => (message_id.clone(), interrupt_id.clone()),
        };

        let request = AbortRequest {
            session_id: self.session_id.clone(),
            interrupt_id,
        };
        let client = self.client.clone();
        let result = apply_optimistic(
            &mut self.store,
            |store| {
                store.patch_message(
                    &message_id,
                    MessagePatch {
                        stream_status: Some(Some(StreamStatus::Aborted)),
                        interrupt: Some(None),
                        ..Default::default()
                    },
                );
            },
            client.abort(&request),
        )
        .await;

        match result {
            Ok(response) => {
                self.store.patch_message(
                    &message_id,
                    MessagePatch {
                        content: Some(response.message.clone()),
                        ..Default::default()
                    },
                );
                self.close_stream();
                self.phase = Phase::Idle;
                info!(
                    session_id = %self.session_id,
                    message_id = %message_id,
                    interrupt = request.interrupt_id.is_some(),
                    "workflow run aborted"
                );
                Ok(AbortOutcome::Aborted {
                    message_id,
                    message: response.message,
                })
            }
            Err(err) => {
                warn!(
                    session_id = %self.session_id,
                    message_id = %message_id,
                    error = %err,
                    "abort request failed"
                );
                Err(err.into())
            }
        }
    }

    /// Drops the conversation and starts over under a new session id. The
    /// model selection is kept.
    pub fn new_session(&mut self) {
        self.close_stream();
        self.store.reset();
        self.session_id = Uuid::new_v4().to_string();
        self.phase = Phase::Idle;
        info!(session_id = %self.session_id, "new chat session");
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        self.store.snapshot()
    }

    /// Loads `snapshot` into an empty store and rebuilds the phase from it.
    /// A conversation saved while waiting on an interrupt is waiting again.
    /// Messages saved mid-stream are marked failed, since no transport
    /// survives a restore.
    pub fn hydrate_from_cache(&mut self, snapshot: CacheSnapshot) -> bool {
        if !self.store.hydrate_from_cache(snapshot) {
            return false;
        }

        let stale: Vec<String> = self
            .store
            .messages()
            .iter()
            .filter(|message| message.is_streaming())
            .map(|message| message.id.clone())
            .collect();
        for message_id in &stale {
            debug!(message_id = %message_id, "restored message was still streaming");
            self.store.patch_message(
                message_id,
                MessagePatch {
                    stream_status: Some(Some(StreamStatus::Error)),
                    ..Default::default()
                },
            );
        }

        let waiting = self
            .store
            .messages()
            .iter()
            .rev()
            .find(|message| message.role == Role::Assistant)
            .and_then(|message| {
                let interrupt = message.interrupt.as_ref()?;
                Some((message.id.clone(), interrupt.interrupt_id.clone()))
            });
        if let Some((message_id, interrupt_id)) = waiting {
            info!(
                session_id = %self.session_id,
                message_id = %message_id,
                ?interrupt_id,
                "restored run waiting for user input"
            );
            self.phase = Phase::WaitingForResume {
                message_id,
                interrupt_id,
            };
        }
        true
    }

    /// Saves the conversation under the session id.
    pub async fn persist<S>(&self, cache: &S) -> Result<()>
    where
        S: SnapshotStore + ?Sized,
    {
        cache.save(&self.session_id, &self.snapshot()).await
    }

    /// Loads the cached conversation for this session id into an empty store.
    pub async fn restore<S>(&mut self, cache: &S) -> Result<bool>
    where
        S: SnapshotStore + ?Sized,
    {
        match cache.load(&self.session_id).await? {
            Some(snapshot) => Ok(self.hydrate_from_cache(snapshot)),
            None => Ok(false),
        }
    }

    fn close_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.handle().cancel();
        }
    }
}
