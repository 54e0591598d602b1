use crate::auth::AuthProvider;
use crate::common::AbortRequest;
use crate::common::AbortResponse;
use crate::common::ChatRequest;
use crate::common::SseEvent;
use crate::common::StreamHandle;
use crate::common::WorkflowStream;
use crate::endpoint::session::Delivery;
use crate::endpoint::session::EndpointSession;
use crate::error::ApiError;
use crate::provider::Provider;
use crate::sse::workflow::run_workflow_sse;
use datapillar_async_utils::OrCancelExt;
use datapillar_async_utils::RequestCoalescer;
use datapillar_client::HttpTransport;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

const CHAT_PATH: &str = "workflow/chat";
const SSE_PATH: &str = "workflow/sse";
const ABORT_PATH: &str = "workflow/abort";
const EVENT_CHANNEL_CAPACITY: usize = 1600;

/// Aborts in flight, keyed by session and interrupt.
type AbortKey = (String, Option<String>);

/// Client for the AI workflow builder endpoints.
///
/// A generation is started with `POST workflow/chat`; its progress is read
/// from the per-session event stream `GET workflow/sse`. The two are tied
/// together by the session id only.
pub struct WorkflowClient<T: HttpTransport, A: AuthProvider> {
    session: Arc<EndpointSession<T, A>>,
    aborts: RequestCoalescer<AbortKey, AbortResponse, ApiError>,
}

impl<T: HttpTransport, A: AuthProvider> Clone for WorkflowClient<T, A> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
            aborts: self.aborts.clone(),
        }
    }
}

impl<T, A> WorkflowClient<T, A>
where
    T: HttpTransport + 'static,
    A: AuthProvider + 'static,
{
    pub fn new(transport: T, provider: Provider, auth: A) -> Self {
        Self {
            session: Arc::new(EndpointSession::new(transport, provider, auth)),
            aborts: RequestCoalescer::new(),
        }
    }

    pub fn provider(&self) -> &Provider {
        self.session.provider()
    }

    /// Asks the gateway to start or resume generation. Success only means
    /// the request was accepted; results arrive on the event stream.
    ///
    /// Each accepted request starts a run, so this is never retried after
    /// a lost response or a server error.
    pub async fn start_chat(&self, request: &ChatRequest) -> Result<(), ApiError> {
        self.session
            .post_json(CHAT_PATH, request, Delivery::AtMostOnce)
            .await?;
        Ok(())
    }

    /// Stops the session's run. Concurrent aborts of the same run share one
    /// request and its outcome.
    pub async fn abort(&self, request: &AbortRequest) -> Result<AbortResponse, ApiError> {
        let key = (request.session_id.clone(), request.interrupt_id.clone());
        let session = Arc::clone(&self.session);
        let request = request.clone();
        self.aborts
            .run(key, move || async move {
                let resp = session
                    .post_json(ABORT_PATH, &request, Delivery::Idempotent)
                    .await?;
                serde_json::from_slice::<AbortResponse>(&resp.body).map_err(|e| {
                    ApiError::InvalidResponse(format!(
                        "failed to decode abort response: {e}; body: {}",
                        String::from_utf8_lossy(&resp.body)
                    ))
                })
            })
            .await
    }

    /// Opens the event stream for `session_id`. The returned stream owns a
    /// background task that reconnects on non-terminal disconnects.
    pub fn subscribe(&self, session_id: &str) -> WorkflowStream {
        let (tx_event, rx_event) = mpsc::channel::<SseEvent>(EVENT_CHANNEL_CAPACITY);
        let token = CancellationToken::new();
        let handle = StreamHandle::new(token.clone());

        let session = Arc::clone(&self.session);
        let provider = session.provider().clone();
        let session_id = session_id.to_string();
        let open = move |last_event_id: Option<String>| {
            let session = Arc::clone(&session);
            let session_id = session_id.clone();
            async move {
                session
                    .open_event_stream(
                        SSE_PATH,
                        &[("sessionId", session_id.as_str())],
                        last_event_id.as_deref(),
                    )
                    .await
            }
        };

        tokio::spawn(async move {
            let run = run_workflow_sse(
                open,
                tx_event,
                provider.stream_idle_timeout,
                provider.reconnect,
            );
            if run.or_cancel(&token).await.is_err() {
                debug!("workflow event stream cancelled");
            }
        });

        WorkflowStream { rx_event, handle }
    }

    /// Starts (or resumes) a run and returns its event stream. Never fails:
    /// a rejected start request becomes a single synthesized error event.
    pub async fn create_workflow_stream(&self, request: &ChatRequest) -> WorkflowStream {
        match self.start_chat(request).await {
            Ok(()) => self.subscribe(&request.session_id),
            Err(err) => {
                warn!(
                    session_id = %request.session_id,
                    resume = request.is_resume(),
                    error = %err,
                    "workflow chat request failed"
                );
                WorkflowStream::from_events(vec![SseEvent::system_error(err.user_message())])
            }
        }
    }
}
