use crate::auth::AuthProvider;
use crate::auth::add_auth_headers;
use crate::error::ApiError;
use crate::provider::Provider;
use datapillar_client::HttpTransport;
use datapillar_client::Request;
use datapillar_client::Response;
use datapillar_client::RetryPolicy;
use datapillar_client::StreamResponse;
use datapillar_client::run_with_retry;
use http::HeaderValue;
use http::Method;
use serde::Serialize;

const LAST_EVENT_ID: &str = "last-event-id";

/// Whether the gateway tolerates a request being delivered more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// Repeating the request has no further effect (aborts, stream opens).
    Idempotent,
    /// Every accepted request has a side effect, such as spawning a run.
    /// Only retried when the gateway explicitly turned it away (429).
    AtMostOnce,
}

/// Transport, provider and auth bundled together. Every call goes through
/// here so auth headers and the retry policy are applied uniformly.
pub(crate) struct EndpointSession<T: HttpTransport, A: AuthProvider> {
    transport: T,
    provider: Provider,
    auth: A,
}

impl<T: HttpTransport, A: AuthProvider> EndpointSession<T, A> {
    pub(crate) fn new(transport: T, provider: Provider, auth: A) -> Self {
        Self {
            transport,
            provider,
            auth,
        }
    }

    pub(crate) fn provider(&self) -> &Provider {
        &self.provider
    }

    fn retry_policy(&self, delivery: Delivery) -> RetryPolicy {
        let mut policy = self.provider.retry.to_policy();
        if delivery == Delivery::AtMostOnce {
            // A lost response or a 5xx does not prove the gateway dropped
            // the request.
            policy.retry_on.retry_5xx = false;
            policy.retry_on.retry_transport = false;
        }
        policy
    }

    /// POSTs `body` as JSON to `path`.
    pub(crate) async fn post_json<B>(
        &self,
        path: &str,
        body: &B,
        delivery: Delivery,
    ) -> Result<Response, ApiError>
    where
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_value(body)
            .map_err(|err| ApiError::InvalidResponse(format!("failed to encode {path}: {err}")))?;
        let make_request = || {
            let mut req = self.provider.build_request(Method::POST, path);
            req.body = Some(body.clone());
            add_auth_headers(&self.auth, req)
        };

        let response = run_with_retry(self.retry_policy(delivery), make_request, |req| {
            self.transport.execute(req)
        })
        .await?;

        Ok(response)
    }

    /// Opens the event stream at `path` with `query` appended. A known
    /// `last_event_id` asks the gateway to replay only what was missed.
    pub(crate) async fn open_event_stream(
        &self,
        path: &str,
        query: &[(&str, &str)],
        last_event_id: Option<&str>,
    ) -> Result<StreamResponse, ApiError> {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(query)
            .finish();
        let make_request = || {
            let mut req: Request = self.provider.build_request(Method::GET, path);
            if !query.is_empty() {
                let separator = if req.url.contains('?') { '&' } else { '?' };
                req.url = format!("{}{separator}{query}", req.url);
            }
            req.headers.insert(
                http::header::ACCEPT,
                HeaderValue::from_static("text/event-stream"),
            );
            if let Some(id) = last_event_id
                && let Ok(value) = HeaderValue::from_str(id)
            {
                req.headers.insert(LAST_EVENT_ID, value);
            }
            add_auth_headers(&self.auth, req)
        };

        let stream = run_with_retry(
            self.retry_policy(Delivery::Idempotent),
            make_request,
            |req| self.transport.stream(req),
        )
        .await?;

        Ok(stream)
    }
}
