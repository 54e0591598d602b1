use crate::error::TransportError;
use crate::request::Request;
use crate::request::Response;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use http::HeaderMap;
use http::StatusCode;
use serde_json::Value;
use tracing::Level;
use tracing::debug;
use tracing::enabled;
use tracing::trace;

pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Correlation headers set by the gateway on every response.
const REQUEST_ID_HEADERS: [&str; 2] = ["x-request-id", "x-trace-id"];
const TENANT_HEADER: &str = "x-tenant-id";
const SESSION_ID_FIELD: &str = "sessionId";

pub struct StreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub bytes: ByteStream,
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, req: Request) -> Result<Response, TransportError>;
    async fn stream(&self, req: Request) -> Result<StreamResponse, TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    Unary,
    EventStream,
}

/// What gets logged about one request: the gateway session it belongs to
/// and the tenant it runs as, taken from the body or the query string.
#[derive(Debug, PartialEq, Eq)]
struct RequestLog {
    kind: RequestKind,
    method: http::Method,
    url: String,
    session_id: Option<String>,
    tenant_id: Option<String>,
}

impl RequestLog {
    fn new(req: &Request, kind: RequestKind) -> Self {
        let session_id = req
            .body
            .as_ref()
            .and_then(|body| body.get(SESSION_ID_FIELD))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| session_id_from_query(&req.url));
        let tenant_id = req
            .headers
            .get(TENANT_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        Self {
            kind,
            method: req.method.clone(),
            url: req.url.clone(),
            session_id,
            tenant_id,
        }
    }

    fn completed(&self, status: StatusCode, headers: &HeaderMap) {
        let request_ids: Vec<(&str, &str)> = REQUEST_ID_HEADERS
            .iter()
            .filter_map(|&name| Some((name, headers.get(name)?.to_str().ok()?)))
            .collect();
        let message = match self.kind {
            RequestKind::Unary => "request completed",
            RequestKind::EventStream => "event stream opened",
        };
        debug!(
            method = %self.method,
            url = %self.url,
            session_id = self.session_id.as_deref(),
            tenant_id = self.tenant_id.as_deref(),
            %status,
            ?request_ids,
            "{message}"
        );
    }

    fn failed(&self, error: &TransportError) {
        debug!(
            method = %self.method,
            url = %self.url,
            session_id = self.session_id.as_deref(),
            tenant_id = self.tenant_id.as_deref(),
            kind = ?self.kind,
            %error,
            "request failed"
        );
    }
}

fn session_id_from_query(url: &str) -> Option<String> {
    let url = reqwest::Url::parse(url).ok()?;
    url.query_pairs()
        .find(|(name, _)| name == SESSION_ID_FIELD)
        .map(|(_, value)| value.into_owned())
}

#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build(&self, req: Request) -> reqwest::RequestBuilder {
        let Request {
            method,
            url,
            headers,
            body,
            timeout,
        } = req;

        let mut builder = self.client.request(method, &url).headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        builder
    }

    fn map_error(err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_builder() {
            TransportError::Build(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }

    async fn send(
        &self,
        req: Request,
        kind: RequestKind,
    ) -> Result<(RequestLog, reqwest::Response), TransportError> {
        let log = RequestLog::new(&req, kind);
        if enabled!(Level::TRACE) {
            trace!(
                "{} to {}: {}",
                req.method,
                req.url,
                req.body.as_ref().unwrap_or_default()
            );
        }
        match self.build(req).send().await.map_err(Self::map_error) {
            Ok(resp) => {
                log.completed(resp.status(), resp.headers());
                Ok((log, resp))
            }
            Err(err) => {
                log.failed(&err);
                Err(err)
            }
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, req: Request) -> Result<Response, TransportError> {
        let (log, resp) = self.send(req, RequestKind::Unary).await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = resp.bytes().await.map_err(Self::map_error)?;
        if !status.is_success() {
            let body = String::from_utf8(bytes.to_vec()).ok();
            return Err(TransportError::Http {
                status,
                url: Some(log.url),
                headers: Some(headers),
                body,
            });
        }
        Ok(Response {
            status,
            headers,
            body: bytes,
        })
    }

    async fn stream(&self, req: Request) -> Result<StreamResponse, TransportError> {
        let (log, resp) = self.send(req, RequestKind::EventStream).await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        if !status.is_success() {
            let body = resp.text().await.ok();
            return Err(TransportError::Http {
                status,
                url: Some(log.url),
                headers: Some(headers),
                body,
            });
        }
        let stream = resp
            .bytes_stream()
            .map(|result| result.map_err(Self::map_error));
        Ok(StreamResponse {
            status,
            headers,
            bytes: Box::pin(stream),
        })
    }
}
