use datapillar_client::Request;
use http::HeaderMap;
use http::HeaderValue;

pub const TENANT_HEADER: &str = "x-tenant-id";

/// Provides bearer and tenant identity information for API requests.
///
/// Implementations should be cheap and non-blocking; token refresh belongs
/// to the login flow, before requests reach this interface.
pub trait AuthProvider: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
    fn tenant_id(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, Default)]
pub struct NoAuth;

impl AuthProvider for NoAuth {
    fn bearer_token(&self) -> Option<String> {
        None
    }
}

/// Static credentials, typically read from the environment at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticAuth {
    pub token: Option<String>,
    pub tenant_id: Option<String>,
}

impl AuthProvider for StaticAuth {
    fn bearer_token(&self) -> Option<String> {
        self.token.clone()
    }

    fn tenant_id(&self) -> Option<String> {
        self.tenant_id.clone()
    }
}

pub(crate) fn add_auth_headers_to_header_map<A: AuthProvider>(auth: &A, headers: &mut HeaderMap) {
    if let Some(token) = auth.bearer_token()
        && let Ok(header) = HeaderValue::from_str(&format!("Bearer {token}"))
    {
        let _ = headers.insert(http::header::AUTHORIZATION, header);
    }
    if let Some(tenant_id) = auth.tenant_id()
        && let Ok(header) = HeaderValue::from_str(&tenant_id)
    {
        let _ = headers.insert(TENANT_HEADER, header);
    }
}

pub(crate) fn add_auth_headers<A: AuthProvider>(auth: &A, mut req: Request) -> Request {
    add_auth_headers_to_header_map(auth, &mut req.headers);
    req
}
