//! Ambient request context used to enrich audit entries

use axum::{
    body::Body,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use std::future::Future;
use uuid::Uuid;

pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
pub const REAL_IP_HEADER: &str = "x-real-ip";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

tokio::task_local! {
    static REQUEST_CONTEXT: RequestContext;
}

/// Client details of the request currently being served
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: Option<String>,
}

impl RequestContext {
    /// Read client details from request headers.
    ///
    /// The client IP is the first entry of `x-forwarded-for`, falling back
    /// to `x-real-ip`.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };

        let ip_address = header(FORWARDED_FOR_HEADER)
            .and_then(|chain| chain.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .or_else(|| header(REAL_IP_HEADER))
            .map(str::to_string);

        Self {
            ip_address,
            user_agent: header(axum::http::header::USER_AGENT.as_str()).map(str::to_string),
            request_id: header(REQUEST_ID_HEADER).map(str::to_string),
        }
    }

    /// Run `fut` with this context as the ambient request context
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        REQUEST_CONTEXT.scope(self, fut).await
    }

    /// The ambient context, if the caller runs inside a request scope
    pub fn current() -> Option<RequestContext> {
        REQUEST_CONTEXT.try_with(Clone::clone).ok()
    }
}

/// Scope every request in a [`RequestContext`] so audit entries written
/// while serving it carry the client details and one correlation id.
pub async fn request_context_middleware(mut req: Request<Body>, next: Next) -> Response {
    let mut context = RequestContext::from_headers(req.headers());
    if context.request_id.is_none() {
        context.request_id = Some(Uuid::new_v4().to_string());
    }

    req.extensions_mut().insert(context.clone());
    context.scope(next.run(req)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditConfig, AuditLog};
    use crate::models::{AuditLogEntry, AuditLogInput};
    use crate::store::MemoryStore;
    use axum::{Router, http::HeaderValue, routing::get};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn forwarded_for_takes_first_hop() {
        let ctx = RequestContext::from_headers(&headers(&[
            ("x-forwarded-for", "203.0.113.7, 10.0.0.1, 10.0.0.2"),
            ("x-real-ip", "10.0.0.2"),
            ("user-agent", "Mozilla/5.0"),
            ("x-request-id", "req-42"),
        ]));

        assert_eq!(ctx.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(ctx.user_agent.as_deref(), Some("Mozilla/5.0"));
        assert_eq!(ctx.request_id.as_deref(), Some("req-42"));
    }

    #[test]
    fn falls_back_to_real_ip() {
        let ctx = RequestContext::from_headers(&headers(&[("x-real-ip", "198.51.100.4")]));
        assert_eq!(ctx.ip_address.as_deref(), Some("198.51.100.4"));
        assert_eq!(ctx.user_agent, None);
        assert_eq!(ctx.request_id, None);
    }

    #[test]
    fn empty_headers_yield_empty_context() {
        assert_eq!(
            RequestContext::from_headers(&HeaderMap::new()),
            RequestContext::default()
        );
    }

    #[tokio::test]
    async fn current_is_visible_only_inside_scope() {
        assert!(RequestContext::current().is_none());

        let ctx = RequestContext {
            ip_address: Some("127.0.0.1".into()),
            user_agent: None,
            request_id: Some("abc".into()),
        };
        let seen = ctx
            .clone()
            .scope(async { RequestContext::current() })
            .await;

        assert_eq!(seen, Some(ctx));
        assert!(RequestContext::current().is_none());
    }

    /// Serve one request through the middleware and return the audit entry
    /// prepared by the handler
    async fn entry_for(request: Request<Body>) -> AuditLogEntry {
        let audit = AuditLog::new(Arc::new(MemoryStore::new()), AuditConfig::default());
        let app = Router::new()
            .route(
                "/",
                get(move || {
                    let audit = audit.clone();
                    async move {
                        let entry = audit.prepare(AuditLogInput::new("login", "auth"));
                        serde_json::to_string(&entry).unwrap_or_default()
                    }
                }),
            )
            .layer(axum::middleware::from_fn(request_context_middleware));

        let response = app.oneshot(request).await.unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn middleware_stamps_client_details_on_entries() {
        let request = Request::builder()
            .uri("/")
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .header("user-agent", "curl/8")
            .header("x-request-id", "req-7")
            .body(Body::empty())
            .unwrap();

        let entry = entry_for(request).await;
        assert_eq!(entry.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(entry.user_agent.as_deref(), Some("curl/8"));
        assert_eq!(entry.request_id.as_deref(), Some("req-7"));
    }

    #[tokio::test]
    async fn middleware_mints_a_request_id() {
        let request = Request::builder()
            .uri("/")
            .body(Body::empty())
            .unwrap();

        let entry = entry_for(request).await;
        assert_eq!(entry.ip_address, None);
        let request_id = entry.request_id.unwrap();
        assert!(Uuid::parse_str(&request_id).is_ok());
    }
}
