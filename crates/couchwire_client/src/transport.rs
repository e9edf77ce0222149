//! Request resolution and response classification.

use crate::auth::Authenticator;
use crate::error::{ApiError, Error, Result};
use crate::http::{HttpExecutor, HttpRequest, HttpResponse, Request, ResponseBody};
use crate::trace::{CallInfo, CallOutcome, RequestObserver, ScopeGuard};
use couchwire_protocol::ErrorResponse;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Method;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

const JSON: &str = "application/json";

/// Shared state behind every client handle.
pub(crate) struct Transport {
    pub(crate) host: Url,
    pub(crate) executor: Arc<dyn HttpExecutor>,
    pub(crate) authenticator: Option<Arc<dyn Authenticator>>,
    pub(crate) observer: Option<Arc<dyn RequestObserver>>,
    pub(crate) timeout: Duration,
}

impl Transport {
    /// Resolves the absolute URL for a request.
    pub(crate) fn resolve(&self, request: &Request) -> Result<Url> {
        let mut url = self.host.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| Error::request(format!("host {} cannot be a base URL", self.host)))?;
            segments.pop_if_empty().extend(request.segments());
        }
        if !request.query_pairs().is_empty() {
            url.query_pairs_mut().extend_pairs(request.query_pairs());
        }
        Ok(url)
    }

    /// Builds the executor request: URL, headers, timeout, credentials.
    pub(crate) fn prepare(&self, request: Request) -> Result<HttpRequest> {
        let url = self.resolve(&request)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON));
        headers.insert(ACCEPT, HeaderValue::from_static(JSON));

        let timeout = if request.is_streaming() {
            None
        } else {
            Some(self.timeout)
        };

        let mut http = HttpRequest {
            method: request.method().clone(),
            url,
            headers,
            body: None,
            timeout,
        };
        http.body = request.into_body();

        if let Some(authenticator) = &self.authenticator {
            authenticator.decorate(&mut http)?;
        }
        Ok(http)
    }

    /// Sends a request.
    ///
    /// Statuses below 400 are returned as is. For 400 and above the body is
    /// buffered: a `{error, reason}` body becomes [`Error::Api`], anything
    /// else is returned with the buffered body for the caller to classify.
    pub(crate) async fn execute(&self, request: Request) -> Result<HttpResponse> {
        let call = CallInfo::from_request(&request);
        let http = self.prepare(request)?;

        debug!(method = %call.method, path = %call.path, "sending request");
        let guard = ScopeGuard::start(self.observer.as_deref(), &call);
        let result = self.send(http).await;
        match &result {
            Ok(response) => guard.finish(CallOutcome::Status(response.status)),
            Err(err) => guard.finish(CallOutcome::Error(err)),
        }
        result
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = self.executor.execute(request).await?;
        if response.status.as_u16() < 400 {
            return Ok(response);
        }

        let HttpResponse {
            status,
            headers,
            body,
        } = response;
        let body = body.bytes().await?;
        match ErrorResponse::parse(&body) {
            Some(parsed) => Err(Error::Api(ApiError::new(status.as_u16(), parsed, body))),
            None => Ok(HttpResponse {
                status,
                headers,
                body: ResponseBody::from_bytes(body),
            }),
        }
    }
}

/// Fails with [`Error::UnexpectedStatus`] unless the status is accepted.
///
/// A `HEAD` response carries no body, so an error status there becomes an
/// [`ApiError`] named after the status.
pub(crate) async fn ensure_status(
    method: &Method,
    path: &str,
    response: HttpResponse,
    accepted: &[u16],
) -> Result<HttpResponse> {
    let status = response.status.as_u16();
    if accepted.contains(&status) {
        return Ok(response);
    }
    if *method == Method::HEAD && status >= 400 {
        return Err(Error::Api(ApiError::from_status(status)));
    }
    let body = response.body.bytes().await?;
    Err(Error::UnexpectedStatus {
        method: method.to_string(),
        path: path.to_string(),
        status,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthError, BasicAuthenticator};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use reqwest::header::AUTHORIZATION;
    use reqwest::StatusCode;

    /// Answers every request with a canned status and body.
    struct Canned {
        status: StatusCode,
        body: &'static str,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl Canned {
        fn new(status: StatusCode, body: &'static str) -> Arc<Self> {
            Arc::new(Self {
                status,
                body,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl HttpExecutor for Canned {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
            self.seen.lock().push(request);
            Ok(HttpResponse::new(self.status).with_body(ResponseBody::from_bytes(self.body)))
        }
    }

    struct Failing;

    impl Authenticator for Failing {
        fn decorate(&self, _request: &mut HttpRequest) -> std::result::Result<(), AuthError> {
            Err(AuthError::Unavailable("no token".into()))
        }
    }

    fn transport(host: &str, executor: Arc<dyn HttpExecutor>) -> Transport {
        Transport {
            host: Url::parse(host).unwrap(),
            executor,
            authenticator: None,
            observer: None,
            timeout: Duration::from_secs(60),
        }
    }

    #[test]
    fn resolves_encoded_paths() {
        let t = transport("http://127.0.0.1:5984", Canned::new(StatusCode::OK, ""));

        let url = t
            .resolve(&Request::new(Method::GET).segment("playground").document("employee:michael"))
            .unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:5984/playground/employee:michael");

        let url = t
            .resolve(&Request::new(Method::GET).segment("db").document("a/b c"))
            .unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:5984/db/a%2Fb%20c");

        let url = t
            .resolve(&Request::new(Method::GET).segment("db").document("_design/company"))
            .unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:5984/db/_design/company");
    }

    #[test]
    fn resolves_below_a_host_path() {
        let t = transport("http://proxy.local/couch/", Canned::new(StatusCode::OK, ""));
        let url = t
            .resolve(&Request::new(Method::GET).segment("db").query("rev", "1-a"))
            .unwrap();
        assert_eq!(url.as_str(), "http://proxy.local/couch/db?rev=1-a");
    }

    #[test]
    fn prepare_sets_headers_and_timeout() {
        let t = transport("http://127.0.0.1:5984", Canned::new(StatusCode::OK, ""));

        let http = t.prepare(Request::new(Method::GET).segment("db")).unwrap();
        assert_eq!(http.header(CONTENT_TYPE), Some(JSON));
        assert_eq!(http.header(ACCEPT), Some(JSON));
        assert_eq!(http.timeout, Some(Duration::from_secs(60)));

        let http = t
            .prepare(Request::new(Method::GET).segment("db").streaming())
            .unwrap();
        assert_eq!(http.timeout, None);
    }

    #[test]
    fn prepare_applies_authenticator() {
        let mut t = transport("http://127.0.0.1:5984", Canned::new(StatusCode::OK, ""));
        t.authenticator = Some(Arc::new(BasicAuthenticator::new("admin", "password").unwrap()));
        let http = t.prepare(Request::new(Method::GET)).unwrap();
        assert!(http.header(AUTHORIZATION).unwrap().starts_with("Basic "));
    }

    #[tokio::test]
    async fn auth_failure_sends_nothing() {
        let canned = Canned::new(StatusCode::OK, "{}");
        let mut t = transport("http://127.0.0.1:5984", canned.clone());
        t.authenticator = Some(Arc::new(Failing));

        let err = t.execute(Request::new(Method::GET)).await.unwrap_err();
        assert!(matches!(err, Error::Request(_)));
        assert!(canned.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn error_body_becomes_api_error() {
        let body = r#"{"error":"conflict","reason":"Document update conflict."}"#;
        let t = transport("http://127.0.0.1:5984", Canned::new(StatusCode::CONFLICT, body));

        match t.execute(Request::new(Method::PUT).segment("db").segment("a")).await {
            Err(Error::Api(api)) => {
                assert_eq!(api.status, 409);
                assert_eq!(api.error, "conflict");
                assert_eq!(api.body_text(), body);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn unparseable_error_body_passes_through() {
        let t = transport(
            "http://127.0.0.1:5984",
            Canned::new(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>"),
        );
        let response = t.execute(Request::new(Method::GET)).await.unwrap();
        assert_eq!(response.status, StatusCode::BAD_GATEWAY);
        assert_eq!(
            response.body.bytes().await.unwrap().as_ref(),
            b"<html>bad gateway</html>"
        );
    }

    #[tokio::test]
    async fn ensure_status_classifies() {
        let ok = HttpResponse::new(StatusCode::CREATED);
        assert!(ensure_status(&Method::PUT, "/db", ok, &[201, 202]).await.is_ok());

        let missing = HttpResponse::new(StatusCode::NOT_FOUND);
        let err = ensure_status(&Method::HEAD, "/db/a", missing, &[200])
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let odd = HttpResponse::new(StatusCode::NO_CONTENT);
        let err = ensure_status(&Method::GET, "/db/a", odd, &[200])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnexpectedStatus { status: 204, .. }));
    }
}
