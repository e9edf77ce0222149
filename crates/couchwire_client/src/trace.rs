//! Per-call observation hook.
//!
//! The client opens a [`CallScope`] before each call and closes it exactly
//! once with the outcome. If the call future is dropped mid-flight the
//! scope is closed with [`CallOutcome::Cancelled`].

use crate::error::Error;
use crate::http::Request;
use reqwest::{Method, StatusCode};
use tracing::field::Empty;
use tracing::{debug, info_span, Span};

/// Query parameters copied onto the call description.
const TRACKED_PARAMS: [&str; 4] = ["since", "limit", "startkey", "endkey"];

/// Description of a call, handed to the observer when it starts.
#[derive(Debug, Clone)]
pub struct CallInfo {
    /// Request method.
    pub method: Method,
    /// Unencoded request path.
    pub path: String,
    /// Pagination and cursor parameters present on the request.
    pub params: Vec<(String, String)>,
}

impl CallInfo {
    pub(crate) fn from_request(request: &Request) -> Self {
        let params = request
            .query_pairs()
            .iter()
            .filter(|(key, _)| TRACKED_PARAMS.contains(&key.as_str()))
            .cloned()
            .collect();
        Self {
            method: request.method().clone(),
            path: request.path(),
            params,
        }
    }

    /// Returns a tracked parameter.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// How a call ended.
#[derive(Debug, Clone, Copy)]
pub enum CallOutcome<'a> {
    /// A response was received. For streams this is the status of the
    /// response head.
    Status(StatusCode),
    /// The call failed.
    Error(&'a Error),
    /// The call was abandoned before it finished.
    Cancelled,
}

/// Observes calls made by a [`Client`](crate::Client).
///
/// Only calls that reach the executor are observed; a call rejected while
/// resolving its URL or by the [`Authenticator`](crate::Authenticator)
/// opens no scope.
pub trait RequestObserver: Send + Sync {
    /// Called before the request is sent.
    fn start(&self, call: &CallInfo) -> Box<dyn CallScope>;
}

/// An open observation, closed once.
pub trait CallScope: Send {
    /// Records the outcome and closes the scope.
    fn finish(self: Box<Self>, outcome: CallOutcome<'_>);
}

/// Closes the scope on every exit path.
pub(crate) struct ScopeGuard {
    scope: Option<Box<dyn CallScope>>,
}

impl ScopeGuard {
    pub(crate) fn start(observer: Option<&dyn RequestObserver>, call: &CallInfo) -> Self {
        Self {
            scope: observer.map(|observer| observer.start(call)),
        }
    }

    pub(crate) fn finish(mut self, outcome: CallOutcome<'_>) {
        if let Some(scope) = self.scope.take() {
            scope.finish(outcome);
        }
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if let Some(scope) = self.scope.take() {
            scope.finish(CallOutcome::Cancelled);
        }
    }
}

/// Observer that records each call as a `couchdb.request` span.
///
/// A span is only opened when the caller is inside a span already, so
/// untraced callers pay nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl RequestObserver for TracingObserver {
    fn start(&self, call: &CallInfo) -> Box<dyn CallScope> {
        if Span::current().is_none() {
            return Box::new(NoopScope);
        }

        let span = info_span!(
            "couchdb.request",
            method = %call.method,
            path = %call.path,
            since = Empty,
            limit = Empty,
            startkey = Empty,
            endkey = Empty,
            status = Empty,
            error = Empty,
        );
        for (key, value) in &call.params {
            span.record(key.as_str(), value.as_str());
        }
        Box::new(SpanScope { span })
    }
}

struct NoopScope;

impl CallScope for NoopScope {
    fn finish(self: Box<Self>, _outcome: CallOutcome<'_>) {}
}

struct SpanScope {
    span: Span,
}

impl CallScope for SpanScope {
    fn finish(self: Box<Self>, outcome: CallOutcome<'_>) {
        let _enter = self.span.enter();
        match outcome {
            CallOutcome::Status(status) => {
                self.span.record("status", status.as_u16());
                debug!(status = status.as_u16(), "request finished");
            }
            CallOutcome::Error(err) => {
                self.span.record("error", tracing::field::display(err));
                if let Some(status) = err.status() {
                    self.span.record("status", status);
                }
                debug!(error = %err, "request failed");
            }
            CallOutcome::Cancelled => {
                self.span.record("error", "cancelled");
                debug!("request cancelled");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<String>>>,
    }

    struct RecordingScope {
        path: String,
        events: Arc<Mutex<Vec<String>>>,
    }

    impl RequestObserver for Recorder {
        fn start(&self, call: &CallInfo) -> Box<dyn CallScope> {
            self.events.lock().push(format!("start {}", call.path));
            Box::new(RecordingScope {
                path: call.path.clone(),
                events: self.events.clone(),
            })
        }
    }

    impl CallScope for RecordingScope {
        fn finish(self: Box<Self>, outcome: CallOutcome<'_>) {
            let outcome = match outcome {
                CallOutcome::Status(status) => status.as_u16().to_string(),
                CallOutcome::Error(_) => "error".to_string(),
                CallOutcome::Cancelled => "cancelled".to_string(),
            };
            self.events.lock().push(format!("finish {} {}", self.path, outcome));
        }
    }

    #[test]
    fn call_info_keeps_tracked_params() {
        let request = Request::new(Method::GET)
            .segment("db")
            .segment("_changes")
            .query("feed", "continuous")
            .query("since", 5)
            .query("limit", 10);
        let call = CallInfo::from_request(&request);
        assert_eq!(call.path, "/db/_changes");
        assert_eq!(call.param("since"), Some("5"));
        assert_eq!(call.param("limit"), Some("10"));
        assert_eq!(call.param("feed"), None);
    }

    #[test]
    fn guard_finishes_once() {
        let recorder = Recorder::default();
        let call = CallInfo::from_request(&Request::new(Method::GET).segment("db"));

        let guard = ScopeGuard::start(Some(&recorder), &call);
        guard.finish(CallOutcome::Status(StatusCode::OK));

        assert_eq!(
            *recorder.events.lock(),
            vec!["start /db".to_string(), "finish /db 200".to_string()]
        );
    }

    #[test]
    fn dropped_guard_reports_cancelled() {
        let recorder = Recorder::default();
        let call = CallInfo::from_request(&Request::new(Method::GET).segment("db"));

        drop(ScopeGuard::start(Some(&recorder), &call));

        assert_eq!(recorder.events.lock()[1], "finish /db cancelled");
    }

    #[test]
    fn no_observer_is_fine() {
        let call = CallInfo::from_request(&Request::new(Method::GET));
        ScopeGuard::start(None, &call).finish(CallOutcome::Cancelled);
    }

    #[test]
    fn tracing_observer_without_span() {
        let call = CallInfo::from_request(&Request::new(Method::HEAD).segment("db"));
        let scope = TracingObserver.start(&call);
        scope.finish(CallOutcome::Status(StatusCode::NOT_FOUND));
    }
}
