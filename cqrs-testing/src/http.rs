//! Outbound HTTP interception.
//!
//! A [`MockHttpHandler`] holds rules of the form "method + URL glob ->
//! canned response". The [`HttpClientFactoryDecorator`] hands out clients
//! whose requests go to the handler registered under the client's name, with
//! anything no rule matches forwarded to the real client.

use std::{collections::BTreeMap, fmt, sync::Arc};

use async_trait::async_trait;
use axum::{
    body::Bytes,
    http::{HeaderMap, HeaderValue, Method, Response, StatusCode, header},
};
use cqrs_host::{
    HttpClient, HttpClientFactory, HttpError, HttpHandler, HttpRequest,
    HttpResponse,
};
use globset::{Glob, GlobMatcher};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::{
    error::TestingError,
    verification::{Times, VerificationFailure, assert_verified},
};

/// Canned response returned by a matching rule.
#[derive(Debug, Clone)]
pub struct MockResponse {
    /// Response status.
    pub status: StatusCode,
    /// Sent as `Content-Type`.
    pub content_type: HeaderValue,
    /// Response body.
    pub body: Bytes,
}

impl MockResponse {
    fn to_response(&self) -> HttpResponse {
        let mut response = Response::new(self.body.clone());
        *response.status_mut() = self.status;
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, self.content_type.clone());
        response
    }
}

struct Rule {
    method: Method,
    pattern: String,
    matcher: GlobMatcher,
    response: MockResponse,
}

impl Rule {
    fn matches(&self, method: &Method, url: &str) -> bool {
        self.method == method
            && self.matcher.is_match(match_target(&self.pattern, url))
    }
}

/// Patterns without a `?` are matched against the URL minus its query
/// string.
fn match_target<'a>(pattern: &str, url: &'a str) -> &'a str {
    if pattern.contains('?') {
        return url;
    }
    url.split_once('?').map_or(url, |(without_query, _)| without_query)
}

/// A request seen by an interceptor.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Request method.
    pub method: Method,
    /// Absolute URL, query string included.
    pub url: String,
    /// Request headers, client defaults included.
    pub headers: HeaderMap,
    /// Request body.
    pub body: Bytes,
    /// Whether a rule answered it; otherwise it went to the fallback.
    pub intercepted: bool,
}

/// Programmable request matcher. Rules are tried in the order they were
/// added and the first match answers.
#[derive(Default)]
pub struct MockHttpHandler {
    rules: Mutex<Vec<Rule>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockHttpHandler {
    /// Handler without rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a rule for `method` requests whose absolute URL matches
    /// `pattern`, e.g. `*/comments`. A pattern without `?` ignores the
    /// query string.
    pub fn when(
        &self,
        method: Method,
        pattern: &str,
    ) -> Result<RuleBuilder<'_>, TestingError> {
        let matcher = Glob::new(pattern)?.compile_matcher();
        Ok(RuleBuilder {
            handler: self,
            method,
            pattern: pattern.to_string(),
            matcher,
        })
    }

    /// Every request seen so far, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Panics unless [`check_requests`](Self::check_requests) passes.
    #[track_caller]
    pub fn verify_requests(&self, method: Method, pattern: &str, times: Times) {
        assert_verified(self.check_requests(method, pattern, times));
    }

    /// Counts every request this handler saw, intercepted or forwarded,
    /// whose method and URL match.
    pub fn check_requests(
        &self,
        method: Method,
        pattern: &str,
        times: Times,
    ) -> Result<(), VerificationFailure> {
        let subject = format!("MockHttpHandler requests {method} {pattern}");
        let matcher = match Glob::new(pattern) {
            Ok(glob) => glob.compile_matcher(),
            Err(err) => {
                return Err(VerificationFailure {
                    subject,
                    expected: times,
                    actual: 0,
                    recorded: vec![format!("invalid URL glob: {err}")],
                });
            }
        };

        let requests = self.requests.lock();
        let matching = requests
            .iter()
            .filter(|request| {
                request.method == method
                    && matcher.is_match(match_target(pattern, &request.url))
            })
            .count();
        VerificationFailure::check(subject, times, matching, || {
            requests
                .iter()
                .map(|request| format!("{} {}", request.method, request.url))
                .collect()
        })
    }

    /// Answers `request` from the first matching rule and records it.
    fn intercept(&self, request: &HttpRequest) -> Option<HttpResponse> {
        let url = request.uri().to_string();
        let response = self
            .rules
            .lock()
            .iter()
            .find(|rule| rule.matches(request.method(), &url))
            .map(|rule| {
                debug!(method = %rule.method, pattern = %rule.pattern, %url, "intercepted request");
                rule.response.to_response()
            });

        self.requests.lock().push(RecordedRequest {
            method: request.method().clone(),
            url,
            headers: request.headers().clone(),
            body: request.body().clone(),
            intercepted: response.is_some(),
        });
        response
    }

    fn push(&self, rule: Rule) {
        self.rules.lock().push(rule);
    }
}

impl fmt::Debug for MockHttpHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let patterns: Vec<String> = self
            .rules
            .lock()
            .iter()
            .map(|rule| format!("{} {}", rule.method, rule.pattern))
            .collect();
        f.debug_struct("MockHttpHandler")
            .field("rules", &patterns)
            .field("requests", &self.requests.lock().len())
            .finish()
    }
}

/// Without a fallback, unmatched requests get `404 Not Found`.
#[async_trait]
impl HttpHandler for MockHttpHandler {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        if let Some(response) = self.intercept(&request) {
            return Ok(response);
        }
        let mut response = Response::new(Bytes::from(format!(
            "no intercepted response matches {} {}",
            request.method(),
            request.uri()
        )));
        *response.status_mut() = StatusCode::NOT_FOUND;
        Ok(response)
    }
}

/// Pending rule returned by [`MockHttpHandler::when`].
pub struct RuleBuilder<'a> {
    handler: &'a MockHttpHandler,
    method: Method,
    pattern: String,
    matcher: GlobMatcher,
}

impl<'a> RuleBuilder<'a> {
    /// Answers with `200 OK` and the given literal body.
    pub fn respond(
        self,
        content_type: &str,
        body: impl Into<Bytes>,
    ) -> Result<&'a MockHttpHandler, TestingError> {
        self.respond_with_status(StatusCode::OK, content_type, body)
    }

    /// Answers with `status`. Fails without adding the rule when
    /// `content_type` is not a valid header value.
    pub fn respond_with_status(
        self,
        status: StatusCode,
        content_type: &str,
        body: impl Into<Bytes>,
    ) -> Result<&'a MockHttpHandler, TestingError> {
        let content_type = HeaderValue::from_str(content_type).map_err(|_| {
            TestingError::InvalidContentType {
                content_type: content_type.to_string(),
            }
        })?;
        let handler = self.handler;
        handler.push(Rule {
            method: self.method,
            pattern: self.pattern,
            matcher: self.matcher,
            response: MockResponse {
                status,
                content_type,
                body: body.into(),
            },
        });
        Ok(handler)
    }

    /// Answers with `200 OK` and `value` serialized as JSON.
    pub fn respond_json<T: Serialize + ?Sized>(
        self,
        value: &T,
    ) -> Result<&'a MockHttpHandler, TestingError> {
        let body = serde_json::to_vec(value)?;
        self.respond("application/json", body)
    }
}

impl fmt::Debug for RuleBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleBuilder")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

/// Routes requests through an interceptor and forwards whatever it does not
/// answer to the real client's handler.
struct InterceptingHandler {
    interceptor: Arc<MockHttpHandler>,
    fallback: Arc<dyn HttpHandler>,
}

#[async_trait]
impl HttpHandler for InterceptingHandler {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        if let Some(response) = self.interceptor.intercept(&request) {
            return Ok(response);
        }
        debug!(method = %request.method(), url = %request.uri(), "forwarding request");
        self.fallback.send(request).await
    }
}

/// Wraps the application's client factory. Clients whose name has an
/// interceptor are rebuilt around it; all others pass through untouched.
pub struct HttpClientFactoryDecorator {
    inner: Arc<dyn HttpClientFactory>,
    interceptors: BTreeMap<String, Arc<MockHttpHandler>>,
}

impl HttpClientFactoryDecorator {
    /// Decorates `inner` with the interceptors keyed by client name.
    pub fn new(
        inner: Arc<dyn HttpClientFactory>,
        interceptors: BTreeMap<String, Arc<MockHttpHandler>>,
    ) -> Self {
        Self {
            inner,
            interceptors,
        }
    }
}

impl HttpClientFactory for HttpClientFactoryDecorator {
    fn create_client(&self, name: &str) -> HttpClient {
        let client = self.inner.create_client(name);
        let Some(interceptor) = self.interceptors.get(name) else {
            return client;
        };

        debug!(client = name, "intercepting http client");
        let handler = InterceptingHandler {
            interceptor: Arc::clone(interceptor),
            fallback: Arc::clone(client.handler()),
        };
        client.with_handler(Arc::new(handler))
    }
}

impl fmt::Debug for HttpClientFactoryDecorator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClientFactoryDecorator")
            .field("intercepted", &self.interceptors.keys())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;
    use cqrs_host::{DefaultHttpClientFactory, HttpClientOptions};
    use url::Url;

    use super::*;

    /// Stands in for the network: answers everything with `real`.
    struct Upstream;

    #[async_trait]
    impl HttpHandler for Upstream {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, HttpError> {
            Ok(Response::new(Bytes::from_static(b"real")))
        }
    }

    struct StaticFactory;

    impl HttpClientFactory for StaticFactory {
        fn create_client(&self, name: &str) -> HttpClient {
            HttpClient::new(name, Arc::new(Upstream))
                .with_base_url(Url::parse("https://api.example.test/").unwrap())
        }
    }

    fn get(url: &str) -> HttpRequest {
        Request::get(url).body(Bytes::new()).unwrap()
    }

    #[tokio::test]
    async fn first_matching_rule_answers() {
        let handler = MockHttpHandler::new();
        handler
            .when(Method::GET, "*/comments")
            .unwrap()
            .respond("application/json", "[1]")
            .unwrap();
        handler
            .when(Method::GET, "*")
            .unwrap()
            .respond_with_status(StatusCode::ACCEPTED, "text/plain", "catch-all")
            .unwrap();

        let response = handler.send(get("https://x.test/comments")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(response.body().as_ref(), b"[1]");

        let response = handler.send(get("https://x.test/posts")).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn unmatched_request_without_fallback_is_not_found() {
        let handler = MockHttpHandler::new();
        handler
            .when(Method::POST, "*/comments")
            .unwrap()
            .respond("text/plain", "ok")
            .unwrap();

        let response = handler.send(get("https://x.test/comments")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        handler.verify_requests(Method::GET, "*/comments", Times::once());
        assert!(!handler.requests()[0].intercepted);
    }

    #[tokio::test]
    async fn query_string_is_ignored_unless_the_pattern_has_one() {
        let handler = MockHttpHandler::new();
        handler
            .when(Method::GET, "*/comments")
            .unwrap()
            .respond("application/json", "[]")
            .unwrap()
            .when(Method::GET, "*/posts?userId=2")
            .unwrap()
            .respond("application/json", "[2]")
            .unwrap();

        let response = handler
            .send(get("https://x.test/comments?postId=1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().as_ref(), b"[]");

        let response = handler.send(get("https://x.test/posts?userId=2")).await.unwrap();
        assert_eq!(response.body().as_ref(), b"[2]");
        let response = handler.send(get("https://x.test/posts?userId=3")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        handler.verify_requests(Method::GET, "*/comments", Times::once());
        handler.verify_requests(Method::GET, "*/posts", Times::exactly(2));
        assert_eq!(
            handler.requests()[0].url,
            "https://x.test/comments?postId=1"
        );
    }

    #[test]
    fn invalid_content_type_is_rejected() {
        let handler = MockHttpHandler::new();
        let result = handler
            .when(Method::GET, "*/comments")
            .unwrap()
            .respond("application/json\n", "[]");
        assert!(matches!(
            result,
            Err(TestingError::InvalidContentType { .. })
        ));
        assert!(format!("{handler:?}").contains("rules: []"));
    }

    #[test]
    fn invalid_glob_is_rejected() {
        let handler = MockHttpHandler::new();
        assert!(matches!(
            handler.when(Method::GET, "*/{comments"),
            Err(TestingError::Glob(_))
        ));
    }

    #[tokio::test]
    async fn decorator_intercepts_only_registered_names() {
        let interceptor = Arc::new(MockHttpHandler::new());
        interceptor
            .when(Method::GET, "*/comments")
            .unwrap()
            .respond("application/json", "mocked")
            .unwrap();

        let mut interceptors = BTreeMap::new();
        interceptors.insert("comments".to_string(), Arc::clone(&interceptor));
        let factory = HttpClientFactoryDecorator::new(Arc::new(StaticFactory), interceptors);

        let comments = factory.create_client("comments");
        assert_eq!(
            comments.base_url().map(Url::as_str),
            Some("https://api.example.test/")
        );
        assert_eq!(comments.get_string("comments").await.unwrap(), "mocked");
        assert_eq!(comments.get_string("posts").await.unwrap(), "real");

        let posts = factory.create_client("posts");
        assert_eq!(posts.get_string("comments").await.unwrap(), "real");

        interceptor.verify_requests(Method::GET, "*", Times::exactly(2));
    }

    #[test]
    fn decorator_preserves_declared_headers() {
        let mut declared = BTreeMap::new();
        declared.insert(
            "values".to_string(),
            HttpClientOptions::new()
                .base_url("https://values.example.test/")
                .header(
                    header::ACCEPT,
                    HeaderValue::from_static("text/plain"),
                ),
        );
        let inner = DefaultHttpClientFactory::new(declared).unwrap();

        let mut interceptors = BTreeMap::new();
        interceptors.insert("values".to_string(), Arc::new(MockHttpHandler::new()));
        let factory = HttpClientFactoryDecorator::new(Arc::new(inner), interceptors);

        let client = factory.create_client("values");
        assert_eq!(client.default_headers()[header::ACCEPT], "text/plain");
        assert_eq!(client.name(), "values");
    }
}
