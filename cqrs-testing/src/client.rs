//! In-process requests against a built host's router.

use axum::{
    Router,
    body::{Body, Bytes, to_bytes},
    http::{HeaderMap, HeaderValue, Method, Request, StatusCode, header},
};
use serde::{Serialize, de::DeserializeOwned};
use tower::ServiceExt;

use crate::error::TestingError;

/// Sends requests straight into the host's router, without a socket.
#[derive(Debug, Clone)]
pub struct TestClient {
    router: Router,
}

impl TestClient {
    pub(crate) fn new(router: Router) -> Self {
        Self { router }
    }

    /// Sends `request` through the router and buffers the response.
    pub async fn send(&self, request: Request<Body>) -> Result<TestResponse, TestingError> {
        let response = match self.router.clone().oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        };

        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(TestingError::Body)?;
        Ok(TestResponse {
            status,
            headers,
            body,
        })
    }

    /// GETs `uri`.
    pub async fn get(&self, uri: &str) -> Result<TestResponse, TestingError> {
        self.send(Request::get(uri).body(Body::empty())?).await
    }

    /// GETs `uri`, requires a success status and parses the body.
    pub async fn get_json<T: DeserializeOwned>(&self, uri: &str) -> Result<T, TestingError> {
        self.get(uri).await?.ensure_success()?.json()
    }

    /// POSTs `body` as JSON.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        uri: &str,
        body: &B,
    ) -> Result<TestResponse, TestingError> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(Body::from(serde_json::to_vec(body)?))?;
        self.send(request).await
    }
}

/// Fully buffered response.
#[derive(Debug, Clone)]
pub struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl TestResponse {
    /// Response status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Raw body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body as text, with invalid UTF-8 replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Parses the body as JSON, whatever the status.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TestingError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Fails with [`TestingError::Status`] unless the status is 2xx.
    pub fn ensure_success(self) -> Result<Self, TestingError> {
        if self.is_success() {
            return Ok(self);
        }
        Err(TestingError::Status {
            status: self.status,
            body: self.text(),
        })
    }
}
