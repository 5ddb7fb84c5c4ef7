//! Named outbound HTTP clients.
//!
//! An [`HttpClient`] is a thin request builder over an [`HttpHandler`], the
//! component that actually moves bytes. Production clients use
//! [`ReqwestHandler`]; anything implementing the trait can stand in for it.

/// Client errors.
pub mod error;
mod factory;

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use axum::{
    body::Bytes,
    http::{HeaderMap, HeaderValue, Method, Request, Response, header},
};
use serde::{Serialize, de::DeserializeOwned};
use url::Url;

use error::HttpError;
pub use factory::{
    DefaultHttpClientFactory, HttpClientFactory, HttpClientOptions,
    TypedHttpClient,
};

/// A request with its body fully buffered.
pub type HttpRequest = Request<Bytes>;
/// A response with its body fully buffered.
pub type HttpResponse = Response<Bytes>;

/// Sends a fully built request and returns the buffered response.
#[async_trait]
pub trait HttpHandler: Send + Sync {
    /// Sends `request`. Non-success statuses are responses, not errors.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// Handler backed by a `reqwest` connection pool.
#[derive(Debug, Clone, Default)]
pub struct ReqwestHandler {
    client: reqwest::Client,
}

impl ReqwestHandler {
    /// Handler over `client`.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpHandler for ReqwestHandler {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let request = reqwest::Request::try_from(request)?;
        let response = self.client.execute(request).await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        let mut converted = Response::new(body);
        *converted.status_mut() = status;
        *converted.headers_mut() = headers;
        Ok(converted)
    }
}

/// Request builder bound to one handler, an optional base address and a set
/// of headers sent with every request.
#[derive(Clone)]
pub struct HttpClient {
    name: String,
    handler: Arc<dyn HttpHandler>,
    base_url: Option<Url>,
    default_headers: HeaderMap,
}

impl HttpClient {
    /// Client named `name` without base address or default headers.
    pub fn new(name: impl Into<String>, handler: Arc<dyn HttpHandler>) -> Self {
        Self {
            name: name.into(),
            handler,
            base_url: None,
            default_headers: HeaderMap::new(),
        }
    }

    /// Sets the address relative targets are joined onto.
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Replaces the headers sent with every request.
    pub fn with_default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers = headers;
        self
    }

    /// Same base address and headers, different handler.
    pub fn with_handler(mut self, handler: Arc<dyn HttpHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// The name the client was declared under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The base address, if any.
    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Headers sent with every request.
    pub fn default_headers(&self) -> &HeaderMap {
        &self.default_headers
    }

    /// The handler requests go through.
    pub fn handler(&self) -> &Arc<dyn HttpHandler> {
        &self.handler
    }

    /// Absolute targets are used as given; anything else is joined onto the
    /// base address. An empty target is the base address itself.
    pub fn resolve_url(&self, target: &str) -> Result<Url, HttpError> {
        match Url::parse(target) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let Some(base) = &self.base_url else {
                    return Err(HttpError::invalid_url(
                        target,
                        url::ParseError::RelativeUrlWithoutBase,
                    ));
                };
                base.join(target)
                    .map_err(|source| HttpError::invalid_url(target, source))
            }
            Err(source) => Err(HttpError::invalid_url(target, source)),
        }
    }

    /// Sends a request to `target`. Per-request headers override the
    /// default ones.
    pub async fn send(
        &self,
        method: Method,
        target: &str,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<HttpResponse, HttpError> {
        let url = self.resolve_url(target)?;

        let mut request = Request::builder()
            .method(method)
            .uri(url.as_str())
            .body(body)?;
        let request_headers = request.headers_mut();
        for (name, value) in &self.default_headers {
            request_headers.insert(name.clone(), value.clone());
        }
        for (name, value) in &headers {
            request_headers.insert(name.clone(), value.clone());
        }

        tracing::debug!(
            client = %self.name,
            method = %request.method(),
            url = %url,
            "sending request"
        );
        self.handler.send(request).await
    }

    /// GETs `target`.
    pub async fn get(&self, target: &str) -> Result<HttpResponse, HttpError> {
        self.send(Method::GET, target, HeaderMap::new(), Bytes::new())
            .await
    }

    /// GETs `target` and returns the body as text, failing on a non-success
    /// status.
    pub async fn get_string(&self, target: &str) -> Result<String, HttpError> {
        let response = ensure_success(self.get(target).await?)?;
        Ok(String::from_utf8_lossy(response.body()).into_owned())
    }

    /// GETs `target` and deserializes the JSON body, failing on a
    /// non-success status.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        target: &str,
    ) -> Result<T, HttpError> {
        let response = ensure_success(self.get(target).await?)?;
        Ok(serde_json::from_slice(response.body())?)
    }

    /// POSTs `body` as JSON.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        target: &str,
        body: &B,
    ) -> Result<HttpResponse, HttpError> {
        let body = serde_json::to_vec(body)?;
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self.send(Method::POST, target, headers, Bytes::from(body))
            .await
    }
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("name", &self.name)
            .field("base_url", &self.base_url.as_ref().map(Url::as_str))
            .field("default_headers", &self.default_headers)
            .finish_non_exhaustive()
    }
}

/// Converts a non-success response into [`HttpError::Status`].
pub fn ensure_success(response: HttpResponse) -> Result<HttpResponse, HttpError> {
    if response.status().is_success() {
        return Ok(response);
    }
    Err(HttpError::Status {
        status: response.status(),
        body: String::from_utf8_lossy(response.body()).into_owned(),
    })
}
