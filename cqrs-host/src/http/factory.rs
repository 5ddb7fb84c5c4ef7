use std::{any::type_name, collections::BTreeMap, fmt, sync::Arc, time::Duration};

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use super::{HttpClient, ReqwestHandler, error::HttpError};

/// Settings for one named client.
#[derive(Debug, Clone, Default)]
pub struct HttpClientOptions {
    base_url: Option<String>,
    default_headers: HeaderMap,
    timeout: Option<Duration>,
}

impl HttpClientOptions {
    /// Options without base address, headers or timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Base address for relative targets. Parsed when the factory is built,
    /// so an invalid address fails host startup.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Adds a header sent with every request.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.default_headers.insert(name, value);
        self
    }

    /// Per-request timeout. Clients with a timeout get their own
    /// `reqwest::Client`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The base address as declared.
    pub fn base_url_str(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Headers sent with every request.
    pub fn default_headers(&self) -> &HeaderMap {
        &self.default_headers
    }

    /// The declared timeout.
    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Hands out clients by name.
pub trait HttpClientFactory: Send + Sync {
    /// Client for `name`. Unknown names still get a usable client.
    fn create_client(&self, name: &str) -> HttpClient;
}

/// Client wrapper resolved from the container; each type maps to one named
/// client.
pub trait TypedHttpClient: Sized + Send + Sync + 'static {
    /// Name of the backing client. Defaults to the unqualified type name.
    fn client_name() -> &'static str {
        type_name::<Self>().rsplit("::").next().unwrap_or_default()
    }

    /// Wraps the client resolved for [`client_name`](Self::client_name).
    fn from_client(client: HttpClient) -> Self;
}

/// Factory serving the clients declared on the service collection. Names
/// that were never declared get a client without base address or headers.
pub struct DefaultHttpClientFactory {
    clients: BTreeMap<String, HttpClient>,
    fallback: Arc<ReqwestHandler>,
}

impl DefaultHttpClientFactory {
    /// Builds every declared client up front. Fails on an invalid base
    /// address.
    pub fn new(
        declared: BTreeMap<String, HttpClientOptions>,
    ) -> Result<Self, HttpError> {
        let fallback = Arc::new(ReqwestHandler::new(reqwest::Client::builder().build()?));

        let mut clients = BTreeMap::new();
        for (name, options) in declared {
            let client = build_client(&name, &options, &fallback)?;
            tracing::debug!(
                client = %name,
                base_url = options.base_url_str().unwrap_or_default(),
                "registered http client"
            );
            clients.insert(name, client);
        }

        Ok(Self { clients, fallback })
    }

    /// Names of the declared clients.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(String::as_str)
    }
}

fn build_client(
    name: &str,
    options: &HttpClientOptions,
    shared: &Arc<ReqwestHandler>,
) -> Result<HttpClient, HttpError> {
    let handler = match options.timeout {
        Some(timeout) => Arc::new(ReqwestHandler::new(
            reqwest::Client::builder().timeout(timeout).build()?,
        )),
        None => Arc::clone(shared),
    };

    let mut client = HttpClient::new(name, handler)
        .with_default_headers(options.default_headers.clone());
    if let Some(base_url) = &options.base_url {
        let parsed = Url::parse(base_url)
            .map_err(|source| HttpError::invalid_url(base_url, source))?;
        client = client.with_base_url(parsed);
    }
    Ok(client)
}

impl HttpClientFactory for DefaultHttpClientFactory {
    fn create_client(&self, name: &str) -> HttpClient {
        match self.clients.get(name) {
            Some(client) => client.clone(),
            None => HttpClient::new(name, self.fallback.clone()),
        }
    }
}

impl fmt::Debug for DefaultHttpClientFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultHttpClientFactory")
            .field("clients", &self.clients)
            .finish_non_exhaustive()
    }
}
