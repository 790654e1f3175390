//! HTTP client implementation
//!
//! This module provides a `ClientProtocol` implementation backed by reqwest,
//! along with the client configuration and error types shared by every adapter.

use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use super::ClientProtocol;
use crate::models::{self, Auth, Headers, Method, RequestBody, RequestError, RequestOptions, Response};

/// API client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Headers sent with every request
    pub headers: Headers,
    /// Default timeout; `None` disables it
    pub timeout: Option<Duration>,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            headers: Headers::new(),
            timeout: Some(Duration::from_secs(30)),
            user_agent: format!("client-protocol/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        models::insert_header(&mut self.headers, name.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ClientError> {
        models::validate_base_url(&self.base_url)
            .map_err(|e| ClientError::Config(format!("base_url: {}", e)))?;

        if self.timeout == Some(Duration::ZERO) {
            return Err(ClientError::Config(
                "timeout must be greater than 0".to_string(),
            ));
        }

        for (name, value) in &self.headers {
            validate_header(name, value)?;
        }

        Ok(())
    }
}

/// Client errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Invalid request: {0}")]
    Request(#[from] RequestError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Server responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid client configuration: {0}")]
    Config(String),

    #[error("No route configured for {method} {url}")]
    NoRoute { method: String, url: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClientError {
    /// HTTP status carried by the error, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether repeating the same call could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Status { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }
}

/// reqwest-backed client for any HTTP service
///
/// The async client is built up front; the blocking one is created on the
/// first blocking call so that async-only users never spin up its worker.
/// Clones share both clients and the header map.
#[derive(Debug, Clone)]
pub struct HttpClientImpl {
    http_client: Arc<reqwest::Client>,
    blocking_client: Arc<OnceLock<reqwest::blocking::Client>>,
    headers: Arc<RwLock<Headers>>,
    config: ClientConfig,
}

impl HttpClientImpl {
    /// Create a new client with default configuration
    pub fn new() -> Result<Self, ClientError> {
        Self::with_config(ClientConfig::default())
    }

    /// Create a new client with custom configuration
    pub fn with_config(mut config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        config.base_url = config.base_url.trim().to_string();

        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client: Arc::new(http_client),
            blocking_client: Arc::new(OnceLock::new()),
            headers: Arc::new(RwLock::new(config.headers.clone())),
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Sets a default header; requests already in flight keep their snapshot
    pub fn set_header(&self, name: impl Into<String>, value: impl Into<String>) -> Result<(), ClientError> {
        let name = name.into();
        let value = value.into();
        validate_header(&name, &value)?;

        let mut headers = self.headers.write().unwrap_or_else(PoisonError::into_inner);
        models::insert_header(&mut headers, name, value);
        Ok(())
    }

    /// Removes a default header, ignoring case; returns whether one was present
    pub fn remove_header(&self, name: &str) -> bool {
        let mut headers = self.headers.write().unwrap_or_else(PoisonError::into_inner);
        let before = headers.len();
        headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
        headers.len() != before
    }

    fn blocking_client(&self) -> Result<&reqwest::blocking::Client, ClientError> {
        if let Some(client) = self.blocking_client.get() {
            return Ok(client);
        }

        // The blocking builder applies a 30s timeout unless told otherwise
        let client = reqwest::blocking::Client::builder()
            .user_agent(self.config.user_agent.clone())
            .timeout(self.config.timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build blocking client: {}", e)))?;

        Ok(self.blocking_client.get_or_init(|| client))
    }

    /// Validates the call and resolves everything both transports need
    fn prepare(&self, method: &str, url: &str, options: &RequestOptions) -> Result<Prepared, ClientError> {
        let method: Method = method.parse()?;
        let http_method = reqwest::Method::from_bytes(method.as_str().as_bytes())
            .map_err(|_| RequestError::InvalidMethod(method.to_string()))?;
        let url = models::resolve_url(&self.config.base_url, url)?;
        let headers = to_header_map(&options.merged_headers(&self.headers()))?;

        Ok(Prepared {
            method,
            http_method,
            url,
            headers,
        })
    }
}

struct Prepared {
    method: Method,
    http_method: reqwest::Method,
    url: reqwest::Url,
    headers: HeaderMap,
}

fn to_header_map(headers: &Headers) -> Result<HeaderMap, ClientError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let (header_name, header_value) = validate_header(name, value)?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

fn validate_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), ClientError> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| ClientError::Config(format!("invalid header name {:?}", name)))?;
    let header_value = HeaderValue::from_str(value)
        .map_err(|_| ClientError::Config(format!("invalid value for header {:?}", name)))?;
    Ok((header_name, header_value))
}

fn collect_headers(map: &HeaderMap) -> Headers {
    let mut headers = Headers::with_capacity(map.keys_len());
    for (name, value) in map {
        models::append_header(&mut headers, name.as_str(), &String::from_utf8_lossy(value.as_bytes()));
    }
    headers
}

fn map_transport_error(error: reqwest::Error) -> ClientError {
    if error.is_timeout() {
        ClientError::Timeout(error.to_string())
    } else {
        ClientError::Http(error)
    }
}

fn check_status(response: Response, options: &RequestOptions) -> Result<Response, ClientError> {
    if options.error_for_status && (response.is_client_error() || response.is_server_error()) {
        return Err(ClientError::Status {
            status: response.status,
            body: response.text(),
        });
    }
    Ok(response)
}

fn log_outcome(prepared: &Prepared, started: Instant, result: &Result<Response, ClientError>) {
    match result {
        Ok(response) => tracing::debug!(
            method = %prepared.method,
            url = %prepared.url,
            status = response.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request completed"
        ),
        Err(e) => tracing::warn!(
            method = %prepared.method,
            url = %prepared.url,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request failed: {}",
            e
        ),
    }
}

// reqwest's async and blocking request builders share no trait
macro_rules! apply_options {
    ($builder:expr, $prepared:expr, $options:expr) => {{
        let mut builder = $builder.headers($prepared.headers.clone());
        if !$options.query.is_empty() {
            builder = builder.query(&$options.query);
        }
        if let Some(timeout) = $options.timeout {
            builder = builder.timeout(timeout);
        }
        match &$options.auth {
            Some(Auth::Basic { username, password }) => {
                builder = builder.basic_auth(username, password.as_ref())
            }
            Some(Auth::Bearer(token)) => builder = builder.bearer_auth(token),
            None => {}
        }
        match &$options.body {
            Some(RequestBody::Json(value)) => builder = builder.json(value),
            Some(body) => builder = builder.body(body.to_bytes()),
            None => {}
        }
        builder
    }};
}

#[async_trait::async_trait]
impl ClientProtocol for HttpClientImpl {
    fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn headers(&self) -> Headers {
        self.headers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn safe_request(
        &self,
        method: &str,
        url: &str,
        options: RequestOptions,
    ) -> Result<Response, ClientError> {
        let prepared = self.prepare(method, url, &options)?;
        tracing::debug!(method = %prepared.method, url = %prepared.url, "issuing blocking request");

        let started = Instant::now();
        let send = || {
            self.blocking_client()
                .and_then(|client| send_blocking(client, &prepared, &options))
        };
        // reqwest's blocking client refuses to run on a thread inside a runtime
        let result = if tokio::runtime::Handle::try_current().is_ok() {
            std::thread::scope(|scope| {
                scope.spawn(send).join().unwrap_or_else(|_| {
                    Err(ClientError::Internal(
                        "blocking request thread panicked".to_string(),
                    ))
                })
            })
        } else {
            send()
        };

        log_outcome(&prepared, started, &result);
        result
    }

    async fn safe_request_async(
        &self,
        method: &str,
        url: &str,
        options: RequestOptions,
    ) -> Result<Response, ClientError> {
        let prepared = self.prepare(method, url, &options)?;
        tracing::debug!(method = %prepared.method, url = %prepared.url, "issuing async request");

        let started = Instant::now();
        let result = send_async(&self.http_client, &prepared, &options).await;
        log_outcome(&prepared, started, &result);
        result
    }
}

fn send_blocking(
    client: &reqwest::blocking::Client,
    prepared: &Prepared,
    options: &RequestOptions,
) -> Result<Response, ClientError> {
    let builder = client.request(prepared.http_method.clone(), prepared.url.clone());
    let response = apply_options!(builder, prepared, options)
        .send()
        .map_err(map_transport_error)?;

    let status = response.status().as_u16();
    let url = response.url().to_string();
    let headers = collect_headers(response.headers());
    let body = response.bytes().map_err(map_transport_error)?.to_vec();

    check_status(
        Response {
            status,
            url,
            headers,
            body,
        },
        options,
    )
}

async fn send_async(
    client: &reqwest::Client,
    prepared: &Prepared,
    options: &RequestOptions,
) -> Result<Response, ClientError> {
    let builder = client.request(prepared.http_method.clone(), prepared.url.clone());
    let response = apply_options!(builder, prepared, options)
        .send()
        .await
        .map_err(map_transport_error)?;

    let status = response.status().as_u16();
    let url = response.url().to_string();
    let headers = collect_headers(response.headers());
    let body = response.bytes().await.map_err(map_transport_error)?.to_vec();

    check_status(
        Response {
            status,
            url,
            headers,
            body,
        },
        options,
    )
}
