//! Core models for the client protocol
//!
//! This module contains the request options, the response type and the
//! validation rules every client adapter shares.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Mapping of header names to header values
pub type Headers = HashMap<String, String>;

/// Errors raised while validating the method and URL of a call, before any I/O
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("HTTP method must not be empty")]
    EmptyMethod,

    #[error("Invalid HTTP method: {0:?}")]
    InvalidMethod(String),

    #[error("Target URL must not be empty")]
    EmptyUrl,

    #[error("Invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// An HTTP verb
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
    Trace,
    Connect,
    /// Any other valid token, stored upper-cased
    Other(String),
}

impl Method {
    /// Returns the canonical upper-case name of the method
    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Connect => "CONNECT",
            Method::Other(name) => name,
        }
    }

    /// Idempotent methods may be repeated without changing the outcome
    pub fn is_idempotent(&self) -> bool {
        matches!(
            self,
            Method::Get
                | Method::Head
                | Method::Put
                | Method::Delete
                | Method::Options
                | Method::Trace
        )
    }
}

impl FromStr for Method {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_uppercase();
        if name.is_empty() {
            return Err(RequestError::EmptyMethod);
        }

        let method = match name.as_str() {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "PATCH" => Method::Patch,
            "DELETE" => Method::Delete,
            "HEAD" => Method::Head,
            "OPTIONS" => Method::Options,
            "TRACE" => Method::Trace,
            "CONNECT" => Method::Connect,
            _ if name.bytes().all(is_token_byte) => Method::Other(name),
            _ => return Err(RequestError::InvalidMethod(s.to_string())),
        };

        Ok(method)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// tchar from RFC 7230 section 3.2.6
fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

/// Checks that a base URL is an absolute http(s) URL with a host
pub fn validate_base_url(base_url: &str) -> Result<Url, RequestError> {
    let base_url = base_url.trim();
    if base_url.is_empty() {
        return Err(RequestError::EmptyUrl);
    }

    let invalid = |reason: String| RequestError::InvalidUrl {
        url: base_url.to_string(),
        reason,
    };
    let url = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
    }
    if !url.has_host() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

/// Resolves a call target against a client's base URL
///
/// Targets that parse as absolute URLs with a host, or that spell out a
/// `scheme://` prefix, are used as-is. Anything else is appended to the base
/// with exactly one `/` between.
pub fn resolve_url(base_url: &str, target: &str) -> Result<Url, RequestError> {
    let target = target.trim();
    if target.is_empty() {
        return Err(RequestError::EmptyUrl);
    }

    match Url::parse(target) {
        Ok(url) if url.has_host() || has_explicit_scheme(target) => return Ok(url),
        Err(e) if has_explicit_scheme(target) => {
            return Err(RequestError::InvalidUrl {
                url: target.to_string(),
                reason: e.to_string(),
            })
        }
        _ => {}
    }

    let base = base_url.trim().trim_end_matches('/');
    if base.is_empty() {
        return Err(RequestError::InvalidUrl {
            url: target.to_string(),
            reason: "relative URL given but the client has no base URL".to_string(),
        });
    }
    let candidate = format!("{}/{}", base, target.trim_start_matches('/'));

    Url::parse(&candidate).map_err(|e| RequestError::InvalidUrl {
        url: candidate.clone(),
        reason: e.to_string(),
    })
}

/// `scheme://` at the very start of the target, before any path or query
fn has_explicit_scheme(target: &str) -> bool {
    match target.split_once("://") {
        Some((scheme, _)) => {
            scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

/// Payload sent with a request
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

impl RequestBody {
    /// Raw bytes of the payload as they go over the wire
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            RequestBody::Text(text) => text.as_bytes().to_vec(),
            RequestBody::Bytes(bytes) => bytes.clone(),
            RequestBody::Json(value) => value.to_string().into_bytes(),
        }
    }
}

/// Credentials attached to a single request
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    Basic {
        username: String,
        password: Option<String>,
    },
    Bearer(String),
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Auth::Bearer(_) => f.debug_tuple("Bearer").field(&"<redacted>").finish(),
        }
    }
}

/// Per-call options accepted by both request operations
///
/// Every field is optional; `RequestOptions::default()` sends a bare request
/// and treats 4xx/5xx responses as errors.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    /// Query parameters appended to the URL, in order
    pub query: Vec<(String, String)>,
    /// Headers for this call only; they win over client headers of the same name
    pub headers: Headers,
    pub body: Option<RequestBody>,
    /// Overrides the client's default timeout
    pub timeout: Option<Duration>,
    pub auth: Option<Auth>,
    /// When set, 4xx/5xx responses are reported as `ClientError::Status`
    pub error_for_status: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            query: Vec::new(),
            headers: Headers::new(),
            body: None,
            timeout: None,
            auth: None,
            error_for_status: true,
        }
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        insert_header(&mut self.headers, name.into(), value.into());
        self
    }

    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Text(body.into()));
        self
    }

    pub fn bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(RequestBody::Bytes(body.into()));
        self
    }

    /// Serializes `value` as the JSON body of the request
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self, serde_json::Error> {
        self.body = Some(RequestBody::Json(serde_json::to_value(value)?));
        Ok(self)
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn basic_auth(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.auth = Some(Auth::Basic {
            username: username.into(),
            password,
        });
        self
    }

    pub fn bearer_auth(mut self, token: impl Into<String>) -> Self {
        self.auth = Some(Auth::Bearer(token.into()));
        self
    }

    /// Returns 4xx/5xx responses as data instead of errors
    pub fn allow_error_status(mut self) -> Self {
        self.error_for_status = false;
        self
    }

    /// Combines client-level headers with the per-call ones, per-call winning
    pub fn merged_headers(&self, client_headers: &Headers) -> Headers {
        let mut merged = client_headers.clone();
        for (name, value) in &self.headers {
            insert_header(&mut merged, name.clone(), value.clone());
        }
        merged
    }
}

/// Inserts a header, replacing any existing entry whose name differs only in case
pub fn insert_header(headers: &mut Headers, name: String, value: String) {
    headers.retain(|existing, _| !existing.eq_ignore_ascii_case(&name));
    headers.insert(name, value);
}

/// Adds a header under its lower-cased name, joining repeated names with `, `
pub fn append_header(headers: &mut Headers, name: &str, value: &str) {
    headers
        .entry(name.to_ascii_lowercase())
        .and_modify(|existing| {
            existing.push_str(", ");
            existing.push_str(value);
        })
        .or_insert_with(|| value.to_string());
}

/// Outcome of a completed HTTP exchange
///
/// Both the blocking and the async operation produce this same type. Header
/// names are stored lower-cased; repeated headers are joined with `, `.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    /// Final URL of the exchange, after redirects
    pub url: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, url: impl Into<String>) -> Self {
        Self {
            status,
            url: url.into(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.append_header(name, &value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a JSON body along with a matching content type
    pub fn with_json(self, value: &serde_json::Value) -> Self {
        self.with_header("content-type", "application/json")
            .with_body(value.to_string())
    }

    pub fn append_header(&mut self, name: &str, value: &str) {
        append_header(&mut self.headers, name, value);
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    /// Looks up a header by name, ignoring case
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}
