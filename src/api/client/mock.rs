//! In-memory client implementation
//!
//! This module provides a client that satisfies `ClientProtocol` without any
//! network access. It answers from a table of canned replies and records
//! every completed call, which makes it the default stand-in for tests of
//! code written against the trait.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::{ClientError, ClientProtocol};
use crate::models::{self, Headers, Method, RequestBody, RequestOptions, Response};

/// What a mocked route answers with
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Deliver this response; its `url` is replaced by the resolved call URL
    Respond(Response),
    /// Fail as if the exchange timed out
    Timeout,
    /// Fail as if the transport broke
    Fail(String),
}

/// A call the mock has answered
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: Method,
    /// Resolved URL including the query string
    pub url: String,
    /// Client headers merged with the per-call ones
    pub headers: Headers,
    pub body: Option<RequestBody>,
    pub blocking: bool,
}

#[derive(Debug, Clone)]
struct MockRoute {
    method: Method,
    /// Resolved target without query or fragment
    key: String,
    reply: MockReply,
}

/// A client implementation that answers from canned replies
#[derive(Debug, Clone)]
pub struct MockClient {
    base_url: String,
    headers: Headers,
    routes: Vec<MockRoute>,
    fallback: Option<Response>,
    latency: Option<Duration>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl MockClient {
    /// Create a mock whose unmatched calls get an empty 200 response
    ///
    /// The base URL follows the same rules as `ClientConfig::validate`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let base_url = base_url.into();
        models::validate_base_url(&base_url)
            .map_err(|e| ClientError::Config(format!("base_url: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim().to_string(),
            headers: Headers::new(),
            routes: Vec::new(),
            fallback: Some(Response::new(200, "")),
            latency: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        models::insert_header(&mut self.headers, name.into(), value.into());
        self
    }

    /// Answer `method url` with `response`; later routes shadow earlier ones
    pub fn with_route(
        self,
        method: Method,
        url: impl AsRef<str>,
        response: Response,
    ) -> Result<Self, ClientError> {
        self.with_reply(method, url, MockReply::Respond(response))
    }

    /// Fails if `url` cannot be resolved against the base URL
    pub fn with_reply(
        mut self,
        method: Method,
        url: impl AsRef<str>,
        reply: MockReply,
    ) -> Result<Self, ClientError> {
        let url = url.as_ref();
        let target = models::resolve_url(&self.base_url, url)
            .map_err(|e| ClientError::Config(format!("route {} {}: {}", method, url, e)))?;
        self.routes.push(MockRoute {
            method,
            key: without_query(&target),
            reply,
        });
        Ok(self)
    }

    /// Replace the response given to unmatched calls
    pub fn with_fallback(mut self, response: Response) -> Self {
        self.fallback = Some(response);
        self
    }

    /// Unmatched calls fail with `ClientError::NoRoute`
    pub fn strict(mut self) -> Self {
        self.fallback = None;
        self
    }

    /// Delay every answer, simulating a slow server
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Calls answered so far, in completion order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear_calls(&self) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn prepare(&self, method: &str, url: &str, options: &RequestOptions) -> Result<Prepared, ClientError> {
        let method: Method = method.parse()?;
        let mut resolved = models::resolve_url(&self.base_url, url)?;
        let route_key = without_query(&resolved);
        if !options.query.is_empty() {
            resolved.query_pairs_mut().extend_pairs(&options.query);
        }

        let reply = self
            .routes
            .iter()
            .rev()
            .find(|route| route.method == method && route.key == route_key)
            .map(|route| route.reply.clone())
            .or_else(|| self.fallback.clone().map(MockReply::Respond));

        Ok(Prepared {
            call: RecordedCall {
                method,
                url: resolved.to_string(),
                headers: options.merged_headers(&self.headers),
                body: options.body.clone(),
                blocking: false,
            },
            reply,
        })
    }

    fn answer(&self, prepared: Prepared, options: &RequestOptions) -> Result<Response, ClientError> {
        let Prepared { call, reply } = prepared;
        tracing::debug!(method = %call.method, url = %call.url, "mock answering request");

        let outcome = match reply {
            Some(MockReply::Respond(response)) => {
                let response = Response {
                    url: call.url.clone(),
                    ..response
                };
                if options.error_for_status && (response.is_client_error() || response.is_server_error()) {
                    Err(ClientError::Status {
                        status: response.status,
                        body: response.text(),
                    })
                } else {
                    Ok(response)
                }
            }
            Some(MockReply::Timeout) => Err(ClientError::Timeout(format!(
                "mocked timeout for {} {}",
                call.method, call.url
            ))),
            Some(MockReply::Fail(reason)) => Err(ClientError::Internal(reason)),
            None => Err(ClientError::NoRoute {
                method: call.method.to_string(),
                url: call.url.clone(),
            }),
        };

        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
        outcome
    }
}

struct Prepared {
    call: RecordedCall,
    reply: Option<MockReply>,
}

fn without_query(url: &reqwest::Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.to_string()
}

#[async_trait::async_trait]
impl ClientProtocol for MockClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn headers(&self) -> Headers {
        self.headers.clone()
    }

    fn safe_request(
        &self,
        method: &str,
        url: &str,
        options: RequestOptions,
    ) -> Result<Response, ClientError> {
        let mut prepared = self.prepare(method, url, &options)?;
        prepared.call.blocking = true;
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }
        self.answer(prepared, &options)
    }

    async fn safe_request_async(
        &self,
        method: &str,
        url: &str,
        options: RequestOptions,
    ) -> Result<Response, ClientError> {
        let prepared = self.prepare(method, url, &options)?;
        // A dropped future never reaches `answer`, so nothing is recorded
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.answer(prepared, &options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RequestError;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_route_match_and_recording() {
        let client = MockClient::new("http://api.test/")
            .unwrap()
            .with_header("Authorization", "Bearer abc")
            .with_route(
                Method::Get,
                "/items",
                Response::new(200, "").with_json(&json!([{"id": 1}])),
            )
            .unwrap();

        let response = client
            .safe_request(
                "get",
                "items",
                RequestOptions::new().query("page", "2").header("X-Trace", "t1"),
            )
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.url, "http://api.test/items?page=2");
        let items: serde_json::Value = response.json().unwrap();
        assert_eq!(items[0]["id"], 1);

        let calls = client.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, Method::Get);
        assert_eq!(calls[0].url, "http://api.test/items?page=2");
        assert!(calls[0].blocking);
        assert_eq!(
            calls[0].headers.get("Authorization").map(String::as_str),
            Some("Bearer abc")
        );
        assert_eq!(calls[0].headers.get("X-Trace").map(String::as_str), Some("t1"));
    }

    #[test]
    fn test_method_must_match() {
        let client = MockClient::new("http://api.test")
            .unwrap()
            .strict()
            .with_route(Method::Post, "/items", Response::new(201, ""))
            .unwrap();

        let err = client
            .safe_request("GET", "/items", RequestOptions::default())
            .unwrap_err();
        match err {
            ClientError::NoRoute { method, url } => {
                assert_eq!(method, "GET");
                assert_eq!(url, "http://api.test/items");
            }
            other => panic!("unexpected error: {other}"),
        }

        let created = client
            .safe_request("POST", "/items", RequestOptions::new().text("hello"))
            .unwrap();
        assert_eq!(created.status, 201);
        assert_eq!(client.calls().len(), 2);
        assert_eq!(
            client.calls()[1].body,
            Some(RequestBody::Text("hello".to_string()))
        );
    }

    #[test]
    fn test_later_routes_shadow_earlier_ones() {
        let client = MockClient::new("http://api.test")
            .unwrap()
            .with_route(Method::Get, "/flag", Response::new(200, "").with_body("old"))
            .unwrap()
            .with_route(Method::Get, "http://api.test/flag", Response::new(200, "").with_body("new"))
            .unwrap();

        let response = client
            .safe_request("GET", "/flag", RequestOptions::default())
            .unwrap();
        assert_eq!(response.text(), "new");
    }

    #[test]
    fn test_error_status_handling() {
        let client = MockClient::new("http://api.test").unwrap().with_route(
            Method::Delete,
            "/items/9",
            Response::new(404, "").with_body("missing"),
        )
        .unwrap();

        let err = client
            .safe_request("DELETE", "/items/9", RequestOptions::default())
            .unwrap_err();
        assert_eq!(err.status(), Some(404));

        let response = client
            .safe_request("DELETE", "/items/9", RequestOptions::new().allow_error_status())
            .unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(response.text(), "missing");
    }

    #[test]
    fn test_failure_replies() {
        let client = MockClient::new("http://api.test")
            .unwrap()
            .with_reply(Method::Get, "/slow", MockReply::Timeout)
            .unwrap()
            .with_reply(Method::Get, "/broken", MockReply::Fail("connection reset".to_string()))
            .unwrap();

        let err = client
            .safe_request("GET", "/slow", RequestOptions::default())
            .unwrap_err();
        assert!(matches!(err, ClientError::Timeout(_)));
        assert!(err.is_retryable());

        let err = client
            .safe_request("GET", "/broken", RequestOptions::default())
            .unwrap_err();
        assert!(matches!(err, ClientError::Internal(ref msg) if msg == "connection reset"));
    }

    #[test]
    fn test_invalid_calls_are_not_recorded() {
        let client = MockClient::new("http://api.test").unwrap();
        let err = client
            .safe_request("GET", "", RequestOptions::default())
            .unwrap_err();
        assert!(matches!(err, ClientError::Request(RequestError::EmptyUrl)));
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_async_matches_blocking_response() {
        let client = MockClient::new("https://example.test").unwrap().with_route(
            Method::Get,
            "/resource",
            Response::new(200, "").with_body("payload"),
        )
        .unwrap();

        let blocking = tokio::task::spawn_blocking({
            let client = client.clone();
            move || client.safe_request("GET", "/resource", RequestOptions::default())
        })
        .await
        .unwrap()
        .unwrap();
        let suspended = client
            .safe_request_async("GET", "/resource", RequestOptions::default())
            .await
            .unwrap();

        assert_eq!(blocking, suspended);

        let calls = client.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].blocking);
        assert!(!calls[1].blocking);
    }

    #[tokio::test]
    async fn test_dropped_future_delivers_nothing() {
        let client = MockClient::new("http://api.test")
            .unwrap()
            .with_latency(Duration::from_millis(500));

        let outcome = tokio::time::timeout(
            Duration::from_millis(20),
            client.safe_request_async("GET", "/slow", RequestOptions::default()),
        )
        .await;

        assert!(outcome.is_err());
        assert!(client.calls().is_empty());
    }

    #[test]
    fn test_base_url_is_validated() {
        for bad in ["", "   ", "localhost:3000", "not a url"] {
            assert!(
                matches!(MockClient::new(bad), Err(ClientError::Config(_))),
                "{bad:?} should be rejected"
            );
        }

        let client = MockClient::new(" http://api.test ").unwrap();
        assert_eq!(client.base_url(), "http://api.test");
    }

    #[test]
    fn test_route_targets_are_checked_at_setup() {
        let err = MockClient::new("http://api.test")
            .unwrap()
            .with_route(Method::Get, "http://", Response::new(200, ""))
            .unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn test_relative_target_with_url_in_query() {
        let client = MockClient::new("http://api.test")
            .unwrap()
            .strict()
            .with_route(Method::Get, "/login", Response::new(200, "").with_body("login"))
            .unwrap();

        let response = client
            .safe_request("GET", "/login?next=http://other.test/x", RequestOptions::default())
            .unwrap();
        assert_eq!(response.text(), "login");
        assert_eq!(response.url, "http://api.test/login?next=http://other.test/x");
    }

    #[test]
    fn test_clear_calls() {
        let client = MockClient::new("http://api.test").unwrap();
        client
            .safe_request("GET", "/", RequestOptions::default())
            .unwrap();
        assert_eq!(client.calls().len(), 1);
        client.clear_calls();
        assert!(client.calls().is_empty());
    }
}
