//! Client trait definition
//!
//! This module defines the `ClientProtocol` trait that abstracts over different
//! HTTP client implementations.

use std::sync::Arc;

use super::ClientError;
use crate::models::{Headers, RequestOptions, Response};

/// The shape every HTTP client adapter exposes
///
/// Code that only needs "something that can issue HTTP requests" should take
/// a `&dyn ClientProtocol` (or a generic bound) rather than a concrete client.
///
/// A type has to provide all four members to conform:
///
/// ```compile_fail
/// use client_protocol::api::{ClientError, ClientProtocol};
/// use client_protocol::models::{Headers, RequestOptions, Response};
///
/// struct Incomplete;
///
/// #[async_trait::async_trait]
/// impl ClientProtocol for Incomplete {
///     fn base_url(&self) -> &str {
///         "http://localhost"
///     }
///
///     fn headers(&self) -> Headers {
///         Headers::new()
///     }
///
///     fn safe_request(
///         &self,
///         _method: &str,
///         _url: &str,
///         _options: RequestOptions,
///     ) -> Result<Response, ClientError> {
///         Ok(Response::new(200, "http://localhost"))
///     }
///
///     // safe_request_async is missing
/// }
/// ```
#[async_trait::async_trait]
pub trait ClientProtocol: Send + Sync {
    /// Root address relative request targets are resolved against
    fn base_url(&self) -> &str;

    /// Snapshot of the headers sent with every request
    fn headers(&self) -> Headers;

    /// Issue a request, blocking the calling thread until it completes
    fn safe_request(
        &self,
        method: &str,
        url: &str,
        options: RequestOptions,
    ) -> Result<Response, ClientError>;

    /// Issue a request without blocking the calling thread
    ///
    /// Dropping the returned future abandons the request; no response is
    /// delivered afterwards.
    async fn safe_request_async(
        &self,
        method: &str,
        url: &str,
        options: RequestOptions,
    ) -> Result<Response, ClientError>;
}

#[async_trait::async_trait]
impl<C> ClientProtocol for Arc<C>
where
    C: ClientProtocol + ?Sized,
{
    fn base_url(&self) -> &str {
        (**self).base_url()
    }

    fn headers(&self) -> Headers {
        (**self).headers()
    }

    fn safe_request(
        &self,
        method: &str,
        url: &str,
        options: RequestOptions,
    ) -> Result<Response, ClientError> {
        (**self).safe_request(method, url, options)
    }

    async fn safe_request_async(
        &self,
        method: &str,
        url: &str,
        options: RequestOptions,
    ) -> Result<Response, ClientError> {
        (**self).safe_request_async(method, url, options).await
    }
}
