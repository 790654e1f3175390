//! client-protocol library crate
//!
//! This library provides a single contract, [`ClientProtocol`], for objects
//! that can issue HTTP requests both blocking and asynchronously, together
//! with the adapters that satisfy it.

pub mod api;
pub mod cli;
pub mod models;

pub use api::{ClientConfig, ClientError, ClientProtocol, HttpClientImpl, MockClient};
pub use models::{Headers, Method, RequestOptions, Response};
