//! Client module
//!
//! This module provides the `ClientProtocol` contract and the adapters that
//! satisfy it: a reqwest-backed HTTP client and an in-memory mock.

mod http;
mod mock;
mod trait_def;

// Re-export the trait and types
pub use http::{ClientConfig, ClientError, HttpClientImpl};
pub use mock::{MockClient, MockReply, RecordedCall};
pub use trait_def::ClientProtocol;
