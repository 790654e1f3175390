//! API module
//!
//! This module provides the client contract, its adapters and the echo
//! server used to exercise them.

pub mod client;
pub mod server;

// Re-export commonly used types
pub use client::{
    ClientConfig, ClientError, ClientProtocol, HttpClientImpl, MockClient, MockReply, RecordedCall,
};
pub use server::{serve, serve_on, ServerConfig};
