//! Echo server module
//!
//! This module provides a small HTTP server that reflects requests back to
//! the caller. The CLI serves it for manual testing and the integration tests
//! run it on an ephemeral port to exercise real client adapters.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, Query},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::IntoResponse,
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Longest delay `/delay/:millis` will honour
pub const MAX_DELAY_MS: u64 = 30_000;

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub address: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: ([127, 0, 0, 1], 3000).into(),
        }
    }
}

/// What the echo routes send back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EchoResponse {
    pub method: String,
    pub path: String,
    pub query: Vec<(String, String)>,
    /// Lower-cased header names; repeated headers joined with `, `
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

/// Body returned by `/status/:code`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: u16,
}

/// Body returned by `/delay/:millis`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayResponse {
    pub delayed_ms: u64,
}

/// Builds the echo router
pub fn router() -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/echo", any(echo))
        .route("/echo/*path", any(echo))
        .route("/status/:code", any(status))
        .route("/delay/:millis", get(delay))
        .layer(TraceLayer::new_for_http())
}

/// Starts the echo server on the configured address
pub async fn serve(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("Starting echo server on {}", config.address);
    let listener = TcpListener::bind(config.address).await?;
    serve_on(listener).await?;
    Ok(())
}

/// Serves the echo router on an already bound listener
pub async fn serve_on(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, router()).await
}

async fn echo(
    method: Method,
    uri: Uri,
    Query(query): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<EchoResponse> {
    let mut collected: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in &headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        collected
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }

    Json(EchoResponse {
        method: method.to_string(),
        path: uri.path().to_string(),
        query,
        headers: collected,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

async fn status(Path(code): Path<u16>) -> impl IntoResponse {
    match StatusCode::from_u16(code) {
        Ok(status) if (200..600).contains(&code) => {
            (status, Json(StatusResponse { status: code })).into_response()
        }
        _ => (
            StatusCode::BAD_REQUEST,
            format!("unsupported status code {}", code),
        )
            .into_response(),
    }
}

async fn delay(Path(millis): Path<u64>) -> Json<DelayResponse> {
    let millis = millis.min(MAX_DELAY_MS);
    tokio::time::sleep(Duration::from_millis(millis)).await;
    Json(DelayResponse { delayed_ms: millis })
}
