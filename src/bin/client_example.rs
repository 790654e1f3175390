//! Example of coding against `ClientProtocol` instead of a concrete client
//!
//! Start the echo server first (`clientproto serve`), then run this binary.

use client_protocol::api::{ClientConfig, ClientError, ClientProtocol, HttpClientImpl};
use client_protocol::models::RequestOptions;
use futures::future::join_all;

/// Fetches a handful of paths concurrently through any conforming client
async fn fetch_all(client: &dyn ClientProtocol, paths: &[&str]) -> Vec<Result<u16, ClientError>> {
    let requests = paths.iter().map(|path| async move {
        client
            .safe_request_async("GET", path, RequestOptions::default())
            .await
            .map(|response| response.status)
    });
    join_all(requests).await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Create a client against the local echo server
    let config = ClientConfig::default().with_header("X-Example", "client_example");
    let client = HttpClientImpl::with_config(config)?;
    println!("ClientProtocol Example");
    println!("----------------------");
    println!("Base URL: {}", client.base_url());

    // Single request with query and JSON body
    println!("\nPosting to /echo/items...");
    let options = RequestOptions::new()
        .query("source", "example")
        .json(&serde_json::json!({"name": "widget"}))?;
    let response = client.safe_request_async("POST", "/echo/items", options).await?;
    println!("Status: {}", response.status);
    println!("Body: {}", response.text());

    // Several requests in flight at once
    println!("\nFetching several paths concurrently...");
    let paths = ["/health", "/echo/a", "/status/204", "/status/404"];
    for (path, outcome) in paths.iter().zip(fetch_all(&client, &paths).await) {
        match outcome {
            Ok(status) => println!("  {} -> {}", path, status),
            Err(e) => println!("  {} -> error: {}", path, e),
        }
    }

    println!("\nAll operations completed!");
    Ok(())
}
