//! CLI module
//!
//! This module provides the command-line interface for issuing requests
//! through `ClientProtocol` and for running the echo server.

use std::io;
use std::time::Duration;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::Colorize;

use crate::{
    api::{serve, ClientConfig, ClientError, ClientProtocol, HttpClientImpl, ServerConfig},
    models::{RequestOptions, Response},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Base URL relative request targets are resolved against
    #[arg(
        short,
        long,
        global = true,
        env = "CLIENTPROTO_SERVER",
        default_value = "http://localhost:3000"
    )]
    server: String,

    /// Header sent with every request, as `Name: value` (repeatable)
    #[arg(short = 'H', long = "header", global = true, value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Default request timeout in seconds
    #[arg(long, global = true, env = "CLIENTPROTO_TIMEOUT")]
    timeout: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Issue a single HTTP request
    Request(RequestArgs),

    /// Start the echo server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 3000)]
        port: u16,
    },

    /// Generate shell completions
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug)]
struct RequestArgs {
    /// HTTP method (GET, POST, ...)
    method: String,

    /// Absolute URL, or a path relative to --server
    url: String,

    /// Query parameter as `key=value` (repeatable)
    #[arg(short, long = "query", value_parser = parse_query)]
    query: Vec<(String, String)>,

    /// Raw request body
    #[arg(short, long, conflicts_with = "json")]
    data: Option<String>,

    /// JSON request body
    #[arg(long)]
    json: Option<String>,

    /// Bearer token for the Authorization header
    #[arg(long)]
    bearer: Option<String>,

    /// Use the async operation instead of the blocking one
    #[arg(long = "async")]
    use_async: bool,

    /// Print 4xx/5xx responses instead of failing
    #[arg(long)]
    allow_error_status: bool,

    /// Print response headers
    #[arg(short, long)]
    include: bool,
}

/// Run the CLI application
pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    run_with(Cli::parse())
}

/// Run an already parsed command line
pub fn run_with(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match &cli.command {
        Commands::Request(args) => {
            let client = create_client(&cli)?;
            let options = build_options(args)?;
            let response = execute(&client, args, options)?;
            print_response(&response, args.include);
            Ok(())
        }

        Commands::Serve { port } => {
            println!("Starting echo server on port {}...", port);

            let config = ServerConfig {
                address: ([127, 0, 0, 1], *port).into(),
            };
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(serve(config))
        }

        Commands::Completions { shell } => {
            // Generate completions for the specified shell
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, bin_name, &mut io::stdout());
            Ok(())
        }
    }
}

fn create_client(cli: &Cli) -> Result<HttpClientImpl, ClientError> {
    let mut config = ClientConfig::default().with_base_url(cli.server.clone());
    for (name, value) in &cli.headers {
        config = config.with_header(name.clone(), value.clone());
    }
    if let Some(secs) = cli.timeout {
        config = config.with_timeout(Some(Duration::from_secs(secs)));
    }

    HttpClientImpl::with_config(config)
}

fn build_options(args: &RequestArgs) -> Result<RequestOptions, serde_json::Error> {
    let mut options = RequestOptions::new();
    for (key, value) in &args.query {
        options = options.query(key.clone(), value.clone());
    }
    if let Some(data) = &args.data {
        options = options.text(data.clone());
    }
    if let Some(json) = &args.json {
        let value: serde_json::Value = serde_json::from_str(json)?;
        options = options.json(&value)?;
    }
    if let Some(token) = &args.bearer {
        options = options.bearer_auth(token.clone());
    }
    if args.allow_error_status {
        options = options.allow_error_status();
    }
    Ok(options)
}

/// Issues the request through the contract, picking the operation by flag
fn execute(
    client: &dyn ClientProtocol,
    args: &RequestArgs,
    options: RequestOptions,
) -> Result<Response, ClientError> {
    if !args.use_async {
        return client.safe_request(&args.method, &args.url, options);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| ClientError::Internal(format!("failed to start async runtime: {}", e)))?;
    runtime.block_on(client.safe_request_async(&args.method, &args.url, options))
}

fn print_response(response: &Response, include: bool) {
    let status = response.status.to_string();
    let status = if response.is_success() {
        status.green().bold()
    } else if response.is_client_error() || response.is_server_error() {
        status.red().bold()
    } else {
        status.yellow().bold()
    };
    println!("{} {}", status, response.url.dimmed());

    if include {
        let mut names: Vec<&String> = response.headers.keys().collect();
        names.sort();
        for name in names {
            println!("{}: {}", name.cyan(), response.headers[name]);
        }
        println!();
    }

    let body = response.text();
    if !body.is_empty() {
        println!("{}", body);
    }
}

/// Parses `Name: value` (or `Name=value`) header arguments
fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .or_else(|| raw.split_once('='))
        .ok_or_else(|| format!("expected `Name: value`, got {:?}", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("header name is empty in {:?}", raw));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Parses `key=value` query arguments; a bare key gets an empty value
fn parse_query(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw.split_once('=').unwrap_or((raw, ""));
    if key.is_empty() {
        return Err(format!("query key is empty in {:?}", raw));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockClient;
    use crate::models::{Method, RequestBody};
    use pretty_assertions::assert_eq;

    fn request_args(cli: Cli) -> RequestArgs {
        match cli.command {
            Commands::Request(args) => args,
            other => panic!("expected request command, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("Accept: application/json").unwrap(),
            ("Accept".to_string(), "application/json".to_string())
        );
        assert_eq!(
            parse_header("X-Key=abc").unwrap(),
            ("X-Key".to_string(), "abc".to_string())
        );
        assert!(parse_header("novalue").is_err());
        assert!(parse_header(": value").is_err());
    }

    #[test]
    fn test_parse_query() {
        assert_eq!(
            parse_query("page=2").unwrap(),
            ("page".to_string(), "2".to_string())
        );
        assert_eq!(
            parse_query("flag").unwrap(),
            ("flag".to_string(), String::new())
        );
        assert_eq!(
            parse_query("q=a=b").unwrap(),
            ("q".to_string(), "a=b".to_string())
        );
        assert!(parse_query("=x").is_err());
    }

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from([
            "clientproto",
            "request",
            "post",
            "/items",
            "-s",
            "http://api.test",
            "-H",
            "X-Trace: t1",
            "--timeout",
            "5",
            "-q",
            "page=2",
            "--json",
            r#"{"name":"widget"}"#,
            "--async",
            "--include",
        ])
        .unwrap();

        assert_eq!(cli.server, "http://api.test");
        assert_eq!(cli.headers, vec![("X-Trace".to_string(), "t1".to_string())]);
        assert_eq!(cli.timeout, Some(5));

        let client = create_client(&cli).unwrap();
        assert_eq!(client.base_url(), "http://api.test");
        assert_eq!(client.config().timeout, Some(Duration::from_secs(5)));
        assert_eq!(client.headers().get("X-Trace").map(String::as_str), Some("t1"));

        let args = request_args(cli);
        assert_eq!(args.method, "post");
        assert_eq!(args.url, "/items");
        assert!(args.use_async);
        assert!(args.include);
    }

    #[test]
    fn test_data_conflicts_with_json() {
        let result = Cli::try_parse_from([
            "clientproto",
            "request",
            "POST",
            "/items",
            "--data",
            "x",
            "--json",
            "{}",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_build_options() {
        let cli = Cli::try_parse_from([
            "clientproto",
            "request",
            "POST",
            "/items",
            "-q",
            "a=1",
            "--json",
            r#"{"id": 3}"#,
            "--bearer",
            "tok",
            "--allow-error-status",
        ])
        .unwrap();
        let options = build_options(&request_args(cli)).unwrap();

        assert_eq!(options.query, vec![("a".to_string(), "1".to_string())]);
        assert_eq!(
            options.body,
            Some(RequestBody::Json(serde_json::json!({"id": 3})))
        );
        assert!(options.auth.is_some());
        assert!(!options.error_for_status);
    }

    #[test]
    fn test_build_options_rejects_bad_json() {
        let cli = Cli::try_parse_from(["clientproto", "request", "POST", "/", "--json", "{nope"])
            .unwrap();
        assert!(build_options(&request_args(cli)).is_err());
    }

    #[test]
    fn test_execute_uses_requested_operation() {
        let client = MockClient::new("http://api.test").unwrap();

        let blocking = Cli::try_parse_from(["clientproto", "request", "GET", "/a"]).unwrap();
        let args = request_args(blocking);
        execute(&client, &args, RequestOptions::default()).unwrap();

        let suspended =
            Cli::try_parse_from(["clientproto", "request", "GET", "/b", "--async"]).unwrap();
        let args = request_args(suspended);
        execute(&client, &args, RequestOptions::default()).unwrap();

        let calls = client.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].method, Method::Get);
        assert_eq!(calls[0].url, "http://api.test/a");
        assert!(calls[0].blocking);
        assert_eq!(calls[1].url, "http://api.test/b");
        assert!(!calls[1].blocking);
    }
}
