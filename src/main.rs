//! mail-draft-mcp-rs: mail sending and reply drafting over MCP
//!
//! This server exposes four tools to an MCP host: send an email, list unread
//! emails, save template reply drafts, and save AI-generated reply drafts that
//! take the conversation thread into account.
//!
//! # Architecture
//!
//! - [`main`]: Process entry point with env loading, CLI, and transport setup
//! - [`config`]: Environment-driven credentials and server settings
//! - [`errors`]: Application error model and text outcome mapping
//! - [`imap`]: Mail store seam and its IMAP implementation
//! - [`mime`]: Raw message decoding into a normalized view
//! - [`thread`]: Conversation reconstruction from `References`
//! - [`compose`]: Reply drafts, prompt rendering, and RFC 5322 output
//! - [`llm`]: Completion service seam and Anthropic client
//! - [`smtp`]: One-shot SMTP submission
//! - [`drafts`]: Unread listing and draft batch orchestration
//! - [`models`]: Tool input DTOs
//! - [`server`]: MCP tool handlers

mod compose;
mod config;
mod drafts;
mod errors;
mod imap;
mod llm;
mod mime;
mod models;
mod server;
mod smtp;
mod thread;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use config::ServerConfig;
use rmcp::ServiceExt;
use rmcp::transport::stdio;
use rmcp::transport::streamable_http_server::{
    StreamableHttpServerConfig, StreamableHttpService, session::local::LocalSessionManager,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Transport the MCP service is served over
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    /// Newline-delimited JSON-RPC on stdin/stdout
    Stdio,
    /// Streamable HTTP at `/mcp`
    Http,
}

#[derive(Debug, Parser)]
#[command(
    version,
    about = "MCP server for sending mail and drafting threaded replies"
)]
struct Cli {
    /// Transport to serve
    #[arg(long, value_enum, default_value_t = Transport::Stdio)]
    transport: Transport,
    /// Listen address for the HTTP transport
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: SocketAddr,
}

/// Application entry point
///
/// Initializes tracing from environment (written to stderr so stdout stays
/// reserved for the protocol), loads config, and serves the MCP server.
///
/// # Example
///
/// ```no_run
/// GMAIL_USER=user@gmail.com \
/// GMAIL_APP_PASSWORD=app-password \
/// ANTHROPIC_API_KEY=sk-ant-... \
/// cargo run
/// ```
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ServerConfig::load_from_env()?;
    let server = server::MailDraftServer::new(config);

    match cli.transport {
        Transport::Stdio => {
            let service = server.serve(stdio()).await?;
            service.waiting().await?;
        }
        Transport::Http => {
            let service = StreamableHttpService::new(
                move || Ok(server.clone()),
                Arc::new(LocalSessionManager::default()),
                StreamableHttpServerConfig::default(),
            );
            let router = axum::Router::new().nest_service("/mcp", service);
            let listener = tokio::net::TcpListener::bind(cli.bind).await?;
            info!(addr = %cli.bind, "serving MCP over streamable HTTP at /mcp");
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await?;
        }
    }
    Ok(())
}
