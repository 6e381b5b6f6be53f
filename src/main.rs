//! wavebox-core: mailbox state and context-menu core over MCP stdio
//!
//! This server owns the mailbox/service hierarchy of a multi-account
//! desktop web client and exposes it via the Model Context Protocol (MCP)
//! over stdio. State changes flow through namespaced reducers; content
//! surfaces get context menus built from the click context.
//!
//! # Architecture
//!
//! - [`main`]: Process entry point with env loading and stdio serving
//! - [`config`]: Environment-driven server and menu settings
//! - [`errors`]: Application error model with MCP error mapping
//! - [`mailbox`]: Mailbox, service and provider-profile data types
//! - [`reducers`]: Static reducer tables per provider and capability
//! - [`dispatch`]: Reducer chain resolution and action dispatch
//! - [`store`]: Authoritative mailbox store with change notification
//! - [`actions`]: Typed action creators over dispatch
//! - [`linker`]: External account identities and session partitions
//! - [`context_menu`]: Surface binding and context-menu construction
//! - [`headless`]: In-process collaborators that record side effects
//! - [`server`]: MCP tool handlers with validation and orchestration
//! - [`models`]: Input/output DTOs and schema-bearing types

mod actions;
mod config;
mod context_menu;
mod dispatch;
mod errors;
mod headless;
mod linker;
mod mailbox;
mod models;
mod reducers;
mod server;
mod store;

use config::ServerConfig;
use rmcp::ServiceExt;
use rmcp::transport::stdio;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Application entry point
///
/// Initializes tracing from environment, loads config, and serves the MCP
/// server over stdio. On exit the store snapshot is written back to the
/// state file, if one is configured.
///
/// # Environment Variables
///
/// See [`ServerConfig::load_from_env`] for full configuration options.
///
/// # Example
///
/// ```no_run
/// WAVEBOX_STATE_FILE=./wavebox-state.json \
/// WAVEBOX_SPELLCHECK_LANGUAGES=en,de \
/// cargo run
/// ```
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = ServerConfig::load_from_env()?;
    let server = server::WaveboxServer::new(config)?;
    let service = server.clone().serve(stdio()).await?;
    service.waiting().await?;

    server.shutdown().await;
    if let Err(e) = server.persist().await {
        warn!(error = %e, "failed to save state");
    }
    Ok(())
}
