//! satchel entry point.
//!
//! Boots the offline cache agent from layered configuration and serves its
//! events as MCP tools on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use satchel_client::{FetchClient, FetchConfig};
use satchel_core::{CacheDb, WorkerConfig};
use satchel_worker::{InMemoryPlatform, ServiceWorker};
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = WorkerConfig::load()?;
    tracing::info!(
        version = %config.cache_version(),
        origin = %config.origin,
        db = %config.db_path.display(),
        "Starting satchel on stdio transport"
    );

    let store = CacheDb::open(&config.db_path).await?;
    let network = Arc::new(FetchClient::new(FetchConfig::from(&config))?);
    let platform = Arc::new(InMemoryPlatform::new());
    let worker = ServiceWorker::new(config, store, network, platform)?;

    let handler = handler::SatchelServer::new(Arc::new(worker));
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}
