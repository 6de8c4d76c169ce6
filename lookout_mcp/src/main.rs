use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use lookout_core::{
    mcp_server::{JsonRpcHandler, McpServer},
    transport::StdioTransport,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr; stdout carries only JSON-RPC frames
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    info!("Starting Lookout MCP Server");

    // Registry with only feature-enabled connectors
    let registry = lookout_core::build_registry_enabled_only().await;
    let registry = Arc::new(Mutex::new(registry));

    let server = McpServer::new(registry);
    let handler = JsonRpcHandler::new(server);
    let transport = StdioTransport::new(handler);

    info!("MCP Server ready, listening on stdio");

    if let Err(e) = transport.run().await {
        error!("Transport error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
