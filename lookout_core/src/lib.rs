// src/lib.rs
pub mod connectors;
pub mod error;
pub mod mcp_server;
pub mod transport;
pub mod utils;

use std::collections::HashMap;
use std::sync::Arc;

// Re-export types from rmcp that users of this library might need
pub use rmcp::model::{
    Annotated, CallToolRequestParam, CallToolResult, Content, Implementation,
    InitializeRequestParam, InitializeResult, IntoContents, ListPromptsResult, ListResourcesResult,
    ListToolsResult, PaginatedRequestParam, Prompt, ProtocolVersion, RawContent, RawResource,
    ReadResourceRequestParam, Resource, ResourceContents, ServerCapabilities, TextContent, Tool,
};

use crate::error::ConnectorError;
use async_trait::async_trait;

#[async_trait]
pub trait Connector: Send + Sync {
    /// Returns the unique name of the connector (acting as the MCP server name).
    fn name(&self) -> &'static str;

    /// Returns a description of the connector.
    fn description(&self) -> &'static str;

    /// Returns the MCP capabilities of this connector.
    async fn capabilities(&self) -> ServerCapabilities;

    // --- MCP Request Handlers (one for each relevant MCP request type) ---
    async fn initialize(
        &self,
        request: InitializeRequestParam,
    ) -> Result<InitializeResult, ConnectorError>;
    async fn list_resources(
        &self,
        request: Option<PaginatedRequestParam>,
    ) -> Result<ListResourcesResult, ConnectorError>;
    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
    ) -> Result<Vec<ResourceContents>, ConnectorError>;
    async fn list_tools(
        &self,
        request: Option<PaginatedRequestParam>,
    ) -> Result<ListToolsResult, ConnectorError>;
    async fn call_tool(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, ConnectorError>;
    async fn list_prompts(
        &self,
        request: Option<PaginatedRequestParam>,
    ) -> Result<ListPromptsResult, ConnectorError>;
    async fn get_prompt(&self, name: &str) -> Result<Prompt, ConnectorError>;
}

/// Registry of connectors keyed by connector name.
///
/// Each connector sits behind its own `tokio::sync::Mutex`. Outlook is a
/// stateful singleton application that must not be driven concurrently, so a
/// tool invocation holds its connector's lock for the whole script round trip.
pub struct ProviderRegistry {
    pub providers: HashMap<String, Arc<tokio::sync::Mutex<Box<dyn Connector>>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        ProviderRegistry {
            providers: HashMap::new(),
        }
    }

    pub fn register_provider(&mut self, provider: Box<dyn Connector>) {
        self.providers.insert(
            provider.name().to_string(),
            Arc::new(tokio::sync::Mutex::new(provider)),
        );
    }

    pub fn get_provider(&self, name: &str) -> Option<&Arc<tokio::sync::Mutex<Box<dyn Connector>>>> {
        self.providers.get(name)
    }

    pub fn list_providers(&self) -> Vec<ServerInfo> {
        self.providers
            .iter()
            .map(|(name, connector)| {
                if let Ok(c) = connector.try_lock() {
                    ServerInfo {
                        name: name.clone(),
                        description: c.description().to_string(),
                    }
                } else {
                    ServerInfo {
                        name: name.clone(),
                        description: String::new(),
                    }
                }
            })
            .collect()
    }

    pub async fn get_provider_tools(&self) -> Vec<Tool> {
        let mut all_tools = Vec::new();
        for provider in self.providers.values() {
            let c = provider.lock().await;
            if let Ok(response) = c.list_tools(None).await {
                all_tools.extend(response.tools);
            }
        }
        all_tools
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a registry that registers only connectors enabled via Cargo features.
/// Downstream apps depend on a minimal feature set and get a ready-to-use
/// registry without manually wiring each connector.
pub async fn build_registry_enabled_only() -> ProviderRegistry {
    #[allow(unused_mut)]
    let mut registry = ProviderRegistry::new();

    #[cfg(feature = "outlook-mail")]
    {
        let connector = connectors::outlook_mail::OutlookMailConnector::new();
        registry.register_provider(Box::new(connector));
    }

    #[cfg(feature = "outlook-calendar")]
    {
        let connector = connectors::outlook_calendar::OutlookCalendarConnector::new();
        registry.register_provider(Box::new(connector));
    }

    #[cfg(feature = "outlook-contacts")]
    {
        let connector = connectors::outlook_contacts::OutlookContactsConnector::new();
        registry.register_provider(Box::new(connector));
    }

    registry
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub description: String,
}
