use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::{ConnectorError, ProviderRegistry};
use rmcp::model::*;

/// MCP Server implementation that wraps the ProviderRegistry
pub struct McpServer {
    registry: Arc<Mutex<ProviderRegistry>>,
}

impl McpServer {
    pub fn new(registry: Arc<Mutex<ProviderRegistry>>) -> Self {
        Self { registry }
    }

    /// Get aggregated capabilities from all connectors
    pub async fn get_capabilities(&self) -> ServerCapabilities {
        let registry = self.registry.lock().await;
        let mut capabilities = ServerCapabilities::default();

        for (_name, connector) in registry.providers.iter() {
            let conn = connector.lock().await;
            let conn_caps = conn.capabilities().await;
            if conn_caps.tools.is_some() {
                capabilities.tools = conn_caps.tools;
            }
            if conn_caps.resources.is_some() {
                capabilities.resources = conn_caps.resources;
            }
            if conn_caps.prompts.is_some() {
                capabilities.prompts = conn_caps.prompts;
            }
        }

        capabilities
    }

    /// Handle initialize request
    pub async fn handle_initialize(
        &self,
        _request: InitializeRequestParam,
    ) -> Result<InitializeResult, ConnectorError> {
        info!("MCP Server initializing");

        Ok(InitializeResult {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: self.get_capabilities().await,
            server_info: Implementation {
                name: "lookout".to_string(),
                title: None,
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Microsoft Outlook automation server for macOS. Exposes mail, calendar, and \
                 contacts tools backed by the local Outlook application. Outlook must be \
                 installed; it is launched on first use if necessary."
                    .to_string(),
            ),
        })
    }

    /// Handle list_resources request - aggregates from all connectors
    pub async fn handle_list_resources(
        &self,
        request: Option<PaginatedRequestParam>,
    ) -> Result<ListResourcesResult, ConnectorError> {
        let registry = self.registry.lock().await;
        let mut all_resources = Vec::new();

        for (_name, connector) in registry.providers.iter() {
            let c = connector.lock().await;
            match c.list_resources(request.clone()).await {
                Ok(response) => {
                    all_resources.extend(response.resources);
                }
                Err(e) => {
                    error!("Error listing resources from connector: {:?}", e);
                }
            }
        }

        Ok(ListResourcesResult {
            resources: all_resources,
            next_cursor: None,
        })
    }

    /// Handle read_resource request - routes to appropriate connector
    pub async fn handle_read_resource(
        &self,
        request: ReadResourceRequestParam,
    ) -> Result<Vec<ResourceContents>, ConnectorError> {
        let registry = self.registry.lock().await;

        // Try each connector until one handles the resource
        for (_name, connector) in registry.providers.iter() {
            let c = connector.lock().await;
            match c.read_resource(request.clone()).await {
                Ok(contents) => return Ok(contents),
                Err(ConnectorError::ResourceNotFound) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(ConnectorError::ResourceNotFound)
    }

    /// Handle list_tools request - aggregates from all connectors
    pub async fn handle_list_tools(
        &self,
        request: Option<PaginatedRequestParam>,
    ) -> Result<ListToolsResult, ConnectorError> {
        let registry = self.registry.lock().await;
        let mut all_tools = Vec::new();

        for (connector_name, connector) in registry.providers.iter() {
            let c = connector.lock().await;
            match c.list_tools(request.clone()).await {
                Ok(response) => {
                    // Prefix tool names with connector name to avoid conflicts
                    let prefixed_tools: Vec<Tool> = response
                        .tools
                        .into_iter()
                        .map(|mut tool| {
                            tool.name = format!("{}/{}", connector_name, tool.name).into();
                            tool
                        })
                        .collect();
                    all_tools.extend(prefixed_tools);
                }
                Err(e) => {
                    error!(
                        "Error listing tools from connector {}: {:?}",
                        connector_name, e
                    );
                }
            }
        }

        Ok(ListToolsResult {
            tools: all_tools,
            next_cursor: None,
        })
    }

    /// Handle call_tool request - routes to appropriate connector
    pub async fn handle_call_tool(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, ConnectorError> {
        // Parse connector name from tool name (format: "connector/tool")
        let parts: Vec<&str> = request.name.split('/').collect();
        if parts.len() != 2 {
            return Err(ConnectorError::InvalidInput(format!(
                "Tool name must be in format 'connector/tool', got: {}",
                request.name
            )));
        }

        let connector_name = parts[0];
        let tool_name = parts[1];

        let registry = self.registry.lock().await;

        if let Some(connector) = registry.providers.get(connector_name) {
            // Create a new request with the unprefixed tool name
            let unprefixed_request = CallToolRequestParam {
                name: tool_name.to_string().into(),
                arguments: request.arguments,
            };

            let c = connector.lock().await;
            c.call_tool(unprefixed_request).await
        } else {
            Err(ConnectorError::InvalidInput(format!(
                "Unknown connector: {}",
                connector_name
            )))
        }
    }

    /// Handle list_prompts request - aggregates from all connectors
    pub async fn handle_list_prompts(
        &self,
        request: Option<PaginatedRequestParam>,
    ) -> Result<ListPromptsResult, ConnectorError> {
        let registry = self.registry.lock().await;
        let mut all_prompts = Vec::new();

        for (connector_name, connector) in registry.providers.iter() {
            let c = connector.lock().await;
            match c.list_prompts(request.clone()).await {
                Ok(response) => {
                    let prefixed_prompts: Vec<Prompt> = response
                        .prompts
                        .into_iter()
                        .map(|mut prompt| {
                            prompt.name = format!("{}/{}", connector_name, prompt.name);
                            prompt
                        })
                        .collect();
                    all_prompts.extend(prefixed_prompts);
                }
                Err(e) => {
                    error!(
                        "Error listing prompts from connector {}: {:?}",
                        connector_name, e
                    );
                }
            }
        }

        Ok(ListPromptsResult {
            prompts: all_prompts,
            next_cursor: None,
        })
    }

    /// Handle get_prompt request - routes to appropriate connector
    pub async fn handle_get_prompt(&self, name: &str) -> Result<Prompt, ConnectorError> {
        let parts: Vec<&str> = name.split('/').collect();
        if parts.len() != 2 {
            return Err(ConnectorError::InvalidInput(format!(
                "Prompt name must be in format 'connector/prompt', got: {}",
                name
            )));
        }

        let connector_name = parts[0];
        let prompt_name = parts[1];

        let registry = self.registry.lock().await;

        if let Some(connector) = registry.providers.get(connector_name) {
            let c = connector.lock().await;
            let mut prompt = c.get_prompt(prompt_name).await?;
            // Re-prefix the name in the response
            prompt.name = name.to_string();
            Ok(prompt)
        } else {
            Err(ConnectorError::InvalidInput(format!(
                "Unknown connector: {}",
                connector_name
            )))
        }
    }
}

/// JSON-RPC message handler for the MCP server
pub struct JsonRpcHandler {
    server: McpServer,
}

impl JsonRpcHandler {
    pub fn new(server: McpServer) -> Self {
        Self { server }
    }

    /// Process a JSON-RPC request and return a response
    pub async fn handle_request(&self, request: Value) -> Value {
        debug!("Handling JSON-RPC request: {:?}", request);

        let id = request.get("id").cloned();
        let method = request.get("method").and_then(|m| m.as_str()).unwrap_or("");
        let params = request.get("params").cloned().unwrap_or(json!({}));

        let result = match method {
            "initialize" => match serde_json::from_value::<InitializeRequestParam>(params) {
                Ok(req) => self
                    .server
                    .handle_initialize(req)
                    .await
                    .and_then(|r| serde_json::to_value(r).map_err(ConnectorError::SerdeJson))
                    .map_err(|e| e.to_jsonrpc_error()),
                Err(e) => Err(ConnectorError::SerdeJson(e).to_jsonrpc_error()),
            },
            "resources/list" => {
                match serde_json::from_value::<Option<PaginatedRequestParam>>(params) {
                    Ok(req) => self
                        .server
                        .handle_list_resources(req)
                        .await
                        .and_then(|r| serde_json::to_value(r).map_err(ConnectorError::SerdeJson))
                        .map_err(|e| e.to_jsonrpc_error()),
                    Err(e) => Err(ConnectorError::SerdeJson(e).to_jsonrpc_error()),
                }
            }
            "resources/read" => match serde_json::from_value::<ReadResourceRequestParam>(params) {
                Ok(req) => self
                    .server
                    .handle_read_resource(req)
                    .await
                    .and_then(|r| serde_json::to_value(r).map_err(ConnectorError::SerdeJson))
                    .map_err(|e| e.to_jsonrpc_error()),
                Err(e) => Err(ConnectorError::SerdeJson(e).to_jsonrpc_error()),
            },
            "tools/list" => match serde_json::from_value::<Option<PaginatedRequestParam>>(params) {
                Ok(req) => self
                    .server
                    .handle_list_tools(req)
                    .await
                    .and_then(|r| serde_json::to_value(r).map_err(ConnectorError::SerdeJson))
                    .map_err(|e| e.to_jsonrpc_error()),
                Err(e) => Err(ConnectorError::SerdeJson(e).to_jsonrpc_error()),
            },
            "tools/call" => match serde_json::from_value::<CallToolRequestParam>(params) {
                Ok(req) => self
                    .server
                    .handle_call_tool(req)
                    .await
                    .and_then(|r| serde_json::to_value(r).map_err(ConnectorError::SerdeJson))
                    .map_err(|e| e.to_jsonrpc_error()),
                Err(e) => Err(ConnectorError::SerdeJson(e).to_jsonrpc_error()),
            },
            "prompts/list" => {
                match serde_json::from_value::<Option<PaginatedRequestParam>>(params) {
                    Ok(req) => self
                        .server
                        .handle_list_prompts(req)
                        .await
                        .and_then(|r| serde_json::to_value(r).map_err(ConnectorError::SerdeJson))
                        .map_err(|e| e.to_jsonrpc_error()),
                    Err(e) => Err(ConnectorError::SerdeJson(e).to_jsonrpc_error()),
                }
            }
            "prompts/get" => match params.get("name").and_then(|n| n.as_str()) {
                Some(name) => self
                    .server
                    .handle_get_prompt(name)
                    .await
                    .and_then(|r| serde_json::to_value(r).map_err(ConnectorError::SerdeJson))
                    .map_err(|e| e.to_jsonrpc_error()),
                None => Err(
                    ConnectorError::InvalidInput("Missing 'name' parameter".to_string())
                        .to_jsonrpc_error(),
                ),
            },
            _ => Err(ConnectorError::MethodNotFound.to_jsonrpc_error()),
        };

        match result {
            Ok(result) => json!({
                "jsonrpc": "2.0",
                "result": result,
                "id": id,
            }),
            Err(error) => json!({
                "jsonrpc": "2.0",
                "error": error,
                "id": id,
            }),
        }
    }
}
