use std::sync::Arc;

use serde_json::json;
use tokio::sync::Mutex;

use lookout_core::mcp_server::{JsonRpcHandler, McpServer};

async fn handler() -> JsonRpcHandler {
    let registry = lookout_core::build_registry_enabled_only().await;
    let registry = Arc::new(Mutex::new(registry));
    JsonRpcHandler::new(McpServer::new(registry))
}

#[tokio::test]
async fn test_default_registry_has_all_connectors() {
    let registry = lookout_core::build_registry_enabled_only().await;
    for name in ["outlook_mail", "outlook_calendar", "outlook_contacts"] {
        assert!(
            registry.get_provider(name).is_some(),
            "missing connector {}",
            name
        );
    }
}

#[tokio::test]
async fn test_tools_list_prefixes_connector_names() {
    let handler = handler().await;
    let response = handler
        .handle_request(json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}))
        .await;

    let tools = response["result"]["tools"]
        .as_array()
        .expect("tools array");
    // 16 mail + 4 calendar + 3 contacts
    assert_eq!(tools.len(), 23);

    let names: Vec<&str> = tools
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"outlook_mail/send_email"));
    assert!(names.contains(&"outlook_calendar/create_event"));
    assert!(names.contains(&"outlook_contacts/search_contacts"));
    for name in &names {
        assert!(
            name.splitn(2, '/').count() == 2,
            "unprefixed tool {}",
            name
        );
    }
}

#[tokio::test]
async fn test_call_tool_requires_prefixed_name() {
    let handler = handler().await;
    let response = handler
        .handle_request(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": {"name": "send_email", "arguments": {}}
        }))
        .await;
    assert_eq!(response["error"]["code"], json!(-32602));
}

#[tokio::test]
async fn test_call_tool_unknown_connector() {
    let handler = handler().await;
    let response = handler
        .handle_request(json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tools/call",
            "params": {"name": "carrier_pigeon/send", "arguments": {}}
        }))
        .await;
    assert_eq!(response["error"]["code"], json!(-32602));
}

#[tokio::test]
async fn test_call_tool_validation_error_is_invalid_params() {
    let handler = handler().await;
    // Missing required fields must surface as -32602, not an internal error
    let response = handler
        .handle_request(json!({
            "jsonrpc": "2.0",
            "id": 4,
            "method": "tools/call",
            "params": {"name": "outlook_mail/send_email", "arguments": {"subject": "hi"}}
        }))
        .await;
    assert_eq!(response["error"]["code"], json!(-32602));
    let message = response["error"]["message"].as_str().unwrap();
    assert!(message.contains("to"));
    assert!(message.contains("body"));
}

#[tokio::test]
async fn test_unknown_method() {
    let handler = handler().await;
    let response = handler
        .handle_request(json!({"jsonrpc": "2.0", "id": 5, "method": "emails/teleport"}))
        .await;
    assert_eq!(response["error"]["code"], json!(-32601));
    assert_eq!(response["id"], json!(5));
}

#[tokio::test]
async fn test_prompts_and_resources_empty() {
    let handler = handler().await;
    let prompts = handler
        .handle_request(json!({"jsonrpc": "2.0", "id": 6, "method": "prompts/list"}))
        .await;
    assert_eq!(prompts["result"]["prompts"], json!([]));

    let resources = handler
        .handle_request(json!({"jsonrpc": "2.0", "id": 7, "method": "resources/list"}))
        .await;
    assert_eq!(resources["result"]["resources"], json!([]));
}
