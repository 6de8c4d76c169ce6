// src/error.rs
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Resource not found")]
    ResourceNotFound,

    #[error("Tool not found")]
    ToolNotFound,

    #[error("Method not found")]
    MethodNotFound,

    #[error("Parse error")]
    ParseError,

    #[error("Internal error: {0}")]
    InternalError(String),

    /// The automation target (Outlook) is not running and could not be
    /// launched. Distinct from `Script` so callers can tell "app missing"
    /// apart from "script failed".
    #[error("Application unavailable: {0}")]
    AppUnavailable(String),

    /// The generated script itself failed on the Outlook side (folder not
    /// found, duplicate name, ...). Carries osascript's stderr.
    #[error("AppleScript error: {0}")]
    Script(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl ConnectorError {
    pub fn code_str(&self) -> &'static str {
        match self {
            ConnectorError::InvalidInput(_) => "invalid_input",
            ConnectorError::InvalidParams(_) => "invalid_params",
            ConnectorError::ResourceNotFound => "not_found",
            ConnectorError::ToolNotFound => "tool_not_found",
            ConnectorError::MethodNotFound => "method_not_found",
            ConnectorError::ParseError => "parse_error",
            ConnectorError::AppUnavailable(_) => "app_unavailable",
            ConnectorError::Script(_) => "script_error",
            ConnectorError::InternalError(_) => "internal_error",
            _ => "internal_error",
        }
    }

    pub fn to_jsonrpc_error(&self) -> serde_json::Value {
        let (code, message) = match self {
            ConnectorError::ResourceNotFound => (-32602, "Resource not found".to_string()),
            ConnectorError::ToolNotFound => (-32602, "Tool not found".to_string()),
            ConnectorError::InvalidParams(msg) => (-32602, msg.to_string()),
            ConnectorError::InvalidInput(msg) => (-32602, msg.to_string()),
            ConnectorError::MethodNotFound => (-32601, "Method not found".to_string()),
            ConnectorError::ParseError => (-32700, "Parse error".to_string()),
            ConnectorError::InternalError(msg) => (-32603, msg.to_string()),
            ConnectorError::AppUnavailable(msg) => (-32603, msg.to_string()),
            ConnectorError::Script(msg) => (-32603, format!("AppleScript error: {}", msg)),
            ConnectorError::Other(msg) => (-32603, msg.to_string()),
            err => (-32603, err.to_string()),
        };

        json!({
            "code": code,
            "message": message,
        })
    }
}
