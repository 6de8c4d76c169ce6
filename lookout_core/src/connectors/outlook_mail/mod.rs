// Outlook Mail Connector - Microsoft Outlook (macOS) mail via AppleScript
//
// Works against the local Outlook application with whatever accounts it has
// configured; no IMAP/Graph credentials involved. Script generation lives in
// `script`, output parsing in `parse`; this module validates tool arguments
// and wires the two together.

pub mod parse;
pub mod script;

use async_trait::async_trait;
use rmcp::model::*;
use serde_json::{json, Map, Value};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::warn;

use crate::connectors::outlook_common::{
    ensure_app_running, outlook_connector_capabilities, run_applescript_output, OUTLOOK_APP,
};
use crate::error::ConnectorError;
use crate::utils::structured_result_with_text;
use crate::Connector;

use parse::{parse_email_output, parse_folder_output, parse_trash_preview};
use script::{
    looks_like_html, parse_recipients, script_count_emails, script_create_draft,
    script_create_folder, script_delete_email, script_delete_folder, script_empty_trash_confirm,
    script_empty_trash_preview, script_forward, script_get_email, script_list_folders,
    script_mark_email, script_move_email, script_read_emails, script_rename_folder, script_reply,
    script_search_emails, ComposePlan, DateRange, RecipientMods, ReplyMods, SendStrategy,
};

const DEFAULT_LIST_LIMIT: u64 = 20;
const MAX_LIST_LIMIT: u64 = 100;

/// Required string fields per tool, checked up front so a request missing
/// several fields reports all of them in one error.
const REQUIRED_FIELDS: &[(&str, &[&str])] = &[
    ("send_email", &["to", "subject", "body"]),
    ("create_draft", &["to", "subject", "body"]),
    ("reply_email", &["message_id", "body"]),
    ("forward_email", &["message_id", "to"]),
    ("search_emails", &["query"]),
    ("get_email", &["message_id"]),
    ("move_email", &["message_id", "target_folder"]),
    ("delete_email", &["message_id"]),
    ("mark_email", &["message_id"]),
    ("create_folder", &["folder"]),
    ("rename_folder", &["folder", "new_name"]),
    ("delete_folder", &["folder"]),
];

/// Outlook mail connector - read, search, compose, and folder management
#[derive(Default)]
pub struct OutlookMailConnector;

impl OutlookMailConnector {
    pub fn new() -> Self {
        Self {}
    }
}

// ============================================================================
// Argument handling
// ============================================================================

fn check_required_fields(tool: &str, args: &Map<String, Value>) -> Result<(), ConnectorError> {
    let Some((_, fields)) = REQUIRED_FIELDS.iter().find(|(name, _)| *name == tool) else {
        return Ok(());
    };
    let missing: Vec<&str> = fields
        .iter()
        .copied()
        .filter(|field| match args.get(*field) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        })
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ConnectorError::InvalidParams(format!(
            "Missing required field(s): {}",
            missing.join(", ")
        )))
    }
}

/// Message ids are embedded in scripts unquoted, so anything non-numeric is
/// rejected here rather than escaped.
fn require_message_id(args: &Map<String, Value>) -> Result<i64, ConnectorError> {
    let value = args
        .get("message_id")
        .ok_or_else(|| ConnectorError::InvalidParams("Missing 'message_id'".to_string()))?;
    let id = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    id.ok_or_else(|| {
        ConnectorError::InvalidParams(
            "'message_id' must be a numeric Outlook message id".to_string(),
        )
    })
}

fn str_arg<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

fn bool_arg(args: &Map<String, Value>, key: &str, default: bool) -> bool {
    args.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
}

fn limit_arg(args: &Map<String, Value>) -> usize {
    args.get("limit")
        .and_then(|v| v.as_u64())
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .min(MAX_LIST_LIMIT) as usize
}

fn folder_arg<'a>(args: &'a Map<String, Value>) -> &'a str {
    str_arg(args, "folder").unwrap_or("Inbox")
}

fn date_range_arg(args: &Map<String, Value>) -> Result<DateRange, ConnectorError> {
    DateRange::from_args(str_arg(args, "start_date"), str_arg(args, "end_date"))
}

fn attachments_arg(args: &Map<String, Value>) -> Result<Vec<String>, ConnectorError> {
    let Some(value) = args.get("attachments") else {
        return Ok(Vec::new());
    };
    let list = value.as_array().ok_or_else(|| {
        ConnectorError::InvalidParams("'attachments' must be an array of file paths".to_string())
    })?;
    list.iter()
        .map(|entry| {
            entry.as_str().map(str::to_string).ok_or_else(|| {
                ConnectorError::InvalidParams(
                    "'attachments' must contain only strings".to_string(),
                )
            })
        })
        .collect()
}

/// Per-class recipient modifications for replies. An override of a class
/// conflicts with add/remove on the same class; that is rejected before any
/// script runs.
fn recipient_mods_arg(
    args: &Map<String, Value>,
    class: &str,
) -> Result<RecipientMods, ConnectorError> {
    let override_with = str_arg(args, class).map(parse_recipients);
    let add = str_arg(args, &format!("add_{}", class)).map(parse_recipients);
    let remove = str_arg(args, &format!("remove_{}", class)).map(parse_recipients);
    if override_with.is_some() && (add.is_some() || remove.is_some()) {
        return Err(ConnectorError::InvalidParams(format!(
            "'{class}' replaces the recipient list and cannot be combined with 'add_{class}' or 'remove_{class}'",
        )));
    }
    Ok(RecipientMods {
        override_with,
        add,
        remove,
    })
}

fn reply_mods_arg(args: &Map<String, Value>) -> Result<ReplyMods, ConnectorError> {
    Ok(ReplyMods {
        to: recipient_mods_arg(args, "to")?,
        cc: recipient_mods_arg(args, "cc")?,
        bcc: recipient_mods_arg(args, "bcc")?,
    })
}

// ============================================================================
// Connector implementation
// ============================================================================

#[async_trait]
impl Connector for OutlookMailConnector {
    fn name(&self) -> &'static str {
        "outlook_mail"
    }

    fn description(&self) -> &'static str {
        "Microsoft Outlook mail via AppleScript (macOS)"
    }

    async fn capabilities(&self) -> ServerCapabilities {
        outlook_connector_capabilities()
    }

    async fn initialize(
        &self,
        _request: InitializeRequestParam,
    ) -> Result<InitializeResult, ConnectorError> {
        Ok(InitializeResult {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: outlook_connector_capabilities(),
            server_info: Implementation {
                name: self.name().to_string(),
                title: None,
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Mail tools backed by the local Microsoft Outlook application. Folder arguments \
                 take slash paths ('Projects/2025'); 'Inbox' means the account's default inbox. \
                 Message ids come from read_emails and search_emails results."
                    .to_string(),
            ),
        })
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
    ) -> Result<ListResourcesResult, ConnectorError> {
        Ok(ListResourcesResult {
            resources: vec![],
            next_cursor: None,
        })
    }

    async fn read_resource(
        &self,
        _request: ReadResourceRequestParam,
    ) -> Result<Vec<ResourceContents>, ConnectorError> {
        Err(ConnectorError::ResourceNotFound)
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
    ) -> Result<ListToolsResult, ConnectorError> {
        let tools = vec![
            // Reading & search
            Tool {
                name: Cow::Borrowed("read_emails"),
                title: Some("Read Emails".to_string()),
                description: Some(Cow::Borrowed(
                    "List emails from a folder with subject, sender, date, and body text. Folder defaults to the inbox; accepts slash paths like 'Projects/2025'. Optional YYYY-MM-DD date range.",
                )),
                input_schema: Arc::new(
                    json!({
                        "type": "object",
                        "properties": {
                            "folder": {
                                "type": "string",
                                "description": "Folder name or slash path. Default: 'Inbox'."
                            },
                            "limit": {
                                "type": "integer",
                                "description": "Maximum emails to return. Default: 20, Max: 100.",
                                "default": 20
                            },
                            "start_date": {
                                "type": "string",
                                "description": "Earliest date to include, YYYY-MM-DD."
                            },
                            "end_date": {
                                "type": "string",
                                "description": "Latest date to include, YYYY-MM-DD."
                            }
                        }
                    })
                    .as_object()
                    .unwrap()
                    .clone(),
                ),
                output_schema: None,
                annotations: None,
                icons: None,
            },
            Tool {
                name: Cow::Borrowed("get_email"),
                title: Some("Get Email".to_string()),
                description: Some(Cow::Borrowed(
                    "Fetch a single email by its numeric message id, as returned by read_emails or search_emails.",
                )),
                input_schema: Arc::new(
                    json!({
                        "type": "object",
                        "properties": {
                            "message_id": {
                                "type": "string",
                                "description": "Numeric Outlook message id. Required."
                            }
                        },
                        "required": ["message_id"]
                    })
                    .as_object()
                    .unwrap()
                    .clone(),
                ),
                output_schema: None,
                annotations: None,
                icons: None,
            },
            Tool {
                name: Cow::Borrowed("search_emails"),
                title: Some("Search Emails".to_string()),
                description: Some(Cow::Borrowed(
                    "Search a folder for emails whose subject or sender contains the query (case-insensitive). Optional date range and result limit.",
                )),
                input_schema: Arc::new(
                    json!({
                        "type": "object",
                        "properties": {
                            "query": {
                                "type": "string",
                                "description": "Text to match against subject and sender. Required."
                            },
                            "folder": {
                                "type": "string",
                                "description": "Folder to search. Default: 'Inbox'."
                            },
                            "limit": {
                                "type": "integer",
                                "description": "Maximum matches to return. Default: 20, Max: 100.",
                                "default": 20
                            },
                            "start_date": {
                                "type": "string",
                                "description": "Earliest date to include, YYYY-MM-DD."
                            },
                            "end_date": {
                                "type": "string",
                                "description": "Latest date to include, YYYY-MM-DD."
                            }
                        },
                        "required": ["query"]
                    })
                    .as_object()
                    .unwrap()
                    .clone(),
                ),
                output_schema: None,
                annotations: None,
                icons: None,
            },
            Tool {
                name: Cow::Borrowed("count_emails"),
                title: Some("Count Emails".to_string()),
                description: Some(Cow::Borrowed(
                    "Count messages in a folder, optionally unread only.",
                )),
                input_schema: Arc::new(
                    json!({
                        "type": "object",
                        "properties": {
                            "folder": {
                                "type": "string",
                                "description": "Folder to count. Default: 'Inbox'."
                            },
                            "unread_only": {
                                "type": "boolean",
                                "description": "Count only unread messages. Default: false.",
                                "default": false
                            }
                        }
                    })
                    .as_object()
                    .unwrap()
                    .clone(),
                ),
                output_schema: None,
                annotations: None,
                icons: None,
            },
            // Composing
            Tool {
                name: Cow::Borrowed("send_email"),
                title: Some("Send Email".to_string()),
                description: Some(Cow::Borrowed(
                    "Send an email. Recipients are comma-separated and may use 'Name <addr>' form. HTML is detected from the body unless is_html is set. If direct sending fails, a draft is staged in Outlook instead and the result says so.",
                )),
                input_schema: Arc::new(
                    json!({
                        "type": "object",
                        "properties": {
                            "to": {
                                "type": "string",
                                "description": "Comma-separated recipients. Required."
                            },
                            "subject": {"type": "string", "description": "Subject line. Required."},
                            "body": {"type": "string", "description": "Message body. Required."},
                            "cc": {"type": "string", "description": "Comma-separated CC recipients."},
                            "bcc": {"type": "string", "description": "Comma-separated BCC recipients."},
                            "is_html": {
                                "type": "boolean",
                                "description": "Treat body as HTML. Omit to auto-detect."
                            },
                            "attachments": {
                                "type": "array",
                                "items": {"type": "string"},
                                "description": "File paths to attach. Relative paths resolve against the server's working directory."
                            }
                        },
                        "required": ["to", "subject", "body"]
                    })
                    .as_object()
                    .unwrap()
                    .clone(),
                ),
                output_schema: None,
                annotations: None,
                icons: None,
            },
            Tool {
                name: Cow::Borrowed("create_draft"),
                title: Some("Create Draft".to_string()),
                description: Some(Cow::Borrowed(
                    "Create a draft email and open it in Outlook for review instead of sending.",
                )),
                input_schema: Arc::new(
                    json!({
                        "type": "object",
                        "properties": {
                            "to": {"type": "string", "description": "Comma-separated recipients. Required."},
                            "subject": {"type": "string", "description": "Subject line. Required."},
                            "body": {"type": "string", "description": "Message body. Required."},
                            "cc": {"type": "string", "description": "Comma-separated CC recipients."},
                            "bcc": {"type": "string", "description": "Comma-separated BCC recipients."},
                            "is_html": {
                                "type": "boolean",
                                "description": "Treat body as HTML. Omit to auto-detect."
                            },
                            "attachments": {
                                "type": "array",
                                "items": {"type": "string"},
                                "description": "File paths to attach."
                            }
                        },
                        "required": ["to", "subject", "body"]
                    })
                    .as_object()
                    .unwrap()
                    .clone(),
                ),
                output_schema: None,
                annotations: None,
                icons: None,
            },
            Tool {
                name: Cow::Borrowed("reply_email"),
                title: Some("Reply to Email".to_string()),
                description: Some(Cow::Borrowed(
                    "Reply to a message by id. reply_all keeps the original audience. Recipient lists can be replaced per class ('to', 'cc', 'bcc'), or adjusted with add_*/remove_* without replacing; replace and adjust are mutually exclusive per class.",
                )),
                input_schema: Arc::new(
                    json!({
                        "type": "object",
                        "properties": {
                            "message_id": {
                                "type": "string",
                                "description": "Numeric id of the message to reply to. Required."
                            },
                            "body": {"type": "string", "description": "Reply body. Required."},
                            "reply_all": {
                                "type": "boolean",
                                "description": "Reply to all original recipients. Default: false.",
                                "default": false
                            },
                            "is_html": {
                                "type": "boolean",
                                "description": "Treat body as HTML. Omit to auto-detect."
                            },
                            "to": {"type": "string", "description": "Replace the To list entirely."},
                            "cc": {"type": "string", "description": "Replace the CC list entirely."},
                            "bcc": {"type": "string", "description": "Replace the BCC list entirely."},
                            "add_to": {"type": "string", "description": "Recipients to add to To."},
                            "add_cc": {"type": "string", "description": "Recipients to add to CC."},
                            "add_bcc": {"type": "string", "description": "Recipients to add to BCC."},
                            "remove_to": {"type": "string", "description": "Addresses to remove from To (case-insensitive)."},
                            "remove_cc": {"type": "string", "description": "Addresses to remove from CC (case-insensitive)."},
                            "remove_bcc": {"type": "string", "description": "Addresses to remove from BCC (case-insensitive)."}
                        },
                        "required": ["message_id", "body"]
                    })
                    .as_object()
                    .unwrap()
                    .clone(),
                ),
                output_schema: None,
                annotations: None,
                icons: None,
            },
            Tool {
                name: Cow::Borrowed("forward_email"),
                title: Some("Forward Email".to_string()),
                description: Some(Cow::Borrowed(
                    "Forward a message by id to new recipients, with an optional note prepended above the forwarded content.",
                )),
                input_schema: Arc::new(
                    json!({
                        "type": "object",
                        "properties": {
                            "message_id": {
                                "type": "string",
                                "description": "Numeric id of the message to forward. Required."
                            },
                            "to": {
                                "type": "string",
                                "description": "Comma-separated recipients. Required."
                            },
                            "cc": {"type": "string", "description": "Comma-separated CC recipients."},
                            "body": {"type": "string", "description": "Note to prepend above the forwarded content."},
                            "is_html": {
                                "type": "boolean",
                                "description": "Treat the note as HTML. Omit to auto-detect."
                            }
                        },
                        "required": ["message_id", "to"]
                    })
                    .as_object()
                    .unwrap()
                    .clone(),
                ),
                output_schema: None,
                annotations: None,
                icons: None,
            },
            // Message management
            Tool {
                name: Cow::Borrowed("move_email"),
                title: Some("Move Email".to_string()),
                description: Some(Cow::Borrowed(
                    "Move a message to another folder. Target accepts slash paths.",
                )),
                input_schema: Arc::new(
                    json!({
                        "type": "object",
                        "properties": {
                            "message_id": {
                                "type": "string",
                                "description": "Numeric message id. Required."
                            },
                            "target_folder": {
                                "type": "string",
                                "description": "Destination folder name or slash path. Required."
                            }
                        },
                        "required": ["message_id", "target_folder"]
                    })
                    .as_object()
                    .unwrap()
                    .clone(),
                ),
                output_schema: None,
                annotations: None,
                icons: None,
            },
            Tool {
                name: Cow::Borrowed("delete_email"),
                title: Some("Delete Email".to_string()),
                description: Some(Cow::Borrowed(
                    "Delete a message by id. Outlook moves it to Deleted Items.",
                )),
                input_schema: Arc::new(
                    json!({
                        "type": "object",
                        "properties": {
                            "message_id": {
                                "type": "string",
                                "description": "Numeric message id. Required."
                            }
                        },
                        "required": ["message_id"]
                    })
                    .as_object()
                    .unwrap()
                    .clone(),
                ),
                output_schema: None,
                annotations: None,
                icons: None,
            },
            Tool {
                name: Cow::Borrowed("mark_email"),
                title: Some("Mark Email Read/Unread".to_string()),
                description: Some(Cow::Borrowed(
                    "Set the read status of a message by id.",
                )),
                input_schema: Arc::new(
                    json!({
                        "type": "object",
                        "properties": {
                            "message_id": {
                                "type": "string",
                                "description": "Numeric message id. Required."
                            },
                            "read": {
                                "type": "boolean",
                                "description": "true marks read, false marks unread. Default: true.",
                                "default": true
                            }
                        },
                        "required": ["message_id"]
                    })
                    .as_object()
                    .unwrap()
                    .clone(),
                ),
                output_schema: None,
                annotations: None,
                icons: None,
            },
            // Folder management
            Tool {
                name: Cow::Borrowed("list_folders"),
                title: Some("List Folders".to_string()),
                description: Some(Cow::Borrowed(
                    "List all mail folders across accounts as slash paths, with special-role tags (inbox, sent, drafts, trash, junk, archive) on top-level folders. Optionally include message and unread counts.",
                )),
                input_schema: Arc::new(
                    json!({
                        "type": "object",
                        "properties": {
                            "include_counts": {
                                "type": "boolean",
                                "description": "Include message and unread counts per folder (slower). Default: false.",
                                "default": false
                            },
                            "include_trash": {
                                "type": "boolean",
                                "description": "Include folders nested inside Deleted Items. Default: false.",
                                "default": false
                            }
                        }
                    })
                    .as_object()
                    .unwrap()
                    .clone(),
                ),
                output_schema: None,
                annotations: None,
                icons: None,
            },
            Tool {
                name: Cow::Borrowed("create_folder"),
                title: Some("Create Folder".to_string()),
                description: Some(Cow::Borrowed(
                    "Create a mail folder. A slash path creates the leaf under its parent; a plain name creates a top-level folder.",
                )),
                input_schema: Arc::new(
                    json!({
                        "type": "object",
                        "properties": {
                            "folder": {
                                "type": "string",
                                "description": "Folder name or slash path to create. Required."
                            }
                        },
                        "required": ["folder"]
                    })
                    .as_object()
                    .unwrap()
                    .clone(),
                ),
                output_schema: None,
                annotations: None,
                icons: None,
            },
            Tool {
                name: Cow::Borrowed("rename_folder"),
                title: Some("Rename Folder".to_string()),
                description: Some(Cow::Borrowed(
                    "Rename a mail folder. The folder argument is the current name or slash path; new_name is the bare new name.",
                )),
                input_schema: Arc::new(
                    json!({
                        "type": "object",
                        "properties": {
                            "folder": {
                                "type": "string",
                                "description": "Current folder name or slash path. Required."
                            },
                            "new_name": {
                                "type": "string",
                                "description": "New folder name. Required."
                            }
                        },
                        "required": ["folder", "new_name"]
                    })
                    .as_object()
                    .unwrap()
                    .clone(),
                ),
                output_schema: None,
                annotations: None,
                icons: None,
            },
            Tool {
                name: Cow::Borrowed("delete_folder"),
                title: Some("Delete Folder".to_string()),
                description: Some(Cow::Borrowed(
                    "Delete a mail folder by name or slash path.",
                )),
                input_schema: Arc::new(
                    json!({
                        "type": "object",
                        "properties": {
                            "folder": {
                                "type": "string",
                                "description": "Folder name or slash path to delete. Required."
                            }
                        },
                        "required": ["folder"]
                    })
                    .as_object()
                    .unwrap()
                    .clone(),
                ),
                output_schema: None,
                annotations: None,
                icons: None,
            },
            Tool {
                name: Cow::Borrowed("empty_trash"),
                title: Some("Empty Trash".to_string()),
                description: Some(Cow::Borrowed(
                    "Empty the Deleted Items folder. Pass preview:true to see what would be deleted (count, date span, size), or confirm:true to actually delete. Exactly one of the two is required.",
                )),
                input_schema: Arc::new(
                    json!({
                        "type": "object",
                        "properties": {
                            "preview": {
                                "type": "boolean",
                                "description": "Report what would be deleted without deleting."
                            },
                            "confirm": {
                                "type": "boolean",
                                "description": "Actually delete everything in Deleted Items."
                            }
                        }
                    })
                    .as_object()
                    .unwrap()
                    .clone(),
                ),
                output_schema: None,
                annotations: None,
                icons: None,
            },
        ];

        Ok(ListToolsResult {
            tools,
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, ConnectorError> {
        let name = request.name.as_ref();
        let args = request.arguments.unwrap_or_default();

        // Argument validation happens before the app check so bad requests
        // fail fast without touching Outlook.
        check_required_fields(name, &args)?;

        match name {
            "read_emails" => {
                let folder = folder_arg(&args);
                let range = date_range_arg(&args)?;
                let limit = limit_arg(&args);
                ensure_app_running(OUTLOOK_APP).await?;
                let output =
                    run_applescript_output(&script_read_emails(folder, limit, &range)).await?;
                let emails = parse_email_output(&output);
                structured_result_with_text(&json!({"emails": emails}), None)
            }

            "get_email" => {
                let message_id = require_message_id(&args)?;
                ensure_app_running(OUTLOOK_APP).await?;
                let output = run_applescript_output(&script_get_email(message_id)).await?;
                let email = parse_email_output(&output).into_iter().next().ok_or_else(|| {
                    ConnectorError::Other(format!("Message {} returned no parseable content", message_id))
                })?;
                structured_result_with_text(&email, None)
            }

            "search_emails" => {
                let query = str_arg(&args, "query")
                    .ok_or_else(|| ConnectorError::InvalidParams("Missing 'query'".to_string()))?;
                let folder = folder_arg(&args);
                let range = date_range_arg(&args)?;
                let limit = limit_arg(&args);
                ensure_app_running(OUTLOOK_APP).await?;
                let output =
                    run_applescript_output(&script_search_emails(folder, query, limit, &range))
                        .await?;
                let emails = parse_email_output(&output);
                structured_result_with_text(&json!({"emails": emails, "query": query}), None)
            }

            "count_emails" => {
                let folder = folder_arg(&args);
                let unread_only = bool_arg(&args, "unread_only", false);
                ensure_app_running(OUTLOOK_APP).await?;
                let output =
                    run_applescript_output(&script_count_emails(folder, unread_only)).await?;
                let count: u64 = output.trim().parse().map_err(|_| {
                    ConnectorError::Other(format!("Unexpected count output: {}", output))
                })?;
                structured_result_with_text(
                    &json!({"folder": folder, "count": count, "unread_only": unread_only}),
                    None,
                )
            }

            "send_email" | "create_draft" => {
                let to = str_arg(&args, "to")
                    .ok_or_else(|| ConnectorError::InvalidParams("Missing 'to'".to_string()))?;
                let subject = str_arg(&args, "subject").ok_or_else(|| {
                    ConnectorError::InvalidParams("Missing 'subject'".to_string())
                })?;
                let body = str_arg(&args, "body")
                    .ok_or_else(|| ConnectorError::InvalidParams("Missing 'body'".to_string()))?;
                let attachments = attachments_arg(&args)?;
                let is_html = args.get("is_html").and_then(|v| v.as_bool());
                let plan = ComposePlan::new(
                    to,
                    subject,
                    body,
                    str_arg(&args, "cc"),
                    str_arg(&args, "bcc"),
                    is_html,
                    &attachments,
                )?;
                ensure_app_running(OUTLOOK_APP).await?;

                if name == "create_draft" {
                    run_applescript_output(&script_create_draft(&plan)).await?;
                    return structured_result_with_text(
                        &json!({
                            "status": "draft",
                            "message": "Draft created and opened in Outlook for review"
                        }),
                        None,
                    );
                }

                let mut tier_errors: Vec<String> = Vec::new();
                for strategy in SendStrategy::LADDER {
                    match run_applescript_output(&strategy.script(&plan)).await {
                        Ok(_) => {
                            if !tier_errors.is_empty() {
                                warn!(
                                    strategy = ?strategy,
                                    failures = tier_errors.len(),
                                    "send succeeded after fallback"
                                );
                            }
                            let result = if strategy.stages_draft() {
                                json!({
                                    "status": "draft_staged",
                                    "message": "Sending failed; a draft was staged and opened in Outlook for manual review"
                                })
                            } else {
                                json!({"status": "sent", "message": "Email sent"})
                            };
                            return structured_result_with_text(&result, None);
                        }
                        Err(ConnectorError::Script(err)) => {
                            warn!(strategy = ?strategy, error = %err, "send strategy failed");
                            tier_errors.push(err);
                        }
                        Err(other) => return Err(other),
                    }
                }
                Err(ConnectorError::Script(format!(
                    "All send strategies failed: {}",
                    tier_errors.join(" | ")
                )))
            }

            "reply_email" => {
                let message_id = require_message_id(&args)?;
                let body = str_arg(&args, "body")
                    .ok_or_else(|| ConnectorError::InvalidParams("Missing 'body'".to_string()))?;
                let reply_all = bool_arg(&args, "reply_all", false);
                let html = args
                    .get("is_html")
                    .and_then(|v| v.as_bool())
                    .unwrap_or_else(|| looks_like_html(body));
                let mods = reply_mods_arg(&args)?;
                ensure_app_running(OUTLOOK_APP).await?;
                run_applescript_output(&script_reply(message_id, body, html, reply_all, &mods))
                    .await?;
                structured_result_with_text(
                    &json!({"status": "sent", "message": "Reply sent"}),
                    None,
                )
            }

            "forward_email" => {
                let message_id = require_message_id(&args)?;
                let to = str_arg(&args, "to")
                    .ok_or_else(|| ConnectorError::InvalidParams("Missing 'to'".to_string()))?;
                let to = parse_recipients(to);
                let cc = str_arg(&args, "cc").map(parse_recipients).unwrap_or_default();
                let body = str_arg(&args, "body");
                let html = args
                    .get("is_html")
                    .and_then(|v| v.as_bool())
                    .unwrap_or_else(|| body.map(looks_like_html).unwrap_or(false));
                ensure_app_running(OUTLOOK_APP).await?;
                run_applescript_output(&script_forward(message_id, &to, &cc, body, html)).await?;
                structured_result_with_text(
                    &json!({"status": "sent", "message": "Email forwarded"}),
                    None,
                )
            }

            "move_email" => {
                let message_id = require_message_id(&args)?;
                let target = str_arg(&args, "target_folder").ok_or_else(|| {
                    ConnectorError::InvalidParams("Missing 'target_folder'".to_string())
                })?;
                ensure_app_running(OUTLOOK_APP).await?;
                run_applescript_output(&script_move_email(message_id, target)).await?;
                structured_result_with_text(
                    &json!({"success": true, "message": format!("Message moved to {}", target)}),
                    None,
                )
            }

            "delete_email" => {
                let message_id = require_message_id(&args)?;
                ensure_app_running(OUTLOOK_APP).await?;
                run_applescript_output(&script_delete_email(message_id)).await?;
                structured_result_with_text(
                    &json!({"success": true, "message": "Message moved to Deleted Items"}),
                    None,
                )
            }

            "mark_email" => {
                let message_id = require_message_id(&args)?;
                let read = bool_arg(&args, "read", true);
                ensure_app_running(OUTLOOK_APP).await?;
                run_applescript_output(&script_mark_email(message_id, read)).await?;
                let status = if read { "read" } else { "unread" };
                structured_result_with_text(
                    &json!({"success": true, "message": format!("Message marked {}", status)}),
                    None,
                )
            }

            "list_folders" => {
                let include_counts = bool_arg(&args, "include_counts", false);
                let include_trash = bool_arg(&args, "include_trash", false);
                ensure_app_running(OUTLOOK_APP).await?;
                let output =
                    run_applescript_output(&script_list_folders(include_counts)).await?;
                let folders = parse_folder_output(&output, include_trash);
                structured_result_with_text(&json!({"folders": folders}), None)
            }

            "create_folder" => {
                let folder = str_arg(&args, "folder")
                    .ok_or_else(|| ConnectorError::InvalidParams("Missing 'folder'".to_string()))?;
                ensure_app_running(OUTLOOK_APP).await?;
                run_applescript_output(&script_create_folder(folder)).await?;
                structured_result_with_text(
                    &json!({"success": true, "message": format!("Folder '{}' created", folder)}),
                    None,
                )
            }

            "rename_folder" => {
                let folder = str_arg(&args, "folder")
                    .ok_or_else(|| ConnectorError::InvalidParams("Missing 'folder'".to_string()))?;
                let new_name = str_arg(&args, "new_name").ok_or_else(|| {
                    ConnectorError::InvalidParams("Missing 'new_name'".to_string())
                })?;
                ensure_app_running(OUTLOOK_APP).await?;
                run_applescript_output(&script_rename_folder(folder, new_name)).await?;
                structured_result_with_text(
                    &json!({
                        "success": true,
                        "message": format!("Folder '{}' renamed to '{}'", folder, new_name)
                    }),
                    None,
                )
            }

            "delete_folder" => {
                let folder = str_arg(&args, "folder")
                    .ok_or_else(|| ConnectorError::InvalidParams("Missing 'folder'".to_string()))?;
                ensure_app_running(OUTLOOK_APP).await?;
                run_applescript_output(&script_delete_folder(folder)).await?;
                structured_result_with_text(
                    &json!({"success": true, "message": format!("Folder '{}' deleted", folder)}),
                    None,
                )
            }

            "empty_trash" => {
                let preview = bool_arg(&args, "preview", false);
                let confirm = bool_arg(&args, "confirm", false);
                if preview == confirm {
                    return Err(ConnectorError::InvalidParams(
                        "Pass exactly one of 'preview: true' or 'confirm: true'".to_string(),
                    ));
                }
                ensure_app_running(OUTLOOK_APP).await?;

                if preview {
                    let output =
                        run_applescript_output(&script_empty_trash_preview()).await?;
                    let report = parse_trash_preview(&output).ok_or_else(|| {
                        ConnectorError::Other(format!(
                            "Unexpected trash preview output: {}",
                            output
                        ))
                    })?;
                    structured_result_with_text(&report, None)
                } else {
                    let output =
                        run_applescript_output(&script_empty_trash_confirm()).await?;
                    let deleted: u64 = output.trim().parse().map_err(|_| {
                        ConnectorError::Other(format!("Unexpected trash output: {}", output))
                    })?;
                    let result = if deleted == 0 {
                        json!({
                            "deleted": 0,
                            "message": "Deleted Items folder is already empty"
                        })
                    } else {
                        json!({
                            "deleted": deleted,
                            "message": format!("Permanently deleted {} message(s)", deleted)
                        })
                    };
                    structured_result_with_text(&result, None)
                }
            }

            _ => Err(ConnectorError::ToolNotFound),
        }
    }

    async fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParam>,
    ) -> Result<ListPromptsResult, ConnectorError> {
        Ok(ListPromptsResult {
            prompts: vec![],
            next_cursor: None,
        })
    }

    async fn get_prompt(&self, _name: &str) -> Result<Prompt, ConnectorError> {
        Err(ConnectorError::ResourceNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Value) -> CallToolRequestParam {
        CallToolRequestParam {
            name: name.to_string().into(),
            arguments: args.as_object().cloned(),
        }
    }

    fn assert_invalid_params(result: Result<CallToolResult, ConnectorError>, needle: &str) {
        match result {
            Err(ConnectorError::InvalidParams(msg)) => {
                assert!(msg.contains(needle), "message '{}' missing '{}'", msg, needle)
            }
            other => panic!("expected InvalidParams, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_missing_fields_reported_together() {
        let connector = OutlookMailConnector::new();
        let result = connector
            .call_tool(call("send_email", json!({"subject": "hi"})))
            .await;
        match result {
            Err(ConnectorError::InvalidParams(msg)) => {
                assert!(msg.contains("to"));
                assert!(msg.contains("body"));
                assert!(!msg.contains("subject"));
            }
            other => panic!("expected InvalidParams, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_whitespace_only_field_is_missing() {
        let connector = OutlookMailConnector::new();
        let result = connector
            .call_tool(call(
                "send_email",
                json!({"to": "  ", "subject": "s", "body": "b"}),
            ))
            .await;
        assert_invalid_params(result, "to");
    }

    #[tokio::test]
    async fn test_message_id_must_be_numeric() {
        let connector = OutlookMailConnector::new();
        let result = connector
            .call_tool(call(
                "delete_email",
                json!({"message_id": "42\" & (do shell script \"true\")"}),
            ))
            .await;
        assert_invalid_params(result, "numeric");
    }

    #[tokio::test]
    async fn test_reply_override_conflicts_with_add() {
        let connector = OutlookMailConnector::new();
        let result = connector
            .call_tool(call(
                "reply_email",
                json!({
                    "message_id": "7",
                    "body": "x",
                    "cc": "a@x.com",
                    "add_cc": "b@x.com"
                }),
            ))
            .await;
        assert_invalid_params(result, "cc");
    }

    #[tokio::test]
    async fn test_empty_trash_requires_exactly_one_mode() {
        let connector = OutlookMailConnector::new();
        let neither = connector.call_tool(call("empty_trash", json!({}))).await;
        assert_invalid_params(neither, "exactly one");
        let both = connector
            .call_tool(call("empty_trash", json!({"preview": true, "confirm": true})))
            .await;
        assert_invalid_params(both, "exactly one");
    }

    #[tokio::test]
    async fn test_bad_date_rejected_before_app_check() {
        let connector = OutlookMailConnector::new();
        let result = connector
            .call_tool(call("read_emails", json!({"start_date": "03/14/2025"})))
            .await;
        assert_invalid_params(result, "YYYY-MM-DD");
    }

    #[tokio::test]
    async fn test_attachments_must_be_string_array() {
        let connector = OutlookMailConnector::new();
        let result = connector
            .call_tool(call(
                "send_email",
                json!({"to": "a@x.com", "subject": "s", "body": "b", "attachments": [1, 2]}),
            ))
            .await;
        assert_invalid_params(result, "attachments");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let connector = OutlookMailConnector::new();
        let result = connector.call_tool(call("frobnicate", json!({}))).await;
        assert!(matches!(result, Err(ConnectorError::ToolNotFound)));
    }

    #[tokio::test]
    async fn test_list_tools_complete() {
        let connector = OutlookMailConnector::new();
        let tools = connector.list_tools(None).await.unwrap().tools;
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_ref()).collect();
        for expected in [
            "read_emails",
            "get_email",
            "search_emails",
            "count_emails",
            "send_email",
            "create_draft",
            "reply_email",
            "forward_email",
            "move_email",
            "delete_email",
            "mark_email",
            "list_folders",
            "create_folder",
            "rename_folder",
            "delete_folder",
            "empty_trash",
        ] {
            assert!(names.contains(&expected), "missing tool {}", expected);
        }
        assert_eq!(names.len(), 16);
    }

    #[test]
    fn test_required_fields_table_matches_schemas() {
        // Every tool in the table must exist in the tool list
        let known = [
            "read_emails",
            "get_email",
            "search_emails",
            "count_emails",
            "send_email",
            "create_draft",
            "reply_email",
            "forward_email",
            "move_email",
            "delete_email",
            "mark_email",
            "list_folders",
            "create_folder",
            "rename_folder",
            "delete_folder",
            "empty_trash",
        ];
        for (tool, _) in REQUIRED_FIELDS {
            assert!(known.contains(tool), "unknown tool in table: {}", tool);
        }
    }
}
