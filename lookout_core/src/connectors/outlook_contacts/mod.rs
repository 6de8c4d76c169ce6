// Outlook Contacts Connector - address book access via AppleScript

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use rmcp::model::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::debug;

use crate::connectors::outlook_common::{
    ensure_app_running, escape_applescript_string, outlook_connector_capabilities,
    run_applescript_output, OUTLOOK_APP,
};
use crate::error::ConnectorError;
use crate::utils::structured_result_with_text;
use crate::Connector;

const CONTACT_START: &str = "===CONTACT_START===";

const DEFAULT_CONTACT_LIMIT: u64 = 50;
const MAX_CONTACT_LIMIT: u64 = 200;

/// Outlook contacts connector - list, search, and create contacts
#[derive(Default)]
pub struct OutlookContactsConnector;

impl OutlookContactsConnector {
    pub fn new() -> Self {
        Self {}
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParsedContact {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    /// Semicolon-joined in the wire format, split here.
    pub emails: Vec<String>,
    pub phones: Vec<String>,
}

static CONTACT_RECORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?s)^(?P<name>.*?)===ID===(?P<id>.*?)===EMAILS===(?P<emails>.*?)===PHONES===(?P<phones>.*?)===CONTACT_END===",
    )
    .expect("valid contact record pattern")
});

fn split_list(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn parse_contact_output(raw: &str) -> Vec<ParsedContact> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }

    let mut contacts = Vec::new();
    let mut dropped = 0usize;

    for fragment in raw.split(CONTACT_START) {
        if fragment.trim().is_empty() {
            continue;
        }
        match CONTACT_RECORD.captures(fragment) {
            Some(caps) => {
                let name = caps["name"].trim();
                let id = caps["id"].trim();
                contacts.push(ParsedContact {
                    id: if id.is_empty() {
                        None
                    } else {
                        Some(id.to_string())
                    },
                    name: if name.is_empty() {
                        "Unnamed contact".to_string()
                    } else {
                        name.to_string()
                    },
                    emails: split_list(&caps["emails"]),
                    phones: split_list(&caps["phones"]),
                });
            }
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        debug!(dropped, "dropped malformed contact fragments");
    }
    contacts
}

// ============================================================================
// AppleScript generation
// ============================================================================

/// Serialization for one contact; assumes `ctName` and `emailList` were
/// already built by the scan loop. Phone properties can be missing value,
/// which cannot be concatenated, hence the guards.
fn contact_record_lines() -> &'static str {
    r#"        set phoneList to ""
        try
            set phoneList to home phone number of ct
        end try
        if phoneList is missing value then set phoneList to ""
        try
            set bizPhone to business phone number of ct
            if bizPhone is not missing value then
                if phoneList is not "" then set phoneList to phoneList & ";"
                set phoneList to phoneList & bizPhone
            end if
        end try
        set output to output & "===CONTACT_START===" & ctName & "===ID===" & (id of ct) & "===EMAILS===" & emailList & "===PHONES===" & phoneList & "===CONTACT_END==="
"#
}

/// Shared scan over contacts; with a query it filters on display name and
/// email addresses, case-insensitively.
fn contact_scan_script(limit: usize, query: Option<&str>) -> String {
    let query_guard = match query {
        Some(q) => {
            let q = escape_applescript_string(q);
            format!(
                r#"        set keep to false
        ignoring case
            if ctName contains "{q}" then set keep to true
            if emailList contains "{q}" then set keep to true
        end ignoring
"#,
                q = q
            )
        }
        None => "        set keep to true\n".to_string(),
    };

    format!(
        r#"tell application "Microsoft Outlook"
    set ctList to contacts
    set ctCount to count of ctList
    set fetched to 0
    set output to ""
    repeat with i from 1 to ctCount
        if fetched is greater than or equal to {limit} then exit repeat
        set ct to item i of ctList
        set ctName to ""
        try
            set ctName to display name of ct
        end try
        if ctName is missing value then set ctName to ""
        set emailList to ""
        try
            repeat with em in (email addresses of ct)
                if emailList is not "" then set emailList to emailList & ";"
                set emailList to emailList & (address of em)
            end repeat
        end try
{query_guard}        if keep then
    {record}            set fetched to fetched + 1
        end if
    end repeat
    return output
end tell
"#,
        limit = limit,
        query_guard = query_guard,
        record = contact_record_lines(),
    )
}

fn script_create_contact(
    first_name: &str,
    last_name: &str,
    email: Option<&str>,
    phone: Option<&str>,
    company: Option<&str>,
) -> String {
    let mut props = format!(
        "first name:\"{}\", last name:\"{}\"",
        escape_applescript_string(first_name),
        escape_applescript_string(last_name),
    );
    if let Some(phone) = phone {
        props.push_str(&format!(
            ", business phone number:\"{}\"",
            escape_applescript_string(phone)
        ));
    }
    if let Some(company) = company {
        props.push_str(&format!(
            ", company:\"{}\"",
            escape_applescript_string(company)
        ));
    }
    let email_stmt = match email {
        Some(email) => format!(
            "    make new email address at newContact with properties {{address:\"{}\"}}\n",
            escape_applescript_string(email)
        ),
        None => String::new(),
    };
    format!(
        "tell application \"Microsoft Outlook\"\n    set newContact to make new contact with properties {{{props}}}\n{email_stmt}    return (id of newContact) as string\nend tell\n",
        props = props,
        email_stmt = email_stmt,
    )
}

// ============================================================================
// Connector implementation
// ============================================================================

fn str_arg<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

fn require_str<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str, ConnectorError> {
    str_arg(args, key)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ConnectorError::InvalidParams(format!("Missing '{}'", key)))
}

fn limit_arg(args: &Map<String, Value>) -> usize {
    args.get("limit")
        .and_then(|v| v.as_u64())
        .unwrap_or(DEFAULT_CONTACT_LIMIT)
        .min(MAX_CONTACT_LIMIT) as usize
}

#[async_trait]
impl Connector for OutlookContactsConnector {
    fn name(&self) -> &'static str {
        "outlook_contacts"
    }

    fn description(&self) -> &'static str {
        "Microsoft Outlook contacts via AppleScript (macOS)"
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
                "Contact tools backed by the local Microsoft Outlook application.".to_string(),
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
            Tool {
                name: Cow::Borrowed("list_contacts"),
                title: Some("List Contacts".to_string()),
                description: Some(Cow::Borrowed(
                    "List contacts with name, email addresses, and phone numbers.",
                )),
                input_schema: Arc::new(
                    json!({
                        "type": "object",
                        "properties": {
                            "limit": {
                                "type": "integer",
                                "description": "Maximum contacts to return. Default: 50, Max: 200.",
                                "default": 50
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
                name: Cow::Borrowed("search_contacts"),
                title: Some("Search Contacts".to_string()),
                description: Some(Cow::Borrowed(
                    "Search contacts whose name or email contains the query (case-insensitive).",
                )),
                input_schema: Arc::new(
                    json!({
                        "type": "object",
                        "properties": {
                            "query": {
                                "type": "string",
                                "description": "Text to match against name and emails. Required."
                            },
                            "limit": {
                                "type": "integer",
                                "description": "Maximum matches to return. Default: 50, Max: 200.",
                                "default": 50
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
                name: Cow::Borrowed("create_contact"),
                title: Some("Create Contact".to_string()),
                description: Some(Cow::Borrowed(
                    "Create a contact with name and optional email and phone. Returns the new contact's id.",
                )),
                input_schema: Arc::new(
                    json!({
                        "type": "object",
                        "properties": {
                            "first_name": {"type": "string", "description": "Given name. Required."},
                            "last_name": {"type": "string", "description": "Family name. Required."},
                            "email": {"type": "string", "description": "Primary email address."},
                            "phone": {"type": "string", "description": "Business phone number."},
                            "company": {"type": "string", "description": "Company name."}
                        },
                        "required": ["first_name", "last_name"]
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

        match name {
            "list_contacts" => {
                let limit = limit_arg(&args);
                ensure_app_running(OUTLOOK_APP).await?;
                let output =
                    run_applescript_output(&contact_scan_script(limit, None)).await?;
                let contacts = parse_contact_output(&output);
                structured_result_with_text(&json!({"contacts": contacts}), None)
            }

            "search_contacts" => {
                let query = require_str(&args, "query")?;
                let limit = limit_arg(&args);
                ensure_app_running(OUTLOOK_APP).await?;
                let output =
                    run_applescript_output(&contact_scan_script(limit, Some(query))).await?;
                let contacts = parse_contact_output(&output);
                structured_result_with_text(
                    &json!({"contacts": contacts, "query": query}),
                    None,
                )
            }

            "create_contact" => {
                let first_name = require_str(&args, "first_name")?;
                let last_name = require_str(&args, "last_name")?;
                let email = str_arg(&args, "email");
                let phone = str_arg(&args, "phone");
                let company = str_arg(&args, "company");
                ensure_app_running(OUTLOOK_APP).await?;
                let output = run_applescript_output(&script_create_contact(
                    first_name, last_name, email, phone, company,
                ))
                .await?;
                structured_result_with_text(
                    &json!({"status": "created", "contact_id": output.trim()}),
                    None,
                )
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

    #[test]
    fn test_parse_contact_output() {
        let raw = "===CONTACT_START===Ada Lovelace===ID===12===EMAILS===ada@x.com;ada@y.org===PHONES===555-0100===CONTACT_END===";
        let contacts = parse_contact_output(raw);
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].name, "Ada Lovelace");
        assert_eq!(contacts[0].emails, vec!["ada@x.com", "ada@y.org"]);
        assert_eq!(contacts[0].phones, vec!["555-0100"]);
    }

    #[test]
    fn test_parse_contact_empty_lists() {
        let raw = "===CONTACT_START===X===ID===1===EMAILS======PHONES======CONTACT_END===";
        let contacts = parse_contact_output(raw);
        assert!(contacts[0].emails.is_empty());
        assert!(contacts[0].phones.is_empty());
    }

    #[test]
    fn test_search_script_escapes_query() {
        let script = contact_scan_script(10, Some(r#"O"Brien"#));
        assert!(script.contains(r#"contains "O\"Brien""#));
        assert!(script.contains("ignoring case"));
    }

    #[test]
    fn test_create_contact_script() {
        let script = script_create_contact(
            "Ada",
            "Lovelace",
            Some("ada@x.com"),
            Some("555-0100"),
            Some("Analytical Engines Ltd"),
        );
        assert!(script.contains(r#"first name:"Ada""#));
        assert!(script.contains(r#"address:"ada@x.com""#));
        assert!(script.contains(r#"business phone number:"555-0100""#));
        assert!(script.contains(r#"company:"Analytical Engines Ltd""#));

        let minimal = script_create_contact("A", "B", None, None, None);
        assert!(!minimal.contains("email address"));
        assert!(!minimal.contains("company:"));
    }

    #[tokio::test]
    async fn test_search_requires_query() {
        let connector = OutlookContactsConnector::new();
        let result = connector
            .call_tool(CallToolRequestParam {
                name: "search_contacts".to_string().into(),
                arguments: json!({}).as_object().cloned(),
            })
            .await;
        assert!(matches!(result, Err(ConnectorError::InvalidParams(_))));
    }
}
