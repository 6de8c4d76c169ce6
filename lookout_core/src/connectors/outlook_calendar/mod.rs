// Outlook Calendar Connector - event access via AppleScript
//
// Same wire pattern as the mail connector: generated scripts emit
// sentinel-delimited records, parsed leniently on the Rust side.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDateTime, Timelike};
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

const EVENT_START: &str = "===EVENT_START===";

const DEFAULT_EVENT_LIMIT: u64 = 20;
const MAX_EVENT_LIMIT: u64 = 100;

/// Outlook calendar connector - list, create, update, and delete events
#[derive(Default)]
pub struct OutlookCalendarConnector;

impl OutlookCalendarConnector {
    pub fn new() -> Self {
        Self {}
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParsedEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub subject: String,
    pub starts: String,
    pub ends: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

static EVENT_RECORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?s)^(?P<subject>.*?)===ID===(?P<id>.*?)===STARTS===(?P<starts>.*?)===ENDS===(?P<ends>.*?)===LOCATION===(?P<location>.*?)===NOTES===(?P<notes>.*?)===EVENT_END===",
    )
    .expect("valid event record pattern")
});

fn opt_field(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Lenient sentinel parsing; malformed fragments are dropped and counted.
pub fn parse_event_output(raw: &str) -> Vec<ParsedEvent> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }

    let mut events = Vec::new();
    let mut dropped = 0usize;

    for fragment in raw.split(EVENT_START) {
        if fragment.trim().is_empty() {
            continue;
        }
        match EVENT_RECORD.captures(fragment) {
            Some(caps) => {
                let subject = caps["subject"].trim();
                events.push(ParsedEvent {
                    id: opt_field(&caps["id"]),
                    subject: if subject.is_empty() {
                        "Untitled event".to_string()
                    } else {
                        subject.to_string()
                    },
                    starts: caps["starts"].trim().to_string(),
                    ends: caps["ends"].trim().to_string(),
                    location: opt_field(&caps["location"]),
                    notes: opt_field(&caps["notes"]),
                });
            }
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        debug!(dropped, "dropped malformed event fragments");
    }
    events
}

// ============================================================================
// AppleScript generation
// ============================================================================

fn parse_datetime(s: &str) -> Result<NaiveDateTime, ConnectorError> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M"))
        .map_err(|_| {
            ConnectorError::InvalidParams(format!(
                "Invalid datetime '{}', expected YYYY-MM-DD HH:MM",
                s
            ))
        })
}

/// Build a date variable for an exact timestamp. Day is reset to 1 before
/// the month assignment so an out-of-range day never overflows the month.
fn applescript_datetime(var: &str, dt: NaiveDateTime) -> String {
    let seconds = dt.hour() * 3600 + dt.minute() * 60 + dt.second();
    format!(
        "    set {var} to (current date)\n    set time of {var} to {secs}\n    set day of {var} to 1\n    set year of {var} to {y}\n    set month of {var} to {m}\n    set day of {var} to {d}\n",
        var = var,
        secs = seconds,
        y = dt.year(),
        m = dt.month(),
        d = dt.day(),
    )
}

// Optional properties come back as missing value, which cannot be
// concatenated; each one is guarded before the record is appended.
fn event_record_lines() -> &'static str {
    r#"        set evSubject to ""
        try
            set evSubject to subject of ev
        end try
        if evSubject is missing value then set evSubject to ""
        set evLocation to ""
        try
            set evLocation to location of ev
        end try
        if evLocation is missing value then set evLocation to ""
        set evNotes to ""
        try
            set evNotes to content of ev
        end try
        if evNotes is missing value then set evNotes to ""
        set output to output & "===EVENT_START===" & evSubject & "===ID===" & (id of ev) & "===STARTS===" & ((start time of ev) as string) & "===ENDS===" & ((end time of ev) as string) & "===LOCATION===" & evLocation & "===NOTES===" & evNotes & "===EVENT_END==="
"#
}

fn script_list_events(
    window: &(Option<NaiveDateTime>, Option<NaiveDateTime>),
    limit: usize,
) -> String {
    let mut setup = String::new();
    let mut guard = String::new();
    if let Some(start) = window.0 {
        setup.push_str(&applescript_datetime("rangeStart", start));
        guard.push_str("        if evDate < rangeStart then set inRange to false\n");
    }
    if let Some(end) = window.1 {
        setup.push_str(&applescript_datetime("rangeEnd", end));
        guard.push_str("        if evDate > rangeEnd then set inRange to false\n");
    }

    format!(
        r#"tell application "Microsoft Outlook"
{setup}    set evList to calendar events
    set evCount to count of evList
    set fetched to 0
    set output to ""
    repeat with i from 1 to evCount
        if fetched is greater than or equal to {limit} then exit repeat
        set ev to item i of evList
        set evDate to start time of ev
        set inRange to true
{guard}        if inRange then
    {record}            set fetched to fetched + 1
        end if
    end repeat
    return output
end tell
"#,
        setup = setup,
        limit = limit,
        guard = guard,
        record = event_record_lines(),
    )
}

fn script_create_event(
    subject: &str,
    start: NaiveDateTime,
    end: NaiveDateTime,
    location: Option<&str>,
    notes: Option<&str>,
    all_day: bool,
) -> String {
    let mut props = format!(
        "subject:\"{}\", start time:theStart, end time:theEnd",
        escape_applescript_string(subject)
    );
    if all_day {
        props.push_str(", all day flag:true");
    }
    if let Some(location) = location {
        props.push_str(&format!(
            ", location:\"{}\"",
            escape_applescript_string(location)
        ));
    }
    if let Some(notes) = notes {
        props.push_str(&format!(", content:\"{}\"", escape_applescript_string(notes)));
    }
    format!(
        "tell application \"Microsoft Outlook\"\n{start_var}{end_var}    set newEvent to make new calendar event with properties {{{props}}}\n    return (id of newEvent) as string\nend tell\n",
        start_var = applescript_datetime("theStart", start),
        end_var = applescript_datetime("theEnd", end),
        props = props,
    )
}

struct EventUpdate<'a> {
    subject: Option<&'a str>,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
    location: Option<&'a str>,
    notes: Option<&'a str>,
}

impl EventUpdate<'_> {
    fn is_empty(&self) -> bool {
        self.subject.is_none()
            && self.start.is_none()
            && self.end.is_none()
            && self.location.is_none()
            && self.notes.is_none()
    }
}

fn script_update_event(event_id: i64, update: &EventUpdate<'_>) -> String {
    let mut script = String::from("tell application \"Microsoft Outlook\"\n");
    if let Some(start) = update.start {
        script.push_str(&applescript_datetime("theStart", start));
    }
    if let Some(end) = update.end {
        script.push_str(&applescript_datetime("theEnd", end));
    }
    script.push_str(&format!(
        "    set ev to calendar event id {}\n",
        event_id
    ));
    if let Some(subject) = update.subject {
        script.push_str(&format!(
            "    set subject of ev to \"{}\"\n",
            escape_applescript_string(subject)
        ));
    }
    if update.start.is_some() {
        script.push_str("    set start time of ev to theStart\n");
    }
    if update.end.is_some() {
        script.push_str("    set end time of ev to theEnd\n");
    }
    if let Some(location) = update.location {
        script.push_str(&format!(
            "    set location of ev to \"{}\"\n",
            escape_applescript_string(location)
        ));
    }
    if let Some(notes) = update.notes {
        script.push_str(&format!(
            "    set content of ev to \"{}\"\n",
            escape_applescript_string(notes)
        ));
    }
    script.push_str("    return \"updated\"\nend tell\n");
    script
}

fn script_delete_event(event_id: i64) -> String {
    format!(
        "tell application \"Microsoft Outlook\"\n    delete (calendar event id {})\n    return \"deleted\"\nend tell\n",
        event_id,
    )
}

// ============================================================================
// Argument handling
// ============================================================================

fn str_arg<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

fn require_str<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str, ConnectorError> {
    str_arg(args, key)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ConnectorError::InvalidParams(format!("Missing '{}'", key)))
}

fn require_event_id(args: &Map<String, Value>) -> Result<i64, ConnectorError> {
    let value = args
        .get("event_id")
        .ok_or_else(|| ConnectorError::InvalidParams("Missing 'event_id'".to_string()))?;
    let id = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    id.ok_or_else(|| {
        ConnectorError::InvalidParams("'event_id' must be a numeric Outlook event id".to_string())
    })
}

// ============================================================================
// Connector implementation
// ============================================================================

#[async_trait]
impl Connector for OutlookCalendarConnector {
    fn name(&self) -> &'static str {
        "outlook_calendar"
    }

    fn description(&self) -> &'static str {
        "Microsoft Outlook calendar via AppleScript (macOS)"
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
                "Calendar tools backed by the local Microsoft Outlook application. Datetimes \
                 use 'YYYY-MM-DD HH:MM' in local time; event ids come from list_events results."
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
            Tool {
                name: Cow::Borrowed("list_events"),
                title: Some("List Events".to_string()),
                description: Some(Cow::Borrowed(
                    "List calendar events with subject, start/end times, location, and notes. Optional datetime window.",
                )),
                input_schema: Arc::new(
                    json!({
                        "type": "object",
                        "properties": {
                            "start": {
                                "type": "string",
                                "description": "Earliest start time to include, YYYY-MM-DD HH:MM."
                            },
                            "end": {
                                "type": "string",
                                "description": "Latest start time to include, YYYY-MM-DD HH:MM."
                            },
                            "limit": {
                                "type": "integer",
                                "description": "Maximum events to return. Default: 20, Max: 100.",
                                "default": 20
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
                name: Cow::Borrowed("create_event"),
                title: Some("Create Event".to_string()),
                description: Some(Cow::Borrowed(
                    "Create a calendar event. Returns the new event's id.",
                )),
                input_schema: Arc::new(
                    json!({
                        "type": "object",
                        "properties": {
                            "subject": {"type": "string", "description": "Event title. Required."},
                            "start": {
                                "type": "string",
                                "description": "Start time, YYYY-MM-DD HH:MM. Required."
                            },
                            "end": {
                                "type": "string",
                                "description": "End time, YYYY-MM-DD HH:MM. Required."
                            },
                            "location": {"type": "string", "description": "Event location."},
                            "notes": {"type": "string", "description": "Event body text."},
                            "all_day": {
                                "type": "boolean",
                                "description": "Create as an all-day event. Default: false.",
                                "default": false
                            }
                        },
                        "required": ["subject", "start", "end"]
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
                name: Cow::Borrowed("update_event"),
                title: Some("Update Event".to_string()),
                description: Some(Cow::Borrowed(
                    "Update fields of an existing event by id. Only the provided fields change.",
                )),
                input_schema: Arc::new(
                    json!({
                        "type": "object",
                        "properties": {
                            "event_id": {
                                "type": "string",
                                "description": "Numeric event id from list_events. Required."
                            },
                            "subject": {"type": "string", "description": "New title."},
                            "start": {"type": "string", "description": "New start time, YYYY-MM-DD HH:MM."},
                            "end": {"type": "string", "description": "New end time, YYYY-MM-DD HH:MM."},
                            "location": {"type": "string", "description": "New location."},
                            "notes": {"type": "string", "description": "New body text."}
                        },
                        "required": ["event_id"]
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
                name: Cow::Borrowed("delete_event"),
                title: Some("Delete Event".to_string()),
                description: Some(Cow::Borrowed("Delete a calendar event by id.")),
                input_schema: Arc::new(
                    json!({
                        "type": "object",
                        "properties": {
                            "event_id": {
                                "type": "string",
                                "description": "Numeric event id from list_events. Required."
                            }
                        },
                        "required": ["event_id"]
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
            "list_events" => {
                let window = (
                    str_arg(&args, "start").map(parse_datetime).transpose()?,
                    str_arg(&args, "end").map(parse_datetime).transpose()?,
                );
                let limit = args
                    .get("limit")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(DEFAULT_EVENT_LIMIT)
                    .min(MAX_EVENT_LIMIT) as usize;
                ensure_app_running(OUTLOOK_APP).await?;
                let output =
                    run_applescript_output(&script_list_events(&window, limit)).await?;
                let events = parse_event_output(&output);
                structured_result_with_text(&json!({"events": events}), None)
            }

            "create_event" => {
                let subject = require_str(&args, "subject")?;
                let start = parse_datetime(require_str(&args, "start")?)?;
                let end = parse_datetime(require_str(&args, "end")?)?;
                if end < start {
                    return Err(ConnectorError::InvalidParams(
                        "'end' must not be earlier than 'start'".to_string(),
                    ));
                }
                let location = str_arg(&args, "location");
                let notes = str_arg(&args, "notes");
                let all_day = args
                    .get("all_day")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                ensure_app_running(OUTLOOK_APP).await?;
                let output = run_applescript_output(&script_create_event(
                    subject, start, end, location, notes, all_day,
                ))
                .await?;
                structured_result_with_text(
                    &json!({"status": "created", "event_id": output.trim()}),
                    None,
                )
            }

            "update_event" => {
                let event_id = require_event_id(&args)?;
                let update = EventUpdate {
                    subject: str_arg(&args, "subject"),
                    start: str_arg(&args, "start").map(parse_datetime).transpose()?,
                    end: str_arg(&args, "end").map(parse_datetime).transpose()?,
                    location: str_arg(&args, "location"),
                    notes: str_arg(&args, "notes"),
                };
                if update.is_empty() {
                    return Err(ConnectorError::InvalidParams(
                        "No fields to update".to_string(),
                    ));
                }
                ensure_app_running(OUTLOOK_APP).await?;
                run_applescript_output(&script_update_event(event_id, &update)).await?;
                structured_result_with_text(
                    &json!({"success": true, "message": "Event updated"}),
                    None,
                )
            }

            "delete_event" => {
                let event_id = require_event_id(&args)?;
                ensure_app_running(OUTLOOK_APP).await?;
                run_applescript_output(&script_delete_event(event_id)).await?;
                structured_result_with_text(
                    &json!({"success": true, "message": "Event deleted"}),
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
    fn test_parse_event_output() {
        let raw = "===EVENT_START===Standup===ID===55===STARTS===Monday at 09:00===ENDS===Monday at 09:15===LOCATION===Room 2===NOTES======EVENT_END===";
        let events = parse_event_output(raw);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].subject, "Standup");
        assert_eq!(events[0].id.as_deref(), Some("55"));
        assert_eq!(events[0].location.as_deref(), Some("Room 2"));
        assert_eq!(events[0].notes, None);
    }

    #[test]
    fn test_parse_event_empty_and_malformed() {
        assert!(parse_event_output("  ").is_empty());
        let raw = "===EVENT_START===broken===EVENT_START===OK===ID===1===STARTS===s===ENDS===e===LOCATION======NOTES======EVENT_END===";
        let events = parse_event_output(raw);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].subject, "OK");
    }

    #[test]
    fn test_parse_datetime_formats() {
        assert!(parse_datetime("2025-06-01 14:30").is_ok());
        assert!(parse_datetime("2025-06-01 14:30:15").is_ok());
        assert!(parse_datetime("June 1 2025").is_err());
    }

    #[test]
    fn test_create_event_script() {
        let start = parse_datetime("2025-06-01 14:30").unwrap();
        let end = parse_datetime("2025-06-01 15:00").unwrap();
        let script = script_create_event("Review \"Q2\"", start, end, Some("HQ"), None, false);
        assert!(script.contains(r#"subject:"Review \"Q2\"""#));
        assert!(script.contains("set time of theStart to 52200"));
        assert!(script.contains("set time of theEnd to 54000"));
        assert!(script.contains(r#"location:"HQ""#));
        assert!(!script.contains("content:"));
        assert!(!script.contains("all day flag"));

        let all_day = script_create_event("Offsite", start, end, None, None, true);
        assert!(all_day.contains("all day flag:true"));
    }

    #[test]
    fn test_update_event_script_only_given_fields() {
        let update = EventUpdate {
            subject: Some("New title"),
            start: None,
            end: None,
            location: None,
            notes: Some("agenda"),
        };
        let script = script_update_event(9, &update);
        assert!(script.contains("calendar event id 9"));
        assert!(script.contains(r#"set subject of ev to "New title""#));
        assert!(script.contains(r#"set content of ev to "agenda""#));
        assert!(!script.contains("start time of ev"));
        assert!(!script.contains("location of ev"));
    }

    #[tokio::test]
    async fn test_create_event_rejects_inverted_window() {
        let connector = OutlookCalendarConnector::new();
        let result = connector
            .call_tool(CallToolRequestParam {
                name: "create_event".to_string().into(),
                arguments: json!({
                    "subject": "x",
                    "start": "2025-06-02 10:00",
                    "end": "2025-06-01 10:00"
                })
                .as_object()
                .cloned(),
            })
            .await;
        assert!(matches!(result, Err(ConnectorError::InvalidParams(_))));
    }

    #[tokio::test]
    async fn test_update_event_requires_fields() {
        let connector = OutlookCalendarConnector::new();
        let result = connector
            .call_tool(CallToolRequestParam {
                name: "update_event".to_string().into(),
                arguments: json!({"event_id": "4"}).as_object().cloned(),
            })
            .await;
        assert!(matches!(result, Err(ConnectorError::InvalidParams(_))));
    }
}
