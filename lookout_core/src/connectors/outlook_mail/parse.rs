// Parsing of sentinel-delimited AppleScript output.
//
// The sentinel strings are a stable contract with the generated scripts in
// `script.rs`; changing one side breaks the other. Parsing is lenient:
// fragments that do not match the expected shape are dropped and counted,
// never turned into hard errors, so one malformed record cannot take down a
// whole listing.

use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const EMAIL_START: &str = "===EMAIL_START===";
pub const EMAIL_END: &str = "===EMAIL_END===";
pub const FOLDER_MARK: &str = "===FOLDER===";
pub const TRASH_MARK: &str = "===TRASH===";
pub const FIELD_SEP: &str = ":::";

/// One email parsed from script output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParsedEmail {
    /// Missing on output from older script shapes without an ID field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub subject: String,
    pub sender: String,
    pub date: String,
    pub content: String,
}

static EMAIL_WITH_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?s)^(?P<subject>.*?)===ID===(?P<id>.*?)===FROM===(?P<sender>.*?)===DATE===(?P<date>.*?)===CONTENT===(?P<content>.*?)===EMAIL_END===",
    )
    .expect("valid email record pattern")
});

// Shape without the ID field, kept for scripts that never emit one.
static EMAIL_LEGACY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?s)^(?P<subject>.*?)===FROM===(?P<sender>.*?)===DATE===(?P<date>.*?)===CONTENT===(?P<content>.*?)===EMAIL_END===",
    )
    .expect("valid legacy email record pattern")
});

fn non_empty_or(value: &str, default: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        default.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Parse a batch of sentinel-delimited email records.
///
/// Whitespace-only input is an empty result, not an error. Fragments that
/// match neither record shape are dropped; the drop count is logged at debug.
pub fn parse_email_output(raw: &str) -> Vec<ParsedEmail> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }

    let mut emails = Vec::new();
    let mut dropped = 0usize;

    for fragment in raw.split(EMAIL_START) {
        if fragment.trim().is_empty() {
            continue;
        }
        match parse_email_fragment(fragment) {
            Some(email) => emails.push(email),
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        debug!(dropped, "dropped malformed email fragments");
    }
    emails
}

fn parse_email_fragment(fragment: &str) -> Option<ParsedEmail> {
    if let Some(caps) = EMAIL_WITH_ID.captures(fragment) {
        let id = caps["id"].trim();
        return Some(ParsedEmail {
            id: if id.is_empty() {
                None
            } else {
                Some(id.to_string())
            },
            subject: non_empty_or(&caps["subject"], "No subject"),
            sender: non_empty_or(&caps["sender"], "Unknown sender"),
            date: non_empty_or(&caps["date"], &Local::now().to_string()),
            content: non_empty_or(&caps["content"], "[Content not available]"),
        });
    }
    if let Some(caps) = EMAIL_LEGACY.captures(fragment) {
        return Some(ParsedEmail {
            id: None,
            subject: non_empty_or(&caps["subject"], "No subject"),
            sender: non_empty_or(&caps["sender"], "Unknown sender"),
            date: non_empty_or(&caps["date"], &Local::now().to_string()),
            content: non_empty_or(&caps["content"], "[Content not available]"),
        });
    }
    None
}

// ============================================================================
// Folders
// ============================================================================

/// Well-known folder roles, classified by name at the top level only.
/// A user folder named "Drafts" nested somewhere is not special.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecialFolder {
    Inbox,
    Sent,
    Drafts,
    Trash,
    Junk,
    Archive,
}

fn classify_special(name: &str) -> Option<SpecialFolder> {
    match name {
        "Inbox" => Some(SpecialFolder::Inbox),
        "Sent Items" | "Sent" => Some(SpecialFolder::Sent),
        "Drafts" => Some(SpecialFolder::Drafts),
        "Deleted Items" | "Trash" => Some(SpecialFolder::Trash),
        "Junk Email" | "Junk E-mail" | "Junk" => Some(SpecialFolder::Junk),
        "Archive" => Some(SpecialFolder::Archive),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FolderInfo {
    /// Folder names from account root to leaf.
    pub segments: Vec<String>,
    /// Slash-joined path; the input format for every folder-taking tool.
    pub path: String,
    pub name: String,
    pub account: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub special: Option<SpecialFolder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unread_count: Option<u64>,
}

/// Parse `===FOLDER===path:::account[:::count:::unread]` lines.
///
/// Unless `include_trash` is set, folders nested under a top-level trash
/// folder are filtered out here rather than in the walk script; deleted
/// subtrees are noise in a listing. Malformed lines are dropped and counted.
pub fn parse_folder_output(raw: &str, include_trash: bool) -> Vec<FolderInfo> {
    let mut folders = Vec::new();
    let mut dropped = 0usize;

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some(rest) = line.strip_prefix(FOLDER_MARK) else {
            dropped += 1;
            continue;
        };
        let mut parts = rest.split(FIELD_SEP);
        let path = parts.next().unwrap_or("").trim();
        if path.is_empty() {
            dropped += 1;
            continue;
        }
        let account = parts.next().unwrap_or("").trim().to_string();
        let message_count = parts.next().and_then(|p| p.trim().parse().ok());
        let unread_count = parts.next().and_then(|p| p.trim().parse().ok());

        let segments: Vec<&str> = path.split('/').collect();
        let name = segments.last().copied().unwrap_or(path).to_string();
        let top_special = classify_special(segments[0]);
        if !include_trash && segments.len() > 1 && top_special == Some(SpecialFolder::Trash) {
            continue;
        }
        let special = if segments.len() == 1 { top_special } else { None };

        folders.push(FolderInfo {
            segments: segments.iter().map(|s| s.to_string()).collect(),
            path: path.to_string(),
            name,
            account,
            special,
            message_count,
            unread_count,
        });
    }

    if dropped > 0 {
        debug!(dropped, "dropped malformed folder lines");
    }
    folders
}

// ============================================================================
// Trash preview
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrashPreview {
    /// Always true; marks a dry run as opposed to a confirmed deletion.
    pub preview: bool,
    pub count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_size_mb: Option<f64>,
}

/// Parse `===TRASH===count[:::oldest:::newest:::bytes]`. The script reports
/// the accumulated size in bytes; the response carries megabytes.
pub fn parse_trash_preview(raw: &str) -> Option<TrashPreview> {
    let rest = raw.trim().strip_prefix(TRASH_MARK)?;
    let mut parts = rest.split(FIELD_SEP);
    let count: u64 = parts.next()?.trim().parse().ok()?;
    let oldest = parts.next().map(|s| s.trim().to_string());
    let newest = parts.next().map(|s| s.trim().to_string());
    let total_size_mb = parts
        .next()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(|bytes| (bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0);
    Some(TrashPreview {
        preview: true,
        count,
        oldest,
        newest,
        total_size_mb,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_email() {
        let raw = "===EMAIL_START===Weekly sync===ID===1042===FROM===Ana <ana@x.com>===DATE===Monday, March 3, 2025 at 09:15:00===CONTENT===Agenda attached.===EMAIL_END===";
        let emails = parse_email_output(raw);
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].id.as_deref(), Some("1042"));
        assert_eq!(emails[0].subject, "Weekly sync");
        assert_eq!(emails[0].sender, "Ana <ana@x.com>");
        assert_eq!(emails[0].content, "Agenda attached.");
    }

    #[test]
    fn test_parse_multiple_emails() {
        let raw = "===EMAIL_START===A===ID===1===FROM===a@x===DATE===d1===CONTENT===c1===EMAIL_END======EMAIL_START===B===ID===2===FROM===b@x===DATE===d2===CONTENT===c2===EMAIL_END===";
        let emails = parse_email_output(raw);
        assert_eq!(emails.len(), 2);
        assert_eq!(emails[0].subject, "A");
        assert_eq!(emails[1].id.as_deref(), Some("2"));
    }

    #[test]
    fn test_parse_empty_and_whitespace() {
        assert!(parse_email_output("").is_empty());
        assert!(parse_email_output("   \n  ").is_empty());
    }

    #[test]
    fn test_parse_defaults_for_empty_fields() {
        let raw = "===EMAIL_START======ID======FROM======DATE===d===CONTENT======EMAIL_END===";
        let emails = parse_email_output(raw);
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].id, None);
        assert_eq!(emails[0].subject, "No subject");
        assert_eq!(emails[0].sender, "Unknown sender");
        assert_eq!(emails[0].content, "[Content not available]");
    }

    #[test]
    fn test_parse_legacy_shape_without_id() {
        let raw = "===EMAIL_START===Old===FROM===x@y===DATE===d===CONTENT===c===EMAIL_END===";
        let emails = parse_email_output(raw);
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].id, None);
        assert_eq!(emails[0].subject, "Old");
    }

    #[test]
    fn test_malformed_fragment_dropped_not_fatal() {
        let raw = "===EMAIL_START===broken record no terminator===EMAIL_START===Good===ID===9===FROM===g@x===DATE===d===CONTENT===c===EMAIL_END===";
        let emails = parse_email_output(raw);
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].subject, "Good");
    }

    #[test]
    fn test_content_with_newlines() {
        let raw = "===EMAIL_START===S===ID===3===FROM===a@x===DATE===d===CONTENT===line one\nline two===EMAIL_END===";
        let emails = parse_email_output(raw);
        assert_eq!(emails[0].content, "line one\nline two");
    }

    #[test]
    fn test_parse_folders_with_nesting_order() {
        let raw = "===FOLDER===Parent:::Work\n===FOLDER===Parent/Child:::Work\n===FOLDER===Parent/Child/Grandchild:::Work\n";
        let folders = parse_folder_output(raw, false);
        assert_eq!(folders.len(), 3);
        assert_eq!(folders[0].path, "Parent");
        assert_eq!(folders[1].path, "Parent/Child");
        assert_eq!(folders[1].name, "Child");
        assert_eq!(folders[2].path, "Parent/Child/Grandchild");
        assert_eq!(folders[2].name, "Grandchild");
        assert_eq!(folders[2].segments, vec!["Parent", "Child", "Grandchild"]);
        assert_eq!(folders[0].segments, vec!["Parent"]);
    }

    #[test]
    fn test_folder_special_classification_top_level_only() {
        let raw = "===FOLDER===Inbox:::Work\n===FOLDER===Sent Items:::Work\n===FOLDER===Projects/Drafts:::Work\n";
        let folders = parse_folder_output(raw, false);
        assert_eq!(folders[0].special, Some(SpecialFolder::Inbox));
        assert_eq!(folders[1].special, Some(SpecialFolder::Sent));
        // Nested folder named like a special one is not special
        assert_eq!(folders[2].special, None);
    }

    #[test]
    fn test_folders_under_trash_excluded() {
        let raw = "===FOLDER===Deleted Items:::Work\n===FOLDER===Deleted Items/Old Stuff:::Work\n===FOLDER===Archive:::Work\n";
        let folders = parse_folder_output(raw, false);
        assert_eq!(folders.len(), 2);
        assert_eq!(folders[0].path, "Deleted Items");
        assert_eq!(folders[0].special, Some(SpecialFolder::Trash));
        assert_eq!(folders[1].path, "Archive");
    }

    #[test]
    fn test_include_trash_keeps_descendants() {
        let raw = "===FOLDER===Deleted Items:::Work\n===FOLDER===Deleted Items/Old Stuff:::Work\n";
        let folders = parse_folder_output(raw, true);
        assert_eq!(folders.len(), 2);
        assert_eq!(folders[1].path, "Deleted Items/Old Stuff");
        assert_eq!(folders[1].special, None);
    }

    #[test]
    fn test_folder_counts() {
        let raw = "===FOLDER===Inbox:::Work:::120:::7\n";
        let folders = parse_folder_output(raw, false);
        assert_eq!(folders[0].message_count, Some(120));
        assert_eq!(folders[0].unread_count, Some(7));

        let no_counts = parse_folder_output("===FOLDER===Inbox:::Work\n", false);
        assert_eq!(no_counts[0].message_count, None);
    }

    #[test]
    fn test_folder_malformed_lines_dropped() {
        let raw = "garbage\n===FOLDER===:::Work\n===FOLDER===Real:::Work\n";
        let folders = parse_folder_output(raw, false);
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].path, "Real");
    }

    #[test]
    fn test_trash_preview_full() {
        let preview =
            parse_trash_preview("===TRASH===42:::Jan 1:::Mar 5:::1048576").unwrap();
        assert!(preview.preview);
        assert_eq!(preview.count, 42);
        assert_eq!(preview.oldest.as_deref(), Some("Jan 1"));
        assert_eq!(preview.newest.as_deref(), Some("Mar 5"));
        assert_eq!(preview.total_size_mb, Some(1.0));
    }

    #[test]
    fn test_trash_preview_empty_trash() {
        let preview = parse_trash_preview("===TRASH===0").unwrap();
        assert!(preview.preview);
        assert_eq!(preview.count, 0);
        assert!(preview.oldest.is_none());
        assert!(parse_trash_preview("nonsense").is_none());
    }

    #[test]
    fn test_trash_preview_serialized_in_megabytes() {
        let preview =
            parse_trash_preview("===TRASH===3:::Jan 1:::Mar 5:::2621440").unwrap();
        let value = serde_json::to_value(&preview).unwrap();
        assert_eq!(value["preview"], serde_json::json!(true));
        assert_eq!(value["total_size_mb"], serde_json::json!(2.5));
        assert!(value.get("total_bytes").is_none());
    }
}
