// AppleScript generation for the Outlook mail connector.
//
// This module is the only place allowed to interpolate raw strings into
// script source. Every quoted literal goes through `escape_applescript_string`
// exactly once, every recipient list is exploded into individual
// `make new ... recipient` statements, and every folder identifier resolves
// through `folder_ref`.

use std::path::Path;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::connectors::outlook_common::escape_applescript_string;
use crate::error::ConnectorError;

/// One parsed recipient. `address` keeps the full display form
/// ("Jane Doe <jane@x.com>") when one was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailRecipient {
    pub name: String,
    pub address: String,
}

impl EmailRecipient {
    /// The plain email portion, with any `Name <...>` wrapper stripped.
    /// Outlook reports bare addresses, so matching against an existing
    /// recipient must use this form.
    pub fn bare_address(&self) -> &str {
        match (self.address.rfind('<'), self.address.rfind('>')) {
            (Some(lt), Some(gt)) if lt < gt => self.address[lt + 1..gt].trim(),
            _ => self.address.trim(),
        }
    }
}

/// Split a comma-separated address list into structured recipients.
///
/// Segments are trimmed; "Display Name <addr>" keeps the pre-`<` text as the
/// name, otherwise the name is the part of the address before the first `@`.
/// Never fails; an empty input yields one recipient with an empty address.
pub fn parse_recipients(raw: &str) -> Vec<EmailRecipient> {
    raw.split(',')
        .map(|segment| {
            let segment = segment.trim();
            if let Some(lt) = segment.find('<') {
                if lt > 0 && segment.ends_with('>') {
                    return EmailRecipient {
                        name: segment[..lt].trim().to_string(),
                        address: segment.to_string(),
                    };
                }
            }
            let name = segment.split('@').next().unwrap_or("").to_string();
            EmailRecipient {
                name,
                address: segment.to_string(),
            }
        })
        .collect()
}

/// Canonical folder resolver. Every folder-taking operation goes through here.
///
/// - the literal `"Inbox"` resolves to Outlook's built-in `inbox` token
/// - a name without `/` is a named lookup, case-sensitive ("inbox" is a
///   folder literally called inbox, not the default inbox)
/// - `"A/B/C"` nests leaf-first: `mail folder "C" of mail folder "B" of
///   mail folder "A"`, at arbitrary depth
///
/// No escaping happens here; callers pass pre-escaped segments.
pub fn folder_ref(path_or_name: &str) -> String {
    if path_or_name == "Inbox" {
        return "inbox".to_string();
    }
    if !path_or_name.contains('/') {
        return format!(r#"mail folder "{}""#, path_or_name);
    }

    let mut segments = path_or_name.split('/').rev();
    let leaf = segments.next().unwrap_or_default();
    let mut expr = format!(r#"mail folder "{}""#, leaf);
    for parent in segments {
        expr.push_str(&format!(r#" of mail folder "{}""#, parent));
    }
    expr
}

/// Escape a raw folder identifier and resolve it. The slash separator is
/// unaffected by escaping, so the whole path is escaped in one pass.
pub fn folder_expr(raw: &str) -> String {
    folder_ref(&escape_applescript_string(raw))
}

static HTML_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<(strong|span|table|div|img|em|hr|h[1-6]|ul|ol|li|br|a|b|i|p)[>\s/]")
        .expect("valid html tag pattern")
});

/// Heuristic HTML classification for a message body. Only consulted when the
/// caller did not pass an explicit content-type flag.
pub fn looks_like_html(body: &str) -> bool {
    HTML_TAG.is_match(body)
}

// ============================================================================
// Date handling
// ============================================================================

/// Calendar-date range filter (no time of day). Start is widened to the
/// start of its day, end to the end of its day.
#[derive(Debug, Clone, Default)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn from_args(start: Option<&str>, end: Option<&str>) -> Result<Self, ConnectorError> {
        Ok(Self {
            start: start.map(parse_date).transpose()?,
            end: end.map(parse_date).transpose()?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Statements declaring `rangeStart` / `rangeEnd` variables.
    pub fn setup_lines(&self) -> String {
        let mut lines = String::new();
        if let Some(start) = self.start {
            lines.push_str(&applescript_day_bound("rangeStart", start, false));
        }
        if let Some(end) = self.end {
            lines.push_str(&applescript_day_bound("rangeEnd", end, true));
        }
        lines
    }

    /// Statements narrowing an `inRange` flag for the current `msgDate`.
    /// Out-of-range records are skipped, never the rest of the scan: the
    /// folder is not assumed to be date-sorted.
    pub fn guard_lines(&self) -> String {
        let mut lines = String::new();
        if self.start.is_some() {
            lines.push_str("        if msgDate < rangeStart then set inRange to false\n");
        }
        if self.end.is_some() {
            lines.push_str("        if msgDate > rangeEnd then set inRange to false\n");
        }
        lines
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, ConnectorError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
        ConnectorError::InvalidParams(format!("Invalid date '{}', expected YYYY-MM-DD", s))
    })
}

/// Build a date variable pinned to the start (time 0) or end (time 86399)
/// of the given calendar day. Day is reset to 1 before the month assignment
/// so an out-of-range day never overflows into the next month.
fn applescript_day_bound(var: &str, date: NaiveDate, end_of_day: bool) -> String {
    use chrono::Datelike;
    let time = if end_of_day { 86399 } else { 0 };
    format!(
        "    set {var} to (current date)\n    set time of {var} to {time}\n    set day of {var} to 1\n    set year of {var} to {y}\n    set month of {var} to {m}\n    set day of {var} to {d}\n",
        var = var,
        time = time,
        y = date.year(),
        m = date.month(),
        d = date.day(),
    )
}

// ============================================================================
// Message serialization snippets
// ============================================================================

/// Lines resolving a display string for the sender of `msg` into `theSender`.
fn sender_lines() -> &'static str {
    r#"        set theSender to ""
        try
            set senderRec to sender of msg
            set theSender to (name of senderRec) & " <" & (address of senderRec) & ">"
        end try
"#
}

/// Lines resolving `msgSubject`, guarded because a subject can be
/// `missing value` and would abort the concatenation.
fn subject_lines() -> &'static str {
    r#"        set msgSubject to ""
        try
            set msgSubject to subject of msg
        end try
        if msgSubject is missing value then set msgSubject to ""
"#
}

/// Append one sentinel-delimited record for `msg` to `output`. Assumes
/// `theSender` and `msgSubject` have been resolved.
fn email_record_lines() -> &'static str {
    r#"        set msgContent to ""
        try
            set msgContent to plain text content of msg
        end try
        if msgContent is missing value then set msgContent to ""
        set output to output & "===EMAIL_START===" & msgSubject & "===ID===" & (id of msg) & "===FROM===" & theSender & "===DATE===" & ((time received of msg) as string) & "===CONTENT===" & msgContent & "===EMAIL_END==="
"#
}

// ============================================================================
// Compose (send / draft / reply / forward)
// ============================================================================

/// Preprocessed compose input shared by every send strategy. Built once per
/// request so all fallback tiers use identical escaping and recipient
/// explosion.
#[derive(Debug, Clone)]
pub struct ComposePlan {
    /// Escaped, ready for embedding.
    pub subject: String,
    /// Escaped, ready for embedding.
    pub body: String,
    pub html: bool,
    pub to: Vec<EmailRecipient>,
    pub cc: Vec<EmailRecipient>,
    pub bcc: Vec<EmailRecipient>,
    /// Absolute file paths.
    pub attachments: Vec<String>,
}

impl ComposePlan {
    pub fn new(
        to: &str,
        subject: &str,
        body: &str,
        cc: Option<&str>,
        bcc: Option<&str>,
        is_html: Option<bool>,
        attachments: &[String],
    ) -> Result<Self, ConnectorError> {
        let html = is_html.unwrap_or_else(|| looks_like_html(body));
        let mut absolute = Vec::with_capacity(attachments.len());
        for path in attachments {
            absolute.push(absolutize(path)?);
        }
        Ok(Self {
            subject: escape_applescript_string(subject),
            body: escape_applescript_string(body),
            html,
            to: parse_recipients(to),
            cc: cc.map(parse_recipients).unwrap_or_default(),
            bcc: bcc.map(parse_recipients).unwrap_or_default(),
            attachments: absolute,
        })
    }

    fn content_property(&self) -> &'static str {
        if self.html {
            "content"
        } else {
            "plain text content"
        }
    }

    /// Creation plus recipient and attachment statements targeting `var`.
    fn compose_statements(&self, var: &str) -> String {
        let mut script = format!(
            "    set {var} to make new outgoing message with properties {{subject:\"{subject}\", {content}:\"{body}\"}}\n",
            var = var,
            subject = self.subject,
            content = self.content_property(),
            body = self.body,
        );
        script.push_str(&recipient_statements("to", &self.to, var));
        script.push_str(&recipient_statements("cc", &self.cc, var));
        script.push_str(&recipient_statements("bcc", &self.bcc, var));
        script.push_str(&attachment_statements(&self.attachments, var));
        script
    }
}

fn absolutize(path: &str) -> Result<String, ConnectorError> {
    let p = Path::new(path);
    if p.is_absolute() {
        return Ok(path.to_string());
    }
    let cwd = std::env::current_dir()
        .map_err(|e| ConnectorError::Other(format!("Cannot resolve working directory: {}", e)))?;
    Ok(cwd.join(p).to_string_lossy().into_owned())
}

/// One `make new ... recipient` statement per recipient. Recipient lists are
/// never embedded as a single joined string.
fn recipient_statements(class: &str, recipients: &[EmailRecipient], var: &str) -> String {
    recipients
        .iter()
        .map(|r| {
            format!(
                "    make new {class} recipient at {var} with properties {{email address:{{name:\"{name}\", address:\"{address}\"}}}}\n",
                class = class,
                var = var,
                name = escape_applescript_string(&r.name),
                address = escape_applescript_string(&r.address),
            )
        })
        .collect()
}

fn attachment_statements(paths: &[String], var: &str) -> String {
    paths
        .iter()
        .map(|p| {
            format!(
                "    make new attachment at {var} with properties {{file:POSIX file \"{path}\"}}\n",
                var = var,
                path = escape_applescript_string(p),
            )
        })
        .collect()
}

/// Ordered send fallback ladder. The direct construction path is rejected by
/// Outlook in some configurations (observed with attachments); the draft
/// route sidesteps that, and the manual tier leaves a visible draft the user
/// can finish rather than failing outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStrategy {
    Direct,
    DraftThenSend,
    ManualDraft,
}

impl SendStrategy {
    pub const LADDER: [SendStrategy; 3] = [
        SendStrategy::Direct,
        SendStrategy::DraftThenSend,
        SendStrategy::ManualDraft,
    ];

    /// True when success means a staged draft rather than a queued message.
    pub fn stages_draft(self) -> bool {
        matches!(self, SendStrategy::ManualDraft)
    }

    pub fn script(self, plan: &ComposePlan) -> String {
        let statements = plan.compose_statements("newMsg");
        let trailer = match self {
            SendStrategy::Direct => "    send newMsg\n    return \"sent\"\n",
            SendStrategy::DraftThenSend => {
                "    save newMsg\n    delay 1\n    send newMsg\n    return \"sent\"\n"
            }
            SendStrategy::ManualDraft => {
                "    open newMsg\n    activate\n    return \"draft\"\n"
            }
        };
        format!(
            "tell application \"Microsoft Outlook\"\n{statements}{trailer}end tell\n",
            statements = statements,
            trailer = trailer,
        )
    }
}

/// Create a draft and open it in Outlook for review.
pub fn script_create_draft(plan: &ComposePlan) -> String {
    format!(
        "tell application \"Microsoft Outlook\"\n{statements}    open newMsg\n    activate\n    return \"draft\"\nend tell\n",
        statements = plan.compose_statements("newMsg"),
    )
}

// ============================================================================
// Reply with recipient modification
// ============================================================================

/// Modification set for one recipient class. Override excludes add/remove for
/// the same class; the dispatcher validates that before this is built.
#[derive(Debug, Clone, Default)]
pub struct RecipientMods {
    pub override_with: Option<Vec<EmailRecipient>>,
    pub add: Option<Vec<EmailRecipient>>,
    pub remove: Option<Vec<EmailRecipient>>,
}

impl RecipientMods {
    pub fn is_empty(&self) -> bool {
        self.override_with.is_none() && self.add.is_none() && self.remove.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReplyMods {
    pub to: RecipientMods,
    pub cc: RecipientMods,
    pub bcc: RecipientMods,
}

fn recipient_mod_statements(class: &str, mods: &RecipientMods, var: &str) -> String {
    let mut script = String::new();
    if let Some(replacement) = &mods.override_with {
        script.push_str(&format!(
            "    delete every {class} recipient of {var}\n",
            class = class,
            var = var
        ));
        script.push_str(&recipient_statements(class, replacement, var));
    }
    if let Some(additions) = &mods.add {
        script.push_str(&recipient_statements(class, additions, var));
    }
    if let Some(removals) = &mods.remove {
        // Matched against the bare recipient address, case-insensitively;
        // unmatched addresses are a no-op.
        let list = removals
            .iter()
            .map(|r| format!("\"{}\"", escape_applescript_string(r.bare_address())))
            .collect::<Vec<_>>()
            .join(", ");
        script.push_str(&format!(
            r#"    set modList to {class} recipients of {var}
    repeat with i from (count of modList) to 1 by -1
        set addr to address of (email address of (item i of modList))
        ignoring case
            if addr is in {{{list}}} then delete (item i of modList)
        end ignoring
    end repeat
"#,
            class = class,
            var = var,
            list = list,
        ));
    }
    script
}

pub fn script_reply(message_id: i64, body: &str, html: bool, reply_all: bool, mods: &ReplyMods) -> String {
    let content = if html { "content" } else { "plain text content" };
    let mut script = format!(
        "tell application \"Microsoft Outlook\"\n    set origMsg to message id {id}\n    set replyMsg to reply origMsg with properties {{reply to all:{all}}} without opening window\n    set {content} of replyMsg to \"{body}\"\n",
        id = message_id,
        all = reply_all,
        content = content,
        body = escape_applescript_string(body),
    );
    script.push_str(&recipient_mod_statements("to", &mods.to, "replyMsg"));
    script.push_str(&recipient_mod_statements("cc", &mods.cc, "replyMsg"));
    script.push_str(&recipient_mod_statements("bcc", &mods.bcc, "replyMsg"));
    script.push_str("    send replyMsg\n    return \"sent\"\nend tell\n");
    script
}

pub fn script_forward(
    message_id: i64,
    to: &[EmailRecipient],
    cc: &[EmailRecipient],
    body: Option<&str>,
    html: bool,
) -> String {
    let mut script = format!(
        "tell application \"Microsoft Outlook\"\n    set origMsg to message id {id}\n    set fwdMsg to forward origMsg without opening window\n",
        id = message_id,
    );
    script.push_str(&recipient_statements("to", to, "fwdMsg"));
    script.push_str(&recipient_statements("cc", cc, "fwdMsg"));
    if let Some(body) = body {
        let content = if html { "content" } else { "plain text content" };
        script.push_str(&format!(
            "    set {content} of fwdMsg to \"{body}\" & return & return & ({content} of fwdMsg)\n",
            content = content,
            body = escape_applescript_string(body),
        ));
    }
    script.push_str("    send fwdMsg\n    return \"sent\"\nend tell\n");
    script
}

// ============================================================================
// Read / search / count
// ============================================================================

pub fn script_read_emails(folder: &str, limit: usize, range: &DateRange) -> String {
    message_scan_script(folder, limit, range, None)
}

pub fn script_search_emails(folder: &str, query: &str, limit: usize, range: &DateRange) -> String {
    message_scan_script(folder, limit, range, Some(query))
}

/// Shared scan loop for read and search. The date guard only excludes
/// records from accumulation; it never exits the loop, because messages are
/// not assumed sorted by date. The limit counts accumulated records.
fn message_scan_script(
    folder: &str,
    limit: usize,
    range: &DateRange,
    query: Option<&str>,
) -> String {
    let folder_expr = folder_expr(folder);
    let query_setup = match query {
        Some(q) => {
            let q = escape_applescript_string(q);
            format!(
                r#"        set hitQuery to false
        ignoring case
            if msgSubject contains "{q}" then set hitQuery to true
            if theSender contains "{q}" then set hitQuery to true
        end ignoring
        if not hitQuery then set inRange to false
"#,
                q = q
            )
        }
        None => String::new(),
    };

    format!(
        r#"tell application "Microsoft Outlook"
    set theFolder to {folder_expr}
{range_setup}    set msgList to messages of theFolder
    set msgCount to count of msgList
    set fetched to 0
    set output to ""
    repeat with i from 1 to msgCount
        if fetched is greater than or equal to {limit} then exit repeat
        set msg to item i of msgList
        set msgDate to time received of msg
{sender}{subject}        set inRange to true
{range_guard}{query_setup}        if inRange then
    {record}            set fetched to fetched + 1
        end if
    end repeat
    return output
end tell
"#,
        folder_expr = folder_expr,
        range_setup = range.setup_lines(),
        limit = limit,
        sender = sender_lines(),
        subject = subject_lines(),
        range_guard = range.guard_lines(),
        query_setup = query_setup,
        record = email_record_lines(),
    )
}

pub fn script_get_email(message_id: i64) -> String {
    format!(
        r#"tell application "Microsoft Outlook"
    set msg to message id {id}
    set output to ""
{sender}{subject}{record}    return output
end tell
"#,
        id = message_id,
        sender = sender_lines(),
        subject = subject_lines(),
        record = email_record_lines(),
    )
}

pub fn script_count_emails(folder: &str, unread_only: bool) -> String {
    let folder_expr = folder_expr(folder);
    let counted = if unread_only {
        "(messages of theFolder whose is read is false)"
    } else {
        "messages of theFolder"
    };
    format!(
        "tell application \"Microsoft Outlook\"\n    set theFolder to {folder_expr}\n    return (count of {counted}) as string\nend tell\n",
        folder_expr = folder_expr,
        counted = counted,
    )
}

// ============================================================================
// Message management
// ============================================================================

pub fn script_move_email(message_id: i64, target_folder: &str) -> String {
    format!(
        "tell application \"Microsoft Outlook\"\n    move (message id {id}) to {target}\n    return \"moved\"\nend tell\n",
        id = message_id,
        target = folder_expr(target_folder),
    )
}

pub fn script_delete_email(message_id: i64) -> String {
    format!(
        "tell application \"Microsoft Outlook\"\n    delete (message id {id})\n    return \"deleted\"\nend tell\n",
        id = message_id,
    )
}

pub fn script_mark_email(message_id: i64, read: bool) -> String {
    format!(
        "tell application \"Microsoft Outlook\"\n    set is read of (message id {id}) to {read}\n    return \"marked\"\nend tell\n",
        id = message_id,
        read = read,
    )
}

// ============================================================================
// Folder operations
// ============================================================================

pub fn script_list_folders(include_counts: bool) -> String {
    let (count_lines, count_suffix) = if include_counts {
        (
            "        set msgCnt to count of messages of theFolder\n        set unreadCnt to count of (messages of theFolder whose is read is false)\n",
            r#" & ":::" & msgCnt & ":::" & unreadCnt"#,
        )
    } else {
        ("", "")
    };

    format!(
        r#"global output
set output to ""

on walkFolder(theFolder, parentPath)
    global output
    tell application "Microsoft Outlook"
        set folderName to name of theFolder
        if parentPath is "" then
            set folderPath to folderName
        else
            set folderPath to parentPath & "/" & folderName
        end if
        set acctName to ""
        try
            set acctName to name of (account of theFolder)
        end try
{count_lines}        set output to output & "===FOLDER===" & folderPath & ":::" & acctName{count_suffix} & linefeed
        repeat with sub in (mail folders of theFolder)
            my walkFolder(sub, folderPath)
        end repeat
    end tell
end walkFolder

tell application "Microsoft Outlook"
    repeat with f in mail folders
        my walkFolder(f, "")
    end repeat
end tell
return output
"#,
        count_lines = count_lines,
        count_suffix = count_suffix,
    )
}

/// Create a folder. A slash path creates the leaf under its (resolved)
/// parent; a flat name creates a top-level folder in the inbox's account.
pub fn script_create_folder(folder: &str) -> String {
    let escaped = escape_applescript_string(folder);
    match escaped.rsplit_once('/') {
        Some((parent, leaf)) => format!(
            "tell application \"Microsoft Outlook\"\n    make new mail folder at {parent} with properties {{name:\"{leaf}\"}}\n    return \"created\"\nend tell\n",
            parent = folder_ref(parent),
            leaf = leaf,
        ),
        None => format!(
            "tell application \"Microsoft Outlook\"\n    set acct to account of inbox\n    make new mail folder at acct with properties {{name:\"{name}\"}}\n    return \"created\"\nend tell\n",
            name = escaped,
        ),
    }
}

pub fn script_rename_folder(folder: &str, new_name: &str) -> String {
    format!(
        "tell application \"Microsoft Outlook\"\n    set name of {folder} to \"{new_name}\"\n    return \"renamed\"\nend tell\n",
        folder = folder_expr(folder),
        new_name = escape_applescript_string(new_name),
    )
}

pub fn script_delete_folder(folder: &str) -> String {
    format!(
        "tell application \"Microsoft Outlook\"\n    delete {folder}\n    return \"deleted\"\nend tell\n",
        folder = folder_expr(folder),
    )
}

// ============================================================================
// Trash
// ============================================================================

pub const TRASH_FOLDER: &str = "Deleted Items";

pub fn script_empty_trash_preview() -> String {
    format!(
        r#"tell application "Microsoft Outlook"
    set trashFolder to {trash}
    set msgList to messages of trashFolder
    set itemCount to count of msgList
    if itemCount is 0 then return "===TRASH===0"
    set newestItem to ((time received of (item 1 of msgList)) as string)
    set oldestItem to ((time received of (item itemCount of msgList)) as string)
    set totalBytes to 0
    repeat with m in msgList
        try
            set totalBytes to totalBytes + (size of m)
        end try
    end repeat
    return "===TRASH===" & itemCount & ":::" & oldestItem & ":::" & newestItem & ":::" & totalBytes
end tell
"#,
        trash = folder_expr(TRASH_FOLDER),
    )
}

/// Deletes item by item so one stuck message does not abort the batch; the
/// returned count is the number actually deleted.
pub fn script_empty_trash_confirm() -> String {
    format!(
        r#"tell application "Microsoft Outlook"
    set trashFolder to {trash}
    set msgList to messages of trashFolder
    set deletedCount to 0
    repeat with i from (count of msgList) to 1 by -1
        try
            delete (item i of msgList)
            set deletedCount to deletedCount + 1
        end try
    end repeat
    return deletedCount as string
end tell
"#,
        trash = folder_expr(TRASH_FOLDER),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_ref_inbox_token() {
        assert_eq!(folder_ref("Inbox"), "inbox");
        // Case-sensitive: these are named folders, not the default inbox
        assert_eq!(folder_ref("inbox"), r#"mail folder "inbox""#);
        assert_eq!(folder_ref("INBOX"), r#"mail folder "INBOX""#);
    }

    #[test]
    fn test_folder_ref_flat() {
        assert_eq!(folder_ref("Archive"), r#"mail folder "Archive""#);
    }

    #[test]
    fn test_folder_ref_nested_leaf_first() {
        assert_eq!(
            folder_ref("A/B/C"),
            r#"mail folder "C" of mail folder "B" of mail folder "A""#
        );
        assert_eq!(
            folder_ref("A/B/C/D"),
            r#"mail folder "D" of mail folder "C" of mail folder "B" of mail folder "A""#
        );
    }

    #[test]
    fn test_parse_recipients_plain() {
        let recipients = parse_recipients("a@x.com, b@x.com");
        assert_eq!(recipients.len(), 2);
        assert_eq!(recipients[0].address, "a@x.com");
        assert_eq!(recipients[0].name, "a");
        assert_eq!(recipients[1].address, "b@x.com");
    }

    #[test]
    fn test_parse_recipients_display_name() {
        let recipients = parse_recipients("John Doe <john@x.com>");
        assert_eq!(recipients.len(), 1);
        assert_eq!(recipients[0].name, "John Doe");
        // The address keeps the full display form
        assert_eq!(recipients[0].address, "John Doe <john@x.com>");
    }

    #[test]
    fn test_parse_recipients_empty_input() {
        let recipients = parse_recipients("");
        assert_eq!(recipients.len(), 1);
        assert_eq!(recipients[0].address, "");
    }

    #[test]
    fn test_looks_like_html() {
        assert!(looks_like_html("<p>x</p>"));
        assert!(looks_like_html("<br/>"));
        assert!(looks_like_html("<DIV>x</div>"));
        assert!(!looks_like_html("5 < 10"));
        assert!(!looks_like_html("<invalid>not a tag"));
    }

    #[test]
    fn test_compose_explodes_recipients() {
        let plan = ComposePlan::new(
            "a@x.com, b@x.com",
            "Hi",
            "Body",
            Some("c@x.com"),
            None,
            Some(false),
            &[],
        )
        .unwrap();
        let script = SendStrategy::Direct.script(&plan);
        assert_eq!(script.matches("make new to recipient").count(), 2);
        assert_eq!(script.matches("make new cc recipient").count(), 1);
        assert!(script.contains(r#"address:"a@x.com""#));
        assert!(!script.contains(r#"address:"a@x.com, b@x.com""#));
    }

    #[test]
    fn test_compose_escapes_subject_and_body() {
        let plan = ComposePlan::new(
            "a@x.com",
            r#"He said "hi""#,
            r#"path a\b"#,
            None,
            None,
            Some(false),
            &[],
        )
        .unwrap();
        let script = SendStrategy::Direct.script(&plan);
        assert!(script.contains(r#"subject:"He said \"hi\"""#));
        assert!(script.contains(r"a\\b"));
    }

    #[test]
    fn test_all_send_tiers_share_preprocessing() {
        let plan =
            ComposePlan::new("a@x.com, b@x.com", "S", "B", None, None, Some(false), &[]).unwrap();
        for strategy in SendStrategy::LADDER {
            let script = strategy.script(&plan);
            // Every tier explodes the list; none falls back to a joined string
            assert_eq!(script.matches("make new to recipient").count(), 2);
            assert!(!script.contains("a@x.com, b@x.com"));
        }
    }

    #[test]
    fn test_send_tier_outcomes() {
        let plan = ComposePlan::new("a@x.com", "S", "B", None, None, Some(false), &[]).unwrap();
        assert!(SendStrategy::Direct.script(&plan).contains("send newMsg"));
        assert!(SendStrategy::DraftThenSend.script(&plan).contains("save newMsg"));
        let manual = SendStrategy::ManualDraft.script(&plan);
        assert!(manual.contains("open newMsg"));
        assert!(!manual.contains("send newMsg"));
        assert!(SendStrategy::ManualDraft.stages_draft());
        assert!(!SendStrategy::Direct.stages_draft());
    }

    #[test]
    fn test_html_content_property() {
        let html_plan =
            ComposePlan::new("a@x.com", "S", "<p>hi</p>", None, None, None, &[]).unwrap();
        assert!(html_plan.html);
        assert!(SendStrategy::Direct.script(&html_plan).contains("content:\"<p>hi</p>\""));

        // Explicit flag beats detection
        let forced_plain =
            ComposePlan::new("a@x.com", "S", "<p>hi</p>", None, None, Some(false), &[]).unwrap();
        assert!(!forced_plain.html);
        assert!(SendStrategy::Direct
            .script(&forced_plain)
            .contains("plain text content:"));
    }

    #[test]
    fn test_date_range_setup_and_guard() {
        let range = DateRange::from_args(Some("2025-03-14"), Some("2025-03-20")).unwrap();
        let setup = range.setup_lines();
        assert!(setup.contains("set time of rangeStart to 0"));
        assert!(setup.contains("set time of rangeEnd to 86399"));
        assert!(setup.contains("set year of rangeStart to 2025"));
        let guard = range.guard_lines();
        assert!(guard.contains("if msgDate < rangeStart then set inRange to false"));
        assert!(guard.contains("if msgDate > rangeEnd then set inRange to false"));
    }

    #[test]
    fn test_date_range_rejects_garbage() {
        assert!(DateRange::from_args(Some("14/03/2025"), None).is_err());
        assert!(DateRange::from_args(None, Some("not a date")).is_err());
    }

    #[test]
    fn test_scan_script_never_breaks_on_date() {
        let range = DateRange::from_args(Some("2025-01-01"), None).unwrap();
        let script = script_read_emails("Inbox", 10, &range);
        // The only early exit is the result limit, not the date check
        assert_eq!(script.matches("exit repeat").count(), 1);
        assert!(script.contains("if fetched is greater than or equal to 10 then exit repeat"));
        assert!(script.contains("set theFolder to inbox"));
    }

    #[test]
    fn test_search_script_uses_canonical_resolver() {
        let script =
            script_search_emails("Projects/2025", "invoice", 20, &DateRange::default());
        assert!(script
            .contains(r#"set theFolder to mail folder "2025" of mail folder "Projects""#));
        assert!(script.contains(r#"contains "invoice""#));
    }

    #[test]
    fn test_folder_ops_use_canonical_resolver() {
        assert!(script_move_email(7, "A/B").contains(r#"mail folder "B" of mail folder "A""#));
        assert!(script_rename_folder("A/B", "C").contains(r#"mail folder "B" of mail folder "A""#));
        assert!(script_delete_folder("A/B").contains(r#"mail folder "B" of mail folder "A""#));
        assert!(script_create_folder("A/B").contains(r#"at mail folder "A""#));
        assert!(script_empty_trash_confirm().contains(r#"mail folder "Deleted Items""#));
    }

    #[test]
    fn test_folder_name_escaped_once() {
        let script = script_rename_folder(r#"Quo"ted"#, "Plain");
        assert!(script.contains(r#"mail folder "Quo\"ted""#));
    }

    #[test]
    fn test_reply_mods_script() {
        let mods = ReplyMods {
            cc: RecipientMods {
                remove: Some(parse_recipients("Gone <gone@x.com>")),
                ..Default::default()
            },
            to: RecipientMods {
                override_with: Some(parse_recipients("new@x.com")),
                ..Default::default()
            },
            ..Default::default()
        };
        let script = script_reply(42, "thanks", false, false, &mods);
        assert!(script.contains("delete every to recipient of replyMsg"));
        assert!(script.contains("make new to recipient at replyMsg"));
        assert!(script.contains("ignoring case"));
        assert!(script.contains("reply to all:false"));
    }

    #[test]
    fn test_removal_matches_bare_address_for_display_form() {
        // Outlook recipients carry bare addresses, so a removal given in
        // display form must be reduced to its email portion to ever match
        let mods = ReplyMods {
            cc: RecipientMods {
                remove: Some(parse_recipients("Gone Person <gone@x.com>, plain@x.com")),
                ..Default::default()
            },
            ..Default::default()
        };
        let script = script_reply(42, "thanks", false, false, &mods);
        assert!(script.contains(r#"{"gone@x.com", "plain@x.com"}"#));
        assert!(!script.contains("Gone Person <gone@x.com>"));
    }

    #[test]
    fn test_bare_address_extraction() {
        let display = parse_recipients("Jane Doe <jane@x.com>");
        assert_eq!(display[0].bare_address(), "jane@x.com");
        let plain = parse_recipients("jane@x.com");
        assert_eq!(plain[0].bare_address(), "jane@x.com");
    }

    #[test]
    fn test_list_folders_counts_optional() {
        let with = script_list_folders(true);
        assert!(with.contains("unreadCnt"));
        let without = script_list_folders(false);
        assert!(!without.contains("unreadCnt"));
        // Parent is emitted before recursion into children
        assert!(with.find("set output to output").unwrap() < with.find("walkFolder(sub").unwrap());
    }
}
