// Outlook Common - Shared infrastructure for the Outlook connectors
// Provides AppleScript execution, string escaping, and app availability checks
// Script execution is macOS only; everything else compiles everywhere

#[cfg(target_os = "macos")]
use std::process::Stdio;
use tracing::info;

use crate::error::ConnectorError;

/// Application name of the automation target as registered with macOS.
pub const OUTLOOK_APP: &str = "Microsoft Outlook";

/// Result of running an AppleScript
#[derive(Debug, Clone)]
pub struct ScriptResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ScriptResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Execute an AppleScript and return the result
#[cfg(target_os = "macos")]
pub async fn run_applescript(script: &str) -> Result<ScriptResult, ConnectorError> {
    use tokio::io::AsyncWriteExt;
    use tokio::process::Command;

    let mut cmd = Command::new("/usr/bin/osascript");
    cmd.arg("-s").arg("s"); // structured output
    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .map_err(|e| ConnectorError::Other(format!("Failed to spawn osascript: {}", e)))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(script.as_bytes())
            .await
            .map_err(|e| ConnectorError::Other(format!("Failed to write script: {}", e)))?;
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| ConnectorError::Other(format!("Failed to wait for osascript: {}", e)))?;

    Ok(ScriptResult {
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}

#[cfg(not(target_os = "macos"))]
pub async fn run_applescript(_script: &str) -> Result<ScriptResult, ConnectorError> {
    Err(ConnectorError::Other(
        "AppleScript is only available on macOS".to_string(),
    ))
}

/// Execute AppleScript and return stdout, or a `Script` error carrying stderr
pub async fn run_applescript_output(script: &str) -> Result<String, ConnectorError> {
    let result = run_applescript(script).await?;
    if result.success() {
        Ok(unquote_script_output(&result.stdout))
    } else {
        Err(ConnectorError::Script(result.stderr))
    }
}

/// Undo osascript `-s s` quoting of a string result.
///
/// With `-s s`, a string return value is printed as an AppleScript literal:
/// wrapped in double quotes with inner quotes and backslashes escaped.
/// Non-string results pass through untouched.
pub fn unquote_script_output(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.len() < 2 || !trimmed.starts_with('"') || !trimmed.ends_with('"') {
        return trimmed.to_string();
    }
    let inner = &trimmed[1..trimmed.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Escape a string for embedding as a quoted literal in AppleScript source.
///
/// Backslashes are doubled first, then double quotes are escaped. Not
/// idempotent: apply exactly once, at the point of embedding.
pub fn escape_applescript_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Check if an app is running
#[cfg(target_os = "macos")]
pub async fn is_app_running(app_name: &str) -> Result<bool, ConnectorError> {
    let script = format!(
        r#"tell application "System Events" to (name of processes) contains "{}""#,
        escape_applescript_string(app_name)
    );
    let result = run_applescript_output(&script).await?;
    Ok(result.trim() == "true")
}

#[cfg(not(target_os = "macos"))]
pub async fn is_app_running(_app_name: &str) -> Result<bool, ConnectorError> {
    Err(ConnectorError::Other(
        "App check is only available on macOS".to_string(),
    ))
}

/// Make sure the automation target is running before a script is dispatched.
///
/// One recovery attempt (activate) is made; if the app still is not running,
/// this is an `AppUnavailable` error, distinct from script failures.
pub async fn ensure_app_running(app_name: &str) -> Result<(), ConnectorError> {
    if is_app_running(app_name).await? {
        return Ok(());
    }

    info!(app = app_name, "application not running, attempting launch");
    let launch = format!(
        r#"tell application "{}" to activate"#,
        escape_applescript_string(app_name)
    );
    let _ = run_applescript(&launch).await?;

    if is_app_running(app_name).await? {
        Ok(())
    } else {
        Err(ConnectorError::AppUnavailable(format!(
            "{} is not running and could not be launched. Open it manually, make sure at least \
             one account is configured, and try again.",
            app_name
        )))
    }
}

/// Standard connector capabilities for the Outlook connectors
pub fn outlook_connector_capabilities() -> rmcp::model::ServerCapabilities {
    rmcp::model::ServerCapabilities {
        tools: Some(rmcp::model::ToolsCapability { list_changed: None }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_applescript_string() {
        let input = r#"Hello "World""#;
        let escaped = escape_applescript_string(input);
        assert_eq!(escaped, r#"Hello \"World\""#);
    }

    #[test]
    fn test_escape_backslash_before_quote() {
        assert_eq!(escape_applescript_string(r"a\b"), r"a\\b");
        // A backslash-quote pair must not collapse into a single escape
        assert_eq!(escape_applescript_string(r#"\""#), r#"\\\""#);
    }

    #[test]
    fn test_escape_plain_passthrough() {
        assert_eq!(escape_applescript_string("plain text"), "plain text");
        assert_eq!(escape_applescript_string(""), "");
    }

    #[test]
    fn test_unquote_script_output() {
        assert_eq!(unquote_script_output("\"hello\""), "hello");
        assert_eq!(
            unquote_script_output("\"say \\\"hi\\\"\""),
            "say \"hi\""
        );
        assert_eq!(unquote_script_output("\"a\\nb\""), "a\nb");
        // Non-string results pass through
        assert_eq!(unquote_script_output("42"), "42");
        assert_eq!(unquote_script_output("  plain  "), "plain");
        assert_eq!(unquote_script_output("\"\""), "");
    }

    #[test]
    fn test_escape_not_idempotent() {
        let once = escape_applescript_string(r#"say "hi""#);
        let twice = escape_applescript_string(&once);
        assert_ne!(once, twice);
    }
}
