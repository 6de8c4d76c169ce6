// Shared AppleScript bridge (always compiled; execution is macOS-only)
pub mod outlook_common;

#[cfg(feature = "outlook-calendar")]
pub mod outlook_calendar;
#[cfg(feature = "outlook-contacts")]
pub mod outlook_contacts;
#[cfg(feature = "outlook-mail")]
pub mod outlook_mail;
