// Output formatting — terminal display of cached posts, users and notices.

pub mod terminal;

use chrono::{DateTime, NaiveDateTime, Utc};

/// Truncate a string to at most `max_chars` characters, appending "..." if truncated.
///
/// Unlike byte slicing (`&text[..120]`), this respects UTF-8 character boundaries
/// and will never panic on multi-byte characters like emoji or accented letters.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let char_count = text.chars().count();
    if char_count <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{truncated}...")
    }
}

/// Parse a server timestamp. The API emits naive ISO-8601 (UTC, no
/// offset); RFC 3339 is accepted too.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Compact relative age: `42s`, `5m`, `3h`, `6d`, then `May 1`.
///
/// Missing or unparseable timestamps render as an empty string.
pub fn time_ago(created_at: Option<&str>, now: DateTime<Utc>) -> String {
    let Some(date) = created_at.and_then(parse_timestamp) else {
        return String::new();
    };

    let seconds = (now - date).num_seconds().max(0);
    if seconds < 60 {
        return format!("{seconds}s");
    }
    let minutes = seconds / 60;
    if minutes < 60 {
        return format!("{minutes}m");
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{hours}h");
    }
    let days = hours / 24;
    if days < 7 {
        return format!("{days}d");
    }
    date.format("%b %-d").to_string()
}
