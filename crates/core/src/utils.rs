use std::cmp::Ordering;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static LINE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static PARAGRAPH_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<p>").unwrap());
static PARAGRAPH_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</p>").unwrap());
static ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static EXCESS_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());
static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{4}").unwrap());
static SQL_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Turns a comment's HTML body into plain text
///
/// Tags are handled first and entities decoded afterwards, so `&lt;b&gt;`
/// survives as the literal text `<b>`. Entities are replaced in a fixed
/// order with `&amp;` third: `&amp;lt;` stays `&lt;` while `&amp;quot;`
/// decodes all the way to `"`.
pub fn clean_message(message: &str) -> String {
    let text = LINE_BREAK.replace_all(message, "\n");
    let text = PARAGRAPH_OPEN.replace_all(&text, "");
    let text = PARAGRAPH_CLOSE.replace_all(&text, "\n");
    let text = ANY_TAG.replace_all(&text, "");
    let text = text
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");
    let text = EXCESS_NEWLINES.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Quotes a value as a SQL string literal, doubling embedded quotes
pub fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Like [`sql_literal`], but an absent value becomes a bare `NULL`
pub fn optional_sql_literal(value: Option<&str>) -> String {
    match value {
        Some(value) => sql_literal(value),
        None => "NULL".to_string(),
    }
}

pub fn is_sql_identifier(name: &str) -> bool {
    SQL_IDENTIFIER.is_match(name)
}

/// Parses the timestamp formats seen in exports and bundles
/// Naive values are read as UTC
pub fn parse_timestamp(timestamp_str: &str) -> Option<DateTime<Utc>> {
    let timestamp_str = timestamp_str.trim();
    if timestamp_str.is_empty() {
        return None;
    }

    // "2013-01-23T12:34:56Z" or "2013-01-23T12:34:56+00:00"
    if let Ok(dt) = DateTime::parse_from_rfc3339(timestamp_str) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive_dt) = NaiveDateTime::parse_from_str(timestamp_str, format) {
            return Some(naive_dt.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(timestamp_str, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive_dt| naive_dt.and_utc());
    }

    // dateparser fills a missing date with today's
    if !YEAR.is_match(timestamp_str) {
        return None;
    }
    dateparser::parse(timestamp_str).ok()
}

/// Orders `created_at` values by instant; unparsable values sort first
/// and equal instants fall back to the raw text
pub fn compare_timestamps(a: &str, b: &str) -> Ordering {
    parse_timestamp(a)
        .cmp(&parse_timestamp(b))
        .then_with(|| a.cmp(b))
}

/// Current instant as `2024-05-01T09:30:00.123Z`
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `export.xml` -> `export.json`
pub fn bundle_path_for(export_path: &Path) -> PathBuf {
    replace_suffix(export_path, "xml", ".json")
}

/// `comments.json` -> `comments-import.sql`
pub fn artifact_path_for(bundle_path: &Path) -> PathBuf {
    replace_suffix(bundle_path, "json", "-import.sql")
}

/// Swaps a case-insensitive extension for `replacement`, or appends it when
/// the extension differs. Works on the raw file name, so non-UTF-8 names
/// keep their bytes.
fn replace_suffix(path: &Path, extension: &str, replacement: &str) -> PathBuf {
    let matches = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
    let mut name: OsString = match (matches, path.file_stem()) {
        (true, Some(stem)) => stem.to_os_string(),
        _ => path.file_name().map(|name| name.to_os_string()).unwrap_or_default(),
    };
    name.push(replacement);
    path.with_file_name(name)
}
