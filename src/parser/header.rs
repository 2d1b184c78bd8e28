//! RFC 5322 header parsing: header/body split, folding, and date parsing.

use std::fmt::Write as _;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use tracing::{debug, warn};

use crate::model::mime::HeaderMap;

/// Display format for message dates.
pub const DEFAULT_DATE_FORMAT: &str = "%d/%m/%Y %H:%M";

/// What ended a header section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderEnd {
    /// The regular blank line.
    BlankLine,
    /// A line that is neither a field nor a continuation (missing separator).
    NonHeaderLine,
    /// The input ran out inside the header section.
    EndOfInput,
}

/// Result of splitting an entity into its header section and body.
#[derive(Debug, Clone)]
pub struct HeaderBlock<'a> {
    /// Unfolded header fields.
    pub headers: HeaderMap,
    /// Everything after the header section.
    pub body: &'a [u8],
    /// How the header section ended.
    pub end: HeaderEnd,
}

impl HeaderBlock<'_> {
    /// A header section that ran into body text without a blank line,
    /// or that holds no field at all.
    pub fn is_malformed(&self) -> bool {
        match self.end {
            HeaderEnd::BlankLine => false,
            HeaderEnd::NonHeaderLine => true,
            HeaderEnd::EndOfInput => self.headers.is_empty(),
        }
    }
}

/// Split `data` into its header section and body, and parse the headers.
///
/// The header section ends at the first blank line (`\n` or `\r\n`), or at
/// the first line that is neither a field nor a folded continuation; in
/// that case the offending line starts the body.
pub fn parse_header_block(data: &[u8]) -> HeaderBlock<'_> {
    let mut offset = 0;
    let mut end = HeaderEnd::EndOfInput;
    let mut body_start = data.len();
    let mut have_field = false;

    for line in data.split_inclusive(|&b| b == b'\n') {
        if line == b"\n" || line == b"\r\n" {
            end = HeaderEnd::BlankLine;
            body_start = offset + line.len();
            break;
        }
        let is_continuation = line.starts_with(b" ") || line.starts_with(b"\t");
        if (is_continuation && have_field) || is_field_line(line) {
            have_field = true;
            offset += line.len();
            continue;
        }
        debug!(offset, "Header section ended by a non-header line");
        end = HeaderEnd::NonHeaderLine;
        body_start = offset;
        break;
    }

    let text = decode_header_bytes(&data[..offset]);
    HeaderBlock {
        headers: unfold_headers(&text),
        body: &data[body_start..],
        end,
    }
}

/// `Name: value` with a valid field name (printable ASCII, no colon).
fn is_field_line(line: &[u8]) -> bool {
    let Some(colon) = line.iter().position(|&b| b == b':') else {
        return false;
    };
    let name = line[..colon].trim_ascii_end();
    !name.is_empty() && name.iter().all(|b| (33..=126).contains(b))
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
pub fn decode_header_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Unfold headers: continuation lines (starting with space or tab) are
/// appended to the previous field.
fn unfold_headers(text: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            headers.continue_last(line.trim());
        } else if let Some(colon_pos) = line.find(':') {
            headers.push(&line[..colon_pos], line[colon_pos + 1..].trim().to_string());
        }
    }

    headers
}

/// Extract content between `<` and `>`, without the brackets.
pub fn strip_angle_brackets(s: &str) -> String {
    let trimmed = s.trim();
    if let Some(start) = trimmed.find('<') {
        if let Some(end) = trimmed[start..].find('>') {
            return trimmed[start + 1..start + end].trim().to_string();
        }
    }
    trimmed.to_string()
}

/// Format a parsed date for display, in the date's own UTC offset.
///
/// An invalid `format` falls back to [`DEFAULT_DATE_FORMAT`].
pub fn format_display_date(date: &DateTime<FixedOffset>, format: &str) -> String {
    let mut out = String::new();
    if write!(out, "{}", date.format(format)).is_err() {
        warn!(format, "Invalid date format, using default");
        out.clear();
        let _ = write!(out, "{}", date.format(DEFAULT_DATE_FORMAT));
    }
    out
}

/// Parse an email date string in various common formats.
///
/// Supports RFC 2822, ISO 8601, and many broken real-world variants.
/// Dates without a zone are taken as UTC.
pub fn parse_date(date_str: &str) -> Option<DateTime<FixedOffset>> {
    let trimmed = strip_trailing_comment(date_str.trim());
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt);
    }

    // Remove leading day-of-week: "Thu, " or "Thu "
    let no_dow = strip_day_of_week(trimmed);

    // IMAP-style: "16-JUL-2025 03:01:03" → "16 Jul 2025 03:01:03"
    let no_dow_normalized = normalize_imap_date(&no_dow);

    let formats = [
        "%d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M:%S",
        "%d %b %Y %H:%M %z",
        "%b %d %H:%M:%S %Y",
        "%Y-%m-%dT%H:%M:%S%z",
        "%Y-%m-%d %H:%M:%S %z",
        "%Y-%m-%d %H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
        "%d/%m/%Y %H:%M",
    ];

    for candidate in [&no_dow, &no_dow_normalized] {
        for fmt in &formats {
            if let Some(dt) = parse_with_format(candidate, fmt) {
                return Some(dt);
            }
        }
    }

    // Replace named timezones with offsets and try again
    for candidate in [&no_dow, &no_dow_normalized] {
        let replaced = replace_named_tz(candidate);
        for fmt in &formats {
            if let Ok(dt) = DateTime::parse_from_str(&replaced, fmt) {
                return Some(dt);
            }
        }
    }

    if let Some(dt) = mail_parser_date(trimmed) {
        return Some(dt);
    }

    warn!(date = trimmed, "Could not parse date");
    None
}

fn parse_with_format(candidate: &str, fmt: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_str(candidate, fmt) {
        return Some(dt);
    }
    let ndt = NaiveDateTime::parse_from_str(candidate, fmt).ok()?;
    FixedOffset::east_opt(0).map(|utc| utc.from_utc_datetime(&ndt))
}

/// Attempt to parse a date using `mail-parser`'s built-in parser.
fn mail_parser_date(input: &str) -> Option<DateTime<FixedOffset>> {
    use mail_parser::MessageParser;

    // Wrap input in a minimal RFC 5322 message so mail-parser can parse it
    let fake_msg = format!("Date: {input}\n\n");
    let parsed = MessageParser::default().parse(fake_msg.as_bytes())?;
    let dt = parsed.date()?.to_rfc3339();
    DateTime::parse_from_rfc3339(&dt).ok()
}

/// Drop a trailing `(comment)`, e.g. `"... +0000 (UTC)"`.
fn strip_trailing_comment(s: &str) -> &str {
    if s.ends_with(')') {
        if let Some(open) = s.rfind('(') {
            return s[..open].trim_end();
        }
    }
    s
}

/// Normalize IMAP-style dates: `"16-JUL-2025 03:01:03"` → `"16 Jul 2025 03:01:03"`.
fn normalize_imap_date(s: &str) -> String {
    if !s.contains('-') {
        return s.to_string();
    }

    let title_months = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];

    let lower = s.to_ascii_lowercase();
    for month in &title_months {
        let pattern = format!("-{}-", month.to_lowercase());
        if let Some(pos) = lower.find(&pattern) {
            let mut result = s.to_string();
            result.replace_range(pos..pos + pattern.len(), &format!(" {month} "));
            return result;
        }
    }

    s.to_string()
}

/// Strip leading day-of-week prefix (e.g. "Thu, " or "Thu ").
fn strip_day_of_week(s: &str) -> String {
    let days = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    for day in &days {
        if let Some(rest) = s.strip_prefix(day) {
            if rest.starts_with(',') || rest.starts_with(' ') {
                return rest.trim_start_matches(',').trim().to_string();
            }
        }
    }
    s.to_string()
}

/// Replace well-known timezone abbreviations with numeric offsets.
fn replace_named_tz(s: &str) -> String {
    let tzs = [
        ("CEST", "+0200"),
        ("EST", "-0500"),
        ("EDT", "-0400"),
        ("CST", "-0600"),
        ("CDT", "-0500"),
        ("MST", "-0700"),
        ("MDT", "-0600"),
        ("PST", "-0800"),
        ("PDT", "-0700"),
        ("GMT", "+0000"),
        ("UTC", "+0000"),
        ("CET", "+0100"),
        ("JST", "+0900"),
    ];
    let mut result = s.to_string();
    for (name, offset) in &tzs {
        if result.ends_with(name) {
            let pos = result.len() - name.len();
            result.replace_range(pos.., offset);
            return result;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header_block_lf() {
        let block = parse_header_block(b"Subject: Hi\nFrom: a@b.com\n\nBody here\n");
        assert_eq!(block.end, HeaderEnd::BlankLine);
        assert_eq!(block.headers.get("subject"), Some("Hi"));
        assert_eq!(block.headers.get("FROM"), Some("a@b.com"));
        assert_eq!(block.body, b"Body here\n");
    }

    #[test]
    fn test_parse_header_block_crlf() {
        let block = parse_header_block(b"Subject: Hi\r\nFrom: a@b.com\r\n\r\nBody\r\n");
        assert_eq!(block.end, HeaderEnd::BlankLine);
        assert_eq!(block.headers.get("from"), Some("a@b.com"));
        assert_eq!(block.body, b"Body\r\n");
    }

    #[test]
    fn test_folded_header() {
        let block = parse_header_block(b"Subject: This is a long\n\tsubject line\nFrom: u@x\n\n");
        assert_eq!(block.headers.len(), 2);
        assert_eq!(
            block.headers.get("subject"),
            Some("This is a long subject line")
        );
    }

    #[test]
    fn test_part_without_headers() {
        let block = parse_header_block(b"\nJust a body\n");
        assert!(block.headers.is_empty());
        assert_eq!(block.body, b"Just a body\n");
        assert!(!block.is_malformed());
    }

    #[test]
    fn test_header_only_message_is_not_malformed() {
        let block = parse_header_block(b"Subject: Only headers\nFrom: a@b.com\n");
        assert_eq!(block.end, HeaderEnd::EndOfInput);
        assert!(!block.is_malformed());
        assert!(block.body.is_empty());
    }

    #[test]
    fn test_truncated_headers_are_malformed() {
        let block = parse_header_block(b"From: a@b.com\nSubject: Trunc\nthis is not a header\n");
        assert_eq!(block.end, HeaderEnd::NonHeaderLine);
        assert!(block.is_malformed());
        assert_eq!(block.headers.get("subject"), Some("Trunc"));
        assert_eq!(block.body, b"this is not a header\n");
    }

    #[test]
    fn test_decode_header_bytes_latin() {
        assert_eq!(decode_header_bytes(b"Caf\xe9"), "Café");
        assert_eq!(decode_header_bytes("Café".as_bytes()), "Café");
    }

    #[test]
    fn test_strip_angle_brackets() {
        assert_eq!(strip_angle_brackets(" <img001@x> "), "img001@x");
        assert_eq!(strip_angle_brackets("plain"), "plain");
    }

    #[test]
    fn test_parse_date_rfc2822() {
        let dt = parse_date("Thu, 04 Jan 2024 10:00:00 +0100").unwrap();
        assert_eq!(format_display_date(&dt, DEFAULT_DATE_FORMAT), "04/01/2024 10:00");
    }

    #[test]
    fn test_parse_date_with_comment() {
        assert!(parse_date("Thu, 04 Jan 2024 10:00:00 +0000 (UTC)").is_some());
    }

    #[test]
    fn test_parse_date_named_tz() {
        assert!(parse_date("Thu, 04 Jan 2024 10:00:00 CEST").is_some());
    }

    #[test]
    fn test_parse_date_imap_style() {
        let dt = parse_date("16-JUL-2025 03:01:03").unwrap();
        assert_eq!(dt.format("%Y-%m-%d").to_string(), "2025-07-16");
    }

    #[test]
    fn test_parse_date_garbage() {
        assert!(parse_date("").is_none());
    }

    #[test]
    fn test_normalize_imap_date() {
        assert_eq!(
            normalize_imap_date("10-MAR-2025 06:00:42"),
            "10 Mar 2025 06:00:42"
        );
        assert_eq!(
            normalize_imap_date("04 Jan 2024 10:00:00"),
            "04 Jan 2024 10:00:00"
        );
    }
}
