//! Plain-text rendering of messages.

use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;

use crate::model::message::Message;

static SCRIPT_STYLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|head)\b.*?</(script|style|head)\s*>").expect("valid regex")
});
static BREAK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</?(p|div|tr|table|h[1-6]|blockquote)\b[^>]*>").expect("valid regex")
});
static LIST_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<li\b[^>]*>").expect("valid regex"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static NUMERIC_ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").expect("valid regex"));

const NAMED_ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&apos;", "'"),
    ("&egrave;", "è"),
    ("&eacute;", "é"),
    ("&agrave;", "à"),
    ("&ograve;", "ò"),
    ("&ugrave;", "ù"),
    ("&igrave;", "ì"),
    ("&euro;", "€"),
    // Last, so that "&amp;lt;" becomes "&lt;" and not "<".
    ("&amp;", "&"),
];

/// Convert HTML to readable plain text.
///
/// Scripts, styles and the head are dropped, block elements become line
/// breaks, list items become `- item`, entities are decoded and runs of
/// blank lines collapse to one.
pub fn html_to_text(html: &str) -> String {
    let text = SCRIPT_STYLE_RE.replace_all(html, "");
    let text = LIST_ITEM_RE.replace_all(&text, "\n- ");
    let text = BREAK_RE.replace_all(&text, "\n");
    let text = TAG_RE.replace_all(&text, "");
    let text = decode_entities(&text);

    let mut out = String::with_capacity(text.len());
    let mut blank_run = false;
    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            if !blank_run && !out.is_empty() {
                out.push('\n');
            }
            blank_run = true;
        } else {
            out.push_str(line);
            out.push('\n');
            blank_run = false;
        }
    }
    out.trim_end().to_string()
}

fn decode_entities(text: &str) -> String {
    let numeric = NUMERIC_ENTITY_RE.replace_all(text, |caps: &regex::Captures<'_>| {
        let code = &caps[1];
        let value = match code.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => code.parse().ok(),
        };
        value
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });
    NAMED_ENTITIES
        .iter()
        .fold(numeric.into_owned(), |acc, (entity, ch)| acc.replace(entity, ch))
}

/// Render a message as plain text: headers, body, then the attachment list.
///
/// Uses the text body, or the HTML body converted to text when there is
/// no text body.
pub fn render_message(msg: &Message) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Date:    {}", msg.date);
    let _ = writeln!(out, "From:    {}", msg.sender);
    if !msg.recipients.is_empty() {
        let _ = writeln!(out, "To:      {}", msg.recipients.join(", "));
    }
    let _ = writeln!(out, "Subject: {}", msg.subject);
    if let Some(provider) = &msg.pec_provider {
        let kind = msg.pec_type.as_deref().unwrap_or("posta-certificata");
        let _ = write!(out, "PEC:     {kind} via {provider}");
        if let Some(date) = &msg.pec_date {
            let _ = write!(out, " ({date})");
        }
        out.push('\n');
    }
    let _ = writeln!(out, "ID:      {}", msg.email_id);
    let _ = writeln!(out, "\n{}", "-".repeat(72));

    let body = match (&msg.body_text, &msg.body_html) {
        (Some(text), _) => Some(text.trim_end().to_string()),
        (None, Some(html)) => Some(html_to_text(html)),
        (None, None) => None,
    };
    if let Some(body) = body {
        let _ = writeln!(out, "\n{body}");
    } else if msg.is_placeholder {
        out.push_str("\n[Message could not be parsed]\n");
    }

    let visible: Vec<_> = msg.visible_attachments().collect();
    if !visible.is_empty() {
        let _ = writeln!(out, "\n[Attachments: {} file(s)]", visible.len());
        for att in visible {
            let size = humansize::format_size(att.size, humansize::BINARY);
            let _ = writeln!(out, "  - {} ({}, {})", att.filename, att.content_type, size);
        }
    }

    out
}
