//! Body and attachment extraction from a message tree.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::attachment::Attachment;
use crate::model::mime::MimeNode;
use crate::parser::encoded_word::decode_header_value;
use crate::parser::payload::{node_bytes, node_text};
use crate::parser::pec::is_infra_filename;

static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).expect("valid regex"));

/// Which text part wins when several plain or HTML candidates exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodySelection {
    /// The longest decoded text.
    #[default]
    Longest,
    /// The first non-empty text in tree order.
    First,
}

/// What the extractor found in one message.
#[derive(Debug, Default)]
pub struct ExtractedContent {
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    pub attachments: Vec<Attachment>,
}

/// Select the text and HTML bodies and collect attachments.
///
/// A non-multipart node is its own body. For multipart messages every
/// leaf is visited depth-first:
/// - envelope infrastructure files are skipped;
/// - `text/plain` and `text/html` leaves that are not attachments are
///   body candidates;
/// - anything else with a filename, an `attachment` disposition or an
///   inline image is recorded as an [`Attachment`].
pub fn extract_content(node: &MimeNode, selection: BodySelection) -> ExtractedContent {
    let mut content = ExtractedContent::default();

    if !node.is_multipart {
        if node.is_type("text/plain") {
            content.body_text = non_empty(node_text(node));
        } else if node.is_type("text/html") {
            content.body_html = non_empty(node_text(node));
        }
        return content;
    }

    let mut names = HashSet::new();
    for leaf in node.leaves() {
        let filename = leaf
            .filename
            .as_deref()
            .map(decode_header_value)
            .filter(|f| !f.is_empty());

        if filename.as_deref().is_some_and(is_infra_filename) {
            continue;
        }

        let disposition = leaf.disposition.as_deref().unwrap_or("");
        let is_attachment =
            disposition == "attachment" || (filename.is_some() && disposition != "inline");
        let is_inline_image = disposition == "inline" && leaf.main_type() == "image";

        if leaf.is_type("text/plain") && !is_attachment {
            choose_body(&mut content.body_text, node_text(leaf), selection);
        } else if leaf.is_type("text/html") && !is_attachment {
            choose_body(&mut content.body_html, node_text(leaf), selection);
        } else if filename.is_some() || is_attachment || is_inline_image {
            let name = match filename {
                Some(name) => name,
                None if is_inline_image => inline_image_name(leaf),
                None => String::new(),
            };
            let data = node_bytes(leaf);
            let attachment = Attachment {
                filename: unique_name(&mut names, &sanitize_filename(&name)),
                content_type: leaf.content_type.clone(),
                size: data.len() as u64,
                content_id: leaf.content_id.clone(),
                is_inline: is_inline_image,
                data,
            };
            debug!(
                filename = %attachment.filename,
                content_type = %attachment.content_type,
                size = attachment.size,
                inline = attachment.is_inline,
                "Found attachment"
            );
            content.attachments.push(attachment);
        }
    }

    content
}

fn choose_body(current: &mut Option<String>, candidate: String, selection: BodySelection) {
    if candidate.is_empty() {
        return;
    }
    let replace = match (current.as_deref(), selection) {
        (None, _) => true,
        (Some(_), BodySelection::First) => false,
        (Some(existing), BodySelection::Longest) => {
            candidate.chars().count() > existing.chars().count()
        }
    };
    if replace {
        *current = Some(candidate);
    }
}

/// `inline_<content-id>.<subtype>`, or `inline_image.<subtype>` without one.
fn inline_image_name(leaf: &MimeNode) -> String {
    let stem = leaf.content_id.as_deref().unwrap_or("image");
    format!("inline_{stem}.{}", leaf.sub_type())
}

/// Make a filename safe to store on disk.
///
/// Encoded-words are decoded, characters that are illegal on common file
/// systems become `_`, and leading/trailing dots and spaces are removed.
/// An empty result becomes `"unnamed"`.
pub fn sanitize_filename(name: &str) -> String {
    let decoded = decode_header_value(name);
    let replaced = UNSAFE_FILENAME_CHARS.replace_all(&decoded, "_");
    let trimmed = replaced.trim_matches(|c| c == '.' || c == ' ');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Return `name`, or `stem_N.ext` with the smallest free `N >= 1`.
fn unique_name(taken: &mut HashSet<String>, name: &str) -> String {
    let mut candidate = name.to_string();
    let (stem, ext) = split_extension(name);
    let mut counter = 1;
    while taken.contains(&candidate) {
        candidate = format!("{stem}_{counter}{ext}");
        counter += 1;
    }
    taken.insert(candidate.clone());
    candidate
}

/// Split `report.pdf` into (`report`, `.pdf`). Dotfiles have no extension.
pub(crate) fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if pos > 0 => name.split_at(pos),
        _ => (name, ""),
    }
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::mime::parse_message;

    const MIXED: &str = "Content-Type: multipart/mixed; boundary=\"b1\"\n\
\n\
--b1\n\
Content-Type: multipart/related; boundary=\"b2\"\n\
\n\
--b2\n\
Content-Type: multipart/alternative; boundary=\"b3\"\n\
\n\
--b3\n\
Content-Type: text/plain; charset=utf-8\n\
\n\
Corpo del messaggio\n\
--b3\n\
Content-Type: text/html; charset=utf-8\n\
\n\
<p>Corpo del messaggio</p><img src=\"cid:logo@x\">\n\
--b3--\n\
--b2\n\
Content-Type: image/png\n\
Content-Disposition: inline\n\
Content-ID: <logo@x>\n\
Content-Transfer-Encoding: base64\n\
\n\
iVBORw0KGgo=\n\
--b2--\n\
--b1\n\
Content-Type: application/pdf; name=\"fattura.pdf\"\n\
Content-Disposition: attachment; filename=\"fattura.pdf\"\n\
Content-Transfer-Encoding: base64\n\
\n\
JVBERi0xLjQ=\n\
--b1\n\
Content-Type: application/pdf\n\
Content-Disposition: attachment; filename=\"fattura.pdf\"\n\
\n\
second\n\
--b1\n\
Content-Type: application/pkcs7-signature; name=\"smime.p7s\"\n\
\n\
AAAA\n\
--b1--\n";

    #[test]
    fn test_extract_bodies_and_attachments() {
        let root = parse_message(MIXED.as_bytes());
        let content = extract_content(&root, BodySelection::Longest);

        assert_eq!(content.body_text.as_deref(), Some("Corpo del messaggio"));
        assert!(content.body_html.unwrap().contains("cid:logo@x"));

        let names: Vec<&str> = content
            .attachments
            .iter()
            .map(|a| a.filename.as_str())
            .collect();
        assert_eq!(names, ["inline_logo@x.png", "fattura.pdf", "fattura_1.pdf"]);

        let logo = &content.attachments[0];
        assert!(logo.is_inline);
        assert_eq!(logo.content_id.as_deref(), Some("logo@x"));
        assert_eq!(logo.data, b"\x89PNG\r\n\x1a\n");

        let pdf = &content.attachments[1];
        assert!(!pdf.is_inline);
        assert_eq!(pdf.size, 8);
        assert_eq!(pdf.data, b"%PDF-1.4");
    }

    #[test]
    fn test_longest_vs_first_body() {
        let raw = "Content-Type: multipart/mixed; boundary=x\n\n\
--x\nContent-Type: text/plain\n\nshort\n\
--x\nContent-Type: text/plain\n\nmuch longer text\n\
--x--\n";
        let root = parse_message(raw.as_bytes());
        let longest = extract_content(&root, BodySelection::Longest);
        assert_eq!(longest.body_text.as_deref(), Some("much longer text"));
        let first = extract_content(&root, BodySelection::First);
        assert_eq!(first.body_text.as_deref(), Some("short"));
    }

    #[test]
    fn test_text_attachment_is_not_body() {
        let raw = "Content-Type: multipart/mixed; boundary=x\n\n\
--x\nContent-Type: text/plain\n\nbody\n\
--x\nContent-Type: text/plain; name=\"note.txt\"\n\nattached note that is longer\n\
--x--\n";
        let root = parse_message(raw.as_bytes());
        let content = extract_content(&root, BodySelection::Longest);
        assert_eq!(content.body_text.as_deref(), Some("body"));
        assert_eq!(content.attachments.len(), 1);
        assert_eq!(content.attachments[0].filename, "note.txt");
    }

    #[test]
    fn test_single_part_html() {
        let root = parse_message(b"Content-Type: text/html\n\n<b>ciao</b>");
        let content = extract_content(&root, BodySelection::Longest);
        assert!(content.body_text.is_none());
        assert_eq!(content.body_html.as_deref(), Some("<b>ciao</b>"));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("a/b\\c:d*e?.pdf"), "a_b_c_d_e_.pdf");
        assert_eq!(sanitize_filename("  ..hidden. "), "hidden");
        assert_eq!(sanitize_filename("..."), "unnamed");
        assert_eq!(sanitize_filename(""), "unnamed");
        assert_eq!(sanitize_filename("=?UTF-8?B?Q2lhbw==?=.txt"), "Ciao.txt");
    }

    #[test]
    fn test_unique_name() {
        let mut taken = HashSet::new();
        assert_eq!(unique_name(&mut taken, "a.pdf"), "a.pdf");
        assert_eq!(unique_name(&mut taken, "a.pdf"), "a_1.pdf");
        assert_eq!(unique_name(&mut taken, "a.pdf"), "a_2.pdf");
        assert_eq!(unique_name(&mut taken, "README"), "README");
        assert_eq!(unique_name(&mut taken, "README"), "README_1");
    }
}
