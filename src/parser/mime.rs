//! MIME tree construction.
//!
//! Builds a [`MimeNode`] tree from raw message bytes. Multipart bodies are
//! split on their boundary and each part is parsed recursively. Bodies are
//! kept undecoded; see [`crate::parser::payload`] for decoding.

use tracing::debug;

use crate::model::mime::{HeaderMap, MimeNode};
use crate::parser::header::{parse_header_block, strip_angle_brackets};
use crate::parser::payload::decode_charset;

/// Maximum multipart nesting depth (guards against adversarial input).
const MAX_DEPTH: usize = 32;

/// Parse a complete raw message (headers + body) into a MIME tree.
///
/// A leading mbox `From ` envelope line is skipped if present.
pub fn parse_message(data: &[u8]) -> MimeNode {
    let block = parse_header_block(skip_from_line(data));
    build_node(block.headers, block.body)
}

/// Build a MIME node from already-parsed headers and the entity body.
pub fn build_node(headers: HeaderMap, body: &[u8]) -> MimeNode {
    build_node_at(headers, body, 0)
}

fn build_node_at(headers: HeaderMap, body: &[u8], depth: usize) -> MimeNode {
    let (content_type, ct_params) = headers
        .get("content-type")
        .map(parse_structured_header)
        .unwrap_or_default();
    let content_type = if content_type.contains('/') {
        content_type
    } else {
        "text/plain".to_string()
    };

    let (disposition, cd_params) = headers
        .get("content-disposition")
        .map(parse_structured_header)
        .unwrap_or_default();

    let transfer_encoding = headers
        .get_non_empty("content-transfer-encoding")
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_else(|| "7bit".to_string());

    let content_id = headers
        .get_non_empty("content-id")
        .map(strip_angle_brackets)
        .filter(|cid| !cid.is_empty());

    let filename = param(&cd_params, "filename").or_else(|| param(&ct_params, "name"));

    let mut node = MimeNode {
        charset: param(&ct_params, "charset").filter(|c| !c.is_empty()),
        boundary: param(&ct_params, "boundary").filter(|b| !b.is_empty()),
        disposition: (!disposition.is_empty()).then_some(disposition),
        content_type,
        transfer_encoding,
        filename,
        content_id,
        headers,
        ..MimeNode::default()
    };

    if let Some(boundary) = node.boundary.as_deref() {
        if !body.is_empty() && depth < MAX_DEPTH {
            match split_multipart(body, boundary) {
                Some(parts) if !parts.is_empty() => {
                    node.children = parts
                        .into_iter()
                        .map(|part| {
                            let block = parse_header_block(part);
                            build_node_at(block.headers, block.body, depth + 1)
                        })
                        .collect();
                    node.is_multipart = true;
                    return node;
                }
                _ => {
                    debug!(
                        boundary,
                        content_type = %node.content_type,
                        "Boundary not found in body, treating as a single part"
                    );
                }
            }
        }
    }

    node.body = body.to_vec();
    node
}

/// Split a multipart body into its parts.
///
/// The preamble, the epilogue and the closing delimiter are discarded, and
/// the line break that precedes each delimiter is removed from the part.
/// Returns `None` when no delimiter line is found.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Option<Vec<&'a [u8]>> {
    let delimiter = format!("--{boundary}");
    let mut parts = Vec::new();
    let mut part_start: Option<usize> = None;
    let mut found = false;
    let mut offset = 0;

    for line in body.split_inclusive(|&b| b == b'\n') {
        let content = line.trim_ascii_end();
        if let Some(rest) = content.strip_prefix(delimiter.as_bytes()) {
            let is_close = rest == b"--";
            if rest.is_empty() || is_close {
                found = true;
                if let Some(start) = part_start.take() {
                    parts.push(strip_trailing_line_break(&body[start..offset]));
                }
                if is_close {
                    return Some(parts);
                }
                part_start = Some(offset + line.len());
            }
        }
        offset += line.len();
    }

    if !found {
        return None;
    }
    // Missing closing delimiter: the last part runs to the end.
    if let Some(start) = part_start {
        parts.push(strip_trailing_line_break(&body[start..]));
    }
    Some(parts)
}

fn strip_trailing_line_break(part: &[u8]) -> &[u8] {
    let part = part.strip_suffix(b"\n").unwrap_or(part);
    part.strip_suffix(b"\r").unwrap_or(part)
}

/// Skip the `From ` envelope line at the start of mbox-style messages.
fn skip_from_line(data: &[u8]) -> &[u8] {
    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}

/// Parse a structured header value such as
/// `text/plain; charset="utf-8"; format=flowed`.
///
/// Returns the lowercased main value and the `(lowercase name, value)`
/// parameter list, quotes removed.
pub fn parse_structured_header(value: &str) -> (String, Vec<(String, String)>) {
    let mut segments = split_unquoted(value, ';').into_iter();
    let main = segments
        .next()
        .map(|s| s.trim().to_ascii_lowercase())
        .unwrap_or_default();

    let params = segments
        .filter_map(|segment| {
            let (name, raw) = segment.split_once('=')?;
            let name = name.trim().to_ascii_lowercase();
            (!name.is_empty()).then(|| (name, unquote(raw.trim())))
        })
        .collect();

    (main, params)
}

/// Look up a parameter, decoding RFC 2231 extended and continued forms
/// (`name*=utf-8''a%20b`, `name*0=`, `name*1*=`).
pub fn param(params: &[(String, String)], name: &str) -> Option<String> {
    if let Some((_, value)) = params.iter().find(|(k, _)| k == name) {
        return Some(value.clone());
    }

    let extended = format!("{name}*");
    if let Some((_, value)) = params.iter().find(|(k, _)| *k == extended) {
        let (charset, bytes) = decode_rfc2231_bytes(value, true);
        return Some(decode_charset(charset.as_deref(), &bytes));
    }

    let mut bytes = Vec::new();
    let mut charset: Option<String> = None;
    for index in 0.. {
        let plain_key = format!("{name}*{index}");
        let encoded_key = format!("{plain_key}*");
        if let Some((_, value)) = params.iter().find(|(k, _)| *k == encoded_key) {
            let (cs, piece) = decode_rfc2231_bytes(value, index == 0);
            if cs.is_some() {
                charset = cs;
            }
            bytes.extend_from_slice(&piece);
        } else if let Some((_, value)) = params.iter().find(|(k, _)| *k == plain_key) {
            bytes.extend_from_slice(value.as_bytes());
        } else {
            break;
        }
    }

    (!bytes.is_empty()).then(|| decode_charset(charset.as_deref(), &bytes))
}

/// Split off an optional `charset'language'` prefix and percent-decode.
fn decode_rfc2231_bytes(value: &str, has_charset: bool) -> (Option<String>, Vec<u8>) {
    let mut charset = None;
    let mut encoded = value;
    if has_charset {
        let mut pieces = value.splitn(3, '\'');
        if let (Some(cs), Some(_lang), Some(rest)) = (pieces.next(), pieces.next(), pieces.next()) {
            charset = (!cs.is_empty()).then(|| cs.to_string());
            encoded = rest;
        }
    }
    (
        charset,
        urlencoding::decode_binary(encoded.as_bytes()).into_owned(),
    )
}

/// Split on `sep` outside double quotes.
fn split_unquoted(value: &str, sep: char) -> Vec<&str> {
    let mut out = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;
    for (i, ch) in value.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if c == sep && !in_quotes => {
                out.push(&value[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    out.push(&value[start..]);
    out
}

/// Remove surrounding double quotes and backslash escapes.
fn unquote(value: &str) -> String {
    let Some(inner) = value
        .strip_prefix('"')
        .map(|v| v.strip_suffix('"').unwrap_or(v))
    else {
        return value.to_string();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_structured_header() {
        let (main, params) =
            parse_structured_header("Text/Plain; charset=\"ISO-8859-1\"; format=flowed");
        assert_eq!(main, "text/plain");
        assert_eq!(param(&params, "charset").as_deref(), Some("ISO-8859-1"));
        assert_eq!(param(&params, "format").as_deref(), Some("flowed"));
    }

    #[test]
    fn test_quoted_semicolon_in_filename() {
        let (main, params) =
            parse_structured_header("attachment; filename=\"a;b \\\"c\\\".pdf\"");
        assert_eq!(main, "attachment");
        assert_eq!(param(&params, "filename").as_deref(), Some("a;b \"c\".pdf"));
    }

    #[test]
    fn test_rfc2231_extended_filename() {
        let (_, params) =
            parse_structured_header("attachment; filename*=UTF-8''fattura%20n%C2%B0%201.pdf");
        assert_eq!(
            param(&params, "filename").as_deref(),
            Some("fattura n° 1.pdf")
        );
    }

    #[test]
    fn test_rfc2231_continuations() {
        let (_, params) = parse_structured_header(
            "attachment; filename*0*=UTF-8''rela%C3%A7%C3%A3; filename*1=\"o.txt\"",
        );
        assert_eq!(param(&params, "filename").as_deref(), Some("relação.txt"));
    }

    #[test]
    fn test_parse_simple_message() {
        let node = parse_message(b"Content-Type: text/html; charset=utf-8\n\n<p>Ciao</p>\n");
        assert!(!node.is_multipart);
        assert_eq!(node.content_type, "text/html");
        assert_eq!(node.charset.as_deref(), Some("utf-8"));
        assert_eq!(node.transfer_encoding, "7bit");
        assert_eq!(node.body, b"<p>Ciao</p>\n");
    }

    #[test]
    fn test_default_content_type() {
        let node = parse_message(b"Subject: x\n\nbody\n");
        assert_eq!(node.content_type, "text/plain");
        let node = parse_message(b"Content-Type: garbage\n\nbody\n");
        assert_eq!(node.content_type, "text/plain");
    }

    #[test]
    fn test_parse_multipart() {
        let raw = b"Content-Type: multipart/mixed; boundary=\"XYZ\"\n\
\n\
preamble\n\
--XYZ\n\
Content-Type: text/plain\n\
\n\
Hello\n\
--XYZ\n\
Content-Type: application/pdf; name=\"doc.pdf\"\n\
Content-Disposition: attachment; filename=\"doc.pdf\"\n\
Content-Transfer-Encoding: base64\n\
Content-ID: <doc1@x>\n\
\n\
JVBERi0=\n\
--XYZ--\n\
epilogue\n";
        let node = parse_message(raw);
        assert!(node.is_multipart);
        assert_eq!(node.boundary.as_deref(), Some("XYZ"));
        assert_eq!(node.children.len(), 2);
        assert_eq!(node.children[0].body, b"Hello");
        let pdf = &node.children[1];
        assert_eq!(pdf.filename.as_deref(), Some("doc.pdf"));
        assert_eq!(pdf.disposition.as_deref(), Some("attachment"));
        assert_eq!(pdf.transfer_encoding, "base64");
        assert_eq!(pdf.content_id.as_deref(), Some("doc1@x"));
        assert_eq!(pdf.body, b"JVBERi0=");
    }

    #[test]
    fn test_nested_multipart_crlf() {
        let raw = b"Content-Type: multipart/mixed; boundary=outer\r\n\r\n\
--outer\r\n\
Content-Type: multipart/alternative; boundary=inner\r\n\r\n\
--inner\r\n\
Content-Type: text/plain\r\n\r\n\
plain\r\n\
--inner\r\n\
Content-Type: text/html\r\n\r\n\
<b>html</b>\r\n\
--inner--\r\n\
--outer--\r\n";
        let node = parse_message(raw);
        assert!(node.is_multipart);
        assert_eq!(node.children.len(), 1);
        let alt = &node.children[0];
        assert!(alt.is_multipart);
        assert_eq!(alt.children[0].body, b"plain");
        assert_eq!(alt.children[1].body, b"<b>html</b>");
    }

    #[test]
    fn test_missing_boundary_degrades() {
        let raw = b"Content-Type: multipart/mixed; boundary=\"nope\"\n\nJust text\n";
        let node = parse_message(raw);
        assert!(!node.is_multipart);
        assert!(node.children.is_empty());
        assert_eq!(node.body, b"Just text\n");
    }

    #[test]
    fn test_unterminated_multipart() {
        let raw = b"Content-Type: multipart/mixed; boundary=b\n\n--b\n\nfirst\n--b\n\nsecond\n";
        let node = parse_message(raw);
        assert!(node.is_multipart);
        assert_eq!(node.children.len(), 2);
        assert_eq!(node.children[1].body, b"second");
    }

    #[test]
    fn test_skips_envelope_line() {
        let node = parse_message(b"From a@b Mon Jan 01 00:00:00 2024\nSubject: x\n\nbody\n");
        assert_eq!(node.headers.get("subject"), Some("x"));
    }
}
