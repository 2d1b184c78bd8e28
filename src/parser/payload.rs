//! Payload decoding: transfer encodings (base64, quoted-printable) and charsets.
//!
//! Nothing here fails. Broken base64 decodes to nothing, unknown charsets
//! fall back to UTF-8, and bytes that still do not decode are mapped one
//! byte to one character so no data is dropped.

use std::borrow::Cow;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use encoding_rs::{Encoding, UTF_8};
use quoted_printable::ParseMode;
use tracing::{debug, warn};

use crate::model::mime::MimeNode;

/// Base64 engine that accepts both padded and unpadded input.
const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Charset aliases seen in the wild that `encoding_rs` does not know, or
/// maps differently from what mail clients mean.
const CHARSET_ALIASES: &[(&str, &str)] = &[
    ("latin-1", "iso-8859-1"),
    ("latin_1", "iso-8859-1"),
    ("iso8859-1", "iso-8859-1"),
    ("iso_8859_1", "iso-8859-1"),
    ("iso8859-15", "iso-8859-15"),
    ("latin-9", "iso-8859-15"),
    ("cp1250", "windows-1250"),
    ("cp1251", "windows-1251"),
    ("cp1252", "windows-1252"),
    ("win-1252", "windows-1252"),
    ("utf8", "utf-8"),
    ("utf_8", "utf-8"),
    ("ascii", "utf-8"),
    ("us-ascii", "utf-8"),
    ("ansi_x3.4-1968", "utf-8"),
    ("unknown-8bit", "utf-8"),
    ("x-unknown", "utf-8"),
    ("default", "utf-8"),
];

/// Decoded payload, either raw bytes or text.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Bytes(Vec<u8>),
    Text(String),
}

impl Payload {
    /// Consume as bytes (text is returned as UTF-8).
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Bytes(bytes) => bytes,
            Self::Text(text) => text.into_bytes(),
        }
    }

    /// Consume as text (bytes are decoded as UTF-8, falling back to Latin-1).
    pub fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Bytes(bytes) => decode_charset(None, &bytes),
        }
    }
}

/// Undo the transfer encoding of `body`, then charset-decode it if `as_text`.
pub fn decode_payload(
    body: &[u8],
    transfer_encoding: &str,
    charset: Option<&str>,
    as_text: bool,
) -> Payload {
    let bytes = decode_transfer(body, transfer_encoding);
    if as_text {
        Payload::Text(decode_charset(charset, &bytes))
    } else {
        Payload::Bytes(bytes.into_owned())
    }
}

/// Decoded bytes of a leaf node.
pub fn node_bytes(node: &MimeNode) -> Vec<u8> {
    decode_payload(&node.body, &node.transfer_encoding, None, false).into_bytes()
}

/// Decoded text of a leaf node, using its declared charset.
pub fn node_text(node: &MimeNode) -> String {
    decode_payload(
        &node.body,
        &node.transfer_encoding,
        node.charset.as_deref(),
        true,
    )
    .into_text()
}

/// Remove a `Content-Transfer-Encoding`. Identity encodings borrow the input.
pub fn decode_transfer<'a>(body: &'a [u8], transfer_encoding: &str) -> Cow<'a, [u8]> {
    match transfer_encoding.trim().to_ascii_lowercase().as_str() {
        "base64" => Cow::Owned(decode_base64_lenient(body)),
        "quoted-printable" => Cow::Owned(decode_quoted_printable(body)),
        _ => Cow::Borrowed(body),
    }
}

/// Decode a base64 body, ignoring line breaks and stray characters.
///
/// Returns empty bytes when the data cannot be decoded.
pub fn decode_base64_lenient(input: &[u8]) -> Vec<u8> {
    let mut cleaned: Vec<u8> = input
        .iter()
        .copied()
        .filter(|b| b.is_ascii_alphanumeric() || *b == b'+' || *b == b'/')
        .collect();
    // A single dangling sextet carries no complete byte.
    if cleaned.len() % 4 == 1 {
        cleaned.pop();
    }
    match BASE64.decode(&cleaned) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "Invalid base64 payload, dropping content");
            Vec::new()
        }
    }
}

/// Strict base64 decode (padding optional), for encoded-words.
pub fn decode_base64_strict(input: &str) -> Option<Vec<u8>> {
    BASE64.decode(input.trim()).ok()
}

/// Decode quoted-printable: `=XX` escapes and `=` soft line breaks.
///
/// Malformed escapes are kept literally. Hard line breaks keep the input's
/// style and raw 8-bit bytes pass through unchanged.
pub fn decode_quoted_printable(input: &[u8]) -> Vec<u8> {
    let escaped = escape_raw_bytes(input);
    let mut decoded = match quoted_printable::decode(&escaped[..], ParseMode::Robust) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "Invalid quoted-printable payload, keeping raw bytes");
            return input.to_vec();
        }
    };

    let crlf = input.windows(2).any(|w| w == b"\r\n");
    if !crlf {
        decoded = lf_line_breaks(decoded);
    }
    if ends_with_hard_break(input) {
        let line_break: &[u8] = if crlf { b"\r\n" } else { b"\n" };
        decoded.extend_from_slice(line_break);
    }
    decoded
}

/// The decoder drops bytes outside printable ASCII; escape them first.
fn escape_raw_bytes(input: &[u8]) -> Cow<'_, [u8]> {
    let is_raw = |b: &u8| !matches!(*b, b'\t' | b'\r' | b'\n' | b' '..=b'~');
    if !input.iter().any(is_raw) {
        return Cow::Borrowed(input);
    }
    let mut out = Vec::with_capacity(input.len() + 16);
    for b in input {
        if is_raw(b) {
            out.extend_from_slice(format!("={b:02X}").as_bytes());
        } else {
            out.push(*b);
        }
    }
    Cow::Owned(out)
}

fn lf_line_breaks(bytes: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut iter = bytes.into_iter().peekable();
    while let Some(b) = iter.next() {
        if b == b'\r' && iter.peek() == Some(&b'\n') {
            continue;
        }
        out.push(b);
    }
    out
}

/// The decoder never emits the line break after the last line.
fn ends_with_hard_break(input: &[u8]) -> bool {
    let Some(rest) = input.strip_suffix(b"\n") else {
        return false;
    };
    let rest = rest.strip_suffix(b"\r").unwrap_or(rest);
    !rest.trim_ascii_end().ends_with(b"=")
}

/// Map a declared charset name to a label `encoding_rs` understands.
pub fn normalize_charset(charset: &str) -> String {
    let lower = charset
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .to_ascii_lowercase();

    if let Some((_, canonical)) = CHARSET_ALIASES.iter().find(|(alias, _)| *alias == lower) {
        return (*canonical).to_string();
    }
    if let Some(n) = lower.strip_prefix("cp").filter(|n| n.starts_with("125")) {
        return format!("windows-{n}");
    }
    if let Some(n) = lower.strip_prefix("iso8859-").or_else(|| lower.strip_prefix("iso8859_")) {
        return format!("iso-8859-{n}");
    }
    lower.replace('_', "-")
}

/// Decode `bytes` with the named charset (UTF-8 when `None`).
///
/// Unknown charsets fall back to UTF-8; bytes that are not valid in the
/// chosen encoding fall back to UTF-8 and then to Latin-1.
pub fn decode_charset(charset: Option<&str>, bytes: &[u8]) -> String {
    let label = charset
        .map(normalize_charset)
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| "utf-8".to_string());

    let encoding = match Encoding::for_label(label.as_bytes()) {
        Some(enc) => enc,
        None => {
            warn!(charset = %label, "Unknown charset, falling back to UTF-8");
            UTF_8
        }
    };

    if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes) {
        return text.into_owned();
    }
    if encoding != UTF_8 {
        if let Ok(text) = std::str::from_utf8(bytes) {
            return text.to_string();
        }
    }
    debug!(charset = %label, "Undecodable bytes, mapping byte-to-char");
    encoding_rs::mem::decode_latin1(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoted_printable_soft_break() {
        let encoded = b"Questa =C3=A8 una riga molto lunga che conti=\nnua qui";
        let decoded = decode_quoted_printable(encoded);
        assert_eq!(
            String::from_utf8(decoded).unwrap(),
            "Questa è una riga molto lunga che continua qui"
        );
    }

    #[test]
    fn test_quoted_printable_crlf_soft_break_and_literal_equals() {
        let decoded = decode_quoted_printable(b"a=\r\nb = c =ZZ");
        assert_eq!(decoded, b"ab = c =ZZ");
    }

    #[test]
    fn test_quoted_printable_keeps_line_breaks() {
        assert_eq!(decode_quoted_printable(b"uno\ndue=\ntre\n"), b"uno\nduetre\n");
        assert_eq!(decode_quoted_printable(b"uno\r\ndue\r\n"), b"uno\r\ndue\r\n");
        assert_eq!(decode_quoted_printable(b"fine=\n"), b"fine");
    }

    #[test]
    fn test_quoted_printable_raw_8bit_passes_through() {
        assert_eq!(decode_quoted_printable(b"citt\xe0 =3D ok"), b"citt\xe0 = ok");
    }

    #[test]
    fn test_base64_with_line_breaks() {
        let decoded = decode_base64_lenient(b"SGVsbG8g\r\nV29ybGQ=\r\n");
        assert_eq!(decoded, b"Hello World");
    }

    #[test]
    fn test_base64_unpadded() {
        assert_eq!(decode_base64_lenient(b"Q2lhbw"), b"Ciao");
    }

    #[test]
    fn test_base64_strict_rejects_garbage() {
        assert!(decode_base64_strict("!!!").is_none());
        assert_eq!(decode_base64_strict("Q2lhbw==").unwrap(), b"Ciao");
    }

    #[test]
    fn test_identity_transfer_borrows() {
        let body = b"plain";
        assert!(matches!(decode_transfer(body, "7bit"), Cow::Borrowed(_)));
        assert!(matches!(decode_transfer(body, ""), Cow::Borrowed(_)));
    }

    #[test]
    fn test_normalize_charset() {
        assert_eq!(normalize_charset("Latin-1"), "iso-8859-1");
        assert_eq!(normalize_charset("CP1252"), "windows-1252");
        assert_eq!(normalize_charset("\"UTF-8\""), "utf-8");
        assert_eq!(normalize_charset("iso8859-15"), "iso-8859-15");
        assert_eq!(normalize_charset("ISO_8859-2"), "iso-8859-2");
    }

    #[test]
    fn test_decode_charset_latin1() {
        assert_eq!(decode_charset(Some("latin-1"), b"caf\xe9"), "café");
    }

    #[test]
    fn test_decode_charset_unknown_falls_back_to_utf8() {
        assert_eq!(decode_charset(Some("x-martian"), "città".as_bytes()), "città");
    }

    #[test]
    fn test_decode_charset_invalid_utf8_is_lossless() {
        let text = decode_charset(Some("utf-8"), b"abc\xff");
        assert_eq!(text, "abc\u{ff}");
    }

    #[test]
    fn test_decode_payload_text_and_bytes() {
        let text = decode_payload(b"Y2l0dMOg", "base64", Some("utf-8"), true);
        assert_eq!(text, Payload::Text("città".to_string()));
        let bytes = decode_payload(b"AAEC", "BASE64", None, false);
        assert_eq!(bytes, Payload::Bytes(vec![0, 1, 2]));
    }

    #[test]
    fn test_8bit_body_with_declared_charset() {
        let text = decode_payload(b"Gr\xfc\xdfe", "8bit", Some("iso-8859-1"), true).into_text();
        assert_eq!(text, "Grüße");
    }
}
