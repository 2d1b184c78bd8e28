//! Certified-mail (PEC) envelope unwrapping.
//!
//! A PEC transport envelope is usually `multipart/signed` around a
//! `multipart/mixed` holding a human-readable notice, `daticert.xml`
//! (envelope metadata) and `postacert.eml` (the original message).
//! Providers differ in how deep the mixed part sits, so it is searched up
//! to two levels below the top node.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, warn};

use crate::model::message::PecMetadata;
use crate::model::mime::MimeNode;
use crate::parser::encoded_word::decode_header_value;
use crate::parser::mime::parse_message;
use crate::parser::payload::{decode_charset, node_bytes};

/// Filenames of envelope infrastructure parts, never reported as attachments.
pub const PEC_INFRA_FILES: [&str; 3] = ["smime.p7s", "daticert.xml", "postacert.eml"];

const METADATA_FILENAME: &str = "daticert.xml";
const ORIGINAL_FILENAME: &str = "postacert.eml";

/// Result of looking for envelope parts in a message tree.
#[derive(Debug, Default)]
pub struct PecParts {
    /// Parsed metadata document, when a metadata part was found.
    pub metadata: Option<PecMetadata>,
    /// The embedded original message, parsed.
    pub inner: Option<MimeNode>,
}

/// `true` if `filename` (raw or decoded) names an infrastructure part.
pub fn is_infra_filename(filename: &str) -> bool {
    let lower = filename.trim().to_lowercase();
    PEC_INFRA_FILES.contains(&lower.as_str())
}

/// Locate the `multipart/mixed` container of a certified-mail envelope.
///
/// Checks the node itself, its children, then the children of multipart
/// children.
pub fn find_mixed_part(root: &MimeNode) -> Option<&MimeNode> {
    if root.is_type("multipart/mixed") {
        return Some(root);
    }
    if !root.is_multipart {
        return None;
    }
    for child in &root.children {
        if child.is_type("multipart/mixed") {
            return Some(child);
        }
        if child.is_multipart {
            if let Some(sub) = child
                .children
                .iter()
                .find(|sub| sub.is_type("multipart/mixed"))
            {
                return Some(sub);
            }
        }
    }
    None
}

/// Find and decode the metadata document and the embedded original.
///
/// When no mixed container exists the top node is searched instead; a
/// non-multipart top node has no envelope parts.
pub fn find_pec_parts(root: &MimeNode) -> PecParts {
    let container = find_mixed_part(root).unwrap_or(root);
    if !container.is_multipart {
        return PecParts::default();
    }

    let mut parts = PecParts::default();
    for child in &container.children {
        let filename = child
            .filename
            .as_deref()
            .map(decode_header_value)
            .unwrap_or_default();

        if filename == METADATA_FILENAME
            || (child.is_type("application/xml") && filename.is_empty())
        {
            parts.metadata = Some(parse_daticert_node(child));
        } else if filename == ORIGINAL_FILENAME || child.is_type("message/rfc822") {
            let raw = node_bytes(child);
            if raw.is_empty() {
                warn!(filename, "Embedded original message is empty");
                continue;
            }
            debug!(bytes = raw.len(), "Unwrapping embedded original message");
            parts.inner = Some(parse_message(&raw));
        }
    }
    parts
}

fn parse_daticert_node(node: &MimeNode) -> PecMetadata {
    let raw = node_bytes(node);
    let charset = node
        .charset
        .clone()
        .or_else(|| declared_xml_encoding(&raw));
    parse_daticert(&decode_charset(charset.as_deref(), &raw))
}

/// Read `encoding="..."` from an XML declaration.
fn declared_xml_encoding(raw: &[u8]) -> Option<String> {
    let head = &raw[..raw.len().min(200)];
    let head = String::from_utf8_lossy(head);
    let decl = head.strip_prefix('\u{feff}').unwrap_or(&head);
    let decl = &decl[..decl.find("?>")?];
    let rest = &decl[decl.find("encoding")? + "encoding".len()..];
    let rest = rest.trim_start().strip_prefix('=')?.trim_start();
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let value = &rest[1..];
    Some(value[..value.find(quote)?].to_string())
}

/// Parse a `daticert.xml` document.
///
/// Reads the `tipo` and `errore` attributes of the root, then
/// `intestazione/{mittente,oggetto}` and
/// `dati/{gestore-emittente,data/{giorno,ora},identificativo,msgid}`.
/// A document that fails to parse yields an empty [`PecMetadata`].
pub fn parse_daticert(xml: &str) -> PecMetadata {
    match read_daticert(xml) {
        Ok(meta) => meta,
        Err(e) => {
            warn!(error = %e, "Malformed certified-mail metadata document");
            PecMetadata::default()
        }
    }
}

fn read_daticert(xml: &str) -> Result<PecMetadata, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut meta = PecMetadata::default();
    let mut path: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut day: Option<String> = None;
    let mut time: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => {
                if path.is_empty() {
                    read_root_attributes(e, &mut meta);
                }
                path.push(String::from_utf8_lossy(e.name().as_ref()).to_string());
                text.clear();
            }
            Event::Empty(ref e) => {
                if path.is_empty() {
                    read_root_attributes(e, &mut meta);
                }
            }
            Event::Text(e) => {
                text.push_str(&e.unescape().unwrap_or_default());
            }
            Event::CData(e) => {
                text.push_str(&String::from_utf8_lossy(&e.into_inner()));
            }
            Event::End(_) => {
                let value = text.trim().to_string();
                let element: Vec<&str> = path.iter().skip(1).map(String::as_str).collect();
                match element.as_slice() {
                    ["intestazione", "mittente"] => meta.sender = non_empty(value),
                    ["intestazione", "oggetto"] => meta.subject = non_empty(value),
                    ["dati", "gestore-emittente"] => meta.provider = non_empty(value),
                    ["dati", "data", "giorno"] => day = Some(value),
                    ["dati", "data", "ora"] => time = Some(value),
                    ["dati", "identificativo"] => meta.identifier = non_empty(value),
                    ["dati", "msgid"] => meta.message_id = non_empty(value),
                    _ => {}
                }
                path.pop();
                text.clear();
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let (Some(day), Some(time)) = (day, time) {
        meta.date = Some(format!("{day} {time}"));
    }
    Ok(meta)
}

fn read_root_attributes(e: &BytesStart<'_>, meta: &mut PecMetadata) {
    for attr in e.attributes().flatten() {
        let value = attr
            .unescape_value()
            .map(|v| v.trim().to_string())
            .unwrap_or_default();
        match attr.key.as_ref() {
            b"tipo" => meta.envelope_type = non_empty(value),
            b"errore" => meta.error = non_empty(value),
            _ => {}
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATICERT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<postacert tipo="posta-certificata" errore="nessuno">
  <intestazione>
    <mittente>mario.rossi@pec.example.it</mittente>
    <destinatari tipo="certificato">uffici@pec.example.it</destinatari>
    <risposte>mario.rossi@pec.example.it</risposte>
    <oggetto>Fattura 123</oggetto>
  </intestazione>
  <dati>
    <gestore-emittente>Aruba PEC S.p.A.</gestore-emittente>
    <data zona="+0100">
      <giorno>04/01/2024</giorno>
      <ora>10:00:05</ora>
    </data>
    <identificativo>opec210.20240104100005.1234.56.1.1@pec.aruba.it</identificativo>
    <msgid>&lt;abc123@example.it&gt;</msgid>
  </dati>
</postacert>"#;

    #[test]
    fn test_parse_daticert() {
        let meta = parse_daticert(DATICERT);
        assert_eq!(meta.envelope_type.as_deref(), Some("posta-certificata"));
        assert_eq!(meta.error.as_deref(), Some("nessuno"));
        assert_eq!(meta.sender.as_deref(), Some("mario.rossi@pec.example.it"));
        assert_eq!(meta.subject.as_deref(), Some("Fattura 123"));
        assert_eq!(meta.provider.as_deref(), Some("Aruba PEC S.p.A."));
        assert_eq!(meta.date.as_deref(), Some("04/01/2024 10:00:05"));
        assert_eq!(meta.message_id.as_deref(), Some("<abc123@example.it>"));
        assert!(meta
            .identifier
            .as_deref()
            .is_some_and(|id| id.starts_with("opec210")));
    }

    #[test]
    fn test_daticert_without_time_has_no_date() {
        let meta = parse_daticert(
            "<postacert tipo=\"accettazione\"><dati><data><giorno>01/02/2024</giorno></data></dati></postacert>",
        );
        assert_eq!(meta.envelope_type.as_deref(), Some("accettazione"));
        assert!(meta.date.is_none());
    }

    #[test]
    fn test_malformed_daticert_is_empty() {
        let meta = parse_daticert("<postacert tipo=\"x\"><dati></intestazione></postacert>");
        assert!(meta.is_empty());
        assert!(parse_daticert("").is_empty());
    }

    #[test]
    fn test_declared_xml_encoding() {
        assert_eq!(
            declared_xml_encoding(b"<?xml version=\"1.0\" encoding='ISO-8859-1'?><a/>").as_deref(),
            Some("ISO-8859-1")
        );
        assert!(declared_xml_encoding(b"<a/>").is_none());
    }

    #[test]
    fn test_infra_filenames() {
        assert!(is_infra_filename("SMIME.P7S"));
        assert!(is_infra_filename("daticert.xml"));
        assert!(!is_infra_filename("fattura.pdf"));
    }

    fn envelope(mixed_depth: usize) -> Vec<u8> {
        let mixed = "Content-Type: multipart/mixed; boundary=\"mix\"\n\
\n\
--mix\n\
Content-Type: text/plain\n\
\n\
Messaggio di posta certificata\n\
--mix\n\
Content-Type: application/xml; name=\"daticert.xml\"\n\
Content-Disposition: inline; filename=\"daticert.xml\"\n\
\n\
<postacert tipo=\"posta-certificata\"><dati><gestore-emittente>Provider</gestore-emittente></dati></postacert>\n\
--mix\n\
Content-Type: message/rfc822; name=\"postacert.eml\"\n\
Content-Disposition: inline; filename=\"postacert.eml\"\n\
\n\
From: Mario <mario@example.it>\n\
Subject: Originale\n\
\n\
Testo originale\n\
--mix--\n";
        if mixed_depth == 0 {
            return mixed.as_bytes().to_vec();
        }
        let mut part = mixed.to_string();
        for (level, content_type) in ["multipart/alternative", "multipart/related"]
            .iter()
            .take(mixed_depth - 1)
            .enumerate()
            .rev()
        {
            part = format!(
                "Content-Type: {content_type}; boundary=\"l{level}\"\n\n--l{level}\n{part}--l{level}--\n"
            );
        }
        format!(
            "Content-Type: multipart/signed; boundary=\"sig\"\n\
\n\
--sig\n\
{part}\n\
--sig\n\
Content-Type: application/pkcs7-signature; name=\"smime.p7s\"\n\
\n\
AAAA\n\
--sig--\n"
        )
        .into_bytes()
    }

    #[test]
    fn test_find_pec_parts_top_level_mixed() {
        let root = parse_message(&envelope(0));
        let parts = find_pec_parts(&root);
        assert_eq!(
            parts.metadata.and_then(|m| m.provider).as_deref(),
            Some("Provider")
        );
        let inner = parts.inner.unwrap();
        assert_eq!(inner.headers.get("subject"), Some("Originale"));
    }

    #[test]
    fn test_find_pec_parts_under_signed() {
        let root = parse_message(&envelope(1));
        assert!(find_mixed_part(&root).is_some());
        let parts = find_pec_parts(&root);
        assert!(parts.metadata.is_some());
        assert!(parts.inner.is_some());
    }

    #[test]
    fn test_find_pec_parts_grandchild_mixed() {
        let root = parse_message(&envelope(2));
        let mixed = find_mixed_part(&root).unwrap();
        assert_eq!(mixed.children.len(), 3);
        let parts = find_pec_parts(&root);
        assert_eq!(
            parts.metadata.and_then(|m| m.provider).as_deref(),
            Some("Provider")
        );
        assert_eq!(
            parts.inner.unwrap().headers.get("subject"),
            Some("Originale")
        );
    }

    #[test]
    fn test_mixed_part_too_deep_is_not_found() {
        let root = parse_message(&envelope(3));
        assert!(find_mixed_part(&root).is_none());
        let parts = find_pec_parts(&root);
        assert!(parts.metadata.is_none());
        assert!(parts.inner.is_none());
    }

    #[test]
    fn test_plain_message_has_no_parts() {
        let root = parse_message(b"Subject: plain\n\nhello\n");
        let parts = find_pec_parts(&root);
        assert!(parts.metadata.is_none());
        assert!(parts.inner.is_none());
    }
}
