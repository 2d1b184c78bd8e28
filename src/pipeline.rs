//! Archive parsing pipeline.
//!
//! Drives the splitter, the MIME parser, the certified-mail unwrapper and
//! the extractors over one archive, then groups the messages and assembles
//! the [`ParseResult`]. Everything is computed in memory; the only I/O is
//! reading the archive in [`parse_file`].

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::Local;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{PecError, Result};
use crate::ids;
use crate::model::message::Message;
use crate::model::mime::HeaderMap;
use crate::model::summary::{EmailSummary, ParseResult, SourceSummary};
use crate::parser::address::{extract_email_address, extract_recipients};
use crate::parser::encoded_word::decode_header_value;
use crate::parser::extract::{extract_content, BodySelection};
use crate::parser::header::{
    format_display_date, parse_date, parse_header_block, DEFAULT_DATE_FORMAT,
};
use crate::parser::mbox::{read_archive, MboxSplitter, RawMessage, MAX_MESSAGE_SIZE};
use crate::parser::mime::build_node;
use crate::parser::pec::find_pec_parts;
use crate::threading::{clean_subject, group_messages, DEFAULT_SIMILARITY_THRESHOLD};

/// Byte-order marks of encodings the splitter cannot read.
const WIDE_BOMS: [(&[u8], &str); 4] = [
    (&[0xFF, 0xFE, 0x00, 0x00], "UTF-32LE"),
    (&[0x00, 0x00, 0xFE, 0xFF], "UTF-32BE"),
    (&[0xFF, 0xFE], "UTF-16LE"),
    (&[0xFE, 0xFF], "UTF-16BE"),
];

/// Tunables for one parse.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOptions {
    /// Subject similarity at or above which groups merge.
    pub similarity_threshold: f64,
    /// Which text part becomes the body when there are several.
    pub body_selection: BodySelection,
    /// `strftime` format of `Message::date`.
    pub date_format: String,
    /// `strftime` format of `SourceSummary::uploaded_at`.
    pub uploaded_at_format: String,
    /// Messages larger than this are truncated by the splitter.
    pub max_message_size: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            body_selection: BodySelection::default(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            uploaded_at_format: DEFAULT_DATE_FORMAT.to_string(),
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

impl From<&Config> for ParseOptions {
    fn from(config: &Config) -> Self {
        Self {
            similarity_threshold: config.grouping.similarity_threshold,
            body_selection: config.extract.body_selection,
            date_format: config.general.date_format.clone(),
            uploaded_at_format: config.general.uploaded_at_format.clone(),
            max_message_size: config.performance.max_message_size,
        }
    }
}

/// Parse an archive file. The source name is the file name.
pub fn parse_file(path: impl AsRef<Path>, options: &ParseOptions) -> Result<ParseResult> {
    let path = path.as_ref();
    let data = read_archive(path)?;
    let source_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    parse_archive(&data, &source_name, options)
}

/// Parse archive text. Equivalent to [`parse_archive`] on its UTF-8 bytes.
pub fn parse_str(text: &str, source_name: &str, options: &ParseOptions) -> Result<ParseResult> {
    parse_archive(text.as_bytes(), source_name, options)
}

/// Parse an archive, stamping it with the current local time.
pub fn parse_archive(
    data: &[u8],
    source_name: &str,
    options: &ParseOptions,
) -> Result<ParseResult> {
    let now = Local::now().fixed_offset();
    let uploaded_at = format_display_date(&now, &options.uploaded_at_format);
    parse_archive_at(data, source_name, &uploaded_at, options)
}

/// Parse an archive with an explicit upload timestamp.
///
/// The result depends only on the inputs: the same bytes, source name and
/// timestamp always give the same message, group and source ids.
///
/// # Errors
///
/// [`PecError::InvalidArchive`] when the archive is UTF-16 or UTF-32
/// encoded. Problems inside single messages are not errors: such messages
/// become placeholders.
pub fn parse_archive_at(
    data: &[u8],
    source_name: &str,
    uploaded_at: &str,
    options: &ParseOptions,
) -> Result<ParseResult> {
    if let Some((_, encoding)) = WIDE_BOMS.iter().find(|(bom, _)| data.starts_with(bom)) {
        return Err(PecError::invalid_archive(
            source_name,
            format!("{encoding} encoded archives are not supported"),
        ));
    }

    let raw_messages = MboxSplitter::new()
        .with_max_message_size(options.max_message_size)
        .split(data);

    let mut seen_ids: HashMap<String, usize> = HashMap::new();
    let mut messages = Vec::with_capacity(raw_messages.len());
    let mut placeholders = 0;

    for raw in &raw_messages {
        let mut msg = match parse_message(raw, source_name, options) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, source = source_name, "Keeping placeholder for message");
                placeholders += 1;
                placeholder_message(raw, source_name, options)
            }
        };

        let count = seen_ids.entry(msg.email_id.clone()).or_insert(0);
        *count += 1;
        if *count > 1 {
            let unique = format!("{}_{}", msg.email_id, count);
            debug!(email_id = %msg.email_id, unique = %unique, "Duplicate message id");
            msg.email_id = unique;
        }
        messages.push(msg);
    }

    let groups = group_messages(&messages, options.similarity_threshold);
    let summary = SourceSummary {
        source_id: ids::source_id(source_name, uploaded_at),
        source_file: source_name.to_string(),
        uploaded_at: uploaded_at.to_string(),
        email_count: messages.len(),
        groups,
        emails_summary: messages.iter().map(EmailSummary::from).collect(),
    };

    info!(
        source = source_name,
        messages = summary.email_count,
        groups = summary.groups.len(),
        placeholders,
        "Parsed archive"
    );

    let messages: BTreeMap<String, Message> = messages
        .into_iter()
        .map(|m| (m.email_id.clone(), m))
        .collect();

    Ok(ParseResult { summary, messages })
}

/// Parse one raw message into a [`Message`].
///
/// Fails with [`PecError::MalformedMessage`] when the header section is
/// broken (no field at all, or body text without the blank separator).
pub fn parse_message(
    raw: &RawMessage,
    source_name: &str,
    options: &ParseOptions,
) -> Result<Message> {
    let block = parse_header_block(&raw.data);
    if block.is_malformed() {
        return Err(PecError::MalformedMessage {
            index: raw.index,
            reason: if block.headers.is_empty() {
                "no header fields".to_string()
            } else {
                "header section not terminated by a blank line".to_string()
            },
        });
    }

    let root = build_node(block.headers, block.body);
    let pec = find_pec_parts(&root);
    let node = pec.inner.as_ref().unwrap_or(&root);
    let fields = HeaderFields::read(&node.headers, &root.headers);

    let content = extract_content(node, options.body_selection);
    let metadata = pec.metadata.unwrap_or_default();

    let timestamp = parse_date(&fields.raw_date);
    let date = timestamp
        .as_ref()
        .map(|dt| format_display_date(dt, &options.date_format))
        .unwrap_or_else(|| fields.raw_date.clone());

    debug!(
        index = raw.index,
        subject = %fields.subject,
        certified = pec.inner.is_some(),
        attachments = content.attachments.len(),
        "Parsed message"
    );

    Ok(Message {
        email_id: fields.email_id(),
        clean_subject: clean_subject(&fields.subject),
        recipients: extract_recipients(&node.headers),
        message_id: fields.message_id,
        subject: fields.subject,
        sender: fields.sender,
        date,
        timestamp,
        body_text: content.body_text,
        body_html: content.body_html,
        attachments: content.attachments,
        pec_provider: metadata.provider,
        pec_type: metadata.envelope_type,
        pec_date: metadata.date,
        source_file: non_empty(source_name),
        is_placeholder: false,
    })
}

/// Minimal message built from whatever header fields could be read.
fn placeholder_message(raw: &RawMessage, source_name: &str, options: &ParseOptions) -> Message {
    let headers = parse_header_block(&raw.data).headers;
    let fields = HeaderFields::read(&headers, &headers);
    let timestamp = parse_date(&fields.raw_date);
    let date = timestamp
        .as_ref()
        .map(|dt| format_display_date(dt, &options.date_format))
        .unwrap_or_else(|| fields.raw_date.clone());

    Message {
        email_id: fields.email_id(),
        clean_subject: clean_subject(&fields.subject),
        recipients: extract_recipients(&headers),
        message_id: fields.message_id,
        subject: fields.subject,
        sender: fields.sender,
        date,
        timestamp,
        source_file: non_empty(source_name),
        is_placeholder: true,
        ..Message::default()
    }
}

/// Identity fields of a message: from the extracted (inner) headers, with
/// `Message-ID` and `Date` falling back to the outer envelope.
struct HeaderFields {
    message_id: String,
    subject: String,
    sender: String,
    raw_date: String,
}

impl HeaderFields {
    fn read(inner: &HeaderMap, outer: &HeaderMap) -> Self {
        let with_fallback = |name: &str| {
            inner
                .get_non_empty(name)
                .or_else(|| outer.get_non_empty(name))
                .map(|v| v.trim().to_string())
                .unwrap_or_default()
        };
        Self {
            message_id: with_fallback("message-id"),
            raw_date: with_fallback("date"),
            subject: inner
                .get("subject")
                .map(decode_header_value)
                .unwrap_or_default(),
            sender: inner
                .get("from")
                .map(extract_email_address)
                .unwrap_or_default(),
        }
    }

    fn email_id(&self) -> String {
        ids::email_id(&self.message_id, &self.sender, &self.subject, &self.raw_date)
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}
