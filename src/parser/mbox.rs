//! MBOX splitter.
//!
//! Divides an archive into raw message blocks on `From ` separator lines.
//! Works on bytes so that no charset decoding happens before each MIME
//! part's declared charset is known. Tolerant of malformed input.

use std::path::Path;

use tracing::{debug, warn};

use crate::error::{PecError, Result};

/// Default maximum message size in bytes (256 MB).
pub const MAX_MESSAGE_SIZE: usize = 256 * 1024 * 1024;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// One message block as found in the archive.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    /// Sequential index within the archive (0, 1, 2, …).
    pub index: usize,
    /// The `From ` separator line, without its line break.
    pub envelope: String,
    /// Message bytes (headers + body), separator line excluded,
    /// `>From ` escapes removed.
    pub data: Vec<u8>,
}

/// Splits an MBOX archive into [`RawMessage`]s.
///
/// The splitter is tolerant of:
///
/// - Mixed `\n` and `\r\n` line endings
/// - `From ` lines not preceded by a blank line (logs a warning)
/// - A UTF-8 BOM at the start of the archive
/// - Content before the first separator (discarded)
/// - Oversized messages (truncated, logs a warning)
#[derive(Debug, Clone)]
pub struct MboxSplitter {
    max_message_size: usize,
}

impl Default for MboxSplitter {
    fn default() -> Self {
        Self {
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

/// A message being accumulated.
struct Pending {
    envelope: String,
    buf: Vec<u8>,
    truncated: bool,
}

impl MboxSplitter {
    /// Create a splitter with the default size limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the per-message size limit.
    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    /// Split `data` into messages. An archive without separators yields
    /// an empty list.
    pub fn split(&self, data: &[u8]) -> Vec<RawMessage> {
        let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);

        let mut messages: Vec<RawMessage> = Vec::new();
        let mut current: Option<Pending> = None;
        let mut prev_line_was_empty = true;
        let mut offset: usize = 0;

        for line in data.split_inclusive(|&b| b == b'\n') {
            if is_mbox_separator(line) {
                if let Some(pending) = current.take() {
                    if !prev_line_was_empty {
                        warn!(
                            offset,
                            "Found 'From ' separator without preceding blank line"
                        );
                    }
                    messages.push(finish(messages.len(), pending));
                }
                current = Some(Pending {
                    envelope: String::from_utf8_lossy(trim_line_break(line)).into_owned(),
                    buf: Vec::with_capacity(16 * 1024),
                    truncated: false,
                });
            } else if let Some(pending) = current.as_mut() {
                // Once cut, nothing more is kept until the next separator.
                let line = unescape_from_line(line);
                if !pending.truncated {
                    if pending.buf.len() + line.len() <= self.max_message_size {
                        pending.buf.extend_from_slice(line);
                    } else {
                        warn!(
                            index = messages.len(),
                            max_size = self.max_message_size,
                            "Message exceeds maximum size, truncating body"
                        );
                        pending.truncated = true;
                    }
                }
            }

            prev_line_was_empty = is_blank_line(line);
            offset += line.len();
        }

        if let Some(pending) = current.take() {
            messages.push(finish(messages.len(), pending));
        }

        debug!(count = messages.len(), bytes = data.len(), "Split archive");
        messages
    }
}

/// Split an archive with default settings.
pub fn split_messages(data: &[u8]) -> Vec<RawMessage> {
    MboxSplitter::default().split(data)
}

/// Read a whole archive into memory.
pub fn read_archive(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            PecError::FileNotFound(path.to_path_buf())
        } else {
            PecError::io(path, e)
        }
    })
}

/// Close a pending message, dropping the blank line that precedes the
/// next separator.
fn finish(index: usize, pending: Pending) -> RawMessage {
    let mut data = pending.buf;
    if data.ends_with(b"\r\n\r\n") {
        data.truncate(data.len() - 2);
    } else if data.ends_with(b"\n\n") {
        data.truncate(data.len() - 1);
    }
    RawMessage {
        index,
        envelope: pending.envelope,
        data,
    }
}

/// Check whether a line is an MBOX separator (`From ` at the start).
fn is_mbox_separator(line: &[u8]) -> bool {
    line.starts_with(b"From ")
}

/// Remove one level of `>From ` quoting (mboxrd).
fn unescape_from_line(line: &[u8]) -> &[u8] {
    if line.first() != Some(&b'>') {
        return line;
    }
    let unquoted = line
        .iter()
        .position(|&b| b != b'>')
        .map_or(&line[line.len()..], |pos| &line[pos..]);
    if unquoted.starts_with(b"From ") {
        &line[1..]
    } else {
        line
    }
}

/// Check whether a line is blank (empty or only whitespace / CR / LF).
fn is_blank_line(line: &[u8]) -> bool {
    line.iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b' ' || b == b'\t')
}

fn trim_line_break(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_mbox_separator() {
        assert!(is_mbox_separator(
            b"From user@example.com Thu Jan 01 00:00:00 2024\n"
        ));
        assert!(!is_mbox_separator(b"from user@example.com\n"));
        assert!(!is_mbox_separator(b">From user@example.com\n"));
        assert!(!is_mbox_separator(b"Subject: From here\n"));
    }

    #[test]
    fn test_is_blank_line() {
        assert!(is_blank_line(b"\n"));
        assert!(is_blank_line(b"\r\n"));
        assert!(is_blank_line(b"  \n"));
        assert!(!is_blank_line(b"hello\n"));
    }

    #[test]
    fn test_unescape_from_line() {
        assert_eq!(unescape_from_line(b">From the start\n"), b"From the start\n");
        assert_eq!(unescape_from_line(b">>From deeper\n"), b">From deeper\n");
        assert_eq!(unescape_from_line(b"> quoted reply\n"), b"> quoted reply\n");
        assert_eq!(unescape_from_line(b">\n"), b">\n");
    }

    #[test]
    fn test_split_two_messages() {
        let data = b"From a@x Mon Jan 01 00:00:00 2024\nSubject: One\n\nBody one\n\n\
From b@x Mon Jan 01 00:00:00 2024\nSubject: Two\n\nBody two\n";
        let messages = split_messages(data);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].index, 0);
        assert_eq!(messages[0].envelope, "From a@x Mon Jan 01 00:00:00 2024");
        assert_eq!(messages[0].data, b"Subject: One\n\nBody one\n");
        assert_eq!(messages[1].data, b"Subject: Two\n\nBody two\n");
    }

    #[test]
    fn test_split_discards_preamble() {
        let data = b"garbage before\n\nFrom a@x Mon Jan 01 00:00:00 2024\nSubject: One\n\nBody\n";
        let messages = split_messages(data);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].data.starts_with(b"Subject: One"));
    }

    #[test]
    fn test_split_without_separator_is_empty() {
        assert!(split_messages(b"Subject: no envelope\n\nBody\n").is_empty());
        assert!(split_messages(b"").is_empty());
    }

    #[test]
    fn test_split_unescapes_body() {
        let data = b"From a@x Mon Jan 01 00:00:00 2024\nSubject: One\n\n>From the desk\n";
        let messages = split_messages(data);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].data, b"Subject: One\n\nFrom the desk\n");
    }

    #[test]
    fn test_split_with_bom_and_crlf() {
        let mut data = UTF8_BOM.to_vec();
        data.extend_from_slice(b"From a@x Mon Jan 01 00:00:00 2024\r\nSubject: One\r\n\r\nBody\r\n\r\n");
        data.extend_from_slice(b"From b@x Mon Jan 01 00:00:00 2024\r\nSubject: Two\r\n\r\nBody\r\n");
        let messages = split_messages(&data);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].data, b"Subject: One\r\n\r\nBody\r\n");
    }

    #[test]
    fn test_split_truncates_oversized() {
        let data = b"From a@x Mon Jan 01 00:00:00 2024\nSubject: One\n\n0123456789\n0123456789\n";
        let messages = MboxSplitter::new().with_max_message_size(20).split(data);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].data.len() <= 20);
        assert!(messages[0].data.starts_with(b"Subject: One"));
    }

    #[test]
    fn test_truncation_keeps_nothing_after_the_cut() {
        let data = b"From a@x\nSubject: One\n\n0123456789ABCDEF\nxyz\n\nFrom b@x\nSubject: Two\n\nok\n";
        let messages = MboxSplitter::new().with_max_message_size(30).split(data);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].data, b"Subject: One\n");
        assert_eq!(messages[1].data, b"Subject: Two\n\nok\n");
    }
}
