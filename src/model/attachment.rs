//! Decoded attachments.

/// An attachment or inline resource extracted from a message.
///
/// The payload is fully decoded (transfer encoding removed). It is not
/// written to JSON output; use the export helpers to persist it.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Attachment {
    /// Sanitized filename, unique within the owning message.
    pub filename: String,

    /// MIME content type (e.g. `"image/png"`, `"application/pdf"`).
    pub content_type: String,

    /// Decoded size in bytes.
    pub size: u64,

    /// `Content-ID` without angle brackets, for resources referenced from HTML.
    pub content_id: Option<String>,

    /// `true` for inline images embedded in the HTML body.
    pub is_inline: bool,

    /// Decoded payload.
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl Attachment {
    /// Whether this attachment should be listed to the user.
    ///
    /// Inline images are part of the rendered body, not the attachment list.
    pub fn is_visible(&self) -> bool {
        !self.is_inline
    }
}
