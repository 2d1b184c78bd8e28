//! Parsed message records and certified-mail metadata.

use chrono::{DateTime, FixedOffset};

use super::attachment::Attachment;

/// Metadata read from the certified-mail envelope document (`daticert.xml`).
///
/// Every field is optional: a missing or malformed document yields
/// `PecMetadata::default()`.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PecMetadata {
    /// Envelope type (`posta-certificata`, `accettazione`, `avvenuta-consegna`, …).
    pub envelope_type: Option<String>,
    /// Envelope error code (`nessuno` when delivery succeeded).
    pub error: Option<String>,
    /// Sender declared in the envelope.
    pub sender: Option<String>,
    /// Subject declared in the envelope.
    pub subject: Option<String>,
    /// Certified-mail provider that issued the envelope.
    pub provider: Option<String>,
    /// Issuance date and time, `"<day> <time>"` as written by the provider.
    pub date: Option<String>,
    /// Provider-assigned envelope identifier.
    pub identifier: Option<String>,
    /// Message-ID of the original message, as recorded by the provider.
    pub message_id: Option<String>,
}

impl PecMetadata {
    /// `true` if no field was found.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A fully parsed message.
///
/// Created once per archive parse and never mutated afterwards.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Message {
    /// Stable identifier derived from the Message-ID (or sender, subject and date).
    pub email_id: String,

    /// Raw `Message-ID` header value (empty if absent).
    pub message_id: String,

    /// Decoded subject.
    pub subject: String,

    /// Subject with reply/forward/certified-mail prefixes removed; the thread key.
    pub clean_subject: String,

    /// Sender address.
    pub sender: String,

    /// Addresses from `To` and `Cc`, in order.
    pub recipients: Vec<String>,

    /// Display date; the raw header value when it could not be parsed.
    pub date: String,

    /// Parsed `Date` header, if it could be parsed.
    pub timestamp: Option<DateTime<FixedOffset>>,

    /// Decoded `text/plain` body.
    pub body_text: Option<String>,

    /// Decoded `text/html` body.
    pub body_html: Option<String>,

    /// Attachments and inline resources, in MIME order.
    pub attachments: Vec<Attachment>,

    /// Provider that issued the certified-mail envelope.
    pub pec_provider: Option<String>,

    /// Certified-mail envelope type.
    pub pec_type: Option<String>,

    /// Certified-mail envelope issuance date.
    pub pec_date: Option<String>,

    /// Archive file name this message came from.
    pub source_file: Option<String>,

    /// `true` when the message could not be parsed and only header fragments were kept.
    #[serde(default)]
    pub is_placeholder: bool,
}

impl Message {
    /// Attachments shown to the user (inline images excluded).
    pub fn visible_attachments(&self) -> impl Iterator<Item = &Attachment> {
        self.attachments.iter().filter(|a| a.is_visible())
    }

    /// Resolve an inline resource by its `Content-ID` (with or without `<>`).
    pub fn attachment_by_content_id(&self, content_id: &str) -> Option<&Attachment> {
        let wanted = content_id.trim().trim_start_matches('<').trim_end_matches('>');
        self.attachments
            .iter()
            .find(|a| a.content_id.as_deref() == Some(wanted))
    }

    /// Whether the message arrived inside a certified-mail envelope.
    pub fn is_certified(&self) -> bool {
        self.pec_provider.is_some() || self.pec_type.is_some()
    }
}
