//! Per-archive output: thread groups, message summaries and the parse result.

use std::collections::BTreeMap;

use super::message::Message;

/// A conversation thread: messages whose cleaned subjects match or are similar.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ThreadGroup {
    /// `group_<hash of label>`.
    pub group_id: String,
    /// Longest cleaned subject among the members.
    pub label: String,
    /// Member message ids, in grouping order.
    pub email_ids: Vec<String>,
}

/// Compact projection of a [`Message`] for listings.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EmailSummary {
    pub email_id: String,
    pub subject: String,
    pub sender: String,
    pub date: String,
    pub clean_subject: String,
    /// Number of attachments, inline resources included.
    pub attachment_count: usize,
    /// Filenames of the visible (non-inline) attachments.
    pub attachment_names: Vec<String>,
    pub pec_provider: Option<String>,
    pub source_file: Option<String>,
}

impl From<&Message> for EmailSummary {
    fn from(msg: &Message) -> Self {
        let attachment_names: Vec<String> = msg
            .visible_attachments()
            .map(|a| a.filename.clone())
            .collect();
        Self {
            email_id: msg.email_id.clone(),
            subject: msg.subject.clone(),
            sender: msg.sender.clone(),
            date: msg.date.clone(),
            clean_subject: msg.clean_subject.clone(),
            attachment_count: msg.attachments.len(),
            attachment_names,
            pec_provider: msg.pec_provider.clone(),
            source_file: msg.source_file.clone(),
        }
    }
}

/// Aggregate over one parsed archive.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SourceSummary {
    /// `src_<hash of file name and upload time>`.
    pub source_id: String,
    pub source_file: String,
    /// Formatted parse timestamp.
    pub uploaded_at: String,
    pub email_count: usize,
    pub groups: Vec<ThreadGroup>,
    /// One entry per message, in archive order.
    pub emails_summary: Vec<EmailSummary>,
}

/// Everything produced by one archive parse.
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub summary: SourceSummary,
    /// Full messages keyed by `email_id`.
    pub messages: BTreeMap<String, Message>,
}

impl ParseResult {
    /// Messages in archive order.
    pub fn messages_in_order(&self) -> impl Iterator<Item = &Message> {
        self.summary
            .emails_summary
            .iter()
            .filter_map(|s| self.messages.get(&s.email_id))
    }

    /// Look up a message by id.
    pub fn message(&self, email_id: &str) -> Option<&Message> {
        self.messages.get(email_id)
    }
}
