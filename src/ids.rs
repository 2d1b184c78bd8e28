//! Deterministic identifiers for messages, groups and sources.

use sha2::{Digest, Sha256};

/// First `len` hex digits of the SHA-256 of `input`.
fn short_hash(input: &str, len: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    hash[..len].to_string()
}

/// `email_<12 hex>` from the Message-ID, or from sender, subject and raw
/// date when there is no Message-ID.
pub fn email_id(message_id: &str, sender: &str, subject: &str, raw_date: &str) -> String {
    let key = if message_id.is_empty() {
        format!("{sender}_{subject}_{raw_date}")
    } else {
        message_id.to_string()
    };
    format!("email_{}", short_hash(&key, 12))
}

/// `group_<8 hex>` from the group label.
pub fn group_id(label: &str) -> String {
    format!("group_{}", short_hash(label, 8))
}

/// `src_<12 hex>` from the source file name and the upload timestamp.
pub fn source_id(source_file: &str, uploaded_at: &str) -> String {
    format!("src_{}", short_hash(&format!("{source_file}|{uploaded_at}"), 12))
}
