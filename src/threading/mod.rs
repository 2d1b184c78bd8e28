//! Subject-based conversation grouping.
//!
//! Subjects are normalized (reply, forward and certified-mail prefixes
//! removed), bucketed by exact case-insensitive match, and buckets whose
//! keys are similar enough are merged.

pub mod group;
pub mod subject;

pub use group::{group_messages, similarity, DEFAULT_SIMILARITY_THRESHOLD};
pub use subject::clean_subject;
