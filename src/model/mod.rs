//! Core data model: MIME tree nodes, parsed messages, attachments and
//! the per-archive summary handed to downstream consumers.

pub mod attachment;
pub mod message;
pub mod mime;
pub mod summary;
