//! Writing parse results to disk: JSON catalog, attachments, and text.
//!
//! These helpers are used by the CLI and sit outside the parsing pipeline,
//! which never touches the file system.

pub mod attachment;
pub mod json;
pub mod text;
