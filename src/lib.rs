//! `pecmbox`: parse MBOX archives of Italian certified mail (PEC).
//!
//! The library splits an archive into messages, builds each message's MIME
//! tree, unwraps certified-mail envelopes to reach the original message,
//! extracts bodies and attachments, and groups messages into threads by
//! subject. The entry points are in [`pipeline`]:
//!
//! ```
//! use pecmbox::pipeline::{parse_archive_at, ParseOptions};
//!
//! let archive = b"From a@example.it Thu Jan  4 10:00:00 2024\n\
//! Subject: Re: Fattura 123\n\
//! \n\
//! In allegato.\n";
//! let result = parse_archive_at(archive, "inbox.mbox", "04/01/2024 10:00", &ParseOptions::default())?;
//! assert_eq!(result.summary.email_count, 1);
//! assert_eq!(result.summary.groups[0].label, "Fattura 123");
//! # Ok::<(), pecmbox::error::PecError>(())
//! ```

pub mod config;
pub mod error;
pub mod export;
pub mod ids;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod threading;
