//! JSON catalog output.
//!
//! Layout:
//!
//! ```text
//! <dir>/catalog.json            SourceSummary
//! <dir>/emails/<email_id>.json  one Message per file (no attachment bytes)
//! ```

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{PecError, Result};
use crate::model::summary::ParseResult;

/// File name of the source summary.
pub const CATALOG_FILE: &str = "catalog.json";
/// Directory holding one JSON file per message.
pub const EMAILS_DIR: &str = "emails";

/// Write the catalog and per-message files. Returns the catalog path.
pub fn write_catalog(result: &ParseResult, output_dir: &Path) -> Result<PathBuf> {
    let emails_dir = output_dir.join(EMAILS_DIR);
    std::fs::create_dir_all(&emails_dir).map_err(|e| PecError::io(&emails_dir, e))?;

    let catalog_path = output_dir.join(CATALOG_FILE);
    write_json(&catalog_path, &result.summary)?;

    for (email_id, message) in &result.messages {
        write_json(&emails_dir.join(format!("{email_id}.json")), message)?;
    }

    tracing::info!(
        path = %catalog_path.display(),
        messages = result.messages.len(),
        "Wrote JSON catalog"
    );
    Ok(catalog_path)
}

/// Serialize the whole result (summary and messages) as one JSON document.
pub fn to_json_string(result: &ParseResult) -> Result<String> {
    #[derive(Serialize)]
    struct Document<'a> {
        #[serde(flatten)]
        summary: &'a crate::model::summary::SourceSummary,
        emails: Vec<&'a crate::model::message::Message>,
    }

    let doc = Document {
        summary: &result.summary,
        emails: result.messages_in_order().collect(),
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    std::fs::write(path, json).map_err(|e| PecError::io(path, e))
}
