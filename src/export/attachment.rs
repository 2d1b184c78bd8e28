//! Save decoded attachments to disk.

use std::path::{Path, PathBuf};

use crate::error::{PecError, Result};
use crate::model::message::Message;
use crate::model::summary::ParseResult;
use crate::parser::extract::split_extension;

/// Save every attachment of `message` under `<output_dir>/<email_id>/`.
///
/// Inline resources are included. Existing files are never overwritten:
/// a counter is appended to the name instead. Returns the written paths.
pub fn save_attachments(message: &Message, output_dir: &Path) -> Result<Vec<PathBuf>> {
    if message.attachments.is_empty() {
        return Ok(Vec::new());
    }

    let dir = output_dir.join(&message.email_id);
    std::fs::create_dir_all(&dir).map_err(|e| PecError::io(&dir, e))?;

    let mut paths = Vec::with_capacity(message.attachments.len());
    for att in &message.attachments {
        let path = unique_path(&dir.join(&att.filename));
        std::fs::write(&path, &att.data).map_err(|e| PecError::io(&path, e))?;
        tracing::debug!(path = %path.display(), size = att.size, "Saved attachment");
        paths.push(path);
    }
    Ok(paths)
}

/// Save the attachments of every message in `result`.
///
/// A message whose attachments cannot be written is logged and skipped.
/// `progress` is called with `(done, total)` messages.
pub fn save_all_attachments(
    result: &ParseResult,
    output_dir: &Path,
    progress: &dyn Fn(usize, usize),
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir).map_err(|e| PecError::io(output_dir, e))?;
    let total = result.messages.len();
    let mut all_paths = Vec::new();

    for (i, message) in result.messages_in_order().enumerate() {
        progress(i, total);
        match save_attachments(message, output_dir) {
            Ok(paths) => all_paths.extend(paths),
            Err(e) => {
                tracing::warn!(
                    email_id = %message.email_id,
                    error = %e,
                    "Failed to save attachments"
                );
            }
        }
    }
    progress(total, total);

    Ok(all_paths)
}

/// If `path` already exists, append `_1`, `_2`, … before the extension.
fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unnamed".to_string());
    let (stem, ext) = split_extension(&name);
    let parent = path.parent().unwrap_or(Path::new("."));

    let mut counter = 1;
    loop {
        let candidate = parent.join(format!("{stem}_{counter}{ext}"));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}
