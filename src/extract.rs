//! Attachment materialization.
//!
//! Writes attachment payloads to a destination directory with sanitized,
//! collision-safe names. Extraction failures are per-attachment and never
//! abort the surrounding conversion.

use std::path::{Path, PathBuf};

use crate::error::{ConvertError, Result};
use crate::model::message::Attachment;

/// Write one attachment into `dest_dir`, returning the path used.
///
/// Names are sanitized and mechanically disambiguated with a numeric suffix
/// so a prior attachment from the same run is never overwritten.
pub fn materialize(attachment: &Attachment, dest_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dest_dir).map_err(|e| ConvertError::AttachmentExtraction {
        name: attachment.name.clone(),
        reason: format!("cannot create destination: {e}"),
    })?;

    let filename = sanitize_filename_part(&attachment.name, 150);
    let path = unique_path(&dest_dir.join(filename));

    std::fs::write(&path, &attachment.data).map_err(|e| ConvertError::AttachmentExtraction {
        name: attachment.name.clone(),
        reason: e.to_string(),
    })?;
    Ok(path)
}

/// Write all of a message's attachments, skipping individual failures.
///
/// Returns the written paths and one warning string per failed attachment.
pub fn materialize_all(
    attachments: &[Attachment],
    dest_dir: &Path,
) -> (Vec<PathBuf>, Vec<String>) {
    let mut paths = Vec::new();
    let mut warnings = Vec::new();

    for att in attachments {
        match materialize(att, dest_dir) {
            Ok(path) => paths.push(path),
            Err(e) => {
                tracing::warn!(name = %att.name, error = %e, "Failed to extract attachment");
                warnings.push(e.to_string());
            }
        }
    }

    (paths, warnings)
}

/// Sanitize a string for use in filenames.
///
/// Replaces invalid characters with `_` and truncates to `max_len`.
pub fn sanitize_filename_part(s: &str, max_len: usize) -> String {
    let sanitized: String = s
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '.' || c == '_' || c == '@' {
                c
            } else {
                '_'
            }
        })
        .take(max_len)
        .collect();

    if sanitized.is_empty() {
        "unknown".to_string()
    } else {
        sanitized
    }
}

/// If `path` already exists, append a counter to make it unique.
pub fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let parent = path.parent().unwrap_or(Path::new("."));

    for i in 1..1000 {
        let candidate = if ext.is_empty() {
            parent.join(format!("{stem}_{i}"))
        } else {
            parent.join(format!("{stem}_{i}.{ext}"))
        };
        if !candidate.exists() {
            return candidate;
        }
    }

    // Fallback — very unlikely
    parent.join(format!("{stem}_dup.{ext}"))
}
