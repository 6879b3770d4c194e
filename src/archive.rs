//! ZIP archive expansion.
//!
//! Archives bundle any of the other supported formats. Members are walked in
//! stored order, classified once, and returned with their bytes; members that
//! classify as unknown and nested archives (expansion depth is bounded at 1)
//! are skipped with a warning, never a failure.

use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};

use tracing::warn;
use zip::ZipArchive;

use crate::detect::{self, DetectedFormat};
use crate::error::{ConvertError, Result};

/// Ceiling on one decompressed member (guards against zip bombs).
const MAX_MEMBER_SIZE: u64 = 100 * 1024 * 1024;

/// One classified archive member.
#[derive(Debug)]
pub struct ArchiveMember {
    /// Member name with traversal components stripped.
    pub name: String,
    /// Classification of the member bytes.
    pub format: DetectedFormat,
    /// Decompressed member bytes.
    pub data: Vec<u8>,
}

/// Expand an in-memory archive into its classified members, stored order
/// preserved.
pub fn expand(bytes: &[u8]) -> Result<Vec<ArchiveMember>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ConvertError::Archive(format!("cannot open archive: {e}")))?;

    let mut members = Vec::new();

    for i in 0..archive.len() {
        let mut entry = match archive.by_index(i) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(index = i, error = %e, "Unreadable archive entry, skipping");
                continue;
            }
        };

        if entry.is_dir() {
            continue;
        }

        let raw_name = entry.name().to_string();
        let name = match sanitize_member_path(&raw_name) {
            Some(path) => path.to_string_lossy().into_owned(),
            None => {
                warn!(name = %raw_name, "Archive member path is invalid, skipping");
                continue;
            }
        };

        if entry.size() > MAX_MEMBER_SIZE {
            warn!(name = %name, size = entry.size(), "Archive member too large, skipping");
            continue;
        }

        let mut data = Vec::with_capacity(entry.size() as usize);
        if let Err(e) = entry.read_to_end(&mut data) {
            warn!(name = %name, error = %e, "Failed to decompress member, skipping");
            continue;
        }

        let format = detect::detect(Some(Path::new(&name)), &data);
        match format {
            DetectedFormat::Unknown => {
                warn!(name = %name, "Unrecognized archive member, skipping");
            }
            DetectedFormat::Archive => {
                // Depth bound of 1: nested archives are not recursed into
                warn!(name = %name, "Nested archive, not expanding");
            }
            _ => members.push(ArchiveMember { name, format, data }),
        }
    }

    Ok(members)
}

/// Strip traversal components (`..`, `.`, roots, drive prefixes) from a
/// member path. Returns `None` when nothing safe remains.
fn sanitize_member_path(raw: &str) -> Option<PathBuf> {
    let mut sanitized = PathBuf::new();
    for component in Path::new(raw).components() {
        if let Component::Normal(part) = component {
            sanitized.push(part);
        }
    }
    if sanitized.as_os_str().is_empty() {
        None
    } else {
        Some(sanitized)
    }
}
