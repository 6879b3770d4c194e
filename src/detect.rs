//! Input format detection.
//!
//! Classification runs once per input and is never re-derived mid-pipeline.
//! Precedence: magic bytes outrank the file extension, which outranks
//! structural sniffing. When nothing matches, the result is
//! [`DetectedFormat::Unknown`] — a terminal, reportable condition, not an
//! error to retry.

use std::path::Path;

/// ZIP local file header: PK\x03\x04
const ZIP_MAGIC: &[u8] = &[0x50, 0x4B, 0x03, 0x04];
/// ZIP end-of-central-directory (empty archive): PK\x05\x06
const ZIP_EMPTY_MAGIC: &[u8] = &[0x50, 0x4B, 0x05, 0x06];
/// OLE/CFB compound file header (Outlook .msg containers).
const CFB_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// The classification of one input blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectedFormat {
    /// A bare RFC 5322 message (`.eml`).
    SingleMessage,
    /// An OLE/CFB compound mail item (Outlook `.msg`).
    CompoundItem,
    /// A concatenated mailbox store (`.mbox`).
    MailStore,
    /// A ZIP archive bundling any of the above.
    Archive,
    /// No heuristic matched.
    Unknown,
}

impl std::fmt::Display for DetectedFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::SingleMessage => "single-message",
            Self::CompoundItem => "compound-item",
            Self::MailStore => "mail-store",
            Self::Archive => "archive",
            Self::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

/// Classify an input from its leading bytes and (optionally) its path.
pub fn detect(path: Option<&Path>, bytes: &[u8]) -> DetectedFormat {
    // 1. Magic bytes
    if bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(ZIP_EMPTY_MAGIC) {
        return DetectedFormat::Archive;
    }
    if bytes.starts_with(CFB_MAGIC) {
        return DetectedFormat::CompoundItem;
    }

    // 2. File extension
    if let Some(fmt) = path.and_then(detect_by_extension) {
        return fmt;
    }

    // 3. Structural sniffing
    detect_by_structure(bytes)
}

/// Extension heuristic. `.msg` is intentionally absent: a real compound item
/// always carries the CFB magic, and an extension alone is too weak for a
/// binary container.
fn detect_by_extension(path: &Path) -> Option<DetectedFormat> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "eml" => Some(DetectedFormat::SingleMessage),
        "mbox" | "mbx" => Some(DetectedFormat::MailStore),
        "zip" => Some(DetectedFormat::Archive),
        _ => None,
    }
}

/// Structural sniffing over the leading window of the input.
fn detect_by_structure(bytes: &[u8]) -> DetectedFormat {
    // Skip a UTF-8 BOM so the envelope check still fires
    let bytes = if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        &bytes[3..]
    } else {
        bytes
    };

    // An mbox store opens with a "From " envelope separator line
    if bytes.starts_with(b"From ") {
        return DetectedFormat::MailStore;
    }

    if has_header_block(bytes) {
        return DetectedFormat::SingleMessage;
    }

    DetectedFormat::Unknown
}

/// Whether the leading lines look like an RFC 5322 header block: at least one
/// `Name: value` line with a plausible field name before any blank line.
fn has_header_block(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(8 * 1024)];
    let text = String::from_utf8_lossy(window);

    let mut saw_header = false;
    for line in text.lines().take(50) {
        if line.trim().is_empty() {
            break;
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            continue; // folded continuation
        }
        match line.find(':') {
            Some(pos) if pos > 0 && is_field_name(&line[..pos]) => saw_header = true,
            _ => return false, // non-header line before the blank separator
        }
    }
    saw_header
}

/// RFC 5322 field names are printable ASCII excluding colon and space.
fn is_field_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| (0x21..=0x7E).contains(&b) && b != b':')
}
