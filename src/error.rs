//! Centralized error types for mailpress.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailpress library.
///
/// Failures local to one message, one attachment, or one archive member are
/// captured into per-item reports by the pipeline; only the variants touching
/// input readability are ever fatal to a whole invocation.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified input file does not exist.
    #[error("Input file not found: {0}")]
    FileNotFound(PathBuf),

    /// No detection heuristic matched the input.
    #[error("Unrecognized input format: {0}")]
    UnrecognizedFormat(PathBuf),

    /// The container structure could not be parsed; a partial result may
    /// still have been produced.
    #[error("Structural parse failure: {0}")]
    StructuralParse(String),

    /// The compound (OLE/CFB) mail item could not be read.
    #[error("Compound item error: {0}")]
    CompoundItem(String),

    /// An archive could not be opened or walked.
    #[error("Archive error: {0}")]
    Archive(String),

    /// A single attachment failed to materialize.
    #[error("Attachment extraction failed for '{name}': {reason}")]
    AttachmentExtraction { name: String, reason: String },

    /// The rendering backend exceeded its time budget.
    #[error("Rendering timed out after {secs}s")]
    RenderTimeout { secs: u64 },

    /// The rendered document exceeded the output-size ceiling.
    #[error("Rendered document is {size} bytes, exceeding the {limit} byte limit")]
    RenderOutputTooLarge { size: u64, limit: u64 },

    /// The rendering backend reported a failure.
    #[error("Rendering backend error: {0}")]
    RenderBackend(String),
}

/// Convenience alias for `Result<T, ConvertError>`.
pub type Result<T> = std::result::Result<T, ConvertError>;

impl ConvertError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Allow `?` on `std::io::Error` inside functions returning `ConvertError`
/// when no path context is available (rare — prefer `ConvertError::io`).
impl From<std::io::Error> for ConvertError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
