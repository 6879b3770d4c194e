//! Conversion orchestration.
//!
//! One dispatch point selects the handler for the detected format:
//! detect → (expand if archive) → parse → compose → render → write. Every
//! message or archive member yields exactly one [`ConversionReport`];
//! per-item failures are captured as error reports and never propagate
//! across item boundaries. Batch runs fan out over a bounded rayon pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::archive;
use crate::compose::{self, ComposeStyle};
use crate::config::Config;
use crate::detect::{self, DetectedFormat};
use crate::encoding::EncodingResolver;
use crate::error::ConvertError;
use crate::extract;
use crate::model::message::CanonicalMessage;
use crate::parser::msg::{CompoundItemReader, OutlookReader};
use crate::parser::{eml, mbox};
use crate::render::{DocumentRenderer, Orientation, PageSize, PdfBackend, RenderOptions, RenderingBackend};

/// Options for one conversion call. Immutable once built.
#[derive(Debug, Clone, Copy)]
pub struct ConversionOptions {
    pub extract_attachments: bool,
    pub page_size: PageSize,
    pub orientation: Orientation,
}

impl ConversionOptions {
    /// Build options from configuration defaults.
    pub fn from_config(config: &Config) -> Self {
        Self {
            extract_attachments: config.conversion.extract_attachments,
            page_size: config.conversion.page_size(),
            orientation: config.conversion.orientation(),
        }
    }

    fn render_options(&self) -> RenderOptions {
        RenderOptions {
            page_size: self.page_size,
            orientation: self.orientation,
        }
    }
}

/// Outcome status of one conversion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    Error,
}

/// One result entry per converted message or archive member.
#[derive(Debug, serde::Serialize)]
pub struct ConversionReport {
    /// Source identifier (file name, possibly with a member or sequence part).
    pub source: String,
    pub status: Status,
    /// Path of the written document on success.
    pub output: Option<PathBuf>,
    /// Paths of extracted attachments, when extraction is enabled.
    pub attachments: Vec<PathBuf>,
    /// Human-readable reason on error.
    pub error: Option<String>,
    /// Non-fatal issues encountered along the way.
    pub warnings: Vec<String>,
}

impl ConversionReport {
    fn failure(source: impl Into<String>, error: impl ToString) -> Self {
        Self {
            source: source.into(),
            status: Status::Error,
            output: None,
            attachments: Vec::new(),
            error: Some(error.to_string()),
            warnings: Vec::new(),
        }
    }
}

/// Validate-only result: identity and parseability without rendering.
#[derive(Debug, serde::Serialize)]
pub struct ValidationReport {
    pub file: PathBuf,
    pub format: DetectedFormat,
    pub size: u64,
    pub sha256: String,
    pub parseable: bool,
    pub errors: Vec<String>,
}

/// Orchestrates detection, parsing, composition, and rendering.
pub struct ConversionPipeline {
    resolver: EncodingResolver,
    compound: Box<dyn CompoundItemReader>,
    renderer: DocumentRenderer,
    style: ComposeStyle,
    workers: usize,
}

impl ConversionPipeline {
    /// Build a pipeline with the bundled PDF backend and Outlook reader.
    pub fn new(config: &Config) -> Self {
        Self::with_collaborators(config, Arc::new(PdfBackend), Box::new(OutlookReader))
    }

    /// Build a pipeline with explicit collaborators (used in tests and by
    /// embedders with their own engines).
    pub fn with_collaborators(
        config: &Config,
        backend: Arc<dyn RenderingBackend>,
        compound: Box<dyn CompoundItemReader>,
    ) -> Self {
        Self {
            resolver: EncodingResolver::new(config.encoding.detector_confidence_threshold),
            compound,
            renderer: DocumentRenderer::new(
                backend,
                Duration::from_secs(config.render.timeout_secs),
                config.render.max_output_bytes,
            ),
            style: ComposeStyle {
                max_body_chars: config.conversion.max_body_chars,
            },
            workers: config.batch.workers.max(1),
        }
    }

    /// Convert one input file. Returns one report per contained message;
    /// a missing or unreadable input yields a single error report, never an
    /// error to the caller.
    pub fn convert(
        &self,
        input: &Path,
        out_dir: &Path,
        options: &ConversionOptions,
    ) -> Vec<ConversionReport> {
        let source = input.display().to_string();

        let bytes = match std::fs::read(input) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return vec![ConversionReport::failure(
                    source,
                    ConvertError::FileNotFound(input.to_path_buf()),
                )];
            }
            Err(e) => {
                return vec![ConversionReport::failure(source, ConvertError::io(input, e))];
            }
        };

        let base = extract::sanitize_filename_part(
            input
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("input"),
            80,
        );

        let format = detect::detect(Some(input), &bytes);
        self.convert_bytes(&source, &base, format, &bytes, out_dir, options)
    }

    /// Convert already-classified bytes. The single dispatch point over
    /// [`DetectedFormat`]: classification happens once per item, at the file
    /// boundary or during archive expansion, and is never re-derived here.
    fn convert_bytes(
        &self,
        source: &str,
        base: &str,
        format: DetectedFormat,
        bytes: &[u8],
        out_dir: &Path,
        options: &ConversionOptions,
    ) -> Vec<ConversionReport> {
        info!(source, %format, size = bytes.len(), "Converting input");

        match format {
            DetectedFormat::SingleMessage => {
                let outcome = eml::parse_message(bytes, &self.resolver);
                vec![self.render_one(
                    source.to_string(),
                    base.to_string(),
                    &outcome.message,
                    outcome.warnings,
                    out_dir,
                    options,
                )]
            }
            DetectedFormat::MailStore => {
                let items = mbox::parse_store(bytes, &self.resolver);
                if items.is_empty() {
                    return vec![ConversionReport::failure(
                        source,
                        ConvertError::StructuralParse("store contains no messages".to_string()),
                    )];
                }
                items
                    .into_iter()
                    .map(|item| {
                        let ident = extract::sanitize_filename_part(
                            item.outcome.message.identifier(),
                            60,
                        );
                        let item_base = format!("{base}_{:03}_{ident}", item.index + 1);
                        self.render_one(
                            format!("{source}#{}", item.index + 1),
                            item_base,
                            &item.outcome.message,
                            item.outcome.warnings,
                            out_dir,
                            options,
                        )
                    })
                    .collect()
            }
            DetectedFormat::CompoundItem => match self.compound.read(bytes) {
                Ok(message) => vec![self.render_one(
                    source.to_string(),
                    base.to_string(),
                    &message,
                    Vec::new(),
                    out_dir,
                    options,
                )],
                Err(e) => vec![ConversionReport::failure(source, e)],
            },
            DetectedFormat::Archive => match archive::expand(bytes) {
                Ok(members) => {
                    if members.is_empty() {
                        return vec![ConversionReport::failure(
                            source,
                            ConvertError::Archive("no convertible members".to_string()),
                        )];
                    }
                    members
                        .iter()
                        .flat_map(|member| {
                            let member_base = extract::sanitize_filename_part(
                                Path::new(&member.name)
                                    .file_stem()
                                    .and_then(|s| s.to_str())
                                    .unwrap_or("member"),
                                80,
                            );
                            // The expander classified each member already
                            self.convert_bytes(
                                &format!("{source}!{}", member.name),
                                &format!("{base}_{member_base}"),
                                member.format,
                                &member.data,
                                out_dir,
                                options,
                            )
                        })
                        .collect()
                }
                Err(e) => vec![ConversionReport::failure(source, e)],
            },
            DetectedFormat::Unknown => vec![ConversionReport::failure(
                source,
                ConvertError::UnrecognizedFormat(PathBuf::from(source)),
            )],
        }
    }

    /// Compose, render, and write one message; extract its attachments when
    /// enabled. All failures end up in the report.
    fn render_one(
        &self,
        source: String,
        base: String,
        message: &CanonicalMessage,
        mut warnings: Vec<String>,
        out_dir: &Path,
        options: &ConversionOptions,
    ) -> ConversionReport {
        if let Err(e) = std::fs::create_dir_all(out_dir) {
            return ConversionReport::failure(source, ConvertError::io(out_dir, e));
        }

        let tree = compose::compose(message, &self.style);
        let bytes = match self.renderer.render(&tree, &options.render_options()) {
            Ok(bytes) => bytes,
            Err(e) => {
                let mut report = ConversionReport::failure(source, e);
                report.warnings = warnings;
                return report;
            }
        };

        let output = extract::unique_path(&out_dir.join(format!("{base}.pdf")));
        if let Err(e) = std::fs::write(&output, &bytes) {
            return ConversionReport::failure(source, ConvertError::io(&output, e));
        }

        let mut attachment_paths = Vec::new();
        if options.extract_attachments && message.has_attachments() {
            let dest = out_dir.join(format!("{base}_attachments"));
            let (paths, extraction_warnings) =
                extract::materialize_all(&message.attachments, &dest);
            attachment_paths = paths;
            warnings.extend(extraction_warnings);
        }

        ConversionReport {
            source,
            status: Status::Success,
            output: Some(output),
            attachments: attachment_paths,
            error: None,
            warnings,
        }
    }

    /// Convert a batch of inputs in parallel. One input's failure never
    /// aborts its siblings; report order is not guaranteed to match input
    /// order.
    pub fn convert_batch(
        &self,
        inputs: &[PathBuf],
        out_dir: &Path,
        options: &ConversionOptions,
    ) -> Vec<ConversionReport> {
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                warn!(error = %e, "Could not build worker pool, converting sequentially");
                return inputs
                    .iter()
                    .flat_map(|input| self.convert(input, out_dir, options))
                    .collect();
            }
        };

        pool.install(|| {
            inputs
                .par_iter()
                .flat_map_iter(|input| self.convert(input, out_dir, options))
                .collect()
        })
    }

    /// Validate-only mode: detection + parsing, no composition or rendering.
    pub fn validate(&self, input: &Path) -> ValidationReport {
        let bytes = match std::fs::read(input) {
            Ok(bytes) => bytes,
            Err(e) => {
                return ValidationReport {
                    file: input.to_path_buf(),
                    format: DetectedFormat::Unknown,
                    size: 0,
                    sha256: String::new(),
                    parseable: false,
                    errors: vec![e.to_string()],
                };
            }
        };

        let sha256 = hex::encode(Sha256::digest(&bytes));
        let format = detect::detect(Some(input), &bytes);
        let mut errors = Vec::new();

        let parseable = match format {
            DetectedFormat::SingleMessage => {
                let outcome = eml::parse_message(&bytes, &self.resolver);
                errors.extend(outcome.warnings);
                errors.extend(sender_issue(&outcome.message));
                true
            }
            DetectedFormat::MailStore => {
                let items = mbox::parse_store(&bytes, &self.resolver);
                for item in &items {
                    for warning in item
                        .outcome
                        .warnings
                        .iter()
                        .cloned()
                        .chain(sender_issue(&item.outcome.message))
                    {
                        errors.push(format!("message {}: {warning}", item.index + 1));
                    }
                }
                !items.is_empty()
            }
            DetectedFormat::CompoundItem => match self.compound.read(&bytes) {
                Ok(_) => true,
                Err(e) => {
                    errors.push(e.to_string());
                    false
                }
            },
            DetectedFormat::Archive => match archive::expand(&bytes) {
                Ok(members) => !members.is_empty(),
                Err(e) => {
                    errors.push(e.to_string());
                    false
                }
            },
            DetectedFormat::Unknown => {
                errors.push("unrecognized format".to_string());
                false
            }
        };

        ValidationReport {
            file: input.to_path_buf(),
            format,
            size: bytes.len() as u64,
            sha256,
            parseable,
            errors,
        }
    }
}

/// Validation note for a sender that is present but does not have the
/// `local@domain.tld` shape.
fn sender_issue(message: &CanonicalMessage) -> Option<String> {
    if !message.sender.is_empty() && !message.sender.is_valid() {
        Some(format!(
            "sender '{}' does not look like an email address",
            message.sender.address
        ))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    const EML: &[u8] = b"From: a@b.com\nTo: c@d.com\nSubject: Test\n\nHello world\n";

    fn pipeline() -> ConversionPipeline {
        ConversionPipeline::new(&Config::default())
    }

    fn options() -> ConversionOptions {
        ConversionOptions::from_config(&Config::default())
    }

    #[test]
    fn test_convert_missing_file_returns_error_report() {
        let out = tempfile::tempdir().unwrap();
        let reports = pipeline().convert(
            Path::new("/no/such/file.eml"),
            out.path(),
            &options(),
        );
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].status, Status::Error);
        assert!(reports[0].error.as_deref().unwrap().contains("not found"));
    }

    #[test]
    fn test_convert_single_message() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("mail.eml");
        std::fs::write(&input, EML).unwrap();

        let out = tempfile::tempdir().unwrap();
        let reports = pipeline().convert(&input, out.path(), &options());
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].status, Status::Success);

        let pdf = std::fs::read(reports[0].output.as_ref().unwrap()).unwrap();
        assert!(pdf.starts_with(b"%PDF-"));
    }

    #[test]
    fn test_unknown_format_reported() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("blob.bin");
        std::fs::write(&input, [0u8, 1, 2, 3]).unwrap();

        let out = tempfile::tempdir().unwrap();
        let reports = pipeline().convert(&input, out.path(), &options());
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].status, Status::Error);
    }

    #[test]
    fn test_validate_single_message() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("mail.eml");
        std::fs::write(&input, EML).unwrap();

        let report = pipeline().validate(&input);
        assert_eq!(report.format, DetectedFormat::SingleMessage);
        assert!(report.parseable);
        assert_eq!(report.size, EML.len() as u64);
        assert_eq!(report.sha256.len(), 64);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_validate_missing_file() {
        let report = pipeline().validate(Path::new("/no/such/file.eml"));
        assert!(!report.parseable);
        assert!(!report.errors.is_empty());
    }

    #[test]
    fn test_validate_flags_malformed_sender() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("mail.eml");
        std::fs::write(
            &input,
            b"From: undisclosed recipients\nSubject: Hi\n\nBody\n",
        )
        .unwrap();

        let report = pipeline().validate(&input);
        assert!(report.parseable);
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("does not look like an email address")));
    }

    #[test]
    fn test_archive_member_uses_expander_classification() {
        // A store member without an envelope line on its first message is
        // classified by the expander from the .mbox extension; the dispatch
        // must honor that instead of sniffing the bytes again.
        let mbox = b"From: first@example.com\nSubject: One\n\nbody one\n\
                     \nFrom two@example.com Thu Jan 04 10:00:00 2024\n\
                     From: second@example.com\nSubject: Two\n\nbody two\n";
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            writer
                .start_file("export.mbox", zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(mbox).unwrap();
            writer.finish().unwrap();
        }

        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("bundle.zip");
        std::fs::write(&input, cursor.into_inner()).unwrap();

        let out = tempfile::tempdir().unwrap();
        let reports = pipeline().convert(&input, out.path(), &options());
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.status == Status::Success));
        assert!(reports[0].source.ends_with("export.mbox#1"));
        assert!(reports[1].source.ends_with("export.mbox#2"));
    }
}
