//! Integration tests for detection, parsing, and the conversion pipeline.

use std::io::Write;
use std::path::Path;

use mailpress::config::Config;
use mailpress::detect::{self, DetectedFormat};
use mailpress::encoding::EncodingResolver;
use mailpress::model::message::ContentKind;
use mailpress::parser::{eml, mbox};
use mailpress::pipeline::{ConversionOptions, ConversionPipeline, Status};

fn fixture(name: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn pipeline() -> ConversionPipeline {
    ConversionPipeline::new(&Config::default())
}

fn options() -> ConversionOptions {
    ConversionOptions::from_config(&Config::default())
}

// ─── Test 1: Fixture message fields ─────────────────────────────────

#[test]
fn test_parse_simple_eml_fields() {
    let bytes = std::fs::read(fixture("simple.eml")).unwrap();
    let outcome = eml::parse_message(&bytes, &EncodingResolver::default());
    let msg = &outcome.message;

    assert_eq!(msg.subject, "Quarterly report");
    assert_eq!(msg.sender.address, "alice@example.com");
    assert_eq!(msg.sender.display_name, "Alice Adams");
    assert_eq!(msg.recipients.len(), 1);
    assert_eq!(msg.recipients[0].address, "bob@example.com");
    assert_eq!(msg.cc.len(), 1);
    assert_eq!(msg.message_id.as_deref(), Some("report-2024q1@example.com"));
    assert_eq!(msg.content_kind, ContentKind::PlainText);
    assert!(msg.body.contains("Revenue is up 12%"));
    assert!(msg.date.is_some());
    assert!(outcome.warnings.is_empty());
}

// ─── Test 2: Store splitting honors quoted separators ───────────────

#[test]
fn test_parse_store_regions() {
    let bytes = std::fs::read(fixture("store.mbox")).unwrap();
    let items = mbox::parse_store(&bytes, &EncodingResolver::default());

    assert_eq!(items.len(), 3);
    assert_eq!(items[0].outcome.message.subject, "First message");
    assert!(items[0]
        .outcome
        .message
        .body
        .contains(">From here on, quoted separator lines"));

    // The middle message ends at the next separator before its blank line
    assert_eq!(items[1].outcome.message.subject, "Truncated message");
    assert!(!items[1].outcome.warnings.is_empty());

    assert_eq!(items[2].outcome.message.subject, "Third message");
}

// ─── Test 3: Detection precedence ───────────────────────────────────

#[test]
fn test_detect_fixture_formats() {
    let eml_bytes = std::fs::read(fixture("simple.eml")).unwrap();
    assert_eq!(
        detect::detect(Some(&fixture("simple.eml")), &eml_bytes),
        DetectedFormat::SingleMessage
    );

    let mbox_bytes = std::fs::read(fixture("store.mbox")).unwrap();
    assert_eq!(
        detect::detect(Some(&fixture("store.mbox")), &mbox_bytes),
        DetectedFormat::MailStore
    );

    // Magic outranks a misleading extension
    let zip_magic = [0x50, 0x4B, 0x03, 0x04, 0, 0];
    assert_eq!(
        detect::detect(Some(Path::new("mislabeled.eml")), &zip_magic),
        DetectedFormat::Archive
    );
}

// ─── Test 4: End-to-end single message conversion ───────────────────

#[test]
fn test_convert_simple_eml() {
    let out = tempfile::tempdir().unwrap();
    let reports = pipeline().convert(&fixture("simple.eml"), out.path(), &options());

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, Status::Success);

    let pdf_path = reports[0].output.as_ref().unwrap();
    let pdf = std::fs::read(pdf_path).unwrap();
    assert!(pdf.starts_with(b"%PDF-"), "output must be a PDF");
    assert!(pdf.len() > 1024, "rendered PDF should not be trivially small");
}

// ─── Test 5: Store conversion yields one report per message ─────────

#[test]
fn test_convert_store_per_message_reports() {
    let out = tempfile::tempdir().unwrap();
    let reports = pipeline().convert(&fixture("store.mbox"), out.path(), &options());

    assert_eq!(reports.len(), 3);
    assert!(reports.iter().all(|r| r.status == Status::Success));

    // The truncated middle message converts with a warning
    assert!(!reports[1].warnings.is_empty());

    // Output names carry the sequence number and stay distinct
    let outputs: Vec<_> = reports
        .iter()
        .map(|r| r.output.as_ref().unwrap().clone())
        .collect();
    assert_eq!(outputs.len(), 3);
    assert!(outputs.windows(2).all(|w| w[0] != w[1]));
    for output in &outputs {
        assert!(std::fs::read(output).unwrap().starts_with(b"%PDF-"));
    }
}

// ─── Test 6: Archive members are expanded and converted ─────────────

#[test]
fn test_convert_zip_archive() {
    let dir = tempfile::tempdir().unwrap();
    let zip_path = dir.path().join("bundle.zip");

    let eml_bytes = std::fs::read(fixture("simple.eml")).unwrap();
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        writer
            .start_file("inner/mail.eml", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(&eml_bytes).unwrap();
        writer
            .start_file("readme.bin", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(&[0u8, 1, 2, 3]).unwrap();
        writer.finish().unwrap();
    }
    std::fs::write(&zip_path, cursor.into_inner()).unwrap();

    let out = tempfile::tempdir().unwrap();
    let reports = pipeline().convert(&zip_path, out.path(), &options());

    // The unknown member is skipped during expansion
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, Status::Success);
    assert!(reports[0].source.contains("mail.eml"));
}

// ─── Test 7: Missing input is an error entry, not a panic ───────────

#[test]
fn test_missing_input_error_entry() {
    let out = tempfile::tempdir().unwrap();
    let reports = pipeline().convert(
        Path::new("/definitely/not/here.eml"),
        out.path(),
        &options(),
    );

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, Status::Error);
    assert!(reports[0].output.is_none());
    assert!(reports[0].error.is_some());
}

// ─── Test 8: Batch conversion covers every input ────────────────────

#[test]
fn test_batch_mixed_results() {
    let out = tempfile::tempdir().unwrap();
    let inputs = vec![
        fixture("simple.eml"),
        std::path::PathBuf::from("/definitely/not/here.eml"),
    ];

    let reports = pipeline().convert_batch(&inputs, out.path(), &options());
    assert_eq!(reports.len(), 2);

    let ok = reports.iter().filter(|r| r.status == Status::Success).count();
    let failed = reports.iter().filter(|r| r.status == Status::Error).count();
    assert_eq!(ok, 1);
    assert_eq!(failed, 1);
}

// ─── Test 9: Validate mode reports identity without converting ──────

#[test]
fn test_validate_store() {
    let report = pipeline().validate(&fixture("store.mbox"));

    assert_eq!(report.format, DetectedFormat::MailStore);
    assert!(report.parseable);
    assert_eq!(report.sha256.len(), 64);
    assert!(report.size > 0);
    // Warnings from the truncated message are surfaced
    assert!(report.errors.iter().any(|e| e.starts_with("message 2:")));
}

// ─── Test 10: Attachment extraction is gated by the option ──────────

#[test]
fn test_attachment_extraction_toggle() {
    let raw = concat!(
        "From: a@b.com\r\n",
        "To: c@d.com\r\n",
        "Subject: With attachment\r\n",
        "MIME-Version: 1.0\r\n",
        "Content-Type: multipart/mixed; boundary=\"XX\"\r\n",
        "\r\n",
        "--XX\r\n",
        "Content-Type: text/plain\r\n",
        "\r\n",
        "See attachment.\r\n",
        "--XX\r\n",
        "Content-Type: application/pdf; name=\"doc.pdf\"\r\n",
        "Content-Disposition: attachment; filename=\"doc.pdf\"\r\n",
        "Content-Transfer-Encoding: base64\r\n",
        "\r\n",
        "JVBERi0xLjQK\r\n",
        "--XX--\r\n"
    );

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("attached.eml");
    std::fs::write(&input, raw).unwrap();

    let out = tempfile::tempdir().unwrap();
    let reports = pipeline().convert(&input, out.path(), &options());
    assert_eq!(reports[0].status, Status::Success);
    assert_eq!(reports[0].attachments.len(), 1);
    let payload = std::fs::read(&reports[0].attachments[0]).unwrap();
    assert!(payload.starts_with(b"%PDF-1.4"));

    let mut no_extract = options();
    no_extract.extract_attachments = false;
    let out2 = tempfile::tempdir().unwrap();
    let reports = pipeline().convert(&input, out2.path(), &no_extract);
    assert_eq!(reports[0].status, Status::Success);
    assert!(reports[0].attachments.is_empty());
}
