//! Document rendering.
//!
//! The pipeline talks to a [`RenderingBackend`] — a narrow capability
//! interface that turns a markup tree into page-oriented binary output. The
//! bundled [`PdfBackend`] lays text out with `lopdf`. [`DocumentRenderer`]
//! wraps any backend with the time budget, the output-size ceiling, and the
//! magic-signature check.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};
use tracing::debug;

use crate::compose::MarkupNode;
use crate::error::{ConvertError, Result};

/// PDF files open with this signature.
pub const PDF_MAGIC: &[u8] = b"%PDF-";

/// Supported page sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageSize {
    A4,
    Letter,
    A3,
}

impl PageSize {
    /// Parse a page-size name, case-insensitive. Unknown names yield `None`
    /// so callers can fall back to the documented default.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "a4" => Some(Self::A4),
            "letter" => Some(Self::Letter),
            "a3" => Some(Self::A3),
            _ => None,
        }
    }

    /// Portrait dimensions in PostScript points.
    pub fn dimensions(self) -> (f32, f32) {
        match self {
            Self::A4 => (595.0, 842.0),
            Self::Letter => (612.0, 792.0),
            Self::A3 => (842.0, 1191.0),
        }
    }
}

/// Page orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl Orientation {
    /// Parse an orientation name, case-insensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "portrait" => Some(Self::Portrait),
            "landscape" => Some(Self::Landscape),
            _ => None,
        }
    }
}

/// Options one rendering call receives.
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub page_size: PageSize,
    pub orientation: Orientation,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            page_size: PageSize::A4,
            orientation: Orientation::Portrait,
        }
    }
}

impl RenderOptions {
    /// Oriented page dimensions in points.
    pub fn page_dimensions(&self) -> (f32, f32) {
        let (w, h) = self.page_size.dimensions();
        match self.orientation {
            Orientation::Portrait => (w, h),
            Orientation::Landscape => (h, w),
        }
    }
}

/// The external capability that paints a markup tree into a binary document.
pub trait RenderingBackend: Send + Sync {
    /// Render one document. Backend failures are `RenderBackend` errors.
    fn render(&self, tree: &MarkupNode, options: &RenderOptions) -> Result<Vec<u8>>;
}

/// Wraps a backend with the pipeline's resource limits.
pub struct DocumentRenderer {
    backend: Arc<dyn RenderingBackend>,
    timeout: Duration,
    max_output_bytes: u64,
}

impl DocumentRenderer {
    /// Create a renderer enforcing the given limits.
    pub fn new(backend: Arc<dyn RenderingBackend>, timeout: Duration, max_output_bytes: u64) -> Self {
        Self {
            backend,
            timeout,
            max_output_bytes,
        }
    }

    /// Render under the time budget and size ceiling, then verify the output
    /// opens with the backend's magic signature.
    ///
    /// A timed-out render leaves its worker thread to finish in the
    /// background; the result is discarded.
    pub fn render(&self, tree: &MarkupNode, options: &RenderOptions) -> Result<Vec<u8>> {
        let (tx, rx) = mpsc::channel();
        let backend = Arc::clone(&self.backend);
        let tree = tree.clone();
        let options = *options;

        std::thread::spawn(move || {
            let result = backend.render(&tree, &options);
            let _ = tx.send(result);
        });

        let bytes = match rx.recv_timeout(self.timeout) {
            Ok(result) => result?,
            Err(_) => {
                return Err(ConvertError::RenderTimeout {
                    secs: self.timeout.as_secs(),
                })
            }
        };

        if bytes.len() as u64 > self.max_output_bytes {
            return Err(ConvertError::RenderOutputTooLarge {
                size: bytes.len() as u64,
                limit: self.max_output_bytes,
            });
        }

        if !bytes.starts_with(PDF_MAGIC) {
            return Err(ConvertError::RenderBackend(
                "output does not begin with the PDF signature".to_string(),
            ));
        }

        debug!(size = bytes.len(), "Rendered document");
        Ok(bytes)
    }
}

/// Text-layout PDF backend built on `lopdf`.
///
/// Flattens the markup tree to lines, wraps them to the page width, and
/// paginates with a Helvetica base font. Rich inline formatting is
/// intentionally not reproduced.
#[derive(Debug, Default)]
pub struct PdfBackend;

const FONT_SIZE: f32 = 11.0;
const LEADING: f32 = 14.0;
const MARGIN: f32 = 50.0;
const FOOTER_SIZE: f32 = 9.0;
/// Average Helvetica glyph advance at 1pt, used for wrap estimation.
const AVG_GLYPH_WIDTH: f32 = 0.55;

/// Helvetica advance widths (1000-unit glyph space) for the WinAnsi range
/// 32..=126, from the Adobe base-14 AFM metrics. Viewers substitute the
/// base font, so the widths must match for selection and reflow to line up.
const HELVETICA_WIDTHS: [i64; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, //
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, //
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, //
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, //
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, //
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

impl RenderingBackend for PdfBackend {
    fn render(&self, tree: &MarkupNode, options: &RenderOptions) -> Result<Vec<u8>> {
        let (page_w, page_h) = options.page_dimensions();
        let wrap_cols = (((page_w - 2.0 * MARGIN) / (FONT_SIZE * AVG_GLYPH_WIDTH)) as usize).max(20);
        let lines_per_page = (((page_h - 2.0 * MARGIN) / LEADING) as usize).max(1);

        let mut lines: Vec<String> = Vec::new();
        for line in tree.to_text_lines() {
            wrap_line(&line, wrap_cols, &mut lines);
        }
        if lines.is_empty() {
            lines.push(String::new());
        }

        build_pdf(&lines, page_w, page_h, lines_per_page)
    }
}

/// Greedy word wrap; overlong words are hard-split.
fn wrap_line(line: &str, cols: usize, out: &mut Vec<String>) {
    if line.chars().count() <= cols {
        out.push(line.to_string());
        return;
    }

    let mut current = String::new();
    for word in line.split_whitespace() {
        let word_len = word.chars().count();
        let current_len = current.chars().count();

        if current_len > 0 && current_len + 1 + word_len > cols {
            out.push(std::mem::take(&mut current));
        }
        if word_len > cols {
            // Hard-split a word longer than the line
            let mut chunk = String::new();
            for ch in word.chars() {
                chunk.push(ch);
                if chunk.chars().count() == cols {
                    out.push(std::mem::take(&mut chunk));
                }
            }
            current = chunk;
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
}

/// Assemble the PDF object tree for the wrapped lines.
fn build_pdf(lines: &[String], page_w: f32, page_h: f32, lines_per_page: usize) -> Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
        "FirstChar" => 32,
        "LastChar" => 126,
        "Widths" => HELVETICA_WIDTHS.iter().map(|&w| w.into()).collect::<Vec<Object>>(),
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let chunks: Vec<&[String]> = lines.chunks(lines_per_page).collect();
    let total_pages = chunks.len();

    let mut kids: Vec<Object> = Vec::new();
    for (page_no, chunk) in chunks.into_iter().enumerate() {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), FONT_SIZE.into()]),
            Operation::new("TL", vec![LEADING.into()]),
            Operation::new(
                "Td",
                vec![MARGIN.into(), (page_h - MARGIN - FONT_SIZE).into()],
            ),
        ];
        for line in chunk {
            operations.push(Operation::new(
                "Tj",
                vec![Object::String(encode_winansi(line), StringFormat::Literal)],
            ));
            operations.push(Operation::new("T*", vec![]));
        }
        operations.push(Operation::new("ET", vec![]));

        // Page footer below the text area
        let footer = format!("Page {} of {}", page_no + 1, total_pages);
        operations.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), FOOTER_SIZE.into()]),
            Operation::new("Td", vec![MARGIN.into(), (MARGIN / 2.0).into()]),
            Operation::new(
                "Tj",
                vec![Object::String(encode_winansi(&footer), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
        ]);

        let content = Content { operations };
        let encoded = content
            .encode()
            .map_err(|e| ConvertError::RenderBackend(format!("content encode: {e}")))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), page_w.into(), page_h.into()],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let info_id = doc.add_object(dictionary! {
        "Producer" => Object::string_literal("mailpress"),
        "Creator" => Object::string_literal("mailpress"),
    });
    doc.trailer.set("Info", info_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf)
        .map_err(|e| ConvertError::RenderBackend(format!("PDF serialization: {e}")))?;
    Ok(buf)
}

/// Encode text for WinAnsi literal strings; unmappable characters degrade
/// to `?`.
fn encode_winansi(text: &str) -> Vec<u8> {
    text.chars().map(winansi_byte).collect()
}

/// Map one scalar to its WinAnsi code point.
///
/// WinAnsi is CP1252: Latin-1 except that 0x80..0x9F holds printable glyphs
/// (euro sign, curly quotes, dashes...) whose Unicode values are far from the
/// byte range. The Unicode C1 controls U+0080..U+009F have no glyph at all.
fn winansi_byte(c: char) -> u8 {
    match c {
        '\u{20AC}' => 0x80, // €
        '\u{201A}' => 0x82,
        '\u{0192}' => 0x83,
        '\u{201E}' => 0x84,
        '\u{2026}' => 0x85, // …
        '\u{2020}' => 0x86,
        '\u{2021}' => 0x87,
        '\u{02C6}' => 0x88,
        '\u{2030}' => 0x89,
        '\u{0160}' => 0x8A,
        '\u{2039}' => 0x8B,
        '\u{0152}' => 0x8C,
        '\u{017D}' => 0x8E,
        '\u{2018}' => 0x91, // '
        '\u{2019}' => 0x92, // '
        '\u{201C}' => 0x93, // "
        '\u{201D}' => 0x94, // "
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96, // –
        '\u{2014}' => 0x97, // —
        '\u{02DC}' => 0x98,
        '\u{2122}' => 0x99, // ™
        '\u{0161}' => 0x9A,
        '\u{203A}' => 0x9B,
        '\u{0153}' => 0x9C,
        '\u{017E}' => 0x9E,
        '\u{0178}' => 0x9F,
        '\u{0080}'..='\u{009F}' => b'?', // C1 controls, no glyph
        c if (c as u32) <= 0xFF => c as u8,
        _ => b'?',
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::{compose, ComposeStyle};
    use crate::model::message::CanonicalMessage;

    fn sample_tree() -> MarkupNode {
        let mut msg = CanonicalMessage::empty();
        msg.subject = "Render test".to_string();
        msg.body = "Hello world\n".repeat(5);
        compose(&msg, &ComposeStyle::default())
    }

    #[test]
    fn test_pdf_backend_produces_signature() {
        let backend = PdfBackend;
        let bytes = backend
            .render(&sample_tree(), &RenderOptions::default())
            .unwrap();
        assert!(bytes.starts_with(PDF_MAGIC));
        assert!(bytes.len() > 1024, "PDF should not be trivially small");

        // Metadata and font metrics are always emitted
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("/Producer"));
        assert!(text.contains("/Widths"));
    }

    #[test]
    fn test_renderer_enforces_size_ceiling() {
        let renderer = DocumentRenderer::new(
            Arc::new(PdfBackend),
            Duration::from_secs(30),
            64, // unrealistically small ceiling
        );
        let result = renderer.render(&sample_tree(), &RenderOptions::default());
        assert!(matches!(
            result,
            Err(ConvertError::RenderOutputTooLarge { .. })
        ));
    }

    #[test]
    fn test_renderer_timeout() {
        struct SlowBackend;
        impl RenderingBackend for SlowBackend {
            fn render(&self, _: &MarkupNode, _: &RenderOptions) -> Result<Vec<u8>> {
                std::thread::sleep(Duration::from_secs(5));
                Ok(Vec::new())
            }
        }

        let renderer = DocumentRenderer::new(
            Arc::new(SlowBackend),
            Duration::from_millis(50),
            u64::MAX,
        );
        let result = renderer.render(&sample_tree(), &RenderOptions::default());
        assert!(matches!(result, Err(ConvertError::RenderTimeout { .. })));
    }

    #[test]
    fn test_renderer_rejects_wrong_magic() {
        struct BogusBackend;
        impl RenderingBackend for BogusBackend {
            fn render(&self, _: &MarkupNode, _: &RenderOptions) -> Result<Vec<u8>> {
                Ok(b"GIF89a".to_vec())
            }
        }

        let renderer =
            DocumentRenderer::new(Arc::new(BogusBackend), Duration::from_secs(1), u64::MAX);
        let result = renderer.render(&sample_tree(), &RenderOptions::default());
        assert!(matches!(result, Err(ConvertError::RenderBackend(_))));
    }

    #[test]
    fn test_landscape_swaps_dimensions() {
        let opts = RenderOptions {
            page_size: PageSize::A4,
            orientation: Orientation::Landscape,
        };
        assert_eq!(opts.page_dimensions(), (842.0, 595.0));
    }

    #[test]
    fn test_wrap_line() {
        let mut out = Vec::new();
        wrap_line("aaa bbb ccc ddd", 7, &mut out);
        assert_eq!(out, vec!["aaa bbb", "ccc ddd"]);

        let mut out = Vec::new();
        wrap_line("supercalifragilistic", 5, &mut out);
        assert_eq!(out[0], "super");
    }

    #[test]
    fn test_multi_page_output() {
        let mut msg = CanonicalMessage::empty();
        msg.subject = "Long".to_string();
        msg.body = "line of body text\n".repeat(200);
        let tree = compose(&msg, &ComposeStyle::default());
        let bytes = PdfBackend.render(&tree, &RenderOptions::default()).unwrap();
        assert!(bytes.starts_with(PDF_MAGIC));
        // 200 lines at ~52 lines per A4 page must span several pages
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("/Count"));
        assert!(text.contains("Page 1 of"));
    }

    #[test]
    fn test_winansi_mapping() {
        // CP1252 high range uses remapped code points, not Unicode values
        assert_eq!(winansi_byte('–'), 0x96);
        assert_eq!(winansi_byte('€'), 0x80);
        assert_eq!(winansi_byte('\u{2019}'), 0x92);
        // Latin-1 bytes pass through
        assert_eq!(winansi_byte('é'), 0xE9);
        assert_eq!(winansi_byte('A'), b'A');
        // C1 controls and anything past Latin-1 degrade
        assert_eq!(winansi_byte('\u{0085}'), b'?');
        assert_eq!(winansi_byte('語'), b'?');
    }
}
