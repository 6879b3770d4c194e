//! Character-encoding resolution.
//!
//! Every byte region that reaches a parser goes through [`EncodingResolver`]
//! exactly once. Resolution is total: the final replacement-character pass
//! cannot fail, so callers can always treat the result as text.
//!
//! Resolution order:
//! 1. BOM (most reliable)
//! 2. Declared encoding (MIME charset parameter), if it decodes cleanly
//! 3. chardetng statistical detection, gated by a confidence threshold
//! 4. Fixed fallback chain: strict UTF-8 → UTF-16 (NUL-pattern heuristic) →
//!    Windows-1252/ISO-8859-1 → UTF-8 with replacement characters

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, WINDOWS_1252};
use tracing::{debug, warn};

/// UTF-8 BOM: EF BB BF
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
/// UTF-16 LE BOM: FF FE
const UTF16_LE_BOM: &[u8] = &[0xFF, 0xFE];
/// UTF-16 BE BOM: FE FF
const UTF16_BE_BOM: &[u8] = &[0xFE, 0xFF];

/// Decodes arbitrary byte regions to text with a deterministic fallback chain.
#[derive(Debug, Clone)]
pub struct EncodingResolver {
    /// Minimum confidence for accepting the statistical detector's guess.
    /// chardetng reports a binary confident/unsure verdict: a threshold in
    /// `(0.0, 1.0]` accepts only confident guesses, `0.0` accepts any guess,
    /// and values above `1.0` skip the detector.
    confidence_threshold: f64,
}

impl Default for EncodingResolver {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
        }
    }
}

impl EncodingResolver {
    /// Create a resolver with the given detector confidence threshold.
    pub fn new(confidence_threshold: f64) -> Self {
        Self {
            confidence_threshold,
        }
    }

    /// Decode `bytes` to text. Never fails.
    ///
    /// `declared` is an optional charset label from the container (e.g. a
    /// MIME `charset=` parameter); it wins when it decodes without errors.
    pub fn resolve(&self, bytes: &[u8], declared: Option<&str>) -> String {
        if bytes.is_empty() {
            return String::new();
        }

        // 1. BOM wins outright.
        if bytes.starts_with(UTF8_BOM) {
            return String::from_utf8_lossy(&bytes[3..]).into_owned();
        }
        if bytes.starts_with(UTF16_LE_BOM) {
            let (decoded, _, _) = UTF_16LE.decode(bytes);
            return decoded.into_owned();
        }
        if bytes.starts_with(UTF16_BE_BOM) {
            let (decoded, _, _) = UTF_16BE.decode(bytes);
            return decoded.into_owned();
        }

        // 2. Declared encoding, if it decodes cleanly.
        if let Some(label) = declared {
            if let Some(encoding) = Encoding::for_label(label.as_bytes()) {
                let (decoded, had_errors) = decode_with(encoding, bytes);
                if !had_errors {
                    return decoded;
                }
                debug!(charset = label, "Declared encoding had errors, falling back");
            } else {
                debug!(charset = label, "Unknown declared encoding label");
            }
        }

        // 3. Statistical detection, gated by the confidence threshold.
        if self.confidence_threshold <= 1.0 {
            let mut detector = EncodingDetector::new();
            detector.feed(bytes, true);
            let (guess, confident) = detector.guess_assess(None, true);
            if confident || self.confidence_threshold <= 0.0 {
                let (decoded, had_errors) = decode_with(guess, bytes);
                if !had_errors {
                    return decoded;
                }
            }
        }

        // 4. Fixed fallback chain.
        if let Ok(s) = std::str::from_utf8(bytes) {
            return s.to_string();
        }

        if let Some(encoding) = utf16_without_bom(bytes) {
            let (decoded, had_errors) = decode_with(encoding, bytes);
            if !had_errors {
                return decoded;
            }
        }

        // Windows-1252 is encoding_rs's ISO-8859-1 superset; it maps every
        // byte, so this step succeeds for any single-byte input.
        let (decoded, had_errors) = decode_with(WINDOWS_1252, bytes);
        if !had_errors {
            return decoded;
        }

        // Terminal pass: undecodable bytes become U+FFFD. This is the
        // EncodingExhausted condition — logged, never raised.
        warn!(
            len = bytes.len(),
            "Encoding chain exhausted, decoding with replacement characters"
        );
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// Decode with an explicit encoding, reporting whether malformed sequences
/// were encountered.
fn decode_with(encoding: &'static Encoding, bytes: &[u8]) -> (String, bool) {
    let (decoded, _, had_errors) = encoding.decode(bytes);
    (decoded.into_owned(), had_errors)
}

/// Heuristic for BOM-less UTF-16: a strong NUL pattern on one byte parity
/// in the leading window indicates 16-bit code units.
fn utf16_without_bom(bytes: &[u8]) -> Option<&'static Encoding> {
    let window = &bytes[..bytes.len().min(64)];
    if window.len() < 4 {
        return None;
    }

    let even_nuls = window.iter().step_by(2).filter(|&&b| b == 0).count();
    let odd_nuls = window.iter().skip(1).step_by(2).filter(|&&b| b == 0).count();
    let half = window.len() / 2;

    if odd_nuls * 10 >= half * 8 && even_nuls * 10 < half * 2 {
        return Some(UTF_16LE);
    }
    if even_nuls * 10 >= half * 8 && odd_nuls * 10 < half * 2 {
        return Some(UTF_16BE);
    }
    None
}
