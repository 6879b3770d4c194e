//! Concatenated-store parser (mbox family).
//!
//! Splits a byte stream into message regions on `From ` envelope separator
//! lines, then delegates each region to the single-message parser. Separator
//! lines are recognized only at line starts — at offset zero or after a
//! blank line — so quoted `>From ` content never causes a false split.
//! One malformed region is reported per-item and never aborts the rest.

use tracing::warn;

use crate::encoding::EncodingResolver;
use crate::parser::eml::{self, ParseOutcome};

/// One parsed region of a store, with its position in the container.
#[derive(Debug)]
pub struct StoreItem {
    /// Zero-based position within the store.
    pub index: usize,
    /// Byte offset of the region start.
    pub offset: usize,
    /// Parse result for the region (best-effort; warnings carry issues).
    pub outcome: ParseOutcome,
}

/// Parse an entire store held in memory.
///
/// Returns one [`StoreItem`] per region in container order. An empty input
/// yields an empty vector.
pub fn parse_store(bytes: &[u8], resolver: &EncodingResolver) -> Vec<StoreItem> {
    split_regions(bytes)
        .into_iter()
        .enumerate()
        .map(|(index, (offset, region))| {
            let outcome = eml::parse_message(region, resolver);
            for warning in &outcome.warnings {
                warn!(index, offset, warning = %warning, "Store region issue");
            }
            StoreItem {
                index,
                offset,
                outcome,
            }
        })
        .collect()
}

/// Split a store into `(offset, region_bytes)` pairs at envelope separators.
pub fn split_regions(bytes: &[u8]) -> Vec<(usize, &[u8])> {
    // Skip a UTF-8 BOM at the very start
    let (bytes, base) = if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        (&bytes[3..], 3usize)
    } else {
        (bytes, 0usize)
    };

    let mut regions = Vec::new();
    let mut region_start: Option<usize> = None;
    let mut prev_line_was_blank = true;
    let mut pos = 0;

    while pos < bytes.len() {
        let line_end = bytes[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|p| pos + p + 1)
            .unwrap_or(bytes.len());
        let line = &bytes[pos..line_end];

        if line.starts_with(b"From ") && (pos == 0 || prev_line_was_blank) {
            if let Some(start) = region_start {
                regions.push((base + start, &bytes[start..pos]));
            }
            region_start = Some(pos);
        } else if line.starts_with(b"From ") {
            // Mid-content separator without a preceding blank line: real-world
            // stores produce these, treat as a boundary but note it.
            warn!(offset = base + pos, "'From ' separator without preceding blank line");
            if let Some(start) = region_start {
                regions.push((base + start, &bytes[start..pos]));
            }
            region_start = Some(pos);
        }

        prev_line_was_blank = is_blank_line(line);
        pos = line_end;
    }

    if let Some(start) = region_start {
        if start < bytes.len() {
            regions.push((base + start, &bytes[start..]));
        }
    } else if !bytes.is_empty() {
        // No separator at all: treat the whole input as one region
        regions.push((base, bytes));
    }

    regions
}

/// Check whether a line is blank (empty or only whitespace / CR / LF).
fn is_blank_line(line: &[u8]) -> bool {
    line.iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b' ' || b == b'\t')
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_MESSAGES: &[u8] = b"From a@b.com Thu Jan 04 10:00:00 2024\n\
From: a@b.com\nSubject: First\n\nBody one\n\n\
From c@d.com Thu Jan 04 11:00:00 2024\n\
From: c@d.com\nSubject: Second\n\nBody two\n";

    #[test]
    fn test_split_two_messages() {
        let regions = split_regions(TWO_MESSAGES);
        assert_eq!(regions.len(), 2);
        assert!(regions[0].1.starts_with(b"From a@b.com"));
        assert!(regions[1].1.starts_with(b"From c@d.com"));
    }

    #[test]
    fn test_parse_store_fields() {
        let resolver = EncodingResolver::default();
        let items = parse_store(TWO_MESSAGES, &resolver);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].outcome.message.subject, "First");
        assert_eq!(items[1].outcome.message.subject, "Second");
        assert_eq!(items[1].index, 1);
    }

    #[test]
    fn test_quoted_from_not_a_separator() {
        let raw = b"From a@b.com Thu Jan 04 10:00:00 2024\n\
From: a@b.com\nSubject: Quote\n\n>From the archives\nStill body\n";
        let regions = split_regions(raw);
        assert_eq!(regions.len(), 1);
    }

    #[test]
    fn test_from_mid_body_after_blank_line_splits() {
        // A bare "From " line after a blank line is a boundary
        let raw = b"From a@b.com Thu Jan 04 10:00:00 2024\nSubject: One\n\nbody\n\n\
From c@d.com Thu Jan 04 11:00:00 2024\nSubject: Two\n\nbody\n";
        assert_eq!(split_regions(raw).len(), 2);
    }

    #[test]
    fn test_truncated_region_reported_not_fatal() {
        let raw = b"From a@b.com Thu Jan 04 10:00:00 2024\n\
From: a@b.com\nSubject: Good\n\nBody\n\n\
From b@b.com Thu Jan 04 11:00:00 2024\n\
From: b@b.com\nSubject: Truncated no blank line\n\
From c@d.com Thu Jan 04 12:00:00 2024\n\
From: c@d.com\nSubject: Also good\n\nBody\n";
        let resolver = EncodingResolver::default();
        let items = parse_store(raw, &resolver);
        assert_eq!(items.len(), 3);
        assert!(items[0].outcome.warnings.is_empty());
        assert!(!items[1].outcome.warnings.is_empty());
        assert_eq!(items[2].outcome.message.subject, "Also good");
    }

    #[test]
    fn test_empty_store() {
        assert!(split_regions(b"").is_empty());
    }

    #[test]
    fn test_no_separator_single_region() {
        let raw = b"From: a@b.com\nSubject: Bare\n\nBody\n";
        let regions = split_regions(raw);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].0, 0);
    }
}
