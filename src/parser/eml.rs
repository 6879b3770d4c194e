//! Single-message parser: one RFC 5322 header/body block → [`CanonicalMessage`].
//!
//! Header extraction is hand-rolled (unfolding + RFC 2047 decoding) so that
//! every header survives into the canonical map; MIME body walking and
//! transfer decoding delegate to `mail-parser`, with a manual fallback for
//! messages it rejects.

use base64::Engine;
use mail_parser::{MessageParser, MimeHeaders};

use crate::encoding::EncodingResolver;
use crate::model::address::EmailAddress;
use crate::model::message::{Attachment, CanonicalMessage, ContentKind};
use crate::parser::header;

/// A parsed message plus the non-fatal issues encountered on the way.
#[derive(Debug)]
pub struct ParseOutcome {
    pub message: CanonicalMessage,
    pub warnings: Vec<String>,
}

/// Parse one raw RFC 5322 message. Best-effort: structural problems surface
/// as warnings on the outcome, never as a failure.
pub fn parse_message(raw: &[u8], resolver: &EncodingResolver) -> ParseOutcome {
    let bytes = skip_envelope_line(strip_bom(raw));
    let mut warnings = Vec::new();

    // Locate the header/body boundary. A missing blank line means the block
    // is truncated: keep everything as headers, report it, continue.
    let (header_bytes, body_offset) = match find_header_end(bytes) {
        Some(pos) => (&bytes[..pos], Some(pos)),
        None => {
            warnings.push("truncated header block: no blank line separator".to_string());
            (bytes, None)
        }
    };

    let header_text = resolver.resolve(header_bytes, None);
    let unfolded = header::unfold_headers(&header_text);

    let mut msg = CanonicalMessage::empty();
    msg.headers = header::build_header_map(&unfolded, resolver);

    msg.subject = header::get_header(&unfolded, "subject")
        .map(|s| header::decode_encoded_words(&s, resolver))
        .unwrap_or_default();

    msg.sender = header::get_header(&unfolded, "from")
        .map(|s| EmailAddress::parse(&header::decode_encoded_words(&s, resolver)))
        .unwrap_or_default();

    msg.recipients = address_list(&unfolded, "to", resolver);
    msg.cc = address_list(&unfolded, "cc", resolver);
    msg.bcc = address_list(&unfolded, "bcc", resolver);

    msg.date = header::get_header(&unfolded, "date").and_then(|d| header::parse_date(&d));
    msg.message_id =
        header::get_header(&unfolded, "message-id").map(|s| header::extract_angle_bracket(&s));
    msg.in_reply_to =
        header::get_header(&unfolded, "in-reply-to").map(|s| header::extract_angle_bracket(&s));

    // Body and attachments
    match MessageParser::default().parse(bytes) {
        Some(parsed) => {
            // HTML preferred over plain text when both exist. `body_html`
            // synthesizes HTML from plain parts, so check for a real HTML
            // part before treating the body as HTML.
            if has_html_part(&parsed) {
                if let Some(html) = parsed.body_html(0) {
                    msg.content_kind = ContentKind::Html;
                    msg.body = html.into_owned();
                }
            } else if let Some(text) = parsed.body_text(0) {
                msg.content_kind = ContentKind::PlainText;
                msg.body = text.into_owned();
            }
            msg.attachments = collect_attachments(&parsed);
        }
        None => {
            warnings.push("MIME parser rejected message, using raw body".to_string());
            if let Some(offset) = body_offset {
                let body_bytes = decode_transfer_encoding(
                    &bytes[offset..],
                    header::get_header(&unfolded, "content-transfer-encoding").as_deref(),
                );
                let charset = content_type_charset(&unfolded);
                msg.body = resolver.resolve(&body_bytes, charset.as_deref());
                msg.body = msg.body.trim_start_matches(['\r', '\n']).to_string();
            }
        }
    }

    ParseOutcome {
        message: msg,
        warnings,
    }
}

/// Decode an address-list header into parsed addresses, source order kept.
fn address_list(
    unfolded: &[(String, String)],
    name: &str,
    resolver: &EncodingResolver,
) -> Vec<EmailAddress> {
    header::get_header(unfolded, name)
        .map(|s| EmailAddress::parse_list(&header::decode_encoded_words(&s, resolver)))
        .unwrap_or_default()
}

/// Whether the parsed tree contains an actual `text/html` body part.
fn has_html_part(parsed: &mail_parser::Message<'_>) -> bool {
    parsed.html_body.iter().any(|id| {
        matches!(
            parsed.parts.get(*id).map(|p| &p.body),
            Some(mail_parser::PartType::Html(_))
        )
    })
}

/// Build owned attachments from the parsed MIME tree, source order kept.
///
/// Inline images count as attachments: they carry a filename or content id
/// and are excluded from the body either way.
fn collect_attachments(parsed: &mail_parser::Message<'_>) -> Vec<Attachment> {
    let mut result = Vec::new();

    for (idx, part) in parsed.attachments().enumerate() {
        let name = part
            .attachment_name()
            .map(String::from)
            .unwrap_or_else(|| format!("attachment_{idx}"));

        let mime_type = part
            .content_type()
            .map(|ct: &mail_parser::ContentType| {
                let main = ct.ctype();
                match ct.subtype() {
                    Some(sub) => format!("{main}/{sub}"),
                    None => main.to_string(),
                }
            })
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let data = part.contents().to_vec();
        result.push(Attachment {
            name,
            mime_type,
            size: data.len() as u64,
            data,
        });
    }

    result
}

/// Fallback transfer decoding for messages `mail-parser` rejects.
fn decode_transfer_encoding(body: &[u8], encoding: Option<&str>) -> Vec<u8> {
    match encoding.map(|e| e.trim().to_lowercase()).as_deref() {
        Some("base64") => {
            let cleaned: Vec<u8> = body
                .iter()
                .copied()
                .filter(|b| !b.is_ascii_whitespace())
                .collect();
            base64::engine::general_purpose::STANDARD
                .decode(&cleaned)
                .unwrap_or_else(|_| body.to_vec())
        }
        Some("quoted-printable") => decode_quoted_printable(body),
        _ => body.to_vec(),
    }
}

/// Minimal quoted-printable decoding: `=XX` → byte, soft line breaks removed.
fn decode_quoted_printable(input: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        if input[i] == b'=' && i + 1 < input.len() {
            // Soft line break: =\r\n or =\n
            if input[i + 1] == b'\n' {
                i += 2;
                continue;
            }
            if input[i + 1] == b'\r' && i + 2 < input.len() && input[i + 2] == b'\n' {
                i += 3;
                continue;
            }
            if i + 2 < input.len() {
                if let Ok(hex) = std::str::from_utf8(&input[i + 1..i + 3]) {
                    if let Ok(byte) = u8::from_str_radix(hex, 16) {
                        result.push(byte);
                        i += 3;
                        continue;
                    }
                }
            }
        }
        result.push(input[i]);
        i += 1;
    }
    result
}

/// Charset parameter from the raw `Content-Type` header, if any.
fn content_type_charset(unfolded: &[(String, String)]) -> Option<String> {
    let ct = header::get_header(unfolded, "content-type")?;
    for param in ct.split(';').skip(1) {
        let param = param.trim();
        if let Some(value) = param.strip_prefix("charset=") {
            return Some(value.trim_matches('"').to_string());
        }
    }
    None
}

/// Strip a UTF-8 BOM if present.
fn strip_bom(data: &[u8]) -> &[u8] {
    if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
        &data[3..]
    } else {
        data
    }
}

/// Skip the `From ` envelope line mbox regions carry.
fn skip_envelope_line(data: &[u8]) -> &[u8] {
    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}

/// Find the byte offset of the blank line ending the header block.
fn find_header_end(data: &[u8]) -> Option<usize> {
    for i in 0..data.len().saturating_sub(1) {
        if data[i] == b'\n' && data[i + 1] == b'\n' {
            return Some(i + 2);
        }
        if i + 3 < data.len()
            && data[i] == b'\r'
            && data[i + 1] == b'\n'
            && data[i + 2] == b'\r'
            && data[i + 3] == b'\n'
        {
            return Some(i + 4);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> EncodingResolver {
        EncodingResolver::default()
    }

    const SIMPLE: &[u8] =
        b"From: a@b.com\nTo: c@d.com\nSubject: Test\nDate: Thu, 04 Jan 2024 10:00:00 +0000\n\nHello world\n";

    #[test]
    fn test_parse_simple_message() {
        let outcome = parse_message(SIMPLE, &resolver());
        let msg = &outcome.message;
        assert_eq!(msg.subject, "Test");
        assert_eq!(msg.sender.address, "a@b.com");
        assert_eq!(msg.recipients.len(), 1);
        assert_eq!(msg.recipients[0].address, "c@d.com");
        assert!(msg.body.contains("Hello world"));
        assert_eq!(msg.content_kind, ContentKind::PlainText);
        assert!(msg.date.is_some());
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_parse_with_envelope_line() {
        let mut raw = b"From a@b.com Thu Jan 04 10:00:00 2024\n".to_vec();
        raw.extend_from_slice(SIMPLE);
        let outcome = parse_message(&raw, &resolver());
        assert_eq!(outcome.message.subject, "Test");
    }

    #[test]
    fn test_parse_encoded_subject() {
        let raw = b"From: a@b.com\nSubject: =?UTF-8?Q?Caf=C3=A9_con_le=C3=B1a?=\n\nBody\n";
        let outcome = parse_message(raw, &resolver());
        assert_eq!(outcome.message.subject, "Café con leña");
    }

    #[test]
    fn test_truncated_header_block() {
        let raw = b"From: a@b.com\nSubject: Cut off";
        let outcome = parse_message(raw, &resolver());
        assert_eq!(outcome.message.subject, "Cut off");
        assert_eq!(outcome.message.sender.address, "a@b.com");
        assert!(outcome
            .warnings
            .iter()
            .any(|w| w.contains("truncated")));
    }

    #[test]
    fn test_html_preferred_over_plain() {
        let raw = b"From: a@b.com\nSubject: Multi\nMIME-Version: 1.0\nContent-Type: multipart/alternative; boundary=\"XX\"\n\n--XX\nContent-Type: text/plain\n\nplain version\n--XX\nContent-Type: text/html\n\n<p>html version</p>\n--XX--\n";
        let outcome = parse_message(raw, &resolver());
        assert_eq!(outcome.message.content_kind, ContentKind::Html);
        assert!(outcome.message.body.contains("html version"));
    }

    #[test]
    fn test_attachment_collected() {
        let raw = b"From: a@b.com\nSubject: Att\nMIME-Version: 1.0\nContent-Type: multipart/mixed; boundary=\"XX\"\n\n--XX\nContent-Type: text/plain\n\nSee attached.\n--XX\nContent-Type: application/pdf; name=\"report.pdf\"\nContent-Disposition: attachment; filename=\"report.pdf\"\nContent-Transfer-Encoding: base64\n\nJVBERi0xLjQK\n--XX--\n";
        let outcome = parse_message(raw, &resolver());
        let msg = &outcome.message;
        assert_eq!(msg.attachments.len(), 1);
        assert_eq!(msg.attachments[0].name, "report.pdf");
        assert_eq!(msg.attachments[0].mime_type, "application/pdf");
        assert!(msg.attachments[0].data.starts_with(b"%PDF-1.4"));
        assert!(msg.body.contains("See attached"));
    }

    #[test]
    fn test_headers_preserved_in_map() {
        let outcome = parse_message(SIMPLE, &resolver());
        let headers = &outcome.message.headers;
        assert_eq!(headers.get("from"), Some("a@b.com"));
        assert_eq!(headers.get("subject"), Some("Test"));
        let names: Vec<&str> = headers.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["from", "to", "subject", "date"]);
    }

    #[test]
    fn test_decode_quoted_printable_soft_breaks() {
        let input = b"caf=C3=A9 and a soft=\nbreak";
        let decoded = decode_quoted_printable(input);
        assert_eq!(String::from_utf8_lossy(&decoded), "café and a softbreak");
    }

    #[test]
    fn test_find_header_end() {
        let data = b"From: a@b.com\nSubject: Hi\n\nBody\n";
        assert_eq!(find_header_end(data), Some(27));
        assert_eq!(find_header_end(b"no blank line"), None);
    }
}
