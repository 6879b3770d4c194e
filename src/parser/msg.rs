//! Compound-binary-item parser (Outlook `.msg`, OLE/CFB structured storage).
//!
//! The container format is isolated behind the [`CompoundItemReader`] trait
//! so pipeline correctness does not depend on the concrete engine. The
//! bundled [`OutlookReader`] delegates OLE/CFB and MAPI property parsing to
//! the `msg_parser` crate and maps its output into the canonical model.
//! Corrupt or unsupported streams degrade to best-effort field extraction
//! with the remainder left empty.

use std::io::Write;

use msg_parser::Outlook;
use tracing::warn;

use crate::error::{ConvertError, Result};
use crate::model::address::EmailAddress;
use crate::model::message::{Attachment, CanonicalMessage, ContentKind};
use crate::parser::header;

/// Narrow capability interface for reading compound mail items.
pub trait CompoundItemReader: Send + Sync {
    /// Read one compound item into a [`CanonicalMessage`].
    ///
    /// Output shape matches the single-message parser: one message with
    /// decoded fields and owned attachments.
    fn read(&self, bytes: &[u8]) -> Result<CanonicalMessage>;
}

/// `msg_parser`-backed reader for Outlook items.
#[derive(Debug, Default)]
pub struct OutlookReader;

impl CompoundItemReader for OutlookReader {
    fn read(&self, bytes: &[u8]) -> Result<CanonicalMessage> {
        // msg_parser only reads from paths, so stage the bytes in a temp file.
        let mut temp = tempfile::NamedTempFile::new()
            .map_err(|e| ConvertError::CompoundItem(format!("temp file: {e}")))?;
        temp.write_all(bytes)
            .map_err(|e| ConvertError::CompoundItem(format!("temp file write: {e}")))?;
        temp.flush()
            .map_err(|e| ConvertError::CompoundItem(format!("temp file flush: {e}")))?;

        let outlook = Outlook::from_path(temp.path())
            .map_err(|e| ConvertError::CompoundItem(format!("OLE/CFB parse: {e}")))?;

        Ok(outlook_to_canonical(outlook))
    }
}

/// Map `msg_parser`'s Outlook model into a [`CanonicalMessage`].
fn outlook_to_canonical(outlook: Outlook) -> CanonicalMessage {
    let mut msg = CanonicalMessage::empty();

    msg.subject = outlook.subject;
    msg.sender = person_to_address(&outlook.sender.name, &outlook.sender.email);

    msg.recipients = outlook
        .to
        .iter()
        .map(|p| person_to_address(&p.name, &p.email))
        .collect();
    msg.cc = outlook
        .cc
        .iter()
        .map(|p| person_to_address(&p.name, &p.email))
        .collect();
    // BCC is stored as a single display string in the MAPI properties
    if !outlook.bcc.is_empty() {
        msg.bcc = EmailAddress::parse_list(&outlook.bcc);
    }

    if !outlook.headers.date.is_empty() {
        msg.date = header::parse_date(&outlook.headers.date);
        msg.headers.insert("date", outlook.headers.date.clone());
    }
    if !outlook.headers.message_id.is_empty() {
        msg.message_id = Some(header::extract_angle_bracket(&outlook.headers.message_id));
        msg.headers
            .insert("message-id", outlook.headers.message_id.clone());
    }
    if !outlook.headers.content_type.is_empty() {
        msg.headers
            .insert("content-type", outlook.headers.content_type.clone());
    }

    // The body stream is plain text; HTML lives in compressed RTF, which
    // this reader does not expand.
    msg.content_kind = ContentKind::PlainText;
    msg.body = outlook.body;

    msg.attachments = outlook
        .attachments
        .iter()
        .enumerate()
        .map(|(idx, att)| {
            let name = if !att.file_name.is_empty() {
                att.file_name.clone()
            } else if !att.display_name.is_empty() {
                att.display_name.clone()
            } else {
                format!("attachment_{idx}")
            };
            let mime_type = if att.mime_tag.is_empty() {
                "application/octet-stream".to_string()
            } else {
                att.mime_tag.clone()
            };
            // Payloads are hex-encoded by msg_parser; a malformed stream
            // degrades to an empty payload rather than failing the parse.
            let data = hex::decode(&att.payload).unwrap_or_else(|e| {
                warn!(name = %name, error = %e, "Undecodable attachment stream");
                Vec::new()
            });
            Attachment {
                name,
                mime_type,
                size: data.len() as u64,
                data,
            }
        })
        .collect();

    msg
}

fn person_to_address(name: &str, email: &str) -> EmailAddress {
    EmailAddress {
        display_name: name.to_string(),
        address: email.to_string(),
    }
}
