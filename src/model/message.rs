//! The canonical, format-independent message model.
//!
//! A [`CanonicalMessage`] is constructed entirely by one of the parser
//! variants, read by the composer, and never mutated in place afterwards.

use chrono::{DateTime, Utc};

use super::address::EmailAddress;

/// Which body variant is authoritative when a message carries both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// The body is plain text and must be escaped before markup composition.
    PlainText,
    /// The body is HTML and must pass the allow-list sanitizer.
    Html,
}

/// One decoded mail attachment, owned by the message that produced it.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// Filename of the attachment. Generated if missing from the headers.
    pub name: String,
    /// MIME content type (e.g. `"image/jpeg"`, `"application/pdf"`).
    pub mime_type: String,
    /// Decoded payload size in bytes.
    pub size: u64,
    /// Decoded payload.
    pub data: Vec<u8>,
}

/// Ordered header map: insertion order preserved, duplicate names collapse
/// to the last-seen value while keeping the first-seen position.
///
/// Names are stored lowercased.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header. A repeated name replaces the stored value but keeps
    /// the original position.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        let name = name.to_lowercase();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == name) {
            entry.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    /// Look up a header value by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        let name = name.to_lowercase();
        self.entries
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of stored headers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The normalized representation of one mail item.
///
/// `subject`, `sender` and `body` are always present — the empty string is
/// the floor, never an absent value. `attachments` preserves source container
/// order. All text fields are fully decoded; no further charset work happens
/// downstream.
#[derive(Debug, Clone)]
pub struct CanonicalMessage {
    /// Decoded subject line (RFC 2047 encoded-words resolved). May be empty.
    pub subject: String,
    /// Best-effort sender.
    pub sender: EmailAddress,
    /// Primary recipients, in source order, not deduplicated.
    pub recipients: Vec<EmailAddress>,
    /// Carbon-copy recipients.
    pub cc: Vec<EmailAddress>,
    /// Blind-carbon-copy recipients (usually present only in stored copies).
    pub bcc: Vec<EmailAddress>,
    /// Parsed date, absent if unparsable.
    pub date: Option<DateTime<Utc>>,
    /// The `Message-ID` header value, if present.
    pub message_id: Option<String>,
    /// The `In-Reply-To` header value, if present.
    pub in_reply_to: Option<String>,
    /// Which body variant `body` holds.
    pub content_kind: ContentKind,
    /// Fully decoded body text or HTML.
    pub body: String,
    /// All headers, insertion-ordered, duplicates collapsed last-wins.
    pub headers: HeaderMap,
    /// Attachments in source container order.
    pub attachments: Vec<Attachment>,
}

impl CanonicalMessage {
    /// An empty message with plain-text body. Parsers start from this and
    /// fill in what they can extract.
    pub fn empty() -> Self {
        Self {
            subject: String::new(),
            sender: EmailAddress::default(),
            recipients: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            date: None,
            message_id: None,
            in_reply_to: None,
            content_kind: ContentKind::PlainText,
            body: String::new(),
            headers: HeaderMap::new(),
            attachments: Vec::new(),
        }
    }

    /// Whether the message contains attachments.
    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }

    /// A short best-effort identifier for output naming: the subject if any,
    /// otherwise the message id, otherwise `"message"`.
    pub fn identifier(&self) -> &str {
        if !self.subject.is_empty() {
            &self.subject
        } else if let Some(ref id) = self.message_id {
            id
        } else {
            "message"
        }
    }
}
