//! Document composition.
//!
//! Turns a [`CanonicalMessage`] into a markup tree with a fixed skeleton:
//! header block, body block, attachments summary, footer. Plain-text bodies
//! are escaped; HTML bodies pass a restrictive allow-list sanitizer.
//! Composition is pure: identical inputs produce identical trees.

use humansize::{format_size, BINARY};

use crate::model::message::{CanonicalMessage, ContentKind};

/// Tags kept by the sanitizer (text formatting, lists, tables, block quotes).
const ALLOWED_TAGS: &[&str] = &[
    "p", "br", "div", "span", "b", "i", "em", "strong", "u", "s", "ul", "ol", "li", "table",
    "thead", "tbody", "tr", "td", "th", "blockquote", "pre", "code", "h1", "h2", "h3", "h4", "h5",
    "h6", "hr",
];

/// Tags removed together with their content, not merely unwrapped.
const REMOVED_BLOCK_TAGS: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "form", "noscript", "head", "title", "svg",
    "select", "textarea", "button",
];

/// Marker appended when the body exceeds the configured length cap.
const TRUNCATION_MARKER: &str = "[message truncated]";

/// Composition tunables.
#[derive(Debug, Clone)]
pub struct ComposeStyle {
    /// Maximum body length in characters before truncation.
    pub max_body_chars: usize,
}

impl Default for ComposeStyle {
    fn default() -> Self {
        Self {
            max_body_chars: 50_000,
        }
    }
}

/// A node in the composed markup tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupNode {
    /// An element with child nodes.
    Element {
        tag: &'static str,
        children: Vec<MarkupNode>,
    },
    /// Text content, escaped at serialization time.
    Text(String),
    /// Already-sanitized HTML, emitted verbatim.
    Raw(String),
}

impl MarkupNode {
    /// Construct an element node.
    pub fn element(tag: &'static str, children: Vec<MarkupNode>) -> Self {
        Self::Element { tag, children }
    }

    /// Construct a text node.
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(content.into())
    }

    /// Serialize the tree to HTML.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        match self {
            Self::Element { tag, children } => {
                if children.is_empty() && matches!(*tag, "br" | "hr") {
                    out.push_str(&format!("<{tag}/>"));
                    return;
                }
                out.push_str(&format!("<{tag}>"));
                for child in children {
                    child.write_html(out);
                }
                out.push_str(&format!("</{tag}>"));
            }
            Self::Text(text) => out.push_str(&escape_html(text)),
            Self::Raw(html) => out.push_str(html),
        }
    }

    /// Flatten the tree to plain text lines for text-layout rendering.
    ///
    /// Block elements break lines, table rows join their cells with `": "`,
    /// list items get a dash prefix.
    pub fn to_text_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        let mut current = String::new();
        self.flatten(&mut lines, &mut current);
        if !current.trim().is_empty() {
            lines.push(current.trim_end().to_string());
        }
        lines
    }

    fn flatten(&self, lines: &mut Vec<String>, current: &mut String) {
        match self {
            Self::Element { tag, children } => match *tag {
                "tr" => {
                    flush_line(lines, current);
                    let cells: Vec<String> = children
                        .iter()
                        .map(|c| c.to_text_lines().join(" "))
                        .filter(|s| !s.is_empty())
                        .collect();
                    if !cells.is_empty() {
                        lines.push(cells.join(": "));
                    }
                }
                "li" => {
                    flush_line(lines, current);
                    let item = children
                        .iter()
                        .map(|c| c.to_text_lines().join(" "))
                        .collect::<Vec<_>>()
                        .join(" ");
                    lines.push(format!("- {}", item.trim()));
                }
                "br" => flush_line_always(lines, current),
                "hr" => {
                    flush_line(lines, current);
                    lines.push(String::new());
                }
                "p" | "div" | "table" | "ul" | "ol" | "blockquote" | "pre" | "h1" | "h2" | "h3"
                | "h4" | "h5" | "h6" => {
                    flush_line(lines, current);
                    for child in children {
                        child.flatten(lines, current);
                    }
                    flush_line(lines, current);
                }
                _ => {
                    for child in children {
                        child.flatten(lines, current);
                    }
                }
            },
            Self::Text(text) => current.push_str(text),
            Self::Raw(html) => {
                for line in html_to_text(html).lines() {
                    flush_line(lines, current);
                    lines.push(line.to_string());
                }
            }
        }
    }
}

fn flush_line(lines: &mut Vec<String>, current: &mut String) {
    if !current.trim().is_empty() {
        lines.push(current.trim_end().to_string());
    }
    current.clear();
}

fn flush_line_always(lines: &mut Vec<String>, current: &mut String) {
    lines.push(current.trim_end().to_string());
    current.clear();
}

/// Compose the document skeleton for one message.
pub fn compose(msg: &CanonicalMessage, style: &ComposeStyle) -> MarkupNode {
    let mut children = vec![header_block(msg), MarkupNode::element("hr", Vec::new())];

    children.push(body_block(msg, style));

    if msg.has_attachments() {
        children.push(attachments_block(msg));
    }

    children.push(MarkupNode::element("hr", Vec::new()));
    children.push(footer_block());

    MarkupNode::element("div", children)
}

/// Labeled header rows, only for headers present and non-empty.
fn header_block(msg: &CanonicalMessage) -> MarkupNode {
    let mut rows = Vec::new();

    let mut push_row = |label: &'static str, value: String| {
        if !value.is_empty() {
            rows.push(MarkupNode::element(
                "tr",
                vec![
                    MarkupNode::element("th", vec![MarkupNode::text(label)]),
                    MarkupNode::element("td", vec![MarkupNode::text(value)]),
                ],
            ));
        }
    };

    push_row("Subject", msg.subject.clone());
    push_row("From", msg.sender.display());
    push_row("To", join_addresses(&msg.recipients));
    push_row("Cc", join_addresses(&msg.cc));
    if let Some(date) = msg.date {
        push_row("Date", date.format("%Y-%m-%d %H:%M UTC").to_string());
    }

    MarkupNode::element("table", rows)
}

fn join_addresses(addrs: &[crate::model::address::EmailAddress]) -> String {
    addrs
        .iter()
        .map(|a| a.display())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Body block: escaped when plain text, sanitized when HTML, truncated with
/// a visible marker past the cap.
fn body_block(msg: &CanonicalMessage, style: &ComposeStyle) -> MarkupNode {
    let (body, truncated) = cap_chars(&msg.body, style.max_body_chars);

    let mut children = match msg.content_kind {
        ContentKind::PlainText => {
            // One paragraph per line keeps the text layout intact
            body.lines()
                .map(|line| MarkupNode::element("p", vec![MarkupNode::text(line)]))
                .collect()
        }
        ContentKind::Html => vec![MarkupNode::Raw(sanitize_html(&body))],
    };

    if truncated {
        children.push(MarkupNode::element(
            "p",
            vec![MarkupNode::element(
                "em",
                vec![MarkupNode::text(TRUNCATION_MARKER)],
            )],
        ));
    }

    MarkupNode::element("div", children)
}

/// Attachments summary: name and human-readable size, source order.
fn attachments_block(msg: &CanonicalMessage) -> MarkupNode {
    let items = msg
        .attachments
        .iter()
        .map(|att| {
            let size = format_size(att.size, BINARY);
            MarkupNode::element(
                "li",
                vec![MarkupNode::text(format!("{} ({size})", att.name))],
            )
        })
        .collect();

    MarkupNode::element(
        "div",
        vec![
            MarkupNode::element(
                "p",
                vec![MarkupNode::element(
                    "b",
                    vec![MarkupNode::text(format!(
                        "Attachments ({})",
                        msg.attachments.len()
                    ))],
                )],
            ),
            MarkupNode::element("ul", items),
        ],
    )
}

fn footer_block() -> MarkupNode {
    MarkupNode::element(
        "p",
        vec![MarkupNode::element(
            "em",
            vec![MarkupNode::text("Converted by mailpress")],
        )],
    )
}

/// Truncate at a character boundary, reporting whether truncation happened.
fn cap_chars(s: &str, max_chars: usize) -> (String, bool) {
    if s.chars().count() <= max_chars {
        (s.to_string(), false)
    } else {
        (s.chars().take(max_chars).collect(), true)
    }
}

/// Escape text for HTML embedding.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Allow-list HTML sanitizer.
///
/// Dangerous blocks (`script`, `form`, ...) are removed together with their
/// content; tags outside the allow-list are unwrapped; allowed tags are
/// re-emitted lowercased with all attributes dropped.
pub fn sanitize_html(html: &str) -> String {
    let mut cleaned = html.to_string();
    for tag in REMOVED_BLOCK_TAGS {
        cleaned = remove_tag_block(&cleaned, tag);
    }

    let mut out = String::with_capacity(cleaned.len());
    let mut rest = cleaned.as_str();

    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('>') else {
            // Unterminated tag: drop the remainder
            rest = "";
            break;
        };
        let token = &after[..end];
        let is_closing = token.starts_with('/');
        let name: String = token
            .trim_start_matches('/')
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_lowercase();

        if ALLOWED_TAGS.contains(&name.as_str()) {
            if is_closing {
                out.push_str(&format!("</{name}>"));
            } else if name == "br" || name == "hr" {
                out.push_str(&format!("<{name}/>"));
            } else {
                out.push_str(&format!("<{name}>"));
            }
        }
        // Tags outside the allow-list are unwrapped: skip the token

        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

/// Remove an entire tag block (e.g. `<script>…</script>`).
fn remove_tag_block(html: &str, tag: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut remaining = html;
    let open = format!("<{tag}");
    let close = format!("</{tag}>");

    while let Some(start) = find_ascii_ci(remaining, &open) {
        result.push_str(&remaining[..start]);
        let after = &remaining[start..];
        if let Some(end) = find_ascii_ci(after, &close) {
            remaining = &after[end + close.len()..];
        } else {
            // No closing tag — remove rest
            remaining = "";
            break;
        }
    }
    result.push_str(remaining);
    result
}

/// Byte offset of an ASCII-case-insensitive needle. Tag names are ASCII, so
/// offsets stay valid in the original string.
fn find_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
    let hay = haystack.as_bytes();
    let ndl = needle.as_bytes();
    if ndl.is_empty() || hay.len() < ndl.len() {
        return None;
    }
    (0..=hay.len() - ndl.len())
        .find(|&i| hay[i..i + ndl.len()].eq_ignore_ascii_case(ndl))
}

/// Strip tags from sanitized HTML for plain-text flattening.
fn html_to_text(html: &str) -> String {
    let mut text = html.to_string();
    for tag in &["br", "br/", "br /"] {
        text = text.replace(&format!("<{tag}>"), "\n");
    }
    for tag in &["p", "div", "tr", "li", "blockquote", "h1", "h2", "h3", "h4", "h5", "h6"] {
        text = text.replace(&format!("<{tag}>"), "\n");
        text = text.replace(&format!("</{tag}>"), "\n");
    }

    let mut result = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }

    // Decode the entities our own escaping produces
    result = result.replace("&amp;", "&");
    result = result.replace("&lt;", "<");
    result = result.replace("&gt;", ">");
    result = result.replace("&quot;", "\"");
    result = result.replace("&#39;", "'");
    result = result.replace("&nbsp;", " ");

    // Collapse runs of blank lines
    let mut cleaned = String::with_capacity(result.len());
    let mut prev_was_blank = false;
    for line in result.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !prev_was_blank {
                cleaned.push('\n');
                prev_was_blank = true;
            }
        } else {
            cleaned.push_str(trimmed);
            cleaned.push('\n');
            prev_was_blank = false;
        }
    }
    cleaned.trim().to_string()
}
