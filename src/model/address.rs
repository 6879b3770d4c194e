//! Mailbox addresses: parsing, validity, and display.

/// A mailbox split into its optional display name and the bare address.
///
/// Parsing is deliberately forgiving: header values in the wild range from
/// `"Name <user@host>"` through comment-style `"user@host (Name)"` down to
/// free-form text, and a best-effort pair beats a rejection. Whatever cannot
/// be split lands in `address` unchanged.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct EmailAddress {
    /// Human-readable display name (may be empty).
    pub display_name: String,
    /// The bare address (`user@domain`), or the raw value when no address
    /// could be isolated.
    pub address: String,
}

impl EmailAddress {
    /// Parse one mailbox from a header value.
    ///
    /// Angle brackets win; otherwise the first token that looks like an
    /// address is pulled out and the remaining words become the display
    /// name. A value without any address-like token is stored raw.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::default();
        }

        // "Display Name <user@host>" / "<user@host>"
        if let Some(open) = trimmed.rfind('<') {
            if let Some(close) = trimmed[open..].find('>') {
                return Self {
                    display_name: unquote(&trimmed[..open]),
                    address: trimmed[open + 1..open + close].trim().to_string(),
                };
            }
        }

        // "user@host (Comment)" / "Name user@host": isolate the @-token
        let words: Vec<&str> = trimmed.split_whitespace().collect();
        if words.len() > 1 {
            if let Some(at) = words.iter().position(|w| looks_like_address(w)) {
                let name = words
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != at)
                    .map(|(_, w)| w.trim_matches(['(', ')']))
                    .collect::<Vec<_>>()
                    .join(" ");
                return Self {
                    display_name: unquote(&name),
                    address: words[at].trim_matches(['(', ')', ',']).to_string(),
                };
            }
        }

        Self {
            display_name: String::new(),
            address: trimmed.to_string(),
        }
    }

    /// Parse a comma-separated mailbox list, quoted and bracketed commas
    /// honored. Empty segments are dropped; order is kept.
    pub fn parse_list(raw: &str) -> Vec<Self> {
        let mut result = Vec::new();
        let mut segment = String::new();
        let mut quoted = false;
        let mut bracketed = false;

        let mut flush = |segment: &mut String, result: &mut Vec<Self>| {
            let parsed = Self::parse(segment);
            if !parsed.address.is_empty() {
                result.push(parsed);
            }
            segment.clear();
        };

        for ch in raw.chars() {
            match ch {
                '"' => {
                    quoted = !quoted;
                    segment.push(ch);
                }
                '<' if !quoted => {
                    bracketed = true;
                    segment.push(ch);
                }
                '>' if !quoted => {
                    bracketed = false;
                    segment.push(ch);
                }
                ',' if !quoted && !bracketed => flush(&mut segment, &mut result),
                _ => segment.push(ch),
            }
        }
        flush(&mut segment, &mut result);

        result
    }

    /// Whether `address` has the minimal `local@domain.tld` shape.
    ///
    /// This is an identity sanity check for validation reports, not RFC 5321
    /// enforcement.
    pub fn is_valid(&self) -> bool {
        looks_like_address(&self.address)
    }

    /// Whether both fields are empty.
    pub fn is_empty(&self) -> bool {
        self.display_name.is_empty() && self.address.is_empty()
    }

    /// `"Display Name <address>"`, or the bare address without a name.
    pub fn display(&self) -> String {
        if self.display_name.is_empty() {
            self.address.clone()
        } else {
            format!("{} <{}>", self.display_name, self.address)
        }
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// One `@` with a non-empty local part and a dotted domain, no whitespace.
fn looks_like_address(s: &str) -> bool {
    let s = s.trim_matches(['(', ')', ',', '<', '>']);
    if s.matches('@').count() != 1 || s.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

/// Strip one layer of surrounding double-quotes, then trim.
fn unquote(s: &str) -> String {
    let trimmed = s.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .map(|inner| inner.trim().to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_angle_form() {
        let addr = EmailAddress::parse("Dana Reyes <dana.reyes@mail.example>");
        assert_eq!(addr.display_name, "Dana Reyes");
        assert_eq!(addr.address, "dana.reyes@mail.example");

        let bare = EmailAddress::parse("<ops@mail.example>");
        assert_eq!(bare.display_name, "");
        assert_eq!(bare.address, "ops@mail.example");
    }

    #[test]
    fn test_parse_quoted_display_name() {
        let addr = EmailAddress::parse("\"Reyes, Dana\" <dana@mail.example>");
        assert_eq!(addr.display_name, "Reyes, Dana");
        assert_eq!(addr.address, "dana@mail.example");
    }

    #[test]
    fn test_parse_comment_form() {
        // Old-style comment addressing: address first, name in parentheses
        let addr = EmailAddress::parse("dana@mail.example (Dana Reyes)");
        assert_eq!(addr.address, "dana@mail.example");
        assert_eq!(addr.display_name, "Dana Reyes");
    }

    #[test]
    fn test_parse_name_then_bare_address() {
        let addr = EmailAddress::parse("Dana Reyes dana@mail.example");
        assert_eq!(addr.address, "dana@mail.example");
        assert_eq!(addr.display_name, "Dana Reyes");
    }

    #[test]
    fn test_parse_free_form_kept_raw() {
        let addr = EmailAddress::parse("undisclosed recipients");
        assert_eq!(addr.address, "undisclosed recipients");
        assert_eq!(addr.display_name, "");
        assert!(!addr.is_valid());
    }

    #[test]
    fn test_parse_list_mixed_forms() {
        let list = EmailAddress::parse_list(
            "\"Reyes, Dana\" <dana@mail.example>, ops@mail.example (Ops), plain@mail.example",
        );
        assert_eq!(list.len(), 3);
        assert_eq!(list[0].display_name, "Reyes, Dana");
        assert_eq!(list[1].address, "ops@mail.example");
        assert_eq!(list[1].display_name, "Ops");
        assert_eq!(list[2].address, "plain@mail.example");
    }

    #[test]
    fn test_parse_list_drops_empty_segments() {
        let list = EmailAddress::parse_list("a@b.example, , c@d.example,");
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_validity() {
        assert!(EmailAddress::parse("user@host.example").is_valid());
        assert!(!EmailAddress::parse("no-at-sign").is_valid());
        assert!(!EmailAddress::parse("user@nodot").is_valid());
        assert!(!EmailAddress::parse("@host.example").is_valid());
    }

    #[test]
    fn test_display_forms() {
        let named = EmailAddress::parse("Dana <dana@mail.example>");
        assert_eq!(named.display(), "Dana <dana@mail.example>");
        let bare = EmailAddress::parse("dana@mail.example");
        assert_eq!(bare.display(), "dana@mail.example");
        assert!(EmailAddress::parse("  ").is_empty());
    }
}
