//! IRC case-mapping functions.
//!
//! IRC compares nicks and channel names case-insensitively, and some servers
//! treat extra punctuation as the "uppercase" form of other characters
//! (`[` and `{`, for instance). The server announces its rule through the
//! `CASEMAPPING` ISUPPORT token.

use std::fmt;

/// Case mapping rule announced by the server.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CaseMapping {
    /// Only `A-Z` map to `a-z`.
    Ascii,
    /// ASCII plus `[]\~` mapping to `{}|^`.
    #[default]
    Rfc1459,
    /// ASCII plus `[]\` mapping to `{}|` (no `~`).
    Rfc1459Strict,
}

impl CaseMapping {
    /// Parse a `CASEMAPPING` value; unknown names fall back to `rfc1459`.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "ascii" => CaseMapping::Ascii,
            "rfc1459-strict" | "strict-rfc1459" => CaseMapping::Rfc1459Strict,
            _ => CaseMapping::Rfc1459,
        }
    }

    /// Canonical token name.
    pub fn as_str(self) -> &'static str {
        match self {
            CaseMapping::Ascii => "ascii",
            CaseMapping::Rfc1459 => "rfc1459",
            CaseMapping::Rfc1459Strict => "rfc1459-strict",
        }
    }

    /// Convert a single character to its lowercase form under this mapping.
    #[inline]
    pub const fn lower_char(self, c: char) -> char {
        match (self, c) {
            (_, 'A'..='Z') => (c as u8 + 32) as char,
            (CaseMapping::Ascii, _) => c,
            (_, '[') => '{',
            (_, ']') => '}',
            (_, '\\') => '|',
            (CaseMapping::Rfc1459, '~') => '^',
            _ => c,
        }
    }

    /// Convert a string to its lowercase form under this mapping.
    pub fn to_lower(self, s: &str) -> String {
        s.chars().map(|c| self.lower_char(c)).collect()
    }

    /// Compare two strings under this mapping.
    pub fn equals(self, a: &str, b: &str) -> bool {
        a.len() == b.len()
            && a
                .chars()
                .zip(b.chars())
                .all(|(ca, cb)| self.lower_char(ca) == self.lower_char(cb))
    }
}

impl fmt::Display for CaseMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Convert a string to IRC lowercase using RFC 1459 case mapping.
pub fn irc_to_lower(s: &str) -> String {
    CaseMapping::Rfc1459.to_lower(s)
}

/// Compare two strings using RFC 1459 case-insensitive comparison.
pub fn irc_eq(a: &str, b: &str) -> bool {
    CaseMapping::Rfc1459.equals(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc1459() {
        assert_eq!(irc_to_lower("#Channel[1]"), "#channel{1}");
        assert_eq!(irc_to_lower("Nick\\Away"), "nick|away");
        assert_eq!(irc_to_lower("Test~Name"), "test^name");
        assert!(irc_eq("Nick[a]", "nick{A}"));
    }

    #[test]
    fn test_strict_keeps_tilde() {
        let m = CaseMapping::Rfc1459Strict;
        assert_eq!(m.to_lower("A~[]\\"), "a~{}|");
    }

    #[test]
    fn test_ascii_only_letters() {
        let m = CaseMapping::Ascii;
        assert_eq!(m.to_lower("ABC[]~\\"), "abc[]~\\");
        assert!(!m.equals("a[", "a{"));
    }

    #[test]
    fn test_from_name() {
        assert_eq!(CaseMapping::from_name("ascii"), CaseMapping::Ascii);
        assert_eq!(CaseMapping::from_name("RFC1459"), CaseMapping::Rfc1459);
        assert_eq!(
            CaseMapping::from_name("rfc1459-strict"),
            CaseMapping::Rfc1459Strict
        );
        assert_eq!(CaseMapping::from_name("rfc7613"), CaseMapping::Rfc1459);
    }
}
