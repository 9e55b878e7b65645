//! Case-insensitive IRC names.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::casemap::CaseMapping;

/// Channel type prefixes used when the server does not announce `CHANTYPES`.
pub const DEFAULT_CHANTYPES: &str = "#&+!";

/// A nick or channel name.
///
/// Equality, ordering and hashing use the lowercase form computed with the
/// server's case mapping; [`Display`](fmt::Display) keeps the spelling that
/// was received.
#[derive(Clone, Debug)]
pub struct Identifier {
    name: String,
    lowered: String,
    casemapping: CaseMapping,
    chantypes: String,
}

impl Identifier {
    /// Build an identifier with the default mapping and channel types.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_rules(name, CaseMapping::default(), DEFAULT_CHANTYPES)
    }

    /// Build an identifier under explicit server rules.
    pub fn with_rules(
        name: impl Into<String>,
        casemapping: CaseMapping,
        chantypes: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let lowered = casemapping.to_lower(&name);
        Identifier {
            name,
            lowered,
            casemapping,
            chantypes: chantypes.into(),
        }
    }

    /// The name as received.
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// The case-mapped lowercase form used for comparison.
    pub fn lower(&self) -> &str {
        &self.lowered
    }

    /// The case mapping this identifier was built with.
    pub fn casemapping(&self) -> CaseMapping {
        self.casemapping
    }

    /// True unless the name starts with one of the channel type prefixes.
    pub fn is_nick(&self) -> bool {
        match self.name.chars().next() {
            Some(first) => !self.chantypes.contains(first),
            None => false,
        }
    }

    /// Compare against a plain string using this identifier's case mapping.
    pub fn matches(&self, other: &str) -> bool {
        self.casemapping.to_lower(other) == self.lowered
    }
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.lowered == other.lowered
    }
}

impl Eq for Identifier {}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.lowered.cmp(&other.lowered)
    }
}

impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.lowered.hash(state);
    }
}

impl PartialEq<str> for Identifier {
    fn eq(&self, other: &str) -> bool {
        self.matches(other)
    }
}

impl PartialEq<&str> for Identifier {
    fn eq(&self, other: &&str) -> bool {
        self.matches(other)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.name
    }
}
