//! ISUPPORT (`RPL_ISUPPORT`, numeric 005) parsing.
//!
//! Servers advertise their limits and syntax in one or more 005 replies made
//! of `KEY`, `KEY=value` and `-KEY` tokens. [`ISupport`] accumulates them into
//! a map with typed accessors for the parameters the bot relies on.

mod parser;
mod tokens;

use std::collections::BTreeMap;

use crate::casemap::CaseMapping;
use crate::error::IsupportError;
use crate::identifier::DEFAULT_CHANTYPES;

pub use self::parser::{parse_parameter, response_tokens, unescape_value};
pub use self::tokens::{IsupportValue, INTEGER_KEYS};

/// Line length assumed when `LINELEN` is not advertised.
pub const DEFAULT_LINELEN: usize = 512;

/// Server parameters accumulated from `RPL_ISUPPORT`.
///
/// Updates never mutate in place: [`apply`](ISupport::apply) returns a new
/// value, so a snapshot handed out earlier keeps its contents.
///
/// ```
/// use sopel_proto::isupport::ISupport;
///
/// let isupport = ISupport::default()
///     .apply(["NICKLEN=30", "PREFIX=(ov)@+", "EXCEPTS"])
///     .unwrap();
/// assert_eq!(isupport.nicklen(), Some(30));
/// assert!(isupport.contains("excepts"));
///
/// let isupport = isupport.apply(["-EXCEPTS"]).unwrap();
/// assert!(!isupport.contains("EXCEPTS"));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ISupport {
    params: BTreeMap<String, IsupportValue>,
}

impl ISupport {
    /// Parse tokens and return a copy with them applied.
    ///
    /// Fails on the first invalid token without applying any of them.
    pub fn apply<I, S>(&self, tokens: I) -> Result<ISupport, IsupportError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let parsed = tokens
            .into_iter()
            .map(|token| parse_parameter(token.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.apply_parsed(parsed))
    }

    /// Apply the tokens of one `RPL_ISUPPORT` reply, given its arguments.
    ///
    /// See [`response_tokens`] for which arguments are skipped.
    pub fn from_response_args<S: AsRef<str>>(&self, args: &[S]) -> Result<ISupport, IsupportError> {
        self.apply(response_tokens(args))
    }

    /// Return a copy with already parsed parameters applied.
    ///
    /// [`IsupportValue::Removed`] deletes the key.
    pub fn apply_parsed<I>(&self, params: I) -> ISupport
    where
        I: IntoIterator<Item = (String, IsupportValue)>,
    {
        let mut next = self.clone();
        for (key, value) in params {
            match value {
                IsupportValue::Removed => {
                    next.params.remove(&key);
                }
                value => {
                    next.params.insert(key, value);
                }
            }
        }
        next
    }

    /// Value of a parameter, looked up case-insensitively.
    pub fn get(&self, key: &str) -> Option<&IsupportValue> {
        self.params.get(&key.to_ascii_uppercase())
    }

    /// Whether a parameter is currently advertised.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Iterate over all parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &IsupportValue)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of advertised parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Whether nothing has been advertised.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    fn int(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(IsupportValue::as_int)
    }

    /// `CHANMODES` groups, at least four.
    pub fn chanmodes(&self) -> Option<&[String]> {
        match self.get("CHANMODES") {
            Some(IsupportValue::ChanModes(groups)) => Some(groups),
            _ => None,
        }
    }

    /// `PREFIX` as `(mode, symbol)` pairs, highest privilege first.
    pub fn prefix(&self) -> Option<&[(char, char)]> {
        match self.get("PREFIX") {
            Some(IsupportValue::Prefix(pairs)) => Some(pairs),
            _ => None,
        }
    }

    /// `CHANTYPES`, or `#&+!` when not advertised.
    pub fn chantypes(&self) -> &str {
        match self.get("CHANTYPES") {
            Some(IsupportValue::Str(types)) => types,
            Some(IsupportValue::Flag) => "",
            _ => DEFAULT_CHANTYPES,
        }
    }

    /// `CASEMAPPING`, or `rfc1459` when not advertised.
    pub fn casemapping(&self) -> CaseMapping {
        self.get("CASEMAPPING")
            .and_then(IsupportValue::as_str)
            .map(CaseMapping::from_name)
            .unwrap_or_default()
    }

    /// `TARGMAX` entries.
    pub fn targmax(&self) -> Option<&[(String, Option<usize>)]> {
        match self.get("TARGMAX") {
            Some(IsupportValue::TargMax(entries)) => Some(entries),
            _ => None,
        }
    }

    /// `MAXLIST` entries.
    pub fn maxlist(&self) -> Option<&[(String, usize)]> {
        match self.get("MAXLIST") {
            Some(IsupportValue::MaxList(entries)) => Some(entries),
            _ => None,
        }
    }

    /// `CHANLIMIT` entries.
    pub fn chanlimit(&self) -> Option<&[(String, Option<usize>)]> {
        match self.get("CHANLIMIT") {
            Some(IsupportValue::ChanLimit(entries)) => Some(entries),
            _ => None,
        }
    }

    /// `LINELEN`, or 512.
    pub fn linelen(&self) -> usize {
        self.int("LINELEN").unwrap_or(DEFAULT_LINELEN)
    }

    /// `NICKLEN`.
    pub fn nicklen(&self) -> Option<usize> {
        self.int("NICKLEN")
    }

    /// `USERLEN`.
    pub fn userlen(&self) -> Option<usize> {
        self.int("USERLEN")
    }

    /// `MODES`, the number of parameter modes allowed per command.
    pub fn modes(&self) -> Option<usize> {
        self.int("MODES")
    }

    /// `NETWORK`.
    pub fn network(&self) -> Option<&str> {
        self.get("NETWORK").and_then(IsupportValue::as_str)
    }
}
