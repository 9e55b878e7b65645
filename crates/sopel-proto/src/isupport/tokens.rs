//! Typed ISUPPORT values.

use crate::error::IsupportError;

/// Parameters whose value is a plain integer.
pub const INTEGER_KEYS: &[&str] = &[
    "AWAYLEN",
    "CHANNELLEN",
    "HOSTLEN",
    "KICKLEN",
    "LINELEN",
    "MAXBANS",
    "MAXCHANNELS",
    "MAXNICKLEN",
    "MAXTARGETS",
    "MODES",
    "MONITOR",
    "NICKLEN",
    "SILENCE",
    "TOPICLEN",
    "USERLEN",
    "WATCH",
];

/// Decoded value of an ISUPPORT parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IsupportValue {
    /// Parameter advertised without a value.
    Flag,
    /// Parameter withdrawn by the server (`-KEY`).
    Removed,
    /// Integer parameter (`NICKLEN=30`).
    Int(usize),
    /// Any parameter without a dedicated decoder.
    Str(String),
    /// `CHANLIMIT=#&:100,+:` as `(prefixes, limit)`; empty limit means none.
    ChanLimit(Vec<(String, Option<usize>)>),
    /// `CHANMODES=A,B,C,D[,...]`, always at least four groups.
    ChanModes(Vec<String>),
    /// `PREFIX=(ov)@+` as `(mode, symbol)` pairs, highest first.
    Prefix(Vec<(char, char)>),
    /// `TARGMAX=PRIVMSG:4,JOIN:` as `(command, limit)`.
    TargMax(Vec<(String, Option<usize>)>),
    /// `MAXLIST=beI:100` as `(modes, limit)`.
    MaxList(Vec<(String, usize)>),
    /// `ELIST=CMNTU`, letters sorted and upper-cased.
    Elist(String),
    /// `EXTBAN=~,qjnr` as optional prefix and sorted types.
    Extban(Option<char>, String),
}

impl IsupportValue {
    /// Integer value, if this is [`IsupportValue::Int`].
    pub fn as_int(&self) -> Option<usize> {
        match self {
            IsupportValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// String value, if this is [`IsupportValue::Str`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            IsupportValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// Decode a raw (already unescaped) value according to its key.
pub(crate) fn decode_value(key: &str, raw: &str) -> Result<IsupportValue, IsupportError> {
    let invalid = || IsupportError::InvalidValue {
        key: key.to_owned(),
        value: raw.to_owned(),
    };

    if INTEGER_KEYS.contains(&key) {
        return raw.parse().map(IsupportValue::Int).map_err(|_| invalid());
    }

    match key {
        "CHANLIMIT" => parse_limits(raw)
            .map(IsupportValue::ChanLimit)
            .ok_or_else(invalid),
        "CHANMODES" => {
            let mut groups: Vec<String> = raw.split(',').map(str::to_owned).collect();
            if groups.len() < 4 {
                groups.resize(4, String::new());
            }
            Ok(IsupportValue::ChanModes(groups))
        }
        "PREFIX" => parse_prefix(raw)
            .map(IsupportValue::Prefix)
            .ok_or_else(invalid),
        "TARGMAX" => parse_limits(raw)
            .map(IsupportValue::TargMax)
            .ok_or_else(invalid),
        "MAXLIST" => parse_maxlist(raw)
            .map(IsupportValue::MaxList)
            .ok_or_else(invalid),
        "ELIST" => {
            let mut letters: Vec<char> = raw.to_ascii_uppercase().chars().collect();
            letters.sort_unstable();
            Ok(IsupportValue::Elist(letters.into_iter().collect()))
        }
        "EXTBAN" => {
            let (prefix, types) = raw.split_once(',').ok_or_else(invalid)?;
            let mut types: Vec<char> = types.chars().collect();
            types.sort_unstable();
            Ok(IsupportValue::Extban(
                prefix.chars().next(),
                types.into_iter().collect(),
            ))
        }
        _ => Ok(IsupportValue::Str(raw.to_owned())),
    }
}

fn parse_prefix(raw: &str) -> Option<Vec<(char, char)>> {
    if raw.is_empty() {
        return Some(Vec::new());
    }
    let rest = raw.strip_prefix('(')?;
    let (modes, symbols) = rest.split_once(')')?;
    if modes.chars().count() != symbols.chars().count() {
        return None;
    }
    Some(modes.chars().zip(symbols.chars()).collect())
}

fn parse_limits(raw: &str) -> Option<Vec<(String, Option<usize>)>> {
    let mut entries = Vec::new();
    for part in raw.split(',').filter(|p| !p.is_empty()) {
        let (name, limit) = part.split_once(':')?;
        let limit = match limit {
            "" => None,
            n => Some(n.parse().ok()?),
        };
        entries.push((name.to_owned(), limit));
    }
    Some(entries)
}

fn parse_maxlist(raw: &str) -> Option<Vec<(String, usize)>> {
    raw.split(',')
        .filter(|p| !p.is_empty())
        .map(|part| {
            let (modes, limit) = part.split_once(':')?;
            Some((modes.to_owned(), limit.parse().ok()?))
        })
        .collect()
}
