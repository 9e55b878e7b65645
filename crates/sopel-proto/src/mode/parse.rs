//! MODE string decoding.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::ModeParseError;
use crate::isupport::ISupport;

use super::types::{ModeMessage, ParamRequired, PrivilegeChange};

/// Default `CHANMODES` when the server does not announce them.
pub const DEFAULT_CHANMODES: [(char, &str); 4] =
    [('A', "beI"), ('B', "k"), ('C', "l"), ('D', "Oimnpsrt")];

/// Default parameter rule per mode type.
pub const DEFAULT_TYPE_PARAMS: [(char, ParamRequired); 4] = [
    ('A', ParamRequired::Always),
    ('B', ParamRequired::Always),
    ('C', ParamRequired::Added),
    ('D', ParamRequired::Never),
];

/// Default privilege modes (`PREFIX` letters).
pub const DEFAULT_PRIVILEGES: &str = "vhoaqyY";

/// Split a modestring into `(mode, added)` pairs.
///
/// `+` and `-` switch direction for the letters that follow; letters before
/// any sign count as added.
///
/// ```
/// use sopel_proto::mode::parse_modestring;
///
/// assert_eq!(parse_modestring("+a-b"), vec![('a', true), ('b', false)]);
/// assert_eq!(parse_modestring("a"), vec![('a', true)]);
/// ```
pub fn parse_modestring(modestring: &str) -> Vec<(char, bool)> {
    let mut added = true;
    let mut modes = Vec::with_capacity(modestring.len());
    for c in modestring.chars() {
        match c {
            '+' => added = true,
            '-' => added = false,
            mode => modes.push((mode, added)),
        }
    }
    modes
}

/// Decoder for MODE commands, configured from the server's ISUPPORT.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModeParser {
    chanmodes: BTreeMap<char, Vec<char>>,
    type_params: BTreeMap<char, ParamRequired>,
    privileges: BTreeSet<char>,
}

impl Default for ModeParser {
    fn default() -> Self {
        ModeParser {
            chanmodes: DEFAULT_CHANMODES
                .iter()
                .map(|(t, modes)| (*t, modes.chars().collect()))
                .collect(),
            type_params: DEFAULT_TYPE_PARAMS.iter().copied().collect(),
            privileges: DEFAULT_PRIVILEGES.chars().collect(),
        }
    }
}

impl ModeParser {
    /// Build a parser with explicit rules.
    pub fn new(
        chanmodes: BTreeMap<char, Vec<char>>,
        type_params: BTreeMap<char, ParamRequired>,
        privileges: BTreeSet<char>,
    ) -> Self {
        ModeParser {
            chanmodes,
            type_params,
            privileges,
        }
    }

    /// Build a parser with explicit mode types and the default privileges.
    pub fn with_chanmodes(
        chanmodes: BTreeMap<char, Vec<char>>,
        type_params: BTreeMap<char, ParamRequired>,
    ) -> Self {
        ModeParser {
            chanmodes,
            type_params,
            privileges: DEFAULT_PRIVILEGES.chars().collect(),
        }
    }

    /// Build a parser from server ISUPPORT, falling back to defaults for
    /// whatever the server did not announce.
    pub fn from_isupport(isupport: &ISupport) -> Self {
        let mut parser = ModeParser::default();
        parser.update_from_isupport(isupport);
        parser
    }

    /// Replace mode types and privileges with what ISUPPORT announces.
    ///
    /// `CHANMODES` groups map to types `A`, `B`, `C`, `D`, then `E` onward
    /// for extra groups; those extra types keep whatever parameter rule is
    /// already configured for them. `PREFIX` replaces the privileges.
    pub fn update_from_isupport(&mut self, isupport: &ISupport) {
        if let Some(groups) = isupport.chanmodes() {
            self.chanmodes = groups
                .iter()
                .enumerate()
                .map(|(i, modes)| (type_letter(i), modes.chars().collect()))
                .collect();
        }
        if let Some(prefix) = isupport.prefix() {
            self.privileges = prefix.iter().map(|(mode, _)| *mode).collect();
        }
    }

    /// Configured mode types.
    pub fn chanmodes(&self) -> &BTreeMap<char, Vec<char>> {
        &self.chanmodes
    }

    /// Configured privilege letters.
    pub fn privileges(&self) -> &BTreeSet<char> {
        &self.privileges
    }

    /// Type letter for a mode.
    ///
    /// Privileges are not part of any type and are reported as unknown.
    pub fn get_mode_type(&self, mode: char) -> Result<char, ModeParseError> {
        self.chanmodes
            .iter()
            .find(|(_, modes)| modes.contains(&mode))
            .map(|(letter, _)| *letter)
            .ok_or(ModeParseError::ModeTypeUnknown(mode))
    }

    /// Type letter and whether a parameter is required for this direction.
    pub fn get_mode_info(&self, mode: char, added: bool) -> Result<(char, bool), ModeParseError> {
        let letter = self.get_mode_type(mode)?;
        let rule = self
            .type_params
            .get(&letter)
            .ok_or(ModeParseError::ModeTypeImproperlyConfigured(letter))?;
        Ok((letter, rule.is_required(added)))
    }

    /// Decode a modestring and its parameters.
    ///
    /// Parameters are consumed left to right by privileges and by modes that
    /// require one. Modes whose parameter is missing end up in
    /// `ignored_modes`. An unknown mode, or one of a type with no parameter
    /// rule, stops the parsing: it and every mode after it are ignored, and
    /// the unconsumed parameters are left over.
    pub fn parse<S: AsRef<str>>(&self, modestring: &str, params: &[S]) -> ModeMessage {
        let mut message = ModeMessage::default();
        let mut params = params.iter().map(AsRef::as_ref);
        let mut modes = parse_modestring(modestring).into_iter();

        while let Some((mode, added)) = modes.next() {
            if self.privileges.contains(&mode) {
                match params.next() {
                    Some(target) => message.privileges.push(PrivilegeChange {
                        mode,
                        added,
                        target: target.to_owned(),
                    }),
                    None => message.ignored_modes.push((mode, added)),
                }
                continue;
            }

            let (letter, required) = match self.get_mode_info(mode, added) {
                Ok(info) => info,
                Err(_) => {
                    // parameter alignment is unknown from here on
                    message.ignored_modes.push((mode, added));
                    message.ignored_modes.extend(modes.by_ref());
                    break;
                }
            };

            if !required {
                message
                    .modes
                    .push(ModeMessage::change(letter, mode, added, None));
                continue;
            }

            match params.next() {
                Some(param) => message
                    .modes
                    .push(ModeMessage::change(letter, mode, added, Some(param))),
                None => message.ignored_modes.push((mode, added)),
            }
        }

        message.leftover_params = params.map(str::to_owned).collect();
        message
    }
}

fn type_letter(index: usize) -> char {
    char::from(b'A' + (index.min(25) as u8))
}
