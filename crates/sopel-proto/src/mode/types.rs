//! MODE parsing result types.

/// When a mode type consumes a parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamRequired {
    /// Both when added and when removed (list modes, keys).
    Always,
    /// Only when added (limits).
    Added,
    /// Only when removed.
    Removed,
    /// Never (flags).
    Never,
}

impl ParamRequired {
    /// Whether a parameter is consumed for the given direction.
    pub fn is_required(self, added: bool) -> bool {
        match self {
            ParamRequired::Always => true,
            ParamRequired::Added => added,
            ParamRequired::Removed => !added,
            ParamRequired::Never => false,
        }
    }
}

/// A channel mode change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModeChange {
    /// Type letter the mode belongs to (`A` to `D` for `CHANMODES`).
    pub mode_type: char,
    /// Mode letter.
    pub mode: char,
    /// `true` for `+`, `false` for `-`.
    pub added: bool,
    /// Parameter consumed by the mode, if any.
    pub param: Option<String>,
}

/// A privilege (channel membership prefix) change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrivilegeChange {
    /// Privilege mode letter (`o`, `v`, ...).
    pub mode: char,
    /// `true` for `+`, `false` for `-`.
    pub added: bool,
    /// Nick the privilege applies to.
    pub target: String,
}

/// Decoded MODE command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModeMessage {
    /// Recognized mode changes, in order.
    pub modes: Vec<ModeChange>,
    /// Modes that were unknown or lacked their parameter, as `(mode, added)`.
    pub ignored_modes: Vec<(char, bool)>,
    /// Privilege changes, in order.
    pub privileges: Vec<PrivilegeChange>,
    /// Parameters left after every mode took what it needed.
    pub leftover_params: Vec<String>,
}

impl ModeMessage {
    /// Build a mode change entry.
    pub(crate) fn change(mode_type: char, mode: char, added: bool, param: Option<&str>) -> ModeChange {
        ModeChange {
            mode_type,
            mode,
            added,
            param: param.map(str::to_owned),
        }
    }
}
