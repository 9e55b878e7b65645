//! Channel and user state tracked from server messages.

use sopel_proto::Identifier;
use sopel_proto::mode::ModeMessage;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::{BitOr, BitOrAssign};

/// Channel privilege flags, ordered so a higher value outranks a lower one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Privileges(u8);

impl Privileges {
    pub const NONE: Self = Self(0);
    pub const VOICE: Self = Self(1);
    pub const HALFOP: Self = Self(1 << 1);
    pub const OP: Self = Self(1 << 2);
    pub const ADMIN: Self = Self(1 << 3);
    pub const OWNER: Self = Self(1 << 4);
    pub const OPER: Self = Self(1 << 5);

    /// Privilege granted by a PREFIX mode letter.
    pub fn from_mode(mode: char) -> Option<Self> {
        match mode {
            'v' => Some(Self::VOICE),
            'h' => Some(Self::HALFOP),
            'o' => Some(Self::OP),
            'a' => Some(Self::ADMIN),
            'q' => Some(Self::OWNER),
            'y' | 'Y' => Some(Self::OPER),
            _ => None,
        }
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl BitOr for Privileges {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Privileges {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Value of a channel mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeValue {
    /// Type D: set or not.
    Flag,
    /// Types B and C: one parameter.
    Param(String),
    /// Type A: a list of masks.
    List(BTreeSet<String>),
}

/// A user the bot shares a channel with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub nick: Identifier,
    pub user: Option<String>,
    pub host: Option<String>,
    #[allow(dead_code)] // read by plugins
    pub realname: Option<String>,
    pub account: Option<String>,
    #[allow(dead_code)] // read by plugins
    pub away: bool,
    pub channels: BTreeSet<Identifier>,
}

impl User {
    pub fn new(nick: Identifier) -> Self {
        Self {
            nick,
            user: None,
            host: None,
            realname: None,
            account: None,
            away: false,
            channels: BTreeSet::new(),
        }
    }

    /// `nick!user@host`, when both user and host are known.
    pub fn hostmask(&self) -> Option<String> {
        match (&self.user, &self.host) {
            (Some(user), Some(host)) => Some(format!("{}!{}@{}", self.nick, user, host)),
            _ => None,
        }
    }
}

/// A joined channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub name: Identifier,
    pub users: HashMap<Identifier, Privileges>,
    pub modes: BTreeMap<char, ModeValue>,
    #[allow(dead_code)] // read by plugins
    pub topic: String,
}

impl Channel {
    pub fn new(name: Identifier) -> Self {
        Self {
            name,
            users: HashMap::new(),
            modes: BTreeMap::new(),
            topic: String::new(),
        }
    }

    /// Add `nick`, merging privileges if already present.
    pub fn add_user(&mut self, nick: Identifier, privileges: Privileges) {
        *self.users.entry(nick).or_default() |= privileges;
    }

    pub fn remove_user(&mut self, nick: &Identifier) -> bool {
        self.users.remove(nick).is_some()
    }

    pub fn rename_user(&mut self, old: &Identifier, new: Identifier) {
        if let Some(privileges) = self.users.remove(old) {
            self.users.insert(new, privileges);
        }
    }

    #[allow(dead_code)] // plugin API
    pub fn has_user(&self, nick: &Identifier) -> bool {
        self.users.contains_key(nick)
    }

    pub fn privileges(&self, nick: &Identifier) -> Privileges {
        self.users.get(nick).copied().unwrap_or_default()
    }

    /// Whether `nick` holds `level` or anything ranked above it.
    #[allow(dead_code)] // plugin API
    pub fn has_privilege(&self, nick: &Identifier, level: Privileges) -> bool {
        self.privileges(nick).bits() >= level.bits()
    }

    /// Apply a parsed MODE line.
    ///
    /// Privilege targets are built with `make_identifier`. Modes of types
    /// other than A to D are left out and returned.
    pub fn apply_modes(
        &mut self,
        message: &ModeMessage,
        make_identifier: impl Fn(&str) -> Identifier,
    ) -> Vec<(char, bool)> {
        let mut skipped = Vec::new();

        for change in &message.modes {
            match (change.mode_type, change.added, &change.param) {
                ('A', added, Some(mask)) => {
                    let entry = self
                        .modes
                        .entry(change.mode)
                        .or_insert_with(|| ModeValue::List(BTreeSet::new()));
                    if let ModeValue::List(masks) = entry {
                        if added {
                            masks.insert(mask.clone());
                        } else {
                            masks.remove(mask);
                        }
                    }
                }
                ('B' | 'C', true, Some(param)) => {
                    self.modes.insert(change.mode, ModeValue::Param(param.clone()));
                }
                ('B' | 'C' | 'D', false, _) => {
                    self.modes.remove(&change.mode);
                }
                ('D', true, _) => {
                    self.modes.insert(change.mode, ModeValue::Flag);
                }
                _ => skipped.push((change.mode, change.added)),
            }
        }

        for change in &message.privileges {
            let Some(privilege) = Privileges::from_mode(change.mode) else {
                skipped.push((change.mode, change.added));
                continue;
            };
            let target = make_identifier(&change.target);
            let Some(current) = self.users.get_mut(&target) else {
                continue;
            };
            if change.added {
                current.insert(privilege);
            } else {
                current.remove(privilege);
            }
        }

        skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sopel_proto::ModeParser;

    fn id(name: &str) -> Identifier {
        Identifier::new(name)
    }

    #[test]
    fn test_privilege_ranking() {
        let mut channel = Channel::new(id("#sopel"));
        channel.add_user(id("Alice"), Privileges::OP);
        channel.add_user(id("Bob"), Privileges::VOICE);
        channel.add_user(id("Bob"), Privileges::HALFOP);

        assert!(channel.has_privilege(&id("alice"), Privileges::HALFOP));
        assert!(channel.has_privilege(&id("Bob"), Privileges::HALFOP));
        assert!(!channel.has_privilege(&id("Bob"), Privileges::OP));
        assert!(channel.privileges(&id("Bob")).contains(Privileges::VOICE));
        assert_eq!(channel.privileges(&id("Carol")), Privileges::NONE);
    }

    #[test]
    fn test_rename_keeps_privileges() {
        let mut channel = Channel::new(id("#sopel"));
        channel.add_user(id("Alice"), Privileges::OP);
        channel.rename_user(&id("Alice"), id("Alicia"));
        assert!(!channel.has_user(&id("Alice")));
        assert_eq!(channel.privileges(&id("Alicia")), Privileges::OP);
    }

    #[test]
    fn test_apply_modes() {
        let parser = ModeParser::default();
        let mut channel = Channel::new(id("#sopel"));
        channel.add_user(id("Alice"), Privileges::NONE);

        let parsed = parser.parse("+ntkbo-v", &["hunter2", "*!*@spam", "Alice", "Bob"]);
        let skipped = channel.apply_modes(&parsed, id);

        assert!(skipped.is_empty());
        assert_eq!(channel.modes.get(&'n'), Some(&ModeValue::Flag));
        assert_eq!(
            channel.modes.get(&'k'),
            Some(&ModeValue::Param("hunter2".into()))
        );
        assert_eq!(
            channel.modes.get(&'b'),
            Some(&ModeValue::List(BTreeSet::from(["*!*@spam".to_string()])))
        );
        assert_eq!(channel.privileges(&id("Alice")), Privileges::OP);

        let parsed = parser.parse("-kb", &["hunter2", "*!*@spam"]);
        channel.apply_modes(&parsed, id);
        assert!(!channel.modes.contains_key(&'k'));
        assert_eq!(channel.modes.get(&'b'), Some(&ModeValue::List(BTreeSet::new())));
    }

    #[test]
    fn test_user_hostmask() {
        let mut user = User::new(id("Alice"));
        assert_eq!(user.hostmask(), None);
        user.user = Some("alice".into());
        user.host = Some("example.com".into());
        assert_eq!(user.hostmask().as_deref(), Some("Alice!alice@example.com"));
    }
}
