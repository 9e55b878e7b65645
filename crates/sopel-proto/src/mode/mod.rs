//! Channel MODE decoding.
//!
//! A MODE command carries a modestring such as `+ov-k` followed by the
//! parameters its letters consume. Which letters take a parameter depends on
//! the server's `CHANMODES` and `PREFIX` tokens, so the [`ModeParser`] is
//! rebuilt whenever ISUPPORT changes.

mod parse;
mod types;

pub use self::parse::{
    parse_modestring, ModeParser, DEFAULT_CHANMODES, DEFAULT_PRIVILEGES, DEFAULT_TYPE_PARAMS,
};
pub use self::types::{ModeChange, ModeMessage, ParamRequired, PrivilegeChange};
