//! Property-based tests for parsing and outbound line helpers.
//!
//! Uses proptest to generate random inputs and verify that:
//! 1. Parsers never panic on arbitrary input
//! 2. Mode parsing accounts for every letter and parameter
//! 3. Outbound lines never exceed the protocol limit

use proptest::prelude::*;
use sopel_proto::isupport::parse_parameter;
use sopel_proto::mode::parse_modestring;
use sopel_proto::{decode_line, get_sendable_message, prepare_command, Message, ModeParser};

/// Mode letters the default parser knows, plus a few it does not.
fn modestring_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[+-]?[beIklOimnpsrtvhoqZX+-]{0,12}").expect("valid regex")
}

fn param_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(
        prop::string::string_regex("[a-zA-Z0-9#]{1,8}").expect("valid regex"),
        0..8,
    )
}

fn text_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zé€ 🦀\r\n]{0,700}").expect("valid regex")
}

proptest! {
    #[test]
    fn message_parse_never_panics(raw in "\\PC{0,600}") {
        let _ = raw.parse::<Message>();
    }

    #[test]
    fn isupport_parse_never_panics(token in "\\PC{0,60}") {
        let _ = parse_parameter(&token);
    }

    #[test]
    fn decode_line_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..600)) {
        let line = decode_line(&bytes);
        prop_assert!(!line.ends_with('\n'));
    }

    #[test]
    fn mode_parse_accounts_for_everything(
        modestring in modestring_strategy(),
        params in param_strategy(),
    ) {
        let parser = ModeParser::default();
        let result = parser.parse(&modestring, &params);

        let letters = parse_modestring(&modestring).len();
        prop_assert_eq!(
            result.modes.len() + result.privileges.len() + result.ignored_modes.len(),
            letters
        );

        let consumed = result.modes.iter().filter(|m| m.param.is_some()).count()
            + result.privileges.len();
        prop_assert_eq!(consumed + result.leftover_params.len(), params.len());
    }

    #[test]
    fn prepared_lines_fit(text in text_strategy()) {
        let line = prepare_command(&["PRIVMSG", "#sopel"], Some(&text));
        prop_assert!(line.len() <= 512);
        prop_assert!(line.ends_with("\r\n"));
        prop_assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn sendable_message_fits(text in text_strategy(), max in 4usize..400) {
        let (head, _excess) = get_sendable_message(&text, max);
        prop_assert!(head.len() <= max);
    }
}
