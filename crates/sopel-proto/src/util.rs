//! Helpers for building outbound lines.

/// Maximum length of a line without its CR-LF, in bytes.
pub const MAX_COMMAND_LEN: usize = 510;

/// Remove characters that would break out of a single IRC line.
///
/// ```
/// use sopel_proto::util::safe;
///
/// assert_eq!(safe("evil\r\nQUIT\0"), "evilQUIT");
/// ```
pub fn safe(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '\r' | '\n' | '\0'))
        .collect()
}

/// Truncate to at most `max_bytes` bytes without splitting a character.
#[inline]
pub fn truncate_utf8_safe(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Join a command and its arguments into a raw line ending with CR-LF.
///
/// `text` becomes the trailing parameter after being made [`safe`]. The line
/// is cut, on a character boundary, to 510 bytes before CR-LF is appended.
/// Arguments are used as given; callers sanitize them.
///
/// ```
/// use sopel_proto::util::prepare_command;
///
/// assert_eq!(prepare_command(&["NICK", "Sopel"], None), "NICK Sopel\r\n");
/// assert_eq!(
///     prepare_command(&["PRIVMSG", "#sopel"], Some("hi\nthere")),
///     "PRIVMSG #sopel :hithere\r\n"
/// );
/// ```
pub fn prepare_command<S: AsRef<str>>(args: &[S], text: Option<&str>) -> String {
    let mut raw = String::with_capacity(MAX_COMMAND_LEN + 2);
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            raw.push(' ');
        }
        raw.push_str(arg.as_ref());
    }
    if let Some(text) = text {
        raw.push_str(" :");
        raw.push_str(&safe(text));
    }

    let len = truncate_utf8_safe(&raw, MAX_COMMAND_LEN).len();
    raw.truncate(len);
    raw.push_str("\r\n");
    raw
}

/// Split `text` so the first part fits in `max_bytes` bytes.
///
/// The split happens at the last space that keeps the first part within the
/// limit, or at the last character boundary when there is none. Leading
/// spaces are removed from the excess.
///
/// ```
/// use sopel_proto::util::get_sendable_message;
///
/// assert_eq!(
///     get_sendable_message("hello world", 8),
///     ("hello".to_string(), "world".to_string())
/// );
/// assert_eq!(
///     get_sendable_message("short", 400),
///     ("short".to_string(), String::new())
/// );
/// ```
pub fn get_sendable_message(text: &str, max_bytes: usize) -> (String, String) {
    if text.len() <= max_bytes {
        return (text.to_owned(), String::new());
    }

    let window = truncate_utf8_safe(text, max_bytes);
    let split_at = match window.rfind(' ') {
        Some(index) if index > 0 => index,
        _ => window.len(),
    };
    let (head, excess) = text.split_at(split_at);
    (head.to_owned(), excess.trim_start_matches(' ').to_owned())
}
