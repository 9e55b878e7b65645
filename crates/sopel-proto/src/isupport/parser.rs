//! ISUPPORT token parsing.

use crate::error::IsupportError;

use super::tokens::{decode_value, IsupportValue};

/// Parse a single `RPL_ISUPPORT` token.
///
/// `-KEY` withdraws a parameter, a bare `KEY` is a flag and `KEY=value` is
/// decoded according to the key. The key is upper-cased and must only contain
/// ASCII letters and digits.
///
/// ```
/// use sopel_proto::isupport::{parse_parameter, IsupportValue};
///
/// assert_eq!(
///     parse_parameter("nicklen=30").unwrap(),
///     ("NICKLEN".to_string(), IsupportValue::Int(30))
/// );
/// assert_eq!(
///     parse_parameter("-EXCEPTS").unwrap(),
///     ("EXCEPTS".to_string(), IsupportValue::Removed)
/// );
/// ```
pub fn parse_parameter(token: &str) -> Result<(String, IsupportValue), IsupportError> {
    if let Some(key) = token.strip_prefix('-') {
        return Ok((validate_key(key, token)?, IsupportValue::Removed));
    }

    match token.split_once('=') {
        None => Ok((validate_key(token, token)?, IsupportValue::Flag)),
        Some((key, raw)) => {
            let key = validate_key(key, token)?;
            let value = decode_value(&key, &unescape_value(raw))?;
            Ok((key, value))
        }
    }
}

/// Extract the parameter tokens from `RPL_ISUPPORT` arguments.
///
/// The first argument is our own nick and the last one, when it contains a
/// space, is the human-readable "are supported by this server" text.
pub fn response_tokens<S: AsRef<str>>(args: &[S]) -> &[S] {
    let Some((_, tokens)) = args.split_first() else {
        return args;
    };
    match tokens.split_last() {
        Some((last, rest)) if last.as_ref().contains(' ') => rest,
        _ => tokens,
    }
}

/// Decode `\xHH` escapes in a parameter value.
///
/// Malformed escapes are kept as-is; decoded bytes that are not valid UTF-8
/// are replaced.
pub fn unescape_value(raw: &str) -> String {
    if !raw.contains("\\x") {
        return raw.to_owned();
    }

    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && bytes.get(i + 1) == Some(&b'x') {
            let decoded = bytes
                .get(i + 2..i + 4)
                .and_then(|hex| std::str::from_utf8(hex).ok())
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(byte) = decoded {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn validate_key(key: &str, token: &str) -> Result<String, IsupportError> {
    if key.is_empty() || !key.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(IsupportError::InvalidToken(token.to_owned()));
    }
    Ok(key.to_ascii_uppercase())
}
