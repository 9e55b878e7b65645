//! SASL helpers for the `AUTHENTICATE` exchange.
//!
//! # Reference
//! - IRCv3 SASL: <https://ircv3.net/specs/extensions/sasl-3.1>
//! - RFC 4616 (PLAIN): <https://tools.ietf.org/html/rfc4616>

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

/// Maximum length of a single `AUTHENTICATE` payload.
pub const SASL_CHUNK_SIZE: usize = 400;

/// SASL mechanisms the bot knows how to drive.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SaslMechanism {
    /// Username and password.
    Plain,
    /// TLS client certificate.
    External,
    /// Anything else, sent to the server as-is.
    Unknown(String),
}

impl SaslMechanism {
    /// Parse a mechanism name, case-insensitively.
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "PLAIN" => Self::Plain,
            "EXTERNAL" => Self::External,
            _ => Self::Unknown(name.to_owned()),
        }
    }

    /// Name as sent in `AUTHENTICATE`.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Plain => "PLAIN",
            Self::External => "EXTERNAL",
            Self::Unknown(s) => s,
        }
    }
}

impl fmt::Display for SaslMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse the mechanism list advertised in `sasl=...` or `RPL_SASLMECHS`.
pub fn parse_mechanisms(list: &str) -> Vec<SaslMechanism> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(SaslMechanism::parse)
        .collect()
}

/// Encode PLAIN credentials as `base64(authzid NUL authcid NUL password)`.
///
/// ```
/// use sopel_proto::sasl::encode_plain;
///
/// assert_eq!(
///     encode_plain("TestBot", "TestBot", "secret"),
///     "VGVzdEJvdABUZXN0Qm90AHNlY3JldA=="
/// );
/// ```
pub fn encode_plain(authzid: &str, authcid: &str, password: &str) -> String {
    let payload = format!("{}\0{}\0{}", authzid, authcid, password);
    BASE64.encode(payload.as_bytes())
}

/// Split an encoded response into `AUTHENTICATE` payloads.
///
/// Payloads are at most 400 bytes. A lone `+` follows when the last chunk is
/// exactly 400 bytes, and an empty response is sent as `+`.
pub fn chunk_response(encoded: &str) -> Vec<String> {
    if encoded.is_empty() {
        return vec!["+".to_owned()];
    }

    let mut chunks: Vec<String> = encoded
        .as_bytes()
        .chunks(SASL_CHUNK_SIZE)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect();
    if encoded.len() % SASL_CHUNK_SIZE == 0 {
        chunks.push("+".to_owned());
    }
    chunks
}

/// Decode a server challenge; `+` is the empty challenge.
pub fn decode_challenge(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    if encoded == "+" {
        return Ok(Vec::new());
    }
    BASE64.decode(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mechanism_parse() {
        assert_eq!(SaslMechanism::parse("plain"), SaslMechanism::Plain);
        assert_eq!(SaslMechanism::parse("EXTERNAL"), SaslMechanism::External);
        assert_eq!(
            SaslMechanism::parse("SCRAM-SHA-256"),
            SaslMechanism::Unknown("SCRAM-SHA-256".into())
        );
        assert_eq!(SaslMechanism::External.to_string(), "EXTERNAL");
    }

    #[test]
    fn test_parse_mechanisms() {
        assert_eq!(
            parse_mechanisms("EXTERNAL, PLAIN,"),
            vec![SaslMechanism::External, SaslMechanism::Plain]
        );
        assert!(parse_mechanisms("").is_empty());
    }

    #[test]
    fn test_encode_plain() {
        let encoded = encode_plain("user", "user", "pass");
        assert_eq!(decode_challenge(&encoded).unwrap(), b"user\0user\0pass");
    }

    #[test]
    fn test_chunking() {
        assert_eq!(chunk_response("abcd"), vec!["abcd"]);
        assert_eq!(chunk_response(""), vec!["+"]);

        let exact = "a".repeat(400);
        assert_eq!(chunk_response(&exact), vec![exact.clone(), "+".to_string()]);

        let long = "b".repeat(401);
        let chunks = chunk_response(&long);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 400);
        assert_eq!(chunks[1], "b");
    }

    #[test]
    fn test_decode_challenge() {
        assert!(decode_challenge("+").unwrap().is_empty());
        assert!(decode_challenge("!!").is_err());
    }
}
