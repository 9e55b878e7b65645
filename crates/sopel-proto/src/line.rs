//! Line framing and decoding.
//!
//! IRC has no declared encoding. Lines are tried as UTF-8 first, then as
//! Windows-1252, and finally as ISO-8859-1, which accepts every byte.

use std::borrow::Cow;

#[cfg(feature = "tokio")]
use bytes::BytesMut;
use encoding::WINDOWS_1252;
#[cfg(feature = "tokio")]
use tokio_util::codec::{Decoder, Encoder};

#[cfg(feature = "tokio")]
use crate::error;

/// Maximum inbound line length, including message tags.
pub const MAX_LINE_LEN: usize = 8191;

/// Decode raw line bytes and strip the trailing CR/LF.
///
/// ```
/// use sopel_proto::line::decode_line;
///
/// assert_eq!(decode_line(b"PING :server\r\n"), "PING :server");
/// assert_eq!(decode_line(b"caf\xe9"), "café");
/// ```
pub fn decode_line(raw: &[u8]) -> String {
    let raw = trim_line_ending(raw);
    if let Ok(text) = std::str::from_utf8(raw) {
        return text.to_owned();
    }
    match WINDOWS_1252.decode_without_bom_handling_and_without_replacement(raw) {
        Some(text) => text.into_owned(),
        None => decode_latin1(raw).into_owned(),
    }
}

fn decode_latin1(raw: &[u8]) -> Cow<'_, str> {
    Cow::Owned(raw.iter().map(|&b| char::from(b)).collect())
}

fn trim_line_ending(mut raw: &[u8]) -> &[u8] {
    while let [rest @ .., b'\r' | b'\n'] = raw {
        raw = rest;
    }
    raw
}

/// Codec splitting a byte stream on `\n` into decoded lines.
#[cfg(feature = "tokio")]
#[derive(Debug)]
pub struct LineCodec {
    /// Index of next byte to check for newline
    next_index: usize,
    max_len: usize,
}

#[cfg(feature = "tokio")]
impl Default for LineCodec {
    fn default() -> Self {
        Self::with_max_len(MAX_LINE_LEN)
    }
}

#[cfg(feature = "tokio")]
impl LineCodec {
    /// Codec with the default line limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Codec with a custom line limit.
    pub fn with_max_len(max_len: usize) -> Self {
        LineCodec {
            next_index: 0,
            max_len,
        }
    }
}

#[cfg(feature = "tokio")]
impl Decoder for LineCodec {
    type Item = String;
    type Error = error::ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> error::Result<Option<String>> {
        if let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') {
            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;

            if line.len() > self.max_len {
                return Err(error::ProtocolError::MessageTooLong {
                    actual: line.len(),
                    limit: self.max_len,
                });
            }

            Ok(Some(decode_line(&line)))
        } else {
            self.next_index = src.len();

            if src.len() > self.max_len {
                return Err(error::ProtocolError::MessageTooLong {
                    actual: src.len(),
                    limit: self.max_len,
                });
            }

            Ok(None)
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> error::Result<Option<String>> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if src.is_empty() {
            return Ok(None);
        }

        // the server closed the connection mid-line
        let partial = src.split_to(src.len());
        self.next_index = 0;
        tracing::warn!(len = partial.len(), "received partial line from server");
        Ok(Some(decode_line(&partial)))
    }
}

#[cfg(feature = "tokio")]
impl Encoder<String> for LineCodec {
    type Error = error::ProtocolError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> error::Result<()> {
        dst.extend_from_slice(line.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_fallbacks() {
        assert_eq!(decode_line("héllo\r\n".as_bytes()), "héllo");
        // 0x80 is the euro sign in Windows-1252
        assert_eq!(decode_line(b"\x80 5"), "€ 5");
        assert_eq!(decode_line(b"\xe9t\xe9"), "été");
        assert_eq!(decode_line(b"\n"), "");
    }

    #[test]
    fn test_latin1_accepts_everything() {
        let bytes: Vec<u8> = (0u8..=255).collect();
        assert_eq!(decode_latin1(&bytes).chars().count(), 256);
    }

    #[cfg(feature = "tokio")]
    mod codec {
        use super::super::*;

        #[test]
        fn test_decode_complete_line() {
            let mut codec = LineCodec::new();
            let mut buf = BytesMut::from("PING :test\r\nPING");

            assert_eq!(codec.decode(&mut buf).unwrap(), Some("PING :test".to_string()));
            assert_eq!(codec.decode(&mut buf).unwrap(), None);
            buf.extend_from_slice(b" :again\n");
            assert_eq!(codec.decode(&mut buf).unwrap(), Some("PING :again".to_string()));
            assert!(buf.is_empty());
        }

        #[test]
        fn test_decode_too_long() {
            let mut codec = LineCodec::with_max_len(10);
            let mut buf = BytesMut::from("this is way too long\n");
            assert!(matches!(
                codec.decode(&mut buf),
                Err(error::ProtocolError::MessageTooLong { actual: 21, limit: 10 })
            ));

            let mut codec = LineCodec::with_max_len(10);
            let mut partial = BytesMut::from("no newline yet, still growing");
            assert!(codec.decode(&mut partial).is_err());
        }

        #[test]
        fn test_decode_eof_keeps_partial_line() {
            let mut codec = LineCodec::new();
            let mut buf = BytesMut::from("PING :one\r\nERROR :cut sh");
            assert_eq!(codec.decode_eof(&mut buf).unwrap(), Some("PING :one".to_string()));
            assert_eq!(codec.decode_eof(&mut buf).unwrap(), Some("ERROR :cut sh".to_string()));
            assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
        }

        #[test]
        fn test_encode() {
            let mut codec = LineCodec::new();
            let mut buf = BytesMut::new();
            codec.encode("PONG :test\r\n".to_string(), &mut buf).unwrap();
            assert_eq!(&buf[..], b"PONG :test\r\n");
        }
    }
}
