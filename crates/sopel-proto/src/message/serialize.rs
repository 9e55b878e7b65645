//! Wire serialization for `Message`.

use std::fmt::{self, Display, Formatter};

use super::tags::escape_tag_value;
use super::types::Message;

impl Display for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(tags) = self.tags.as_ref().filter(|t| !t.is_empty()) {
            f.write_str("@")?;
            for (i, tag) in tags.iter().enumerate() {
                if i > 0 {
                    f.write_str(";")?;
                }
                f.write_str(&tag.0)?;
                if let Some(value) = &tag.1 {
                    f.write_str("=")?;
                    escape_tag_value(f, value)?;
                }
            }
            f.write_str(" ")?;
        }

        if let Some(prefix) = &self.prefix {
            write!(f, ":{} ", prefix)?;
        }

        f.write_str(&self.command)?;

        if let Some((last, middle)) = self.params.split_last() {
            for param in middle {
                write!(f, " {}", param)?;
            }
            if last.is_empty() || last.contains(' ') || last.starts_with(':') {
                write!(f, " :{}", last)?;
            } else {
                write!(f, " {}", last)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::Message;

    #[test]
    fn test_display_trailing() {
        let msg: Message = ":nick!u@h PRIVMSG #chan :hello world".parse().unwrap();
        assert_eq!(msg.to_string(), ":nick!u@h PRIVMSG #chan :hello world");
    }

    #[test]
    fn test_display_plain_last_param() {
        let msg: Message = "JOIN :#chan".parse().unwrap();
        assert_eq!(msg.to_string(), "JOIN #chan");
    }

    #[test]
    fn test_display_tags_escaped() {
        let msg = Message::new(None, "TAGMSG", ["#a"]).with_tag("+note", Some("a b;c"));
        assert_eq!(msg.to_string(), "@+note=a\\sb\\:c TAGMSG #a");
    }

    #[test]
    fn test_display_empty_trailing() {
        let msg = Message::new(None, "CAP", ["*", "LS", ""]);
        assert_eq!(msg.to_string(), "CAP * LS :");
    }
}
