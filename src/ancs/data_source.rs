//! Streamed Data Source parser.
//!
//! A Get Notification Attributes response looks like
//!
//! ```text
//! CommandID | NotificationUID (4, LE) | { AttributeID | Length (2, LE) | Data } ...
//! ```
//!
//! with one tuple per requested attribute, and the phone splits it over
//! as many GATT notifications as the MTU requires - split points fall
//! anywhere, including inside the UID or a length field. The parser is a
//! byte-wise state machine so every split is handled the same way.
//!
//! The peer is untrusted: attribute data beyond the attribute's
//! registered cap is consumed but not stored, so an oversized length can
//! never overflow a buffer nor desynchronise the stream.

use heapless::Vec;

use super::protocol::{AttributeId, CommandId, REQUESTED_ATTRIBUTES};
use crate::config::ATTR_MESSAGE_SIZE;
use crate::error::Error;

/// Largest attribute cap (Message).
const MAX_ATTRIBUTE_LEN: usize = ATTR_MESSAGE_SIZE;

/// One attribute of one notification, borrowed from the parser buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttributeFragment<'a> {
    pub uid: u32,
    pub attribute: AttributeId,
    /// Attribute bytes, at most `attribute.capacity()` long.
    pub data: &'a [u8],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ParseState {
    Command,
    Uid { filled: usize },
    AttributeId,
    LengthLow,
    LengthHigh { low: u8 },
    Data { remaining: usize },
}

pub struct DataSourceParser {
    state: ParseState,
    uid_bytes: [u8; 4],
    attribute: AttributeId,
    /// Attributes completed in the current response.
    completed: usize,
    buffer: Vec<u8, MAX_ATTRIBUTE_LEN>,
}

impl DataSourceParser {
    pub const fn new() -> Self {
        Self {
            state: ParseState::Command,
            uid_bytes: [0; 4],
            attribute: AttributeId::AppIdentifier,
            completed: 0,
            buffer: Vec::new(),
        }
    }

    /// Discard any partially received response.
    pub fn reset(&mut self) {
        self.state = ParseState::Command;
        self.completed = 0;
        self.buffer.clear();
    }

    /// True when no response is partially received.
    pub fn is_idle(&self) -> bool {
        self.state == ParseState::Command
    }

    /// Feed one Data Source notification.
    ///
    /// `on_fragment` is called once per completed attribute, in stream
    /// order. An unknown or unsupported CommandID aborts the response: the
    /// rest of `data` is dropped and the parser waits for a new command.
    pub fn feed<F>(&mut self, data: &[u8], mut on_fragment: F) -> Result<(), Error>
    where
        F: FnMut(AttributeFragment<'_>),
    {
        for &byte in data {
            match self.state {
                ParseState::Command => match CommandId::try_from(byte) {
                    Ok(CommandId::GetNotificationAttributes) => {
                        self.completed = 0;
                        self.state = ParseState::Uid { filled: 0 };
                    }
                    Ok(_) => {
                        warn!("Data Source: unsupported command {}", byte);
                        return Err(Error::UnknownCommand(byte));
                    }
                    Err(e) => {
                        warn!("Data Source: unknown command {}", byte);
                        return Err(e);
                    }
                },
                ParseState::Uid { filled } => {
                    self.uid_bytes[filled] = byte;
                    self.state = if filled + 1 == self.uid_bytes.len() {
                        ParseState::AttributeId
                    } else {
                        ParseState::Uid { filled: filled + 1 }
                    };
                }
                ParseState::AttributeId => {
                    self.attribute = AttributeId::from(byte);
                    self.state = ParseState::LengthLow;
                }
                ParseState::LengthLow => {
                    self.state = ParseState::LengthHigh { low: byte };
                }
                ParseState::LengthHigh { low } => {
                    let len = u16::from_le_bytes([low, byte]) as usize;
                    self.buffer.clear();
                    if len == 0 {
                        self.finish_attribute(&mut on_fragment);
                    } else {
                        if len > self.attribute.capacity() {
                            debug!(
                                "Data Source: attribute {:?} is {} bytes, keeping {}",
                                self.attribute,
                                len,
                                self.attribute.capacity()
                            );
                        }
                        self.state = ParseState::Data { remaining: len };
                    }
                }
                ParseState::Data { remaining } => {
                    if self.buffer.len() < self.attribute.capacity() {
                        // Bounded by MAX_ATTRIBUTE_LEN >= every capacity.
                        let _ = self.buffer.push(byte);
                    }
                    if remaining == 1 {
                        self.finish_attribute(&mut on_fragment);
                    } else {
                        self.state = ParseState::Data {
                            remaining: remaining - 1,
                        };
                    }
                }
            }
        }
        Ok(())
    }

    fn finish_attribute<F>(&mut self, on_fragment: &mut F)
    where
        F: FnMut(AttributeFragment<'_>),
    {
        on_fragment(AttributeFragment {
            uid: u32::from_le_bytes(self.uid_bytes),
            attribute: self.attribute,
            data: self.buffer.as_slice(),
        });
        self.buffer.clear();

        self.completed += 1;
        self.state = if self.completed == REQUESTED_ATTRIBUTES.len() {
            self.completed = 0;
            ParseState::Command
        } else {
            ParseState::AttributeId
        };
    }
}

impl Default for DataSourceParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::vec::Vec as StdVec;

    /// Build a full Get Notification Attributes response for `uid` with
    /// the given values for AppIdentifier, Title and Message and empty
    /// values for every other requested attribute.
    pub(crate) fn response(uid: u32, app: &[u8], title: &[u8], message: &[u8]) -> StdVec<u8> {
        let mut out = StdVec::new();
        out.push(0x00);
        out.extend_from_slice(&uid.to_le_bytes());
        for attribute in REQUESTED_ATTRIBUTES {
            let value: &[u8] = match attribute {
                AttributeId::AppIdentifier => app,
                AttributeId::Title => title,
                AttributeId::Message => message,
                _ => &[],
            };
            out.push(u8::from(attribute));
            out.extend_from_slice(&(value.len() as u16).to_le_bytes());
            out.extend_from_slice(value);
        }
        out
    }

    fn collect(parser: &mut DataSourceParser, chunks: &[&[u8]]) -> StdVec<(u32, AttributeId, StdVec<u8>)> {
        let mut seen = StdVec::new();
        for chunk in chunks {
            parser
                .feed(chunk, |f| seen.push((f.uid, f.attribute, f.data.to_vec())))
                .unwrap();
        }
        seen
    }

    #[test]
    fn parses_single_notification_response() {
        let bytes = response(7, b"com.test", b"Hello", b"World");
        let mut parser = DataSourceParser::new();
        let seen = collect(&mut parser, &[bytes.as_slice()]);

        assert_eq!(seen.len(), REQUESTED_ATTRIBUTES.len());
        assert_eq!(seen[0], (7, AttributeId::AppIdentifier, b"com.test".to_vec()));
        assert_eq!(seen[1], (7, AttributeId::Title, b"Hello".to_vec()));
        assert_eq!(seen[3], (7, AttributeId::Message, b"World".to_vec()));
        assert!(seen[2].2.is_empty());
        assert!(parser.is_idle());
    }

    #[test]
    fn every_split_point_yields_same_fragments() {
        let bytes = response(0xA1B2_C3D4, b"com.apple.MobileSMS", b"Alice", b"See you at 6");
        let mut whole = DataSourceParser::new();
        let expected = collect(&mut whole, &[bytes.as_slice()]);

        for split in 1..bytes.len() {
            let (a, b) = bytes.split_at(split);
            let mut parser = DataSourceParser::new();
            assert_eq!(collect(&mut parser, &[a, b]), expected, "split at {}", split);
            assert!(parser.is_idle());
        }
    }

    #[test]
    fn byte_at_a_time_delivery() {
        let bytes = response(3, b"a", b"b", b"c");
        let chunks: StdVec<&[u8]> = bytes.chunks(1).collect();
        let mut parser = DataSourceParser::new();
        let seen = collect(&mut parser, &chunks);
        assert_eq!(seen.len(), REQUESTED_ATTRIBUTES.len());
        assert_eq!(seen[3].2, b"c".to_vec());
    }

    #[test]
    fn oversized_attribute_is_capped_and_stream_stays_in_sync() {
        let long_title = [b'T'; 100];
        let long_message = [b'M'; 300];
        let bytes = response(1, b"com.test", &long_title, &long_message);
        let mut parser = DataSourceParser::new();
        let seen = collect(&mut parser, &[bytes.as_slice()]);

        assert_eq!(seen[1].2.len(), 64);
        assert_eq!(seen[3].2.len(), 256);
        assert_eq!(seen[4].1, AttributeId::MessageSize);
        assert_eq!(seen.len(), REQUESTED_ATTRIBUTES.len());
        assert!(parser.is_idle());
    }

    #[test]
    fn back_to_back_responses() {
        let mut bytes = response(1, b"a1", b"t1", b"m1");
        bytes.extend(response(2, b"a2", b"t2", b"m2"));
        let mut parser = DataSourceParser::new();
        let seen = collect(&mut parser, &[bytes.as_slice()]);

        assert_eq!(seen.len(), 2 * REQUESTED_ATTRIBUTES.len());
        assert_eq!(seen[REQUESTED_ATTRIBUTES.len()].0, 2);
        assert_eq!(seen[REQUESTED_ATTRIBUTES.len()].2, b"a2".to_vec());
    }

    #[test]
    fn unknown_command_aborts_packet() {
        let mut parser = DataSourceParser::new();
        let mut count = 0;
        assert_eq!(
            parser.feed(&[0x09, 0x00, 0x01], |_| count += 1),
            Err(Error::UnknownCommand(9))
        );
        assert_eq!(count, 0);
        assert!(parser.is_idle());

        // App attribute responses are never requested and are not parsed.
        assert_eq!(
            parser.feed(&[0x01, b'x', 0x00], |_| count += 1),
            Err(Error::UnknownCommand(1))
        );
    }

    #[test]
    fn reset_drops_partial_response() {
        let bytes = response(5, b"app", b"title", b"message");
        let mut parser = DataSourceParser::new();
        parser.feed(&bytes[..10], |_| {}).unwrap();
        assert!(!parser.is_idle());

        parser.reset();
        assert!(parser.is_idle());
        let seen = collect(&mut parser, &[bytes.as_slice()]);
        assert_eq!(seen.len(), REQUESTED_ATTRIBUTES.len());
    }
}
